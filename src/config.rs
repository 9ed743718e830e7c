use serde::Deserialize;
use std::path::Path;

/// How the score resolver answers (lookup tensor vs live heuristic).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScoringMode {
    Lookup,
    Compute,
}

impl std::str::FromStr for ScoringMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "lookup" => Ok(ScoringMode::Lookup),
            "compute" => Ok(ScoringMode::Compute),
            other => anyhow::bail!("SCORING_MODE must be 'lookup' or 'compute', got '{}'", other),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub database_url: String,
    pub scoring_mode: String,
    pub recalls_enabled: bool,
    pub noaa_token: Option<String>,
    pub provider_rps: f64,
    pub retry_base_ms: u64,
    pub poll_idle_ms: u64,
    pub error_backoff_ms: u64,
    pub geocoder_base_url: String,
    pub vpic_base_url: String,
    pub recalls_base_url: String,
    pub nws_base_url: String,
    pub noaa_base_url: String,
    pub holiday_ics_url: String,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let config = Self {
            database_url: std::env::var("DB_URL")
                .or_else(|_| std::env::var("DATABASE_URL"))
                .map_err(|_| {
                    anyhow::anyhow!("DB_URL or DATABASE_URL environment variable required")
                })
                .and_then(|url| {
                    if url.trim().is_empty() {
                        anyhow::bail!("DB_URL cannot be empty");
                    }
                    if !url.starts_with("postgresql://") && !url.starts_with("postgres://") {
                        anyhow::bail!("DB_URL must start with postgresql:// or postgres://");
                    }
                    Ok(url)
                })?,
            scoring_mode: std::env::var("SCORING_MODE").unwrap_or_else(|_| "lookup".to_string()),
            recalls_enabled: std::env::var("RECALLS_ENABLED")
                .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
                .unwrap_or(true),
            noaa_token: std::env::var("NOAA_TOKEN")
                .ok()
                .filter(|s| !s.trim().is_empty()),
            provider_rps: std::env::var("PROVIDER_RPS")
                .unwrap_or_else(|_| "5".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("PROVIDER_RPS must be a positive number"))
                .and_then(|rps: f64| {
                    if rps <= 0.0 {
                        anyhow::bail!("PROVIDER_RPS must be greater than zero");
                    }
                    Ok(rps)
                })?,
            retry_base_ms: std::env::var("RETRY_BASE_MS")
                .unwrap_or_else(|_| "250".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("RETRY_BASE_MS must be a number"))?,
            poll_idle_ms: std::env::var("POLL_IDLE_MS")
                .unwrap_or_else(|_| "1000".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("POLL_IDLE_MS must be a number"))?,
            error_backoff_ms: std::env::var("ERROR_BACKOFF_MS")
                .unwrap_or_else(|_| "1500".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("ERROR_BACKOFF_MS must be a number"))?,
            geocoder_base_url: env_url("GEOCODER_BASE_URL", "https://api.zippopotam.us")?,
            vpic_base_url: env_url("VPIC_BASE_URL", "https://vpic.nhtsa.dot.gov")?,
            recalls_base_url: env_url("RECALLS_BASE_URL", "https://api.nhtsa.gov")?,
            nws_base_url: env_url("NWS_BASE_URL", "https://api.weather.gov")?,
            noaa_base_url: env_url("NOAA_BASE_URL", "https://www.ncdc.noaa.gov")?,
            holiday_ics_url: env_url(
                "HOLIDAY_ICS_URL",
                "https://www.officeholidays.com/ics/ics_country.php?tbl_country=United_States",
            )?,
        };

        // Log successful configuration load (without sensitive values)
        tracing::info!("Configuration loaded successfully");
        tracing::debug!(
            "Database URL: {}...",
            &config.database_url[..20.min(config.database_url.len())]
        );
        tracing::debug!("Scoring mode: {}", config.scoring_mode);
        tracing::debug!("Recalls enabled: {}", config.recalls_enabled);
        if config.noaa_token.is_some() {
            tracing::info!("NOAA token configured, daily history enabled");
        }

        Ok(config)
    }

    /// Parsed scoring mode; defaults to lookup when unset.
    pub fn mode(&self) -> anyhow::Result<ScoringMode> {
        self.scoring_mode.parse()
    }
}

fn env_url(var: &str, default: &str) -> anyhow::Result<String> {
    let url = std::env::var(var).unwrap_or_else(|_| default.to_string());
    if !url.starts_with("http://") && !url.starts_with("https://") {
        anyhow::bail!("{} must start with http:// or https://", var);
    }
    Ok(url)
}

/// Cold / volatility / snow-ice thresholds and the version tag baked into
/// every scenario id. Loaded once at startup, immutable for the process.
#[derive(Debug, Clone, Deserialize)]
pub struct ScenarioBinsConfig {
    pub version: String,
    pub cold_thresholds_f: ColdThresholds,
    pub volatility_thresholds_f: VolatilityThresholds,
    pub snow_ice_prob_thresholds: SnowIceThresholds,
    #[serde(default)]
    pub timing_categories: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ColdThresholds {
    pub mild: f64,
    pub hard: f64,
    pub extreme: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct VolatilityThresholds {
    pub med: f64,
    pub high: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SnowIceThresholds {
    pub some: f64,
    pub high: f64,
}

impl ScenarioBinsConfig {
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            anyhow::anyhow!("failed to read {}: {}", path.as_ref().display(), e)
        })?;
        let cfg: Self = serde_json::from_str(&raw)?;
        tracing::info!("Scenario bins loaded (version {})", cfg.version);
        Ok(cfg)
    }
}

/// Linear weighting of the compute-mode sub-scores. Weights are assumed to
/// sum to roughly 1.0; the version tag is recorded on every compute-mode run.
#[derive(Debug, Clone, Deserialize)]
pub struct ScoreConfig {
    pub version: String,
    pub weights: ScoreWeights,
    pub caps: TimingCaps,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ScoreWeights {
    pub weather_stress: f64,
    pub forecast_urgency: f64,
    pub action_timing: f64,
    pub vehicle_context: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TimingCaps {
    pub action_timing_multiplier_min: f64,
    pub action_timing_multiplier_max: f64,
}

impl ScoreConfig {
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            anyhow::anyhow!("failed to read {}: {}", path.as_ref().display(), e)
        })?;
        let cfg: Self = serde_json::from_str(&raw)?;
        tracing::info!("Score weights loaded (version {})", cfg.version);
        Ok(cfg)
    }
}

/// Paths of the versioned config files; overridable for tests and deploys.
pub fn scenario_bins_path() -> String {
    std::env::var("SCENARIO_BINS_PATH").unwrap_or_else(|_| "config/scenario_bins.json".to_string())
}

pub fn score_weights_path() -> String {
    std::env::var("SCORE_WEIGHTS_PATH").unwrap_or_else(|_| "config/score_weights.json".to_string())
}

pub fn service_offers_path() -> String {
    std::env::var("SERVICE_OFFERS_PATH")
        .unwrap_or_else(|_| "config/service_offers.json".to_string())
}
