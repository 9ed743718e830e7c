mod circuit_breaker;
mod config;
mod db;
mod enrich;
mod errors;
mod features;
mod fetcher;
mod models;
mod offers;
mod providers;
mod resolvers;
mod scenario;
mod scoring;
mod storage;
mod vehicle_class;
mod vin;
mod worker;

use moka::future::Cache;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::{Config, ScenarioBinsConfig, ScoreConfig};
use crate::db::Database;
use crate::fetcher::Fetcher;
use crate::offers::OffersConfig;
use crate::worker::WorkerState;

/// Main entry point for the scoring worker.
///
/// Initializes tracing, loads the environment and versioned file
/// configuration, connects the database pool, builds the shared fetcher and
/// in-process caches, then runs the polling loop until the process is
/// terminated.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "dealer_stressor=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration (immutable for the process lifetime)
    let config = Config::from_env()?;
    let mode = config.mode()?;
    let bins = ScenarioBinsConfig::load(config::scenario_bins_path())?;
    let score_config = ScoreConfig::load(config::score_weights_path())?;
    let offers = OffersConfig::load(config::service_offers_path())?;

    // Initialize database connection pool
    let db = Database::new(&config.database_url).await?;
    tracing::info!("Database connection pool established");

    // Shared rate-limited fetcher, one per process
    let fetcher = Arc::new(Fetcher::new(config.provider_rps, config.retry_base_ms)?);

    // In-process front cache for the static geo rows (24 hour TTL)
    let geo_front_cache = Cache::builder()
        .time_to_live(Duration::from_secs(86400))
        .max_capacity(50_000)
        .build();
    tracing::info!("Geo front cache initialized");

    // Holiday calendar blob cache (24 hour TTL)
    let holiday_cache = Cache::builder()
        .time_to_live(Duration::from_secs(86400))
        .max_capacity(10)
        .build();
    tracing::info!("Holiday calendar cache initialized");

    let state = Arc::new(WorkerState {
        db: db.pool.clone(),
        config,
        mode,
        bins,
        score_config,
        offers,
        fetcher,
        geo_front_cache,
        holiday_cache,
    });

    worker::run_loop(state).await;

    Ok(())
}
