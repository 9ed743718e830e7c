use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Lead lifecycle states. The core only ever moves leads between these;
/// ingestion owns creation.
pub mod lead_status {
    pub const NEW: &str = "new";
    pub const PROCESSING: &str = "processing";
    pub const SCORED: &str = "scored";
    pub const FAILED: &str = "failed";
}

/// A prospective service opportunity tied to one VIN and one dealer.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Lead {
    pub lead_id: String,
    pub vin: String,
    pub dealer_id: String,
    pub dealer_zip: String,
    pub lead_type: Option<String>,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Durable postal-code geocode cache row. Written once per unique zip;
/// geography is assumed static, so rows are never invalidated.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct ZipGeo {
    pub zip: String,
    pub lat: f64,
    pub lon: f64,
    pub state: Option<String>,
}

/// Latitude/longitude pair carried through the pipeline.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lon: f64,
}

/// Durable decoded-VIN cache row.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct VehicleFacts {
    pub vin: String,
    pub vin_hash: String,
    pub model_year: Option<i32>,
    pub make: Option<String>,
    pub model: Option<String>,
    pub decoded_json: Value,
}

/// The slice of vehicle facts the classifiers and features consume.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VehicleSummary {
    pub model_year: Option<i32>,
    pub make: Option<String>,
    pub model: Option<String>,
}

impl From<&VehicleFacts> for VehicleSummary {
    fn from(facts: &VehicleFacts) -> Self {
        Self {
            model_year: facts.model_year,
            make: facts.make.clone(),
            model: facts.model.clone(),
        }
    }
}

/// Durable recall cache row. Absence of a row means "unknown", which is
/// distinct from a row with a zero count.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct RecallSummary {
    pub vin: String,
    pub open_recall_count: i32,
    pub recalls_json: Value,
}

/// Recall context handed to the feature heuristics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecallContext {
    pub open_recall_count: i32,
}

/// NWS forecast grid coordinates for a point.
#[derive(Debug, Clone)]
pub struct GridPoint {
    pub grid_id: String,
    pub grid_x: i64,
    pub grid_y: i64,
}

/// One hourly forecast period, already normalized to the units the
/// classifiers expect (°F, probability in [0,1]).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForecastHour {
    pub start_time: String,
    pub temp_f: f64,
    pub precip_prob: f64,
}

/// One daily history record (°F highs/lows).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DailyRecord {
    pub date: Option<String>,
    pub tmin_f: Option<f64>,
    pub tmax_f: Option<f64>,
}

/// Everything the classifiers and feature heuristics read for one run.
/// Persisted verbatim as the audit snapshot on the feature vector.
#[derive(Debug, Clone, Serialize)]
pub struct FeatureInputs {
    pub now_utc: DateTime<Utc>,
    pub dealer_zip: String,
    pub geo: Option<GeoPoint>,
    pub vin: String,
    pub vehicle: Option<VehicleSummary>,
    pub recalls: Option<RecallContext>,
    pub weather_daily: Vec<DailyRecord>,
    pub forecast_hourly: Vec<ForecastHour>,
    pub alerts: Vec<Value>,
    pub holidays_ics: Option<String>,
}

/// Compute-mode sub-scores, each clamped to [0,100].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComputedFeatures {
    pub weather_stress: f64,
    pub forecast_urgency: f64,
    pub action_timing: f64,
    pub vehicle_context: f64,
    pub reasons: Vec<String>,
}

/// Priority bucket derived from the final score. Thresholds are shared by
/// lookup and compute modes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bucket {
    Critical,
    High,
    Moderate,
    Low,
}

impl Bucket {
    pub fn from_score(score: i32) -> Self {
        if score >= 85 {
            Bucket::Critical
        } else if score >= 65 {
            Bucket::High
        } else if score >= 40 {
            Bucket::Moderate
        } else {
            Bucket::Low
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Bucket::Critical => "CRITICAL",
            Bucket::High => "HIGH",
            Bucket::Moderate => "MODERATE",
            Bucket::Low => "LOW",
        }
    }
}

/// Final outcome of the score resolver, either mode.
#[derive(Debug, Clone)]
pub struct ScoreOutcome {
    pub score: i32,
    pub bucket: Bucket,
    pub reasons: Vec<String>,
    pub version: String,
    pub confidence: f64,
}

/// One precomputed tensor row.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct TensorRow {
    pub score: i32,
    pub reasons: Vec<String>,
    pub model_version: String,
    pub confidence: f64,
}

/// One neighbor-joined tensor row used by the similarity-weighted fallback.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct NeighborScoreRow {
    pub score: i32,
    pub reasons: Vec<String>,
    pub model_version: String,
    pub similarity: f64,
}

/// Row appended to `feature_vectors` for every scoring run.
#[derive(Debug, Clone)]
pub struct FeatureVectorRecord {
    pub lead_id: String,
    pub vin: String,
    pub vin_hash: String,
    pub dealer_zip: String,
    pub run_date: NaiveDate,
    pub feature_version: String,
    pub features: Value,
    pub inputs: Value,
}

/// Row upserted into `lead_scores`; the current score for a lead.
#[derive(Debug, Clone)]
pub struct LeadScoreRecord {
    pub lead_id: String,
    pub priority_score: i32,
    pub bucket: String,
    pub reasons: Vec<String>,
    pub offers: Vec<String>,
    pub score_version: String,
    pub ab_variant: String,
}
