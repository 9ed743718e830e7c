//! Per-lead enrichment orchestrator
//!
//! Drives one lead through the full pipeline: resolve cached or
//! freshly-fetched context (geo, vehicle facts, recalls, weather, holidays),
//! classify into a (vehicle class, scenario) key, resolve the priority
//! score, and persist the audit trail. Every contextual attribute is
//! independently best-effort; only persistent-store failures abort a run.
//! Re-running a lead is safe: the feature vector appends, the lead score
//! upserts.

use crate::config::ScoringMode;
use crate::errors::AppError;
use crate::features::compute_features;
use crate::models::{
    FeatureInputs, FeatureVectorRecord, GeoPoint, LeadScoreRecord, RecallContext, ScoreOutcome,
    VehicleSummary,
};
use crate::providers::{
    GeocoderService, HolidayService, NoaaService, NwsService, RecallService, VpicService,
};
use crate::resolvers::{GeoResolver, RecallResolver, StationResolver, VehicleFactsResolver};
use crate::scenario::{identify_scenario, ScenarioInputs};
use crate::scoring::{score_from_features, score_via_lookup};
use crate::storage::LeadStore;
use crate::vehicle_class::identify_vehicle_class;
use crate::vin::{is_valid_vin, mask_vin, vin_fingerprint};
use crate::worker::WorkerState;
use chrono::{Duration, Utc};
use serde_json::json;

const HOLIDAY_CACHE_KEY: &str = "federal";
const HISTORY_DAYS: i64 = 29;

/// Deterministic A/B variant: stable FNV-1a 32-bit hash of the lead id,
/// even hash -> control, odd -> treatment. Reproducible across runs and
/// process restarts.
pub fn assign_variant(lead_id: &str) -> &'static str {
    let mut hash: u32 = 0x811c9dc5;
    for byte in lead_id.bytes() {
        hash ^= byte as u32;
        hash = hash.wrapping_mul(0x0100_0193);
    }
    if hash % 2 == 0 {
        "control"
    } else {
        "treatment"
    }
}

/// Runs the enrichment state machine for one lead. No-op when the lead does
/// not exist.
pub async fn score_and_persist_lead(state: &WorkerState, lead_id: &str) -> Result<(), AppError> {
    let store = LeadStore::new(state.db.clone());

    // 1. Load lead
    let Some(lead) = store.fetch_lead(lead_id).await? else {
        tracing::info!("Lead {} not found, skipping", lead_id);
        return Ok(());
    };
    tracing::info!(
        "Scoring lead {} (vin {}, zip {})",
        lead.lead_id,
        mask_vin(&lead.vin),
        lead.dealer_zip
    );

    let geocoder = GeocoderService::new(&state.config, state.fetcher.clone());
    let vpic = VpicService::new(&state.config, state.fetcher.clone());
    let recalls_svc = RecallService::new(&state.config, state.fetcher.clone());
    let nws = NwsService::new(&state.config, state.fetcher.clone());
    let noaa = NoaaService::new(&state.config, state.fetcher.clone());
    let holidays_svc = HolidayService::new(&state.config, state.fetcher.clone());

    // 2. Geo context; a dead geocoder degrades the weather steps, it never
    // aborts the run
    let geo = match GeoResolver::new(&store, &geocoder, &state.geo_front_cache)
        .resolve(&lead.dealer_zip)
        .await
    {
        Ok(geo) => geo.map(|g| GeoPoint { lat: g.lat, lon: g.lon }),
        Err(e) if e.is_store_failure() => return Err(e),
        Err(e) => {
            tracing::warn!("Geo resolution failed for zip {}: {}", lead.dealer_zip, e);
            None
        }
    };

    // 3. Vehicle facts; malformed VINs skip the decoder call entirely
    let facts = if !is_valid_vin(&lead.vin) {
        tracing::warn!("Lead {} carries a malformed VIN, skipping decode", lead.lead_id);
        None
    } else {
        match VehicleFactsResolver::new(&store, &vpic).resolve(&lead.vin).await {
            Ok(facts) => Some(facts),
            Err(e) if e.is_store_failure() => return Err(e),
            Err(e) => {
                tracing::warn!("VIN decode failed for {}: {}", mask_vin(&lead.vin), e);
                None
            }
        }
    };
    let vehicle = facts.as_ref().map(VehicleSummary::from);

    // 4. Recall context, only when the subsystem is on; `None` means
    // "unknown", which is distinct from zero recalls
    let recalls = if state.config.recalls_enabled {
        match RecallResolver::new(&store, &recalls_svc).resolve(&lead.vin).await {
            Ok(summary) => Some(RecallContext {
                open_recall_count: summary.open_recall_count,
            }),
            Err(e) if e.is_store_failure() => return Err(e),
            Err(e) => {
                tracing::warn!("Recall lookup failed for {}: {}", mask_vin(&lead.vin), e);
                None
            }
        }
    } else {
        None
    };

    let now = Utc::now();
    let start_date = (now - Duration::days(HISTORY_DAYS)).format("%Y-%m-%d").to_string();
    let end_date = now.format("%Y-%m-%d").to_string();

    // 5. Weather context, each attribute independently best-effort
    let mut forecast_hourly = Vec::new();
    let mut alerts = Vec::new();
    let mut weather_daily = Vec::new();
    if let Some(geo) = geo {
        match nws.grid_point(geo.lat, geo.lon).await {
            Ok(grid) => match nws.hourly_forecast(&grid).await {
                Ok(hours) => forecast_hourly = hours,
                Err(e) => tracing::warn!("Hourly forecast failed: {}", e),
            },
            Err(e) => tracing::warn!("Grid point lookup failed: {}", e),
        }

        match nws.active_alerts(geo.lat, geo.lon).await {
            Ok(found) => alerts = found,
            Err(e) => tracing::warn!("Alert lookup failed: {}", e),
        }

        match noaa.daily_history(&start_date, &end_date).await {
            Ok(days) => weather_daily = days,
            Err(e) => tracing::warn!("Daily history failed: {}", e),
        }

        // Keep the station cache warm; the result is unused by the current
        // scoring formulas
        match StationResolver::new(&store, &noaa)
            .resolve(geo.lat, geo.lon, &start_date, &end_date)
            .await
        {
            Ok(Some(station_id)) => tracing::debug!("Station resolved: {}", station_id),
            Ok(None) => {}
            Err(e) => tracing::debug!("Station resolution failed: {}", e),
        }
    }

    // 6. Holiday calendar, cached in-process for the day
    let holidays_ics = match state.holiday_cache.get(HOLIDAY_CACHE_KEY).await {
        Some(ics) => Some(ics),
        None => match holidays_svc.federal_holidays_ics().await {
            Ok(ics) => {
                state
                    .holiday_cache
                    .insert(HOLIDAY_CACHE_KEY.to_string(), ics.clone())
                    .await;
                Some(ics)
            }
            Err(e) => {
                tracing::warn!("Holiday calendar fetch failed: {}", e);
                None
            }
        },
    };

    let inputs = FeatureInputs {
        now_utc: now,
        dealer_zip: lead.dealer_zip.clone(),
        geo,
        vin: lead.vin.clone(),
        vehicle: vehicle.clone(),
        recalls,
        weather_daily,
        forecast_hourly,
        alerts,
        holidays_ics,
    };

    // 7. Classify and resolve the score
    let vehicle_class_id = identify_vehicle_class(&vehicle.unwrap_or(VehicleSummary {
        model_year: None,
        make: None,
        model: None,
    }));
    let scenario = identify_scenario(
        &ScenarioInputs {
            weather_daily: &inputs.weather_daily,
            forecast_hourly: &inputs.forecast_hourly,
            alerts: &inputs.alerts,
            now_utc: inputs.now_utc,
            holidays_ics: inputs.holidays_ics.as_deref(),
        },
        &state.bins,
    );

    let (outcome, features_json): (ScoreOutcome, serde_json::Value) = match state.mode {
        ScoringMode::Lookup => {
            let outcome = score_via_lookup(&store, &vehicle_class_id, &scenario.scenario_id).await?;
            (outcome, json!({}))
        }
        ScoringMode::Compute => {
            let features = compute_features(&inputs);
            let outcome = score_from_features(&features, &state.score_config);
            let features_json = serde_json::to_value(&features)
                .map_err(|e| AppError::InternalError(format!("feature serialization: {}", e)))?;
            (outcome, features_json)
        }
    };

    // 8. Deterministic experiment variant
    let variant = assign_variant(&lead.lead_id);
    let offers = state.offers.map_tags_to_offers(&outcome.reasons);

    // Full raw-inputs snapshot for audit, with the classification keys
    let mut inputs_json = serde_json::to_value(&inputs)
        .map_err(|e| AppError::InternalError(format!("input serialization: {}", e)))?;
    if let Some(obj) = inputs_json.as_object_mut() {
        obj.insert("vehicle_class_id".to_string(), json!(vehicle_class_id));
        obj.insert("scenario_id".to_string(), json!(scenario.scenario_id));
        obj.insert("scenario_bins".to_string(), json!(scenario.bins));
    }

    let vin_hash = facts
        .as_ref()
        .map(|f| f.vin_hash.clone())
        .unwrap_or_else(|| vin_fingerprint(&lead.vin));

    // 9. Persist: append the audit row, upsert the current score, flip status
    store
        .insert_feature_vector(&FeatureVectorRecord {
            lead_id: lead.lead_id.clone(),
            vin: lead.vin.clone(),
            vin_hash,
            dealer_zip: lead.dealer_zip.clone(),
            run_date: now.date_naive(),
            feature_version: outcome.version.clone(),
            features: features_json,
            inputs: inputs_json,
        })
        .await?;

    store
        .upsert_lead_score(&LeadScoreRecord {
            lead_id: lead.lead_id.clone(),
            priority_score: outcome.score,
            bucket: outcome.bucket.as_str().to_string(),
            reasons: outcome.reasons.clone(),
            offers,
            score_version: outcome.version.clone(),
            ab_variant: variant.to_string(),
        })
        .await?;

    store.mark_scored(&lead.lead_id).await?;

    tracing::info!(
        "Lead {} scored {} ({}) version {} variant {}",
        lead.lead_id,
        outcome.score,
        outcome.bucket.as_str(),
        outcome.version,
        variant
    );
    Ok(())
}
