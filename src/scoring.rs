use crate::config::ScoreConfig;
use crate::errors::AppError;
use crate::models::{Bucket, ComputedFeatures, ScoreOutcome};
use crate::storage::LeadStore;

/// Score resolver
///
/// Lookup mode answers from the precomputed (vehicle class x scenario)
/// tensor, falling back to a similarity-weighted average over neighbor
/// classes on a miss. Compute mode is the live heuristic used when lookup
/// is disabled. Bucket assignment is shared.

const NEIGHBOR_LIMIT: i64 = 20;
const MAX_REASONS: usize = 5;
const MIN_CONFIDENCE: f64 = 0.3;
const MAX_CONFIDENCE: f64 = 0.8;
const DEFAULT_MODEL_VERSION: &str = "v1.0.0";

/// Exact tensor hit, else neighbor fallback, else an explicit unknown
/// result (score 0, confidence 0.3) — never an error.
pub async fn score_via_lookup(
    store: &LeadStore,
    vehicle_class_id: &str,
    scenario_id: &str,
) -> Result<ScoreOutcome, AppError> {
    if let Some(row) = store.lookup_exact_score(vehicle_class_id, scenario_id).await? {
        return Ok(ScoreOutcome {
            score: row.score,
            bucket: Bucket::from_score(row.score),
            reasons: row.reasons,
            version: row.model_version,
            confidence: row.confidence,
        });
    }

    let neighbors = store
        .lookup_neighbor_scores(vehicle_class_id, scenario_id, NEIGHBOR_LIMIT)
        .await?;
    if neighbors.is_empty() {
        // no coverage at all: explicit unknown, not an error
        return Ok(ScoreOutcome {
            score: 0,
            bucket: Bucket::from_score(0),
            reasons: Vec::new(),
            version: DEFAULT_MODEL_VERSION.to_string(),
            confidence: MIN_CONFIDENCE,
        });
    }

    let mut weighted = 0.0_f64;
    let mut total_similarity = 0.0_f64;
    let mut reasons: Vec<String> = Vec::new();
    let model_version = neighbors[0].model_version.clone();

    for row in &neighbors {
        let similarity = row.similarity.max(0.0);
        weighted += row.score as f64 * similarity;
        total_similarity += similarity;
        for reason in &row.reasons {
            if !reasons.iter().any(|r| r == reason) {
                reasons.push(reason.clone());
            }
        }
    }

    let score = if total_similarity > 0.0 {
        (weighted / total_similarity).round() as i32
    } else {
        0
    };
    reasons.truncate(MAX_REASONS);
    let confidence = (total_similarity / neighbors.len() as f64)
        .clamp(MIN_CONFIDENCE, MAX_CONFIDENCE);

    Ok(ScoreOutcome {
        score,
        bucket: Bucket::from_score(score),
        reasons,
        version: model_version,
        confidence,
    })
}

/// Combines the compute-mode sub-scores through the configured linear
/// weighting. Weights are assumed to sum to roughly 1.0.
pub fn score_from_features(features: &ComputedFeatures, config: &ScoreConfig) -> ScoreOutcome {
    let base = features.weather_stress * config.weights.weather_stress
        + features.forecast_urgency * config.weights.forecast_urgency
        + features.action_timing * config.weights.action_timing
        + features.vehicle_context * config.weights.vehicle_context;
    let score = base.round() as i32;

    ScoreOutcome {
        score,
        bucket: Bucket::from_score(score),
        reasons: features.reasons.clone(),
        version: config.version.clone(),
        confidence: 1.0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn score_config() -> ScoreConfig {
        serde_json::from_str(
            r#"{
                "version": "v1.0.0",
                "weights": {
                    "weather_stress": 0.35,
                    "forecast_urgency": 0.3,
                    "action_timing": 0.1,
                    "vehicle_context": 0.25
                },
                "caps": {
                    "action_timing_multiplier_min": 0.8,
                    "action_timing_multiplier_max": 1.1
                }
            }"#,
        )
        .unwrap()
    }

    #[test]
    fn test_compute_mode_weighting() {
        let features = ComputedFeatures {
            weather_stress: 50.0,
            forecast_urgency: 70.0,
            action_timing: 100.0,
            vehicle_context: 50.0,
            reasons: vec!["STORM_ALERT".to_string()],
        };
        let outcome = score_from_features(&features, &score_config());
        // 50*0.35 + 70*0.3 + 100*0.1 + 50*0.25 = 61
        assert_eq!(outcome.score, 61);
        assert_eq!(outcome.bucket, Bucket::Moderate);
        assert_eq!(outcome.version, "v1.0.0");
        assert_eq!(outcome.reasons, vec!["STORM_ALERT".to_string()]);
    }

    #[test]
    fn test_compute_mode_zero_features() {
        let features = ComputedFeatures {
            weather_stress: 0.0,
            forecast_urgency: 0.0,
            action_timing: 0.0,
            vehicle_context: 0.0,
            reasons: vec![],
        };
        let outcome = score_from_features(&features, &score_config());
        assert_eq!(outcome.score, 0);
        assert_eq!(outcome.bucket, Bucket::Low);
    }

    #[test]
    fn test_compute_mode_saturated_features_stay_in_range() {
        let features = ComputedFeatures {
            weather_stress: 100.0,
            forecast_urgency: 100.0,
            action_timing: 100.0,
            vehicle_context: 100.0,
            reasons: vec![],
        };
        let outcome = score_from_features(&features, &score_config());
        assert_eq!(outcome.score, 100);
        assert_eq!(outcome.bucket, Bucket::Critical);
    }
}
