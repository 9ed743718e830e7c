use crate::models::{ComputedFeatures, FeatureInputs};
use chrono::{Datelike, Weekday};

/// Reason tags attached to scores in both modes. The tensor rows reuse the
/// same vocabulary, so these strings are part of the external contract.
pub mod tags {
    pub const STORM_ALERT: &str = "STORM_ALERT";
    pub const THERMAL_COLD: &str = "THERMAL_COLD";
    pub const SNOW_ICE_RISK: &str = "SNOW_ICE_RISK";
    pub const FREEZE_THAW: &str = "FREEZE_THAW";
    pub const OLDER_VEHICLE_COHORT: &str = "OLDER_VEHICLE_COHORT";
    pub const RECALL_ATTENTION: &str = "RECALL_ATTENTION";
    pub const WEEKEND_ADJACENCY: &str = "WEEKEND_ADJACENCY";
    pub const MONTH_BOUNDARY: &str = "MONTH_BOUNDARY";
    pub const HOLIDAY_PROXIMITY: &str = "HOLIDAY_PROXIMITY";
}

// Compute-mode heuristic thresholds
const COLD_URGENCY_TEMP_F: f64 = 20.0;
const PRECIP_URGENCY_PROB: f64 = 0.6;
const OLDER_VEHICLE_AGE_YEARS: i32 = 8;

/// Derives the four 0-100 sub-scores from the assembled inputs. Pure
/// function; the timestamp comes in with the inputs so reruns reproduce.
pub fn compute_features(inputs: &FeatureInputs) -> ComputedFeatures {
    let mut reasons: Vec<String> = Vec::new();
    let mut weather_stress = 0.0_f64;
    let mut forecast_urgency = 0.0_f64;
    let mut action_timing = 100.0_f64;
    let mut vehicle_context = 0.0_f64;

    // Weather stress from alert presence
    if !inputs.alerts.is_empty() {
        weather_stress += 50.0;
        push_tag(&mut reasons, tags::STORM_ALERT);
    }

    // Forecast urgency from the next 24 hours: low temps, high precip
    let next24 = &inputs.forecast_hourly[..inputs.forecast_hourly.len().min(24)];
    let min_temp = next24
        .iter()
        .map(|h| h.temp_f)
        .filter(|t| t.is_finite())
        .fold(f64::INFINITY, f64::min);
    let max_precip = next24
        .iter()
        .map(|h| h.precip_prob)
        .filter(|p| p.is_finite())
        .fold(0.0_f64, f64::max);

    if min_temp.is_finite() && min_temp <= COLD_URGENCY_TEMP_F {
        forecast_urgency += 40.0;
        push_tag(&mut reasons, tags::THERMAL_COLD);
    }
    if max_precip >= PRECIP_URGENCY_PROB {
        forecast_urgency += 30.0;
        push_tag(&mut reasons, tags::SNOW_ICE_RISK);
    }

    // Vehicle context: age cohort and open recalls
    if let Some(year) = inputs.vehicle.as_ref().and_then(|v| v.model_year) {
        if inputs.now_utc.year() - year >= OLDER_VEHICLE_AGE_YEARS {
            vehicle_context += 20.0;
            push_tag(&mut reasons, tags::OLDER_VEHICLE_COHORT);
        }
    }
    if inputs
        .recalls
        .as_ref()
        .map(|r| r.open_recall_count > 0)
        .unwrap_or(false)
    {
        vehicle_context += 30.0;
        push_tag(&mut reasons, tags::RECALL_ATTENTION);
    }

    // Timing multipliers on the 100 baseline (weekend, month boundary)
    let weekday = inputs.now_utc.weekday();
    if weekday == Weekday::Sat || weekday == Weekday::Sun {
        action_timing *= 0.9;
        push_tag(&mut reasons, tags::WEEKEND_ADJACENCY);
    }
    let day_of_month = inputs.now_utc.day();
    if day_of_month >= 28 || day_of_month <= 2 {
        action_timing *= 1.05;
        push_tag(&mut reasons, tags::MONTH_BOUNDARY);
    }

    ComputedFeatures {
        weather_stress: clamp_100(weather_stress),
        forecast_urgency: clamp_100(forecast_urgency),
        action_timing: clamp_100(action_timing),
        vehicle_context: clamp_100(vehicle_context),
        reasons,
    }
}

fn clamp_100(value: f64) -> f64 {
    value.clamp(0.0, 100.0)
}

fn push_tag(reasons: &mut Vec<String>, tag: &str) {
    if !reasons.iter().any(|r| r == tag) {
        reasons.push(tag.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ForecastHour, RecallContext, VehicleSummary};
    use chrono::{TimeZone, Utc};

    fn base_inputs() -> FeatureInputs {
        FeatureInputs {
            // Wednesday mid-month
            now_utc: Utc.with_ymd_and_hms(2024, 1, 17, 12, 0, 0).unwrap(),
            dealer_zip: "80301".to_string(),
            geo: None,
            vin: "1HGCM82633A004352".to_string(),
            vehicle: None,
            recalls: None,
            weather_daily: vec![],
            forecast_hourly: vec![],
            alerts: vec![],
            holidays_ics: None,
        }
    }

    fn hour(temp_f: f64, precip_prob: f64) -> ForecastHour {
        ForecastHour {
            start_time: String::new(),
            temp_f,
            precip_prob,
        }
    }

    #[test]
    fn test_empty_inputs_yield_baseline() {
        let features = compute_features(&base_inputs());
        assert_eq!(features.weather_stress, 0.0);
        assert_eq!(features.forecast_urgency, 0.0);
        assert_eq!(features.vehicle_context, 0.0);
        assert_eq!(features.action_timing, 100.0);
        assert!(features.reasons.is_empty());
    }

    #[test]
    fn test_alert_raises_weather_stress() {
        let mut inputs = base_inputs();
        inputs.alerts = vec![serde_json::json!({"id": "a"})];
        let features = compute_features(&inputs);
        assert_eq!(features.weather_stress, 50.0);
        assert!(features.reasons.contains(&tags::STORM_ALERT.to_string()));
    }

    #[test]
    fn test_cold_and_precip_raise_urgency() {
        let mut inputs = base_inputs();
        inputs.forecast_hourly = vec![hour(15.0, 0.7)];
        let features = compute_features(&inputs);
        assert_eq!(features.forecast_urgency, 70.0);
        assert!(features.reasons.contains(&tags::THERMAL_COLD.to_string()));
        assert!(features.reasons.contains(&tags::SNOW_ICE_RISK.to_string()));
    }

    #[test]
    fn test_old_vehicle_and_recalls() {
        let mut inputs = base_inputs();
        inputs.vehicle = Some(VehicleSummary {
            model_year: Some(2012),
            make: None,
            model: None,
        });
        inputs.recalls = Some(RecallContext {
            open_recall_count: 2,
        });
        let features = compute_features(&inputs);
        assert_eq!(features.vehicle_context, 50.0);
        assert!(features
            .reasons
            .contains(&tags::OLDER_VEHICLE_COHORT.to_string()));
        assert!(features
            .reasons
            .contains(&tags::RECALL_ATTENTION.to_string()));
    }

    #[test]
    fn test_recall_absence_differs_from_zero() {
        let mut inputs = base_inputs();
        inputs.recalls = Some(RecallContext {
            open_recall_count: 0,
        });
        let features = compute_features(&inputs);
        assert_eq!(features.vehicle_context, 0.0);
        assert!(!features
            .reasons
            .contains(&tags::RECALL_ATTENTION.to_string()));
    }

    #[test]
    fn test_weekend_dampens_timing() {
        let mut inputs = base_inputs();
        inputs.now_utc = Utc.with_ymd_and_hms(2024, 1, 13, 12, 0, 0).unwrap(); // Saturday
        let features = compute_features(&inputs);
        assert_eq!(features.action_timing, 90.0);
        assert!(features
            .reasons
            .contains(&tags::WEEKEND_ADJACENCY.to_string()));
    }

    #[test]
    fn test_month_boundary_boost_is_clamped() {
        let mut inputs = base_inputs();
        inputs.now_utc = Utc.with_ymd_and_hms(2024, 1, 30, 12, 0, 0).unwrap(); // Tuesday the 30th
        let features = compute_features(&inputs);
        // 100 * 1.05 clamps back to 100
        assert_eq!(features.action_timing, 100.0);
        assert!(features.reasons.contains(&tags::MONTH_BOUNDARY.to_string()));
    }

    #[test]
    fn test_weekend_at_month_end_combines_multipliers() {
        let mut inputs = base_inputs();
        inputs.now_utc = Utc.with_ymd_and_hms(2024, 3, 30, 12, 0, 0).unwrap(); // Saturday the 30th
        let features = compute_features(&inputs);
        assert!((features.action_timing - 94.5).abs() < 1e-9);
    }
}
