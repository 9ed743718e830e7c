use crate::config::ScenarioBinsConfig;
use crate::models::{DailyRecord, ForecastHour};
use chrono::{DateTime, Datelike, Utc, Weekday};
use serde::Serialize;
use serde_json::Value;

/// Deterministic scenario classification
///
/// Pure function over the next 24 forecast hours, recent daily history,
/// active alerts, the current timestamp and the holiday calendar blob. The
/// id embeds the threshold-config version so a stale config can never mix
/// silently with a newer tensor.

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScenarioBins {
    pub cold: &'static str,
    pub volatility: &'static str,
    pub freeze_thaw: &'static str,
    pub snow_ice: &'static str,
    pub forecast_urgency: &'static str,
    pub timing: &'static str,
}

#[derive(Debug, Clone)]
pub struct Scenario {
    pub scenario_id: String,
    pub bins: ScenarioBins,
}

pub struct ScenarioInputs<'a> {
    pub weather_daily: &'a [DailyRecord],
    pub forecast_hourly: &'a [ForecastHour],
    pub alerts: &'a [Value],
    pub now_utc: DateTime<Utc>,
    pub holidays_ics: Option<&'a str>,
}

pub fn identify_scenario(inputs: &ScenarioInputs<'_>, bins_cfg: &ScenarioBinsConfig) -> Scenario {
    let next24: Vec<&ForecastHour> = inputs.forecast_hourly.iter().take(24).collect();
    let min_temp = min_finite(next24.iter().map(|h| h.temp_f));
    let max_temp = max_finite(next24.iter().map(|h| h.temp_f));
    let max_precip = max_finite(next24.iter().map(|h| h.precip_prob));

    // cold: no finite reading at all means "none"
    let mut cold = "none";
    if let Some(min_temp) = min_temp {
        if min_temp <= bins_cfg.cold_thresholds_f.extreme {
            cold = "extreme";
        } else if min_temp <= bins_cfg.cold_thresholds_f.hard {
            cold = "hard";
        } else if min_temp <= bins_cfg.cold_thresholds_f.mild {
            cold = "mild";
        }
    }

    let mut volatility = "low";
    if let (Some(min_temp), Some(max_temp)) = (min_temp, max_temp) {
        let swing = (max_temp - min_temp).abs();
        if swing >= bins_cfg.volatility_thresholds_f.high {
            volatility = "high";
        } else if swing >= bins_cfg.volatility_thresholds_f.med {
            volatility = "med";
        }
    }

    // crude freeze-thaw estimate from recent daily highs/lows around freezing
    let mut cycles = 0;
    for day in inputs.weather_daily {
        if let (Some(tmin), Some(tmax)) = (day.tmin_f, day.tmax_f) {
            if tmin <= 32.0 && tmax >= 34.0 {
                cycles += 1;
            }
        }
    }
    let freeze_thaw = if cycles >= 3 {
        "3+"
    } else if cycles >= 1 {
        "1-2"
    } else {
        "0"
    };

    let mut snow_ice = "none";
    if let Some(max_precip) = max_precip {
        if max_precip >= bins_cfg.snow_ice_prob_thresholds.high {
            snow_ice = "high";
        } else if max_precip >= bins_cfg.snow_ice_prob_thresholds.some {
            snow_ice = "some";
        }
    }

    let forecast_urgency = if !inputs.alerts.is_empty() {
        "storm-alert"
    } else if volatility != "low" && cold != "none" {
        "cold-front"
    } else {
        "none"
    };

    // timing precedence: holiday-prox > month-end > weekend/monday-low > weekday-high
    let weekday = inputs.now_utc.weekday();
    let day_of_month = inputs.now_utc.day();
    let mut timing = "weekday-high";
    if weekday == Weekday::Sat || weekday == Weekday::Sun {
        timing = "weekend";
    } else if weekday == Weekday::Mon {
        timing = "monday-low";
    }
    if day_of_month >= 28 || day_of_month <= 2 {
        timing = "month-end";
    }
    let today = inputs.now_utc.format("%Y-%m-%d").to_string();
    if inputs
        .holidays_ics
        .map(|ics| ics.contains(&today))
        .unwrap_or(false)
    {
        timing = "holiday-prox";
    }

    let bins = ScenarioBins {
        cold,
        volatility,
        freeze_thaw,
        snow_ice,
        forecast_urgency,
        timing,
    };
    let scenario_id = stable_id(&bins, &bins_cfg.version);

    Scenario { scenario_id, bins }
}

/// Key-sorted JSON serialization so the id is independent of field order.
/// serde_json maps are BTree-backed, which gives the sort for free.
fn stable_id(bins: &ScenarioBins, version: &str) -> String {
    let obj = serde_json::json!({
        "cold": bins.cold,
        "volatility": bins.volatility,
        "freeze_thaw": bins.freeze_thaw,
        "snow_ice": bins.snow_ice,
        "forecast_urgency": bins.forecast_urgency,
        "timing": bins.timing,
        "version": version,
    });
    obj.to_string()
}

fn min_finite(values: impl Iterator<Item = f64>) -> Option<f64> {
    values.filter(|v| v.is_finite()).fold(None, |acc, v| match acc {
        Some(cur) if cur <= v => Some(cur),
        _ => Some(v),
    })
}

fn max_finite(values: impl Iterator<Item = f64>) -> Option<f64> {
    values.filter(|v| v.is_finite()).fold(None, |acc, v| match acc {
        Some(cur) if cur >= v => Some(cur),
        _ => Some(v),
    })
}
