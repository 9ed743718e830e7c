use crate::models::VehicleSummary;

/// Deterministic vehicle classification
///
/// The class key is part of the external contract: the precomputed tensor
/// is keyed by the same function, so field order, casing and the `unknown`
/// token must never change without a tensor rebuild.

/// Non-overlapping 3-year model-year window anchored at year 2000.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct YearBucket {
    pub start: i32,
    pub end: i32,
}

/// Buckets a model year; a missing year collapses to the zero bucket.
pub fn bucket_years(year: Option<i32>) -> YearBucket {
    match year {
        Some(year) if year != 0 => {
            let start = year - (year - 2000).rem_euclid(3);
            YearBucket {
                start,
                end: start + 2,
            }
        }
        _ => YearBucket { start: 0, end: 0 },
    }
}

/// Builds the pipe-joined, lower-cased class key from six labeled fields in
/// fixed order. Platform/powertrain/drivetrain are placeholder buckets until
/// the decoder surfaces them; they serialize as `unknown`.
pub fn identify_vehicle_class(vehicle: &VehicleSummary) -> String {
    let years = bucket_years(vehicle.model_year);
    let make = vehicle.make.as_deref().unwrap_or("unknown").to_lowercase();
    let model = vehicle.model.as_deref().unwrap_or("unknown").to_lowercase();

    [
        format!("make={}", make),
        format!("model={}", model),
        format!("years={}-{}", years.start, years.end),
        "platform=unknown".to_string(),
        "powertrain=unknown".to_string(),
        "drivetrain=unknown".to_string(),
    ]
    .join("|")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn summary(make: Option<&str>, model: Option<&str>, year: Option<i32>) -> VehicleSummary {
        VehicleSummary {
            model_year: year,
            make: make.map(String::from),
            model: model.map(String::from),
        }
    }

    #[test]
    fn test_year_buckets_anchor_at_2000() {
        assert_eq!(bucket_years(Some(2000)), YearBucket { start: 2000, end: 2002 });
        assert_eq!(bucket_years(Some(2001)), YearBucket { start: 2000, end: 2002 });
        assert_eq!(bucket_years(Some(2002)), YearBucket { start: 2000, end: 2002 });
        assert_eq!(bucket_years(Some(2003)), YearBucket { start: 2003, end: 2005 });
        assert_eq!(bucket_years(Some(2021)), YearBucket { start: 2021, end: 2023 });
        assert_eq!(bucket_years(Some(2023)), YearBucket { start: 2021, end: 2023 });
    }

    #[test]
    fn test_missing_year_collapses_to_zero_bucket() {
        assert_eq!(bucket_years(None), YearBucket { start: 0, end: 0 });
        let key = identify_vehicle_class(&summary(Some("Honda"), Some("Accord"), None));
        assert!(key.contains("years=0-0"));
    }

    #[test]
    fn test_key_shape_and_casing() {
        let key = identify_vehicle_class(&summary(Some("HONDA"), Some("Accord"), Some(2021)));
        assert_eq!(
            key,
            "make=honda|model=accord|years=2021-2023|platform=unknown|powertrain=unknown|drivetrain=unknown"
        );
    }

    #[test]
    fn test_unknown_attributes_serialize_as_unknown() {
        let key = identify_vehicle_class(&summary(None, None, Some(2010)));
        assert!(key.starts_with("make=unknown|model=unknown|years=2009-2011"));
    }

    #[test]
    fn test_same_bucket_same_key() {
        let a = identify_vehicle_class(&summary(Some("Ford"), Some("F-150"), Some(2021)));
        let b = identify_vehicle_class(&summary(Some("Ford"), Some("F-150"), Some(2022)));
        assert_eq!(a, b);
    }

    #[test]
    fn test_bucket_boundary_changes_key() {
        let a = identify_vehicle_class(&summary(Some("Ford"), Some("F-150"), Some(2023)));
        let b = identify_vehicle_class(&summary(Some("Ford"), Some("F-150"), Some(2024)));
        assert_ne!(a, b);
        assert!(a.contains("years=2021-2023"));
        assert!(b.contains("years=2024-2026"));
    }
}
