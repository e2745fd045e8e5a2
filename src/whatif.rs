//! Feature adjustments for sensitivity analysis.
//!
//! Flags are forced to 0 or 1, calendar fields are clamped to their range,
//! and every other feature is scaled by the adjustment (1.0 leaves it
//! unchanged).

use std::collections::BTreeMap;

use crate::types::{FEATURE_NAMES, FeatureVector, NUM_FEATURES};
use crate::{HuginnError, Result};

const FLAGS: [&str; 4] = ["is_holiday", "onpromotion", "is_mid_month", "is_leap_year"];

/// An adjusted copy of a baseline vector.
#[derive(Debug, Clone, PartialEq)]
pub struct Adjusted {
    pub features: FeatureVector,
    pub applied: BTreeMap<String, f32>,
    pub ignored: Vec<String>,
}

pub fn feature_index(name: &str) -> Option<usize> {
    FEATURE_NAMES.iter().position(|&n| n == name)
}

/// Apply `adjustments` to `base`. Unknown names are ignored, non-finite
/// values and results are rejected.
pub fn apply_adjustments(
    base: &FeatureVector,
    adjustments: &BTreeMap<String, f32>,
) -> Result<Adjusted> {
    let mut values: [f32; NUM_FEATURES] = [0.0; NUM_FEATURES];
    values.copy_from_slice(base.as_slice());
    let mut applied = BTreeMap::new();
    let mut ignored = Vec::new();

    for (name, &adjustment) in adjustments {
        if !adjustment.is_finite() {
            return Err(HuginnError::invalid(
                "INVALID_ADJUSTMENT",
                format!("adjustment for {name} is not finite"),
            ));
        }
        let Some(index) = feature_index(name) else {
            tracing::debug!(feature = %name, "ignoring unknown what-if feature");
            ignored.push(name.clone());
            continue;
        };
        values[index] = adjust(name, values[index], adjustment);
        applied.insert(name.clone(), adjustment);
    }

    let features = FeatureVector::from_slice(&values).map_err(|_| {
        HuginnError::invalid("INVALID_ADJUSTMENT", "adjusted features are not finite")
    })?;
    Ok(Adjusted {
        features,
        applied,
        ignored,
    })
}

fn adjust(name: &str, current: f32, adjustment: f32) -> f32 {
    match name {
        flag if FLAGS.contains(&flag) => {
            if adjustment > 0.5 {
                1.0
            } else {
                0.0
            }
        }
        "dayofweek" => adjustment.clamp(0.0, 6.0),
        "month" => adjustment.clamp(1.0, 12.0),
        "day" => adjustment.clamp(1.0, 31.0),
        _ => current * adjustment,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> FeatureVector {
        let mut values = [2.0; NUM_FEATURES];
        values[feature_index("month").unwrap()] = 6.0;
        FeatureVector::from(values)
    }

    fn adjustments(pairs: &[(&str, f32)]) -> BTreeMap<String, f32> {
        pairs.iter().map(|&(k, v)| (k.to_owned(), v)).collect()
    }

    #[test]
    fn continuous_features_are_scaled() {
        let out = apply_adjustments(&base(), &adjustments(&[("oil_price", 1.5)])).unwrap();
        assert_eq!(out.features.as_slice()[feature_index("oil_price").unwrap()], 3.0);
        assert_eq!(out.applied.get("oil_price"), Some(&1.5));
    }

    #[test]
    fn flags_and_calendar_fields_are_set() {
        let out = apply_adjustments(
            &base(),
            &adjustments(&[("onpromotion", 0.2), ("month", 15.0), ("dayofweek", -1.0)]),
        )
        .unwrap();
        let values = out.features.as_slice();
        assert_eq!(values[feature_index("onpromotion").unwrap()], 0.0);
        assert_eq!(values[feature_index("month").unwrap()], 12.0);
        assert_eq!(values[feature_index("dayofweek").unwrap()], 0.0);
    }

    #[test]
    fn unknown_names_are_reported_not_applied() {
        let out = apply_adjustments(&base(), &adjustments(&[("weather", 2.0)])).unwrap();
        assert_eq!(out.features, base());
        assert!(out.applied.is_empty());
        assert_eq!(out.ignored, vec!["weather".to_owned()]);
    }

    #[test]
    fn non_finite_adjustment_is_rejected() {
        let err = apply_adjustments(&base(), &adjustments(&[("oil_price", f32::INFINITY)]))
            .unwrap_err();
        assert_eq!(err.code(), "INVALID_ADJUSTMENT");
    }

    #[test]
    fn overflowing_scale_is_rejected() {
        let err =
            apply_adjustments(&base(), &adjustments(&[("oil_price", f32::MAX)])).unwrap_err();
        assert_eq!(err.code(), "INVALID_ADJUSTMENT");
    }
}
