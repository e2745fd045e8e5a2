//! Prediction intervals from training-time residual offsets.

use std::path::Path;

use serde::Deserialize;

use crate::types::IntervalBounds;
use crate::{HuginnError, Result};

/// Additive offsets for the 80% and 95% bands.
///
/// Loaded from the JSON file the training pipeline writes next to the
/// model. Extra fields in that file (`std`, `n_samples`, ...) are ignored.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct PredictionIntervals {
    pub lower_80_offset: f32,
    pub upper_80_offset: f32,
    pub lower_95_offset: f32,
    pub upper_95_offset: f32,
}

impl PredictionIntervals {
    pub fn load(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path).map_err(|e| {
            HuginnError::Configuration(format!(
                "cannot read intervals file {}: {e}",
                path.display()
            ))
        })?;
        let intervals: Self = serde_json::from_slice(&bytes)?;
        tracing::info!(
            lower_80 = intervals.lower_80_offset,
            upper_80 = intervals.upper_80_offset,
            lower_95 = intervals.lower_95_offset,
            upper_95 = intervals.upper_95_offset,
            "prediction intervals loaded"
        );
        Ok(intervals)
    }

    /// Bands around `prediction`. Lower bounds are floored at zero since
    /// sales cannot be negative.
    pub fn apply(&self, prediction: f32) -> IntervalBounds {
        IntervalBounds {
            lower_80: (prediction + self.lower_80_offset).max(0.0),
            upper_80: prediction + self.upper_80_offset,
            lower_95: (prediction + self.lower_95_offset).max(0.0),
            upper_95: prediction + self.upper_95_offset,
        }
    }
}
