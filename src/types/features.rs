//! Fixed-length model input.

use serde::{Deserialize, Serialize};

use crate::{HuginnError, Result};

/// Number of input features the forecasting model expects
/// (25 numeric plus 2 encoded categoricals).
pub const NUM_FEATURES: usize = 27;

/// Feature names in model input order.
pub const FEATURE_NAMES: [&str; NUM_FEATURES] = [
    // date
    "year",
    "month",
    "day",
    "dayofweek",
    "dayofyear",
    "is_mid_month",
    "is_leap_year",
    // external
    "oil_price",
    "is_holiday",
    "onpromotion",
    "promo_rolling_7",
    // store metadata
    "cluster",
    // lags
    "sales_lag_1",
    "sales_lag_7",
    "sales_lag_14",
    "sales_lag_28",
    "sales_lag_90",
    // rolling windows
    "sales_rolling_mean_7",
    "sales_rolling_mean_14",
    "sales_rolling_mean_28",
    "sales_rolling_mean_90",
    "sales_rolling_std_7",
    "sales_rolling_std_14",
    "sales_rolling_std_28",
    "sales_rolling_std_90",
    // categoricals
    "family_encoded",
    "type_encoded",
];

/// One prediction request's model input.
///
/// The length is fixed by construction, so anything holding a
/// `FeatureVector` has already passed the length check. Values are
/// immutable once built; the inference engine copies them into its own
/// buffer.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<f32>", into = "Vec<f32>")]
pub struct FeatureVector([f32; NUM_FEATURES]);

impl FeatureVector {
    /// All-zero vector, used when no stored features exist for a request.
    pub const fn zeros() -> Self {
        Self([0.0; NUM_FEATURES])
    }

    /// Build from a slice, rejecting wrong lengths and non-finite values.
    pub fn from_slice(values: &[f32]) -> Result<Self> {
        if values.is_empty() {
            return Err(HuginnError::invalid("MISSING_FEATURES", "features are required"));
        }
        let array: [f32; NUM_FEATURES] = values.try_into().map_err(|_| {
            HuginnError::invalid(
                "INVALID_FEATURES",
                format!(
                    "features must have exactly {NUM_FEATURES} elements, got {}",
                    values.len()
                ),
            )
        })?;
        if let Some(pos) = array.iter().position(|v| !v.is_finite()) {
            return Err(HuginnError::invalid(
                "INVALID_FEATURES",
                format!("feature {} ({}) is not finite", pos, FEATURE_NAMES[pos]),
            ));
        }
        Ok(Self(array))
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.0
    }

    pub fn len(&self) -> usize {
        NUM_FEATURES
    }

    pub fn is_empty(&self) -> bool {
        false
    }
}

impl Default for FeatureVector {
    fn default() -> Self {
        Self::zeros()
    }
}

impl TryFrom<Vec<f32>> for FeatureVector {
    type Error = HuginnError;

    fn try_from(values: Vec<f32>) -> Result<Self> {
        Self::from_slice(&values)
    }
}

impl From<FeatureVector> for Vec<f32> {
    fn from(features: FeatureVector) -> Self {
        features.0.to_vec()
    }
}

impl From<[f32; NUM_FEATURES]> for FeatureVector {
    fn from(values: [f32; NUM_FEATURES]) -> Self {
        Self(values)
    }
}
