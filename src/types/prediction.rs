//! Prediction request and response types.

use serde::{Deserialize, Serialize};

/// Horizon assumed when a full-feature request omits one.
pub const DEFAULT_HORIZON: i32 = 90;

fn default_horizon() -> i32 {
    DEFAULT_HORIZON
}

/// Where a prediction value came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Provenance {
    /// Process-local cache tier.
    #[serde(rename = "L1")]
    L1,
    /// Shared cache tier.
    #[serde(rename = "L2")]
    L2,
    /// Fresh inference.
    #[serde(rename = "computed")]
    Computed,
}

impl Provenance {
    pub fn is_cached(self) -> bool {
        !matches!(self, Self::Computed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::L1 => "L1",
            Self::L2 => "L2",
            Self::Computed => "computed",
        }
    }
}

/// Prediction request carrying a full feature vector.
///
/// `features` stays a plain `Vec` here so that a wrong length surfaces as
/// an `InvalidInput` error with a useful message rather than a JSON error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictRequest {
    pub store_nbr: i32,
    pub family: String,
    pub date: String,
    pub features: Vec<f32>,
    #[serde(default = "default_horizon")]
    pub horizon: i32,
}

/// Prediction request without features; the server looks them up.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimplePredictRequest {
    pub store_nbr: i32,
    pub family: String,
    pub date: String,
    pub horizon: i32,
}

/// Several full-feature predictions in one call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchPredictRequest {
    pub predictions: Vec<PredictRequest>,
}

/// Confidence bands derived from training-time residual offsets.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct IntervalBounds {
    pub lower_80: f32,
    pub upper_80: f32,
    pub lower_95: f32,
    pub upper_95: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictResponse {
    pub store_nbr: i32,
    pub family: String,
    pub date: String,
    pub horizon: i32,
    pub prediction: f32,
    #[serde(flatten)]
    pub intervals: Option<IntervalBounds>,
    pub provenance: Provenance,
    /// Convenience flag: `provenance != computed`.
    pub cached: bool,
    pub latency_ms: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchPredictResponse {
    pub predictions: Vec<PredictResponse>,
    pub latency_ms: f64,
}
