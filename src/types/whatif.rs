//! Sensitivity ("what if") request and response types.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::prediction::DEFAULT_HORIZON;

fn default_horizon() -> i32 {
    DEFAULT_HORIZON
}

/// A baseline target plus named feature adjustments.
///
/// Keys are model feature names (see [`FEATURE_NAMES`](super::FEATURE_NAMES)).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WhatIfRequest {
    pub store_nbr: i32,
    pub family: String,
    pub date: String,
    #[serde(default = "default_horizon")]
    pub horizon: i32,
    #[serde(default)]
    pub adjustments: BTreeMap<String, f32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WhatIfResponse {
    /// Prediction for the stored baseline features.
    pub original: f32,
    /// Prediction after applying the adjustments.
    pub adjusted: f32,
    pub delta: f32,
    /// `delta` as a percentage of `original`; 0 when `original` is 0.
    pub delta_pct: f32,
    /// Adjustments that matched a feature, as requested.
    pub applied: BTreeMap<String, f32>,
    /// Adjustment names that matched no feature.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ignored: Vec<String>,
    pub latency_ms: f64,
}
