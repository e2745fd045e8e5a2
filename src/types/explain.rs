//! Explanation types exchanged with the explanation service.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExplainRequest {
    pub store_nbr: i32,
    pub family: String,
    pub date: String,
}

/// Which way a feature pushed the prediction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Positive,
    Negative,
}

/// One step of the waterfall: a feature and its contribution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureContribution {
    pub name: String,
    pub value: f64,
    #[serde(rename = "shap_value")]
    pub contribution: f64,
    /// Running total from the base value through this feature.
    #[serde(default)]
    pub cumulative: f64,
    pub direction: Direction,
}

/// Explanation of one prediction, ordered by contribution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Explanation {
    pub base_value: f64,
    pub features: Vec<FeatureContribution>,
    pub prediction: f64,
}
