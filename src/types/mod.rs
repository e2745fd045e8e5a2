//! Public types for the Huginn API.

mod explain;
mod features;
mod prediction;
mod whatif;

pub use explain::{Direction, ExplainRequest, Explanation, FeatureContribution};
pub use features::{FEATURE_NAMES, FeatureVector, NUM_FEATURES};
pub use prediction::{
    BatchPredictRequest, BatchPredictResponse, DEFAULT_HORIZON, IntervalBounds, PredictRequest,
    PredictResponse, Provenance, SimplePredictRequest,
};
pub use whatif::{WhatIfRequest, WhatIfResponse};
