//! Huginn - low-latency forecast serving core
//!
//! This crate wraps an opaque "feature vector in, prediction out" model with
//! the machinery needed to serve it under load:
//!
//! - an [`Inferencer`] seam over a non-reentrant engine ([`OnnxEngine`]
//!   with the `onnx` feature), called through one exclusive-access boundary
//! - a [`TieredCache`]: process-local LRU in front of a shared store
//!   (Redis with the `redis` feature), degrading to L1-only when the shared
//!   store is unreachable
//! - per-client token-bucket admission control ([`RateLimiter`])
//! - a [`PredictionService`] composing the three into one operation
//!
//! The `server` feature adds an axum HTTP surface and the `huginnd` daemon.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use huginn::{CacheConfig, PredictionService, PredictRequest, TieredCache};
//!
//! # async fn demo(engine: Arc<dyn huginn::Inferencer>) -> huginn::Result<()> {
//! let service = PredictionService::builder()
//!     .engine(engine)
//!     .cache(TieredCache::local_only(CacheConfig::new()))
//!     .build()?;
//!
//! let response = service
//!     .predict(
//!         "10.0.0.1",
//!         PredictRequest {
//!             store_nbr: 1,
//!             family: "GROCERY I".into(),
//!             date: "2017-08-01".into(),
//!             features: vec![0.0; huginn::NUM_FEATURES],
//!             horizon: 90,
//!         },
//!     )
//!     .await?;
//!
//! println!("{} ({:?})", response.prediction, response.provenance);
//! # Ok(())
//! # }
//! ```

pub mod admission;
pub mod cache;
pub mod error;
pub mod explain;
pub mod features;
pub mod inference;
pub mod intervals;
#[cfg(feature = "server")]
pub mod server;
pub mod service;
pub mod telemetry;
pub mod types;
pub mod validation;
pub mod version;
pub mod whatif;

// Re-export main types at crate root
pub use admission::{Admitted, RateLimitConfig, RateLimiter, resolve_client_identity};
pub use cache::{
    CacheConfig, CacheKey, CacheMode, CacheStats, CacheTier, CachedPrediction, SharedStore,
    SharedStoreConnector, TieredCache,
};
#[cfg(feature = "redis")]
pub use cache::{RedisConnector, RedisStore};
pub use error::{HuginnError, Result};
pub use explain::{ExplainerConfig, ExplanationClient};
pub use features::{FeatureLookup, FeatureSource, FeatureStore, FeatureStoreMetadata, FileFeatureStore};
#[cfg(feature = "onnx")]
pub use inference::OnnxEngine;
pub use inference::{Device, Inferencer, ModelConfig};
pub use intervals::PredictionIntervals;
pub use service::{Caller, HealthReport, HealthStatus, PredictionService, ServiceBuilder};
pub use version::{BuildInfo, version_string};

pub use types::{
    BatchPredictRequest, BatchPredictResponse, Direction, ExplainRequest, Explanation,
    FEATURE_NAMES, FeatureContribution, FeatureVector, IntervalBounds, NUM_FEATURES,
    PredictRequest, PredictResponse, Provenance, SimplePredictRequest, WhatIfRequest,
    WhatIfResponse,
};
