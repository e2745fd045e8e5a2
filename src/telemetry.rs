//! Telemetry metric name constants.
//!
//! Centralised metric names for huginn operations. Consumers install
//! their own `metrics` recorder (e.g. prometheus, statsd); without a
//! recorder installed, all metric calls are no-ops.
//!
//! # Metric naming conventions
//!
//! All metrics are prefixed with `huginn_`. Counters end in `_total`,
//! histograms use meaningful units (e.g. `_seconds`).
//!
//! # Common labels
//!
//! - `operation` — entry point invoked ("predict", "predict_simple", "predict_batch", "explain", "what_if")
//! - `status` — outcome: "ok" or the error code
//! - `tier` — cache tier that answered: "l1" or "l2"
//! - `op` — shared-store operation: "get" or "set"

/// Total requests handled by the prediction service.
///
/// Labels: `operation`, `status`.
pub const REQUESTS_TOTAL: &str = "huginn_requests_total";

/// End-to-end request duration in seconds (admission through response).
///
/// Labels: `operation`.
pub const REQUEST_DURATION_SECONDS: &str = "huginn_request_duration_seconds";

/// Total cache hits.
///
/// Labels: `tier`.
pub const CACHE_HITS_TOTAL: &str = "huginn_cache_hits_total";

/// Total lookups that missed both tiers.
pub const CACHE_MISSES_TOTAL: &str = "huginn_cache_misses_total";

/// Shared-tier failures absorbed by the tiered cache (errors and timeouts).
///
/// Labels: `op`.
pub const CACHE_L2_ERRORS_TOTAL: &str = "huginn_cache_l2_errors_total";

/// Requests denied by admission control.
pub const RATE_LIMITED_TOTAL: &str = "huginn_rate_limited_total";

/// Time spent inside the inference engine, including lock wait, in seconds.
pub const INFERENCE_DURATION_SECONDS: &str = "huginn_inference_duration_seconds";

/// Failed inference calls.
pub const INFERENCE_ERRORS_TOTAL: &str = "huginn_inference_errors_total";

/// Failed calls to the explanation service.
///
/// Labels: `call` ("explain" | "health").
pub const EXPLAIN_ERRORS_TOTAL: &str = "huginn_explain_errors_total";

/// Simple predictions that fell back to aggregated or zero features.
///
/// Labels: `fallback` ("aggregated" | "zeros").
pub const FEATURE_FALLBACKS_TOTAL: &str = "huginn_feature_fallbacks_total";
