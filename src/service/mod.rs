//! Prediction orchestration.
//!
//! Every prediction goes through the same steps:
//!
//! 1. admission (per-client token bucket), evaluated first so a denial
//!    costs no cache or compute work
//! 2. validation
//! 3. tiered cache lookup (L1, then L2)
//! 4. on a full miss: inference on the blocking pool, then a cache write
//!    before responding
//!
//! A failed computation writes nothing, so the next identical request
//! retries rather than replaying a failure. Concurrent misses for the same
//! key may both compute; the writes are idempotent.

mod builder;

use std::sync::Arc;
use std::time::Instant;

use futures_util::future::join_all;
use serde::Serialize;
use tracing::{debug, error, warn};

pub use builder::ServiceBuilder;

use crate::admission::{Admitted, RateLimiter};
use crate::cache::{CacheKey, CacheMode, CacheStats, CachedPrediction, TieredCache};
use crate::explain::ExplanationClient;
use crate::features::{FeatureSource, FeatureStore, FeatureStoreMetadata};
use crate::inference::Inferencer;
use crate::intervals::PredictionIntervals;
use crate::types::{
    BatchPredictRequest, BatchPredictResponse, ExplainRequest, Explanation, FeatureVector,
    PredictRequest, PredictResponse, Provenance, SimplePredictRequest, WhatIfRequest,
    WhatIfResponse,
};
use crate::validation::{
    at_index, validate_batch_size, validate_date, validate_family, validate_predict,
    validate_store, validate_target,
};
use crate::whatif::apply_adjustments;
use crate::{HuginnError, Result, telemetry};

/// Who a service call is made for.
#[derive(Debug)]
pub enum Caller<'a> {
    /// Charged against this client's bucket as the call starts.
    Client(&'a str),
    /// Already charged by an outer layer.
    Admitted(Admitted),
}

impl<'a> From<&'a str> for Caller<'a> {
    fn from(client: &'a str) -> Self {
        Self::Client(client)
    }
}

impl<'a> From<&'a String> for Caller<'a> {
    fn from(client: &'a String) -> Self {
        Self::Client(client)
    }
}

impl From<Admitted> for Caller<'_> {
    fn from(admitted: Admitted) -> Self {
        Self::Admitted(admitted)
    }
}

/// The request-serving core: admission, cache and inference composed into
/// one "get a prediction" operation.
pub struct PredictionService {
    engine: Option<Arc<dyn Inferencer>>,
    cache: Arc<TieredCache>,
    limiter: Arc<RateLimiter>,
    features: Option<Arc<dyn FeatureStore>>,
    explainer: Option<ExplanationClient>,
    intervals: Option<PredictionIntervals>,
    max_batch_size: usize,
}

/// Overall health.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    /// Serving, but without fresh inference or without the shared cache.
    Degraded,
}

#[derive(Debug, Clone, Serialize)]
pub struct ModelHealth {
    pub loaded: bool,
    pub engine: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CacheHealth {
    #[serde(flatten)]
    pub stats: CacheStats,
    /// `None` when running L1-only.
    pub shared_reachable: Option<bool>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RateLimiterHealth {
    pub tracked_clients: u64,
    pub rate: f64,
    pub burst: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct ExplainerHealth {
    pub base_url: String,
    pub healthy: bool,
}

/// Snapshot reported by `GET /health`.
#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub status: HealthStatus,
    pub version: String,
    pub model: ModelHealth,
    pub cache: CacheHealth,
    pub rate_limiter: RateLimiterHealth,
    pub features: Option<FeatureStoreMetadata>,
    pub explainer: Option<ExplainerHealth>,
}

impl PredictionService {
    pub fn builder() -> ServiceBuilder {
        ServiceBuilder::new()
    }

    pub fn cache(&self) -> &TieredCache {
        &self.cache
    }

    pub fn rate_limiter(&self) -> &Arc<RateLimiter> {
        &self.limiter
    }

    pub fn max_batch_size(&self) -> usize {
        self.max_batch_size
    }

    /// Predict from a caller-supplied feature vector.
    pub async fn predict<'a>(
        &self,
        caller: impl Into<Caller<'a>>,
        request: PredictRequest,
    ) -> Result<PredictResponse> {
        let start = Instant::now();
        let caller = caller.into();
        let result = async {
            self.admit(caller)?;
            let features = validate_predict(&request)?;
            let (prediction, provenance) = self
                .resolve(
                    request.store_nbr,
                    &request.family,
                    &request.date,
                    request.horizon,
                    features,
                )
                .await?;
            Ok(self.respond(
                request.store_nbr,
                request.family,
                request.date,
                request.horizon,
                prediction,
                provenance,
                start,
            ))
        }
        .await;
        record("predict", start, &result);
        result
    }

    /// Predict with features looked up from the feature store.
    ///
    /// Lookup order: exact row, then the (store, family) mean, then zeros.
    pub async fn predict_simple<'a>(
        &self,
        caller: impl Into<Caller<'a>>,
        request: SimplePredictRequest,
    ) -> Result<PredictResponse> {
        let start = Instant::now();
        let caller = caller.into();
        let result = async {
            self.admit(caller)?;
            validate_target(
                request.store_nbr,
                &request.family,
                &request.date,
                request.horizon,
            )?;
            let features = self.stored_features(request.store_nbr, &request.family, &request.date);
            let (prediction, provenance) = self
                .resolve(
                    request.store_nbr,
                    &request.family,
                    &request.date,
                    request.horizon,
                    features,
                )
                .await?;
            Ok(self.respond(
                request.store_nbr,
                request.family,
                request.date,
                request.horizon,
                prediction,
                provenance,
                start,
            ))
        }
        .await;
        record("predict_simple", start, &result);
        result
    }

    /// Predict a batch.
    ///
    /// The batch is admitted as one request. All items are validated before
    /// any cache work; cache lookups run concurrently and every miss is
    /// computed in a single engine call.
    pub async fn predict_batch<'a>(
        &self,
        caller: impl Into<Caller<'a>>,
        request: BatchPredictRequest,
    ) -> Result<BatchPredictResponse> {
        let start = Instant::now();
        let result = self.predict_batch_inner(caller.into(), request, start).await;
        record("predict_batch", start, &result);
        result
    }

    async fn predict_batch_inner(
        &self,
        caller: Caller<'_>,
        request: BatchPredictRequest,
        start: Instant,
    ) -> Result<BatchPredictResponse> {
        self.admit(caller)?;
        validate_batch_size(request.predictions.len(), self.max_batch_size)?;

        let features = request
            .predictions
            .iter()
            .enumerate()
            .map(|(i, item)| validate_predict(item).map_err(|e| at_index(i, e)))
            .collect::<Result<Vec<FeatureVector>>>()?;

        let keys: Vec<CacheKey> = request
            .predictions
            .iter()
            .map(|item| CacheKey::new(item.store_nbr, &item.family, &item.date, item.horizon))
            .collect();

        let lookups = join_all(keys.iter().map(|key| self.cache.get(key))).await;
        let mut resolved: Vec<Option<(f32, Provenance)>> = lookups
            .into_iter()
            .map(|hit| hit.map(|(value, tier)| (value.prediction, tier.into())))
            .collect();

        let misses: Vec<usize> = (0..resolved.len()).filter(|&i| resolved[i].is_none()).collect();
        if !misses.is_empty() {
            let batch: Vec<FeatureVector> = misses.iter().map(|&i| features[i]).collect();
            let (predictions, origin) = self.compute_batch(batch).await?;

            let writes = misses.iter().zip(&predictions).map(|(&i, &prediction)| {
                let item = &request.predictions[i];
                let value = CachedPrediction::computed(
                    item.store_nbr,
                    &item.family,
                    &item.date,
                    item.horizon,
                    prediction,
                    &origin,
                );
                self.cache.put(&keys[i], value)
            });
            join_all(writes).await;

            for (&i, prediction) in misses.iter().zip(predictions) {
                resolved[i] = Some((prediction, Provenance::Computed));
            }
        }

        let predictions = request
            .predictions
            .into_iter()
            .zip(resolved)
            .map(|(item, resolved)| {
                let (prediction, provenance) = resolved.ok_or_else(|| {
                    HuginnError::Internal("batch item left unresolved".into())
                })?;
                Ok(self.respond(
                    item.store_nbr,
                    item.family,
                    item.date,
                    item.horizon,
                    prediction,
                    provenance,
                    start,
                ))
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(BatchPredictResponse {
            predictions,
            latency_ms: elapsed_ms(start),
        })
    }

    /// Ask the explanation service to explain a prediction.
    pub async fn explain<'a>(
        &self,
        caller: impl Into<Caller<'a>>,
        request: ExplainRequest,
    ) -> Result<Explanation> {
        let start = Instant::now();
        let caller = caller.into();
        let result = async {
            self.admit(caller)?;
            validate_store(request.store_nbr)?;
            validate_family(&request.family)?;
            validate_date(&request.date)?;
            let explainer = self.explainer.as_ref().ok_or_else(|| {
                HuginnError::CollaboratorUnavailable("explanation service not configured".into())
            })?;
            let features = self.stored_features(request.store_nbr, &request.family, &request.date);
            explainer
                .explain(request.store_nbr, &request.family, &request.date, &features)
                .await
        }
        .await;
        record("explain", start, &result);
        result
    }

    /// Predict for the stored baseline features and for an adjusted copy.
    ///
    /// Both vectors go through the engine in one call. Nothing is read from
    /// or written to the cache: the adjusted vector has no cache key.
    pub async fn what_if<'a>(
        &self,
        caller: impl Into<Caller<'a>>,
        request: WhatIfRequest,
    ) -> Result<WhatIfResponse> {
        let start = Instant::now();
        let caller = caller.into();
        let result = async {
            self.admit(caller)?;
            validate_target(
                request.store_nbr,
                &request.family,
                &request.date,
                request.horizon,
            )?;
            let base = self.stored_features(request.store_nbr, &request.family, &request.date);
            let adjusted = apply_adjustments(&base, &request.adjustments)?;

            let (predictions, _) = self.compute_batch(vec![base, adjusted.features]).await?;
            let &[original, changed] = predictions.as_slice() else {
                return Err(HuginnError::Internal("expected two predictions".into()));
            };
            let delta = changed - original;
            let delta_pct = if original == 0.0 {
                0.0
            } else {
                delta / original * 100.0
            };
            Ok(WhatIfResponse {
                original,
                adjusted: changed,
                delta,
                delta_pct,
                applied: adjusted.applied,
                ignored: adjusted.ignored,
                latency_ms: elapsed_ms(start),
            })
        }
        .await;
        record("what_if", start, &result);
        result
    }

    pub async fn health(&self) -> HealthReport {
        let model = ModelHealth {
            loaded: self.engine.as_ref().is_some_and(|e| e.is_loaded()),
            engine: self.engine.as_ref().map(|e| e.name().to_owned()),
        };
        let cache = CacheHealth {
            stats: self.cache.stats(),
            shared_reachable: self.cache.ping_shared().await,
        };
        let limiter = self.limiter.config();
        let rate_limiter = RateLimiterHealth {
            tracked_clients: self.limiter.tracked_clients(),
            rate: limiter.rate,
            burst: limiter.burst,
        };
        let explainer = match &self.explainer {
            Some(client) => Some(ExplainerHealth {
                base_url: client.base_url().to_owned(),
                healthy: match client.health().await {
                    Ok(healthy) => healthy,
                    Err(e) => {
                        metrics::counter!(telemetry::EXPLAIN_ERRORS_TOTAL, "call" => "health")
                            .increment(1);
                        warn!(error = %e, "explanation service health check failed");
                        false
                    }
                },
            }),
            None => None,
        };

        let status = if model.loaded && cache.stats.mode == CacheMode::Tiered {
            HealthStatus::Healthy
        } else {
            HealthStatus::Degraded
        };

        HealthReport {
            status,
            version: crate::version_string(),
            model,
            cache,
            rate_limiter,
            features: self.features.as_ref().map(|f| f.metadata()),
            explainer,
        }
    }

    /// Operator action: retry the shared cache connection.
    pub async fn reconnect_cache(&self) -> CacheMode {
        self.cache.reconnect().await
    }

    /// Operator action: reload the feature store from its source.
    pub async fn reload_features(&self) -> Result<FeatureStoreMetadata> {
        let store = self
            .features
            .clone()
            .ok_or_else(|| HuginnError::Configuration("no feature store configured".into()))?;
        tokio::task::spawn_blocking(move || store.reload())
            .await
            .map_err(|e| HuginnError::Internal(format!("reload task failed: {e}")))?
    }

    /// Release the inference engine. Cached predictions remain servable.
    pub fn shutdown(&self) {
        if let Some(engine) = &self.engine {
            engine.close();
        }
    }

    fn admit(&self, caller: Caller<'_>) -> Result<()> {
        match caller {
            Caller::Client(client) => self.limiter.check(client),
            Caller::Admitted(_) => Ok(()),
        }
    }

    fn stored_features(&self, store_nbr: i32, family: &str, date: &str) -> FeatureVector {
        let lookup = self
            .features
            .as_ref()
            .and_then(|store| store.lookup(store_nbr, family, date));
        match lookup {
            Some(found) => {
                if found.source == FeatureSource::Aggregated {
                    metrics::counter!(telemetry::FEATURE_FALLBACKS_TOTAL, "fallback" => "aggregated")
                        .increment(1);
                    debug!(store_nbr, family, date, "using aggregated features");
                }
                found.features
            }
            None => {
                metrics::counter!(telemetry::FEATURE_FALLBACKS_TOTAL, "fallback" => "zeros")
                    .increment(1);
                debug!(store_nbr, family, date, "no stored features, using zeros");
                FeatureVector::zeros()
            }
        }
    }

    /// Cache lookup, then compute-and-write on a full miss.
    async fn resolve(
        &self,
        store_nbr: i32,
        family: &str,
        date: &str,
        horizon: i32,
        features: FeatureVector,
    ) -> Result<(f32, Provenance)> {
        let key = CacheKey::new(store_nbr, family, date, horizon);
        if let Some((value, tier)) = self.cache.get(&key).await {
            return Ok((value.prediction, tier.into()));
        }

        let (prediction, origin) = self.compute(features).await?;
        let value =
            CachedPrediction::computed(store_nbr, family, date, horizon, prediction, &origin);
        self.cache.put(&key, value).await;
        Ok((prediction, Provenance::Computed))
    }

    fn engine(&self) -> Result<Arc<dyn Inferencer>> {
        self.engine
            .clone()
            .ok_or_else(|| HuginnError::ModelUnavailable("no model loaded".into()))
    }

    async fn compute(&self, features: FeatureVector) -> Result<(f32, String)> {
        let engine = self.engine()?;
        let origin = engine.name().to_owned();
        let start = Instant::now();
        let result = tokio::task::spawn_blocking(move || engine.predict(features.as_slice()))
            .await
            .map_err(|e| HuginnError::Internal(format!("inference task failed: {e}")))?;
        observe_inference(start, &result);
        Ok((result?, origin))
    }

    async fn compute_batch(&self, batch: Vec<FeatureVector>) -> Result<(Vec<f32>, String)> {
        let engine = self.engine()?;
        let origin = engine.name().to_owned();
        let expected = batch.len();
        let start = Instant::now();
        let result = tokio::task::spawn_blocking(move || engine.predict_batch(&batch))
            .await
            .map_err(|e| HuginnError::Internal(format!("inference task failed: {e}")))?;
        observe_inference(start, &result);
        let predictions = result?;
        if predictions.len() != expected {
            return Err(HuginnError::ComputeFailed(format!(
                "engine returned {} predictions for {expected} inputs",
                predictions.len()
            )));
        }
        Ok((predictions, origin))
    }

    #[allow(clippy::too_many_arguments)]
    fn respond(
        &self,
        store_nbr: i32,
        family: String,
        date: String,
        horizon: i32,
        prediction: f32,
        provenance: Provenance,
        start: Instant,
    ) -> PredictResponse {
        PredictResponse {
            store_nbr,
            family,
            date,
            horizon,
            prediction,
            intervals: self.intervals.map(|i| i.apply(prediction)),
            provenance,
            cached: provenance.is_cached(),
            latency_ms: elapsed_ms(start),
        }
    }
}

impl std::fmt::Debug for PredictionService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PredictionService")
            .field("engine", &self.engine.as_ref().map(|e| e.name().to_owned()))
            .field("cache", &self.cache)
            .field("limiter", &self.limiter)
            .field("max_batch_size", &self.max_batch_size)
            .finish_non_exhaustive()
    }
}

fn elapsed_ms(start: Instant) -> f64 {
    start.elapsed().as_secs_f64() * 1000.0
}

fn observe_inference<T>(start: Instant, result: &Result<T>) {
    metrics::histogram!(telemetry::INFERENCE_DURATION_SECONDS)
        .record(start.elapsed().as_secs_f64());
    if let Err(e) = result {
        metrics::counter!(telemetry::INFERENCE_ERRORS_TOTAL).increment(1);
        match e {
            HuginnError::ModelUnavailable(_) => warn!(error = %e, "inference unavailable"),
            _ => error!(error = %e, "inference failed"),
        }
    }
}

fn record<T>(operation: &'static str, start: Instant, result: &Result<T>) {
    let status = match result {
        Ok(_) => "ok",
        Err(e) => e.code(),
    };
    metrics::counter!(telemetry::REQUESTS_TOTAL, "operation" => operation, "status" => status)
        .increment(1);
    metrics::histogram!(telemetry::REQUEST_DURATION_SECONDS, "operation" => operation)
        .record(start.elapsed().as_secs_f64());
}
