//! Builder for [`PredictionService`].

use std::sync::Arc;

use super::PredictionService;
use crate::Result;
use crate::admission::{RateLimitConfig, RateLimiter};
use crate::cache::{CacheConfig, TieredCache};
use crate::explain::ExplanationClient;
use crate::features::FeatureStore;
use crate::inference::Inferencer;
use crate::intervals::PredictionIntervals;
use crate::validation::DEFAULT_MAX_BATCH_SIZE;

/// Builder for configuring a prediction service.
///
/// Every component is optional. Without an engine the service answers
/// from cache only; without a cache it uses an L1-only cache with default
/// settings; without a limiter it builds one from the default
/// [`RateLimitConfig`].
///
/// ```rust,no_run
/// # use std::sync::Arc;
/// # use huginn::{CacheConfig, PredictionService, TieredCache};
/// # fn demo() -> huginn::Result<()> {
/// let service = PredictionService::builder()
///     .cache(TieredCache::local_only(CacheConfig::new().l1_capacity(1_000)))
///     .max_batch_size(50)
///     .build()?;
/// # Ok(())
/// # }
/// ```
#[derive(Default)]
pub struct ServiceBuilder {
    engine: Option<Arc<dyn Inferencer>>,
    cache: Option<Arc<TieredCache>>,
    limiter: Option<Arc<RateLimiter>>,
    rate_limit: Option<RateLimitConfig>,
    features: Option<Arc<dyn FeatureStore>>,
    explainer: Option<ExplanationClient>,
    intervals: Option<PredictionIntervals>,
    max_batch_size: Option<usize>,
}

impl ServiceBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inference engine. Leave unset to run in cache-only mode.
    pub fn engine(mut self, engine: Arc<dyn Inferencer>) -> Self {
        self.engine = Some(engine);
        self
    }

    pub fn cache(mut self, cache: TieredCache) -> Self {
        self.cache = Some(Arc::new(cache));
        self
    }

    /// Share an existing limiter (e.g. one whose sweep task is already running).
    pub fn rate_limiter(mut self, limiter: Arc<RateLimiter>) -> Self {
        self.limiter = Some(limiter);
        self
    }

    /// Limiter settings, used when no limiter is supplied.
    pub fn rate_limit(mut self, config: RateLimitConfig) -> Self {
        self.rate_limit = Some(config);
        self
    }

    pub fn feature_store(mut self, store: Arc<dyn FeatureStore>) -> Self {
        self.features = Some(store);
        self
    }

    pub fn explainer(mut self, client: ExplanationClient) -> Self {
        self.explainer = Some(client);
        self
    }

    pub fn intervals(mut self, intervals: PredictionIntervals) -> Self {
        self.intervals = Some(intervals);
        self
    }

    /// Upper bound on batch size. Default: 100.
    pub fn max_batch_size(mut self, n: usize) -> Self {
        self.max_batch_size = Some(n);
        self
    }

    /// Fails only when the rate-limit settings are invalid.
    pub fn build(self) -> Result<PredictionService> {
        let limiter = match self.limiter {
            Some(limiter) => limiter,
            None => Arc::new(RateLimiter::new(self.rate_limit.unwrap_or_default())?),
        };
        let cache = self
            .cache
            .unwrap_or_else(|| Arc::new(TieredCache::local_only(CacheConfig::default())));

        if self.engine.is_none() {
            tracing::warn!("no inference engine configured, serving cached predictions only");
        }

        Ok(PredictionService {
            engine: self.engine,
            cache,
            limiter,
            features: self.features,
            explainer: self.explainer,
            intervals: self.intervals,
            max_batch_size: self.max_batch_size.unwrap_or(DEFAULT_MAX_BATCH_SIZE),
        })
    }
}
