//! Prediction cache.
//!
//! - [`CacheKey`]: versioned key derived from (store, family, date, horizon).
//! - [`TieredCache`]: process-local LRU (L1) in front of an optional shared
//!   store (L2). See its docs for degradation rules.
//! - [`SharedStore`]: the L2 seam; [`RedisStore`] with the `redis` feature.

mod key;
mod local;
pub mod shared;
mod tiered;

use std::time::Duration;

use serde::{Deserialize, Serialize};

pub use key::{CacheKey, KEY_VERSION};
pub use local::LocalCache;
#[cfg(feature = "redis")]
pub use shared::{RedisConnector, RedisStore};
pub use shared::{SharedStore, SharedStoreConnector};
pub use tiered::{CacheMode, CacheStats, CacheTier, TieredCache};

/// Configuration for the tiered cache.
///
/// ```rust
/// # use huginn::CacheConfig;
/// # use std::time::Duration;
/// let config = CacheConfig::new()
///     .l1_capacity(10_000)
///     .ttl(Duration::from_secs(3600));
/// ```
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Maximum number of L1 entries. Default: 10,000.
    pub l1_capacity: usize,
    /// Entry time-to-live in both tiers. Default: 1 hour.
    pub ttl: Duration,
    /// Bound on each L2 round trip. Default: 50ms.
    pub l2_timeout: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            l1_capacity: 10_000,
            ttl: Duration::from_secs(3600),
            l2_timeout: Duration::from_millis(50),
        }
    }
}

impl CacheConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn l1_capacity(mut self, n: usize) -> Self {
        self.l1_capacity = n;
        self
    }

    pub fn ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn l2_timeout(mut self, timeout: Duration) -> Self {
        self.l2_timeout = timeout;
        self
    }
}

/// Cached prediction value. Serialized as JSON in L2.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedPrediction {
    pub store_nbr: i32,
    pub family: String,
    pub date: String,
    pub horizon: i32,
    pub prediction: f32,
    /// Name of the engine that computed the value.
    pub origin: String,
    /// Unix epoch milliseconds at write time.
    pub cached_at_ms: i64,
}

impl CachedPrediction {
    /// Stamp a freshly computed value with the current time.
    pub fn computed(
        store_nbr: i32,
        family: &str,
        date: &str,
        horizon: i32,
        prediction: f32,
        origin: &str,
    ) -> Self {
        Self {
            store_nbr,
            family: family.to_owned(),
            date: date.to_owned(),
            horizon,
            prediction,
            origin: origin.to_owned(),
            cached_at_ms: chrono::Utc::now().timestamp_millis(),
        }
    }

    /// TTL left for this entry out of `ttl`; `None` once expired.
    pub fn remaining_ttl(&self, ttl: Duration) -> Option<Duration> {
        let age_ms = chrono::Utc::now()
            .timestamp_millis()
            .saturating_sub(self.cached_at_ms)
            .max(0);
        ttl.checked_sub(Duration::from_millis(age_ms as u64))
            .filter(|left| !left.is_zero())
    }
}
