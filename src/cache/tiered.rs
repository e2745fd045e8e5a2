//! Two-tier cache facade.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;
use serde::Serialize;
use tracing::{debug, info, warn};

use super::local::LocalCache;
use super::shared::{SharedStore, SharedStoreConnector};
use super::{CacheConfig, CacheKey, CachedPrediction};
use crate::telemetry;
use crate::types::Provenance;

/// Tier that answered a lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheTier {
    L1,
    L2,
}

impl CacheTier {
    fn label(self) -> &'static str {
        match self {
            Self::L1 => "l1",
            Self::L2 => "l2",
        }
    }
}

impl From<CacheTier> for Provenance {
    fn from(tier: CacheTier) -> Self {
        match tier {
            CacheTier::L1 => Provenance::L1,
            CacheTier::L2 => Provenance::L2,
        }
    }
}

/// Whether a shared tier is attached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheMode {
    Tiered,
    LocalOnly,
}

/// Point-in-time cache counters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub mode: CacheMode,
    pub l1_entries: usize,
    pub l1_capacity: usize,
    pub lookups: u64,
    pub l1_hits: u64,
    pub l2_hits: u64,
    pub misses: u64,
    pub l2_errors: u64,
}

#[derive(Default)]
struct Counters {
    lookups: AtomicU64,
    l1_hits: AtomicU64,
    l2_hits: AtomicU64,
    misses: AtomicU64,
    l2_errors: AtomicU64,
}

/// L1 (process-local LRU) in front of an optional L2 (shared store).
///
/// The L2 mode is decided once, in [`connect`](Self::connect). If the
/// shared store cannot be reached then, the cache runs L1-only and never
/// retries on the request path; [`reconnect`](Self::reconnect) is the
/// operator hook to try again.
///
/// L2 failures never surface to callers: a failed or slow L2 read is a
/// miss, a failed L2 write leaves the value in L1 only. Each absorbed
/// failure logs a warning and bumps `huginn_cache_l2_errors_total`.
pub struct TieredCache {
    local: LocalCache,
    shared: RwLock<Option<Arc<dyn SharedStore>>>,
    connector: Option<Arc<dyn SharedStoreConnector>>,
    config: CacheConfig,
    counters: Counters,
}

impl TieredCache {
    /// Build the cache, attaching L2 if `connector` succeeds.
    ///
    /// Never fails: an unreachable L2 yields an L1-only cache.
    pub async fn connect(
        config: CacheConfig,
        connector: Option<Arc<dyn SharedStoreConnector>>,
    ) -> Self {
        let cache = Self {
            local: LocalCache::new(config.l1_capacity),
            shared: RwLock::new(None),
            connector,
            config,
            counters: Counters::default(),
        };
        cache.reconnect().await;
        cache
    }

    /// L1-only cache with no connector.
    pub fn local_only(config: CacheConfig) -> Self {
        Self {
            local: LocalCache::new(config.l1_capacity),
            shared: RwLock::new(None),
            connector: None,
            config,
            counters: Counters::default(),
        }
    }

    /// Re-attempt the L2 connection.
    ///
    /// On failure the previous L2 handle (if any) is kept. Returns the
    /// resulting mode.
    pub async fn reconnect(&self) -> CacheMode {
        let Some(connector) = &self.connector else {
            info!("no shared cache configured, running L1-only");
            return self.mode();
        };
        match connector.connect().await {
            Ok(store) => {
                info!(backend = store.name(), "shared cache attached");
                *self.shared.write() = Some(store);
            }
            Err(e) => {
                warn!(error = %e, "shared cache unreachable, running L1-only");
                metrics::counter!(telemetry::CACHE_L2_ERRORS_TOTAL, "op" => "connect")
                    .increment(1);
            }
        }
        self.mode()
    }

    pub fn mode(&self) -> CacheMode {
        if self.shared.read().is_some() {
            CacheMode::Tiered
        } else {
            CacheMode::LocalOnly
        }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Look up `key`, L1 first, then L2.
    ///
    /// An L2 hit is copied into L1 with whatever TTL it has left.
    pub async fn get(&self, key: &CacheKey) -> Option<(CachedPrediction, CacheTier)> {
        self.counters.lookups.fetch_add(1, Ordering::Relaxed);

        if let Some(value) = self.local.get(key.as_str()) {
            return Some(self.hit(key, value, CacheTier::L1));
        }

        let shared = self.shared.read().clone();
        if let Some(store) = shared
            && let Some(value) = self.get_shared(store.as_ref(), key).await
        {
            return Some(self.hit(key, value, CacheTier::L2));
        }

        self.counters.misses.fetch_add(1, Ordering::Relaxed);
        metrics::counter!(telemetry::CACHE_MISSES_TOTAL).increment(1);
        debug!(key = %key, "cache miss");
        None
    }

    /// Write `value` to L2 (best effort), then L1.
    pub async fn put(&self, key: &CacheKey, value: CachedPrediction) {
        let shared = self.shared.read().clone();
        if let Some(store) = shared {
            self.put_shared(store.as_ref(), key, &value).await;
        }
        self.local.put(key.as_str(), value, self.config.ttl);
    }

    /// Whether L1 currently holds `key` (expired or not).
    pub fn contains_local(&self, key: &CacheKey) -> bool {
        self.local.contains(key.as_str())
    }

    /// Drop every L1 entry. L2 is left alone.
    pub fn clear_local(&self) {
        self.local.clear();
    }

    /// Ping L2. `None` when running L1-only.
    pub async fn ping_shared(&self) -> Option<bool> {
        let store = self.shared.read().clone()?;
        let result = tokio::time::timeout(self.config.l2_timeout, store.ping()).await;
        Some(matches!(result, Ok(Ok(()))))
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            mode: self.mode(),
            l1_entries: self.local.len(),
            l1_capacity: self.local.capacity(),
            lookups: self.counters.lookups.load(Ordering::Relaxed),
            l1_hits: self.counters.l1_hits.load(Ordering::Relaxed),
            l2_hits: self.counters.l2_hits.load(Ordering::Relaxed),
            misses: self.counters.misses.load(Ordering::Relaxed),
            l2_errors: self.counters.l2_errors.load(Ordering::Relaxed),
        }
    }

    fn hit(
        &self,
        key: &CacheKey,
        value: CachedPrediction,
        tier: CacheTier,
    ) -> (CachedPrediction, CacheTier) {
        let counter = match tier {
            CacheTier::L1 => &self.counters.l1_hits,
            CacheTier::L2 => &self.counters.l2_hits,
        };
        counter.fetch_add(1, Ordering::Relaxed);
        metrics::counter!(telemetry::CACHE_HITS_TOTAL, "tier" => tier.label()).increment(1);
        debug!(key = %key, tier = tier.label(), "cache hit");
        (value, tier)
    }

    async fn get_shared(&self, store: &dyn SharedStore, key: &CacheKey) -> Option<CachedPrediction> {
        let bytes = match tokio::time::timeout(self.config.l2_timeout, store.get(key.as_str())).await
        {
            Ok(Ok(Some(bytes))) => bytes,
            Ok(Ok(None)) => return None,
            Ok(Err(e)) => {
                self.l2_error("get", key, &e);
                return None;
            }
            Err(_) => {
                self.l2_error("get", key, &format!("timed out after {:?}", self.config.l2_timeout));
                return None;
            }
        };

        let value: CachedPrediction = match serde_json::from_slice(&bytes) {
            Ok(value) => value,
            Err(e) => {
                self.l2_error("decode", key, &e);
                return None;
            }
        };

        let remaining = value.remaining_ttl(self.config.ttl)?;
        self.local.put(key.as_str(), value.clone(), remaining);
        Some(value)
    }

    async fn put_shared(&self, store: &dyn SharedStore, key: &CacheKey, value: &CachedPrediction) {
        let bytes = match serde_json::to_vec(value) {
            Ok(bytes) => bytes,
            Err(e) => {
                self.l2_error("encode", key, &e);
                return;
            }
        };
        let write = store.set(key.as_str(), &bytes, self.config.ttl);
        match tokio::time::timeout(self.config.l2_timeout, write).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => self.l2_error("set", key, &e),
            Err(_) => {
                self.l2_error("set", key, &format!("timed out after {:?}", self.config.l2_timeout))
            }
        }
    }

    fn l2_error(&self, op: &'static str, key: &CacheKey, error: &dyn std::fmt::Display) {
        self.counters.l2_errors.fetch_add(1, Ordering::Relaxed);
        metrics::counter!(telemetry::CACHE_L2_ERRORS_TOTAL, "op" => op).increment(1);
        warn!(op, key = %key, error = %error, "shared cache operation failed");
    }
}

impl std::fmt::Debug for TieredCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TieredCache")
            .field("mode", &self.mode())
            .field("l1_entries", &self.local.len())
            .field("config", &self.config)
            .finish()
    }
}

