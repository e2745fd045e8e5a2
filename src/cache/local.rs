//! Process-local LRU tier.

use std::num::NonZeroUsize;
use std::time::Duration;

use lru::LruCache;
use parking_lot::Mutex;
use tokio::time::Instant;

use super::CachedPrediction;

struct LocalEntry {
    value: CachedPrediction,
    expires_at: Instant,
}

/// Bounded LRU map with per-entry expiry.
///
/// Reads mutate recency, so every access takes the lock exclusively.
/// Expired entries are dropped when a read finds them; capacity eviction
/// bounds memory otherwise.
pub struct LocalCache {
    entries: Mutex<LruCache<String, LocalEntry>>,
    capacity: usize,
}

impl LocalCache {
    /// A capacity of zero is treated as one.
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
            capacity: capacity.get(),
        }
    }

    pub fn get(&self, key: &str) -> Option<CachedPrediction> {
        let mut entries = self.entries.lock();
        let expired = match entries.get(key) {
            Some(entry) if Instant::now() < entry.expires_at => return Some(entry.value.clone()),
            Some(_) => true,
            None => false,
        };
        if expired {
            entries.pop(key);
        }
        None
    }

    /// Insert or replace. Evicts the least-recently-used entry when full.
    pub fn put(&self, key: &str, value: CachedPrediction, ttl: Duration) {
        let entry = LocalEntry {
            value,
            expires_at: expiry(ttl),
        };
        self.entries.lock().put(key.to_owned(), entry);
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.lock().contains(key)
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn clear(&self) {
        self.entries.lock().clear();
    }
}

/// `now + ttl`, saturating to roughly thirty years for TTLs past the clock's range.
fn expiry(ttl: Duration) -> Instant {
    let now = Instant::now();
    now.checked_add(ttl)
        .or_else(|| now.checked_add(FAR_FUTURE))
        .unwrap_or(now)
}

const FAR_FUTURE: Duration = Duration::from_secs(30 * 365 * 24 * 60 * 60);
