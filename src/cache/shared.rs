//! Shared (L2) cache tier.
//!
//! [`SharedStore`] abstracts the external key/value store so the tiered
//! cache can be tested without one. [`RedisStore`] is the production
//! backend (requires the `redis` feature).

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::Result;

/// External key/value store with native per-key expiry.
#[async_trait]
pub trait SharedStore: Send + Sync {
    /// Backend name for logs.
    fn name(&self) -> &str;

    /// Fetch raw bytes; `Ok(None)` is a miss.
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Store raw bytes with a time-to-live.
    async fn set(&self, key: &str, value: &[u8], ttl: Duration) -> Result<()>;

    /// Round-trip check used for health reporting.
    async fn ping(&self) -> Result<()>;
}

/// Opens connections to a [`SharedStore`].
///
/// The tiered cache calls this once at construction and again only on an
/// explicit [`reconnect`](super::TieredCache::reconnect).
#[async_trait]
pub trait SharedStoreConnector: Send + Sync {
    async fn connect(&self) -> Result<Arc<dyn SharedStore>>;
}

#[cfg(feature = "redis")]
pub use self::redis_store::{RedisConnector, RedisStore};

#[cfg(feature = "redis")]
mod redis_store {
    use std::sync::Arc;
    use std::time::Duration;

    use async_trait::async_trait;
    use redis::AsyncCommands;
    use redis::aio::ConnectionManager;

    use super::{SharedStore, SharedStoreConnector};
    use crate::{HuginnError, Result};

    fn unavailable(e: redis::RedisError) -> HuginnError {
        HuginnError::CacheUnavailable(e.to_string())
    }

    /// Redis-backed shared tier.
    ///
    /// `ConnectionManager` multiplexes one connection and reconnects in the
    /// background, so each operation works on a cheap clone.
    #[derive(Clone)]
    pub struct RedisStore {
        conn: ConnectionManager,
    }

    impl RedisStore {
        pub fn new(conn: ConnectionManager) -> Self {
            Self { conn }
        }
    }

    #[async_trait]
    impl SharedStore for RedisStore {
        fn name(&self) -> &str {
            "redis"
        }

        async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
            let mut conn = self.conn.clone();
            conn.get::<_, Option<Vec<u8>>>(key)
                .await
                .map_err(unavailable)
        }

        async fn set(&self, key: &str, value: &[u8], ttl: Duration) -> Result<()> {
            let mut conn = self.conn.clone();
            let seconds = ttl.as_secs().max(1);
            conn.set_ex::<_, _, ()>(key, value, seconds)
                .await
                .map_err(unavailable)
        }

        async fn ping(&self) -> Result<()> {
            let mut conn = self.conn.clone();
            let _: String = redis::cmd("PING")
                .query_async(&mut conn)
                .await
                .map_err(unavailable)?;
            Ok(())
        }
    }

    /// Connects to Redis from a `redis://` URL.
    #[derive(Debug, Clone)]
    pub struct RedisConnector {
        url: String,
        connect_timeout: Duration,
    }

    impl RedisConnector {
        pub fn new(url: impl Into<String>) -> Self {
            Self {
                url: url.into(),
                connect_timeout: Duration::from_secs(5),
            }
        }

        /// Bound on connection setup including the initial PING. Default: 5s.
        pub fn connect_timeout(mut self, timeout: Duration) -> Self {
            self.connect_timeout = timeout;
            self
        }
    }

    #[async_trait]
    impl SharedStoreConnector for RedisConnector {
        async fn connect(&self) -> Result<Arc<dyn SharedStore>> {
            let client = redis::Client::open(self.url.as_str())
                .map_err(|e| HuginnError::Configuration(format!("invalid redis URL: {e}")))?;

            let attempt = async {
                let conn = ConnectionManager::new(client).await.map_err(unavailable)?;
                let store = RedisStore::new(conn);
                store.ping().await?;
                Ok::<_, HuginnError>(store)
            };

            let store = tokio::time::timeout(self.connect_timeout, attempt)
                .await
                .map_err(|_| {
                    HuginnError::CacheUnavailable(format!(
                        "connect timed out after {:?}",
                        self.connect_timeout
                    ))
                })??;

            tracing::info!("connected to redis");
            Ok(Arc::new(store))
        }
    }
}
