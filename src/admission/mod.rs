//! Per-client admission control.
//!
//! Each resolved client identity gets its own token bucket (a `governor`
//! direct limiter). Buckets live in a `moka` map whose `get_with` makes
//! create-on-first-use atomic, so near-simultaneous first requests from a
//! new client share one bucket. Buckets idle for longer than
//! [`RateLimitConfig::idle_timeout`] are reclaimed by the sweep task.

mod identity;

use std::num::NonZeroU32;
use std::sync::{Arc, Weak};
use std::time::Duration;

use governor::clock::{Clock, DefaultClock};
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter as GovLimiter};
use tokio::task::JoinHandle;

pub use identity::{UNKNOWN_CLIENT, resolve_client_identity};

use crate::{HuginnError, Result, telemetry};

type Bucket = GovLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Token-bucket parameters.
///
/// ```rust
/// # use huginn::RateLimitConfig;
/// let config = RateLimitConfig::new().rate(50.0).burst(100);
/// ```
#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    /// Refill rate in tokens per second. Default: 100.
    pub rate: f64,
    /// Bucket capacity. Default: 200.
    pub burst: u32,
    /// Reclaim buckets untouched for this long. Default: 10 minutes.
    pub idle_timeout: Duration,
    /// How often the sweep task runs. Default: 60s.
    pub sweep_interval: Duration,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            rate: 100.0,
            burst: 200,
            idle_timeout: Duration::from_secs(600),
            sweep_interval: Duration::from_secs(60),
        }
    }
}

impl RateLimitConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rate(mut self, rate: f64) -> Self {
        self.rate = rate;
        self
    }

    pub fn burst(mut self, burst: u32) -> Self {
        self.burst = burst;
        self
    }

    pub fn idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = timeout;
        self
    }

    pub fn sweep_interval(mut self, interval: Duration) -> Self {
        self.sweep_interval = interval;
        self
    }

    fn quota(&self) -> Result<Quota> {
        if !self.rate.is_finite() || self.rate <= 0.0 {
            return Err(HuginnError::Configuration(format!(
                "rate must be a positive number, got {}",
                self.rate
            )));
        }
        let burst = NonZeroU32::new(self.burst)
            .ok_or_else(|| HuginnError::Configuration("burst must be at least 1".into()))?;
        let period = Duration::try_from_secs_f64(1.0 / self.rate).map_err(|_| {
            HuginnError::Configuration(format!("rate {} is too low", self.rate))
        })?;
        let quota = Quota::with_period(period).ok_or_else(|| {
            HuginnError::Configuration(format!("rate {} is too high", self.rate))
        })?;
        Ok(quota.allow_burst(burst))
    }
}

/// Proof that a request was charged against its client's bucket.
///
/// Only [`RateLimiter::admit`] creates one, so a layer that admits early
/// can hand it on without the request being charged twice.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Admitted {
    client: String,
}

impl Admitted {
    pub fn client(&self) -> &str {
        &self.client
    }
}

/// Per-client token-bucket limiter.
pub struct RateLimiter {
    buckets: moka::sync::Cache<String, Arc<Bucket>>,
    quota: Quota,
    clock: DefaultClock,
    config: RateLimitConfig,
}

impl RateLimiter {
    /// Build a limiter; fails only on an invalid rate or burst.
    pub fn new(config: RateLimitConfig) -> Result<Self> {
        let quota = config.quota()?;
        let buckets = moka::sync::Cache::builder()
            .time_to_idle(config.idle_timeout)
            .build();
        Ok(Self {
            buckets,
            quota,
            clock: DefaultClock::default(),
            config,
        })
    }

    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }

    /// Consume one token for `client`. Unknown clients start with a full bucket.
    pub fn allow(&self, client: &str) -> bool {
        self.check(client).is_ok()
    }

    /// Like [`allow`](Self::allow) but returns a `RateLimited` error with a
    /// retry hint on denial.
    pub fn check(&self, client: &str) -> Result<()> {
        let bucket = self.bucket(client);
        bucket.check().map_err(|not_until| {
            metrics::counter!(telemetry::RATE_LIMITED_TOTAL).increment(1);
            tracing::debug!(client, "rate limited");
            HuginnError::RateLimited {
                retry_after: Some(not_until.wait_time_from(self.clock.now())),
            }
        })
    }

    /// [`check`](Self::check), returning an [`Admitted`] token on success.
    pub fn admit(&self, client: &str) -> Result<Admitted> {
        self.check(client)?;
        Ok(Admitted {
            client: client.to_owned(),
        })
    }

    /// Number of client buckets currently held.
    pub fn tracked_clients(&self) -> u64 {
        self.buckets.run_pending_tasks();
        self.buckets.entry_count()
    }

    /// Reclaim buckets past the idle window.
    pub fn sweep(&self) {
        self.buckets.run_pending_tasks();
    }

    /// Run [`sweep`](Self::sweep) every `sweep_interval` until the limiter
    /// is dropped or the handle is aborted.
    pub fn spawn_sweeper(self: &Arc<Self>) -> JoinHandle<()> {
        let limiter: Weak<Self> = Arc::downgrade(self);
        let period = self.config.sweep_interval;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(limiter) = limiter.upgrade() else {
                    break;
                };
                limiter.sweep();
                tracing::trace!(clients = limiter.buckets.entry_count(), "limiter sweep");
            }
        })
    }

    fn bucket(&self, client: &str) -> Arc<Bucket> {
        self.buckets
            .get_with_by_ref(client, || Arc::new(GovLimiter::direct(self.quota)))
    }
}

impl std::fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimiter")
            .field("config", &self.config)
            .field("clients", &self.buckets.entry_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_zero_burst() {
        let err = RateLimiter::new(RateLimitConfig::new().burst(0)).unwrap_err();
        assert!(matches!(err, HuginnError::Configuration(_)));
    }

    #[test]
    fn rejects_non_positive_rate() {
        assert!(RateLimiter::new(RateLimitConfig::new().rate(0.0)).is_err());
        assert!(RateLimiter::new(RateLimitConfig::new().rate(f64::NAN)).is_err());
    }

    #[test]
    fn rejects_rate_too_low_to_represent() {
        let err = RateLimiter::new(RateLimitConfig::new().rate(1e-20)).unwrap_err();
        assert!(matches!(err, HuginnError::Configuration(_)));
    }

    #[test]
    fn admit_names_the_client() {
        let limiter = RateLimiter::new(RateLimitConfig::new().rate(1.0).burst(1)).unwrap();
        assert_eq!(limiter.admit("a").unwrap().client(), "a");
        assert!(limiter.admit("a").is_err());
    }

    #[test]
    fn denial_carries_retry_hint() {
        let limiter = RateLimiter::new(RateLimitConfig::new().rate(1.0).burst(1)).unwrap();
        assert!(limiter.check("a").is_ok());
        match limiter.check("a").unwrap_err() {
            HuginnError::RateLimited { retry_after } => {
                let wait = retry_after.unwrap();
                assert!(wait > Duration::ZERO && wait <= Duration::from_secs(1));
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
