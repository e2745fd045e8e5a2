//! Tests for per-client admission control.
//!
//! The limiter runs on the real clock, so these use a slow refill rate
//! (one token per second) to keep bursts deterministic.

use std::sync::Arc;
use std::time::Duration;

use huginn::{HuginnError, RateLimitConfig, RateLimiter};

fn limiter(burst: u32) -> RateLimiter {
    RateLimiter::new(RateLimitConfig::new().rate(1.0).burst(burst)).unwrap()
}

#[test]
fn burst_plus_one_is_rejected() {
    let limiter = limiter(5);
    for i in 0..5 {
        assert!(limiter.check("10.0.0.1").is_ok(), "request {i} should be admitted");
    }
    let err = limiter.check("10.0.0.1").unwrap_err();
    assert!(matches!(err, HuginnError::RateLimited { retry_after: Some(_) }));
}

#[test]
fn distinct_clients_have_distinct_buckets() {
    let limiter = limiter(2);
    assert!(limiter.allow("a"));
    assert!(limiter.allow("a"));
    assert!(!limiter.allow("a"));

    // "b" is untouched by "a" draining its bucket
    assert!(limiter.allow("b"));
    assert!(limiter.allow("b"));
    assert!(!limiter.allow("b"));
    assert_eq!(limiter.tracked_clients(), 2);
}

#[test]
fn tokens_refill_over_time() {
    let limiter = RateLimiter::new(RateLimitConfig::new().rate(20.0).burst(1)).unwrap();
    assert!(limiter.allow("a"));
    assert!(!limiter.allow("a"));
    std::thread::sleep(Duration::from_millis(120));
    assert!(limiter.allow("a"));
}

#[test]
fn concurrent_first_use_admits_at_most_burst() {
    let limiter = Arc::new(limiter(10));
    let handles: Vec<_> = (0..8)
        .map(|_| {
            let limiter = limiter.clone();
            std::thread::spawn(move || (0..10).filter(|_| limiter.allow("shared")).count())
        })
        .collect();

    let admitted: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
    assert!(admitted <= 11, "admitted {admitted} of 80 with burst 10");
    assert!(admitted >= 10);
    assert_eq!(limiter.tracked_clients(), 1);
}

#[test]
fn idle_buckets_are_reclaimed() {
    let config = RateLimitConfig::new()
        .rate(1.0)
        .burst(3)
        .idle_timeout(Duration::from_millis(100));
    let limiter = RateLimiter::new(config).unwrap();

    assert!(limiter.allow("a"));
    assert!(limiter.allow("b"));
    assert_eq!(limiter.tracked_clients(), 2);

    std::thread::sleep(Duration::from_millis(300));
    limiter.sweep();
    assert_eq!(limiter.tracked_clients(), 0);

    // A reclaimed client starts over with a full bucket
    for _ in 0..3 {
        assert!(limiter.allow("a"));
    }
}

#[tokio::test]
async fn sweeper_stops_when_limiter_is_dropped() {
    let config = RateLimitConfig::new().sweep_interval(Duration::from_millis(10));
    let limiter = Arc::new(RateLimiter::new(config).unwrap());
    let handle = limiter.spawn_sweeper();

    drop(limiter);
    tokio::time::timeout(Duration::from_secs(2), handle)
        .await
        .expect("sweeper should exit")
        .unwrap();
}
