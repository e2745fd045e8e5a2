//! Tests for metrics emission.
//!
//! Uses `metrics_util::debugging::DebuggingRecorder` to capture and assert
//! on emitted metrics without needing a real exporter.

mod common;

use std::future::Future;
use std::time::Duration;

use common::{CountingEngine, FailingEngine, MockConnector, MockStore, grocery_request};
use metrics_util::MetricKind;
use metrics_util::debugging::{DebugValue, DebuggingRecorder};

use huginn::{
    CacheConfig, ExplainerConfig, ExplanationClient, PredictionService, RateLimitConfig,
    TieredCache, telemetry,
};

// ============================================================================
// Snapshot type alias for readability
// ============================================================================

type SnapshotVec = Vec<(
    metrics_util::CompositeKey,
    Option<metrics::Unit>,
    Option<metrics::SharedString>,
    DebugValue,
)>;

// ============================================================================
// Helpers
// ============================================================================

/// Sum all counter values matching a metric name and, optionally, one label.
fn counter_total(snapshot: &SnapshotVec, name: &str, label: Option<(&str, &str)>) -> u64 {
    snapshot
        .iter()
        .filter(|(key, _, _, _)| key.kind() == MetricKind::Counter && key.key().name() == name)
        .filter(|(key, _, _, _)| match label {
            Some((k, v)) => key
                .key()
                .labels()
                .any(|l| l.key() == k && l.value() == v),
            None => true,
        })
        .map(|(_, _, _, value)| match value {
            DebugValue::Counter(v) => *v,
            _ => 0,
        })
        .sum()
}

fn has_histogram(snapshot: &SnapshotVec, name: &str) -> bool {
    snapshot
        .iter()
        .any(|(key, _, _, _)| key.kind() == MetricKind::Histogram && key.key().name() == name)
}

/// Runs async code within a local recorder scope on the multi-thread runtime.
///
/// `block_in_place` keeps the sync `with_local_recorder` closure on the
/// current thread while `block_on` drives the inner async work.
fn recorded<F: Future>(work: F) -> (F::Output, SnapshotVec) {
    let recorder = DebuggingRecorder::new();
    let snapshotter = recorder.snapshotter();
    let output = metrics::with_local_recorder(&recorder, || {
        tokio::task::block_in_place(|| tokio::runtime::Handle::current().block_on(work))
    });
    (output, snapshotter.snapshot().into_vec())
}

// ============================================================================
// Tests
// ============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 1)]
async fn successful_request_records_metrics() {
    let service = PredictionService::builder()
        .engine(CountingEngine::new())
        .build()
        .unwrap();

    let (result, snapshot) = recorded(async {
        service.predict("10.0.0.1", grocery_request()).await?;
        service.predict("10.0.0.1", grocery_request()).await
    });
    assert!(result.is_ok());

    assert_eq!(
        counter_total(&snapshot, telemetry::REQUESTS_TOTAL, Some(("status", "ok"))),
        2
    );
    assert!(has_histogram(&snapshot, telemetry::REQUEST_DURATION_SECONDS));
    assert!(has_histogram(&snapshot, telemetry::INFERENCE_DURATION_SECONDS));
    assert_eq!(counter_total(&snapshot, telemetry::CACHE_MISSES_TOTAL, None), 1);
    assert_eq!(
        counter_total(&snapshot, telemetry::CACHE_HITS_TOTAL, Some(("tier", "l1"))),
        1
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 1)]
async fn invalid_input_is_counted_by_code() {
    let service = PredictionService::builder()
        .engine(CountingEngine::new())
        .build()
        .unwrap();

    let (result, snapshot) = recorded(async {
        let mut request = grocery_request();
        request.features.truncate(10);
        service.predict("10.0.0.1", request).await
    });
    assert!(result.is_err());

    assert_eq!(
        counter_total(
            &snapshot,
            telemetry::REQUESTS_TOTAL,
            Some(("status", "INVALID_FEATURES"))
        ),
        1
    );
    assert!(!has_histogram(&snapshot, telemetry::INFERENCE_DURATION_SECONDS));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 1)]
async fn compute_failure_records_inference_error() {
    let service = PredictionService::builder()
        .engine(FailingEngine::new())
        .build()
        .unwrap();

    let (_result, snapshot) = recorded(service.predict("10.0.0.1", grocery_request()));

    assert_eq!(counter_total(&snapshot, telemetry::INFERENCE_ERRORS_TOTAL, None), 1);
    assert_eq!(
        counter_total(
            &snapshot,
            telemetry::REQUESTS_TOTAL,
            Some(("status", "INFERENCE_FAILED"))
        ),
        1
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 1)]
async fn rate_limited_request_is_counted() {
    let service = PredictionService::builder()
        .engine(CountingEngine::new())
        .rate_limit(RateLimitConfig::new().rate(1.0).burst(1))
        .build()
        .unwrap();

    let (_result, snapshot) = recorded(async {
        let _ = service.predict("10.0.0.1", grocery_request()).await;
        service.predict("10.0.0.1", grocery_request()).await
    });

    assert_eq!(counter_total(&snapshot, telemetry::RATE_LIMITED_TOTAL, None), 1);
    assert_eq!(
        counter_total(
            &snapshot,
            telemetry::REQUESTS_TOTAL,
            Some(("status", "RATE_LIMITED"))
        ),
        1
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 1)]
async fn absorbed_shared_store_failures_are_counted() {
    let store = MockStore::new();
    let connector = MockConnector::new(store.clone(), true);
    let cache = TieredCache::connect(CacheConfig::new(), Some(connector)).await;
    store.set_reachable(false);

    let service = PredictionService::builder()
        .engine(CountingEngine::new())
        .cache(cache)
        .build()
        .unwrap();

    let (result, snapshot) = recorded(service.predict("10.0.0.1", grocery_request()));
    assert!(result.is_ok());

    assert_eq!(
        counter_total(&snapshot, telemetry::CACHE_L2_ERRORS_TOTAL, Some(("op", "get"))),
        1
    );
    assert_eq!(
        counter_total(&snapshot, telemetry::CACHE_L2_ERRORS_TOTAL, Some(("op", "set"))),
        1
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 1)]
async fn zero_feature_fallback_is_counted() {
    let service = PredictionService::builder()
        .engine(CountingEngine::new())
        .build()
        .unwrap();

    let (_result, snapshot) = recorded(service.predict_simple(
        "10.0.0.1",
        huginn::SimplePredictRequest {
            store_nbr: 1,
            family: "DAIRY".into(),
            date: "2017-08-01".into(),
            horizon: 90,
        },
    ));

    assert_eq!(
        counter_total(
            &snapshot,
            telemetry::FEATURE_FALLBACKS_TOTAL,
            Some(("fallback", "zeros"))
        ),
        1
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 1)]
async fn explainer_health_failure_is_counted() {
    // Nothing listens on port 9 (discard) in the test environment
    let explainer = ExplanationClient::new(
        &ExplainerConfig::new("http://127.0.0.1:9").timeout(Duration::from_millis(200)),
    )
    .unwrap();
    let service = PredictionService::builder()
        .engine(CountingEngine::new())
        .explainer(explainer)
        .build()
        .unwrap();

    let (report, snapshot) = recorded(service.health());

    assert!(!report.explainer.unwrap().healthy);
    assert_eq!(
        counter_total(
            &snapshot,
            telemetry::EXPLAIN_ERRORS_TOTAL,
            Some(("call", "health"))
        ),
        1
    );
}

#[tokio::test]
async fn metrics_are_noop_without_recorder() {
    // Verify no panics when no recorder is installed.
    let service = PredictionService::builder()
        .engine(CountingEngine::new())
        .build()
        .unwrap();
    service.predict("10.0.0.1", grocery_request()).await.unwrap();
}
