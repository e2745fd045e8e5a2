//! Wiremock tests for the explanation service client.

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::CountingEngine;
use huginn::{
    Direction, ExplainRequest, ExplainerConfig, ExplanationClient, FeatureVector,
    FileFeatureStore, HuginnError, PredictionService,
};
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn sample_explanation() -> serde_json::Value {
    serde_json::json!({
        "base_value": 10.0,
        "features": [
            {"name": "sales_lag_7", "value": 12.0, "shap_value": 3.5, "cumulative": 13.5, "direction": "positive"},
            {"name": "onpromotion", "value": 0.0, "shap_value": -1.25, "cumulative": 12.25, "direction": "negative"}
        ],
        "prediction": 12.25
    })
}

fn client_for(server: &MockServer) -> ExplanationClient {
    ExplanationClient::new(&ExplainerConfig::new(server.uri())).unwrap()
}

#[tokio::test]
async fn explain_parses_contributions() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/explain"))
        .and(body_partial_json(serde_json::json!({
            "store_nbr": 1,
            "family": "DAIRY",
            "date": "2017-08-01"
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(sample_explanation()))
        .expect(1)
        .mount(&server)
        .await;

    let explanation = client_for(&server)
        .explain(1, "DAIRY", "2017-08-01", &FeatureVector::zeros())
        .await
        .expect("explain should succeed");

    assert_eq!(explanation.base_value, 10.0);
    assert_eq!(explanation.features.len(), 2);
    assert_eq!(explanation.features[0].name, "sales_lag_7");
    assert_eq!(explanation.features[0].contribution, 3.5);
    assert_eq!(explanation.features[1].direction, Direction::Negative);
    assert_eq!(explanation.prediction, 12.25);
}

#[tokio::test]
async fn server_error_is_collaborator_unavailable() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/explain"))
        .respond_with(ResponseTemplate::new(500).set_body_string("model not loaded"))
        .mount(&server)
        .await;

    let err = client_for(&server)
        .explain(1, "DAIRY", "2017-08-01", &FeatureVector::zeros())
        .await
        .unwrap_err();
    assert!(matches!(err, HuginnError::CollaboratorUnavailable(_)));
    assert!(err.to_string().contains("500"));
}

#[tokio::test]
async fn slow_service_times_out() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/explain"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(sample_explanation())
                .set_delay(Duration::from_millis(500)),
        )
        .mount(&server)
        .await;

    let config = ExplainerConfig::new(server.uri()).timeout(Duration::from_millis(50));
    let client = ExplanationClient::new(&config).unwrap();
    let err = client
        .explain(1, "DAIRY", "2017-08-01", &FeatureVector::zeros())
        .await
        .unwrap_err();
    assert!(matches!(err, HuginnError::CollaboratorUnavailable(_)));
}

#[tokio::test]
async fn unreachable_service_is_collaborator_unavailable() {
    // Nothing listens on port 9 (discard) in the test environment
    let client = ExplanationClient::new(
        &ExplainerConfig::new("http://127.0.0.1:9").timeout(Duration::from_millis(200)),
    )
    .unwrap();
    let err = client
        .explain(1, "DAIRY", "2017-08-01", &FeatureVector::zeros())
        .await
        .unwrap_err();
    assert!(matches!(err, HuginnError::CollaboratorUnavailable(_)));
    assert!(client.health().await.is_err());
}

#[tokio::test]
async fn health_reads_flag() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/health"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"healthy": true})))
        .mount(&server)
        .await;

    assert!(client_for(&server).health().await.unwrap());
}

#[tokio::test]
async fn health_non_success_is_unhealthy() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/health"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    assert!(!client_for(&server).health().await.unwrap());
}

#[tokio::test]
async fn service_forwards_stored_features() {
    let dir = tempfile::tempdir().unwrap();
    let features_path = dir.path().join("features.json");
    let row: Vec<f32> = (0..27).map(|i| i as f32).collect();
    std::fs::write(
        &features_path,
        serde_json::to_vec(&serde_json::json!([
            {"store_nbr": 1, "family": "DAIRY", "date": "2017-08-01", "features": row}
        ]))
        .unwrap(),
    )
    .unwrap();

    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/explain"))
        .and(body_partial_json(serde_json::json!({"features": row})))
        .respond_with(ResponseTemplate::new(200).set_body_json(sample_explanation()))
        .expect(1)
        .mount(&server)
        .await;

    let service = PredictionService::builder()
        .engine(CountingEngine::new())
        .feature_store(Arc::new(FileFeatureStore::open(&features_path).unwrap()))
        .explainer(client_for(&server))
        .build()
        .unwrap();

    let explanation = service
        .explain(
            "10.0.0.1",
            ExplainRequest {
                store_nbr: 1,
                family: "DAIRY".into(),
                date: "2017-08-01".into(),
            },
        )
        .await
        .unwrap();
    assert_eq!(explanation.features.len(), 2);
}

#[tokio::test]
async fn explain_validates_before_calling_out() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(sample_explanation()))
        .expect(0)
        .mount(&server)
        .await;

    let service = PredictionService::builder()
        .explainer(client_for(&server))
        .build()
        .unwrap();

    let err = service
        .explain(
            "10.0.0.1",
            ExplainRequest {
                store_nbr: 1,
                family: "DAIRY".into(),
                date: "08/01/2017".into(),
            },
        )
        .await
        .unwrap_err();
    assert_eq!(err.code(), "INVALID_DATE");
}
