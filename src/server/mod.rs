//! HTTP surface for the prediction service.
//!
//! This module provides:
//! - The axum router, shared state and CORS (this file)
//! - Route handlers (`handlers`)
//! - Request id, client identity, admission and access-control middleware (`middleware`)
//! - Error-to-response mapping (`error`)
//! - Daemon configuration (`config`)

pub mod config;
pub mod error;
pub mod handlers;
pub mod middleware;

use std::sync::Arc;
use std::time::Duration;

use axum::{
    Router,
    http::{HeaderName, HeaderValue, Method, header},
    routing::{get, post},
};
use metrics_exporter_prometheus::PrometheusHandle;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

use crate::service::PredictionService;

pub use config::{Config, ServerConfig};
pub use error::ApiError;
pub use middleware::{ClientIdentity, RequestId};

/// State shared by all handlers.
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<PredictionService>,
    /// Required on all routes but `/health` when set.
    pub api_key: Option<String>,
    /// Required on `/admin/*` when set.
    pub admin_key: Option<String>,
    /// Rendered on `/metrics/prometheus` when set.
    pub metrics: Option<PrometheusHandle>,
}

impl AppState {
    pub fn new(service: Arc<PredictionService>) -> Self {
        Self {
            service,
            api_key: None,
            admin_key: None,
            metrics: None,
        }
    }

    pub fn api_key(mut self, key: Option<String>) -> Self {
        self.api_key = key;
        self
    }

    pub fn admin_key(mut self, key: Option<String>) -> Self {
        self.admin_key = key;
        self
    }

    pub fn metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics = Some(handle);
        self
    }
}

/// The router with CORS and timeouts taken from the server configuration.
pub fn app(state: AppState, config: &ServerConfig) -> Router {
    router(state, config.request_timeout()).layer(cors_layer(&config.cors_origins))
}

/// Build the application router.
pub fn router(state: AppState, request_timeout: Duration) -> Router {
    let admin = Router::new()
        .route("/admin/cache/reconnect", post(handlers::reconnect_cache))
        .route("/admin/features/reload", post(handlers::reload_features))
        .route_layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::require_admin_key,
        ));

    let admitted = Router::new()
        .route("/predict", post(handlers::predict))
        .route("/predict/simple", post(handlers::predict_simple))
        .route("/predict/batch", post(handlers::predict_batch))
        .route("/explain", post(handlers::explain))
        .route("/whatif", post(handlers::what_if))
        .route_layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::admit,
        ));

    Router::new()
        .route("/health", get(handlers::health))
        .route("/metrics/prometheus", get(handlers::prometheus_metrics))
        .merge(admitted)
        .merge(admin)
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::require_api_key,
        ))
        .layer(axum::middleware::from_fn(middleware::request_id))
        .layer(TimeoutLayer::new(request_timeout))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Browser access for the listed origins. Preflights are answered here,
/// ahead of authentication and admission.
pub fn cors_layer(origins: &[String]) -> CorsLayer {
    let origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin.trim()) {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::warn!(%origin, error = %e, "ignoring invalid CORS origin");
                None
            }
        })
        .collect();
    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([
            header::CONTENT_TYPE,
            HeaderName::from_static(middleware::API_KEY_HEADER),
            HeaderName::from_static(middleware::ADMIN_KEY_HEADER),
            HeaderName::from_static(middleware::REQUEST_ID_HEADER),
        ])
        .expose_headers([HeaderName::from_static(middleware::REQUEST_ID_HEADER)])
}
