//! Route handlers.
//!
//! Client routes sit behind the [`admit`](super::middleware::admit) layer,
//! so a request is charged before its body is looked at and the handler
//! only forwards the [`Admitted`] token. Bodies are parsed here rather than
//! with the `Json` extractor so that a malformed body gets the same error
//! shape as every other client error. Service calls run in their own task:
//! if the client goes away the computation and its cache writes still
//! finish.

use std::future::Future;

use axum::{
    Extension, Json,
    body::Bytes,
    extract::State,
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};
use serde::Serialize;
use serde::de::DeserializeOwned;

use super::AppState;
use super::error::ApiError;
use super::middleware::RequestId;
use crate::admission::Admitted;
use crate::cache::CacheMode;
use crate::features::FeatureStoreMetadata;
use crate::service::HealthReport;
use crate::types::{
    BatchPredictRequest, BatchPredictResponse, ExplainRequest, Explanation, PredictRequest,
    PredictResponse, SimplePredictRequest, WhatIfRequest, WhatIfResponse,
};
use crate::{HuginnError, Result};

type ApiResult<T> = std::result::Result<Json<T>, ApiError>;

pub async fn predict(
    State(state): State<AppState>,
    RequestId(request_id): RequestId,
    Extension(admitted): Extension<Admitted>,
    body: Bytes,
) -> ApiResult<PredictResponse> {
    let request: PredictRequest = parse(&body, &request_id)?;
    let service = state.service.clone();
    detached(&request_id, async move { service.predict(admitted, request).await }).await
}

pub async fn predict_simple(
    State(state): State<AppState>,
    RequestId(request_id): RequestId,
    Extension(admitted): Extension<Admitted>,
    body: Bytes,
) -> ApiResult<PredictResponse> {
    let request: SimplePredictRequest = parse(&body, &request_id)?;
    let service = state.service.clone();
    detached(&request_id, async move {
        service.predict_simple(admitted, request).await
    })
    .await
}

pub async fn predict_batch(
    State(state): State<AppState>,
    RequestId(request_id): RequestId,
    Extension(admitted): Extension<Admitted>,
    body: Bytes,
) -> ApiResult<BatchPredictResponse> {
    let request: BatchPredictRequest = parse(&body, &request_id)?;
    let service = state.service.clone();
    detached(&request_id, async move {
        service.predict_batch(admitted, request).await
    })
    .await
}

pub async fn explain(
    State(state): State<AppState>,
    RequestId(request_id): RequestId,
    Extension(admitted): Extension<Admitted>,
    body: Bytes,
) -> ApiResult<Explanation> {
    let request: ExplainRequest = parse(&body, &request_id)?;
    let service = state.service.clone();
    detached(&request_id, async move { service.explain(admitted, request).await }).await
}

pub async fn what_if(
    State(state): State<AppState>,
    RequestId(request_id): RequestId,
    Extension(admitted): Extension<Admitted>,
    body: Bytes,
) -> ApiResult<WhatIfResponse> {
    let request: WhatIfRequest = parse(&body, &request_id)?;
    let service = state.service.clone();
    detached(&request_id, async move { service.what_if(admitted, request).await }).await
}

pub async fn health(State(state): State<AppState>) -> Json<HealthReport> {
    Json(state.service.health().await)
}

/// Prometheus text exposition, or 404 when no exporter is installed.
pub async fn prometheus_metrics(State(state): State<AppState>) -> Response {
    match &state.metrics {
        Some(handle) => (
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            handle.render(),
        )
            .into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

#[derive(Serialize)]
pub struct ReconnectResponse {
    pub mode: CacheMode,
}

pub async fn reconnect_cache(State(state): State<AppState>) -> Json<ReconnectResponse> {
    let mode = state.service.reconnect_cache().await;
    tracing::info!(?mode, "cache reconnect requested");
    Json(ReconnectResponse { mode })
}

pub async fn reload_features(
    State(state): State<AppState>,
    RequestId(request_id): RequestId,
) -> ApiResult<FeatureStoreMetadata> {
    let service = state.service.clone();
    let metadata = detached(&request_id, async move { service.reload_features().await }).await?;
    tracing::info!(rows = metadata.0.row_count, "feature store reloaded");
    Ok(metadata)
}

fn parse<T: DeserializeOwned>(body: &[u8], request_id: &str) -> std::result::Result<T, ApiError> {
    serde_json::from_slice(body).map_err(|e| {
        ApiError::new(
            HuginnError::invalid("INVALID_REQUEST", format!("invalid request body: {e}")),
            Some(request_id.to_owned()),
        )
    })
}

/// Run a service call to completion on its own task.
async fn detached<T, F>(request_id: &str, call: F) -> ApiResult<T>
where
    F: Future<Output = Result<T>> + Send + 'static,
    T: Send + 'static,
{
    let outcome = match tokio::spawn(call).await {
        Ok(result) => result,
        Err(e) => Err(HuginnError::Internal(format!("request task failed: {e}"))),
    };
    outcome
        .map(Json)
        .map_err(|e| ApiError::new(e, Some(request_id.to_owned())))
}
