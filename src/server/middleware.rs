//! Request middleware and extractors.

use std::convert::Infallible;
use std::net::SocketAddr;

use axum::{
    extract::{ConnectInfo, FromRequestParts, Query, Request, State},
    http::{HeaderValue, header::HeaderName, request::Parts},
    middleware::Next,
    response::{IntoResponse, Response},
};
use serde::Deserialize;
use tracing::Instrument;
use uuid::Uuid;

use super::AppState;
use super::error::ApiError;
use crate::HuginnError;
use crate::admission::resolve_client_identity;

pub const REQUEST_ID_HEADER: &str = "x-request-id";
pub const API_KEY_HEADER: &str = "x-api-key";
pub const ADMIN_KEY_HEADER: &str = "x-admin-key";

/// Request correlation id, taken from `x-request-id` or generated.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RequestId(pub String);

/// Attach a request id to the request, its tracing span and the response.
pub async fn request_id(mut request: Request, next: Next) -> Response {
    let id = request
        .headers()
        .get(REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .filter(|s| !s.is_empty())
        .map(str::to_owned)
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    request.extensions_mut().insert(RequestId(id.clone()));

    let span = tracing::info_span!(
        "request",
        request_id = %id,
        method = %request.method(),
        path = %request.uri().path(),
    );
    let mut response = next.run(request).instrument(span).await;

    if let Ok(value) = HeaderValue::from_str(&id) {
        response
            .headers_mut()
            .insert(HeaderName::from_static(REQUEST_ID_HEADER), value);
    }
    response
}

#[axum::async_trait]
impl<S> FromRequestParts<S> for RequestId
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(parts
            .extensions
            .get::<RequestId>()
            .cloned()
            .unwrap_or_else(|| RequestId(Uuid::new_v4().to_string())))
    }
}

/// The identity a request is rate limited under.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClientIdentity(pub String);

#[axum::async_trait]
impl<S> FromRequestParts<S> for ClientIdentity
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let header = |name: &str| parts.headers.get(name).and_then(|v| v.to_str().ok());
        let peer = parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| addr.ip());
        Ok(ClientIdentity(resolve_client_identity(
            header("x-real-ip"),
            header("x-forwarded-for"),
            peer,
        )))
    }
}

#[derive(Deserialize)]
struct KeyQuery {
    api_key: Option<String>,
}

/// Charge the request against its client's bucket before the body is read.
///
/// On success the [`Admitted`](crate::admission::Admitted) token is left in
/// the request extensions for the handler to pass to the service.
pub async fn admit(
    State(state): State<AppState>,
    ClientIdentity(client): ClientIdentity,
    mut request: Request,
    next: Next,
) -> Response {
    match state.service.rate_limiter().admit(&client) {
        Ok(admitted) => {
            request.extensions_mut().insert(admitted);
            next.run(request).await
        }
        Err(e) => {
            let request_id = request.extensions().get::<RequestId>().map(|r| r.0.clone());
            ApiError::new(e, request_id).into_response()
        }
    }
}

/// Require the configured API key on every route except `/health`.
pub async fn require_api_key(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    let Some(expected) = state.api_key.as_deref() else {
        return next.run(request).await;
    };
    if request.uri().path() == "/health" {
        return next.run(request).await;
    }

    let from_header = request
        .headers()
        .get(API_KEY_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned);
    let provided = from_header.or_else(|| {
        Query::<KeyQuery>::try_from_uri(request.uri())
            .ok()
            .and_then(|Query(q)| q.api_key)
    });

    if provided.as_deref() == Some(expected) {
        next.run(request).await
    } else {
        reject(&request)
    }
}

/// Require the configured admin key on admin routes.
pub async fn require_admin_key(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    let Some(expected) = state.admin_key.as_deref() else {
        return next.run(request).await;
    };
    let provided = request
        .headers()
        .get(ADMIN_KEY_HEADER)
        .and_then(|v| v.to_str().ok());

    if provided == Some(expected) {
        next.run(request).await
    } else {
        reject(&request)
    }
}

fn reject(request: &Request) -> Response {
    let request_id = request.extensions().get::<RequestId>().map(|r| r.0.clone());
    tracing::debug!(path = %request.uri().path(), "rejected unauthenticated request");
    ApiError::new(HuginnError::AuthenticationFailed, request_id).into_response()
}
