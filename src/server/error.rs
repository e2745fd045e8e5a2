//! Mapping from [`HuginnError`] to HTTP responses.

use axum::{
    Json,
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use serde_json::json;

use crate::HuginnError;

/// An error on its way out of a handler, tagged with the request id.
#[derive(Debug)]
pub struct ApiError {
    pub error: HuginnError,
    pub request_id: Option<String>,
}

impl ApiError {
    pub fn new(error: HuginnError, request_id: Option<String>) -> Self {
        Self { error, request_id }
    }
}

impl From<HuginnError> for ApiError {
    fn from(error: HuginnError) -> Self {
        Self {
            error,
            request_id: None,
        }
    }
}

/// HTTP status for an error.
pub fn status_for(error: &HuginnError) -> StatusCode {
    match error {
        HuginnError::InvalidInput { .. } | HuginnError::Json(_) => StatusCode::BAD_REQUEST,
        HuginnError::AuthenticationFailed => StatusCode::UNAUTHORIZED,
        HuginnError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
        HuginnError::ModelUnavailable(_)
        | HuginnError::CollaboratorUnavailable(_)
        | HuginnError::CacheUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        HuginnError::Http(_) => StatusCode::BAD_GATEWAY,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = status_for(&self.error);

        // Server-side details stay in the logs
        let message = if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!(error = %self.error, request_id = ?self.request_id, "internal error");
            "An internal error occurred".to_string()
        } else {
            self.error.to_string()
        };

        let mut body = json!({
            "error": message,
            "code": self.error.code(),
        });
        if let Some(id) = &self.request_id {
            body["request_id"] = json!(id);
        }

        let mut response = (status, Json(body)).into_response();
        if let HuginnError::RateLimited { retry_after } = &self.error {
            let secs = retry_after
                .map(|d| d.as_secs_f64().ceil() as u64)
                .unwrap_or(1)
                .max(1);
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from(secs));
        }
        response
    }
}
