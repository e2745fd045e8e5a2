//! Huginn error types

use std::time::Duration;

/// Huginn error types
#[derive(Debug, thiserror::Error)]
pub enum HuginnError {
    // Client errors
    /// Malformed request: wrong-length feature vector, unknown family, bad date...
    ///
    /// `code` is a stable machine-readable tag such as `INVALID_FEATURES`.
    #[error("invalid input: {message}")]
    InvalidInput { code: &'static str, message: String },

    /// Admission denied; the client should back off for `retry_after`.
    #[error("rate limited, retry after {retry_after:?}")]
    RateLimited { retry_after: Option<Duration> },

    #[error("authentication failed")]
    AuthenticationFailed,

    // Inference errors
    /// No inference engine is loaded; only cached results can be served.
    #[error("model unavailable: {0}")]
    ModelUnavailable(String),

    /// The numeric routine failed. Not retried: the input is deterministic.
    #[error("inference failed: {0}")]
    ComputeFailed(String),

    // Infrastructure errors (absorbed before they reach callers)
    #[error("shared cache unavailable: {0}")]
    CacheUnavailable(String),

    #[error("explanation service unavailable: {0}")]
    CollaboratorUnavailable(String),

    #[error("HTTP error: {0}")]
    Http(String),

    // Data errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("data error: {0}")]
    DataError(String),

    // Configuration errors
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl HuginnError {
    /// Shorthand for an [`InvalidInput`](Self::InvalidInput) error.
    pub fn invalid(code: &'static str, message: impl Into<String>) -> Self {
        Self::InvalidInput {
            code,
            message: message.into(),
        }
    }

    /// Stable machine-readable error code, suitable for API bodies.
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidInput { code, .. } => *code,
            Self::RateLimited { .. } => "RATE_LIMITED",
            Self::AuthenticationFailed => "AUTH_REQUIRED",
            Self::ModelUnavailable(_) => "MODEL_UNAVAILABLE",
            Self::ComputeFailed(_) => "INFERENCE_FAILED",
            Self::CacheUnavailable(_) => "CACHE_UNAVAILABLE",
            Self::CollaboratorUnavailable(_) => "EXPLAINER_UNAVAILABLE",
            Self::Http(_) => "UPSTREAM_ERROR",
            Self::Json(_) => "INVALID_REQUEST",
            Self::Io(_) | Self::DataError(_) => "DATA_ERROR",
            Self::Configuration(_) => "CONFIGURATION_ERROR",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Whether the caller caused this error (4xx-class) rather than the server.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidInput { .. }
                | Self::RateLimited { .. }
                | Self::AuthenticationFailed
                | Self::Json(_)
        )
    }
}

/// Result type alias for Huginn operations
pub type Result<T> = std::result::Result<T, HuginnError>;
