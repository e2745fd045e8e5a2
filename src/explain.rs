//! Client for the external explanation service.
//!
//! The service computes per-feature contributions for one prediction. It is
//! optional: every failure here maps to `CollaboratorUnavailable` and never
//! affects prediction routes.

use std::time::Duration;

use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::types::{Explanation, FeatureVector};
use crate::{HuginnError, Result, telemetry};

/// Explanation service settings.
#[derive(Debug, Clone)]
pub struct ExplainerConfig {
    /// Base URL, e.g. `http://localhost:50051`.
    pub base_url: String,
    /// Bound on each call. Default: 500ms.
    pub timeout: Duration,
}

impl ExplainerConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            timeout: Duration::from_millis(500),
        }
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[derive(Serialize)]
struct ExplainBody<'a> {
    store_nbr: i32,
    family: &'a str,
    date: &'a str,
    features: &'a [f32],
}

#[derive(Deserialize)]
struct HealthBody {
    healthy: bool,
}

/// HTTP client for the explanation service.
#[derive(Clone)]
pub struct ExplanationClient {
    http: Client,
    base_url: String,
}

impl ExplanationClient {
    pub fn new(config: &ExplainerConfig) -> Result<Self> {
        let http = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| HuginnError::Configuration(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_owned(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Explain one prediction.
    pub async fn explain(
        &self,
        store_nbr: i32,
        family: &str,
        date: &str,
        features: &FeatureVector,
    ) -> Result<Explanation> {
        let url = format!("{}/explain", self.base_url);
        let body = ExplainBody {
            store_nbr,
            family,
            date,
            features: features.as_slice(),
        };

        let result = async {
            let response = self
                .http
                .post(&url)
                .json(&body)
                .send()
                .await
                .map_err(|e| unavailable(format!("request failed: {e}")))?;

            let status = response.status();
            if !status.is_success() {
                let text = response.text().await.unwrap_or_default();
                return Err(unavailable(format!("status {status}: {text}")));
            }

            response
                .json::<Explanation>()
                .await
                .map_err(|e| unavailable(format!("invalid response: {e}")))
        }
        .await;

        if let Err(e) = &result {
            metrics::counter!(telemetry::EXPLAIN_ERRORS_TOTAL, "call" => "explain").increment(1);
            tracing::warn!(error = %e, store_nbr, family, "explanation failed");
        }
        result
    }

    /// Ask the service whether it is healthy.
    pub async fn health(&self) -> Result<bool> {
        let url = format!("{}/health", self.base_url);
        let response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| unavailable(format!("health check failed: {e}")))?;

        if !response.status().is_success() {
            return Ok(false);
        }

        let body: HealthBody = response
            .json()
            .await
            .map_err(|e| unavailable(format!("invalid health response: {e}")))?;
        Ok(body.healthy)
    }
}

impl std::fmt::Debug for ExplanationClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExplanationClient")
            .field("base_url", &self.base_url)
            .finish()
    }
}

fn unavailable(message: String) -> HuginnError {
    HuginnError::CollaboratorUnavailable(message)
}
