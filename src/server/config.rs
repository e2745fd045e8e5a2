//! Configuration loading for huginnd.
//!
//! Configuration is loaded from TOML files with the following resolution order:
//! 1. `--config <path>` (CLI flag; must exist)
//! 2. `~/.huginn/config.toml` (user)
//! 3. `/etc/huginn/config.toml` (system)
//! 4. built-in defaults
//!
//! Every field has a default, so a partial file is fine.

use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::admission::RateLimitConfig;
use crate::cache::CacheConfig;
use crate::explain::ExplainerConfig;
use crate::inference::{Device, ModelConfig};
use crate::validation::DEFAULT_MAX_BATCH_SIZE;
use crate::{HuginnError, Result};

/// Daemon configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub model: ModelSection,
    #[serde(default)]
    pub cache: CacheSection,
    #[serde(default)]
    pub rate_limit: RateLimitSection,
    #[serde(default)]
    pub explainer: ExplainerSection,
    #[serde(default)]
    pub features: FeaturesSection,
    #[serde(default)]
    pub auth: AuthConfig,
}

/// Server network configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Address to bind to (default: 0.0.0.0:8080).
    #[serde(default = "default_address")]
    pub address: String,
    /// Request timeout in seconds (default: 30).
    #[serde(default = "default_timeout")]
    pub request_timeout_secs: u64,
    /// Maximum predictions per batch request (default: 100).
    #[serde(default = "default_max_batch")]
    pub max_batch_size: usize,
    /// Origins allowed to call the API from a browser
    /// (default: local dashboard dev servers).
    #[serde(default = "default_cors_origins")]
    pub cors_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            address: default_address(),
            request_timeout_secs: default_timeout(),
            max_batch_size: default_max_batch(),
            cors_origins: default_cors_origins(),
        }
    }
}

impl ServerConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

fn default_address() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_timeout() -> u64 {
    30
}

fn default_max_batch() -> usize {
    DEFAULT_MAX_BATCH_SIZE
}

fn default_cors_origins() -> Vec<String> {
    ["http://localhost:3000", "http://localhost:4173", "http://localhost:5173"]
        .map(String::from)
        .to_vec()
}

/// Model artifact configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ModelSection {
    /// Path to the ONNX model. Unset means cache-only mode.
    #[serde(default)]
    pub path: Option<PathBuf>,
    #[serde(default = "default_input_name")]
    pub input_name: String,
    #[serde(default = "default_output_name")]
    pub output_name: String,
    /// "cpu" or "cuda" (default: "cpu").
    #[serde(default = "default_device")]
    pub device: String,
    /// Optional prediction-interval offsets JSON.
    #[serde(default)]
    pub intervals_path: Option<PathBuf>,
}

impl Default for ModelSection {
    fn default() -> Self {
        Self {
            path: None,
            input_name: default_input_name(),
            output_name: default_output_name(),
            device: default_device(),
            intervals_path: None,
        }
    }
}

fn default_input_name() -> String {
    "input".to_string()
}

fn default_output_name() -> String {
    "output".to_string()
}

fn default_device() -> String {
    "cpu".to_string()
}

impl ModelSection {
    /// `None` when no model path is configured.
    pub fn model_config(&self) -> Result<Option<ModelConfig>> {
        let Some(path) = &self.path else {
            return Ok(None);
        };
        let device = parse_device(&self.device)?;
        Ok(Some(
            ModelConfig::new(path)
                .input_name(&self.input_name)
                .output_name(&self.output_name)
                .device(device),
        ))
    }
}

fn parse_device(name: &str) -> Result<Device> {
    match name {
        "cpu" => Ok(Device::Cpu),
        #[cfg(feature = "cuda")]
        "cuda" => Ok(Device::Cuda { device_id: 0 }),
        other => Err(HuginnError::Configuration(format!(
            "unsupported device {other:?}"
        ))),
    }
}

/// Cache configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct CacheSection {
    /// L1 capacity in entries (default: 10000).
    #[serde(default = "default_l1_capacity")]
    pub l1_capacity: usize,
    /// Entry TTL in seconds (default: 3600).
    #[serde(default = "default_ttl")]
    pub ttl_secs: u64,
    /// Shared-store URL, e.g. `redis://localhost:6379`. Unset means L1-only.
    #[serde(default)]
    pub redis_url: Option<String>,
    /// Per-operation L2 timeout in milliseconds (default: 50).
    #[serde(default = "default_l2_timeout")]
    pub l2_timeout_ms: u64,
    /// L2 connection setup timeout in seconds (default: 5).
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
}

impl Default for CacheSection {
    fn default() -> Self {
        Self {
            l1_capacity: default_l1_capacity(),
            ttl_secs: default_ttl(),
            redis_url: None,
            l2_timeout_ms: default_l2_timeout(),
            connect_timeout_secs: default_connect_timeout(),
        }
    }
}

fn default_l1_capacity() -> usize {
    10_000
}

fn default_ttl() -> u64 {
    3600
}

fn default_l2_timeout() -> u64 {
    50
}

fn default_connect_timeout() -> u64 {
    5
}

impl CacheSection {
    pub fn cache_config(&self) -> CacheConfig {
        CacheConfig::new()
            .l1_capacity(self.l1_capacity)
            .ttl(Duration::from_secs(self.ttl_secs))
            .l2_timeout(Duration::from_millis(self.l2_timeout_ms))
    }
}

/// Admission control configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct RateLimitSection {
    /// Tokens per second per client (default: 100).
    #[serde(default = "default_rate")]
    pub rate: f64,
    /// Bucket capacity (default: 200).
    #[serde(default = "default_burst")]
    pub burst: u32,
    /// Idle seconds before a client's bucket is reclaimed (default: 600).
    #[serde(default = "default_idle")]
    pub idle_timeout_secs: u64,
    /// Sweep period in seconds (default: 60).
    #[serde(default = "default_sweep")]
    pub sweep_interval_secs: u64,
}

impl Default for RateLimitSection {
    fn default() -> Self {
        Self {
            rate: default_rate(),
            burst: default_burst(),
            idle_timeout_secs: default_idle(),
            sweep_interval_secs: default_sweep(),
        }
    }
}

fn default_rate() -> f64 {
    100.0
}

fn default_burst() -> u32 {
    200
}

fn default_idle() -> u64 {
    600
}

fn default_sweep() -> u64 {
    60
}

impl RateLimitSection {
    pub fn rate_limit_config(&self) -> RateLimitConfig {
        RateLimitConfig::new()
            .rate(self.rate)
            .burst(self.burst)
            .idle_timeout(Duration::from_secs(self.idle_timeout_secs))
            .sweep_interval(Duration::from_secs(self.sweep_interval_secs))
    }
}

/// Explanation service configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ExplainerSection {
    /// Base URL. Unset disables `/explain`.
    #[serde(default)]
    pub url: Option<String>,
    /// Per-call timeout in milliseconds (default: 500).
    #[serde(default = "default_explainer_timeout")]
    pub timeout_ms: u64,
}

impl Default for ExplainerSection {
    fn default() -> Self {
        Self {
            url: None,
            timeout_ms: default_explainer_timeout(),
        }
    }
}

fn default_explainer_timeout() -> u64 {
    500
}

impl ExplainerSection {
    pub fn explainer_config(&self) -> Option<ExplainerConfig> {
        self.url.as_ref().map(|url| {
            ExplainerConfig::new(url).timeout(Duration::from_millis(self.timeout_ms))
        })
    }
}

/// Feature store configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FeaturesSection {
    /// JSON feature rows. Unset means `/predict/simple` uses zero vectors.
    #[serde(default)]
    pub path: Option<PathBuf>,
}

/// Access control. Both keys are optional.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AuthConfig {
    /// Required on every route except `/health` when set.
    #[serde(default)]
    pub api_key: Option<String>,
    /// Required on `/admin/*` routes when set.
    #[serde(default)]
    pub admin_key: Option<String>,
}

impl Config {
    /// Load configuration from the standard locations.
    ///
    /// Resolution order:
    /// 1. Explicit path (if provided; missing is an error)
    /// 2. `~/.huginn/config.toml`
    /// 3. `/etc/huginn/config.toml`
    /// 4. defaults
    pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
        match Self::resolve_config_path(explicit_path)? {
            Some(path) => Self::load_from_file(&path),
            None => Ok(Self::default()),
        }
    }

    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            HuginnError::Configuration(format!("Failed to read config file {path:?}: {e}"))
        })?;
        toml::from_str(&content).map_err(|e| {
            HuginnError::Configuration(format!("Failed to parse config file {path:?}: {e}"))
        })
    }

    fn resolve_config_path(explicit: Option<&Path>) -> Result<Option<PathBuf>> {
        if let Some(path) = explicit {
            if path.exists() {
                return Ok(Some(path.to_path_buf()));
            }
            return Err(HuginnError::Configuration(format!(
                "Config file not found: {path:?}"
            )));
        }

        // User config
        if let Some(home) = dirs::home_dir() {
            let user_config = home.join(".huginn").join("config.toml");
            if user_config.exists() {
                return Ok(Some(user_config));
            }
        }

        // System config
        let system_config = PathBuf::from("/etc/huginn/config.toml");
        if system_config.exists() {
            return Ok(Some(system_config));
        }

        Ok(None)
    }

    pub fn request_timeout(&self) -> Duration {
        self.server.request_timeout()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_expected_values() {
        let config = Config::default();
        assert_eq!(config.server.address, "0.0.0.0:8080");
        assert_eq!(config.server.request_timeout_secs, 30);
        assert_eq!(config.server.max_batch_size, 100);
        assert_eq!(config.cache.l1_capacity, 10_000);
        assert_eq!(config.cache.ttl_secs, 3600);
        assert_eq!(config.rate_limit.rate, 100.0);
        assert_eq!(config.rate_limit.burst, 200);
        assert_eq!(config.rate_limit.idle_timeout_secs, 600);
        assert_eq!(config.explainer.timeout_ms, 500);
        assert!(config.cache.redis_url.is_none());
        assert!(config.auth.api_key.is_none());
        assert_eq!(config.server.cors_origins.len(), 3);
    }

    #[test]
    fn parse_minimal_config() {
        let toml = r#"
            [server]
            address = "127.0.0.1:9000"
        "#;
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.server.address, "127.0.0.1:9000");
        // Defaults preserved
        assert_eq!(config.server.max_batch_size, 100);
        assert_eq!(config.cache.l2_timeout_ms, 50);
    }

    #[test]
    fn parse_full_config() {
        let toml = r#"
            [server]
            address = "0.0.0.0:8081"
            request_timeout_secs = 10
            max_batch_size = 20
            cors_origins = ["https://dashboard.example.com"]

            [model]
            path = "models/lightgbm_model.onnx"
            intervals_path = "models/prediction_intervals.json"

            [cache]
            l1_capacity = 500
            ttl_secs = 60
            redis_url = "redis://cache:6379"

            [rate_limit]
            rate = 5.5
            burst = 10

            [explainer]
            url = "http://shap:50051"
            timeout_ms = 250

            [features]
            path = "data/features.json"

            [auth]
            api_key = "secret"
            admin_key = "root"
        "#;
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.server.max_batch_size, 20);
        assert_eq!(config.server.cors_origins, vec!["https://dashboard.example.com"]);
        assert_eq!(config.server.request_timeout(), Duration::from_secs(10));
        assert_eq!(config.cache.redis_url.as_deref(), Some("redis://cache:6379"));
        assert_eq!(config.auth.admin_key.as_deref(), Some("root"));

        let cache = config.cache.cache_config();
        assert_eq!(cache.l1_capacity, 500);
        assert_eq!(cache.ttl, Duration::from_secs(60));

        let limits = config.rate_limit.rate_limit_config();
        assert_eq!(limits.rate, 5.5);
        assert_eq!(limits.burst, 10);

        let explainer = config.explainer.explainer_config().unwrap();
        assert_eq!(explainer.timeout, Duration::from_millis(250));

        let model = config.model.model_config().unwrap().unwrap();
        assert_eq!(model.input_name, "input");
        assert_eq!(model.device, Device::Cpu);
    }

    #[test]
    fn no_model_path_means_no_model() {
        assert!(ModelSection::default().model_config().unwrap().is_none());
    }

    #[test]
    fn unknown_device_is_rejected() {
        let section = ModelSection {
            path: Some("m.onnx".into()),
            device: "tpu".into(),
            ..Default::default()
        };
        assert!(section.model_config().is_err());
    }

    #[test]
    fn config_not_found_returns_error() {
        let result = Config::load(Some(Path::new("/nonexistent/config.toml")));
        let err = result.unwrap_err().to_string();
        assert!(err.contains("Config file not found"));
    }

    #[test]
    fn load_from_explicit_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "[rate_limit]\nburst = 7\n").unwrap();
        let config = Config::load(Some(&path)).unwrap();
        assert_eq!(config.rate_limit.burst, 7);
    }
}
