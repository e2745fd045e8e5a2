//! huginnd — Huginn prediction daemon.
//!
//! Serves the [`PredictionService`](huginn::PredictionService) over HTTP.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use huginn::server::config::Config;
use huginn::server::{AppState, app};
use huginn::{
    ExplanationClient, FileFeatureStore, HuginnError, PredictionIntervals, PredictionService,
    RateLimiter, SharedStoreConnector, TieredCache,
};

/// Huginn daemon — forecast serving with tiered caching and admission control.
#[derive(Parser)]
#[command(name = "huginnd")]
#[command(version = huginn::version::PKG_VERSION)]
#[command(about = "Huginn forecast serving daemon")]
struct Args {
    /// Path to configuration file.
    #[arg(short, long, env = "HUGINN_CONFIG")]
    config: Option<PathBuf>,

    /// Address to bind to.
    #[arg(long, env = "HUGINN_ADDRESS")]
    address: Option<String>,

    /// Path to the ONNX model.
    #[arg(long, env = "HUGINN_MODEL_PATH")]
    model_path: Option<PathBuf>,

    /// Shared cache URL, e.g. redis://localhost:6379.
    #[arg(long, env = "HUGINN_REDIS_URL")]
    redis_url: Option<String>,

    /// L1 cache capacity in entries.
    #[arg(long, env = "HUGINN_CACHE_CAPACITY")]
    cache_capacity: Option<usize>,

    /// Cache entry TTL in seconds.
    #[arg(long, env = "HUGINN_CACHE_TTL_SECS")]
    cache_ttl_secs: Option<u64>,

    /// Per-client request rate (tokens per second).
    #[arg(long, env = "HUGINN_RATE")]
    rate: Option<f64>,

    /// Per-client burst capacity.
    #[arg(long, env = "HUGINN_BURST")]
    burst: Option<u32>,

    /// Comma-separated browser origins allowed by CORS.
    #[arg(long, env = "HUGINN_CORS_ORIGINS", value_delimiter = ',')]
    cors_origins: Option<Vec<String>>,
}

impl Args {
    /// Apply command-line overrides on top of the file configuration.
    fn apply(self, mut config: Config) -> Config {
        if let Some(address) = self.address {
            config.server.address = address;
        }
        if let Some(path) = self.model_path {
            config.model.path = Some(path);
        }
        if let Some(url) = self.redis_url {
            config.cache.redis_url = Some(url);
        }
        if let Some(capacity) = self.cache_capacity {
            config.cache.l1_capacity = capacity;
        }
        if let Some(ttl) = self.cache_ttl_secs {
            config.cache.ttl_secs = ttl;
        }
        if let Some(rate) = self.rate {
            config.rate_limit.rate = rate;
        }
        if let Some(burst) = self.burst {
            config.rate_limit.burst = burst;
        }
        if let Some(origins) = self.cors_origins {
            config.server.cors_origins = origins;
        }
        config
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let args = Args::parse();

    // Load configuration
    let config = Config::load(args.config.as_deref())?;
    let config = args.apply(config);

    // Parse address
    let addr: SocketAddr = config
        .server
        .address
        .parse()
        .map_err(|e| HuginnError::Configuration(format!("Invalid address: {e}")))?;

    info!(version = huginn::version_string(), %addr, "huginnd starting");

    let metrics = PrometheusBuilder::new().install_recorder()?;
    let upkeep = spawn_metrics_upkeep(metrics.clone());

    let limiter = Arc::new(RateLimiter::new(config.rate_limit.rate_limit_config())?);
    let sweeper = limiter.spawn_sweeper();

    let service = Arc::new(build_service(&config, limiter).await?);

    let state = AppState::new(service.clone())
        .api_key(config.auth.api_key.clone())
        .admin_key(config.auth.admin_key.clone())
        .metrics(metrics);
    info!(origins = ?config.server.cors_origins, "CORS origins");
    let app = app(state, &config.server);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "listening");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    sweeper.abort();
    upkeep.abort();
    service.shutdown();
    info!("huginnd stopped");

    Ok(())
}

/// Assemble the prediction service from configuration.
async fn build_service(
    config: &Config,
    limiter: Arc<RateLimiter>,
) -> Result<PredictionService, HuginnError> {
    let mut builder = PredictionService::builder()
        .rate_limiter(limiter)
        .max_batch_size(config.server.max_batch_size);

    // Inference engine
    if let Some(model) = config.model.model_config()? {
        #[cfg(feature = "onnx")]
        match huginn::OnnxEngine::load(&model) {
            Ok(engine) => builder = builder.engine(Arc::new(engine)),
            Err(e) => warn!(error = %e, "model failed to load, serving cached predictions only"),
        }
        #[cfg(not(feature = "onnx"))]
        warn!(
            path = %model.path.display(),
            "built without the onnx feature, model not loaded"
        );
    }

    // Cache
    let connector = shared_connector(config);
    let cache = TieredCache::connect(config.cache.cache_config(), connector).await;
    builder = builder.cache(cache);

    // Optional collaborators
    if let Some(path) = &config.features.path {
        match FileFeatureStore::open(path) {
            Ok(store) => builder = builder.feature_store(Arc::new(store)),
            Err(e) => warn!(error = %e, path = %path.display(), "feature store not loaded"),
        }
    }

    if let Some(path) = &config.model.intervals_path {
        match PredictionIntervals::load(path) {
            Ok(intervals) => builder = builder.intervals(intervals),
            Err(e) => warn!(error = %e, path = %path.display(), "prediction intervals not loaded"),
        }
    }

    if let Some(explainer) = config.explainer.explainer_config() {
        builder = builder.explainer(ExplanationClient::new(&explainer)?);
    }

    builder.build()
}

#[cfg(feature = "redis")]
fn shared_connector(config: &Config) -> Option<Arc<dyn SharedStoreConnector>> {
    let url = config.cache.redis_url.as_ref()?;
    let connector = huginn::RedisConnector::new(url)
        .connect_timeout(Duration::from_secs(config.cache.connect_timeout_secs));
    Some(Arc::new(connector))
}

#[cfg(not(feature = "redis"))]
fn shared_connector(config: &Config) -> Option<Arc<dyn SharedStoreConnector>> {
    if config.cache.redis_url.is_some() {
        warn!("built without the redis feature, running L1-only");
    }
    None
}

/// Histogram summaries are only trimmed when upkeep runs.
fn spawn_metrics_upkeep(handle: PrometheusHandle) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_secs(5));
        loop {
            ticker.tick().await;
            handle.run_upkeep();
        }
    })
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "failed to listen for ctrl-c");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
    info!("shutdown signal received");
}
