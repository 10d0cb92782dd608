//! Measurement Loader - relays queued CSV files to the ingestion API
//!
//! ## Usage
//!
//! ```bash
//! # Against ElasticMQ + MinIO during development
//! POST_URL=http://localhost:8080/timeseries/measurements \
//! API_KEY=appkey \
//! AWS_SQS_QUEUE_URL=http://localhost:9324/queue/loader \
//! AWS_S3_ENDPOINT=localhost:9000 AWS_S3_DISABLE_SSL=true AWS_S3_FORCE_PATH_STYLE=true \
//! cargo run
//!
//! # Print payloads instead of POSTing them
//! LOADER_DRY_RUN=true AWS_SQS_QUEUE_NAME=loader cargo run
//! ```
//!
//! ## Environment Variables
//!
//! - `POST_URL`, `API_KEY`: ingestion API endpoint and key (required unless dry run)
//! - `AWS_SQS_QUEUE_URL` or `AWS_SQS_QUEUE_NAME`: queue to consume (one required)
//! - `AWS_SQS_REGION`, `AWS_SQS_ENDPOINT`: queue client overrides
//! - `AWS_S3_REGION`, `AWS_S3_ENDPOINT`, `AWS_S3_DISABLE_SSL`, `AWS_S3_FORCE_PATH_STYLE`: object store overrides
//! - `LOADER_WAIT_TIME_SECS`: long-poll wait (default: 20)
//! - `LOADER_VISIBILITY_TIMEOUT_SECS`: message lease (default: 30)
//! - `LOADER_HTTP_TIMEOUT_SECS`, `LOADER_HTTP_CONNECT_TIMEOUT_SECS`: API timeouts (default: 30, 10)
//! - `LOADER_METRICS_ADDR`: metrics server address (default: "0.0.0.0:9090", "off" disables)
//! - `LOADER_LOG_LEVEL`: log level (default: "info")
//! - `LOADER_LOG_FORMAT`: "pretty" or "json" (default: "pretty")
//! - `LOADER_DRY_RUN`: print payloads to stdout instead of POSTing

use aws_config::BehaviorVersion;
use measurement_loader::config::{Config, LogFormat};
use measurement_loader::metrics::Metrics;
use measurement_loader::metrics_server::MetricsServer;
use measurement_loader::pipeline::Loader;
use measurement_loader::post::{HttpPoster, Poster, StdoutPoster};
use measurement_loader::queue::SqsQueue;
use measurement_loader::source::S3ObjectSource;
use std::sync::Arc;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration
    let config = Config::from_env()?;

    // Initialize tracing
    init_tracing(&config);

    info!(
        post_url = %config.post_url,
        wait_time_secs = config.wait_time.as_secs(),
        visibility_timeout_secs = config.visibility_timeout.as_secs(),
        http_timeout_secs = config.http_timeout.as_secs(),
        dry_run = config.dry_run,
        "Starting measurement loader"
    );

    Metrics::init()?;

    // Object store and queue clients
    let shared = aws_config::defaults(BehaviorVersion::latest()).load().await;
    let source = Arc::new(S3ObjectSource::from_config(&shared, &config.s3));
    let queue = Arc::new(SqsQueue::from_config(&shared, &config.sqs).await?);

    let poster: Arc<dyn Poster> = if config.dry_run {
        info!("Dry run, payloads go to stdout");
        Arc::new(StdoutPoster::new())
    } else {
        Arc::new(
            HttpPoster::new(config.post_url.clone(), config.api_key.clone())?
                .timeout(config.http_timeout)?
                .connect_timeout(config.http_connect_timeout)?,
        )
    };

    let loader = Loader::new(queue, source, poster)
        .wait_time(config.wait_time)
        .visibility_timeout(config.visibility_timeout);

    let metrics_handle = config
        .metrics_addr
        .map(|addr| MetricsServer::start(addr, loader.heartbeat(), loader.stall_after()));

    let shutdown = CancellationToken::new();
    tokio::spawn(shutdown_signal(shutdown.clone()));

    loader.run(shutdown).await?;

    if let Some(handle) = metrics_handle {
        handle.abort();
    }

    info!("Measurement loader shutdown complete");
    Ok(())
}

fn init_tracing(config: &Config) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| config.log_level.as_str().into());

    let registry = tracing_subscriber::registry().with(filter);
    match config.log_format {
        LogFormat::Json => registry.with(tracing_subscriber::fmt::layer().json()).init(),
        LogFormat::Pretty => registry.with(tracing_subscriber::fmt::layer()).init(),
    }
}

async fn shutdown_signal(shutdown: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = ?e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!(error = ?e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, shutting down"),
        _ = terminate => info!("Received SIGTERM, shutting down"),
    }

    // Lets an in-flight message finish, then stops polling
    shutdown.cancel();
}
