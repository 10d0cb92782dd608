//! Scrape and health endpoints
//!
//! `/metrics` serves the Prometheus registry. `/health` reports on the poll
//! loop itself: it answers 503 until the loop first reaches the queue, and
//! again whenever the loop has gone quiet for longer than its stall window.
//!
//! # Example
//!
//! ```ignore
//! let handle = MetricsServer::start(addr, loader.heartbeat(), loader.stall_after());
//! loader.run(shutdown).await?;
//! handle.abort();
//! ```

use crate::pipeline::Heartbeat;
use axum::{
    Router,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{error, info};

#[derive(Clone)]
struct LoopHealth {
    heartbeat: Heartbeat,
    stall_after: Duration,
}

/// Metrics and health HTTP server
pub struct MetricsServer;

impl MetricsServer {
    /// Serve `/metrics` and `/health` on `addr` in a background task
    ///
    /// Returns a JoinHandle that can be used to abort the server.
    pub fn start(addr: SocketAddr, heartbeat: Heartbeat, stall_after: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let listener = match tokio::net::TcpListener::bind(addr).await {
                Ok(l) => l,
                Err(e) => {
                    error!(error = %e, %addr, "Failed to bind metrics server");
                    return;
                }
            };

            info!(%addr, stall_after_secs = stall_after.as_secs(), "Metrics server listening");

            if let Err(e) = axum::serve(listener, router(heartbeat, stall_after)).await {
                error!(error = %e, "Metrics server error");
            }
        })
    }
}

fn router(heartbeat: Heartbeat, stall_after: Duration) -> Router {
    Router::new()
        .route("/metrics", get(metrics_handler))
        .route("/health", get(health_handler))
        .with_state(LoopHealth {
            heartbeat,
            stall_after,
        })
}

async fn metrics_handler() -> impl IntoResponse {
    (
        StatusCode::OK,
        [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
        crate::metrics::gather(),
    )
}

async fn health_handler(State(health): State<LoopHealth>) -> Response {
    match health.heartbeat.since_last() {
        None => (StatusCode::SERVICE_UNAVAILABLE, "starting").into_response(),
        Some(age) if age > health.stall_after => (
            StatusCode::SERVICE_UNAVAILABLE,
            format!("stalled: last poll {}s ago", age.as_secs()),
        )
            .into_response(),
        Some(_) => (StatusCode::OK, "OK").into_response(),
    }
}
