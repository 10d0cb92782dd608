//! Prometheus metrics for the loader

use crate::error::{LoaderError, Result};
use prometheus::{
    Counter, CounterVec, Encoder, Histogram, TextEncoder, register_counter,
    register_counter_vec, register_histogram,
};
use std::sync::OnceLock;

/// Global metrics instance
static METRICS: OnceLock<Metrics> = OnceLock::new();

/// All loader metrics
pub struct Metrics {
    /// Queue messages received
    pub messages_received: Counter,

    /// Queue messages finished (by outcome: succeeded, failed)
    pub messages_processed: CounterVec,

    /// Processing failures (by error kind)
    pub failures: CounterVec,

    /// Files transformed and posted
    pub files_posted: Counter,

    /// Measurements accepted by the ingestion API
    pub measurements_posted: Counter,

    /// Ingestion API request latency
    pub post_latency: Histogram,

    /// Queue messages whose delete call failed after a successful post
    pub delete_failures: Counter,
}

impl Metrics {
    /// Initialize metrics (call once at startup)
    ///
    /// Returns error if metric registration fails.
    pub fn init() -> Result<&'static Metrics> {
        if let Some(metrics) = METRICS.get() {
            return Ok(metrics);
        }

        let metrics = Metrics {
            messages_received: register_counter!(
                "loader_messages_received_total",
                "Total queue messages received"
            )
            .map_err(|e| LoaderError::Metrics(format!("messages_received: {e}")))?,

            messages_processed: register_counter_vec!(
                "loader_messages_processed_total",
                "Total queue messages processed",
                &["outcome"]
            )
            .map_err(|e| LoaderError::Metrics(format!("messages_processed: {e}")))?,

            failures: register_counter_vec!(
                "loader_failures_total",
                "Total processing failures",
                &["kind"]
            )
            .map_err(|e| LoaderError::Metrics(format!("failures: {e}")))?,

            files_posted: register_counter!(
                "loader_files_posted_total",
                "Total files delivered to the ingestion API"
            )
            .map_err(|e| LoaderError::Metrics(format!("files_posted: {e}")))?,

            measurements_posted: register_counter!(
                "loader_measurements_posted_total",
                "Total measurements delivered to the ingestion API"
            )
            .map_err(|e| LoaderError::Metrics(format!("measurements_posted: {e}")))?,

            post_latency: register_histogram!(
                "loader_post_latency_seconds",
                "Ingestion API request latency",
                vec![0.005, 0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0]
            )
            .map_err(|e| LoaderError::Metrics(format!("post_latency: {e}")))?,

            delete_failures: register_counter!(
                "loader_delete_failures_total",
                "Total queue delete calls that failed after a successful post"
            )
            .map_err(|e| LoaderError::Metrics(format!("delete_failures: {e}")))?,
        };

        // Set the metrics (only succeeds once)
        let _ = METRICS.set(metrics);

        METRICS
            .get()
            .ok_or_else(|| LoaderError::Metrics("Failed to initialize metrics".to_string()))
    }

    /// Get the global metrics instance
    ///
    /// Returns None if metrics haven't been initialized yet.
    pub fn get() -> Option<&'static Metrics> {
        METRICS.get()
    }
}

/// Gather all metrics and encode as Prometheus text format
pub fn gather() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    if encoder.encode(&metric_families, &mut buffer).is_ok() {
        String::from_utf8(buffer).unwrap_or_default()
    } else {
        String::new()
    }
}

/// Record a received message if metrics are initialized
pub fn try_record_received() {
    if let Some(m) = Metrics::get() {
        m.messages_received.inc();
    }
}

/// Record a finished message if metrics are initialized
pub fn try_record_processed(outcome: &str) {
    if let Some(m) = Metrics::get() {
        m.messages_processed.with_label_values(&[outcome]).inc();
    }
}

/// Record a failure by error kind if metrics are initialized
pub fn try_record_failure(kind: &str) {
    if let Some(m) = Metrics::get() {
        m.failures.with_label_values(&[kind]).inc();
    }
}

/// Record a delivered file if metrics are initialized
pub fn try_record_posted(measurements: usize, seconds: f64) {
    if let Some(m) = Metrics::get() {
        m.files_posted.inc();
        m.measurements_posted.inc_by(measurements as f64);
        m.post_latency.observe(seconds);
    }
}

/// Record a failed delete if metrics are initialized
pub fn try_record_delete_failure() {
    if let Some(m) = Metrics::get() {
        m.delete_failures.inc();
    }
}
