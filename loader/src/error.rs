//! Error types for the measurement loader

use std::fmt;
use thiserror::Error;

/// Result type alias for loader operations
pub type Result<T> = std::result::Result<T, LoaderError>;

/// CSV field that failed to parse
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowField {
    /// Column 0
    SeriesId,
    /// Column 1
    Timestamp,
    /// Column 2
    Value,
    /// Row did not have exactly three columns
    FieldCount,
    /// Row could not be read at all (bad quoting, invalid UTF-8)
    Record,
}

impl fmt::Display for RowField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RowField::SeriesId => "series id",
            RowField::Timestamp => "timestamp",
            RowField::Value => "value",
            RowField::FieldCount => "field count",
            RowField::Record => "record",
        };
        f.write_str(name)
    }
}

/// Main error type for the loader
#[derive(Error, Debug)]
pub enum LoaderError {
    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Queue message body is not a well-formed notification envelope
    #[error("envelope decode error: {0}")]
    EnvelopeDecode(String),

    /// Object could not be fetched from the object store
    #[error("failed to retrieve s3://{bucket}/{key}: {reason}")]
    ObjectRetrieval {
        bucket: String,
        key: String,
        reason: String,
    },

    /// CSV row failed validation; the whole file is rejected
    #[error("row {row} (line {line}): invalid {field} {value:?}: {reason}")]
    RowParse {
        /// 0-based index among non-blank rows
        row: usize,
        /// 1-based line in the file
        line: u64,
        field: RowField,
        value: String,
        reason: String,
    },

    /// Ingestion API unreachable (connect failure, timeout, DNS)
    #[error("transport error: {0}")]
    Transport(String),

    /// Ingestion API answered with anything other than 201
    #[error("ingestion API rejected request with status {status}: {body}")]
    ApiRejection { status: u16, body: String },

    /// Message queue operation failed
    #[error("queue error: {0}")]
    Queue(String),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Metrics error
    #[error("metrics error: {0}")]
    Metrics(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl LoaderError {
    /// Short label used for metrics and structured logs
    pub fn kind(&self) -> &'static str {
        match self {
            LoaderError::Config(_) => "config",
            LoaderError::EnvelopeDecode(_) => "envelope_decode",
            LoaderError::ObjectRetrieval { .. } => "object_retrieval",
            LoaderError::RowParse { .. } => "row_parse",
            LoaderError::Transport(_) => "transport",
            LoaderError::ApiRejection { .. } => "api_rejection",
            LoaderError::Queue(_) => "queue",
            LoaderError::Serialization(_) => "serialization",
            LoaderError::Metrics(_) => "metrics",
            LoaderError::Io(_) => "io",
        }
    }

    pub(crate) fn retrieval(bucket: &str, key: &str, reason: impl Into<String>) -> Self {
        LoaderError::ObjectRetrieval {
            bucket: bucket.to_string(),
            key: key.to_string(),
            reason: reason.into(),
        }
    }
}

impl From<serde_json::Error> for LoaderError {
    fn from(err: serde_json::Error) -> Self {
        LoaderError::Serialization(err.to_string())
    }
}
