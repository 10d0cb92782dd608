//! Measurement Loader - queue-driven CSV ingestion
//!
//! Listens on a message queue for object-storage notifications, reads the
//! announced CSV files of time-series measurements, and relays them to a
//! time-series ingestion API.
//!
//! # Architecture
//!
//! ```text
//! MessageQueue ──► envelope::decode ──► CsvTransformer ──► Poster ──► delete message
//!                                          (ObjectSource)    (HTTP 201)
//! ```
//!
//! Queue, object source and poster are traits; the binaries wire in the SQS,
//! S3 and HTTP implementations, tests use the in-memory ones.

#![deny(unsafe_code)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]
#![warn(clippy::panic)]

pub mod config;
pub mod envelope;
pub mod error;
pub mod ingest;
pub mod measurement;
pub mod metrics;
pub mod metrics_server;
pub mod pipeline;
pub mod post;
pub mod queue;
pub mod source;

pub use config::Config;
pub use envelope::FileEventRecord;
pub use error::{LoaderError, Result, RowField};
pub use ingest::{CsvTransformer, TransformedFile};
pub use measurement::{Measurement, MeasurementCollection};
pub use pipeline::{Heartbeat, Loader, MessageState, MessageSummary};
pub use post::{HttpPoster, PostReport, Poster, StdoutPoster};
pub use queue::{MemoryQueue, MessageQueue, QueueMessage, ReceiveOptions, SqsQueue};
pub use source::{MemoryObjectSource, ObjectSource, S3ObjectSource};
