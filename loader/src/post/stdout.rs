//! Stdout poster for dry runs
//!
//! Prints the payload that would have been POSTed and reports it as created.
//! Useful for local development without an ingestion API.

use crate::error::Result;
use crate::measurement::MeasurementCollection;
use crate::post::{PostReport, Poster, encode_payload};
use async_trait::async_trait;
use std::io::Write;
use std::time::Instant;

/// Stdout poster - prints payloads instead of sending them
#[derive(Debug, Default)]
pub struct StdoutPoster;

impl StdoutPoster {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Poster for StdoutPoster {
    fn name(&self) -> &'static str {
        "stdout"
    }

    async fn post(&self, collections: &[MeasurementCollection]) -> Result<PostReport> {
        let started = Instant::now();
        let payload = encode_payload(collections)?;

        let mut stdout = std::io::stdout().lock();
        stdout.write_all(&payload)?;
        writeln!(stdout)?;

        Ok(PostReport::new(201, collections, started.elapsed()))
    }
}
