//! HTTP poster for the time-series ingestion API
//!
//! POSTs collections as JSON to `{url}?key={api_key}`.
//!
//! # Example
//!
//! ```ignore
//! let poster = HttpPoster::new("https://api.example.com/timeseries/measurements", "secret")?
//!     .timeout(Duration::from_secs(10));
//! ```

use crate::config::parse_post_url;
use crate::error::{LoaderError, Result};
use crate::measurement::MeasurementCollection;
use crate::post::{PostReport, Poster, encode_payload};
use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, StatusCode, Url, redirect};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Default request timeout in seconds
const DEFAULT_TIMEOUT_SECS: u64 = 30;
/// Default connection timeout in seconds
const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;

/// HTTP poster - one POST per file, success only on 201
pub struct HttpPoster {
    client: Client,
    url: Url,
    api_key: String,
    timeout: Duration,
    connect_timeout: Duration,
}

impl HttpPoster {
    /// Create a new HttpPoster for the given endpoint and API key
    ///
    /// Uses default timeouts: 30s request timeout, 10s connection timeout.
    /// Redirects are never followed.
    ///
    /// # Errors
    /// Returns `LoaderError::Config` if `url` is not an absolute http(s) URL or
    /// the HTTP client cannot be created
    pub fn new(url: impl AsRef<str>, api_key: impl Into<String>) -> Result<Self> {
        Self::build(
            parse_post_url(url.as_ref())?,
            api_key.into(),
            Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS),
        )
    }

    /// Replace the overall request timeout
    pub fn timeout(self, timeout: Duration) -> Result<Self> {
        Self::build(self.url, self.api_key, timeout, self.connect_timeout)
    }

    /// Replace the connection timeout
    pub fn connect_timeout(self, connect_timeout: Duration) -> Result<Self> {
        Self::build(self.url, self.api_key, self.timeout, connect_timeout)
    }

    fn build(
        url: Url,
        api_key: String,
        timeout: Duration,
        connect_timeout: Duration,
    ) -> Result<Self> {
        let client = Client::builder()
            .redirect(redirect::Policy::none())
            .timeout(timeout)
            .connect_timeout(connect_timeout)
            .build()
            .map_err(|e| LoaderError::Config(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            url,
            api_key,
            timeout,
            connect_timeout,
        })
    }

    pub fn url(&self) -> &str {
        self.url.as_str()
    }
}

#[async_trait]
impl Poster for HttpPoster {
    fn name(&self) -> &'static str {
        "http"
    }

    async fn post(&self, collections: &[MeasurementCollection]) -> Result<PostReport> {
        let body = encode_payload(collections)?;
        let started = Instant::now();

        let response = self
            .client
            .post(self.url.clone())
            .query(&[("key", self.api_key.as_str())])
            .header(CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .await
            .map_err(|e| {
                LoaderError::Transport(if e.is_timeout() {
                    format!("request to {} timed out after {:?}", self.url, self.timeout)
                } else {
                    format!("failed to reach {}: {e}", self.url)
                })
            })?;

        let status = response.status();
        if status == StatusCode::CREATED {
            let report = PostReport::new(status.as_u16(), collections, started.elapsed());
            debug!(
                url = %self.url,
                status = %status,
                collections = report.collections,
                measurements = report.measurements,
                "Measurements delivered"
            );
            return Ok(report);
        }

        let body = match response.text().await {
            Ok(body) => body,
            Err(e) => {
                warn!(
                    url = %self.url,
                    status = %status,
                    error = %e,
                    "Failed to read rejection body"
                );
                format!("<unreadable body: {e}>")
            }
        };
        Err(LoaderError::ApiRejection {
            status: status.as_u16(),
            body,
        })
    }
}
