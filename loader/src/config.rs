//! Configuration for the measurement loader
//!
//! Everything is read once from environment variables at startup. Variable
//! names match the deployed loader (`POST_URL`, `AWS_SQS_QUEUE_URL`, ...);
//! loader tuning knobs use the `LOADER_` prefix.

use crate::error::{LoaderError, Result};
use reqwest::Url;
use std::env;
use std::net::SocketAddr;
use std::time::Duration;

/// Longest long-poll wait the queue service accepts
pub const MAX_WAIT_TIME_SECS: u64 = 20;
/// Longest visibility timeout the queue service accepts (12 hours)
pub const MAX_VISIBILITY_TIMEOUT_SECS: u64 = 43_200;

/// Main configuration for the loader
#[derive(Debug, Clone)]
pub struct Config {
    /// Ingestion API endpoint
    pub post_url: String,

    /// Ingestion API key, sent as the `key` query parameter
    pub api_key: String,

    /// Object store settings
    pub s3: S3Config,

    /// Queue settings
    pub sqs: SqsConfig,

    /// Long-poll wait per receive call
    pub wait_time: Duration,

    /// Lease granted to a received message
    pub visibility_timeout: Duration,

    /// Overall HTTP request timeout for the ingestion API
    pub http_timeout: Duration,

    /// HTTP connect timeout for the ingestion API
    pub http_connect_timeout: Duration,

    /// Metrics server address (`off` disables the server)
    pub metrics_addr: Option<SocketAddr>,

    /// Log level
    pub log_level: String,

    /// Log format (json or pretty)
    pub log_format: LogFormat,

    /// Print payloads to stdout instead of POSTing them
    pub dry_run: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Json,
    Pretty,
}

/// Object store (S3 or S3-compatible, e.g. MinIO) settings
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct S3Config {
    pub region: Option<String>,
    pub endpoint: Option<String>,
    pub disable_ssl: bool,
    pub force_path_style: bool,
}

/// Queue (SQS or an emulator such as ElasticMQ) settings
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SqsConfig {
    pub region: Option<String>,
    pub endpoint: Option<String>,
    /// Used as-is when set
    pub queue_url: Option<String>,
    /// Resolved to a URL through the queue service when `queue_url` is unset
    pub queue_name: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            post_url: String::new(),
            api_key: String::new(),
            s3: S3Config::default(),
            sqs: SqsConfig::default(),
            wait_time: Duration::from_secs(MAX_WAIT_TIME_SECS),
            visibility_timeout: Duration::from_secs(30),
            http_timeout: Duration::from_secs(30),
            http_connect_timeout: Duration::from_secs(10),
            metrics_addr: Some(SocketAddr::from(([0, 0, 0, 0], 9090))),
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            dry_run: false,
        }
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(env_lookup)
    }

    /// Load configuration from an arbitrary variable lookup
    ///
    /// Empty values are treated as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Config::default();

        if let Some(dry_run) = lookup("LOADER_DRY_RUN") {
            config.dry_run = parse_bool("LOADER_DRY_RUN", &dry_run)?;
        }

        match lookup("POST_URL") {
            Some(url) => {
                parse_post_url(&url)?;
                config.post_url = url;
            }
            None if !config.dry_run => {
                return Err(LoaderError::Config("POST_URL is required".to_string()));
            }
            None => {}
        }

        match lookup("API_KEY") {
            Some(key) => config.api_key = key,
            None if !config.dry_run => {
                return Err(LoaderError::Config("API_KEY is required".to_string()));
            }
            None => {}
        }

        config.s3 = S3Config::from_lookup(&lookup)?;
        config.sqs = SqsConfig::from_lookup(&lookup)?;

        if let Some(secs) = lookup("LOADER_WAIT_TIME_SECS") {
            let secs = parse_secs("LOADER_WAIT_TIME_SECS", &secs)?;
            if secs > MAX_WAIT_TIME_SECS {
                return Err(LoaderError::Config(format!(
                    "invalid LOADER_WAIT_TIME_SECS: {secs} (maximum is {MAX_WAIT_TIME_SECS})"
                )));
            }
            config.wait_time = Duration::from_secs(secs);
        }

        if let Some(secs) = lookup("LOADER_VISIBILITY_TIMEOUT_SECS") {
            let secs = parse_secs("LOADER_VISIBILITY_TIMEOUT_SECS", &secs)?;
            if secs > MAX_VISIBILITY_TIMEOUT_SECS {
                return Err(LoaderError::Config(format!(
                    "invalid LOADER_VISIBILITY_TIMEOUT_SECS: {secs} (maximum is {MAX_VISIBILITY_TIMEOUT_SECS})"
                )));
            }
            config.visibility_timeout = Duration::from_secs(secs);
        }

        if let Some(secs) = lookup("LOADER_HTTP_TIMEOUT_SECS") {
            config.http_timeout =
                Duration::from_secs(parse_nonzero_secs("LOADER_HTTP_TIMEOUT_SECS", &secs)?);
        }

        if let Some(secs) = lookup("LOADER_HTTP_CONNECT_TIMEOUT_SECS") {
            config.http_connect_timeout = Duration::from_secs(parse_nonzero_secs(
                "LOADER_HTTP_CONNECT_TIMEOUT_SECS",
                &secs,
            )?);
        }

        if let Some(addr) = lookup("LOADER_METRICS_ADDR") {
            config.metrics_addr = match addr.as_str() {
                "off" => None,
                addr => Some(addr.parse().map_err(|e| {
                    LoaderError::Config(format!("invalid LOADER_METRICS_ADDR: {e}"))
                })?),
            };
        }

        if let Some(level) = lookup("LOADER_LOG_LEVEL") {
            config.log_level = level;
        }

        if let Some(format) = lookup("LOADER_LOG_FORMAT") {
            config.log_format = match format.to_lowercase().as_str() {
                "json" => LogFormat::Json,
                "pretty" => LogFormat::Pretty,
                other => {
                    return Err(LoaderError::Config(format!(
                        "invalid LOADER_LOG_FORMAT: {other} (expected 'json' or 'pretty')"
                    )));
                }
            };
        }

        Ok(config)
    }
}

impl S3Config {
    /// Read `AWS_S3_*` variables
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = S3Config {
            region: lookup("AWS_S3_REGION"),
            endpoint: lookup("AWS_S3_ENDPOINT"),
            ..Default::default()
        };

        if let Some(v) = lookup("AWS_S3_DISABLE_SSL") {
            config.disable_ssl = parse_bool("AWS_S3_DISABLE_SSL", &v)?;
        }
        if let Some(v) = lookup("AWS_S3_FORCE_PATH_STYLE") {
            config.force_path_style = parse_bool("AWS_S3_FORCE_PATH_STYLE", &v)?;
        }

        Ok(config)
    }

    /// Endpoint URL with a scheme, honoring `disable_ssl` for bare host:port endpoints
    pub fn endpoint_url(&self) -> Option<String> {
        self.endpoint.as_ref().map(|endpoint| {
            if endpoint.contains("://") {
                endpoint.clone()
            } else if self.disable_ssl {
                format!("http://{endpoint}")
            } else {
                format!("https://{endpoint}")
            }
        })
    }
}

impl SqsConfig {
    /// Read `AWS_SQS_*` variables from the process environment
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(env_lookup)
    }

    /// Read `AWS_SQS_*` variables
    ///
    /// One of `AWS_SQS_QUEUE_URL` or `AWS_SQS_QUEUE_NAME` must be present.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let config = SqsConfig {
            region: lookup("AWS_SQS_REGION"),
            endpoint: lookup("AWS_SQS_ENDPOINT"),
            queue_url: lookup("AWS_SQS_QUEUE_URL"),
            queue_name: lookup("AWS_SQS_QUEUE_NAME"),
        };

        if config.queue_url.is_none() && config.queue_name.is_none() {
            return Err(LoaderError::Config(
                "one of AWS_SQS_QUEUE_URL or AWS_SQS_QUEUE_NAME is required".to_string(),
            ));
        }

        Ok(config)
    }
}

/// Parse an ingestion API endpoint; only absolute http(s) URLs are accepted
pub fn parse_post_url(value: &str) -> Result<Url> {
    let url = Url::parse(value)
        .map_err(|e| LoaderError::Config(format!("invalid POST_URL {value:?}: {e}")))?;

    match url.scheme() {
        "http" | "https" if url.has_host() => Ok(url),
        _ => Err(LoaderError::Config(format!(
            "invalid POST_URL {value:?}: expected an http or https URL"
        ))),
    }
}

fn env_lookup(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.is_empty())
}

fn parse_bool(name: &str, value: &str) -> Result<bool> {
    match value.to_lowercase().as_str() {
        "1" | "t" | "true" => Ok(true),
        "0" | "f" | "false" => Ok(false),
        other => Err(LoaderError::Config(format!(
            "invalid {name}: {other} (expected true or false)"
        ))),
    }
}

fn parse_secs(name: &str, value: &str) -> Result<u64> {
    value
        .parse()
        .map_err(|e| LoaderError::Config(format!("invalid {name}: {e}")))
}

fn parse_nonzero_secs(name: &str, value: &str) -> Result<u64> {
    match parse_secs(name, value)? {
        0 => Err(LoaderError::Config(format!("invalid {name}: must be > 0"))),
        secs => Ok(secs),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    const REQUIRED: &[(&str, &str)] = &[
        ("POST_URL", "http://api.local/timeseries/measurements"),
        ("API_KEY", "secret"),
        ("AWS_SQS_QUEUE_NAME", "loader"),
    ];

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.wait_time, Duration::from_secs(20));
        assert_eq!(config.visibility_timeout, Duration::from_secs(30));
        assert_eq!(config.http_timeout, Duration::from_secs(30));
        assert!(!config.dry_run);
    }

    #[test]
    fn test_config_from_required_vars() {
        let config = Config::from_lookup(lookup_from(REQUIRED)).unwrap();
        assert_eq!(config.post_url, "http://api.local/timeseries/measurements");
        assert_eq!(config.api_key, "secret");
        assert_eq!(config.sqs.queue_name.as_deref(), Some("loader"));
        assert_eq!(config.sqs.queue_url, None);
        assert_eq!(config.log_format, LogFormat::Pretty);
    }

    #[test]
    fn test_missing_post_url_is_rejected() {
        let err = Config::from_lookup(lookup_from(&[
            ("API_KEY", "secret"),
            ("AWS_SQS_QUEUE_NAME", "loader"),
        ]))
        .unwrap_err();
        assert!(matches!(err, LoaderError::Config(msg) if msg.contains("POST_URL")));
    }

    #[test]
    fn test_post_url_without_scheme_is_rejected() {
        let mut vars = REQUIRED.to_vec();
        vars.retain(|(k, _)| *k != "POST_URL");
        vars.push(("POST_URL", "localhost:8080/timeseries/measurements"));

        let err = Config::from_lookup(lookup_from(&vars)).unwrap_err();
        assert!(matches!(err, LoaderError::Config(msg) if msg.contains("POST_URL")));
    }

    #[test]
    fn test_parse_post_url() {
        let url = parse_post_url("https://api.example.com/timeseries/measurements").unwrap();
        assert_eq!(url.host_str(), Some("api.example.com"));

        assert!(parse_post_url("http://127.0.0.1:8080/m").is_ok());
        assert!(parse_post_url("localhost:8080/m").is_err());
        assert!(parse_post_url("ftp://example.com/m").is_err());
        assert!(parse_post_url("/timeseries/measurements").is_err());
    }

    #[test]
    fn test_dry_run_does_not_need_api() {
        let config = Config::from_lookup(lookup_from(&[
            ("LOADER_DRY_RUN", "true"),
            ("AWS_SQS_QUEUE_URL", "http://localhost:9324/queue/loader"),
        ]))
        .unwrap();
        assert!(config.dry_run);
        assert!(config.post_url.is_empty());
    }

    #[test]
    fn test_queue_identity_is_required() {
        let err = SqsConfig::from_lookup(lookup_from(&[])).unwrap_err();
        assert!(matches!(err, LoaderError::Config(_)));
    }

    #[test]
    fn test_tuning_overrides() {
        let mut vars = REQUIRED.to_vec();
        vars.extend([
            ("LOADER_WAIT_TIME_SECS", "5"),
            ("LOADER_VISIBILITY_TIMEOUT_SECS", "120"),
            ("LOADER_HTTP_TIMEOUT_SECS", "3"),
            ("LOADER_METRICS_ADDR", "127.0.0.1:9191"),
            ("LOADER_LOG_FORMAT", "JSON"),
        ]);
        let config = Config::from_lookup(lookup_from(&vars)).unwrap();
        assert_eq!(config.wait_time, Duration::from_secs(5));
        assert_eq!(config.visibility_timeout, Duration::from_secs(120));
        assert_eq!(config.http_timeout, Duration::from_secs(3));
        assert_eq!(config.metrics_addr, Some("127.0.0.1:9191".parse().unwrap()));
        assert_eq!(config.log_format, LogFormat::Json);
    }

    #[test]
    fn test_metrics_can_be_disabled() {
        let mut vars = REQUIRED.to_vec();
        vars.push(("LOADER_METRICS_ADDR", "off"));
        let config = Config::from_lookup(lookup_from(&vars)).unwrap();
        assert_eq!(config.metrics_addr, None);
    }

    #[test]
    fn test_wait_time_above_queue_limit_is_rejected() {
        let mut vars = REQUIRED.to_vec();
        vars.push(("LOADER_WAIT_TIME_SECS", "21"));
        assert!(Config::from_lookup(lookup_from(&vars)).is_err());
    }

    #[test]
    fn test_zero_http_timeout_is_rejected() {
        let mut vars = REQUIRED.to_vec();
        vars.push(("LOADER_HTTP_TIMEOUT_SECS", "0"));
        assert!(Config::from_lookup(lookup_from(&vars)).is_err());
    }

    #[test]
    fn test_s3_endpoint_scheme() {
        let s3 = S3Config::from_lookup(lookup_from(&[
            ("AWS_S3_ENDPOINT", "minio:9000"),
            ("AWS_S3_DISABLE_SSL", "true"),
            ("AWS_S3_FORCE_PATH_STYLE", "1"),
        ]))
        .unwrap();
        assert!(s3.force_path_style);
        assert_eq!(s3.endpoint_url().as_deref(), Some("http://minio:9000"));

        let s3 = S3Config {
            endpoint: Some("http://localhost:9000".to_string()),
            ..Default::default()
        };
        assert_eq!(s3.endpoint_url().as_deref(), Some("http://localhost:9000"));
    }

    #[test]
    fn test_invalid_bool_is_rejected() {
        let err = S3Config::from_lookup(lookup_from(&[("AWS_S3_DISABLE_SSL", "maybe")]));
        assert!(err.is_err());
    }
}
