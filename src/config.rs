//! Application configuration loaded from environment variables.
//!
//! # Configuration Hierarchy
//!
//! All configuration is loaded from environment variables with defaults
//! suitable for local development. A `.env` file is honoured when present.
//!
//! # Upstream
//!
//! - `UPSTREAM_BASE_URL`: Root of the posts service (default: `https://jsonplaceholder.typicode.com`)
//! - `UPSTREAM_TIMEOUT_SECS`: Bound on one upstream call, body included (default: 10)
//! - `UPSTREAM_CONNECT_TIMEOUT_SECS`: Bound on connection setup (default: 5)
//! - `UPSTREAM_STATUS_POLICY`: `relay` (default) or `strict`
//!
//! # Server
//!
//! - `HOST` / `PORT`: Listen address (default: `0.0.0.0:8080`)
//! - `REQUEST_TIMEOUT_SECS`: Inbound bound until the response head is ready (default: 30)
//! - `SHUTDOWN_GRACE_SECS`: Drain window on shutdown (default: 5)
//!
//! # Observability
//!
//! - `LOG_LEVEL`: `DEBUG`, `INFO`, `WARN` or `ERROR` (default: `INFO`)
//! - `LOG_FORMAT`: `json` (default) or `pretty`
//! - `METRICS_PORT`: Prometheus listener port (default: 0 = disabled)

use std::env;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use url::Url;

use crate::error::{ProxyError, ProxyResult};

/// Default upstream when `UPSTREAM_BASE_URL` is unset.
pub const DEFAULT_UPSTREAM_BASE_URL: &str = "https://jsonplaceholder.typicode.com";

/// How non-success upstream statuses reach the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UpstreamStatusPolicy {
    /// Relay whatever status the upstream returned.
    #[default]
    Relay,
    /// Only 200, 201 and 204 are relayed; anything else becomes 502.
    Strict,
}

impl FromStr for UpstreamStatusPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "relay" => Ok(Self::Relay),
            "strict" => Ok(Self::Strict),
            other => Err(format!("expected `relay` or `strict`, got `{other}`")),
        }
    }
}

impl fmt::Display for UpstreamStatusPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Relay => f.write_str("relay"),
            Self::Strict => f.write_str("strict"),
        }
    }
}

/// Output format of log records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// One JSON object per line on stdout.
    #[default]
    Json,
    /// Human-readable, for local development.
    Pretty,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "pretty" | "text" => Ok(Self::Pretty),
            other => Err(format!("expected `json` or `pretty`, got `{other}`")),
        }
    }
}

impl fmt::Display for LogFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Json => f.write_str("json"),
            Self::Pretty => f.write_str("pretty"),
        }
    }
}

/// Application configuration loaded from environment variables.
///
/// # Example
///
/// ```rust,ignore
/// let config = Config::from_env()?;
/// println!("Proxying {} on {}", config.upstream_base_url, config.server_addr());
/// ```
#[derive(Debug, Clone)]
pub struct Config {
    // =========================================================================
    // Server Configuration
    // =========================================================================
    /// Server host address (default: "0.0.0.0")
    pub host: String,

    /// Server port (default: 8080)
    pub port: u16,

    /// Inbound request timeout, until the response head is produced (default: 30s)
    pub request_timeout: Duration,

    /// How long in-flight requests may run after a shutdown signal (default: 5s)
    pub shutdown_grace: Duration,

    /// Bound on receiving a request head on an inbound connection (default: 10s)
    pub connection_read_timeout: Duration,

    /// Keep-alive connections with no request activity are closed after this (default: 30s)
    pub connection_idle_timeout: Duration,

    // =========================================================================
    // Upstream Configuration
    // =========================================================================
    /// Upstream root URL without trailing slash
    pub upstream_base_url: String,

    /// Total bound on one upstream call (default: 10s)
    pub upstream_timeout: Duration,

    /// Bound on establishing an upstream connection (default: 5s)
    pub upstream_connect_timeout: Duration,

    /// Relay upstream statuses verbatim, or coerce non-success to 502
    pub upstream_status_policy: UpstreamStatusPolicy,

    // =========================================================================
    // Observability Configuration
    // =========================================================================
    /// Log level name (`DEBUG`, `INFO`, `WARN`, `ERROR`)
    pub log_level: String,

    /// Log record format
    pub log_format: LogFormat,

    /// Port for Prometheus metrics endpoint (default: 0 = disabled)
    pub metrics_port: u16,
}

impl Config {
    /// Load configuration from environment variables with defaults.
    ///
    /// # Errors
    ///
    /// Returns `ProxyError::Config` if any value fails to parse or the
    /// resulting configuration is inconsistent.
    pub fn from_env() -> ProxyResult<Self> {
        // Load an .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let config = Self {
            // Server
            host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: Self::parse_env("PORT", 8080)?,
            request_timeout: Duration::from_secs(Self::parse_env("REQUEST_TIMEOUT_SECS", 30)?),
            shutdown_grace: Duration::from_secs(Self::parse_env("SHUTDOWN_GRACE_SECS", 5)?),
            connection_read_timeout: Duration::from_secs(Self::parse_env(
                "CONNECTION_READ_TIMEOUT_SECS",
                10,
            )?),
            connection_idle_timeout: Duration::from_secs(Self::parse_env(
                "CONNECTION_IDLE_TIMEOUT_SECS",
                30,
            )?),

            // Upstream
            upstream_base_url: normalize_base_url(
                &env::var("UPSTREAM_BASE_URL")
                    .unwrap_or_else(|_| DEFAULT_UPSTREAM_BASE_URL.to_string()),
            ),
            upstream_timeout: Duration::from_secs(Self::parse_env("UPSTREAM_TIMEOUT_SECS", 10)?),
            upstream_connect_timeout: Duration::from_secs(Self::parse_env(
                "UPSTREAM_CONNECT_TIMEOUT_SECS",
                5,
            )?),
            upstream_status_policy: Self::parse_env(
                "UPSTREAM_STATUS_POLICY",
                UpstreamStatusPolicy::Relay,
            )?,

            // Observability
            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "INFO".to_string()),
            log_format: Self::parse_env("LOG_FORMAT", LogFormat::Json)?,
            metrics_port: Self::parse_env("METRICS_PORT", 0)?,
        };

        // Validate configuration before returning
        config.validate()?;

        Ok(config)
    }

    /// Validate configuration values for consistency and correctness.
    ///
    /// # Errors
    ///
    /// Returns `ProxyError::Config` if validation fails.
    fn validate(&self) -> ProxyResult<()> {
        let url = Url::parse(&self.upstream_base_url).map_err(|e| {
            ProxyError::Config(format!(
                "UPSTREAM_BASE_URL ({}) is not a valid URL: {e}",
                self.upstream_base_url
            ))
        })?;

        if !matches!(url.scheme(), "http" | "https") {
            return Err(ProxyError::Config(format!(
                "UPSTREAM_BASE_URL must use http or https, got `{}`",
                url.scheme()
            )));
        }

        if url.query().is_some() || url.fragment().is_some() {
            return Err(ProxyError::Config(
                "UPSTREAM_BASE_URL must not carry a query or fragment".to_string(),
            ));
        }

        for (name, value) in [
            ("REQUEST_TIMEOUT_SECS", self.request_timeout),
            ("SHUTDOWN_GRACE_SECS", self.shutdown_grace),
            ("CONNECTION_READ_TIMEOUT_SECS", self.connection_read_timeout),
            ("CONNECTION_IDLE_TIMEOUT_SECS", self.connection_idle_timeout),
            ("UPSTREAM_TIMEOUT_SECS", self.upstream_timeout),
            ("UPSTREAM_CONNECT_TIMEOUT_SECS", self.upstream_connect_timeout),
        ] {
            if value.is_zero() {
                return Err(ProxyError::Config(format!("{name} must be greater than 0")));
            }
        }

        if self.upstream_connect_timeout > self.upstream_timeout {
            return Err(ProxyError::Config(format!(
                "UPSTREAM_CONNECT_TIMEOUT_SECS ({:?}) must be <= UPSTREAM_TIMEOUT_SECS ({:?})",
                self.upstream_connect_timeout, self.upstream_timeout
            )));
        }

        Ok(())
    }

    /// Get the full server address for binding.
    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Check if Prometheus metrics export is enabled.
    pub fn metrics_enabled(&self) -> bool {
        self.metrics_port > 0
    }

    /// Get the metrics endpoint address.
    ///
    /// Returns `None` if metrics are disabled (port = 0).
    pub fn metrics_addr(&self) -> Option<std::net::SocketAddr> {
        if self.metrics_enabled() {
            Some(std::net::SocketAddr::from((
                [0, 0, 0, 0],
                self.metrics_port,
            )))
        } else {
            None
        }
    }

    /// Parse an environment variable into the specified type with a default value.
    fn parse_env<T>(name: &str, default: T) -> ProxyResult<T>
    where
        T: FromStr,
        T::Err: fmt::Display,
    {
        match env::var(name) {
            Ok(val) => val
                .parse()
                .map_err(|e| ProxyError::Config(format!("Invalid {name}: {e}"))),
            Err(_) => Ok(default),
        }
    }
}

/// Strip whitespace and trailing slashes so targets join as `{base}/posts`.
fn normalize_base_url(raw: &str) -> String {
    raw.trim().trim_end_matches('/').to_string()
}

/// Default configuration for testing and development.
///
/// Production deployments should use `Config::from_env()` instead.
impl Default for Config {
    fn default() -> Self {
        Self {
            // Server
            host: "0.0.0.0".to_string(),
            port: 8080,
            request_timeout: Duration::from_secs(30),
            shutdown_grace: Duration::from_secs(5),
            connection_read_timeout: Duration::from_secs(10),
            connection_idle_timeout: Duration::from_secs(30),
            // Upstream
            upstream_base_url: DEFAULT_UPSTREAM_BASE_URL.to_string(),
            upstream_timeout: Duration::from_secs(10),
            upstream_connect_timeout: Duration::from_secs(5),
            upstream_status_policy: UpstreamStatusPolicy::Relay,
            // Observability
            log_level: "INFO".to_string(),
            log_format: LogFormat::Json,
            metrics_port: 0,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_values() {
        let config = Config::default();

        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 8080);
        assert_eq!(config.upstream_base_url, DEFAULT_UPSTREAM_BASE_URL);
        assert_eq!(config.upstream_timeout, Duration::from_secs(10));
        assert_eq!(config.shutdown_grace, Duration::from_secs(5));
        assert_eq!(config.connection_read_timeout, Duration::from_secs(10));
        assert_eq!(config.connection_idle_timeout, Duration::from_secs(30));
        assert_eq!(config.upstream_status_policy, UpstreamStatusPolicy::Relay);
        assert!(!config.metrics_enabled());
    }

    #[test]
    fn test_server_addr_format() {
        let config = Config {
            host: "127.0.0.1".to_string(),
            port: 9000,
            ..Config::default()
        };

        assert_eq!(config.server_addr(), "127.0.0.1:9000");
    }

    #[test]
    fn test_metrics_addr() {
        assert!(Config::default().metrics_addr().is_none());

        let config = Config {
            metrics_port: 9090,
            ..Config::default()
        };
        assert_eq!(config.metrics_addr().unwrap().port(), 9090);
    }

    #[test]
    fn test_normalize_base_url() {
        assert_eq!(
            normalize_base_url(" https://api.example.com// "),
            "https://api.example.com"
        );
        assert_eq!(
            normalize_base_url("http://localhost:3000/v1/"),
            "http://localhost:3000/v1"
        );
    }

    #[test]
    fn test_status_policy_parsing() {
        assert_eq!(
            "relay".parse::<UpstreamStatusPolicy>().unwrap(),
            UpstreamStatusPolicy::Relay
        );
        assert_eq!(
            "STRICT".parse::<UpstreamStatusPolicy>().unwrap(),
            UpstreamStatusPolicy::Strict
        );
        assert!("502".parse::<UpstreamStatusPolicy>().is_err());
    }

    #[test]
    fn test_log_format_parsing() {
        assert_eq!("json".parse::<LogFormat>().unwrap(), LogFormat::Json);
        assert_eq!("Pretty".parse::<LogFormat>().unwrap(), LogFormat::Pretty);
        assert!("xml".parse::<LogFormat>().is_err());
    }

    #[test]
    fn test_validate_valid_config() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_url() {
        let config = Config {
            upstream_base_url: "not a url".to_string(),
            ..Config::default()
        };

        let result = config.validate();
        assert!(result.unwrap_err().to_string().contains("UPSTREAM_BASE_URL"));
    }

    #[test]
    fn test_validate_rejects_non_http_scheme() {
        let config = Config {
            upstream_base_url: "ftp://files.example.com".to_string(),
            ..Config::default()
        };

        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_zero_timeout() {
        let config = Config {
            upstream_timeout: Duration::ZERO,
            ..Config::default()
        };

        let result = config.validate();
        assert!(
            result
                .unwrap_err()
                .to_string()
                .contains("UPSTREAM_TIMEOUT_SECS")
        );
    }

    #[test]
    fn test_validate_rejects_zero_connection_timeouts() {
        let config = Config {
            connection_idle_timeout: Duration::ZERO,
            ..Config::default()
        };
        assert!(
            config
                .validate()
                .unwrap_err()
                .to_string()
                .contains("CONNECTION_IDLE_TIMEOUT_SECS")
        );

        let config = Config {
            connection_read_timeout: Duration::ZERO,
            ..Config::default()
        };
        assert!(
            config
                .validate()
                .unwrap_err()
                .to_string()
                .contains("CONNECTION_READ_TIMEOUT_SECS")
        );
    }

    #[test]
    fn test_validate_timeout_ordering() {
        let config = Config {
            upstream_timeout: Duration::from_secs(2),
            upstream_connect_timeout: Duration::from_secs(5),
            ..Config::default()
        };

        let result = config.validate();
        assert!(
            result
                .unwrap_err()
                .to_string()
                .contains("UPSTREAM_CONNECT_TIMEOUT_SECS")
        );
    }
}
