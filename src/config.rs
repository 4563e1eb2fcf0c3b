//! Application configuration loaded from environment variables.
//!
//! # Configuration Hierarchy
//!
//! All configuration is loaded from environment variables with sensible defaults
//! for development. In production, configure via environment variables or a `.env` file.
//! Nothing here is reloadable at runtime.
//!
//! # Rate Limiting
//!
//! - `RATE_LIMIT_REQUESTS`: Requests allowed per client per window (default: 999, 0 = disabled)
//! - `RATE_LIMIT_WINDOW_MS`: Length of the fixed window (default: 1000)
//! - `CLIENT_KEY_SOURCE`: `peer` (default) or `forwarded-for`
//!
//! # Fetching
//!
//! - `FETCH_MAX_URLS`: Maximum URLs per request (default: 1000)
//! - `FETCH_CONCURRENCY`: In-flight fetches per request (default: 0 = unbounded)
//! - `FETCH_TIMEOUT_SECS`: Fetch client timeout (default: 0 = none)
//!
//! # Observability
//!
//! - `RUST_LOG`: Log filter (default: info)
//! - `LOG_FORMAT`: `text` (default) or `json`, read by the binary before logging starts
//! - `METRICS_PORT`: Prometheus listener port (default: 9090, 0 = disabled)

use std::env;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::error::{AppError, AppResult};

/// Where the rate limiter takes the client key from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ClientKeySource {
    /// Host portion of the TCP peer address. Proxy headers are ignored.
    #[default]
    Peer,
    /// First entry of `X-Forwarded-For`, falling back to the peer address.
    /// Only safe behind a proxy that overwrites the header.
    ForwardedFor,
}

impl FromStr for ClientKeySource {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "peer" => Ok(Self::Peer),
            "forwarded-for" | "x-forwarded-for" => Ok(Self::ForwardedFor),
            other => Err(format!(
                "unknown client key source '{other}', expected 'peer' or 'forwarded-for'"
            )),
        }
    }
}

impl fmt::Display for ClientKeySource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Peer => f.write_str("peer"),
            Self::ForwardedFor => f.write_str("forwarded-for"),
        }
    }
}

/// Application configuration loaded from environment variables.
///
/// # Example
///
/// ```rust,ignore
/// let config = Config::from_env()?;
/// println!("Server will listen on {}", config.server_addr());
/// ```
#[derive(Debug, Clone)]
pub struct Config {
    // =========================================================================
    // Server Configuration
    // =========================================================================
    /// Server host address (default: "0.0.0.0")
    pub host: String,

    /// Server port (default: 3000)
    pub port: u16,

    /// Maximum request body size in bytes (default: 1MB)
    pub max_request_body_size: usize,

    // =========================================================================
    // Rate Limiting Configuration
    // =========================================================================
    /// Requests allowed per client key within one window (default: 999)
    /// Set to 0 to disable rate limiting
    pub rate_limit_requests: u32,

    /// Length of the fixed rate limiting window (default: 1 second)
    pub rate_limit_window: Duration,

    /// Strategy for deriving the client key (default: peer address)
    pub client_key_source: ClientKeySource,

    // =========================================================================
    // Fetch Configuration
    // =========================================================================
    /// Maximum number of URLs accepted in one request (default: 1000)
    pub fetch_max_urls: usize,

    /// Maximum in-flight fetches per request (default: 0 = unbounded)
    pub fetch_concurrency: usize,

    /// Timeout applied by the fetch client to each request (default: none)
    pub fetch_timeout: Option<Duration>,

    // =========================================================================
    // Observability Configuration
    // =========================================================================
    /// Port for Prometheus metrics endpoint (default: 9090, 0 = disabled)
    pub metrics_port: u16,
}

impl Config {
    /// Load configuration from environment variables with sensible defaults.
    ///
    /// # Errors
    ///
    /// Returns `AppError::ConfigError` if any value fails to parse or the
    /// resulting configuration is inconsistent (e.g., a zero-length window).
    pub fn from_env() -> AppResult<Self> {
        // Load an .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let fetch_timeout_secs: u64 = Self::parse_env("FETCH_TIMEOUT_SECS", 0)?;

        let config = Self {
            // Server
            host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: Self::parse_env("PORT", 3000)?,
            max_request_body_size: Self::parse_env("MAX_REQUEST_BODY_SIZE", 1024 * 1024)?,

            // Rate limiting
            rate_limit_requests: Self::parse_env("RATE_LIMIT_REQUESTS", 999)?,
            rate_limit_window: Duration::from_millis(Self::parse_env(
                "RATE_LIMIT_WINDOW_MS",
                1000,
            )?),
            client_key_source: Self::parse_env("CLIENT_KEY_SOURCE", ClientKeySource::Peer)?,

            // Fetching
            fetch_max_urls: Self::parse_env("FETCH_MAX_URLS", 1000)?,
            fetch_concurrency: Self::parse_env("FETCH_CONCURRENCY", 0)?,
            fetch_timeout: (fetch_timeout_secs > 0)
                .then(|| Duration::from_secs(fetch_timeout_secs)),

            // Observability
            metrics_port: Self::parse_env("METRICS_PORT", 9090)?,
        };

        config.validate()?;

        Ok(config)
    }

    /// Validate configuration values for consistency and correctness.
    ///
    /// # Errors
    ///
    /// Returns `AppError::ConfigError` if validation fails.
    pub fn validate(&self) -> AppResult<()> {
        if self.rate_limit_window.is_zero() {
            return Err(AppError::ConfigError(
                "RATE_LIMIT_WINDOW_MS must be greater than 0".to_string(),
            ));
        }

        if self.fetch_max_urls == 0 {
            return Err(AppError::ConfigError(
                "FETCH_MAX_URLS must be greater than 0".to_string(),
            ));
        }

        if self.max_request_body_size == 0 {
            return Err(AppError::ConfigError(
                "MAX_REQUEST_BODY_SIZE must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }

    /// Get the full server address for binding.
    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Check if rate limiting is enabled.
    pub fn rate_limiting_enabled(&self) -> bool {
        self.rate_limit_requests > 0
    }

    /// Per-request fetch cap, `None` when unbounded.
    pub fn fetch_concurrency_limit(&self) -> Option<usize> {
        (self.fetch_concurrency > 0).then_some(self.fetch_concurrency)
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
    fn parse_env<T>(name: &str, default: T) -> AppResult<T>
    where
        T: FromStr,
        T::Err: fmt::Display,
    {
        match env::var(name) {
            Ok(val) => val
                .parse()
                .map_err(|e| AppError::ConfigError(format!("Invalid {name}: {e}"))),
            Err(_) => Ok(default),
        }
    }
}

/// Default configuration for testing and development.
///
/// Production deployments should use `Config::from_env()` instead.
impl Default for Config {
    fn default() -> Self {
        Self {
            // Server
            host: "0.0.0.0".to_string(),
            port: 3000,
            max_request_body_size: 1024 * 1024,
            // Rate limiting
            rate_limit_requests: 999,
            rate_limit_window: Duration::from_secs(1),
            client_key_source: ClientKeySource::Peer,
            // Fetching
            fetch_max_urls: 1000,
            fetch_concurrency: 0,
            fetch_timeout: None,
            // Observability
            metrics_port: 9090,
        }
    }
}
