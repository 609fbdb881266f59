//! Application configuration loaded from environment variables.
//!
//! All configuration is read once at startup with sensible defaults for
//! development. In production, configure via environment variables or a `.env` file.
//! There is no hot reload: the resulting [`Config`] is immutable and shared
//! behind an `Arc`.
//!
//! # Security Configuration
//!
//! - `API_KEY`: When set, every endpoint except the bypass paths requires it
//! - `API_KEY_NAME`: Header carrying the key (default: `X-API-Key`)
//! - `REQUIRE_HTTPS`: Reject plain-HTTP requests with 400
//! - `CORS_ALLOWED_ORIGINS`: Comma-separated list of allowed origins (default: `*`)
//!
//! # Provider Configuration
//!
//! - `WHATSAPP_API_TOKEN`: Bearer token for the WhatsApp Cloud API
//! - `WHATSAPP_PHONE_NUMBER_ID`: Sender phone number id
//! - `WHATSAPP_API_BASE_URL` / `WHATSAPP_API_VERSION`: Endpoint location
//!
//! # Rate Limiting
//!
//! - `RATE_LIMIT_MAX_REQUESTS`: Requests per client per window (default: 100, 0 = off)
//! - `RATE_LIMIT_WINDOW_SECS`: Sliding window length (default: 60)
//! - `RATE_LIMIT_SWEEP_INTERVAL_SECS`: Idle client eviction interval (default: 300, 0 = off)

use std::env;
use std::time::Duration;

use url::Url;

use crate::error::{AppError, AppResult};

/// Default header carrying the API key.
pub const DEFAULT_API_KEY_HEADER: &str = "X-API-Key";

/// Output format for log lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// Human-readable lines
    Text,
    /// One JSON object per line
    Json,
}

impl std::str::FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "text" | "pretty" => Ok(LogFormat::Text),
            "json" => Ok(LogFormat::Json),
            other => Err(format!("unknown log format '{other}' (expected text or json)")),
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

    /// Server port (default: 8000)
    pub port: u16,

    /// Maximum request body size in bytes (default: 1MB)
    pub max_request_body_size: usize,

    // =========================================================================
    // WhatsApp Provider Configuration
    // =========================================================================
    /// Bearer token for the WhatsApp Cloud API
    pub whatsapp_api_token: String,

    /// Phone number id messages are sent from
    pub whatsapp_phone_number_id: String,

    /// Provider base URL (default: "https://graph.facebook.com")
    pub whatsapp_api_base_url: String,

    /// Graph API version path segment (default: "v12.0")
    pub whatsapp_api_version: String,

    /// Language code used by the fixed-template endpoints (default: "en_US")
    pub default_language_code: String,

    /// Timeout for a single provider call (default: 30 seconds)
    pub provider_timeout: Duration,

    // =========================================================================
    // Rate Limiting Configuration
    // =========================================================================
    /// Requests admitted per client inside one window (default: 100)
    /// Set to 0 to disable rate limiting
    pub rate_limit_max_requests: u32,

    /// Sliding window length (default: 60 seconds)
    pub rate_limit_window: Duration,

    /// How often idle clients are evicted from the limiter (0 = never)
    pub rate_limit_sweep_interval: Duration,

    /// Trusted proxy CIDR ranges. Forwarding headers are only honoured when
    /// the TCP peer falls inside one of them (empty = trust all).
    pub trusted_proxies: Vec<String>,

    // =========================================================================
    // Security Configuration
    // =========================================================================
    /// Expected API key (None = authentication disabled)
    pub api_key: Option<String>,

    /// Header carrying the API key (default: "X-API-Key")
    pub api_key_header: String,

    /// Paths that bypass authentication (default: ["/", "/health"])
    pub auth_bypass_paths: Vec<String>,

    /// Reject requests not made over HTTPS
    pub require_https: bool,

    /// Allowed CORS origins, "*" allows all
    pub cors_allowed_origins: Vec<String>,

    // =========================================================================
    // Observability Configuration
    // =========================================================================
    /// Log output format (default: text)
    pub log_format: LogFormat,

    /// Port for Prometheus metrics endpoint (default: 0 = disabled)
    pub metrics_port: u16,
}

impl Config {
    /// Load configuration from environment variables with sensible defaults.
    ///
    /// # Errors
    ///
    /// Returns `AppError::ConfigError` if a value cannot be parsed or the
    /// resulting configuration is inconsistent.
    pub fn from_env() -> AppResult<Self> {
        // Load an .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let defaults = Self::default();

        let config = Self {
            // Server
            host: env::var("HOST").unwrap_or(defaults.host),
            port: Self::parse_env("PORT", defaults.port)?,
            max_request_body_size: Self::parse_env(
                "MAX_REQUEST_BODY_SIZE",
                defaults.max_request_body_size,
            )?,

            // Provider
            whatsapp_api_token: env::var("WHATSAPP_API_TOKEN").unwrap_or_default(),
            whatsapp_phone_number_id: env::var("WHATSAPP_PHONE_NUMBER_ID").unwrap_or_default(),
            whatsapp_api_base_url: env::var("WHATSAPP_API_BASE_URL")
                .unwrap_or(defaults.whatsapp_api_base_url),
            whatsapp_api_version: env::var("WHATSAPP_API_VERSION")
                .unwrap_or(defaults.whatsapp_api_version),
            default_language_code: env::var("DEFAULT_LANGUAGE_CODE")
                .unwrap_or(defaults.default_language_code),
            provider_timeout: Duration::from_secs(Self::parse_env("PROVIDER_TIMEOUT_SECS", 30)?),

            // Rate limiting
            rate_limit_max_requests: Self::parse_env(
                "RATE_LIMIT_MAX_REQUESTS",
                defaults.rate_limit_max_requests,
            )?,
            rate_limit_window: Duration::from_secs(Self::parse_env("RATE_LIMIT_WINDOW_SECS", 60)?),
            rate_limit_sweep_interval: Duration::from_secs(Self::parse_env(
                "RATE_LIMIT_SWEEP_INTERVAL_SECS",
                300,
            )?),
            trusted_proxies: Self::parse_list("TRUSTED_PROXIES", ""),

            // Security
            api_key: env::var("API_KEY").ok().filter(|k| !k.is_empty()),
            api_key_header: env::var("API_KEY_NAME")
                .ok()
                .filter(|h| !h.trim().is_empty())
                .unwrap_or(defaults.api_key_header),
            auth_bypass_paths: Self::parse_list("AUTH_BYPASS_PATHS", "/,/health")
                .into_iter()
                .filter(|p| p.starts_with('/'))
                .collect(),
            require_https: Self::parse_env("REQUIRE_HTTPS", false)?,
            cors_allowed_origins: Self::parse_list("CORS_ALLOWED_ORIGINS", "*"),

            // Observability
            log_format: Self::parse_env("LOG_FORMAT", LogFormat::Text)?,
            metrics_port: Self::parse_env("METRICS_PORT", defaults.metrics_port)?,
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
                "RATE_LIMIT_WINDOW_SECS must be greater than 0".to_string(),
            ));
        }

        if self.max_request_body_size == 0 {
            return Err(AppError::ConfigError(
                "MAX_REQUEST_BODY_SIZE must be greater than 0".to_string(),
            ));
        }

        if self.provider_timeout.is_zero() {
            return Err(AppError::ConfigError(
                "PROVIDER_TIMEOUT_SECS must be greater than 0".to_string(),
            ));
        }

        Url::parse(&self.whatsapp_api_base_url).map_err(|e| {
            AppError::ConfigError(format!(
                "Invalid WHATSAPP_API_BASE_URL '{}': {e}",
                self.whatsapp_api_base_url
            ))
        })?;

        if self.api_key_header.parse::<axum::http::HeaderName>().is_err() {
            return Err(AppError::ConfigError(format!(
                "API_KEY_NAME '{}' is not a valid header name",
                self.api_key_header
            )));
        }

        Ok(())
    }

    /// Get the full server address for binding.
    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Check if rate limiting is enabled.
    pub fn rate_limiting_enabled(&self) -> bool {
        self.rate_limit_max_requests > 0
    }

    /// Check if API key authentication is enabled.
    pub fn auth_enabled(&self) -> bool {
        self.api_key.is_some()
    }

    /// Check if the provider credentials are filled in.
    pub fn provider_configured(&self) -> bool {
        !self.whatsapp_api_token.is_empty() && !self.whatsapp_phone_number_id.is_empty()
    }

    /// Get the metrics endpoint address.
    ///
    /// Returns `None` if metrics are disabled (port = 0).
    pub fn metrics_addr(&self) -> Option<std::net::SocketAddr> {
        (self.metrics_port > 0)
            .then(|| std::net::SocketAddr::from(([0, 0, 0, 0], self.metrics_port)))
    }

    /// Parse an environment variable into the specified type with a default value.
    fn parse_env<T>(name: &str, default: T) -> AppResult<T>
    where
        T: std::str::FromStr,
        T::Err: std::fmt::Display,
    {
        match env::var(name) {
            Ok(val) => val
                .trim()
                .parse()
                .map_err(|e| AppError::ConfigError(format!("Invalid {name}: {e}"))),
            Err(_) => Ok(default),
        }
    }

    /// Parse a comma-separated list, dropping blank entries.
    fn parse_list(name: &str, default: &str) -> Vec<String> {
        env::var(name)
            .unwrap_or_else(|_| default.to_string())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect()
    }
}

/// Default configuration for testing and development.
///
/// Production deployments should use `Config::from_env()` instead.
impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            max_request_body_size: 1024 * 1024,
            whatsapp_api_token: String::new(),
            whatsapp_phone_number_id: String::new(),
            whatsapp_api_base_url: "https://graph.facebook.com".to_string(),
            whatsapp_api_version: "v12.0".to_string(),
            default_language_code: "en_US".to_string(),
            provider_timeout: Duration::from_secs(30),
            rate_limit_max_requests: 100,
            rate_limit_window: Duration::from_secs(60),
            rate_limit_sweep_interval: Duration::from_secs(300),
            trusted_proxies: vec![],
            api_key: None,
            api_key_header: DEFAULT_API_KEY_HEADER.to_string(),
            auth_bypass_paths: vec!["/".to_string(), "/health".to_string()],
            require_https: false,
            cors_allowed_origins: vec!["*".to_string()],
            log_format: LogFormat::Text,
            metrics_port: 0,
        }
    }
}
