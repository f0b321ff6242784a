//! Gateway configuration loaded from environment variables.
//!
//! All configuration is loaded from environment variables with defaults
//! suitable for development. A `.env` file is honoured when present.
//!
//! # Security Configuration
//!
//! - `JWT_SECRET`: HMAC secret used to verify bearer tokens. When empty the
//!   gateway still starts, but every protected route answers 401.
//! - `PUBLIC_ROUTES`: Comma-separated `METHOD /prefix` pairs served without a
//!   token (default: catalogue reads, login and `/health`)
//! - `CORS_ALLOWED_ORIGINS`: Comma-separated list of allowed origins (default: `*`)
//!
//! # Rate Limiting
//!
//! - `RATE_LIMIT_RPS`: Sustained requests per second per client IP, fractional
//!   values allowed (default: 10, `0` disables rate limiting)
//! - `RATE_LIMIT_BURST`: Bucket capacity per client IP (default: 20)
//! - `VISITOR_TTL_SECS`: Idle time before a client's bucket is dropped (default: 180)
//! - `VISITOR_CLEANUP_INTERVAL_SECS`: How often idle buckets are reclaimed
//!   (default: the TTL)

use std::env;
use std::fmt;
use std::time::Duration;

use crate::error::{ConfigError, ConfigResult};
use crate::middleware::public_routes::{RouteRule, default_rules};

/// Gateway configuration loaded from environment variables.
///
/// # Example
///
/// ```rust,ignore
/// let config = Config::from_env()?;
/// println!("Gateway will listen on {}", config.server_addr());
/// ```
#[derive(Clone)]
pub struct Config {
    // =========================================================================
    // Server Configuration
    // =========================================================================
    /// Server host address (default: "0.0.0.0")
    pub host: String,

    /// Server port (default: 8080)
    pub port: u16,

    // =========================================================================
    // Authentication Configuration
    // =========================================================================
    /// HMAC secret for bearer token verification
    pub jwt_secret: String,

    /// Routes reachable without a token, matched by method and path prefix
    pub public_routes: Vec<RouteRule>,

    /// Allowed CORS origins, `*` allows any
    pub cors_allowed_origins: Vec<String>,

    // =========================================================================
    // Rate Limiting Configuration
    // =========================================================================
    /// Tokens added per second to each client's bucket (0 = disabled)
    pub rate_limit_rps: f64,

    /// Bucket capacity per client
    pub rate_limit_burst: u32,

    /// Idle time after which a client's bucket is reclaimed
    pub visitor_ttl: Duration,

    /// Interval between reclamation sweeps
    pub visitor_cleanup_interval: Duration,

    // =========================================================================
    // Observability Configuration
    // =========================================================================
    /// Log level (e.g., "info", "debug", "trace")
    pub log_level: String,

    /// Port for Prometheus metrics endpoint (default: 9090, 0 = disabled)
    pub metrics_port: u16,
}

impl Config {
    /// Load configuration from environment variables with sensible defaults.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if any value fails to parse or
    /// validate.
    pub fn from_env() -> ConfigResult<Self> {
        // Load an .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let visitor_ttl = Duration::from_secs(Self::parse_env("VISITOR_TTL_SECS", 180)?);

        let config = Self {
            // Server
            host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: Self::parse_env("PORT", 8080)?,

            // Authentication
            jwt_secret: env::var("JWT_SECRET").unwrap_or_default(),
            public_routes: Self::parse_public_routes()?,
            cors_allowed_origins: Self::parse_cors_origins(),

            // Rate limiting
            rate_limit_rps: Self::parse_env("RATE_LIMIT_RPS", 10.0)?,
            rate_limit_burst: Self::parse_env("RATE_LIMIT_BURST", 20)?,
            visitor_ttl,
            visitor_cleanup_interval: match env::var("VISITOR_CLEANUP_INTERVAL_SECS") {
                Ok(_) => Duration::from_secs(Self::parse_env("VISITOR_CLEANUP_INTERVAL_SECS", 0)?),
                Err(_) => visitor_ttl,
            },

            // Observability
            log_level: env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
            metrics_port: Self::parse_env("METRICS_PORT", 9090)?,
        };

        config.validate()?;

        Ok(config)
    }

    /// Validate configuration values for consistency and correctness.
    ///
    /// An empty `JWT_SECRET` is not an error here.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if validation fails.
    pub fn validate(&self) -> ConfigResult<()> {
        if !self.rate_limit_rps.is_finite() || self.rate_limit_rps < 0.0 {
            return Err(ConfigError(format!(
                "RATE_LIMIT_RPS must be a non-negative number, got {}",
                self.rate_limit_rps
            )));
        }

        if self.rate_limiting_enabled() && self.rate_limit_burst == 0 {
            return Err(ConfigError(
                "RATE_LIMIT_BURST must be greater than 0 when rate limiting is enabled".to_string(),
            ));
        }

        if self.visitor_ttl.is_zero() {
            return Err(ConfigError(
                "VISITOR_TTL_SECS must be greater than 0".to_string(),
            ));
        }

        if self.visitor_cleanup_interval.is_zero() {
            return Err(ConfigError(
                "VISITOR_CLEANUP_INTERVAL_SECS must be greater than 0".to_string(),
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
        self.rate_limit_rps > 0.0
    }

    /// Check if a token signing secret is configured.
    pub fn auth_configured(&self) -> bool {
        !self.jwt_secret.is_empty()
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
    fn parse_env<T>(name: &str, default: T) -> ConfigResult<T>
    where
        T: std::str::FromStr,
        T::Err: std::fmt::Display,
    {
        match env::var(name) {
            Ok(val) => val
                .trim()
                .parse()
                .map_err(|e| ConfigError(format!("Invalid {name}: {e}"))),
            Err(_) => Ok(default),
        }
    }

    /// Parse CORS allowed origins from environment variable.
    fn parse_cors_origins() -> Vec<String> {
        env::var("CORS_ALLOWED_ORIGINS")
            .unwrap_or_else(|_| "*".to_string())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect()
    }

    /// Parse the public route table from `PUBLIC_ROUTES`.
    ///
    /// Unlike CORS origins, a malformed entry is an error: silently dropping
    /// it would turn a public route into a protected one.
    fn parse_public_routes() -> ConfigResult<Vec<RouteRule>> {
        match env::var("PUBLIC_ROUTES") {
            Ok(raw) => parse_route_list(&raw),
            Err(_) => Ok(default_rules()),
        }
    }
}

/// Parse `"GET /a, POST /b"` into route rules. Empty entries are skipped.
pub fn parse_route_list(raw: &str) -> ConfigResult<Vec<RouteRule>> {
    raw.split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(|entry| {
            entry
                .parse::<RouteRule>()
                .map_err(|e| ConfigError(format!("Invalid PUBLIC_ROUTES: {e}")))
        })
        .collect()
}

/// Never print the signing secret.
impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("jwt_secret", &if self.auth_configured() { "<redacted>" } else { "<empty>" })
            .field("public_routes", &self.public_routes.len())
            .field("cors_allowed_origins", &self.cors_allowed_origins)
            .field("rate_limit_rps", &self.rate_limit_rps)
            .field("rate_limit_burst", &self.rate_limit_burst)
            .field("visitor_ttl", &self.visitor_ttl)
            .field("visitor_cleanup_interval", &self.visitor_cleanup_interval)
            .field("log_level", &self.log_level)
            .field("metrics_port", &self.metrics_port)
            .finish()
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
            port: 8080,
            // Authentication
            jwt_secret: String::new(),
            public_routes: default_rules(),
            cors_allowed_origins: vec!["*".to_string()],
            // Rate limiting
            rate_limit_rps: 10.0,
            rate_limit_burst: 20,
            visitor_ttl: Duration::from_secs(180),
            visitor_cleanup_interval: Duration::from_secs(180),
            // Observability
            log_level: "info".to_string(),
            metrics_port: 9090,
        }
    }
}
