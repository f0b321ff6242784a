//! Shared gateway state for Axum handlers and middleware.
//!
//! # Structured Concurrency
//!
//! The only background work is the visitor registry's cleanup task, which
//! is tracked by the registry itself. Call `shutdown()` to stop it before
//! the process exits.

use std::sync::Arc;
use std::time::Instant;

use tracing::info;

use crate::config::Config;
use crate::middleware::{RateLimitError, VisitorRegistry};

/// Shared gateway state.
///
/// Cloned for each request handler; everything inside is behind an `Arc`.
///
/// ```rust,ignore
/// let state = GatewayState::new(config)?;
/// // ... serve ...
/// state.shutdown().await;
/// ```
#[derive(Clone)]
pub struct GatewayState {
    /// Gateway configuration
    pub config: Arc<Config>,
    /// Per-IP buckets, `None` when rate limiting is disabled
    pub visitors: Option<Arc<VisitorRegistry>>,
    /// Timestamp when the gateway started
    pub started_at: Instant,
}

impl GatewayState {
    /// Create state from configuration.
    ///
    /// When rate limiting is enabled this builds the visitor registry and,
    /// inside a Tokio runtime, starts its cleanup task at
    /// `config.visitor_cleanup_interval`.
    ///
    /// # Errors
    ///
    /// Returns [`RateLimitError`] if the rate limit settings are invalid.
    pub fn new(config: Config) -> Result<Self, RateLimitError> {
        let visitors = if config.rate_limiting_enabled() {
            let registry = Arc::new(VisitorRegistry::new(
                config.rate_limit_rps,
                config.rate_limit_burst,
                config.visitor_ttl,
            )?);
            registry.spawn_cleanup(config.visitor_cleanup_interval);
            Some(registry)
        } else {
            None
        };

        Ok(Self {
            config: Arc::new(config),
            visitors,
            started_at: Instant::now(),
        })
    }

    /// Number of client IPs currently tracked by the rate limiter.
    pub fn active_visitors(&self) -> usize {
        self.visitors.as_ref().map_or(0, |visitors| visitors.len())
    }

    /// Get the gateway uptime in seconds.
    pub fn uptime_seconds(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }

    /// Stop background tasks and wait for them to complete.
    pub async fn shutdown(&self) {
        info!("Initiating graceful shutdown of background tasks");

        if let Some(visitors) = &self.visitors {
            visitors.shutdown().await;
        }

        info!("All background tasks have completed");
    }
}
