//! Prometheus metrics for gateway observability.
//!
//! Metrics are recorded through the `metrics` facade. Without an installed
//! recorder every call is a no-op, so library users and tests pay nothing.
//!
//! # Available Metrics
//!
//! ## Counters
//! - `gateway_auth_success_total` - Requests that presented a valid token
//! - `gateway_auth_failures_total` - Rejected requests (label: reason)
//! - `gateway_rate_limited_total` - Requests rejected with 429
//! - `gateway_visitors_reclaimed_total` - Idle visitors removed by cleanup
//!
//! ## Gauges
//! - `gateway_active_visitors` - Visitors currently tracked by the registry
//!
//! # Usage
//!
//! ```rust,ignore
//! use edge_gateway::metrics::init_metrics;
//!
//! // Initialize metrics (call once at startup)
//! init_metrics("0.0.0.0:9090".parse()?)?;
//! ```

use metrics::{counter, describe_counter, describe_gauge, gauge};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use tracing::info;

/// Metric names as constants for consistency.
pub mod names {
    pub const AUTH_SUCCESS_TOTAL: &str = "gateway_auth_success_total";
    pub const AUTH_FAILURES_TOTAL: &str = "gateway_auth_failures_total";
    pub const RATE_LIMITED_TOTAL: &str = "gateway_rate_limited_total";
    pub const VISITORS_RECLAIMED_TOTAL: &str = "gateway_visitors_reclaimed_total";
    pub const ACTIVE_VISITORS: &str = "gateway_active_visitors";
}

/// Initialize the Prometheus metrics exporter.
///
/// Starts the Prometheus HTTP listener on `metrics_addr` and registers the
/// metric descriptions.
///
/// # Returns
///
/// `Ok(())` if initialization succeeds, `Err` with message otherwise.
pub fn init_metrics(metrics_addr: SocketAddr) -> Result<(), String> {
    PrometheusBuilder::new()
        .with_http_listener(metrics_addr)
        .install()
        .map_err(|e| format!("Failed to install Prometheus exporter: {e}"))?;

    describe_counter!(
        names::AUTH_SUCCESS_TOTAL,
        "Total number of requests authenticated with a valid token"
    );
    describe_counter!(
        names::AUTH_FAILURES_TOTAL,
        "Total number of requests rejected by authentication"
    );
    describe_counter!(
        names::RATE_LIMITED_TOTAL,
        "Total number of requests rejected by the rate limiter"
    );
    describe_counter!(
        names::VISITORS_RECLAIMED_TOTAL,
        "Total number of idle visitors removed from the registry"
    );
    describe_gauge!(
        names::ACTIVE_VISITORS,
        "Number of client IPs currently tracked by the rate limiter"
    );

    info!(addr = %metrics_addr, "Prometheus metrics endpoint started");
    Ok(())
}

#[inline]
pub fn record_auth_success() {
    counter!(names::AUTH_SUCCESS_TOTAL).increment(1);
}

#[inline]
pub fn record_auth_failure(reason: &'static str) {
    counter!(names::AUTH_FAILURES_TOTAL, "reason" => reason).increment(1);
}

#[inline]
pub fn record_rate_limited() {
    counter!(names::RATE_LIMITED_TOTAL).increment(1);
}

pub fn record_visitors_reclaimed(count: usize) {
    counter!(names::VISITORS_RECLAIMED_TOTAL).increment(count as u64);
}

#[allow(clippy::cast_precision_loss)]
pub fn set_active_visitors(count: usize) {
    gauge!(names::ACTIVE_VISITORS).set(count as f64);
}
