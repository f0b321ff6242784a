use chrono::{DateTime, Utc};
use serde::Serialize;

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// Gateway health status
    pub status: String,
    /// Gateway version
    pub version: String,
    /// Client IPs currently tracked by the rate limiter
    pub active_visitors: usize,
    /// Uptime in seconds
    pub uptime_seconds: u64,
    /// Current timestamp
    pub timestamp: DateTime<Utc>,
}

/// Identity as seen by a service behind the gateway.
///
/// Fields are `None` when the corresponding `X-User-*` header is absent,
/// which is always the case on public routes.
#[derive(Debug, Serialize)]
pub struct IdentityResponse {
    pub method: String,
    pub path: String,
    pub user_id: Option<String>,
    pub email: Option<String>,
    pub role: Option<String>,
}
