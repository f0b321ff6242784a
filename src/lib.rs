//! # Edge Gateway
//!
//! The authentication and rate-limiting edge of an HTTP API gateway, built
//! on Axum and Tower:
//!
//! - **Authentication**: HMAC-signed bearer tokens, verified claims projected
//!   into `X-User-ID`, `X-User-Email` and `X-User-Role`
//! - **Spoofing protection**: client-supplied identity headers are always stripped
//! - **Rate limiting**: per-client-IP token buckets with idle reclamation
//! - **Observability**: structured logging and Prometheus counters
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      Axum HTTP Server                       │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Middleware (Trace → CORS → Auth → Rate Limit)              │
//! ├─────────────────────────────────────────────────────────────┤
//! │  VisitorRegistry (per-IP buckets, background cleanup)       │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Upstream router (health, identity echo, or your own)       │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use edge_gateway::{Config, GatewayState, build_router};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::from_env()?;
//!     let state = GatewayState::new(config)?;
//!     let app = build_router(state.clone());
//!
//!     // Start the server...
//!     state.shutdown().await;
//!     Ok(())
//! }
//! ```
//!
//! ## Protecting your own routes
//!
//! ```rust,ignore
//! let upstream = Router::new().route("/api/v1/orders", get(list_orders));
//! let app = edge_gateway::routes::protect(upstream, &state);
//! ```
//!
//! ## Configuration
//!
//! ```bash
//! JWT_SECRET=change-me RATE_LIMIT_RPS=5 RATE_LIMIT_BURST=10 cargo run
//! ```

pub mod config;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod state;
pub mod utils;

// Re-exports for convenience
pub use config::Config;
pub use error::{AuthError, ConfigError, GatewayError};
pub use middleware::{AuthLayer, PublicRoutes, RateLimitLayer, VisitorRegistry};
pub use routes::{build_router, protect};
pub use state::GatewayState;
