//! Gateway routing configuration with middleware stack.
//!
//! # Middleware Stack (outermost first)
//!
//! ```text
//! Request
//!    │
//!    ▼
//! ┌──────────────────┐
//! │     Tracing      │ ← HTTP request/response logging
//! └────────┬─────────┘
//!          │
//!          ▼
//! ┌──────────────────┐
//! │      CORS        │ ← Cross-origin headers, also on 401s and 429s
//! └────────┬─────────┘
//!          │
//!          ▼
//! ┌──────────────────┐
//! │  Authentication  │ ← strips X-User-*, 401 unless public or valid token
//! └────────┬─────────┘
//!          │
//!          ▼
//! ┌──────────────────┐
//! │  Rate Limiting   │ ← 429 if the client's bucket is empty
//! └────────┬─────────┘
//!          │
//!          ▼
//!      Upstream
//! ```
//!
//! # Routes
//!
//! - `/health` - Gateway health (public by default)
//! - everything else - Identity echo handler standing in for the upstream

use axum::Router;
use axum::routing::get;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::handlers;
use crate::middleware::{AuthLayer, PublicRoutes, RateLimitLayer};
use crate::state::GatewayState;

/// Build the gateway router with the built-in handlers and all middleware.
pub fn build_router(state: GatewayState) -> Router {
    let upstream = Router::new()
        .route("/health", get(handlers::health_check))
        .fallback(handlers::identity)
        .with_state(state.clone());

    protect(upstream, &state)
}

/// Wrap any upstream router in the gateway's middleware stack.
///
/// # Middleware Configuration
///
/// - **Authentication**: Always applied; with an empty secret every
///   protected route answers 401
/// - **CORS**: Configured from `cors_allowed_origins`
/// - **Rate Limiting**: Applied when `state.visitors` is present
pub fn protect(upstream: Router, state: &GatewayState) -> Router {
    let config = &state.config;

    // =========================================================================
    // Apply Middleware Stack (order matters - applied bottom to top)
    // =========================================================================

    // 1. Rate Limiting (if enabled). Only requests that passed auth spend tokens
    let mut router = upstream;
    if let Some(visitors) = &state.visitors {
        info!(
            rps = config.rate_limit_rps,
            burst = config.rate_limit_burst,
            ttl_secs = visitors.ttl().as_secs(),
            "Rate limiting enabled"
        );
        router = router.layer(RateLimitLayer::from_registry(visitors.clone()));
    } else {
        info!("Rate limiting disabled (RATE_LIMIT_RPS=0)");
    }

    // 2. Authentication
    let auth_layer = AuthLayer::new(
        &config.jwt_secret,
        PublicRoutes::new(config.public_routes.clone()),
    );
    if auth_layer.is_configured() {
        info!(
            public_routes = config.public_routes.len(),
            "Bearer token authentication enabled"
        );
    } else {
        warn!("JWT_SECRET is empty, all protected routes will answer 401");
    }
    router = router.layer(auth_layer);

    // 3. CORS
    router = router.layer(build_cors_layer(&config.cors_allowed_origins));

    // 4. Tracing
    router.layer(TraceLayer::new_for_http())
}

/// Build CORS layer from configuration.
///
/// `*` anywhere in the list allows any origin. Entries that are not valid
/// header values are skipped.
fn build_cors_layer(allowed_origins: &[String]) -> CorsLayer {
    let allow_any = allowed_origins.iter().any(|o| o == "*");

    if allow_any {
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
    } else {
        let origins: Vec<_> = allowed_origins
            .iter()
            .filter_map(|o| o.parse().ok())
            .collect();

        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods(Any)
            .allow_headers(Any)
    }
}
