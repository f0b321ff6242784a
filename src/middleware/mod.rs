//! HTTP middleware for edge authentication and rate limiting.
//!
//! This module provides the gateway's two request gates plus the pieces
//! they are built from:
//!
//! - **Rate Limiting**: Per-IP continuous-refill token buckets with idle reclamation
//! - **Bearer Authentication**: HMAC-signed token verification with identity projection
//! - **Public Routes**: Method + path-prefix allowlist that bypasses authentication
//! - **Client IP Resolution**: Forwarding headers first, then the TCP peer
//!
//! # Architecture
//!
//! ```text
//! Request → CORS → Auth → Rate Limiter → Upstream → Response
//!                   ↓           ↓
//!           401 Unauthorized  429 Too Many
//! ```
//!
//! # Security Considerations
//!
//! - Identity headers are stripped from every inbound request, so upstream
//!   services can trust `X-User-*` unconditionally
//! - Only HMAC algorithms are accepted for bearer tokens
//! - Forwarding headers are taken at face value; deploy behind a proxy that
//!   overwrites them

pub mod auth;
pub mod ip;
pub mod public_routes;
pub mod rate_limit;
pub mod token;
pub mod visitor;

pub use auth::{
    AuthLayer, TRUSTED_IDENTITY_HEADERS, USER_EMAIL_HEADER, USER_ID_HEADER, USER_ROLE_HEADER,
    strip_identity_headers,
};
pub use ip::{UNKNOWN_IP, resolve_client_ip, strip_port};
pub use public_routes::{PublicRoutes, RouteRule};
pub use rate_limit::{RateLimitError, RateLimitLayer};
pub use token::{ClaimValue, Claims, TokenValidator};
pub use visitor::{DEFAULT_VISITOR_TTL, TokenBucket, VisitorRegistry};
