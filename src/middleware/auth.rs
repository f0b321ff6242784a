//! Bearer token authentication and identity header projection.
//!
//! # Security Features
//!
//! - **Spoofing protection**: `X-User-ID`, `X-User-Email` and `X-User-Role`
//!   are removed from *every* inbound request before anything else happens,
//!   public routes included. Downstream services only ever see values the
//!   gateway derived from a verified token.
//! - **Algorithm pinning**: only HMAC-signed tokens are accepted (see
//!   [`TokenValidator`]).
//! - **No oracle**: bad signature, expiry, wrong algorithm and malformed
//!   tokens all produce the same 401 body. The precise cause is logged.
//!
//! # Flow
//!
//! ```text
//! strip identity headers
//!        │
//!        ▼
//!   public route? ── yes ──► forward
//!        │ no
//!        ▼
//!   Authorization: Bearer <token> ── missing/malformed ──► 401
//!        │
//!        ▼
//!   validate token ── invalid ──► 401 "invalid or expired token"
//!        │
//!        ▼
//!   inject X-User-* from claims ──► forward
//! ```
//!
//! # Usage
//!
//! ```bash
//! curl -H "Authorization: Bearer $TOKEN" http://localhost:8080/api/v1/orders
//! ```

use std::sync::Arc;
use std::task::{Context, Poll};

use axum::body::Body;
use axum::http::header::AUTHORIZATION;
use axum::http::{HeaderMap, HeaderValue, Request, Response};
use axum::response::IntoResponse;
use tower::{Layer, Service};
use tracing::{debug, error, warn};

use super::public_routes::PublicRoutes;
use super::token::{Claims, TokenValidator};
use crate::error::{AuthError, GatewayError};
use crate::metrics::{record_auth_failure, record_auth_success};

/// Forwarded subject identifier.
pub const USER_ID_HEADER: &str = "x-user-id";

/// Forwarded email address.
pub const USER_EMAIL_HEADER: &str = "x-user-email";

/// Forwarded role.
pub const USER_ROLE_HEADER: &str = "x-user-role";

/// Headers downstream services treat as authoritative identity.
pub const TRUSTED_IDENTITY_HEADERS: [&str; 3] = [USER_ID_HEADER, USER_EMAIL_HEADER, USER_ROLE_HEADER];

/// Remove every trusted identity header, including repeated values.
pub fn strip_identity_headers(headers: &mut HeaderMap) {
    for name in TRUSTED_IDENTITY_HEADERS {
        headers.remove(name);
    }
}

/// Set identity headers from validated claims. Absent or empty claims are
/// skipped.
fn inject_identity_headers(headers: &mut HeaderMap, claims: &Claims) {
    let projected = [
        (USER_ID_HEADER, claims.subject.as_deref()),
        (USER_EMAIL_HEADER, claims.email.as_deref()),
        (USER_ROLE_HEADER, claims.role.as_deref()),
    ];

    for (name, value) in projected {
        let Some(value) = value.filter(|v| !v.is_empty()) else {
            continue;
        };
        match HeaderValue::from_str(value) {
            Ok(header_value) => {
                headers.insert(name, header_value);
            }
            Err(_) => {
                warn!(header = name, "Claim is not a valid header value, not forwarded");
            }
        }
    }
}

/// Extract the token from `Authorization: Bearer <token>`.
///
/// The scheme is matched case-insensitively. An empty header counts as
/// missing.
fn bearer_token(headers: &HeaderMap) -> Result<&str, AuthError> {
    let value = headers
        .get(AUTHORIZATION)
        .filter(|v| !v.is_empty())
        .ok_or(AuthError::MissingHeader)?;
    let value = value.to_str().map_err(|_| AuthError::MalformedHeader)?;

    let (scheme, token) = value.split_once(' ').ok_or(AuthError::MalformedHeader)?;
    let token = token.trim();
    if !scheme.eq_ignore_ascii_case("bearer") || token.is_empty() {
        return Err(AuthError::MalformedHeader);
    }

    Ok(token)
}

/// Bearer token authentication layer.
#[derive(Clone)]
pub struct AuthLayer {
    validator: Arc<TokenValidator>,
    public_routes: PublicRoutes,
}

impl AuthLayer {
    /// Create a new authentication layer.
    ///
    /// # Arguments
    ///
    /// * `secret` - HMAC signing secret. An empty secret rejects every
    ///   protected request until it is configured.
    /// * `public_routes` - Routes served without a token
    pub fn new(secret: &str, public_routes: PublicRoutes) -> Self {
        Self {
            validator: Arc::new(TokenValidator::new(secret)),
            public_routes,
        }
    }

    /// Check if a signing secret is configured.
    pub fn is_configured(&self) -> bool {
        self.validator.is_configured()
    }
}

impl<S> Layer<S> for AuthLayer {
    type Service = AuthService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        AuthService {
            inner,
            validator: self.validator.clone(),
            public_routes: self.public_routes.clone(),
        }
    }
}

/// Authentication service wrapper.
#[derive(Clone)]
pub struct AuthService<S> {
    inner: S,
    validator: Arc<TokenValidator>,
    public_routes: PublicRoutes,
}

impl<S> Service<Request<Body>> for AuthService<S>
where
    S: Service<Request<Body>, Response = Response<Body>> + Clone + Send + 'static,
    S::Future: Send,
{
    type Response = Response<Body>;
    type Error = S::Error;
    type Future = std::pin::Pin<
        Box<dyn std::future::Future<Output = Result<Self::Response, Self::Error>> + Send>,
    >;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut req: Request<Body>) -> Self::Future {
        // Unconditionally, before any branching
        strip_identity_headers(req.headers_mut());

        let validator = self.validator.clone();
        let public_routes = self.public_routes.clone();
        let mut inner = self.inner.clone();

        Box::pin(async move {
            if public_routes.is_public(req.method(), req.uri().path()) {
                debug!(method = %req.method(), path = %req.uri().path(), "Public route, skipping auth");
                return inner.call(req).await;
            }

            let outcome = bearer_token(req.headers()).and_then(|token| validator.validate(token));

            match outcome {
                Ok(claims) => {
                    inject_identity_headers(req.headers_mut(), &claims);
                    debug!(
                        subject = claims.subject.as_deref().unwrap_or_default(),
                        path = %req.uri().path(),
                        method = %req.method(),
                        "Request authenticated"
                    );
                    record_auth_success();
                    inner.call(req).await
                }
                Err(err) => {
                    if err == AuthError::SecretNotConfigured {
                        error!(
                            path = %req.uri().path(),
                            "Rejecting protected request: no JWT secret configured"
                        );
                    } else {
                        warn!(
                            path = %req.uri().path(),
                            method = %req.method(),
                            reason = err.reason(),
                            error = %err,
                            "Authentication failed"
                        );
                    }
                    record_auth_failure(err.reason());
                    Ok(GatewayError::from(err).into_response())
                }
            }
        })
    }
}
