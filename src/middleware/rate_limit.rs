//! Per-IP rate limiting middleware.
//!
//! # Algorithm
//!
//! Each client IP (see [`resolve_client_ip`]) gets a continuous-refill token
//! bucket from the shared [`VisitorRegistry`]:
//!
//! - capacity `burst`: requests admitted back to back from a full bucket
//! - refill `rps`: tokens added per second, continuously
//!
//! Idle clients are reclaimed by the registry's background task, so memory
//! is bounded by the number of distinct IPs seen within one TTL.
//!
//! # Response
//!
//! On exhaustion the request is not forwarded and the client receives:
//!
//! ```text
//! HTTP/1.1 429 Too Many Requests
//! Retry-After: 1
//! Content-Type: application/json
//!
//! {"code":"RATE_LIMITED","message":"too many requests"}
//! ```

use std::fmt;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, Response};
use axum::response::IntoResponse;
use governor::clock::{Clock, DefaultClock};
use tower::{Layer, Service};
use tracing::warn;

use super::ip::resolve_client_ip;
use super::visitor::{DEFAULT_VISITOR_TTL, VisitorRegistry};
use crate::error::GatewayError;
use crate::metrics::record_rate_limited;

/// Error type for rate limit configuration.
///
/// This is a simple enum with no data, so it derives `Copy` for efficient
/// pass-by-value semantics without cloning overhead.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateLimitError {
    /// RPS must be a finite, positive number.
    InvalidRps,
    /// Burst capacity cannot be zero.
    ZeroBurst,
    /// Visitor TTL cannot be zero.
    ZeroTtl,
}

impl fmt::Display for RateLimitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RateLimitError::InvalidRps => write!(f, "RPS must be a finite number greater than 0"),
            RateLimitError::ZeroBurst => write!(f, "burst must be greater than 0"),
            RateLimitError::ZeroTtl => write!(f, "visitor TTL must be greater than 0"),
        }
    }
}

impl std::error::Error for RateLimitError {}

/// Rate limiting layer for Tower middleware stack.
///
/// # Example
///
/// ```rust,ignore
/// let layer = RateLimitLayer::new(10.0, 20)?; // 10 RPS per IP, bucket of 20
/// let app = Router::new()
///     .route("/api", get(handler))
///     .layer(layer);
/// ```
pub struct RateLimitLayer<C: Clock = DefaultClock> {
    visitors: Arc<VisitorRegistry<C>>,
}

impl RateLimitLayer<DefaultClock> {
    /// Create a layer with its own registry and [`DEFAULT_VISITOR_TTL`].
    ///
    /// When called inside a Tokio runtime the registry's cleanup task is
    /// started with an interval equal to the TTL.
    ///
    /// # Errors
    ///
    /// Returns a [`RateLimitError`] for a non-positive `rps` or zero `burst`.
    pub fn new(rps: f64, burst: u32) -> Result<Self, RateLimitError> {
        Self::with_ttl(rps, burst, DEFAULT_VISITOR_TTL)
    }

    /// Like [`RateLimitLayer::new`] with an explicit visitor TTL.
    pub fn with_ttl(rps: f64, burst: u32, ttl: Duration) -> Result<Self, RateLimitError> {
        let visitors = Arc::new(VisitorRegistry::new(rps, burst, ttl)?);
        visitors.spawn_cleanup(ttl);
        Ok(Self { visitors })
    }
}

impl<C: Clock> RateLimitLayer<C> {
    /// Build a layer on top of an existing registry.
    ///
    /// The caller owns the registry lifecycle (cleanup task and shutdown).
    pub fn from_registry(visitors: Arc<VisitorRegistry<C>>) -> Self {
        Self { visitors }
    }

    pub fn registry(&self) -> &Arc<VisitorRegistry<C>> {
        &self.visitors
    }
}

impl<C: Clock> Clone for RateLimitLayer<C> {
    fn clone(&self) -> Self {
        Self {
            visitors: Arc::clone(&self.visitors),
        }
    }
}

impl<S, C: Clock> Layer<S> for RateLimitLayer<C> {
    type Service = RateLimitService<S, C>;

    fn layer(&self, inner: S) -> Self::Service {
        RateLimitService {
            inner,
            visitors: Arc::clone(&self.visitors),
        }
    }
}

/// Rate limiting service wrapper.
pub struct RateLimitService<S, C: Clock = DefaultClock> {
    inner: S,
    visitors: Arc<VisitorRegistry<C>>,
}

impl<S: Clone, C: Clock> Clone for RateLimitService<S, C> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            visitors: Arc::clone(&self.visitors),
        }
    }
}

impl<S, C> Service<Request<Body>> for RateLimitService<S, C>
where
    S: Service<Request<Body>, Response = Response<Body>> + Clone + Send + 'static,
    S::Future: Send,
    C: Clock + Clone + Send + Sync + 'static,
{
    type Response = Response<Body>;
    type Error = S::Error;
    type Future = std::pin::Pin<
        Box<dyn std::future::Future<Output = Result<Self::Response, Self::Error>> + Send>,
    >;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request<Body>) -> Self::Future {
        let mut inner = self.inner.clone();

        // Resolve and decide before moving req
        let client_ip = resolve_client_ip(&req).into_owned();
        let decision = self.visitors.get_or_create(&client_ip).check();

        Box::pin(async move {
            match decision {
                Ok(()) => inner.call(req).await,
                Err(wait_time) => {
                    let retry_after = retry_after_secs(wait_time);

                    warn!(
                        client_ip = %client_ip,
                        path = %req.uri().path(),
                        retry_after_secs = retry_after,
                        "Rate limit exceeded for IP"
                    );
                    record_rate_limited();

                    Ok(GatewayError::RateLimited {
                        retry_after_secs: retry_after,
                    }
                    .into_response())
                }
            }
        })
    }
}

/// Whole seconds until the next token, rounded up and never below one.
fn retry_after_secs(wait_time: Duration) -> u64 {
    let secs = wait_time.as_secs() + u64::from(wait_time.subsec_nanos() > 0);
    secs.max(1)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use axum::http::StatusCode;
    use governor::clock::FakeRelativeClock;
    use std::convert::Infallible;
    use tower::ServiceExt;
    use tower::service_fn;

    async fn ok_handler(_req: Request<Body>) -> Result<Response<Body>, Infallible> {
        Ok(Response::new(Body::from("ok")))
    }

    fn request_from(ip: &str) -> Request<Body> {
        Request::builder()
            .uri("/api/v1/orders")
            .header("x-forwarded-for", ip)
            .body(Body::empty())
            .unwrap()
    }

    fn fake_layer(rps: f64, burst: u32) -> (RateLimitLayer<FakeRelativeClock>, FakeRelativeClock) {
        let clock = FakeRelativeClock::default();
        let registry =
            VisitorRegistry::with_clock(rps, burst, DEFAULT_VISITOR_TTL, clock.clone()).unwrap();
        (RateLimitLayer::from_registry(Arc::new(registry)), clock)
    }

    #[test]
    fn test_invalid_configuration_rejected() {
        assert!(matches!(
            RateLimitLayer::new(0.0, 3),
            Err(RateLimitError::InvalidRps)
        ));
        assert!(matches!(
            RateLimitLayer::new(1.0, 0),
            Err(RateLimitError::ZeroBurst)
        ));
    }

    #[test]
    fn test_retry_after_rounding() {
        assert_eq!(retry_after_secs(Duration::ZERO), 1);
        assert_eq!(retry_after_secs(Duration::from_millis(200)), 1);
        assert_eq!(retry_after_secs(Duration::from_secs(1)), 1);
        assert_eq!(retry_after_secs(Duration::from_millis(1500)), 2);
    }

    #[tokio::test]
    async fn test_burst_then_429() {
        let (layer, _clock) = fake_layer(1.0, 3);
        let service = layer.layer(service_fn(ok_handler));

        for _ in 0..3 {
            let response = service.clone().oneshot(request_from("10.0.0.1")).await.unwrap();
            assert_eq!(response.status(), StatusCode::OK);
        }

        let response = service.clone().oneshot(request_from("10.0.0.1")).await.unwrap();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert!(response.headers().contains_key("retry-after"));
    }

    #[tokio::test]
    async fn test_refill_readmits() {
        let (layer, clock) = fake_layer(1.0, 1);
        let service = layer.layer(service_fn(ok_handler));

        let first = service.clone().oneshot(request_from("10.0.0.1")).await.unwrap();
        assert_eq!(first.status(), StatusCode::OK);
        let second = service.clone().oneshot(request_from("10.0.0.1")).await.unwrap();
        assert_eq!(second.status(), StatusCode::TOO_MANY_REQUESTS);

        clock.advance(Duration::from_secs(1));
        let third = service.clone().oneshot(request_from("10.0.0.1")).await.unwrap();
        assert_eq!(third.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_clients_do_not_share_budget() {
        let (layer, _clock) = fake_layer(1.0, 1);
        let service = layer.layer(service_fn(ok_handler));

        let a = service.clone().oneshot(request_from("10.0.0.1")).await.unwrap();
        let a_again = service.clone().oneshot(request_from("10.0.0.1")).await.unwrap();
        let b = service.clone().oneshot(request_from("10.0.0.2")).await.unwrap();

        assert_eq!(a.status(), StatusCode::OK);
        assert_eq!(a_again.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(b.status(), StatusCode::OK);
        assert_eq!(layer.registry().len(), 2);
    }
}
