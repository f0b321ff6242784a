//! End-to-end tests for the assembled gateway router.
//!
//! The router is driven in-process with `tower::ServiceExt::oneshot`, so no
//! listener or network is involved. Requests carry `X-Forwarded-For` to pick
//! the client IP; without it every request shares the `unknown` bucket.
//!
//! Run with: `cargo test --test gateway_tests`
#![allow(clippy::unwrap_used, clippy::expect_used)]

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::routing::get;
use chrono::Utc;
use jsonwebtoken::{Algorithm, EncodingKey, Header, encode};
use serde_json::{Value, json};
use tower::ServiceExt;

use edge_gateway::config::parse_route_list;
use edge_gateway::{Config, GatewayState, build_router, protect};

const SECRET: &str = "integration-secret";

// =============================================================================
// Helpers
// =============================================================================

fn config() -> Config {
    Config {
        jwt_secret: SECRET.to_string(),
        ..Config::default()
    }
}

fn gateway(config: Config) -> Router {
    build_router(GatewayState::new(config).unwrap())
}

fn token_with(secret: &str, claims: Value) -> String {
    encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .unwrap()
}

fn token(claims: Value) -> String {
    token_with(SECRET, claims)
}

fn in_one_hour() -> i64 {
    Utc::now().timestamp() + 3600
}

fn get_from(ip: &str, path: &str) -> axum::http::request::Builder {
    Request::get(path).header("x-forwarded-for", ip)
}

async fn send(app: &Router, req: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(req).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, body)
}

// =============================================================================
// Authentication
// =============================================================================

#[tokio::test]
async fn test_valid_token_projects_identity() {
    let app = gateway(config());
    let bearer = token(json!({
        "user_id": "u-42",
        "email": "ada@example.com",
        "role": "admin",
        "exp": in_one_hour(),
    }));

    let (status, body) = send(
        &app,
        get_from("10.0.0.1", "/api/v1/orders")
            .header("authorization", format!("Bearer {bearer}"))
            .body(Body::empty())
            .unwrap(),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["user_id"], "u-42");
    assert_eq!(body["email"], "ada@example.com");
    assert_eq!(body["role"], "admin");
    assert_eq!(body["path"], "/api/v1/orders");
}

#[tokio::test]
async fn test_numeric_user_id_forwarded_as_text() {
    let app = gateway(config());
    let bearer = token(json!({ "user_id": 1001, "exp": in_one_hour() }));

    let (status, body) = send(
        &app,
        get_from("10.0.0.1", "/api/v1/orders")
            .header("authorization", format!("bearer {bearer}"))
            .body(Body::empty())
            .unwrap(),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["user_id"], "1001");
    assert!(body["email"].is_null());
}

#[tokio::test]
async fn test_sub_used_when_user_id_absent() {
    let app = gateway(config());
    let bearer = token(json!({ "sub": "subject-7", "exp": in_one_hour() }));

    let (_, body) = send(
        &app,
        get_from("10.0.0.1", "/api/v1/orders")
            .header("authorization", format!("Bearer {bearer}"))
            .body(Body::empty())
            .unwrap(),
    )
    .await;

    assert_eq!(body["user_id"], "subject-7");
}

#[tokio::test]
async fn test_missing_header_is_401() {
    let app = gateway(config());

    let response = app
        .clone()
        .oneshot(
            get_from("10.0.0.1", "/api/v1/orders")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(response.headers()["www-authenticate"], "Bearer");

    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body["message"], "missing authorization header");
}

#[tokio::test]
async fn test_non_bearer_scheme_is_401() {
    let app = gateway(config());

    let (status, body) = send(
        &app,
        get_from("10.0.0.1", "/api/v1/orders")
            .header("authorization", "Basic dXNlcjpwYXNz")
            .body(Body::empty())
            .unwrap(),
    )
    .await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["message"], "invalid authorization header format");
}

#[tokio::test]
async fn test_expired_token_is_401() {
    let app = gateway(config());
    let bearer = token(json!({
        "user_id": "u-1",
        "exp": Utc::now().timestamp() - 60,
    }));

    let (status, body) = send(
        &app,
        get_from("10.0.0.1", "/api/v1/orders")
            .header("authorization", format!("Bearer {bearer}"))
            .body(Body::empty())
            .unwrap(),
    )
    .await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["message"], "invalid or expired token");
}

#[tokio::test]
async fn test_wrong_secret_is_401_with_same_message() {
    let app = gateway(config());
    let bearer = token_with(
        "some-other-secret",
        json!({ "user_id": "u-1", "exp": in_one_hour() }),
    );

    let (status, body) = send(
        &app,
        get_from("10.0.0.1", "/api/v1/orders")
            .header("authorization", format!("Bearer {bearer}"))
            .body(Body::empty())
            .unwrap(),
    )
    .await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["message"], "invalid or expired token");
}

#[tokio::test]
async fn test_empty_secret_still_serves_public_routes() {
    let app = gateway(Config::default());

    let (public, _) = send(
        &app,
        get_from("10.0.0.1", "/api/v1/products/12")
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    let (protected, _) = send(
        &app,
        get_from("10.0.0.1", "/api/v1/orders")
            .body(Body::empty())
            .unwrap(),
    )
    .await;

    assert_eq!(public, StatusCode::OK);
    assert_eq!(protected, StatusCode::UNAUTHORIZED);
}

// =============================================================================
// Spoofing protection
// =============================================================================

#[tokio::test]
async fn test_spoofed_identity_stripped_on_public_route() {
    let app = gateway(config());

    let (status, body) = send(
        &app,
        get_from("10.0.0.1", "/api/v1/products")
            .header("x-user-id", "admin")
            .header("x-user-role", "superuser")
            .body(Body::empty())
            .unwrap(),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert!(body["user_id"].is_null());
    assert!(body["role"].is_null());
}

#[tokio::test]
async fn test_spoofed_identity_replaced_on_protected_route() {
    let app = gateway(config());
    let bearer = token(json!({ "user_id": "real-user", "exp": in_one_hour() }));

    let (status, body) = send(
        &app,
        get_from("10.0.0.1", "/api/v1/orders")
            .header("authorization", format!("Bearer {bearer}"))
            .header("x-user-id", "admin")
            .header("x-user-role", "superuser")
            .body(Body::empty())
            .unwrap(),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["user_id"], "real-user");
    assert!(body["role"].is_null());
}

#[tokio::test]
async fn test_public_match_requires_method() {
    let app = gateway(config());

    let (status, _) = send(
        &app,
        Request::post("/api/v1/products")
            .header("x-forwarded-for", "10.0.0.1")
            .body(Body::empty())
            .unwrap(),
    )
    .await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

// =============================================================================
// Rate limiting
// =============================================================================

fn limited_config(burst: u32) -> Config {
    Config {
        rate_limit_rps: 0.01,
        rate_limit_burst: burst,
        ..config()
    }
}

#[tokio::test]
async fn test_burst_then_429_with_json_body() {
    let app = gateway(limited_config(3));

    for _ in 0..3 {
        let (status, _) = send(&app, get_from("203.0.113.9", "/health").body(Body::empty()).unwrap()).await;
        assert_eq!(status, StatusCode::OK);
    }

    let response = app
        .clone()
        .oneshot(get_from("203.0.113.9", "/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);

    let retry_after: u64 = response.headers()["retry-after"]
        .to_str()
        .unwrap()
        .parse()
        .unwrap();
    assert!(retry_after >= 1);

    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body["code"], "RATE_LIMITED");
}

#[tokio::test]
async fn test_rejected_auth_does_not_spend_budget() {
    let app = gateway(limited_config(1));

    let (first, _) = send(&app, get_from("198.51.100.1", "/api/v1/orders").body(Body::empty()).unwrap()).await;
    let (second, _) = send(&app, get_from("198.51.100.1", "/api/v1/orders").body(Body::empty()).unwrap()).await;

    assert_eq!(first, StatusCode::UNAUTHORIZED);
    assert_eq!(second, StatusCode::UNAUTHORIZED);

    // The bucket is still full for an authenticated request
    let bearer = token(json!({ "user_id": "u-1", "exp": in_one_hour() }));
    let authed = || {
        get_from("198.51.100.1", "/api/v1/orders")
            .header("authorization", format!("Bearer {bearer}"))
            .body(Body::empty())
            .unwrap()
    };
    let (third, _) = send(&app, authed()).await;
    let (fourth, _) = send(&app, authed()).await;

    assert_eq!(third, StatusCode::OK);
    assert_eq!(fourth, StatusCode::TOO_MANY_REQUESTS);
}

#[tokio::test]
async fn test_independent_clients_have_independent_buckets() {
    let app = gateway(limited_config(1));

    let (a, _) = send(&app, get_from("192.0.2.1", "/health").body(Body::empty()).unwrap()).await;
    let (a_again, _) = send(&app, get_from("192.0.2.1", "/health").body(Body::empty()).unwrap()).await;
    let (b, _) = send(&app, get_from("192.0.2.2", "/health").body(Body::empty()).unwrap()).await;

    assert_eq!(a, StatusCode::OK);
    assert_eq!(a_again, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(b, StatusCode::OK);
}

#[tokio::test]
async fn test_forwarded_for_first_hop_identifies_client() {
    let app = gateway(limited_config(1));

    let (first, _) = send(&app, get_from("192.0.2.50, 10.0.0.1", "/health").body(Body::empty()).unwrap()).await;
    let (same_client, _) = send(&app, get_from("192.0.2.50, 10.0.0.2", "/health").body(Body::empty()).unwrap()).await;

    assert_eq!(first, StatusCode::OK);
    assert_eq!(same_client, StatusCode::TOO_MANY_REQUESTS);
}

#[tokio::test]
async fn test_health_reports_active_visitors() {
    let state = GatewayState::new(limited_config(5)).unwrap();
    let app = build_router(state.clone());

    send(&app, get_from("192.0.2.1", "/health").body(Body::empty()).unwrap()).await;
    let (status, body) = send(&app, get_from("192.0.2.2", "/health").body(Body::empty()).unwrap()).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["active_visitors"], 2);
    assert_eq!(state.active_visitors(), 2);

    state.shutdown().await;
}

#[tokio::test]
async fn test_disabled_rate_limiting_never_429s() {
    let app = gateway(Config {
        rate_limit_rps: 0.0,
        rate_limit_burst: 0,
        ..config()
    });

    for _ in 0..50 {
        let (status, _) = send(&app, get_from("192.0.2.1", "/health").body(Body::empty()).unwrap()).await;
        assert_eq!(status, StatusCode::OK);
    }
}

// =============================================================================
// Custom upstream
// =============================================================================

#[tokio::test]
async fn test_protect_wraps_custom_upstream() {
    let state = GatewayState::new(Config {
        public_routes: parse_route_list("GET /status").unwrap(),
        ..config()
    })
    .unwrap();
    let upstream = Router::new()
        .route("/status", get(|| async { "up" }))
        .route("/admin", get(|| async { "secret" }));
    let app = protect(upstream, &state);

    let status = app
        .clone()
        .oneshot(get_from("10.0.0.1", "/status").body(Body::empty()).unwrap())
        .await
        .unwrap()
        .status();
    let admin = app
        .clone()
        .oneshot(get_from("10.0.0.1", "/admin").body(Body::empty()).unwrap())
        .await
        .unwrap()
        .status();

    assert_eq!(status, StatusCode::OK);
    assert_eq!(admin, StatusCode::UNAUTHORIZED);
}
