use axum::http::header::{RETRY_AFTER, WWW_AUTHENTICATE};
use axum::http::{HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use thiserror::Error;

/// Machine-readable code for authentication failures.
pub const CODE_UNAUTHORIZED: &str = "UNAUTHORIZED";

/// Machine-readable code for rate limit rejections.
pub const CODE_RATE_LIMITED: &str = "RATE_LIMITED";

/// Terminal request outcomes produced by the gateway middleware.
#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("Unauthorized: {0}")]
    Unauthorized(&'static str),

    #[error("Rate limit exceeded, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },
}

/// Invalid startup configuration. Never reaches a client.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Configuration error: {0}")]
pub struct ConfigError(pub String);

/// Convenience type alias for configuration loading.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Internal authentication failure kinds.
///
/// The distinction is kept for logs and metrics only. Clients always see one
/// of three fixed messages, see [`AuthError::client_message`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    #[error("authorization header is missing")]
    MissingHeader,

    #[error("authorization header is not a bearer credential")]
    MalformedHeader,

    #[error("no signing secret configured")]
    SecretNotConfigured,

    #[error("token has expired")]
    Expired,

    #[error("token signature does not match")]
    InvalidSignature,

    #[error("token uses a non-HMAC algorithm: {0}")]
    UnsupportedAlgorithm(String),

    #[error("token could not be decoded: {0}")]
    MalformedToken(String),
}

impl AuthError {
    /// Message returned to the caller.
    pub fn client_message(&self) -> &'static str {
        match self {
            AuthError::MissingHeader => "missing authorization header",
            AuthError::MalformedHeader => "invalid authorization header format",
            AuthError::SecretNotConfigured
            | AuthError::Expired
            | AuthError::InvalidSignature
            | AuthError::UnsupportedAlgorithm(_)
            | AuthError::MalformedToken(_) => "invalid or expired token",
        }
    }

    /// Short label used for the `reason` metric dimension.
    pub fn reason(&self) -> &'static str {
        match self {
            AuthError::MissingHeader => "missing_header",
            AuthError::MalformedHeader => "malformed_header",
            AuthError::SecretNotConfigured => "secret_not_configured",
            AuthError::Expired => "expired",
            AuthError::InvalidSignature => "invalid_signature",
            AuthError::UnsupportedAlgorithm(_) => "unsupported_algorithm",
            AuthError::MalformedToken(_) => "malformed_token",
        }
    }
}

impl From<jsonwebtoken::errors::Error> for AuthError {
    fn from(e: jsonwebtoken::errors::Error) -> Self {
        use jsonwebtoken::errors::ErrorKind;

        match e.kind() {
            ErrorKind::ExpiredSignature => AuthError::Expired,
            ErrorKind::InvalidSignature => AuthError::InvalidSignature,
            ErrorKind::InvalidAlgorithm | ErrorKind::InvalidAlgorithmName => {
                AuthError::UnsupportedAlgorithm(e.to_string())
            }
            _ => AuthError::MalformedToken(e.to_string()),
        }
    }
}

impl From<AuthError> for GatewayError {
    fn from(e: AuthError) -> Self {
        GatewayError::Unauthorized(e.client_message())
    }
}

/// Error response body: `{"code": "...", "message": "..."}`.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub code: &'static str,
    pub message: String,
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        match self {
            GatewayError::Unauthorized(message) => {
                let body = ErrorBody {
                    code: CODE_UNAUTHORIZED,
                    message: message.to_string(),
                };
                (
                    StatusCode::UNAUTHORIZED,
                    [(WWW_AUTHENTICATE, HeaderValue::from_static("Bearer"))],
                    axum::Json(body),
                )
                    .into_response()
            }
            GatewayError::RateLimited { retry_after_secs } => {
                let body = ErrorBody {
                    code: CODE_RATE_LIMITED,
                    message: "too many requests".to_string(),
                };
                (
                    StatusCode::TOO_MANY_REQUESTS,
                    [(RETRY_AFTER, HeaderValue::from(retry_after_secs))],
                    axum::Json(body),
                )
                    .into_response()
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_unauthorized_response_shape() {
        let response = GatewayError::from(AuthError::Expired).into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(response.headers()[WWW_AUTHENTICATE], "Bearer");

        let body = body_json(response).await;
        assert_eq!(body["code"], "UNAUTHORIZED");
        assert_eq!(body["message"], "invalid or expired token");
    }

    #[tokio::test]
    async fn test_rate_limited_response_shape() {
        let response = GatewayError::RateLimited {
            retry_after_secs: 2,
        }
        .into_response();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers()[RETRY_AFTER], "2");

        let body = body_json(response).await;
        assert_eq!(body["code"], "RATE_LIMITED");
        assert_eq!(body["message"], "too many requests");
    }

    #[test]
    fn test_config_error_message() {
        let err = ConfigError("RATE_LIMIT_BURST must be greater than 0".to_string());
        assert_eq!(
            err.to_string(),
            "Configuration error: RATE_LIMIT_BURST must be greater than 0"
        );
    }

    #[test]
    fn test_token_failures_share_one_client_message() {
        let failures = [
            AuthError::SecretNotConfigured,
            AuthError::Expired,
            AuthError::InvalidSignature,
            AuthError::UnsupportedAlgorithm("RS256".to_string()),
            AuthError::MalformedToken("bad base64".to_string()),
        ];
        for failure in failures {
            assert_eq!(failure.client_message(), "invalid or expired token");
        }
    }

    #[test]
    fn test_header_failures_have_distinct_messages() {
        assert_eq!(
            AuthError::MissingHeader.client_message(),
            "missing authorization header"
        );
        assert_eq!(
            AuthError::MalformedHeader.client_message(),
            "invalid authorization header format"
        );
    }
}
