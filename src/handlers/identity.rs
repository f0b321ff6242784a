//! Fallback handler that reports the identity the gateway forwarded.
//!
//! Stands in for a real upstream service: whatever reaches it has already
//! passed the rate limiter and authentication, so the `X-User-*` headers it
//! echoes are exactly what a downstream service would trust.

use axum::Json;
use axum::http::{HeaderMap, Method, Uri};
use tracing::instrument;

use crate::middleware::{USER_EMAIL_HEADER, USER_ID_HEADER, USER_ROLE_HEADER};
use crate::models::IdentityResponse;

#[instrument(skip(headers))]
pub async fn identity(method: Method, uri: Uri, headers: HeaderMap) -> Json<IdentityResponse> {
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string)
    };

    Json(IdentityResponse {
        method: method.to_string(),
        path: uri.path().to_string(),
        user_id: header(USER_ID_HEADER),
        email: header(USER_EMAIL_HEADER),
        role: header(USER_ROLE_HEADER),
    })
}
