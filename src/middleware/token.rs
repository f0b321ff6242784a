//! Bearer token validation.
//!
//! Tokens are JWTs signed with a shared HMAC secret. Only the HMAC family
//! (`HS256`, `HS384`, `HS512`) is accepted; anything else, including
//! `alg: none` and asymmetric algorithms, is rejected before the signature is
//! looked at. This closes the algorithm-confusion hole where a public key is
//! accepted as an HMAC secret.
//!
//! Expiry is enforced with zero leeway and the `exp` claim is mandatory.
//!
//! # Claim values
//!
//! Identity claims are not guaranteed to be strings: issuers that store
//! numeric user ids emit them as JSON numbers. [`ClaimValue`] captures the
//! three shapes and [`ClaimValue::render`] gives the canonical header form:
//!
//! | JSON       | Rendered |
//! |------------|----------|
//! | `"u-17"`   | `u-17`   |
//! | `42`       | `42`     |
//! | `42.0`     | `42`     |
//! | `42.5`     | `42.5`   |
//! | `true`     | `true`   |

use std::fmt;

use chrono::{DateTime, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode, decode_header};
use serde::Deserialize;

use crate::error::AuthError;

/// Signing algorithms accepted by the validator.
pub const HMAC_ALGORITHMS: [Algorithm; 3] = [Algorithm::HS256, Algorithm::HS384, Algorithm::HS512];

/// Largest magnitude at which every integral `f64` is exactly representable.
const MAX_SAFE_INTEGER: f64 = 9_007_199_254_740_992.0;

/// A single claim as it appears in the token payload.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum ClaimValue {
    Text(String),
    Number(serde_json::Number),
    Other(serde_json::Value),
}

impl ClaimValue {
    /// Canonical string form used for forwarded headers.
    pub fn render(&self) -> String {
        match self {
            ClaimValue::Text(s) => s.clone(),
            ClaimValue::Number(n) => render_number(n),
            ClaimValue::Other(v) => v.to_string(),
        }
    }

    /// Rendered value, or `None` when it renders to an empty string.
    fn non_empty(&self) -> Option<String> {
        Some(self.render()).filter(|s| !s.is_empty())
    }
}

impl fmt::Display for ClaimValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}

fn render_number(n: &serde_json::Number) -> String {
    if let Some(i) = n.as_i64() {
        return i.to_string();
    }
    if let Some(u) = n.as_u64() {
        return u.to_string();
    }
    match n.as_f64() {
        Some(f) => render_float(f),
        None => n.to_string(),
    }
}

/// Integral values print without a fractional part, everything else uses the
/// shortest round-trip representation.
fn render_float(f: f64) -> String {
    if f.is_finite() && f.fract() == 0.0 && f.abs() < MAX_SAFE_INTEGER {
        #[allow(clippy::cast_possible_truncation)]
        let integral = f as i64;
        integral.to_string()
    } else {
        f.to_string()
    }
}

/// Payload shape as decoded from the token. Unknown claims are ignored.
#[derive(Debug, Deserialize)]
struct RawClaims {
    #[serde(default)]
    user_id: Option<ClaimValue>,
    #[serde(default)]
    sub: Option<ClaimValue>,
    #[serde(default)]
    email: Option<ClaimValue>,
    #[serde(default)]
    role: Option<ClaimValue>,
    #[serde(default)]
    exp: Option<f64>,
}

/// Identity extracted from a validated token.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Claims {
    /// `user_id`, falling back to `sub`.
    pub subject: Option<String>,
    pub email: Option<String>,
    pub role: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
}

impl From<RawClaims> for Claims {
    fn from(raw: RawClaims) -> Self {
        let subject = raw
            .user_id
            .as_ref()
            .and_then(ClaimValue::non_empty)
            .or_else(|| raw.sub.as_ref().and_then(ClaimValue::non_empty));

        #[allow(clippy::cast_possible_truncation)]
        let expires_at = raw
            .exp
            .filter(|exp| exp.is_finite())
            .and_then(|exp| DateTime::from_timestamp(exp.trunc() as i64, 0));

        Self {
            subject,
            email: raw.email.as_ref().and_then(ClaimValue::non_empty),
            role: raw.role.as_ref().and_then(ClaimValue::non_empty),
            expires_at,
        }
    }
}

/// Verifies HMAC-signed bearer tokens against one shared secret.
#[derive(Clone)]
pub struct TokenValidator {
    key: DecodingKey,
    validation: Validation,
    secret_configured: bool,
}

impl TokenValidator {
    /// Build a validator for `secret`.
    ///
    /// An empty secret is accepted here so that a misconfigured gateway keeps
    /// running; every token is then rejected with
    /// [`AuthError::SecretNotConfigured`].
    pub fn new(secret: &str) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.algorithms = HMAC_ALGORITHMS.to_vec();
        validation.leeway = 0;
        validation.validate_exp = true;
        validation.validate_nbf = false;
        validation.validate_aud = false;
        validation.set_required_spec_claims(&["exp"]);

        Self {
            key: DecodingKey::from_secret(secret.as_bytes()),
            validation,
            secret_configured: !secret.is_empty(),
        }
    }

    pub fn is_configured(&self) -> bool {
        self.secret_configured
    }

    /// Verify `token` and extract its identity claims.
    ///
    /// # Errors
    ///
    /// - [`AuthError::SecretNotConfigured`] if the validator has no secret
    /// - [`AuthError::UnsupportedAlgorithm`] for any non-HMAC header
    /// - [`AuthError::InvalidSignature`] if the signature does not verify
    /// - [`AuthError::Expired`] if `exp` is in the past
    /// - [`AuthError::MalformedToken`] for anything that fails to decode
    pub fn validate(&self, token: &str) -> Result<Claims, AuthError> {
        if !self.secret_configured {
            return Err(AuthError::SecretNotConfigured);
        }

        let header = decode_header(token)?;
        if !HMAC_ALGORITHMS.contains(&header.alg) {
            return Err(AuthError::UnsupportedAlgorithm(format!("{:?}", header.alg)));
        }

        let data = decode::<RawClaims>(token, &self.key, &self.validation)?;
        Ok(data.claims.into())
    }
}

impl fmt::Debug for TokenValidator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenValidator")
            .field("algorithms", &self.validation.algorithms)
            .field("secret_configured", &self.secret_configured)
            .finish_non_exhaustive()
    }
}
