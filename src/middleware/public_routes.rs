//! Classification of routes that are reachable without a bearer token.
//!
//! Rules are `(method, path prefix)` pairs evaluated in order with a linear
//! scan. The table is expected to hold a handful of entries, so no indexing
//! structure is used. `OPTIONS` requests are always public so that CORS
//! preflights never need credentials.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use axum::http::Method;
use thiserror::Error;

/// Default public route table: catalogue reads, login and health.
pub const DEFAULT_PUBLIC_ROUTES: [(&str, &str); 8] = [
    ("GET", "/api/v1/products"),
    ("GET", "/api/v1/categories"),
    ("GET", "/api/v1/brands"),
    ("GET", "/api/v1/banners"),
    ("GET", "/api/v1/search"),
    ("GET", "/api/v1/campaigns"),
    ("POST", "/api/v1/auth"),
    ("GET", "/health"),
];

/// Error returned when a textual route rule cannot be parsed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RouteRuleParseError {
    #[error("route rule '{0}' must have the form 'METHOD /prefix'")]
    InvalidFormat(String),

    #[error("route rule '{0}' has an invalid HTTP method")]
    InvalidMethod(String),

    #[error("route rule '{0}' must have a path prefix starting with '/'")]
    InvalidPrefix(String),
}

/// A single public route: requests with this method whose path starts with
/// `path_prefix` bypass authentication.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteRule {
    method: Method,
    path_prefix: String,
}

impl RouteRule {
    pub fn new(method: Method, path_prefix: impl Into<String>) -> Self {
        Self {
            method,
            path_prefix: path_prefix.into(),
        }
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn path_prefix(&self) -> &str {
        &self.path_prefix
    }

    #[inline]
    pub fn matches(&self, method: &Method, path: &str) -> bool {
        self.method == *method && path.starts_with(self.path_prefix.as_str())
    }
}

impl fmt::Display for RouteRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.method, self.path_prefix)
    }
}

/// Parses `"GET /api/v1/products"`. Surrounding whitespace is ignored and the
/// method is upper-cased.
impl FromStr for RouteRule {
    type Err = RouteRuleParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.split_whitespace();
        let (Some(method), Some(prefix), None) = (parts.next(), parts.next(), parts.next()) else {
            return Err(RouteRuleParseError::InvalidFormat(s.to_string()));
        };

        let method = Method::from_bytes(method.to_ascii_uppercase().as_bytes())
            .map_err(|_| RouteRuleParseError::InvalidMethod(s.to_string()))?;

        if !prefix.starts_with('/') {
            return Err(RouteRuleParseError::InvalidPrefix(s.to_string()));
        }

        Ok(Self::new(method, prefix))
    }
}

/// Ordered, immutable table of public routes.
///
/// Cheap to clone: the rules are shared behind an `Arc`.
#[derive(Debug, Clone, Default)]
pub struct PublicRoutes {
    rules: Arc<[RouteRule]>,
}

impl PublicRoutes {
    pub fn new(rules: Vec<RouteRule>) -> Self {
        Self {
            rules: rules.into(),
        }
    }

    /// The table from [`DEFAULT_PUBLIC_ROUTES`].
    pub fn defaults() -> Self {
        Self::new(default_rules())
    }

    /// Whether `(method, path)` can be served without authentication.
    pub fn is_public(&self, method: &Method, path: &str) -> bool {
        if method == Method::OPTIONS {
            return true;
        }
        self.rules.iter().any(|rule| rule.matches(method, path))
    }

    pub fn rules(&self) -> &[RouteRule] {
        &self.rules
    }
}

/// Owned copy of [`DEFAULT_PUBLIC_ROUTES`].
pub fn default_rules() -> Vec<RouteRule> {
    DEFAULT_PUBLIC_ROUTES
        .iter()
        .filter_map(|(method, prefix)| {
            Method::from_bytes(method.as_bytes())
                .ok()
                .map(|m| RouteRule::new(m, *prefix))
        })
        .collect()
}
