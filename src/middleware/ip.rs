//! Client IP resolution for rate limit bucketing.
//!
//! The resolved address is used **only** as a rate limit key. It is never an
//! identity signal and never feeds an authorization decision.
//!
//! # Precedence
//!
//! 1. `X-Forwarded-For`: the whole value if it is a single IP literal,
//!    otherwise the first comma-separated entry (trimmed) if that entry is an
//!    IP literal.
//! 2. `X-Real-IP`: the trimmed value if it is an IP literal.
//! 3. The peer address from Axum's `ConnectInfo<SocketAddr>`, with the port
//!    suffix stripped.
//! 4. [`UNKNOWN_IP`].
//!
//! Each step only runs when the previous one produced nothing usable, so a
//! garbage `X-Forwarded-For` falls through to `X-Real-IP` instead of becoming
//! a key of its own.
//!
//! # Security Warning: IP Spoofing Risk
//!
//! Forwarding headers are client-controlled unless an edge proxy overwrites
//! them. Deploy behind a proxy that sets (not appends) `X-Forwarded-For` and
//! `X-Real-IP`, otherwise a client can rotate spoofed addresses to dodge its
//! budget.
//!
//! # Internal Architecture
//!
//! ```text
//!   extract_ip_from_headers ── borrowed &str, no allocation
//!            │
//!            ▼
//!   resolve_client_ip ── header hit? ─ no ─► ConnectInfo peer ─► "unknown"
//!            │
//!           yes
//!            ▼
//!   Cow::Owned(ip)
//! ```

use std::borrow::Cow;
use std::net::{IpAddr, SocketAddr};

use axum::extract::ConnectInfo;
use axum::http::{HeaderMap, Request};
use tracing::trace;

/// Header carrying the proxy chain, leftmost entry is the originating client.
pub const X_FORWARDED_FOR: &str = "x-forwarded-for";

/// Single-address header set by some proxies.
pub const X_REAL_IP: &str = "x-real-ip";

/// Fallback key when no client IP can be determined.
///
/// All such requests share one bucket.
pub const UNKNOWN_IP: &str = "unknown";

/// Where a resolved IP came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ExtractedIp<'a> {
    /// Entire `X-Forwarded-For` value, or its first entry.
    FromXff(&'a str),
    /// `X-Real-IP` header.
    FromRealIp(&'a str),
    /// No usable header.
    NotFound,
}

#[inline]
fn is_ip_literal(value: &str) -> bool {
    value.parse::<IpAddr>().is_ok()
}

#[inline]
fn extract_ip_from_headers(headers: &HeaderMap) -> ExtractedIp<'_> {
    if let Some(forwarded) = headers.get(X_FORWARDED_FOR)
        && let Ok(raw) = forwarded.to_str()
    {
        // A lone address is returned verbatim
        if is_ip_literal(raw) {
            return ExtractedIp::FromXff(raw);
        }

        if let Some(first) = raw.split(',').next().map(str::trim)
            && is_ip_literal(first)
        {
            return ExtractedIp::FromXff(first);
        }
    }

    if let Some(real_ip) = headers.get(X_REAL_IP)
        && let Ok(raw) = real_ip.to_str()
    {
        let candidate = raw.trim();
        if is_ip_literal(candidate) {
            return ExtractedIp::FromRealIp(candidate);
        }
    }

    ExtractedIp::NotFound
}

/// Strip a `:port` suffix from a remote address.
///
/// Handles `host:port` and `[v6]:port`. Anything without a recognisable port
/// suffix (a bare IPv4 or IPv6 address, a bracketed address with no port) is
/// returned unchanged.
pub fn strip_port(addr: &str) -> &str {
    if let Some(rest) = addr.strip_prefix('[') {
        return match rest.split_once("]:") {
            Some((host, _port)) => host,
            None => addr,
        };
    }

    match addr.split_once(':') {
        // Exactly one colon: host:port. More than one means bare IPv6.
        Some((host, port)) if !port.contains(':') => host,
        _ => addr,
    }
}

/// Resolve the client IP for a request.
///
/// See the module documentation for the precedence rules.
///
/// # Returns
///
/// `Cow<'static, str>`, borrowed for [`UNKNOWN_IP`] and owned otherwise. Call
/// `.into_owned()` when a `String` key is needed.
pub fn resolve_client_ip<B>(req: &Request<B>) -> Cow<'static, str> {
    match extract_ip_from_headers(req.headers()) {
        ExtractedIp::FromXff(ip) => {
            trace!(client_ip = %ip, "Resolved client IP from X-Forwarded-For");
            Cow::Owned(ip.to_string())
        }
        ExtractedIp::FromRealIp(ip) => {
            trace!(client_ip = %ip, "Resolved client IP from X-Real-IP");
            Cow::Owned(ip.to_string())
        }
        ExtractedIp::NotFound => match req.extensions().get::<ConnectInfo<SocketAddr>>() {
            Some(ConnectInfo(peer)) => Cow::Owned(strip_port(&peer.to_string()).to_string()),
            None => Cow::Borrowed(UNKNOWN_IP),
        },
    }
}
