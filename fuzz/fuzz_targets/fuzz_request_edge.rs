//! Fuzz testing for request-facing parsing at the gateway edge.
//!
//! Everything exercised here consumes attacker-controlled bytes before any
//! authentication has happened, so none of it may panic.
//!
//! # Running the Fuzz Tests
//!
//! ```bash
//! # Install cargo-fuzz (requires nightly)
//! cargo +nightly install cargo-fuzz
//!
//! # Run with a time limit (e.g., 60 seconds)
//! cargo +nightly fuzz run fuzz_request_edge -- -max_total_time=60
//! ```
//!
//! # What This Tests
//!
//! - `resolve_client_ip`: forwarding header parsing
//! - `strip_port`: peer address normalisation
//! - `TokenValidator::validate`: token header and signature checks
//! - `ClaimValue::render`: claim payload values, decoded straight from the input
//! - `RouteRule::from_str`: `PUBLIC_ROUTES` entries

#![no_main]

use axum::body::Body;
use axum::http::{HeaderValue, Request};
use edge_gateway::middleware::{ClaimValue, RouteRule, TokenValidator, resolve_client_ip, strip_port};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(value) = HeaderValue::from_bytes(data) {
        for header in ["x-forwarded-for", "x-real-ip"] {
            if let Ok(req) = Request::builder()
                .header(header, value.clone())
                .body(Body::empty())
            {
                let _ = resolve_client_ip(&req);
            }
        }
    }

    if let Ok(s) = std::str::from_utf8(data) {
        let _ = strip_port(s);
        let _ = s.parse::<RouteRule>();

        // Signature checks reject almost every input before the payload is
        // decoded, so claim rendering is driven separately below
        let validator = TokenValidator::new("fuzz-secret");
        let _ = validator.validate(s);
    }

    if let Ok(value) = serde_json::from_slice::<ClaimValue>(data) {
        let _ = value.render();
    }
});
