//! Shared-secret authorization for the admin endpoints.
//!
//! The caller's token is taken from, in order:
//! 1. the `x-admin-token` header
//! 2. the `admin_token` header
//! 3. the `token` query parameter
//!
//! Admin access is disabled entirely when no secret is configured.

use std::collections::HashMap;

use axum::http::HeaderMap;
use sha2::{Digest, Sha256};

/// Primary admin token header.
pub const ADMIN_TOKEN_HEADER: &str = "x-admin-token";

/// Alternate admin token header.
pub const ADMIN_TOKEN_HEADER_ALT: &str = "admin_token";

/// Query parameter accepted as a last resort.
pub const ADMIN_TOKEN_QUERY: &str = "token";

fn header_token(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// Extract the caller-supplied admin token, honoring source precedence.
pub fn provided_token(headers: &HeaderMap, query: &HashMap<String, String>) -> Option<String> {
    header_token(headers, ADMIN_TOKEN_HEADER)
        .or_else(|| header_token(headers, ADMIN_TOKEN_HEADER_ALT))
        .or_else(|| {
            query
                .get(ADMIN_TOKEN_QUERY)
                .filter(|t| !t.is_empty())
                .cloned()
        })
}

fn digest(token: &str) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hasher.finalize().into()
}

/// Compare a provided token with the configured secret.
///
/// Both sides are hashed first so the comparison time does not depend on
/// how much of the secret the caller guessed.
pub fn token_matches(provided: &str, secret: &str) -> bool {
    digest(provided) == digest(secret)
}

/// Decide whether the request may use admin endpoints.
pub fn is_authorized(
    headers: &HeaderMap,
    query: &HashMap<String, String>,
    secret: Option<&str>,
) -> bool {
    let Some(secret) = secret.filter(|s| !s.is_empty()) else {
        return false;
    };
    match provided_token(headers, query) {
        Some(token) => token_matches(&token, secret),
        None => false,
    }
}
