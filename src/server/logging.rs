//! Audit events for license and presence operations, plus the per-request
//! logging layer.
//!
//! Every request gets a span carrying its request id and the matched
//! [`Route`]. A caller-supplied `X-Request-Id` that parses as a UUID is kept
//! so a client can correlate its own logs; anything else is replaced.

use axum::{
    body::Body,
    extract::Request,
    http::{HeaderValue, Response},
    middleware::Next,
};
use std::time::Instant;
use tracing::{info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::server::routes::Route;

/// License and presence events worth an audit line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LicenseEvent {
    /// Admin issued (or overwrote) a license
    Issued,
    /// Verify found the key
    Verified,
    /// Verify did not find the key
    VerifyFailed,
    /// Heartbeat recorded
    Heartbeat,
    /// Heartbeat refused for an unknown key
    HeartbeatRejected,
    /// Admin endpoint called without a valid token
    Unauthorized,
    /// A stored mapping was missing or malformed and reset to `{}`
    StorageHealed,
}

impl std::fmt::Display for LicenseEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            LicenseEvent::Issued => "issued",
            LicenseEvent::Verified => "verified",
            LicenseEvent::VerifyFailed => "verify_failed",
            LicenseEvent::Heartbeat => "heartbeat",
            LicenseEvent::HeartbeatRejected => "heartbeat_rejected",
            LicenseEvent::Unauthorized => "unauthorized",
            LicenseEvent::StorageHealed => "storage_healed",
        };
        write!(f, "{}", s)
    }
}

impl LicenseEvent {
    fn is_failure(self) -> bool {
        matches!(
            self,
            LicenseEvent::VerifyFailed
                | LicenseEvent::HeartbeatRejected
                | LicenseEvent::Unauthorized
                | LicenseEvent::StorageHealed
        )
    }
}

/// Log a license or presence event.
///
/// # Arguments
///
/// * `event` - The type of event
/// * `subject` - The license key, user, or storage key the event is about
/// * `details` - Optional additional details about the event
pub fn log_license_event(event: LicenseEvent, subject: &str, details: Option<&str>) {
    let span = info_span!(
        "license_event",
        event = %event,
        subject = %subject,
    );
    let _enter = span.enter();

    match (event.is_failure(), details) {
        (true, Some(d)) => warn!(reason = %d, "License event occurred"),
        (true, None) => warn!("License event occurred"),
        (false, Some(d)) => info!(details = %d, "License event occurred"),
        (false, None) => info!("License event occurred"),
    }
}

/// Header name for the request ID.
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Generate a new unique request ID.
pub fn generate_request_id() -> String {
    Uuid::new_v4().to_string()
}

/// Request id to use for `request`: the caller's, when it is a UUID.
pub fn request_id_for(request: &Request) -> String {
    request
        .headers()
        .get(REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| Uuid::parse_str(v).ok())
        .map(|id| id.to_string())
        .unwrap_or_else(generate_request_id)
}

/// Label for the endpoint a path dispatches to.
fn route_label(path: &str) -> &'static str {
    Route::from_path(path).map_or("unmatched", Route::prefix)
}

/// Wraps every request in a span, logs its outcome and echoes the request
/// id back in `X-Request-Id`.
pub async fn request_logging_middleware(request: Request, next: Next) -> Response<Body> {
    let request_id = request_id_for(&request);
    let route = route_label(request.uri().path());
    let span = info_span!(
        "request",
        request_id = %request_id,
        method = %request.method(),
        route = route,
    );

    let start = Instant::now();
    let response = next.run(request).instrument(span.clone()).await;
    let elapsed_ms = start.elapsed().as_millis() as u64;
    let status = response.status().as_u16();

    span.in_scope(|| {
        if response.status().is_server_error() {
            warn!(status, elapsed_ms, "{route} failed");
        } else {
            info!(status, elapsed_ms, "{route} served");
        }
    });

    let (mut parts, body) = response.into_parts();
    if let Ok(value) = HeaderValue::from_str(&request_id) {
        parts.headers.insert(REQUEST_ID_HEADER, value);
    }
    Response::from_parts(parts, body)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_id_is_valid_uuid() {
        let id = generate_request_id();
        assert!(Uuid::parse_str(&id).is_ok());
    }

    #[test]
    fn caller_request_id_is_kept_only_when_uuid() {
        let id = generate_request_id();
        let request = axum::http::Request::builder()
            .uri("/api/verify")
            .header(REQUEST_ID_HEADER, &id)
            .body(Body::empty())
            .unwrap();
        assert_eq!(request_id_for(&request), id);

        let request = axum::http::Request::builder()
            .uri("/api/verify")
            .header(REQUEST_ID_HEADER, "not-a-uuid")
            .body(Body::empty())
            .unwrap();
        assert_ne!(request_id_for(&request), "not-a-uuid");
    }

    #[test]
    fn routes_are_labelled_by_prefix() {
        assert_eq!(route_label("/api/heartbeat/extra"), "/api/heartbeat");
        assert_eq!(route_label("/elsewhere"), "unmatched");
    }

    #[test]
    fn event_names_are_snake_case() {
        assert_eq!(LicenseEvent::VerifyFailed.to_string(), "verify_failed");
        assert_eq!(LicenseEvent::StorageHealed.to_string(), "storage_healed");
        assert!(LicenseEvent::Unauthorized.is_failure());
        assert!(!LicenseEvent::Issued.is_failure());
    }
}
