use axum::{middleware, Router};

use crate::server::handlers::{dispatch, AppState};
use crate::server::logging::request_logging_middleware;

/// Operations reachable over HTTP.
///
/// Paths are matched by prefix, in declaration order; the first match wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    Verify,
    Heartbeat,
    Status,
    AddLicense,
    ListHeartbeats,
}

impl Route {
    /// Precedence order used by [`Route::from_path`].
    pub const ALL: [Route; 5] = [
        Route::Verify,
        Route::Heartbeat,
        Route::Status,
        Route::AddLicense,
        Route::ListHeartbeats,
    ];

    pub fn prefix(self) -> &'static str {
        match self {
            Route::Verify => "/api/verify",
            Route::Heartbeat => "/api/heartbeat",
            Route::Status => "/api/status",
            Route::AddLicense => "/api/admin/add_license",
            Route::ListHeartbeats => "/api/admin/list_heartbeats",
        }
    }

    pub fn from_path(path: &str) -> Option<Route> {
        Self::ALL
            .into_iter()
            .find(|route| path.starts_with(route.prefix()))
    }
}

/// Build the application router.
///
/// Every request goes through a single fallback handler so that routing can
/// be done by path prefix rather than exact match:
///
/// - `/api/verify` - Is a license key issued? (GET/POST)
/// - `/api/heartbeat` - Record a user's heartbeat (POST)
/// - `/api/status` - Is a user online? (GET/POST)
/// - `/api/admin/add_license` - Issue a license (admin token)
/// - `/api/admin/list_heartbeats` - Dump all heartbeats (admin token)
///
/// Anything else is `404 not_found`.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .fallback(dispatch)
        .layer(middleware::from_fn(request_logging_middleware))
        .with_state(state)
}
