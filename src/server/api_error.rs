//! Error responses for every keybeat endpoint.
//!
//! All failures share one JSON shape:
//!
//! ```json
//! { "ok": false, "error": "missing_fields" }
//! ```
//!
//! Domain rejections keep HTTP 200; only malformed bodies (400), failed admin
//! authorization (403), unknown routes (404) and internal failures (500)
//! change the status code.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::error;

use crate::errors::KeybeatError;

/// Machine-readable error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    /// Request body is not valid JSON
    InvalidJson,
    /// Verify called without a key
    MissingKey,
    /// A required body field is missing
    MissingFields,
    /// License key is not issued
    InvalidKey,
    /// Status called without a user
    MissingUser,
    /// Admin token missing, wrong, or admin access disabled
    Unauthorized,
    /// No route matches the path
    NotFound,
    /// Storage or other unexpected failure
    InternalError,
}

impl ErrorCode {
    /// Returns the HTTP status code for this error code.
    pub fn status_code(&self) -> StatusCode {
        match self {
            ErrorCode::InvalidJson => StatusCode::BAD_REQUEST,
            ErrorCode::Unauthorized => StatusCode::FORBIDDEN,
            ErrorCode::NotFound => StatusCode::NOT_FOUND,
            ErrorCode::InternalError => StatusCode::INTERNAL_SERVER_ERROR,
            ErrorCode::MissingKey
            | ErrorCode::MissingFields
            | ErrorCode::InvalidKey
            | ErrorCode::MissingUser => StatusCode::OK,
        }
    }

    /// The wire name of this code.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::InvalidJson => "invalid_json",
            ErrorCode::MissingKey => "missing_key",
            ErrorCode::MissingFields => "missing_fields",
            ErrorCode::InvalidKey => "invalid_key",
            ErrorCode::MissingUser => "missing_user",
            ErrorCode::Unauthorized => "unauthorized",
            ErrorCode::NotFound => "not_found",
            ErrorCode::InternalError => "internal_error",
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error response body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiError {
    /// Always `false`
    pub ok: bool,
    pub error: ErrorCode,
}

impl ApiError {
    pub fn new(code: ErrorCode) -> Self {
        Self {
            ok: false,
            error: code,
        }
    }

    /// Returns the HTTP status code for this error.
    pub fn status_code(&self) -> StatusCode {
        self.error.status_code()
    }

    pub fn invalid_json() -> Self {
        Self::new(ErrorCode::InvalidJson)
    }

    pub fn missing_key() -> Self {
        Self::new(ErrorCode::MissingKey)
    }

    pub fn missing_fields() -> Self {
        Self::new(ErrorCode::MissingFields)
    }

    pub fn invalid_key() -> Self {
        Self::new(ErrorCode::InvalidKey)
    }

    pub fn missing_user() -> Self {
        Self::new(ErrorCode::MissingUser)
    }

    pub fn unauthorized() -> Self {
        Self::new(ErrorCode::Unauthorized)
    }

    pub fn not_found() -> Self {
        Self::new(ErrorCode::NotFound)
    }

    pub fn internal_error() -> Self {
        Self::new(ErrorCode::InternalError)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        (status, Json(self)).into_response()
    }
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.error)
    }
}

impl std::error::Error for ApiError {}

/// Storage and other internal failures surface as `internal_error`;
/// the details stay in the server log.
impl From<KeybeatError> for ApiError {
    fn from(err: KeybeatError) -> Self {
        error!("Request failed: {err}");
        ApiError::internal_error()
    }
}
