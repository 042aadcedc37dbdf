//! Client-side error types for the keybeat client.
//!
//! These mirror the server's `{ok:false, error:"<code>"}` responses so callers
//! can branch on the error code instead of parsing messages.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Error codes returned by the keybeat server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClientErrorCode {
    InvalidJson,
    MissingKey,
    MissingFields,
    InvalidKey,
    MissingUser,
    Unauthorized,
    NotFound,
    InternalError,

    /// Unknown error code (forward compatibility)
    #[serde(other)]
    Unknown,
}

impl ClientErrorCode {
    /// Returns a default human-readable message for this error code.
    pub fn default_message(&self) -> &'static str {
        match self {
            ClientErrorCode::InvalidJson => "Request body was not valid JSON",
            ClientErrorCode::MissingKey => "License key is required",
            ClientErrorCode::MissingFields => "A required field is missing",
            ClientErrorCode::InvalidKey => "License key is not valid",
            ClientErrorCode::MissingUser => "User is required",
            ClientErrorCode::Unauthorized => "Admin token missing or invalid",
            ClientErrorCode::NotFound => "Endpoint not found",
            ClientErrorCode::InternalError => "Internal server error",
            ClientErrorCode::Unknown => "Unknown error",
        }
    }

    /// Returns true if this error means the license key itself is unusable.
    pub fn is_license_invalid(&self) -> bool {
        matches!(self, ClientErrorCode::InvalidKey)
    }
}

impl fmt::Display for ClientErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.default_message())
    }
}

/// Failure body returned by the server.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerErrorResponse {
    pub ok: bool,
    pub error: ClientErrorCode,
}

/// Error returned by [`KeybeatClient`](crate::client::api::KeybeatClient) calls.
#[derive(Debug, Error)]
pub enum ClientError {
    /// The server answered with `ok:false`.
    #[error("server rejected request: {0}")]
    Api(ClientErrorCode),

    /// The request never produced a response.
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// The response body did not match any expected shape.
    #[error("unexpected response (HTTP {status}): {body}")]
    UnexpectedResponse { status: u16, body: String },
}

impl ClientError {
    /// The server error code, if the server produced one.
    pub fn code(&self) -> Option<ClientErrorCode> {
        match self {
            ClientError::Api(code) => Some(*code),
            _ => None,
        }
    }
}

pub type ClientResult<T> = Result<T, ClientError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_server_error_response() {
        let resp: ServerErrorResponse =
            serde_json::from_str(r#"{"ok": false, "error": "invalid_key"}"#).unwrap();
        assert!(!resp.ok);
        assert_eq!(resp.error, ClientErrorCode::InvalidKey);
        assert!(resp.error.is_license_invalid());
    }

    #[test]
    fn parse_unknown_error_code() {
        let resp: ServerErrorResponse =
            serde_json::from_str(r#"{"ok": false, "error": "rate_limited"}"#).unwrap();
        assert_eq!(resp.error, ClientErrorCode::Unknown);
    }

    #[test]
    fn client_error_exposes_code() {
        let err = ClientError::Api(ClientErrorCode::Unauthorized);
        assert_eq!(err.code(), Some(ClientErrorCode::Unauthorized));
        assert!(err.to_string().contains("Admin token"));
    }
}
