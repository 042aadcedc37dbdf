use thiserror::Error;

/// Crate-wide error type.
///
/// Domain rejections (missing fields, unknown keys, bad admin tokens) are not
/// errors at this level: they are normal `ok:false` responses produced by the
/// handlers. This type covers the failures that escape a single request:
/// configuration, storage and transport problems.
#[derive(Debug, Error)]
pub enum KeybeatError {
    #[error("configuration error: {0}")]
    ConfigError(String),

    #[error("storage error: {0}")]
    StorageError(String),

    #[error("serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("network error: {0}")]
    NetworkError(#[from] reqwest::Error),

    #[error("server error: {0}")]
    ServerError(String),
}

pub type KeybeatResult<T> = Result<T, KeybeatError>;
