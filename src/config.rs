//! Configuration system for keybeat.
//!
//! Configuration is loaded from multiple sources with the following precedence:
//! 1. Environment variables (highest priority)
//! 2. `keybeat.toml` file
//! 3. `config.toml` file
//! 4. Default values (lowest priority)
//!
//! # Environment Variables
//!
//! - `KEYBEAT_SERVER_HOST` - Server bind address
//! - `KEYBEAT_SERVER_PORT` - Server port
//! - `KEYBEAT_STORAGE_BACKEND` - Storage backend (memory, sqlite, postgres)
//! - `KEYBEAT_DATABASE_URL` - Database connection URL (routed by scheme)
//! - `KEYBEAT_LOG_LEVEL` - Log level (trace, debug, info, warn, error)
//! - `KEYBEAT_ADMIN_TOKEN` / `ADMIN_TOKEN` - Shared secret for admin endpoints
//! - `KEYBEAT_SERVER_URL` - Base URL used by the client
//! - `KEYBEAT_HEARTBEAT_INTERVAL` - Client heartbeat interval in seconds

use config::builder::DefaultState;
use config::{Config, ConfigBuilder};
use serde::Deserialize;
use std::env;
use std::path::Path;
use std::sync::OnceLock;

use crate::errors::{KeybeatError, KeybeatResult};

/// Global configuration singleton.
static CONFIG: OnceLock<KeybeatConfig> = OnceLock::new();

/// Root configuration structure.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct KeybeatConfig {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub logging: LoggingConfig,
    pub admin: AdminConfig,
    pub client: ClientConfig,
}

/// Server configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Host address to bind to
    pub host: String,
    /// Port to listen on
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
        }
    }
}

/// Key-value storage configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Backend type: "memory", "sqlite" or "postgres"
    pub backend: String,
    /// SQLite connection URL
    pub sqlite_url: String,
    /// PostgreSQL connection URL
    pub postgres_url: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: "sqlite".to_string(),
            sqlite_url: "sqlite://keybeat.db?mode=rwc".to_string(),
            postgres_url: "postgres://localhost/keybeat".to_string(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

/// Admin endpoint configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AdminConfig {
    /// Shared secret. Empty disables every admin endpoint.
    pub token: String,
}

impl AdminConfig {
    /// The configured secret, or `None` when admin access is disabled.
    pub fn secret(&self) -> Option<String> {
        Some(self.token.clone()).filter(|t| !t.is_empty())
    }
}

/// Settings used by the bundled client.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Base URL of the keybeat server
    pub server_url: String,
    /// Seconds between heartbeats
    pub heartbeat_interval_secs: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server_url: "http://127.0.0.1:8080".to_string(),
            heartbeat_interval_secs: 10,
        }
    }
}

fn config_err(e: config::ConfigError) -> KeybeatError {
    KeybeatError::ConfigError(e.to_string())
}

fn with_defaults(
    builder: ConfigBuilder<DefaultState>,
) -> KeybeatResult<ConfigBuilder<DefaultState>> {
    let defaults = KeybeatConfig::default();
    builder
        .set_default("server.host", defaults.server.host)
        .map_err(config_err)?
        .set_default("server.port", i64::from(defaults.server.port))
        .map_err(config_err)?
        .set_default("storage.backend", defaults.storage.backend)
        .map_err(config_err)?
        .set_default("storage.sqlite_url", defaults.storage.sqlite_url)
        .map_err(config_err)?
        .set_default("storage.postgres_url", defaults.storage.postgres_url)
        .map_err(config_err)?
        .set_default("logging.level", defaults.logging.level)
        .map_err(config_err)?
        .set_default("admin.token", "")
        .map_err(config_err)?
        .set_default("client.server_url", defaults.client.server_url)
        .map_err(config_err)?
        .set_default(
            "client.heartbeat_interval_secs",
            defaults.client.heartbeat_interval_secs as i64,
        )
        .map_err(config_err)
}

impl KeybeatConfig {
    /// Load configuration from the working directory and environment.
    pub fn load() -> KeybeatResult<Self> {
        Self::load_from(Path::new("."))
    }

    /// Load configuration with config files looked up in `dir`.
    ///
    /// Later sources override earlier ones:
    /// 1. Default values
    /// 2. `config.toml` file (optional)
    /// 3. `keybeat.toml` file (optional)
    /// 4. Environment variables
    pub fn load_from(dir: &Path) -> KeybeatResult<Self> {
        let database_url = env::var("KEYBEAT_DATABASE_URL").ok();
        let admin_token = env::var("KEYBEAT_ADMIN_TOKEN")
            .ok()
            .or_else(|| env::var("ADMIN_TOKEN").ok());

        let builder = with_defaults(Config::builder())?
            .add_source(config::File::from(dir.join("config")).required(false))
            .add_source(config::File::from(dir.join("keybeat")).required(false))
            .set_override_option("server.host", env::var("KEYBEAT_SERVER_HOST").ok())
            .map_err(config_err)?
            .set_override_option(
                "server.port",
                env::var("KEYBEAT_SERVER_PORT")
                    .ok()
                    .and_then(|v| v.parse::<i64>().ok()),
            )
            .map_err(config_err)?
            .set_override_option(
                "storage.backend",
                env::var("KEYBEAT_STORAGE_BACKEND").ok(),
            )
            .map_err(config_err)?
            .set_override_option(
                "storage.sqlite_url",
                database_url
                    .clone()
                    .filter(|url| url.starts_with("sqlite")),
            )
            .map_err(config_err)?
            .set_override_option(
                "storage.postgres_url",
                database_url.filter(|url| url.starts_with("postgres")),
            )
            .map_err(config_err)?
            .set_override_option("logging.level", env::var("KEYBEAT_LOG_LEVEL").ok())
            .map_err(config_err)?
            .set_override_option("admin.token", admin_token)
            .map_err(config_err)?
            .set_override_option("client.server_url", env::var("KEYBEAT_SERVER_URL").ok())
            .map_err(config_err)?
            .set_override_option(
                "client.heartbeat_interval_secs",
                env::var("KEYBEAT_HEARTBEAT_INTERVAL")
                    .ok()
                    .and_then(|v| v.parse::<i64>().ok()),
            )
            .map_err(config_err)?;

        let settings = builder
            .build()
            .map_err(|e| KeybeatError::ConfigError(format!("failed to build config: {e}")))?;

        settings
            .try_deserialize()
            .map_err(|e| KeybeatError::ConfigError(format!("failed to deserialize config: {e}")))
    }

    /// Validate the configuration.
    pub fn validate(&self) -> KeybeatResult<()> {
        if self.server.port == 0 {
            return Err(KeybeatError::ConfigError(
                "server.port must be greater than 0".to_string(),
            ));
        }

        match self.storage.backend.as_str() {
            "memory" | "sqlite" | "postgres" => {}
            other => {
                return Err(KeybeatError::ConfigError(format!(
                    "storage.backend must be 'memory', 'sqlite' or 'postgres', got '{other}'"
                )));
            }
        }

        match self.logging.level.to_lowercase().as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            other => {
                return Err(KeybeatError::ConfigError(format!(
                    "logging.level must be one of: trace, debug, info, warn, error. Got '{other}'"
                )));
            }
        }

        if self.client.heartbeat_interval_secs == 0 {
            return Err(KeybeatError::ConfigError(
                "client.heartbeat_interval_secs must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}

/// Get the global configuration.
///
/// This loads the configuration on first access and caches it.
/// Returns an error if configuration loading or validation fails.
pub fn get_config() -> KeybeatResult<&'static KeybeatConfig> {
    if let Some(config) = CONFIG.get() {
        return Ok(config);
    }

    let config = KeybeatConfig::load()?;
    config.validate()?;

    // Another thread may have won the race; either value is fine.
    Ok(CONFIG.get_or_init(|| config))
}
