use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use serde_json::Value;
use tracing::{error, warn};

#[cfg(any(feature = "sqlite", feature = "postgres"))]
use sqlx::query_scalar;

#[cfg(feature = "sqlite")]
use sqlx::SqlitePool;

#[cfg(feature = "postgres")]
use sqlx::PgPool;

use crate::config::StorageConfig;
use crate::errors::{KeybeatError, KeybeatResult};

/// Process-local key-value store.
///
/// Values are cloned in and out, so callers get the same whole-value
/// read/write semantics as the SQL backends.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    inner: Arc<RwLock<HashMap<String, Value>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn get(&self, key: &str) -> KeybeatResult<Option<Value>> {
        let map = self
            .inner
            .read()
            .map_err(|_| KeybeatError::StorageError("memory store lock poisoned".into()))?;
        Ok(map.get(key).cloned())
    }

    fn set(&self, key: &str, value: &Value) -> KeybeatResult<()> {
        let mut map = self
            .inner
            .write()
            .map_err(|_| KeybeatError::StorageError("memory store lock poisoned".into()))?;
        map.insert(key.to_string(), value.clone());
        Ok(())
    }
}

/// Key-value storage over an in-memory map, SQLite or Postgres.
///
/// Available variants depend on enabled features:
/// - `Memory` is always available
/// - `sqlite` feature enables `Database::SQLite`
/// - `postgres` feature enables `Database::Postgres`
///
/// The SQL backends keep everything in one `kv_store` table with the value
/// stored as JSON text.
#[derive(Debug, Clone)]
pub enum Database {
    Memory(MemoryStore),
    #[cfg(feature = "sqlite")]
    SQLite(SqlitePool),
    #[cfg(feature = "postgres")]
    Postgres(PgPool),
}

/// Decode a stored JSON text value. Garbage reads as absent so the
/// repository can heal it.
#[cfg(any(feature = "sqlite", feature = "postgres"))]
fn decode_stored(key: &str, raw: Option<String>) -> Option<Value> {
    let raw = raw?;
    match serde_json::from_str(&raw) {
        Ok(value) => Some(value),
        Err(e) => {
            warn!("Stored value for key={key} is not valid JSON: {e}");
            None
        }
    }
}

impl Database {
    /// Fresh in-memory database.
    pub fn memory() -> Arc<Self> {
        Arc::new(Database::Memory(MemoryStore::new()))
    }

    /// Open the configured storage backend.
    pub async fn connect(config: &StorageConfig) -> KeybeatResult<Arc<Self>> {
        match config.backend.as_str() {
            "memory" => Ok(Self::memory()),
            #[cfg(feature = "sqlite")]
            "sqlite" => {
                let pool = SqlitePool::connect(&config.sqlite_url).await.map_err(|e| {
                    error!("Failed to connect to SQLite: {e}");
                    KeybeatError::StorageError(format!("failed to connect to SQLite: {e}"))
                })?;

                Ok(Arc::new(Database::SQLite(pool)))
            }
            #[cfg(not(feature = "sqlite"))]
            "sqlite" => Err(KeybeatError::ConfigError(
                "SQLite support not compiled in. Enable the 'sqlite' feature.".to_string(),
            )),
            #[cfg(feature = "postgres")]
            "postgres" => {
                let pool = PgPool::connect(&config.postgres_url).await.map_err(|e| {
                    error!("Failed to connect to PostgreSQL: {e}");
                    KeybeatError::StorageError(format!("failed to connect to PostgreSQL: {e}"))
                })?;

                Ok(Arc::new(Database::Postgres(pool)))
            }
            #[cfg(not(feature = "postgres"))]
            "postgres" => Err(KeybeatError::ConfigError(
                "PostgreSQL support not compiled in. Enable the 'postgres' feature.".to_string(),
            )),
            other => Err(KeybeatError::ConfigError(format!(
                "unsupported storage backend: {other}"
            ))),
        }
    }

    /// Short name of the active backend, for logs.
    pub fn backend_name(&self) -> &'static str {
        match self {
            Database::Memory(_) => "memory",
            #[cfg(feature = "sqlite")]
            Database::SQLite(_) => "sqlite",
            #[cfg(feature = "postgres")]
            Database::Postgres(_) => "postgres",
        }
    }

    /// Create the `kv_store` table if it does not exist yet.
    pub async fn migrate(&self) -> KeybeatResult<()> {
        match self {
            Database::Memory(_) => Ok(()),
            #[cfg(feature = "sqlite")]
            Database::SQLite(pool) => {
                sqlx::query(
                    r#"
                    CREATE TABLE IF NOT EXISTS kv_store (
                        key   TEXT PRIMARY KEY,
                        value TEXT NOT NULL
                    )
                    "#,
                )
                .execute(pool)
                .await
                .map_err(|e| {
                    error!("SQLite migrate failed: {e}");
                    KeybeatError::StorageError(format!("database error: {e}"))
                })?;
                Ok(())
            }
            #[cfg(feature = "postgres")]
            Database::Postgres(pool) => {
                sqlx::query(
                    r#"
                    CREATE TABLE IF NOT EXISTS kv_store (
                        key   TEXT PRIMARY KEY,
                        value TEXT NOT NULL
                    )
                    "#,
                )
                .execute(pool)
                .await
                .map_err(|e| {
                    error!("Postgres migrate failed: {e}");
                    KeybeatError::StorageError(format!("database error: {e}"))
                })?;
                Ok(())
            }
        }
    }

    /// Fetch the value stored under `key`, if any.
    pub async fn get(&self, key: &str) -> KeybeatResult<Option<Value>> {
        match self {
            Database::Memory(store) => store.get(key),
            #[cfg(feature = "sqlite")]
            Database::SQLite(pool) => {
                let raw: Option<String> =
                    query_scalar("SELECT value FROM kv_store WHERE key = ?")
                        .bind(key)
                        .fetch_optional(pool)
                        .await
                        .map_err(|e| {
                            error!("SQLite get failed for key={key}: {e}");
                            KeybeatError::StorageError(format!("database error: {e}"))
                        })?;
                Ok(decode_stored(key, raw))
            }
            #[cfg(feature = "postgres")]
            Database::Postgres(pool) => {
                let raw: Option<String> =
                    query_scalar("SELECT value FROM kv_store WHERE key = $1")
                        .bind(key)
                        .fetch_optional(pool)
                        .await
                        .map_err(|e| {
                            error!("Postgres get failed for key={key}: {e}");
                            KeybeatError::StorageError(format!("database error: {e}"))
                        })?;
                Ok(decode_stored(key, raw))
            }
        }
    }

    /// Store `value` under `key`, replacing whatever was there.
    pub async fn set(&self, key: &str, value: &Value) -> KeybeatResult<()> {
        match self {
            Database::Memory(store) => store.set(key, value),
            #[cfg(feature = "sqlite")]
            Database::SQLite(pool) => {
                let raw = serde_json::to_string(value)?;
                sqlx::query(
                    r#"
                    INSERT INTO kv_store (key, value)
                    VALUES (?, ?)
                    ON CONFLICT(key) DO UPDATE SET value = excluded.value
                    "#,
                )
                .bind(key)
                .bind(raw)
                .execute(pool)
                .await
                .map_err(|e| {
                    error!("SQLite set failed for key={key}: {e}");
                    KeybeatError::StorageError(format!("database error: {e}"))
                })?;
                Ok(())
            }
            #[cfg(feature = "postgres")]
            Database::Postgres(pool) => {
                let raw = serde_json::to_string(value)?;
                sqlx::query(
                    r#"
                    INSERT INTO kv_store (key, value)
                    VALUES ($1, $2)
                    ON CONFLICT (key) DO UPDATE SET value = EXCLUDED.value
                    "#,
                )
                .bind(key)
                .bind(raw)
                .execute(pool)
                .await
                .map_err(|e| {
                    error!("Postgres set failed for key={key}: {e}");
                    KeybeatError::StorageError(format!("database error: {e}"))
                })?;
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn memory_get_missing_is_none() {
        let db = Database::memory();
        assert_eq!(db.get("licenses").await.unwrap(), None);
    }

    #[tokio::test]
    async fn memory_set_overwrites() {
        let db = Database::memory();
        db.set("k", &json!({"a": 1})).await.unwrap();
        db.set("k", &json!({"b": 2})).await.unwrap();
        assert_eq!(db.get("k").await.unwrap(), Some(json!({"b": 2})));
        assert_eq!(db.backend_name(), "memory");
    }

    #[cfg(feature = "sqlite")]
    #[tokio::test]
    async fn sqlite_round_trips_and_heals_garbage() {
        let pool = sqlx::sqlite::SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        let db = Database::SQLite(pool.clone());
        db.migrate().await.unwrap();

        db.set("heartbeats", &json!({"u": {"key": "K", "last": 1, "meta": null}}))
            .await
            .unwrap();
        assert_eq!(
            db.get("heartbeats").await.unwrap(),
            Some(json!({"u": {"key": "K", "last": 1, "meta": null}}))
        );

        sqlx::query("INSERT INTO kv_store (key, value) VALUES ('licenses', 'not json')")
            .execute(&pool)
            .await
            .unwrap();
        assert_eq!(db.get("licenses").await.unwrap(), None);
    }
}
