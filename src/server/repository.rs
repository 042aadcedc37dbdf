//! Typed access to the two mappings kept in the key-value store.
//!
//! Each load reads the whole mapping and each save writes the whole mapping
//! back. There is no locking between requests: two concurrent writers to the
//! same mapping race and the later full write wins.

use std::sync::Arc;

use serde_json::{Map, Value};

use crate::errors::KeybeatResult;
use crate::models::{HEARTBEATS_KEY, LICENSES_KEY};
use crate::server::database::Database;
use crate::server::logging::{log_license_event, LicenseEvent};

/// License key → license record, kept as stored.
///
/// Entries are never reshaped on load, so a record written by another
/// writer (for example with a string `expires`) still counts as issued and
/// survives the next save.
pub type Licenses = Map<String, Value>;

/// User → most recent heartbeat, kept as stored.
pub type Heartbeats = Map<String, Value>;

/// Storage-backed repository for licenses and heartbeats.
#[derive(Debug, Clone)]
pub struct Repository {
    db: Arc<Database>,
}

impl Repository {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    pub fn database(&self) -> &Arc<Database> {
        &self.db
    }

    pub async fn load_licenses(&self) -> KeybeatResult<Licenses> {
        self.load_map(LICENSES_KEY).await
    }

    pub async fn save_licenses(&self, licenses: &Licenses) -> KeybeatResult<()> {
        self.save_map(LICENSES_KEY, licenses).await
    }

    pub async fn load_heartbeats(&self) -> KeybeatResult<Heartbeats> {
        self.load_map(HEARTBEATS_KEY).await
    }

    pub async fn save_heartbeats(&self, heartbeats: &Heartbeats) -> KeybeatResult<()> {
        self.save_map(HEARTBEATS_KEY, heartbeats).await
    }

    /// Read one mapping, healing it to `{}` in storage when it is missing
    /// or not an object.
    async fn load_map(&self, key: &str) -> KeybeatResult<Map<String, Value>> {
        match self.db.get(key).await? {
            Some(Value::Object(entries)) => Ok(entries),
            other => {
                let found = match other {
                    None => "absent",
                    Some(_) => "not an object",
                };
                log_license_event(LicenseEvent::StorageHealed, key, Some(found));
                self.db.set(key, &Value::Object(Map::new())).await?;
                Ok(Map::new())
            }
        }
    }

    async fn save_map(&self, key: &str, map: &Map<String, Value>) -> KeybeatResult<()> {
        self.db.set(key, &Value::Object(map.clone())).await
    }
}
