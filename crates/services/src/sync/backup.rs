use std::sync::Arc;

use serde::Serialize;
use serde_json::{Map, Value};

use quiz_core::Clock;
use storage::KeyValueStore;

/// Last-resort copy of a progress payload kept in the key/value store.
///
/// Failures are logged and swallowed: a missing backup must never break the
/// session that tried to write it.
pub struct LocalBackup {
    kv: Arc<dyn KeyValueStore>,
    clock: Clock,
}

impl LocalBackup {
    #[must_use]
    pub fn new(kv: Arc<dyn KeyValueStore>, clock: Clock) -> Self {
        Self { kv, clock }
    }

    /// Store `payload` under `key`, stamped with `timestamp` (epoch millis)
    /// and `synced: false`. Returns whether the write succeeded.
    pub async fn save<T: Serialize + ?Sized>(&self, key: &str, payload: &T) -> bool {
        let mut object = match serde_json::to_value(payload) {
            Ok(Value::Object(map)) => map,
            Ok(other) => {
                let mut map = Map::new();
                map.insert("payload".into(), other);
                map
            }
            Err(err) => {
                tracing::error!(key, error = %err, "progress backup not serialisable");
                return false;
            }
        };
        object.insert("timestamp".into(), Value::from(self.clock.now_millis()));
        object.insert("synced".into(), Value::Bool(false));

        let raw = Value::Object(object).to_string();
        match self.kv.set(key, &raw).await {
            Ok(()) => {
                tracing::debug!(key, "progress backed up locally");
                true
            }
            Err(err) => {
                tracing::error!(key, error = %err, "failed to back up progress");
                false
            }
        }
    }

    /// Read a backup back. Missing, unreadable, and corrupt entries are all
    /// `None`.
    pub async fn restore(&self, key: &str) -> Option<Value> {
        let raw = match self.kv.get(key).await {
            Ok(raw) => raw?,
            Err(err) => {
                tracing::error!(key, error = %err, "failed to read progress backup");
                return None;
            }
        };
        match serde_json::from_str(&raw) {
            Ok(value) => Some(value),
            Err(err) => {
                tracing::warn!(key, error = %err, "discarding corrupt progress backup");
                None
            }
        }
    }
}
