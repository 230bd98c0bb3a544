//! Best-effort audit log on top of the KV store.
//!
//! Writes never fail the caller: errors are logged at `warn` and dropped.

use serde_json::Value;
use std::sync::Arc;
use tracing::warn;

use super::kv::KvStore;

/// Milliseconds since the Unix epoch
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

#[derive(Clone)]
pub struct AuditLog {
    kv: Arc<dyn KvStore>,
}

impl AuditLog {
    pub fn new(kv: Arc<dyn KvStore>) -> Self {
        Self { kv }
    }

    /// Underlying store, for health probes
    pub fn store(&self) -> &Arc<dyn KvStore> {
        &self.kv
    }

    /// Write an entry under `key`, stamping object entries with `timestamp`.
    pub async fn record(&self, key: &str, mut entry: Value) {
        if let Value::Object(map) = &mut entry {
            map.entry("timestamp")
                .or_insert_with(|| Value::from(now_millis()));
        }

        if let Err(e) = self.kv.put(key, &entry.to_string()).await {
            warn!("Audit write failed for {}: {:#}", key, e);
        }
    }

    /// Read an entry back. Missing, unreadable and malformed entries are all `None`.
    pub async fn lookup(&self, key: &str) -> Option<Value> {
        match self.kv.get(key).await {
            Ok(Some(raw)) => match serde_json::from_str(&raw) {
                Ok(value) => Some(value),
                Err(e) => {
                    warn!("Audit entry {} is not valid JSON: {}", key, e);
                    None
                }
            },
            Ok(None) => None,
            Err(e) => {
                warn!("Audit read failed for {}: {:#}", key, e);
                None
            }
        }
    }
}
