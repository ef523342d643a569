//! In-process store used by tests and by `COACH_DB_PATH=:memory:` runs.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::conversation::ConversationRecord;
use crate::error::DatabaseError;
use crate::store::traits::{StateStore, conflict, decode, encode};

/// Records are kept as serialized JSON next to their version, the same shape
/// the libSQL backend stores, so decode failures behave identically.
#[derive(Default)]
pub struct MemoryStore {
    records: RwLock<HashMap<String, (u64, String)>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a raw payload as-is, bypassing the version check.
    pub async fn insert_raw(&self, user_key: &str, raw: impl Into<String>) {
        let mut records = self.records.write().await;
        let version = records.get(user_key).map(|(v, _)| v + 1).unwrap_or(1);
        records.insert(user_key.to_string(), (version, raw.into()));
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }
}

#[async_trait]
impl StateStore for MemoryStore {
    async fn get(&self, user_key: &str) -> Result<Option<ConversationRecord>, DatabaseError> {
        let records = self.records.read().await;
        match records.get(user_key) {
            Some((version, raw)) => decode(user_key, raw, *version).map(Some),
            None => Ok(None),
        }
    }

    async fn set(&self, record: &ConversationRecord) -> Result<u64, DatabaseError> {
        let mut records = self.records.write().await;
        let stored = records.get(&record.user_key).map(|(v, _)| *v);
        let next = match (stored, record.version) {
            (None, 0) => 1,
            (Some(current), expected) if expected != 0 && current == expected => current + 1,
            _ => return Err(conflict(record)),
        };
        let raw = encode(record, next)?;
        records.insert(record.user_key.clone(), (next, raw));
        Ok(next)
    }

    async fn delete(&self, user_key: &str) -> Result<bool, DatabaseError> {
        Ok(self.records.write().await.remove(user_key).is_some())
    }
}
