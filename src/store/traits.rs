//! The `StateStore` trait shared by every backend.

use async_trait::async_trait;

use crate::conversation::ConversationRecord;
use crate::error::DatabaseError;

/// Durable, keyed storage holding at most one record per user.
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Load the record for `user_key`.
    ///
    /// The returned record's `version` is the stored one. A payload that no
    /// longer decodes is reported as `DatabaseError::Corrupted`.
    async fn get(&self, user_key: &str) -> Result<Option<ConversationRecord>, DatabaseError>;

    /// Conditionally write `record` and return its new version.
    ///
    /// Version 0 inserts only if the key is absent. Any other version
    /// overwrites only if the stored version still matches. Otherwise the
    /// write fails with `DatabaseError::Conflict`.
    async fn set(&self, record: &ConversationRecord) -> Result<u64, DatabaseError>;

    /// Remove the record. Returns whether one existed.
    async fn delete(&self, user_key: &str) -> Result<bool, DatabaseError>;
}

pub(crate) fn encode(record: &ConversationRecord, version: u64) -> Result<String, DatabaseError> {
    let mut value =
        serde_json::to_value(record).map_err(|e| DatabaseError::Serialization(e.to_string()))?;
    value["version"] = serde_json::Value::from(version);
    serde_json::to_string(&value).map_err(|e| DatabaseError::Serialization(e.to_string()))
}

pub(crate) fn decode(
    user_key: &str,
    raw: &str,
    version: u64,
) -> Result<ConversationRecord, DatabaseError> {
    let mut record: ConversationRecord =
        serde_json::from_str(raw).map_err(|e| DatabaseError::Corrupted {
            key: user_key.to_string(),
            reason: e.to_string(),
        })?;
    record.version = version;
    Ok(record)
}

pub(crate) fn conflict(record: &ConversationRecord) -> DatabaseError {
    DatabaseError::Conflict {
        key: record.user_key.clone(),
        expected: record.version,
    }
}
