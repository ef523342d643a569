//! libSQL backend for conversation state.
//!
//! Records are stored as JSON documents keyed by `user_key`, with the step
//! and version mirrored into columns. The version column drives the
//! conditional writes.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use libsql::{Connection, Database as LibSqlDatabase, params};
use tracing::{debug, info};

use crate::conversation::ConversationRecord;
use crate::error::DatabaseError;
use crate::store::migrations;
use crate::store::traits::{StateStore, conflict, decode, encode};

/// libSQL database backend.
///
/// Stores a single connection that is reused for all operations.
/// `libsql::Connection` is `Send + Sync` and safe for concurrent async use.
pub struct LibSqlBackend {
    #[allow(dead_code)]
    db: Arc<LibSqlDatabase>,
    conn: Connection,
}

impl LibSqlBackend {
    /// Open (or create) a local database file and run migrations.
    pub async fn new_local(path: &Path) -> Result<Self, DatabaseError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| {
                DatabaseError::Pool(format!("Failed to create database directory: {e}"))
            })?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| DatabaseError::Pool(format!("Failed to open libSQL database: {e}")))?;

        let backend = Self::from_database(db).await?;
        info!(path = %path.display(), "Database opened");
        Ok(backend)
    }

    /// Create an in-memory database.
    pub async fn new_memory() -> Result<Self, DatabaseError> {
        let db = libsql::Builder::new_local(":memory:")
            .build()
            .await
            .map_err(|e| {
                DatabaseError::Pool(format!("Failed to create in-memory database: {e}"))
            })?;
        Self::from_database(db).await
    }

    async fn from_database(db: LibSqlDatabase) -> Result<Self, DatabaseError> {
        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Pool(format!("Failed to create connection: {e}")))?;
        migrations::migrate(&conn).await?;
        Ok(Self {
            db: Arc::new(db),
            conn,
        })
    }

    fn conn(&self) -> &Connection {
        &self.conn
    }
}

fn to_db_version(version: u64) -> Result<i64, DatabaseError> {
    i64::try_from(version)
        .map_err(|_| DatabaseError::Serialization(format!("version {version} out of range")))
}

#[async_trait]
impl StateStore for LibSqlBackend {
    async fn get(&self, user_key: &str) -> Result<Option<ConversationRecord>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                "SELECT record, version FROM conversations WHERE user_key = ?1",
                params![user_key],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("get: {e}")))?;

        let Some(row) = rows
            .next()
            .await
            .map_err(|e| DatabaseError::Query(format!("get: {e}")))?
        else {
            return Ok(None);
        };

        let raw: String = row.get(0).map_err(|e| DatabaseError::Corrupted {
            key: user_key.to_string(),
            reason: e.to_string(),
        })?;
        let version: i64 = row
            .get(1)
            .map_err(|e| DatabaseError::Query(format!("get: {e}")))?;
        let version = u64::try_from(version).map_err(|_| DatabaseError::Corrupted {
            key: user_key.to_string(),
            reason: format!("negative version {version}"),
        })?;

        decode(user_key, &raw, version).map(Some)
    }

    async fn set(&self, record: &ConversationRecord) -> Result<u64, DatabaseError> {
        let next = record.version + 1;
        let raw = encode(record, next)?;
        let now = Utc::now().to_rfc3339();
        let step = record.step.as_str();

        let result = if record.version == 0 {
            self.conn()
                .execute(
                    "INSERT INTO conversations (user_key, step, record, version, updated_at)
                     VALUES (?1, ?2, ?3, ?4, ?5)
                     ON CONFLICT (user_key) DO NOTHING",
                    params![record.user_key.as_str(), step, raw, to_db_version(next)?, now],
                )
                .await
        } else {
            self.conn()
                .execute(
                    "UPDATE conversations
                     SET step = ?2, record = ?3, version = ?4, updated_at = ?5
                     WHERE user_key = ?1 AND version = ?6",
                    params![
                        record.user_key.as_str(),
                        step,
                        raw,
                        to_db_version(next)?,
                        now,
                        to_db_version(record.version)?
                    ],
                )
                .await
        };
        let affected = result.map_err(|e| DatabaseError::Query(format!("set: {e}")))?;

        if affected == 0 {
            debug!(user_key = %record.user_key, expected = record.version, "Stale conversation write rejected");
            return Err(conflict(record));
        }
        Ok(next)
    }

    async fn delete(&self, user_key: &str) -> Result<bool, DatabaseError> {
        let count = self
            .conn()
            .execute(
                "DELETE FROM conversations WHERE user_key = ?1",
                params![user_key],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("delete: {e}")))?;
        Ok(count > 0)
    }
}
