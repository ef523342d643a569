//! Schema versions for the libSQL backend.
//!
//! Applied versions are recorded in `schema_migrations`; each pending step
//! runs in its own transaction together with its bookkeeping row.

use libsql::Connection;

use crate::error::DatabaseError;

struct Step {
    version: i64,
    name: &'static str,
    sql: &'static str,
}

/// Append only.
const STEPS: &[Step] = &[
    Step {
        version: 1,
        name: "conversation_state",
        sql: "
            CREATE TABLE IF NOT EXISTS conversations (
                user_key   TEXT PRIMARY KEY,
                step       TEXT NOT NULL,
                record     TEXT NOT NULL,
                version    INTEGER NOT NULL,
                updated_at TEXT NOT NULL
            );
        ",
    },
    Step {
        version: 2,
        name: "conversation_step_index",
        sql: "
            CREATE INDEX IF NOT EXISTS idx_conversations_step ON conversations(step);
            CREATE INDEX IF NOT EXISTS idx_conversations_updated ON conversations(updated_at);
        ",
    },
];

/// Bring the schema up to the latest version.
pub async fn migrate(conn: &Connection) -> Result<(), DatabaseError> {
    let fail = |what: &str, e: libsql::Error| DatabaseError::Migration(format!("{what}: {e}"));

    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version    INTEGER PRIMARY KEY,
            name       TEXT NOT NULL,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        )",
        (),
    )
    .await
    .map_err(|e| fail("create schema_migrations", e))?;

    let applied = applied_version(conn).await?;
    let pending: Vec<&Step> = STEPS.iter().filter(|s| s.version > applied).collect();
    if pending.is_empty() {
        tracing::debug!(version = applied, "Schema up to date");
        return Ok(());
    }

    for step in pending {
        tracing::info!(version = step.version, name = step.name, "Applying schema step");
        let tx = conn
            .transaction()
            .await
            .map_err(|e| fail("begin transaction", e))?;
        tx.execute_batch(step.sql)
            .await
            .map_err(|e| fail(&format!("V{} {}", step.version, step.name), e))?;
        tx.execute(
            "INSERT INTO schema_migrations (version, name) VALUES (?1, ?2)",
            libsql::params![step.version, step.name],
        )
        .await
        .map_err(|e| fail(&format!("record V{}", step.version), e))?;
        tx.commit()
            .await
            .map_err(|e| fail(&format!("commit V{}", step.version), e))?;
    }
    Ok(())
}

/// Highest applied version; 0 on a fresh database.
async fn applied_version(conn: &Connection) -> Result<i64, DatabaseError> {
    let mut rows = conn
        .query("SELECT COALESCE(MAX(version), 0) FROM schema_migrations", ())
        .await
        .map_err(|e| DatabaseError::Migration(e.to_string()))?;
    match rows
        .next()
        .await
        .map_err(|e| DatabaseError::Migration(e.to_string()))?
    {
        Some(row) => row
            .get::<i64>(0)
            .map_err(|e| DatabaseError::Migration(e.to_string())),
        None => Ok(0),
    }
}
