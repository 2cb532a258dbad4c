//! SQLite schema for the audit table

use audit_common::config::is_identifier;
use audit_core::{AuditError, AuditResult};
use sqlx::SqlitePool;
use tracing::debug;

/// Create the audit table and its indexes if they do not exist yet
///
/// `id` defaults to a random hex string so rows inserted without one
/// (database-assigned ids) still get a primary key.
pub async fn ensure_schema(pool: &SqlitePool, table: &str) -> AuditResult<()> {
    if !is_identifier(table) {
        return Err(AuditError::config(format!("invalid audit table name '{table}'")));
    }

    sqlx::query(&format!(
        r#"
        CREATE TABLE IF NOT EXISTS {table} (
            id TEXT PRIMARY KEY NOT NULL DEFAULT (lower(hex(randomblob(16)))),
            type TEXT NOT NULL,
            operation TEXT NOT NULL DEFAULT 'CUSTOM',
            "table" TEXT,
            entity_id TEXT,

            -- JSON text
            old_values TEXT,
            new_values TEXT,
            payload TEXT,

            -- RFC 3339, millisecond precision, UTC
            timestamp TEXT NOT NULL,

            actor_id TEXT,
            actor_type TEXT,
            actor_data TEXT,
            metadata TEXT
        )
        "#
    ))
    .execute(pool)
    .await
    .map_err(AuditError::backend)?;

    for column in ["type", "timestamp", "actor_id", "entity_id"] {
        sqlx::query(&format!(
            "CREATE INDEX IF NOT EXISTS idx_{table}_{column} ON {table}({column})"
        ))
        .execute(pool)
        .await
        .map_err(AuditError::backend)?;
    }

    debug!(table, "Audit schema ready");

    Ok(())
}
