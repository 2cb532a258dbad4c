//! Shared setup for SQLite integration tests
//!
//! Every test gets its own in-memory database on a single pooled connection.
//! While a transaction is open it owns that connection, so tests must not
//! read through the pool until it has committed or rolled back.

#![allow(dead_code)]

use std::sync::Arc;

use audit_common::config::{AuditConfig, IdStrategy};
use audit_sql::SqliteAuditStorage;

pub async fn sqlite_storage() -> Arc<SqliteAuditStorage> {
    sqlite_storage_with(IdStrategy::Generated).await
}

pub async fn sqlite_storage_with(id_strategy: IdStrategy) -> Arc<SqliteAuditStorage> {
    let mut config = AuditConfig::default();
    config.database.max_connections = 1;
    config.storage.id_strategy = id_strategy;

    Arc::new(
        SqliteAuditStorage::connect(&config)
            .await
            .expect("Failed to open in-memory audit database"),
    )
}

/// Domain table the transactional tests write alongside audit records
pub async fn create_users_table(storage: &SqliteAuditStorage) {
    sqlx::query("CREATE TABLE users (id TEXT PRIMARY KEY, email TEXT NOT NULL)")
        .execute(storage.pool())
        .await
        .expect("Failed to create users table");
}

pub async fn user_count(storage: &SqliteAuditStorage) -> i64 {
    sqlx::query_scalar("SELECT COUNT(*) FROM users")
        .fetch_one(storage.pool())
        .await
        .expect("Failed to count users")
}
