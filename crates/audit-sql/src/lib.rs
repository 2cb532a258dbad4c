//! Audit Trail SQL Backend
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! [`SqliteAuditStorage`] persists audit records in a SQLite table through
//! `sqlx`, answers filtered queries in SQL, and joins the caller's
//! transaction so domain writes and their audit records commit together.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use audit_common::config::AuditConfig;
//! use audit_core::{with_auditable_transaction, AuditActor, AuditOptions, Auditor, AuditError,
//!     TransactionOptions, UntypedAction};
//! use audit_sql::SqliteAuditStorage;
//!
//! # async fn run() -> Result<(), AuditError> {
//! let storage = Arc::new(SqliteAuditStorage::connect(&AuditConfig::default()).await?);
//! let auditor = Auditor::new(storage, AuditActor::new("admin-1", "admin"));
//! let auditor = &auditor;
//!
//! with_auditable_transaction(auditor, TransactionOptions::default(), |trx| async move {
//!     let mut conn = trx.connection().await?;
//!     sqlx::query("UPDATE users SET active = 0 WHERE id = 'user-123'")
//!         .execute(&mut *conn)
//!         .await
//!         .map_err(AuditError::backend)?;
//!     drop(conn);
//!
//!     auditor.audit(
//!         UntypedAction::bare("user.deactivated"),
//!         AuditOptions::new().table("users").entity_id("user-123"),
//!     )?;
//!     Ok::<_, AuditError>(())
//! })
//! .await?;
//! # Ok(())
//! # }
//! ```

pub mod pool;
pub mod query;
pub mod row;
pub mod schema;
pub mod storage;
pub mod transaction;

pub use pool::create_pool;
pub use row::AuditRow;
pub use schema::ensure_schema;
pub use storage::SqliteAuditStorage;
pub use transaction::SqliteTransaction;
