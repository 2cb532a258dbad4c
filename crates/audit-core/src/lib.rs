//! Audit Trail Core
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Records who did what to which entity, buffers the records per unit of
//! work, and persists them through a pluggable storage backend.
//!
//! - **Records**: [`AuditRecord`] and its building blocks in [`record`]
//! - **Collection**: [`Auditor`] buffers typed or untyped actions for one actor
//! - **Storage**: [`AuditStorage`] plus the optional [`QueryableStorage`] and
//!   [`TransactionalStorage`] capabilities
//! - **Backends**: [`InMemoryAuditStorage`], [`CacheAuditStorage`] over any
//!   [`Cache`], and the write-only [`WebhookAuditStorage`]. The SQL backend
//!   lives in `audit-sql`.
//! - **Atomicity**: [`with_auditable_transaction`] ties a flush to the
//!   caller's database transaction
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use audit_core::{
//!     query_records, AuditActor, AuditFilter, AuditOptions, Auditor, InMemoryAuditStorage,
//!     QueryOptions, UntypedAction,
//! };
//! use serde_json::json;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), audit_core::AuditError> {
//! let storage = Arc::new(InMemoryAuditStorage::in_memory());
//! let auditor = Auditor::new(storage.clone(), AuditActor::new("admin-1", "admin"));
//!
//! auditor.audit(
//!     UntypedAction::new("user.created", json!({"email": "alice@example.com"})),
//!     AuditOptions::new().table("users").entity_id("user-123"),
//! )?;
//! auditor.flush(None).await?;
//!
//! let filter = AuditFilter::new().entity_id("user-123");
//! let found = query_records(storage.as_ref(), &QueryOptions::from(filter)).await?;
//! assert_eq!(found.len(), 1);
//! # Ok(())
//! # }
//! ```

pub mod action;
pub mod auditor;
pub mod cache;
pub mod codec;
pub mod error;
pub mod filter;
pub mod record;
pub mod storage;
pub mod transaction;
pub mod webhook;

pub use action::{AuditAction, UntypedAction};
pub use auditor::{Auditor, AuditorBuilder, IdGenerator};
pub use cache::{Cache, CacheAuditStorage, InMemoryAuditStorage, InMemoryCache};
pub use error::{AuditError, AuditResult};
pub use record::{
    AuditActor, AuditMetadata, AuditOperation, AuditOptions, AuditRecord, EntityId,
    RawAuditRecord,
};
pub use storage::{
    count_records, query_records, AuditFilter, AuditStorage, IsolationLevel, OrderBy,
    OrderDirection, QueryOptions, QueryableStorage, TransactionOptions, TransactionalStorage,
    TypeFilter,
};
pub use transaction::with_auditable_transaction;
pub use webhook::WebhookAuditStorage;
