//! Shareable handle to an open SQLite transaction

use std::sync::Arc;

use audit_core::{AuditError, AuditResult};
use sqlx::{Sqlite, SqliteConnection, Transaction};
use tokio::sync::{MappedMutexGuard, Mutex, MutexGuard};

/// Cloneable handle to one `sqlx` transaction
///
/// The auditor, the transactional wrapper and the caller's unit of work each
/// hold a clone. Domain writes go through [`SqliteTransaction::connection`];
/// commit and rollback consume the transaction for every clone at once.
/// Dropping the last clone of an unfinished transaction rolls it back.
#[derive(Clone)]
pub struct SqliteTransaction {
    inner: Arc<Mutex<Option<Transaction<'static, Sqlite>>>>,
}

impl SqliteTransaction {
    pub(crate) fn new(tx: Transaction<'static, Sqlite>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Some(tx))),
        }
    }

    /// Exclusive access to the transaction's connection
    ///
    /// Hold the guard only for the statements that need it: other clones
    /// (including the audit flush) wait on it.
    pub async fn connection(&self) -> AuditResult<MappedMutexGuard<'_, SqliteConnection>> {
        let guard = self.inner.lock().await;
        MutexGuard::try_map(guard, |slot| slot.as_mut().map(|tx| &mut **tx))
            .map_err(|_| AuditError::TransactionClosed)
    }

    /// Whether commit or rollback has not happened yet
    pub async fn is_open(&self) -> bool {
        self.inner.lock().await.is_some()
    }

    pub(crate) async fn commit(&self) -> AuditResult<()> {
        self.take().await?.commit().await.map_err(AuditError::backend)
    }

    pub(crate) async fn rollback(&self) -> AuditResult<()> {
        self.take().await?.rollback().await.map_err(AuditError::backend)
    }

    async fn take(&self) -> AuditResult<Transaction<'static, Sqlite>> {
        self.inner
            .lock()
            .await
            .take()
            .ok_or(AuditError::TransactionClosed)
    }
}

impl std::fmt::Debug for SqliteTransaction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteTransaction")
            .field("shared_handles", &Arc::strong_count(&self.inner))
            .finish_non_exhaustive()
    }
}
