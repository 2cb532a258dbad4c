//! Audit writes that commit or roll back with the caller's domain writes

use std::future::Future;

use tracing::{debug, warn};

use crate::action::AuditAction;
use crate::auditor::Auditor;
use crate::error::AuditError;
use crate::storage::{TransactionOptions, TransactionalStorage};

/// Run `unit_of_work` inside a transaction and flush the auditor into it
///
/// The callback receives the transaction handle for its own writes and may
/// call `auditor.audit(...)` freely. Buffered records are flushed through the
/// same transaction before it commits, so domain rows and audit rows land or
/// vanish together. When the auditor already has a registered transaction it
/// is reused: nothing new is opened and committing stays with its owner.
///
/// On failure records buffered during the failed unit of work are dropped in
/// both cases, a transaction opened here rolls back, and the original error
/// is returned.
pub async fn with_auditable_transaction<S, A, T, E, F, Fut>(
    auditor: &Auditor<S, A>,
    options: TransactionOptions,
    unit_of_work: F,
) -> Result<T, E>
where
    S: TransactionalStorage,
    A: AuditAction,
    E: From<AuditError>,
    F: FnOnce(S::Transaction) -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let mark = auditor.len();

    if let Some(existing) = auditor.transaction() {
        debug!("Reusing registered transaction for auditable unit of work");
        let outcome = async {
            let value = unit_of_work(existing.clone()).await?;
            auditor.flush(Some(existing)).await?;
            Ok::<T, E>(value)
        }
        .await;

        // The owner decides commit or rollback; only the failed records go.
        if outcome.is_err() {
            auditor.truncate(mark);
        }
        return outcome;
    }

    let storage = auditor.storage().clone();
    let trx = storage.begin(&options).await?;
    auditor.set_transaction(Some(trx.clone()));

    let outcome = async {
        let value = unit_of_work(trx.clone()).await?;
        auditor.flush(Some(trx.clone())).await?;
        Ok::<T, E>(value)
    }
    .await;

    auditor.set_transaction(None);

    match outcome {
        Ok(value) => {
            storage.commit(trx).await?;
            debug!(
                service = storage.database_service_name(),
                "Committed auditable transaction"
            );
            Ok(value)
        },
        Err(err) => {
            auditor.truncate(mark);
            if let Err(rollback_err) = storage.rollback(trx).await {
                warn!(error = %rollback_err, "Rollback of auditable transaction failed");
            }
            debug!(
                service = storage.database_service_name(),
                "Rolled back auditable transaction"
            );
            Err(err)
        },
    }
}
