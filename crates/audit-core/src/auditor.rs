//! Per-unit-of-work audit collector
//!
//! An [`Auditor`] is created for one request (or job, or transaction), bound
//! to the actor performing it. Records accumulate in call order and reach
//! storage only when [`Auditor::flush`] runs.
//!
//! Flushing empties the buffer *before* handing records to storage. A failed
//! write therefore loses those records from the auditor's point of view;
//! durability comes from pairing the flush with a database transaction (see
//! [`with_auditable_transaction`](crate::with_auditable_transaction)).

use std::marker::PhantomData;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::{debug, trace};
use uuid::Uuid;

use crate::action::{split_action, AuditAction, UntypedAction};
use crate::error::AuditResult;
use crate::record::{
    current_timestamp, AuditActor, AuditMetadata, AuditOptions, AuditRecord, RawAuditRecord,
};
use crate::storage::AuditStorage;

/// Produces record ids
pub type IdGenerator = Arc<dyn Fn() -> String + Send + Sync>;

struct AuditorState<T> {
    records: Vec<AuditRecord>,
    metadata: AuditMetadata,
    transaction: Option<T>,
}

/// Collects audit records for one unit of work and flushes them to storage
pub struct Auditor<S: AuditStorage, A: AuditAction = UntypedAction> {
    actor: AuditActor,
    storage: Arc<S>,
    id_generator: IdGenerator,
    state: Mutex<AuditorState<S::Transaction>>,
    _action: PhantomData<fn(A)>,
}

impl<S: AuditStorage> Auditor<S> {
    /// Auditor accepting [`UntypedAction`]s, with default id generation
    pub fn new(storage: Arc<S>, actor: AuditActor) -> Self {
        Self::builder(storage).actor(actor).build()
    }

    pub fn builder(storage: Arc<S>) -> AuditorBuilder<S> {
        AuditorBuilder {
            storage,
            actor: AuditActor::default(),
            metadata: AuditMetadata::new(),
            id_generator: None,
        }
    }
}

impl<S: AuditStorage, A: AuditAction> Auditor<S, A> {
    /// Buffer a typed action
    ///
    /// The payload is stored exactly as the action serializes it. Returns the
    /// generated record id.
    pub fn audit(&self, action: A, options: AuditOptions) -> AuditResult<String> {
        let (audit_type, payload) = split_action(&action)?;

        let mut state = self.state();
        let record = AuditRecord {
            id: (self.id_generator)(),
            audit_type,
            operation: options.operation.unwrap_or_default(),
            table: options.table,
            entity_id: options.entity_id,
            old_values: options.old_values,
            new_values: options.new_values,
            payload,
            timestamp: current_timestamp(),
            actor: self.record_actor(),
            metadata: (!state.metadata.is_empty()).then(|| state.metadata.clone()),
        };

        Ok(Self::push(&mut state, record))
    }

    /// Buffer a record with caller-controlled contents
    ///
    /// Call-site metadata wins over the auditor's base metadata on key
    /// collisions. Returns the generated record id.
    pub fn record(&self, raw: RawAuditRecord) -> String {
        let mut state = self.state();

        let mut metadata = state.metadata.clone();
        if let Some(extra) = raw.metadata {
            metadata.extend(extra);
        }

        let record = AuditRecord {
            id: (self.id_generator)(),
            audit_type: raw.audit_type,
            operation: raw.operation.unwrap_or_default(),
            table: raw.table,
            entity_id: raw.entity_id,
            old_values: raw.old_values,
            new_values: raw.new_values,
            payload: raw.payload,
            timestamp: current_timestamp(),
            actor: self.record_actor(),
            metadata: (!metadata.is_empty()).then_some(metadata),
        };

        Self::push(&mut state, record)
    }

    /// Snapshot of the buffered records
    pub fn records(&self) -> Vec<AuditRecord> {
        self.state().records.clone()
    }

    pub fn len(&self) -> usize {
        self.state().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state().records.is_empty()
    }

    /// Hand every buffered record to storage
    ///
    /// Writes through `trx` if given, else through the registered
    /// transaction, else through the storage's own connection. An empty
    /// buffer never reaches storage.
    pub async fn flush(&self, trx: Option<S::Transaction>) -> AuditResult<()> {
        let (records, registered) = {
            let mut state = self.state();
            if state.records.is_empty() {
                return Ok(());
            }
            (std::mem::take(&mut state.records), state.transaction.clone())
        };

        let trx = trx.or(registered);

        debug!(
            count = records.len(),
            in_transaction = trx.is_some(),
            "Flushing audit records"
        );

        self.storage.write(records, trx.as_ref()).await
    }

    /// Drop the buffer without writing
    pub fn clear(&self) {
        let mut state = self.state();
        if !state.records.is_empty() {
            debug!(count = state.records.len(), "Discarding buffered audit records");
        }
        state.records.clear();
    }

    /// Merge `patch` into the base metadata of records created from now on
    pub fn add_metadata(&self, patch: AuditMetadata) {
        self.state().metadata.extend(patch);
    }

    pub fn metadata(&self) -> AuditMetadata {
        self.state().metadata.clone()
    }

    /// Register the transaction a bare `flush(None)` writes through
    pub fn set_transaction(&self, trx: Option<S::Transaction>) {
        self.state().transaction = trx;
    }

    pub fn transaction(&self) -> Option<S::Transaction> {
        self.state().transaction.clone()
    }

    pub fn actor(&self) -> &AuditActor {
        &self.actor
    }

    pub fn storage(&self) -> &Arc<S> {
        &self.storage
    }

    /// Forget records buffered after position `mark`
    pub(crate) fn truncate(&self, mark: usize) {
        self.state().records.truncate(mark);
    }

    fn record_actor(&self) -> Option<AuditActor> {
        (!self.actor.is_empty()).then(|| self.actor.clone())
    }

    fn push(state: &mut AuditorState<S::Transaction>, record: AuditRecord) -> String {
        trace!(id = %record.id, audit_type = %record.audit_type, "Buffered audit record");
        let id = record.id.clone();
        state.records.push(record);
        id
    }

    fn state(&self) -> MutexGuard<'_, AuditorState<S::Transaction>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<S: AuditStorage, A: AuditAction> std::fmt::Debug for Auditor<S, A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Auditor")
            .field("actor", &self.actor)
            .field("buffered", &self.len())
            .finish_non_exhaustive()
    }
}

/// Builder for [`Auditor`]
pub struct AuditorBuilder<S: AuditStorage> {
    storage: Arc<S>,
    actor: AuditActor,
    metadata: AuditMetadata,
    id_generator: Option<IdGenerator>,
}

impl<S: AuditStorage> AuditorBuilder<S> {
    pub fn actor(mut self, actor: AuditActor) -> Self {
        self.actor = actor;
        self
    }

    /// Initial base metadata
    pub fn metadata(mut self, metadata: AuditMetadata) -> Self {
        self.metadata = metadata;
        self
    }

    /// Replace the default UUID v4 id generator
    pub fn id_generator(mut self, generator: impl Fn() -> String + Send + Sync + 'static) -> Self {
        self.id_generator = Some(Arc::new(generator));
        self
    }

    pub fn build<A: AuditAction>(self) -> Auditor<S, A> {
        Auditor {
            actor: self.actor,
            storage: self.storage,
            id_generator: self
                .id_generator
                .unwrap_or_else(|| Arc::new(|| Uuid::new_v4().to_string())),
            state: Mutex::new(AuditorState {
                records: Vec::new(),
                metadata: self.metadata,
                transaction: None,
            }),
            _action: PhantomData,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::error::AuditError;
    use crate::record::{AuditOperation, EntityId};
    use async_trait::async_trait;
    use serde::Serialize;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Storage double that remembers every write and the transaction used
    #[derive(Default)]
    struct RecordingStorage {
        writes: Mutex<Vec<(Vec<AuditRecord>, Option<String>)>>,
        fail: bool,
    }

    impl RecordingStorage {
        fn failing() -> Self {
            Self {
                fail: true,
                ..Default::default()
            }
        }

        fn writes(&self) -> Vec<(Vec<AuditRecord>, Option<String>)> {
            self.writes.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl AuditStorage for RecordingStorage {
        type Transaction = String;

        async fn write(&self, records: Vec<AuditRecord>, trx: Option<&String>) -> AuditResult<()> {
            if self.fail {
                return Err(AuditError::backend(std::io::Error::new(
                    std::io::ErrorKind::BrokenPipe,
                    "connection lost",
                )));
            }
            self.writes.lock().unwrap().push((records, trx.cloned()));
            Ok(())
        }
    }

    #[derive(Serialize)]
    #[serde(tag = "type", content = "payload")]
    enum AppAction {
        #[serde(rename = "user.created")]
        UserCreated { user_id: u64, email: String },
        #[serde(rename = "user.deleted")]
        UserDeleted { user_id: u64 },
    }

    impl AuditAction for AppAction {}

    fn meta(pairs: &[(&str, serde_json::Value)]) -> AuditMetadata {
        pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
    }

    fn typed_auditor(storage: Arc<RecordingStorage>) -> Auditor<RecordingStorage, AppAction> {
        Auditor::builder(storage)
            .actor(AuditActor::new("user-123", "user"))
            .build()
    }

    #[tokio::test]
    async fn test_audit_builds_custom_record() {
        let storage = Arc::new(RecordingStorage::default());
        let auditor = typed_auditor(storage.clone());

        auditor
            .audit(
                AppAction::UserCreated {
                    user_id: 1,
                    email: "a@b.com".into(),
                },
                AuditOptions::default(),
            )
            .unwrap();
        auditor.flush(None).await.unwrap();

        let writes = storage.writes();
        assert_eq!(writes.len(), 1);
        let record = &writes[0].0[0];
        assert_eq!(record.audit_type, "user.created");
        assert_eq!(record.operation, AuditOperation::Custom);
        assert_eq!(record.actor_id(), Some("user-123"));
        assert_eq!(record.payload, Some(json!({"user_id": 1, "email": "a@b.com"})));
        assert!(record.metadata.is_none());
    }

    #[tokio::test]
    async fn test_audit_options_are_applied() {
        let auditor = typed_auditor(Arc::new(RecordingStorage::default()));

        auditor
            .audit(
                AppAction::UserDeleted { user_id: 9 },
                AuditOptions::new()
                    .operation(AuditOperation::Delete)
                    .table("users")
                    .entity_id("9")
                    .old_values(json!({"name": "gone"})),
            )
            .unwrap();

        let record = &auditor.records()[0];
        assert_eq!(record.operation, AuditOperation::Delete);
        assert_eq!(record.table.as_deref(), Some("users"));
        assert_eq!(record.entity_id, Some(EntityId::from("9")));
        assert_eq!(record.old_values, Some(json!({"name": "gone"})));
    }

    #[tokio::test]
    async fn test_records_preserve_call_order() {
        let storage = Arc::new(RecordingStorage::default());
        let auditor = Auditor::new(storage.clone(), AuditActor::new("u", "user"));

        let mut expected = Vec::new();
        for i in 0..20 {
            let id = if i % 2 == 0 {
                auditor
                    .audit(UntypedAction::new(format!("step.{i}"), json!(i)), AuditOptions::default())
                    .unwrap()
            } else {
                auditor.record(RawAuditRecord::new(format!("step.{i}")))
            };
            expected.push(id);
        }

        let buffered: Vec<String> = auditor.records().into_iter().map(|r| r.id).collect();
        assert_eq!(buffered, expected);

        auditor.flush(None).await.unwrap();
        let written: Vec<String> = storage.writes()[0].0.iter().map(|r| r.id.clone()).collect();
        assert_eq!(written, expected);

        let stamps: Vec<_> = storage.writes()[0].0.iter().map(|r| r.timestamp).collect();
        assert!(stamps.windows(2).all(|w| w[0] <= w[1]));
    }

    #[tokio::test]
    async fn test_empty_flush_never_writes() {
        let storage = Arc::new(RecordingStorage::failing());
        let auditor = Auditor::new(storage.clone(), AuditActor::default());

        // A failing storage proves write was never reached.
        auditor.flush(None).await.unwrap();
        auditor.flush(Some("trx".into())).await.unwrap();
    }

    #[tokio::test]
    async fn test_metadata_snapshot_timing() {
        let auditor = Auditor::new(Arc::new(RecordingStorage::default()), AuditActor::default());

        auditor.audit(UntypedAction::bare("a"), AuditOptions::default()).unwrap();
        auditor.add_metadata(meta(&[("x", json!(1))]));
        auditor.audit(UntypedAction::bare("b"), AuditOptions::default()).unwrap();

        let records = auditor.records();
        assert!(records[0].metadata.is_none());
        assert_eq!(records[1].metadata.as_ref().unwrap()["x"], json!(1));
    }

    #[tokio::test]
    async fn test_record_metadata_overrides_base() {
        let auditor: Auditor<RecordingStorage> = Auditor::builder(Arc::new(RecordingStorage::default()))
            .metadata(meta(&[("requestId", json!("base")), ("ip", json!("10.0.0.1"))]))
            .build();

        auditor.record(RawAuditRecord::new("custom.thing").metadata(meta(&[("requestId", json!("call"))])));

        let metadata = auditor.records()[0].metadata.clone().unwrap();
        assert_eq!(metadata["requestId"], json!("call"));
        assert_eq!(metadata["ip"], json!("10.0.0.1"));
        assert_eq!(auditor.metadata()["requestId"], json!("base"));
    }

    #[tokio::test]
    async fn test_records_returns_a_copy() {
        let auditor = Auditor::new(Arc::new(RecordingStorage::default()), AuditActor::default());
        auditor.record(RawAuditRecord::new("a"));

        let mut copy = auditor.records();
        copy[0].audit_type = "tampered".into();
        copy.clear();

        assert_eq!(auditor.records()[0].audit_type, "a");
    }

    #[tokio::test]
    async fn test_failed_flush_does_not_restore_buffer() {
        let auditor = Auditor::new(Arc::new(RecordingStorage::failing()), AuditActor::default());
        auditor.record(RawAuditRecord::new("a"));

        let err = auditor.flush(None).await.unwrap_err();
        assert_eq!(err.to_string(), "connection lost");
        assert!(auditor.is_empty());
    }

    #[tokio::test]
    async fn test_flush_transaction_precedence() {
        let storage = Arc::new(RecordingStorage::default());
        let auditor = Auditor::new(storage.clone(), AuditActor::default());

        auditor.record(RawAuditRecord::new("a"));
        auditor.flush(None).await.unwrap();

        auditor.set_transaction(Some("registered".into()));
        assert_eq!(auditor.transaction().as_deref(), Some("registered"));

        auditor.record(RawAuditRecord::new("b"));
        auditor.flush(None).await.unwrap();

        auditor.record(RawAuditRecord::new("c"));
        auditor.flush(Some("explicit".into())).await.unwrap();

        let used: Vec<Option<String>> = storage.writes().into_iter().map(|(_, t)| t).collect();
        assert_eq!(
            used,
            vec![None, Some("registered".to_string()), Some("explicit".to_string())]
        );
    }

    #[tokio::test]
    async fn test_clear_discards_without_writing() {
        let storage = Arc::new(RecordingStorage::default());
        let auditor = Auditor::new(storage.clone(), AuditActor::default());

        auditor.record(RawAuditRecord::new("a"));
        auditor.clear();
        auditor.flush(None).await.unwrap();

        assert!(storage.writes().is_empty());
    }

    #[tokio::test]
    async fn test_injected_id_generator() {
        let counter = Arc::new(AtomicUsize::new(0));
        let c = counter.clone();
        let auditor: Auditor<RecordingStorage> = Auditor::builder(Arc::new(RecordingStorage::default()))
            .id_generator(move || format!("audit-{}", c.fetch_add(1, Ordering::SeqCst)))
            .build();

        assert_eq!(auditor.record(RawAuditRecord::new("a")), "audit-0");
        assert_eq!(auditor.record(RawAuditRecord::new("b")), "audit-1");
        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_default_ids_are_unique() {
        let auditor = Auditor::new(Arc::new(RecordingStorage::default()), AuditActor::default());
        let a = auditor.record(RawAuditRecord::new("a"));
        let b = auditor.record(RawAuditRecord::new("a"));
        assert_ne!(a, b);
        assert!(Uuid::parse_str(&a).is_ok());
    }

    #[test]
    fn test_empty_actor_is_not_attached() {
        let auditor = Auditor::new(Arc::new(RecordingStorage::default()), AuditActor::default());
        auditor.record(RawAuditRecord::new("system.tick"));
        assert!(auditor.records()[0].actor.is_none());
    }
}
