//! Storage contracts
//!
//! Every backend implements [`AuditStorage`]. Reading back and joining a
//! caller's transaction are separate capabilities ([`QueryableStorage`],
//! [`TransactionalStorage`]) so a write-only sink stays a few lines long.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{AuditError, AuditResult};
use crate::record::{AuditRecord, EntityId};

/// Persistence target for flushed audit records
#[async_trait]
pub trait AuditStorage: Send + Sync {
    /// Handle to an open transaction; `()` for backends without transactions
    type Transaction: Clone + Send + Sync + 'static;

    /// Persist `records` in order
    ///
    /// Must not touch the backend when `records` is empty. When `trx` is
    /// given the write goes through it and no nested transaction is opened.
    async fn write(
        &self,
        records: Vec<AuditRecord>,
        trx: Option<&Self::Transaction>,
    ) -> AuditResult<()>;

    /// Capability probe for reading records back
    fn queryable(&self) -> Option<&dyn QueryableStorage> {
        None
    }
}

/// Backends that can answer filtered, ordered, paginated reads
#[async_trait]
pub trait QueryableStorage: Send + Sync {
    async fn query(&self, options: &QueryOptions) -> AuditResult<Vec<AuditRecord>>;

    async fn count(&self, filter: &AuditFilter) -> AuditResult<u64>;
}

/// Backends that can share a transaction with the caller's domain writes
#[async_trait]
pub trait TransactionalStorage: AuditStorage {
    type Database: Send + Sync;

    /// Underlying connection pool or client
    fn database(&self) -> &Self::Database;

    /// Name of the database service this storage writes through
    fn database_service_name(&self) -> &str;

    async fn begin(&self, options: &TransactionOptions) -> AuditResult<Self::Transaction>;

    async fn commit(&self, trx: Self::Transaction) -> AuditResult<()>;

    async fn rollback(&self, trx: Self::Transaction) -> AuditResult<()>;
}

/// Query through the capability probe, failing fast on write-only storage
pub async fn query_records<S>(storage: &S, options: &QueryOptions) -> AuditResult<Vec<AuditRecord>>
where
    S: AuditStorage + ?Sized,
{
    storage
        .queryable()
        .ok_or(AuditError::Unsupported("query"))?
        .query(options)
        .await
}

/// Count through the capability probe, failing fast on write-only storage
pub async fn count_records<S>(storage: &S, filter: &AuditFilter) -> AuditResult<u64>
where
    S: AuditStorage + ?Sized,
{
    storage
        .queryable()
        .ok_or(AuditError::Unsupported("count"))?
        .count(filter)
        .await
}

/// Match on one audit type or on membership in a set
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TypeFilter {
    One(String),
    Any(Vec<String>),
}

impl TypeFilter {
    pub fn matches(&self, audit_type: &str) -> bool {
        match self {
            Self::One(t) => t == audit_type,
            Self::Any(types) => types.iter().any(|t| t == audit_type),
        }
    }
}

impl From<&str> for TypeFilter {
    fn from(t: &str) -> Self {
        Self::One(t.to_string())
    }
}

impl From<String> for TypeFilter {
    fn from(t: String) -> Self {
        Self::One(t)
    }
}

impl<S: Into<String>> From<Vec<S>> for TypeFilter {
    fn from(types: Vec<S>) -> Self {
        Self::Any(types.into_iter().map(Into::into).collect())
    }
}

/// Conjunctive record filter; unset fields match everything
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AuditFilter {
    pub audit_type: Option<TypeFilter>,
    /// Compared by canonical form, so composite keys match structurally
    pub entity_id: Option<EntityId>,
    pub table: Option<String>,
    pub actor_id: Option<String>,
    /// Inclusive lower bound, millisecond precision
    pub from: Option<DateTime<Utc>>,
    /// Inclusive upper bound, millisecond precision
    pub to: Option<DateTime<Utc>>,
}

impl AuditFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn audit_type(mut self, audit_type: impl Into<TypeFilter>) -> Self {
        self.audit_type = Some(audit_type.into());
        self
    }

    pub fn entity_id(mut self, entity_id: impl Into<EntityId>) -> Self {
        self.entity_id = Some(entity_id.into());
        self
    }

    pub fn table(mut self, table: impl Into<String>) -> Self {
        self.table = Some(table.into());
        self
    }

    pub fn actor_id(mut self, actor_id: impl Into<String>) -> Self {
        self.actor_id = Some(actor_id.into());
        self
    }

    pub fn since(mut self, from: DateTime<Utc>) -> Self {
        self.from = Some(from);
        self
    }

    pub fn until(mut self, to: DateTime<Utc>) -> Self {
        self.to = Some(to);
        self
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderBy {
    #[default]
    Timestamp,
    Type,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderDirection {
    Asc,
    #[default]
    Desc,
}

impl OrderDirection {
    pub fn as_sql(&self) -> &'static str {
        match self {
            Self::Asc => "ASC",
            Self::Desc => "DESC",
        }
    }
}

/// Filter plus ordering and pagination, newest first by default
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryOptions {
    pub filter: AuditFilter,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
    pub order_by: OrderBy,
    pub order_direction: OrderDirection,
}

impl QueryOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn filter(mut self, filter: AuditFilter) -> Self {
        self.filter = filter;
        self
    }

    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: u64) -> Self {
        self.offset = Some(offset);
        self
    }

    pub fn order(mut self, order_by: OrderBy, direction: OrderDirection) -> Self {
        self.order_by = order_by;
        self.order_direction = direction;
        self
    }
}

impl From<AuditFilter> for QueryOptions {
    fn from(filter: AuditFilter) -> Self {
        Self {
            filter,
            ..Default::default()
        }
    }
}

/// Isolation requested for a transaction opened by the auditable wrapper
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IsolationLevel {
    ReadUncommitted,
    ReadCommitted,
    RepeatableRead,
    Serializable,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransactionOptions {
    /// `None` uses the backend's default
    pub isolation_level: Option<IsolationLevel>,
}

impl TransactionOptions {
    pub fn isolation(level: IsolationLevel) -> Self {
        Self {
            isolation_level: Some(level),
        }
    }
}
