//! Error types for the audit trail

use thiserror::Error;

/// Result type alias for audit operations
pub type AuditResult<T> = std::result::Result<T, AuditError>;

/// Errors surfaced by auditors and storage backends
///
/// Nothing in this crate retries or swallows these; they reach the caller of
/// `flush`, `write`, `query` or `count` as-is.
#[derive(Error, Debug)]
pub enum AuditError {
    /// JSON encoding or decoding failed (malformed stored column, bad payload)
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// An action value did not serialize to `{"type": ..., "payload": ...}`
    #[error("Invalid audit action: {0}")]
    InvalidAction(String),

    /// A stored row could not be mapped back to a record
    #[error("Invalid audit record: {0}")]
    InvalidRecord(String),

    /// The backend does not implement an optional capability
    #[error("Audit storage does not support '{0}'")]
    Unsupported(&'static str),

    /// A transaction handle was used after commit or rollback
    #[error("Transaction is no longer active")]
    TransactionClosed,

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Cache error: {0}")]
    Cache(String),

    /// A write-only sink rejected the batch
    #[error("Audit sink responded with status {status}: {body}")]
    Sink { status: u16, body: String },

    /// Error raised by the underlying driver or client, passed through unchanged
    #[error(transparent)]
    Backend(Box<dyn std::error::Error + Send + Sync>),
}

impl AuditError {
    /// Wrap a driver error without changing its message
    pub fn backend(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Backend(Box::new(err))
    }

    pub fn invalid_action(msg: impl Into<String>) -> Self {
        Self::InvalidAction(msg.into())
    }

    pub fn invalid_record(msg: impl Into<String>) -> Self {
        Self::InvalidRecord(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn cache(msg: impl Into<String>) -> Self {
        Self::Cache(msg.into())
    }

    /// Borrow the wrapped driver error as a concrete type, if it is one
    pub fn downcast_backend<E: std::error::Error + 'static>(&self) -> Option<&E> {
        match self {
            Self::Backend(inner) => inner.downcast_ref::<E>(),
            _ => None,
        }
    }
}
