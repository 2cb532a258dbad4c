//! Cache-backed audit storage
//!
//! [`CacheAuditStorage`] runs on any key/value [`Cache`]: a shared remote cache
//! for small distributed setups, or [`InMemoryCache`] for tests and single
//! process deployments.

mod memory;
mod storage;

pub use memory::InMemoryCache;
pub use storage::{CacheAuditStorage, InMemoryAuditStorage};

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value as JsonValue;

use crate::error::AuditResult;

/// Minimal JSON key/value cache
#[async_trait]
pub trait Cache: Send + Sync {
    /// Value under `key`, or `None` if absent or expired
    async fn get(&self, key: &str) -> AuditResult<Option<JsonValue>>;

    /// Store `value`; `ttl` of `None` keeps it until evicted
    async fn set(&self, key: &str, value: JsonValue, ttl: Option<Duration>) -> AuditResult<()>;

    async fn delete(&self, key: &str) -> AuditResult<()>;
}
