//! Audit storage emulating relational query semantics on a key/value cache
//!
//! Layout: one index key listing record ids in write order, plus one entry
//! per record under `{prefix}:{id}`. Reads resolve the whole index and apply
//! the shared in-memory filter, so results match the SQL backend.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use audit_common::config::CacheConfig;
use tracing::debug;

use super::{Cache, InMemoryCache};
use crate::error::{AuditError, AuditResult};
use crate::filter;
use crate::record::AuditRecord;
use crate::storage::{AuditFilter, AuditStorage, QueryOptions, QueryableStorage};

const INDEX_SUFFIX: &str = "__index__";

/// [`AuditStorage`] on top of any [`Cache`]
pub struct CacheAuditStorage<C: Cache> {
    cache: Arc<C>,
    prefix: String,
    index_key: String,
    ttl: Option<Duration>,
}

/// Zero-dependency storage with full query support, for tests and demos
pub type InMemoryAuditStorage = CacheAuditStorage<InMemoryCache>;

impl<C: Cache> CacheAuditStorage<C> {
    pub fn new(cache: Arc<C>, prefix: impl Into<String>, ttl: Option<Duration>) -> Self {
        let prefix = prefix.into();
        Self {
            index_key: format!("{prefix}:{INDEX_SUFFIX}"),
            cache,
            prefix,
            ttl,
        }
    }

    pub fn from_config(cache: Arc<C>, config: &CacheConfig) -> Self {
        Self::new(cache, config.prefix.clone(), config.ttl_secs.map(Duration::from_secs))
    }

    pub fn cache(&self) -> &Arc<C> {
        &self.cache
    }

    pub fn index_key(&self) -> &str {
        &self.index_key
    }

    pub fn record_key(&self, id: &str) -> String {
        format!("{}:{}", self.prefix, id)
    }

    async fn load_index(&self) -> AuditResult<Vec<String>> {
        match self.cache.get(&self.index_key).await? {
            Some(value) => serde_json::from_value(value).map_err(|e| {
                AuditError::cache(format!("corrupt audit index '{}': {e}", self.index_key))
            }),
            None => Ok(Vec::new()),
        }
    }

    async fn store_index(&self, index: &[String]) -> AuditResult<()> {
        self.cache
            .set(&self.index_key, serde_json::to_value(index)?, self.ttl)
            .await
    }

    /// Every live record in write order
    ///
    /// Ids whose entry has expired are dropped and the index is rewritten
    /// without them.
    async fn load_records(&self) -> AuditResult<Vec<AuditRecord>> {
        let index = self.load_index().await?;
        let mut records = Vec::with_capacity(index.len());
        let mut live = Vec::with_capacity(index.len());

        for id in &index {
            if let Some(value) = self.cache.get(&self.record_key(id)).await? {
                records.push(serde_json::from_value::<AuditRecord>(value)?);
                live.push(id.clone());
            }
        }

        if live.len() != index.len() {
            debug!(
                dropped = index.len() - live.len(),
                remaining = live.len(),
                "Compacting audit index after expired entries"
            );
            self.store_index(&live).await?;
        }

        Ok(records)
    }
}

impl InMemoryAuditStorage {
    /// In-memory storage whose entries live for a year
    pub fn in_memory() -> Self {
        Self::from_config(Arc::new(InMemoryCache::new()), &CacheConfig::default())
    }
}

impl Default for InMemoryAuditStorage {
    fn default() -> Self {
        Self::in_memory()
    }
}

#[async_trait]
impl<C: Cache> AuditStorage for CacheAuditStorage<C> {
    type Transaction = ();

    async fn write(&self, records: Vec<AuditRecord>, _trx: Option<&()>) -> AuditResult<()> {
        if records.is_empty() {
            return Ok(());
        }

        // Read-modify-write of the index is best effort: concurrent writers
        // race and the last one wins. Reads tolerate the gaps.
        let mut index = self.load_index().await?;
        let mut known: HashSet<String> = index.iter().cloned().collect();

        for record in &records {
            let value = serde_json::to_value(record)?;
            self.cache.set(&self.record_key(&record.id), value, self.ttl).await?;
            if known.insert(record.id.clone()) {
                index.push(record.id.clone());
            }
        }

        self.store_index(&index).await?;

        debug!(count = records.len(), indexed = index.len(), "Wrote audit records to cache");

        Ok(())
    }

    fn queryable(&self) -> Option<&dyn QueryableStorage> {
        Some(self)
    }
}

#[async_trait]
impl<C: Cache> QueryableStorage for CacheAuditStorage<C> {
    async fn query(&self, options: &QueryOptions) -> AuditResult<Vec<AuditRecord>> {
        let records = self.load_records().await?;
        Ok(filter::apply_query(records, options))
    }

    async fn count(&self, filter: &AuditFilter) -> AuditResult<u64> {
        let records = self.load_records().await?;
        Ok(filter::count_matching(&records, filter))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::record::{AuditActor, EntityId};
    use crate::storage::{count_records, query_records};
    use serde_json::json;

    fn record(id: &str, audit_type: &str) -> AuditRecord {
        AuditRecord::new(id, audit_type)
    }

    #[tokio::test]
    async fn test_empty_write_touches_nothing() {
        let storage = InMemoryAuditStorage::in_memory();
        storage.write(Vec::new(), None).await.unwrap();
        assert!(storage.cache().is_empty().await);
    }

    #[tokio::test]
    async fn test_write_then_query() {
        let storage = InMemoryAuditStorage::in_memory();
        storage
            .write(vec![record("a", "user.created"), record("b", "user.deleted")], None)
            .await
            .unwrap();

        let index = storage.cache().get(storage.index_key()).await.unwrap();
        assert_eq!(index, Some(json!(["a", "b"])));
        assert!(storage.cache().get("audit:a").await.unwrap().is_some());

        let found = storage
            .query(&QueryOptions::from(AuditFilter::new().audit_type("user.deleted")))
            .await
            .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, "b");
        assert_eq!(storage.count(&AuditFilter::default()).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_rewriting_an_id_does_not_duplicate_index() {
        let storage = InMemoryAuditStorage::in_memory();
        storage.write(vec![record("a", "x")], None).await.unwrap();
        storage.write(vec![record("a", "y")], None).await.unwrap();

        let index = storage.cache().get(storage.index_key()).await.unwrap();
        assert_eq!(index, Some(json!(["a"])));

        let all = storage.query(&QueryOptions::default()).await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].audit_type, "y");
    }

    #[tokio::test]
    async fn test_corrupt_index_is_a_cache_error() {
        let storage = InMemoryAuditStorage::in_memory();
        storage
            .cache()
            .set(storage.index_key(), json!("not a list"), None)
            .await
            .unwrap();

        let err = storage.query(&QueryOptions::default()).await.unwrap_err();
        assert!(matches!(err, AuditError::Cache(ref msg) if msg.contains("audit:__index__")));

        let err = storage.write(vec![record("a", "t")], None).await.unwrap_err();
        assert!(matches!(err, AuditError::Cache(_)));
    }

    #[tokio::test]
    async fn test_expired_records_are_reconciled() {
        let storage = InMemoryAuditStorage::in_memory();
        storage
            .write(vec![record("a", "t"), record("b", "t"), record("c", "t")], None)
            .await
            .unwrap();

        storage.cache().delete(&storage.record_key("b")).await.unwrap();

        assert_eq!(storage.count(&AuditFilter::default()).await.unwrap(), 2);
        let index = storage.cache().get(storage.index_key()).await.unwrap();
        assert_eq!(index, Some(json!(["a", "c"])));
    }

    #[tokio::test(start_paused = true)]
    async fn test_ttl_expiry_drops_records() {
        let storage = CacheAuditStorage::new(
            Arc::new(InMemoryCache::new()),
            "short",
            Some(Duration::from_secs(60)),
        );
        storage.write(vec![record("a", "t")], None).await.unwrap();

        tokio::time::advance(Duration::from_secs(30)).await;
        storage.write(vec![record("b", "t")], None).await.unwrap();

        tokio::time::advance(Duration::from_secs(45)).await;
        let remaining = storage.query(&QueryOptions::default()).await.unwrap();
        let ids: Vec<_> = remaining.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["b"]);
    }

    #[tokio::test]
    async fn test_shapes_survive_the_cache() {
        let storage = InMemoryAuditStorage::in_memory();
        let mut r = record("a", "role.granted");
        r.entity_id = Some(EntityId::composite([("userId", "u1"), ("roleId", "r1")]));
        r.actor = Some(AuditActor::new("admin-1", "admin").with_extra("ip", "10.0.0.1"));
        r.payload = Some(json!({"nested": {"list": [1, 2, 3]}}));
        storage.write(vec![r.clone()], None).await.unwrap();

        let filter = AuditFilter::new().entity_id(EntityId::composite([("roleId", "r1"), ("userId", "u1")]));
        let found = query_records(&storage, &QueryOptions::from(filter)).await.unwrap();
        assert_eq!(found, vec![r]);
    }

    #[tokio::test]
    async fn test_prefix_comes_from_config() {
        let config = CacheConfig {
            prefix: "tenant-a".to_string(),
            ttl_secs: None,
        };
        let storage = CacheAuditStorage::from_config(Arc::new(InMemoryCache::new()), &config);
        storage.write(vec![record("x", "t")], None).await.unwrap();

        assert!(storage.cache().get("tenant-a:x").await.unwrap().is_some());
        assert_eq!(storage.index_key(), "tenant-a:__index__");
        assert_eq!(count_records(&storage, &AuditFilter::default()).await.unwrap(), 1);
    }
}
