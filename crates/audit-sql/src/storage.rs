//! SQLite-backed audit storage

use async_trait::async_trait;
use audit_common::config::{is_identifier, AuditConfig, IdStrategy, StorageConfig};
use audit_core::{
    AuditError, AuditFilter, AuditRecord, AuditResult, AuditStorage, IsolationLevel,
    QueryOptions, QueryableStorage, TransactionOptions, TransactionalStorage,
};
use sqlx::{SqliteConnection, SqlitePool};
use tracing::debug;

use crate::pool::create_pool;
use crate::query::{self, MAX_ROWS_PER_INSERT};
use crate::row::AuditRow;
use crate::schema;
use crate::transaction::SqliteTransaction;

/// Audit storage on a SQLite table
///
/// Supports every optional capability: filtered reads with predicates pushed
/// into SQL, and writes that join the caller's transaction.
#[derive(Debug, Clone)]
pub struct SqliteAuditStorage {
    pool: SqlitePool,
    table: String,
    id_strategy: IdStrategy,
}

impl SqliteAuditStorage {
    /// Wrap an existing pool; the table must already exist (see [`Self::ensure_schema`])
    pub fn new(pool: SqlitePool, config: &StorageConfig) -> AuditResult<Self> {
        if !is_identifier(&config.table_name) {
            return Err(AuditError::config(format!(
                "invalid audit table name '{}'",
                config.table_name
            )));
        }

        Ok(Self {
            pool,
            table: config.table_name.clone(),
            id_strategy: config.id_strategy,
        })
    }

    /// Open a pool from configuration and create the table if needed
    pub async fn connect(config: &AuditConfig) -> AuditResult<Self> {
        let pool = create_pool(&config.database).await?;
        let storage = Self::new(pool, &config.storage)?;
        storage.ensure_schema().await?;
        Ok(storage)
    }

    pub async fn ensure_schema(&self) -> AuditResult<()> {
        schema::ensure_schema(&self.pool, &self.table).await
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn id_strategy(&self) -> IdStrategy {
        self.id_strategy
    }

    async fn insert_rows(&self, conn: &mut SqliteConnection, rows: &[AuditRow]) -> AuditResult<()> {
        for chunk in rows.chunks(MAX_ROWS_PER_INSERT) {
            let mut builder = query::insert_records(&self.table, self.id_strategy, chunk);
            builder
                .build()
                .execute(&mut *conn)
                .await
                .map_err(AuditError::backend)?;
        }
        Ok(())
    }
}

#[async_trait]
impl AuditStorage for SqliteAuditStorage {
    type Transaction = SqliteTransaction;

    async fn write(
        &self,
        records: Vec<AuditRecord>,
        trx: Option<&SqliteTransaction>,
    ) -> AuditResult<()> {
        if records.is_empty() {
            return Ok(());
        }

        let rows = records
            .iter()
            .map(AuditRow::from_record)
            .collect::<AuditResult<Vec<_>>>()?;

        match trx {
            Some(trx) => {
                let mut conn = trx.connection().await?;
                self.insert_rows(&mut conn, &rows).await?;
            },
            None if rows.len() <= MAX_ROWS_PER_INSERT => {
                let mut conn = self.pool.acquire().await.map_err(AuditError::backend)?;
                self.insert_rows(&mut conn, &rows).await?;
            },
            None => {
                // Several statements: keep them all-or-nothing.
                let mut tx = self.pool.begin().await.map_err(AuditError::backend)?;
                self.insert_rows(&mut tx, &rows).await?;
                tx.commit().await.map_err(AuditError::backend)?;
            },
        }

        debug!(
            table = %self.table,
            count = rows.len(),
            in_transaction = trx.is_some(),
            "Inserted audit records"
        );

        Ok(())
    }

    fn queryable(&self) -> Option<&dyn QueryableStorage> {
        Some(self)
    }
}

#[async_trait]
impl QueryableStorage for SqliteAuditStorage {
    async fn query(&self, options: &QueryOptions) -> AuditResult<Vec<AuditRecord>> {
        let mut builder = query::select_records(&self.table, options);
        let rows = builder
            .build_query_as::<AuditRow>()
            .fetch_all(&self.pool)
            .await
            .map_err(AuditError::backend)?;

        rows.into_iter().map(AuditRow::into_record).collect()
    }

    async fn count(&self, filter: &AuditFilter) -> AuditResult<u64> {
        let mut builder = query::count_records(&self.table, filter);
        let count: i64 = builder
            .build_query_scalar()
            .fetch_one(&self.pool)
            .await
            .map_err(AuditError::backend)?;

        Ok(u64::try_from(count).unwrap_or_default())
    }
}

#[async_trait]
impl TransactionalStorage for SqliteAuditStorage {
    type Database = SqlitePool;

    fn database(&self) -> &SqlitePool {
        &self.pool
    }

    fn database_service_name(&self) -> &str {
        "sqlite"
    }

    async fn begin(&self, options: &TransactionOptions) -> AuditResult<SqliteTransaction> {
        let mut tx = self.pool.begin().await.map_err(AuditError::backend)?;

        // SQLite transactions are serializable; dirty reads are the only knob.
        if let Some(level) = options.isolation_level {
            let pragma = match level {
                IsolationLevel::ReadUncommitted => "PRAGMA read_uncommitted = 1",
                _ => "PRAGMA read_uncommitted = 0",
            };
            sqlx::query(pragma)
                .execute(&mut *tx)
                .await
                .map_err(AuditError::backend)?;
        }

        debug!(isolation = ?options.isolation_level, "Began audit transaction");

        Ok(SqliteTransaction::new(tx))
    }

    async fn commit(&self, trx: SqliteTransaction) -> AuditResult<()> {
        trx.commit().await
    }

    async fn rollback(&self, trx: SqliteTransaction) -> AuditResult<()> {
        trx.rollback().await
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use audit_core::{AuditActor, EntityId, OrderBy, OrderDirection};
    use sqlx::sqlite::SqlitePoolOptions;

    async fn storage(id_strategy: IdStrategy) -> SqliteAuditStorage {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        let config = StorageConfig {
            table_name: "audit_records".to_string(),
            id_strategy,
        };
        let storage = SqliteAuditStorage::new(pool, &config).unwrap();
        storage.ensure_schema().await.unwrap();
        storage
    }

    fn record(id: &str, audit_type: &str) -> AuditRecord {
        let mut r = AuditRecord::new(id, audit_type);
        r.actor = Some(AuditActor::new("admin-1", "admin"));
        r
    }

    #[tokio::test]
    async fn test_write_and_read_back() {
        let storage = storage(IdStrategy::Generated).await;
        let mut first = record("a", "user.created");
        first.entity_id = Some(EntityId::from("user-123"));
        storage
            .write(vec![first.clone(), record("b", "user.deleted")], None)
            .await
            .unwrap();

        let found = storage
            .query(&QueryOptions::from(AuditFilter::new().entity_id("user-123")))
            .await
            .unwrap();
        assert_eq!(found, vec![first]);
        assert_eq!(storage.count(&AuditFilter::default()).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_empty_write_is_a_no_op() {
        let storage = storage(IdStrategy::Generated).await;
        let trx = storage.begin(&TransactionOptions::default()).await.unwrap();
        storage.rollback(trx.clone()).await.unwrap();

        // A closed handle would fail if the write reached it.
        storage.write(Vec::new(), Some(&trx)).await.unwrap();
    }

    #[tokio::test]
    async fn test_large_batches_keep_order() {
        let storage = storage(IdStrategy::Generated).await;
        let records: Vec<_> = (0..1203).map(|i| record(&format!("r{i:04}"), "bulk.item")).collect();
        let expected: Vec<String> = records.iter().map(|r| r.id.clone()).collect();

        storage.write(records, None).await.unwrap();

        let options = QueryOptions::new().order(OrderBy::Timestamp, OrderDirection::Asc);
        let ids: Vec<String> = storage
            .query(&options)
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.id)
            .collect();
        assert_eq!(ids, expected);
    }

    #[tokio::test]
    async fn test_database_assigned_ids() {
        let storage = storage(IdStrategy::Database).await;
        storage
            .write(vec![record("ignored-1", "t"), record("ignored-2", "t")], None)
            .await
            .unwrap();

        let found = storage.query(&QueryOptions::default()).await.unwrap();
        assert_eq!(found.len(), 2);
        for r in &found {
            assert!(!r.id.starts_with("ignored"));
            assert_eq!(r.id.len(), 32);
        }
        assert_ne!(found[0].id, found[1].id);
    }

    #[tokio::test]
    async fn test_rolled_back_write_is_discarded() {
        let storage = storage(IdStrategy::Generated).await;
        let trx = storage
            .begin(&TransactionOptions::isolation(IsolationLevel::ReadUncommitted))
            .await
            .unwrap();
        storage.write(vec![record("a", "t")], Some(&trx)).await.unwrap();
        storage.rollback(trx).await.unwrap();

        assert_eq!(storage.count(&AuditFilter::default()).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_offset_without_limit() {
        let storage = storage(IdStrategy::Generated).await;
        storage
            .write(vec![record("a", "t"), record("b", "t"), record("c", "t")], None)
            .await
            .unwrap();

        let options = QueryOptions::new()
            .order(OrderBy::Timestamp, OrderDirection::Asc)
            .offset(1);
        let ids: Vec<String> = storage.query(&options).await.unwrap().into_iter().map(|r| r.id).collect();
        assert_eq!(ids, vec!["b", "c"]);
    }

    #[tokio::test]
    async fn test_rejects_bad_table_name() {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        let config = StorageConfig {
            table_name: "audit records".to_string(),
            id_strategy: IdStrategy::Generated,
        };
        assert!(matches!(
            SqliteAuditStorage::new(pool, &config),
            Err(AuditError::Config(_))
        ));
    }
}
