//! Connection pool setup

use std::str::FromStr;
use std::time::Duration;

use audit_common::config::DatabaseConfig;
use audit_core::{AuditError, AuditResult};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use tracing::info;

/// Open a pool for `config.url`, creating the database file if missing
///
/// In-memory databases keep their connections forever: closing the last one
/// would discard the data.
pub async fn create_pool(config: &DatabaseConfig) -> AuditResult<SqlitePool> {
    let connect_options = SqliteConnectOptions::from_str(&config.url)
        .map_err(AuditError::backend)?
        .create_if_missing(true);

    let mut options = SqlitePoolOptions::new()
        .max_connections(config.max_connections)
        .acquire_timeout(Duration::from_secs(config.acquire_timeout_secs));

    if is_in_memory(&config.url) {
        options = options
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None);
    }

    let pool = options
        .connect_with(connect_options)
        .await
        .map_err(AuditError::backend)?;

    info!(
        max_connections = config.max_connections,
        in_memory = is_in_memory(&config.url),
        "Audit database pool created"
    );

    Ok(pool)
}

fn is_in_memory(url: &str) -> bool {
    url.contains(":memory:") || url.contains("mode=memory")
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_file_database_is_created() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("audit.db");
        let config = DatabaseConfig {
            url: format!("sqlite://{}", path.display()),
            max_connections: 2,
            acquire_timeout_secs: 5,
        };

        let pool = create_pool(&config).await.unwrap();
        sqlx::query("SELECT 1").execute(&pool).await.unwrap();
        pool.close().await;

        assert!(path.exists());
    }

    #[test]
    fn test_memory_urls() {
        assert!(is_in_memory("sqlite::memory:"));
        assert!(is_in_memory("sqlite:file:audit?mode=memory&cache=shared"));
        assert!(!is_in_memory("sqlite://audit.db"));
    }
}
