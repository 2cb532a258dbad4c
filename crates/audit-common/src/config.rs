//! Configuration management

use serde::{Deserialize, Serialize};

// ============================================================================
// Configuration Constants
// ============================================================================

/// Default database URL (private in-memory SQLite database).
pub const DEFAULT_DATABASE_URL: &str = "sqlite::memory:";

/// Default maximum database connections in the pool.
pub const DEFAULT_DATABASE_MAX_CONNECTIONS: u32 = 5;

/// Default time to wait for a pooled connection, in seconds.
pub const DEFAULT_DATABASE_ACQUIRE_TIMEOUT_SECS: u64 = 10;

/// Default audit table name.
pub const DEFAULT_AUDIT_TABLE: &str = "audit_records";

/// Default key prefix for cache-backed storage.
pub const DEFAULT_CACHE_PREFIX: &str = "audit";

/// Default cache entry TTL in seconds (one year).
pub const DEFAULT_CACHE_TTL_SECS: u64 = 60 * 60 * 24 * 365;

/// Audit trail configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuditConfig {
    pub database: DatabaseConfig,
    pub storage: StorageConfig,
    pub cache: CacheConfig,
}

/// Connection settings for the relational backend
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub acquire_timeout_secs: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_DATABASE_URL.to_string(),
            max_connections: DEFAULT_DATABASE_MAX_CONNECTIONS,
            acquire_timeout_secs: DEFAULT_DATABASE_ACQUIRE_TIMEOUT_SECS,
        }
    }
}

/// How audit record ids reach the relational table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IdStrategy {
    /// Insert the id produced by the auditor's generator
    #[default]
    Generated,
    /// Omit the id and let the column default assign one
    Database,
}

impl std::str::FromStr for IdStrategy {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "generated" | "app" => Ok(IdStrategy::Generated),
            "database" | "db" => Ok(IdStrategy::Database),
            _ => Err(anyhow::anyhow!("Invalid id strategy: {}", s)),
        }
    }
}

/// Relational table settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub table_name: String,
    pub id_strategy: IdStrategy,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            table_name: DEFAULT_AUDIT_TABLE.to_string(),
            id_strategy: IdStrategy::Generated,
        }
    }
}

/// Cache-backed storage settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    pub prefix: String,
    /// Entry TTL; `None` keeps entries until the cache evicts them
    pub ttl_secs: Option<u64>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            prefix: DEFAULT_CACHE_PREFIX.to_string(),
            ttl_secs: Some(DEFAULT_CACHE_TTL_SECS),
        }
    }
}

impl AuditConfig {
    /// Load configuration from `.env`, environment variables and defaults
    ///
    /// - `AUDIT_DATABASE_URL`, `AUDIT_DB_MAX_CONNECTIONS`, `AUDIT_DB_ACQUIRE_TIMEOUT`
    /// - `AUDIT_TABLE`, `AUDIT_ID_STRATEGY` (`generated` or `database`)
    /// - `AUDIT_CACHE_PREFIX`, `AUDIT_CACHE_TTL` (seconds, `0` disables expiry)
    pub fn load() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let config = AuditConfig {
            database: DatabaseConfig {
                url: std::env::var("AUDIT_DATABASE_URL")
                    .unwrap_or_else(|_| DEFAULT_DATABASE_URL.to_string()),
                max_connections: std::env::var("AUDIT_DB_MAX_CONNECTIONS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(DEFAULT_DATABASE_MAX_CONNECTIONS),
                acquire_timeout_secs: std::env::var("AUDIT_DB_ACQUIRE_TIMEOUT")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(DEFAULT_DATABASE_ACQUIRE_TIMEOUT_SECS),
            },
            storage: StorageConfig {
                table_name: std::env::var("AUDIT_TABLE")
                    .unwrap_or_else(|_| DEFAULT_AUDIT_TABLE.to_string()),
                id_strategy: match std::env::var("AUDIT_ID_STRATEGY") {
                    Ok(value) => value.parse()?,
                    Err(_) => IdStrategy::default(),
                },
            },
            cache: CacheConfig {
                prefix: std::env::var("AUDIT_CACHE_PREFIX")
                    .unwrap_or_else(|_| DEFAULT_CACHE_PREFIX.to_string()),
                ttl_secs: match std::env::var("AUDIT_CACHE_TTL")
                    .ok()
                    .and_then(|s| s.parse::<u64>().ok())
                {
                    Some(0) => None,
                    Some(secs) => Some(secs),
                    None => Some(DEFAULT_CACHE_TTL_SECS),
                },
            },
        };

        config.validate()?;

        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.database.url.is_empty() {
            anyhow::bail!("Database URL cannot be empty");
        }

        if self.database.max_connections == 0 {
            anyhow::bail!("Database max_connections must be greater than 0");
        }

        if !is_identifier(&self.storage.table_name) {
            anyhow::bail!(
                "Audit table name '{}' must start with a letter or underscore and contain only ASCII letters, digits and underscores",
                self.storage.table_name
            );
        }

        if self.cache.prefix.is_empty() {
            anyhow::bail!("Cache prefix cannot be empty");
        }

        if self.database.url.contains(":memory:") && self.database.max_connections > 1 {
            tracing::warn!(
                max_connections = self.database.max_connections,
                "In-memory SQLite gives every pooled connection its own database"
            );
        }

        Ok(())
    }
}

/// Whether `name` is safe to splice into SQL as an unquoted identifier.
pub fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) if first.is_ascii_alphabetic() || first == '_' => {},
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}
