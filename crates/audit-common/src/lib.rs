//! Audit Trail Common Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Ambient plumbing shared by every audit trail crate.
//!
//! - **Logging**: tracing subscriber setup driven by [`logging::LogConfig`]
//! - **Configuration**: environment-driven settings for storage backends
//!
//! # Example
//!
//! ```no_run
//! use audit_common::config::AuditConfig;
//! use audit_common::logging::{init_logging, LogConfig};
//!
//! fn main() -> anyhow::Result<()> {
//!     init_logging(&LogConfig::from_env()?)?;
//!     let config = AuditConfig::load()?;
//!     tracing::info!(table = %config.storage.table_name, "Audit trail configured");
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod logging;

pub use config::{AuditConfig, CacheConfig, DatabaseConfig, IdStrategy, StorageConfig};
pub use logging::{init_logging, LogConfig, LogFormat, LogLevel, LogOutput};
