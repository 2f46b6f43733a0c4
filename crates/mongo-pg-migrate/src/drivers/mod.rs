//! Destination store drivers.
//!
//! Each driver module provides a `TargetWriter` and a `Dialect`:
//!
//! - [`postgres`]: PostgreSQL
//!
//! # Static dispatch
//!
//! Dialects are selected by name and wrapped in [`DialectImpl`], so the
//! driver matches on an enum instead of boxing a trait object.

pub mod postgres;

pub use postgres::{PostgresDialect, PostgresWriter, SslMode};

use async_trait::async_trait;

use crate::core::{Dialect, TargetWriter};
use crate::error::{MigrateError, Result};

/// Enum-based static dispatch for dialects.
#[derive(Debug, Clone)]
pub enum DialectImpl {
    Postgres(PostgresDialect),
}

#[async_trait]
impl Dialect for DialectImpl {
    fn name(&self) -> &str {
        match self {
            DialectImpl::Postgres(d) => d.name(),
        }
    }

    async fn clear_all_tables(&self, target: &dyn TargetWriter) -> Result<Vec<String>> {
        match self {
            DialectImpl::Postgres(d) => d.clear_all_tables(target).await,
        }
    }

    async fn before_migration(&self, target: &dyn TargetWriter) -> Result<()> {
        match self {
            DialectImpl::Postgres(d) => d.before_migration(target).await,
        }
    }

    async fn after_migration(&self, target: &dyn TargetWriter) -> Result<()> {
        match self {
            DialectImpl::Postgres(d) => d.after_migration(target).await,
        }
    }
}

impl DialectImpl {
    /// Create a dialect from a target type string.
    pub fn from_db_type(db_type: &str) -> Result<Self> {
        match db_type.to_lowercase().as_str() {
            "postgres" | "postgresql" | "pg" => Ok(DialectImpl::Postgres(PostgresDialect::new())),
            other => Err(MigrateError::Config(format!(
                "Unknown target type: '{}'. Supported types: postgres",
                other
            ))),
        }
    }
}
