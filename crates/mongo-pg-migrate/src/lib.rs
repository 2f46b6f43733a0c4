//! # mongo-pg-migrate
//!
//! Two-pass MongoDB to PostgreSQL migration library for document stores
//! described by a model catalog.
//!
//! The library reads model definitions from the source catalog and moves
//! every collection into an existing relational schema:
//!
//! - **Pass 1** inserts one row per document and maps each source id to a
//!   fresh integer id
//! - **Pass 2** writes component links, media attachments, join-table rows
//!   and foreign keys through that id map
//! - **Relation classification** decides per attribute whether a link is a
//!   foreign key, a join table row, or nothing at all
//! - **Dry runs** execute the whole run against an in-memory target
//!
//! ## Example
//!
//! ```rust,no_run
//! use mongo_pg_migrate::{Config, Orchestrator};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::load("config.yaml")?;
//!     let orchestrator = Orchestrator::new(config).await?;
//!     let result = orchestrator.run().await?;
//!     println!("Migrated {} rows", result.rows_inserted);
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod core;
pub mod drivers;
pub mod error;
pub mod idmap;
pub mod link;
pub mod memory;
pub mod model;
pub mod naming;
pub mod orchestrator;
pub mod source;
pub mod transform;

// Re-exports for convenient access
pub use config::{Config, MigrationConfig, SourceConfig, TargetConfig};
pub use core::{Dialect, DocumentSource, Row, SourceDocument, SourceId, SqlValue, TargetWriter};
pub use drivers::{DialectImpl, PostgresWriter};
pub use error::{MigrateError, Result};
pub use idmap::IdMap;
pub use link::{LinkStats, LinkWriter};
pub use memory::{MemorySource, MemoryTarget};
pub use model::{AttributeDescriptor, ModelDescriptor, ModelRegistry, RelationKind};
pub use orchestrator::{HealthCheckResult, MigrationResult, Orchestrator, TableValidation};
pub use source::MongoSource;
pub use transform::RowTransformer;
