//! Core traits for store-agnostic document migration.
//!
//! - [`DocumentSource`]: reads the schema catalog and streams documents
//! - [`TargetWriter`]: writes rows, links and foreign keys to the destination
//! - [`Dialect`]: destination-specific pre/post migration hooks
//!
//! The engine only ever talks to these traits, so the whole two-pass run can
//! be exercised against the in-memory implementations in [`crate::memory`].

use std::collections::HashSet;

use async_trait::async_trait;
use futures::stream::BoxStream;

use crate::error::Result;

use super::document::SourceDocument;
use super::value::Row;

/// Stream of documents from one source collection.
pub type DocumentStream<'a> = BoxStream<'a, Result<SourceDocument>>;

/// Read the schema catalog and documents from a source store.
#[async_trait]
pub trait DocumentSource: Send + Sync {
    /// Check that the store is reachable.
    async fn ping(&self) -> Result<()>;

    /// Return the raw (JSON-encoded) model definitions whose catalog key
    /// starts with `key_prefix`.
    async fn model_definitions(&self, key_prefix: &str) -> Result<Vec<String>>;

    /// Stream every document of a collection, one at a time.
    ///
    /// Callers must await each item before requesting the next; the engine
    /// never overlaps a fetch with the write of the previous row.
    async fn stream_collection(&self, collection: &str) -> Result<DocumentStream<'_>>;

    /// Count the documents of a collection.
    async fn count_documents(&self, collection: &str) -> Result<u64>;

    /// Get the store type identifier (e.g., "mongodb").
    fn db_type(&self) -> &str;

    /// Release the connection.
    async fn close(&self);
}

/// Write rows and links into a destination store.
#[async_trait]
pub trait TargetWriter: Send + Sync {
    // ===== Connectivity =====

    /// Check that the store is reachable.
    async fn ping(&self) -> Result<()>;

    // ===== Table Operations =====

    /// List every table of the target schema.
    async fn list_tables(&self) -> Result<Vec<String>>;

    /// Delete every row of a table.
    async fn clear_table(&self, table: &str) -> Result<u64>;

    /// Change the declared type of a column.
    ///
    /// When `cast` is set the existing values are converted with
    /// `USING column::sql_type`.
    async fn alter_column_type(
        &self,
        table: &str,
        column: &str,
        sql_type: &str,
        cast: bool,
    ) -> Result<()>;

    // ===== Data Operations =====

    /// Insert a batch of rows. All rows of a batch share the same columns.
    async fn insert_rows(&self, table: &str, rows: &[Row]) -> Result<u64>;

    /// Set an integer (foreign-key) column on the row with the given id.
    async fn update_column(&self, table: &str, id: i64, column: &str, value: i64) -> Result<u64>;

    /// Check whether any row already carries `value` in `column`.
    async fn exists_with(&self, table: &str, column: &str, value: i64) -> Result<bool>;

    /// Return the subset of `candidates` already present in `table` under the
    /// composite key `columns`. One round trip for the whole candidate set.
    async fn existing_pairs(
        &self,
        table: &str,
        columns: (&str, &str),
        candidates: &[(i64, i64)],
    ) -> Result<HashSet<(i64, i64)>>;

    /// Rewrite source identifiers stored in `column` into the destination ids
    /// of `reference_table`, matching on its `source_id_column`.
    async fn remap_column(
        &self,
        table: &str,
        column: &str,
        reference_table: &str,
        source_id_column: &str,
    ) -> Result<u64>;

    // ===== Utility Operations =====

    /// Largest `id` in a table, `None` when empty or when the table has no
    /// `id` column.
    async fn max_id(&self, table: &str) -> Result<Option<i64>>;

    /// Restart a sequence so that its next value is `next_value`.
    async fn restart_sequence(&self, sequence: &str, next_value: i64) -> Result<()>;

    /// Get the row count for a table.
    async fn row_count(&self, table: &str) -> Result<i64>;

    /// Get the store type identifier (e.g., "postgres").
    fn db_type(&self) -> &str;

    /// Release all connections.
    async fn close(&self);
}

/// Destination-specific hooks run around the two passes.
///
/// The default implementations form a template: clearing lists the tables
/// and deletes their rows one by one, and both migration hooks do nothing.
#[async_trait]
pub trait Dialect: Send + Sync {
    /// Get the dialect identifier (e.g., "postgres").
    fn name(&self) -> &str;

    /// Remove every row from every destination table.
    ///
    /// Returns the names of the cleared tables.
    async fn clear_all_tables(&self, target: &dyn TargetWriter) -> Result<Vec<String>> {
        let tables = target.list_tables().await?;
        for table in &tables {
            target.clear_table(table).await?;
        }
        Ok(tables)
    }

    /// Run before pass 1, after the tables have been cleared.
    async fn before_migration(&self, _target: &dyn TargetWriter) -> Result<()> {
        Ok(())
    }

    /// Run after pass 2.
    async fn after_migration(&self, _target: &dyn TargetWriter) -> Result<()> {
        Ok(())
    }
}
