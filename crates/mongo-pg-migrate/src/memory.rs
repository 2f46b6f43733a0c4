//! In-memory source and target stores.
//!
//! [`MemoryTarget`] backs `run --dry-run`: the whole two-pass run executes
//! against it and the resulting row counts are reported without touching
//! PostgreSQL. Both types double as fixtures for engine tests.

use std::collections::{BTreeMap, HashSet};

use async_trait::async_trait;
use bson::Document;
use futures::stream::{self, StreamExt};
use tokio::sync::Mutex;
use tracing::warn;

use crate::core::{
    DocumentSource, DocumentStream, Row, SourceDocument, SqlValue, TargetWriter,
};
use crate::error::{MigrateError, Result};

/// Document source holding its catalog and collections in memory.
#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    /// (catalog key, JSON model definition)
    definitions: Vec<(String, String)>,
    collections: BTreeMap<String, Vec<Document>>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a model definition under the catalog key `model_def_{uid}`.
    pub fn with_model(mut self, definition: serde_json::Value) -> Self {
        let uid = definition
            .get("uid")
            .and_then(|u| u.as_str())
            .unwrap_or_default()
            .to_string();
        self.definitions
            .push((format!("model_def_{}", uid), definition.to_string()));
        self
    }

    /// Append documents to a collection.
    pub fn with_documents(mut self, collection: &str, documents: Vec<Document>) -> Self {
        self.collections
            .entry(collection.to_string())
            .or_default()
            .extend(documents);
        self
    }
}

#[async_trait]
impl DocumentSource for MemorySource {
    async fn ping(&self) -> Result<()> {
        Ok(())
    }

    async fn model_definitions(&self, key_prefix: &str) -> Result<Vec<String>> {
        Ok(self
            .definitions
            .iter()
            .filter(|(key, _)| key.starts_with(key_prefix))
            .map(|(_, value)| value.clone())
            .collect())
    }

    async fn stream_collection(&self, collection: &str) -> Result<DocumentStream<'_>> {
        let documents = self.collections.get(collection).cloned().unwrap_or_default();
        let collection = collection.to_string();
        Ok(stream::iter(documents)
            .filter_map(move |doc| {
                let parsed = SourceDocument::from_document(doc);
                if parsed.is_none() {
                    warn!("{}: document without _id skipped", collection);
                }
                futures::future::ready(parsed.map(Ok))
            })
            .boxed())
    }

    async fn count_documents(&self, collection: &str) -> Result<u64> {
        Ok(self
            .collections
            .get(collection)
            .map(|docs| docs.len() as u64)
            .unwrap_or(0))
    }

    fn db_type(&self) -> &str {
        "memory"
    }

    async fn close(&self) {}
}

#[derive(Debug, Default)]
struct MemoryState {
    tables: BTreeMap<String, Vec<Row>>,
    unique_keys: BTreeMap<String, Vec<String>>,
    column_types: BTreeMap<(String, String), String>,
    sequences: BTreeMap<String, i64>,
}

impl MemoryState {
    fn key_of(row: &Row, columns: &[String]) -> Vec<Option<i64>> {
        columns
            .iter()
            .map(|c| row.get(c).and_then(SqlValue::as_i64))
            .collect()
    }
}

/// Target store keeping every table in memory.
///
/// Tables are created on first insert; counting a table that was never
/// created fails like a missing relation would. Unique keys registered with
/// [`MemoryTarget::with_unique_key`] reject duplicate inserts like a
/// destination constraint would.
#[derive(Debug, Default)]
pub struct MemoryTarget {
    state: Mutex<MemoryState>,
}

impl MemoryTarget {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-create empty tables.
    pub fn with_tables(tables: &[&str]) -> Self {
        let mut state = MemoryState::default();
        for table in tables {
            state.tables.insert(table.to_string(), Vec::new());
        }
        Self {
            state: Mutex::new(state),
        }
    }

    /// Pre-fill a table with rows.
    pub fn with_rows(self, table: &str, rows: Vec<Row>) -> Self {
        let mut state = self.state.into_inner();
        state.tables.entry(table.to_string()).or_default().extend(rows);
        Self {
            state: Mutex::new(state),
        }
    }

    /// Declare a unique key on `table`.
    pub fn with_unique_key(self, table: &str, columns: &[&str]) -> Self {
        let mut state = self.state.into_inner();
        state.unique_keys.insert(
            table.to_string(),
            columns.iter().map(|c| c.to_string()).collect(),
        );
        state.tables.entry(table.to_string()).or_default();
        Self {
            state: Mutex::new(state),
        }
    }

    /// Snapshot of a table's rows.
    pub async fn rows(&self, table: &str) -> Vec<Row> {
        self.state
            .lock()
            .await
            .tables
            .get(table)
            .cloned()
            .unwrap_or_default()
    }

    /// Row counts of every table.
    pub async fn table_counts(&self) -> BTreeMap<String, usize> {
        self.state
            .lock()
            .await
            .tables
            .iter()
            .map(|(name, rows)| (name.clone(), rows.len()))
            .collect()
    }

    /// Next value a sequence was restarted with.
    pub async fn sequence(&self, name: &str) -> Option<i64> {
        self.state.lock().await.sequences.get(name).copied()
    }

    /// Declared type of a column, if it was changed during the run.
    pub async fn column_type(&self, table: &str, column: &str) -> Option<String> {
        self.state
            .lock()
            .await
            .column_types
            .get(&(table.to_string(), column.to_string()))
            .cloned()
    }
}

#[async_trait]
impl TargetWriter for MemoryTarget {
    async fn ping(&self) -> Result<()> {
        Ok(())
    }

    async fn list_tables(&self) -> Result<Vec<String>> {
        Ok(self.state.lock().await.tables.keys().cloned().collect())
    }

    async fn clear_table(&self, table: &str) -> Result<u64> {
        let mut state = self.state.lock().await;
        Ok(state
            .tables
            .get_mut(table)
            .map(|rows| std::mem::take(rows).len() as u64)
            .unwrap_or(0))
    }

    async fn alter_column_type(
        &self,
        table: &str,
        column: &str,
        sql_type: &str,
        _cast: bool,
    ) -> Result<()> {
        self.state
            .lock()
            .await
            .column_types
            .insert((table.to_string(), column.to_string()), sql_type.to_string());
        Ok(())
    }

    async fn insert_rows(&self, table: &str, rows: &[Row]) -> Result<u64> {
        let mut state = self.state.lock().await;

        if let Some(columns) = state.unique_keys.get(table).cloned() {
            let existing = state.tables.get(table).map(Vec::as_slice).unwrap_or(&[]);
            let mut seen: HashSet<Vec<Option<i64>>> = existing
                .iter()
                .map(|r| MemoryState::key_of(r, &columns))
                .collect();
            for row in rows {
                if !seen.insert(MemoryState::key_of(row, &columns)) {
                    return Err(MigrateError::write(
                        table,
                        format!("duplicate key value violates unique key ({})", columns.join(", ")),
                    ));
                }
            }
        }

        state
            .tables
            .entry(table.to_string())
            .or_default()
            .extend(rows.iter().cloned());
        Ok(rows.len() as u64)
    }

    async fn update_column(&self, table: &str, id: i64, column: &str, value: i64) -> Result<u64> {
        let mut state = self.state.lock().await;
        let mut updated = 0;
        if let Some(rows) = state.tables.get_mut(table) {
            for row in rows
                .iter_mut()
                .filter(|r| r.get("id").and_then(SqlValue::as_i64) == Some(id))
            {
                row.insert(column.to_string(), SqlValue::I64(value));
                updated += 1;
            }
        }
        Ok(updated)
    }

    async fn exists_with(&self, table: &str, column: &str, value: i64) -> Result<bool> {
        let state = self.state.lock().await;
        Ok(state.tables.get(table).is_some_and(|rows| {
            rows.iter()
                .any(|r| r.get(column).and_then(SqlValue::as_i64) == Some(value))
        }))
    }

    async fn existing_pairs(
        &self,
        table: &str,
        columns: (&str, &str),
        candidates: &[(i64, i64)],
    ) -> Result<HashSet<(i64, i64)>> {
        let wanted: HashSet<(i64, i64)> = candidates.iter().copied().collect();
        let state = self.state.lock().await;
        let rows = state.tables.get(table).map(Vec::as_slice).unwrap_or(&[]);
        Ok(rows
            .iter()
            .filter_map(|r| {
                let a = r.get(columns.0).and_then(SqlValue::as_i64)?;
                let b = r.get(columns.1).and_then(SqlValue::as_i64)?;
                Some((a, b))
            })
            .filter(|pair| wanted.contains(pair))
            .collect())
    }

    async fn remap_column(
        &self,
        table: &str,
        column: &str,
        reference_table: &str,
        source_id_column: &str,
    ) -> Result<u64> {
        let mut state = self.state.lock().await;

        let lookup: BTreeMap<String, i64> = state
            .tables
            .get(reference_table)
            .map(Vec::as_slice)
            .unwrap_or(&[])
            .iter()
            .filter_map(|r| match (r.get(source_id_column), r.get("id")) {
                (Some(SqlValue::Text(source)), Some(id)) => {
                    Some((source.replace('"', ""), id.as_i64()?))
                }
                _ => None,
            })
            .collect();

        let mut updated = 0;
        if let Some(rows) = state.tables.get_mut(table) {
            for row in rows.iter_mut() {
                let Some(SqlValue::Text(stored)) = row.get(column) else {
                    continue;
                };
                let remapped = lookup
                    .get(&stored.replace('"', ""))
                    .map(|&id| SqlValue::I64(id))
                    .unwrap_or(SqlValue::Null);
                row.insert(column.to_string(), remapped);
                updated += 1;
            }
        }
        Ok(updated)
    }

    async fn max_id(&self, table: &str) -> Result<Option<i64>> {
        let state = self.state.lock().await;
        Ok(state.tables.get(table).and_then(|rows| {
            rows.iter()
                .filter_map(|r| r.get("id").and_then(SqlValue::as_i64))
                .max()
        }))
    }

    async fn restart_sequence(&self, sequence: &str, next_value: i64) -> Result<()> {
        self.state
            .lock()
            .await
            .sequences
            .insert(sequence.to_string(), next_value);
        Ok(())
    }

    async fn row_count(&self, table: &str) -> Result<i64> {
        let state = self.state.lock().await;
        state
            .tables
            .get(table)
            .map(|r| r.len() as i64)
            .ok_or_else(|| MigrateError::MissingTable(table.to_string()))
    }

    fn db_type(&self) -> &str {
        "memory"
    }

    async fn close(&self) {}
}
