//! Source identifier → destination id allocation.

use std::collections::HashMap;

use bson::Bson;

use crate::core::SourceId;

/// Maps source document identifiers to destination integer ids.
///
/// One map is built per run and passed by reference to every pass. Keys
/// share a single global space (source ids are unique across collections);
/// sequences are counted per destination table and start at 1.
#[derive(Debug, Default)]
pub struct IdMap {
    ids: HashMap<SourceId, i64>,
    sequences: HashMap<String, i64>,
}

impl IdMap {
    /// Create an empty map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate the next id of `table` for `source`, or return the id
    /// already allocated to it. An allocated id is never reassigned.
    pub fn allocate(&mut self, source: &SourceId, table: &str) -> i64 {
        if let Some(&id) = self.ids.get(source) {
            return id;
        }

        let next = self.sequences.entry(table.to_string()).or_insert(0);
        *next += 1;
        let id = *next;
        self.ids.insert(source.clone(), id);
        id
    }

    /// Look up the id allocated to `source`.
    pub fn resolve(&self, source: &SourceId) -> Option<i64> {
        self.ids.get(source).copied()
    }

    /// Look up the id referenced by a BSON value (object id, string or
    /// embedded document with an `_id`).
    pub fn resolve_bson(&self, value: &Bson) -> Option<i64> {
        SourceId::from_bson(value).and_then(|id| self.resolve(&id))
    }

    /// Number of ids handed out for `table` so far.
    pub fn allocated_in(&self, table: &str) -> i64 {
        self.sequences.get(table).copied().unwrap_or(0)
    }

    /// Total number of mapped identifiers.
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    /// Check if no identifier has been mapped yet.
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}
