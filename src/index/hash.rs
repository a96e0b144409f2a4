//! Unordered index over `HashMap`.

use std::collections::HashMap;

use super::{sorted_insert, sorted_remove};
use crate::value::{RowId, Value};

/// Hash index: EQ and SET lookups only.
#[derive(Debug, Default)]
pub struct HashIndex {
    map: HashMap<Value, Vec<RowId>>,
}

impl HashIndex {
    /// Creates an empty index.
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a key for a row.
    pub fn insert(&mut self, key: Value, row: RowId) {
        sorted_insert(self.map.entry(key).or_default(), row);
    }

    /// Removes a key for a row; empty postings drop the key.
    pub fn erase(&mut self, key: &Value, row: RowId) {
        if let Some(rows) = self.map.get_mut(key) {
            sorted_remove(rows, row);
            if rows.is_empty() {
                self.map.remove(key);
            }
        }
    }

    /// Rows carrying exactly `key`, ascending.
    pub fn lookup_eq(&self, key: &Value) -> Vec<RowId> {
        self.map.get(key).cloned().unwrap_or_default()
    }

    /// Number of distinct keys.
    pub fn cardinality(&self) -> usize {
        self.map.len()
    }

    /// Total (key, row) entries.
    pub fn total_entries(&self) -> usize {
        self.map.values().map(Vec::len).sum()
    }

    /// Posting size for one key.
    pub(crate) fn bucket_len(&self, key: &Value) -> usize {
        self.map.get(key).map_or(0, Vec::len)
    }

    /// Every row present, ascending and deduplicated.
    pub fn all_rows(&self) -> Vec<RowId> {
        let mut out: Vec<RowId> = Vec::with_capacity(self.total_entries());
        for rows in self.map.values() {
            out.extend_from_slice(rows);
        }
        out.sort_unstable();
        out.dedup();
        out
    }
}
