//! Ordered index over `BTreeMap`.
//!
//! Keys are engine values (tuples for composite indexes); each key maps to a
//! sorted, deduplicated row vector. Lookups merge postings back into one
//! ascending row vector. Iteration order is key order, which the planner uses
//! to stream sorted results without materializing.

use std::collections::BTreeMap;
use std::ops::Bound;

use super::{sorted_insert, sorted_remove};
use crate::value::{RowId, Value};

/// Ordered index: EQ, SET, comparisons, RANGE, ordered iteration.
#[derive(Debug, Default)]
pub struct TreeIndex {
    map: BTreeMap<Value, Vec<RowId>>,
}

impl TreeIndex {
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

    /// Rows in the closed interval `[lo, hi]`. `lo > hi` yields nothing.
    pub fn lookup_range(&self, lo: &Value, hi: &Value) -> Vec<RowId> {
        if lo > hi {
            return Vec::new();
        }
        self.collect_bounds((Bound::Included(lo), Bound::Included(hi)))
    }

    /// Rows with key strictly below `key`.
    pub fn lookup_lt(&self, key: &Value) -> Vec<RowId> {
        self.collect_bounds((Bound::Unbounded, Bound::Excluded(key)))
    }

    /// Rows with key at most `key`.
    pub fn lookup_le(&self, key: &Value) -> Vec<RowId> {
        self.collect_bounds((Bound::Unbounded, Bound::Included(key)))
    }

    /// Rows with key strictly above `key`.
    pub fn lookup_gt(&self, key: &Value) -> Vec<RowId> {
        self.collect_bounds((Bound::Excluded(key), Bound::Unbounded))
    }

    /// Rows with key at least `key`.
    pub fn lookup_ge(&self, key: &Value) -> Vec<RowId> {
        self.collect_bounds((Bound::Included(key), Bound::Unbounded))
    }

    fn collect_bounds(&self, bounds: (Bound<&Value>, Bound<&Value>)) -> Vec<RowId> {
        let mut out = Vec::new();
        for (key, rows) in self.map.range::<Value, _>(bounds) {
            // The Null key holds rows a dense index carries for totality; a
            // null never satisfies a comparison.
            if key.is_null() {
                continue;
            }
            out.extend_from_slice(rows);
        }
        out.sort_unstable();
        out.dedup();
        out
    }

    /// Iterates postings in ascending key order.
    pub fn iter(&self) -> impl Iterator<Item = (&Value, &[RowId])> {
        self.map.iter().map(|(k, v)| (k, v.as_slice()))
    }

    /// Iterates postings in descending key order.
    pub fn iter_rev(&self) -> impl Iterator<Item = (&Value, &[RowId])> {
        self.map.iter().rev().map(|(k, v)| (k, v.as_slice()))
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
