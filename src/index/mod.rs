//! Per-field secondary indexes.
//!
//! Every searchable index maps a key value to the set of row-ids carrying it.
//! Lookups return row-id vectors sorted ascending and deduplicated, so the
//! executor can merge them with linear set operations. Tree (and composite,
//! which is a tree over tuple keys) additionally supports range lookups and
//! key-ordered iteration; fulltext supports substring/prefix match with a
//! score.
//!
//! Mutation (`insert`/`erase`) is driven exclusively by the namespace under
//! its write lock.

mod fulltext;
mod hash;
mod tree;

pub use fulltext::FulltextIndex;
pub use hash::HashIndex;
pub use tree::TreeIndex;

use crate::query::CondOp;
use crate::value::{RowId, Value};

/// Inserts into a sorted row vector, keeping it deduplicated.
pub(crate) fn sorted_insert(rows: &mut Vec<RowId>, row: RowId) {
    if let Err(pos) = rows.binary_search(&row) {
        rows.insert(pos, row);
    }
}

/// Removes from a sorted row vector. Missing rows are a no-op.
pub(crate) fn sorted_remove(rows: &mut Vec<RowId>, row: RowId) {
    if let Ok(pos) = rows.binary_search(&row) {
        rows.remove(pos);
    }
}

/// A searchable index over one field (or one composite tuple key).
#[derive(Debug)]
pub enum FieldIndex {
    Hash(HashIndex),
    Tree(TreeIndex),
    Fulltext(FulltextIndex),
}

impl FieldIndex {
    /// Inserts one key for a row.
    pub fn insert(&mut self, key: Value, row: RowId) {
        match self {
            FieldIndex::Hash(idx) => idx.insert(key, row),
            FieldIndex::Tree(idx) => idx.insert(key, row),
            FieldIndex::Fulltext(idx) => idx.insert(&key, row),
        }
    }

    /// Removes one key for a row.
    pub fn erase(&mut self, key: &Value, row: RowId) {
        match self {
            FieldIndex::Hash(idx) => idx.erase(key, row),
            FieldIndex::Tree(idx) => idx.erase(key, row),
            FieldIndex::Fulltext(idx) => idx.erase(key, row),
        }
    }

    /// Number of distinct keys.
    pub fn cardinality(&self) -> usize {
        match self {
            FieldIndex::Hash(idx) => idx.cardinality(),
            FieldIndex::Tree(idx) => idx.cardinality(),
            FieldIndex::Fulltext(idx) => idx.cardinality(),
        }
    }

    /// Total number of (key, row) entries.
    pub fn total_entries(&self) -> usize {
        match self {
            FieldIndex::Hash(idx) => idx.total_entries(),
            FieldIndex::Tree(idx) => idx.total_entries(),
            FieldIndex::Fulltext(idx) => idx.total_entries(),
        }
    }

    /// Every row present in the index, ascending and deduplicated.
    pub fn all_rows(&self) -> Vec<RowId> {
        match self {
            FieldIndex::Hash(idx) => idx.all_rows(),
            FieldIndex::Tree(idx) => idx.all_rows(),
            FieldIndex::Fulltext(idx) => idx.all_rows(),
        }
    }

    /// Estimated candidate count for a predicate, used by the planner to
    /// order conjunction members. EQ and SET are exact bucket sizes;
    /// comparisons fall back to half the entry count — a deliberate
    /// cardinality heuristic, not a statistic.
    pub fn lookup_cost(&self, op: CondOp, values: &[Value]) -> u64 {
        match op {
            CondOp::Eq => self.bucket_len(values.first()) as u64,
            CondOp::Set => values.iter().map(|v| self.bucket_len(Some(v)) as u64).sum(),
            CondOp::Lt | CondOp::Le | CondOp::Gt | CondOp::Ge | CondOp::Range => {
                (self.total_entries() as u64) / 2 + 1
            }
            CondOp::Any | CondOp::Empty => self.total_entries() as u64 + 1,
        }
    }

    fn bucket_len(&self, key: Option<&Value>) -> usize {
        let Some(key) = key else { return 0 };
        match self {
            FieldIndex::Hash(idx) => idx.bucket_len(key),
            FieldIndex::Tree(idx) => idx.bucket_len(key),
            FieldIndex::Fulltext(idx) => idx.match_rows(key).len(),
        }
    }

    /// Downcast to the tree index for ordered iteration.
    pub fn as_tree(&self) -> Option<&TreeIndex> {
        match self {
            FieldIndex::Tree(idx) => Some(idx),
            _ => None,
        }
    }

    /// Downcast to the fulltext index for scored matching.
    pub fn as_fulltext(&self) -> Option<&FulltextIndex> {
        match self {
            FieldIndex::Fulltext(idx) => Some(idx),
            _ => None,
        }
    }
}
