//! Fulltext index: substring/prefix token match with a score.
//!
//! Strings are lowercased and split on non-alphanumeric boundaries. A match
//! query scores each row by its best token hit: exact token > prefix >
//! substring. Anything beyond this scoring is out of scope for the engine.

use std::collections::BTreeMap;

use super::{sorted_insert, sorted_remove};
use crate::value::{RowId, Value};

const SCORE_EXACT: f64 = 1.0;
const SCORE_PREFIX: f64 = 0.7;
const SCORE_SUBSTRING: f64 = 0.4;

/// Token index over one string field.
#[derive(Debug, Default)]
pub struct FulltextIndex {
    tokens: BTreeMap<String, Vec<RowId>>,
}

impl FulltextIndex {
    /// Creates an empty index.
    pub fn new() -> Self {
        Self::default()
    }

    /// Indexes a string value for a row. Non-string values are skipped.
    pub fn insert(&mut self, value: &Value, row: RowId) {
        for token in tokenize(value) {
            sorted_insert(self.tokens.entry(token).or_default(), row);
        }
    }

    /// Removes a previously indexed value for a row.
    pub fn erase(&mut self, value: &Value, row: RowId) {
        for token in tokenize(value) {
            if let Some(rows) = self.tokens.get_mut(&token) {
                sorted_remove(rows, row);
                if rows.is_empty() {
                    self.tokens.remove(&token);
                }
            }
        }
    }

    /// Scored match: every row whose tokens contain the query as an exact
    /// token, a prefix or a substring. Rows come back ordered by descending
    /// score, row-id ascending on ties.
    pub fn matches(&self, query: &Value) -> Vec<(RowId, f64)> {
        let Some(text) = query.as_str() else {
            return Vec::new();
        };
        let needle = text.to_lowercase();
        if needle.is_empty() {
            return Vec::new();
        }

        let mut best: BTreeMap<RowId, f64> = BTreeMap::new();
        for (token, rows) in &self.tokens {
            let score = if token == &needle {
                SCORE_EXACT
            } else if token.starts_with(&needle) {
                SCORE_PREFIX
            } else if token.contains(&needle) {
                SCORE_SUBSTRING
            } else {
                continue;
            };
            for &row in rows {
                let entry = best.entry(row).or_insert(0.0);
                if score > *entry {
                    *entry = score;
                }
            }
        }

        let mut out: Vec<(RowId, f64)> = best.into_iter().collect();
        out.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal).then(a.0.cmp(&b.0)));
        out
    }

    /// Matching rows only, ascending and deduplicated, for set merging.
    pub fn match_rows(&self, query: &Value) -> Vec<RowId> {
        let mut rows: Vec<RowId> = self.matches(query).into_iter().map(|(row, _)| row).collect();
        rows.sort_unstable();
        rows
    }

    /// Number of distinct tokens.
    pub fn cardinality(&self) -> usize {
        self.tokens.len()
    }

    /// Total (token, row) entries.
    pub fn total_entries(&self) -> usize {
        self.tokens.values().map(Vec::len).sum()
    }

    /// Every row present, ascending and deduplicated.
    pub fn all_rows(&self) -> Vec<RowId> {
        let mut out: Vec<RowId> = Vec::with_capacity(self.total_entries());
        for rows in self.tokens.values() {
            out.extend_from_slice(rows);
        }
        out.sort_unstable();
        out.dedup();
        out
    }
}

fn tokenize(value: &Value) -> Vec<String> {
    let Some(text) = value.as_str() else {
        return Vec::new();
    };
    let mut tokens: Vec<String> = text
        .to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect();
    tokens.sort();
    tokens.dedup();
    tokens
}
