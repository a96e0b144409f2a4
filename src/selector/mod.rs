//! Selectors: evaluate one planned condition.
//!
//! Two forms, both driven by the executor:
//! - [`row_ids`] asks the bound index for the matching row set (ascending,
//!   deduplicated);
//! - [`matches_payload`] evaluates the condition against one materialized
//!   row, used for scan targets, the walk fallback and NOT verification.
//!
//! An array field matches a condition when any element does; `equal_position`
//! tightens that at the executor level.

use crate::error::{Error, Result};
use crate::index::FieldIndex;
use crate::ns::Namespace;
use crate::planner::{CondTarget, PlannedCond};
use crate::query::CondOp;
use crate::value::{Payload, RowId, Value};

/// Matching rows for an index-backed condition, ascending and deduplicated.
///
/// The negated flag is ignored here; complementing is the executor's job so
/// that NOT stays bounded to the conjunction's candidate set.
pub fn row_ids(ns: &Namespace, cond: &PlannedCond) -> Result<Vec<RowId>> {
    let CondTarget::Index(slot_pos) = cond.target else {
        return Err(Error::logic("selector asked to index-scan a store field"));
    };
    let slot = ns.slot(slot_pos);
    let index = slot
        .index
        .as_ref()
        .ok_or_else(|| Error::logic(format!("slot '{}' has no runtime index", slot.def.name)))?;

    match cond.cond.op {
        CondOp::Any => Ok(present_rows(index)),
        CondOp::Empty => Ok(complement(&ns.live_ids(), &present_rows(index))),
        op => match index {
            FieldIndex::Hash(idx) => match op {
                CondOp::Eq => Ok(eq_rows(&cond.cond.values[0], |v| idx.lookup_eq(v))),
                CondOp::Set => {
                    let mut out = Vec::new();
                    for value in &cond.cond.values {
                        out.extend(eq_rows(value, |v| idx.lookup_eq(v)));
                    }
                    out.sort_unstable();
                    out.dedup();
                    Ok(out)
                }
                other => Err(Error::logic(format!(
                    "hash index '{}' cannot answer {}",
                    slot.def.name,
                    other.name()
                ))),
            },
            FieldIndex::Tree(idx) => match op {
                CondOp::Eq => Ok(eq_rows(&cond.cond.values[0], |v| idx.lookup_eq(v))),
                CondOp::Set => {
                    let mut out = Vec::new();
                    for value in &cond.cond.values {
                        out.extend(eq_rows(value, |v| idx.lookup_eq(v)));
                    }
                    out.sort_unstable();
                    out.dedup();
                    Ok(out)
                }
                CondOp::Lt => Ok(idx.lookup_lt(&cond.cond.values[0])),
                CondOp::Le => Ok(idx.lookup_le(&cond.cond.values[0])),
                CondOp::Gt => Ok(idx.lookup_gt(&cond.cond.values[0])),
                CondOp::Ge => Ok(idx.lookup_ge(&cond.cond.values[0])),
                CondOp::Range => Ok(idx.lookup_range(&cond.cond.values[0], &cond.cond.values[1])),
                CondOp::Any | CondOp::Empty => unreachable!("handled above"),
            },
            FieldIndex::Fulltext(idx) => match op {
                CondOp::Eq => Ok(idx.match_rows(&cond.cond.values[0])),
                other => Err(Error::logic(format!(
                    "fulltext index '{}' cannot answer {}",
                    slot.def.name,
                    other.name()
                ))),
            },
        },
    }
}

/// Rows whose field is present (non-null): the index minus its `Null`
/// bucket, which dense indexes carry for totality.
fn present_rows(index: &FieldIndex) -> Vec<RowId> {
    let nulls = match index {
        FieldIndex::Hash(idx) => idx.lookup_eq(&Value::Null),
        FieldIndex::Tree(idx) => idx.lookup_eq(&Value::Null),
        FieldIndex::Fulltext(_) => Vec::new(),
    };
    if nulls.is_empty() {
        index.all_rows()
    } else {
        complement(&index.all_rows(), &nulls)
    }
}

/// EQ lookup with the null-never-matches rule applied to the operand.
fn eq_rows(operand: &Value, lookup: impl FnOnce(&Value) -> Vec<RowId>) -> Vec<RowId> {
    if operand.is_null() {
        Vec::new()
    } else {
        lookup(operand)
    }
}

/// Evaluates a condition against one row. The negated flag is ignored.
pub fn matches_payload(cond: &PlannedCond, payload: &Payload) -> bool {
    // Composite: evaluate over the assembled tuple key.
    if cond.positions.len() > 1 {
        let mut parts = Vec::with_capacity(cond.positions.len());
        for &pos in &cond.positions {
            let v = payload.get(pos);
            if v.is_null() {
                return false;
            }
            parts.push(v.clone());
        }
        let key = Value::Tuple(parts);
        return value_matches(cond.cond.op, &cond.cond.values, &key);
    }

    let pos = cond.positions[0];
    let values = payload.field_values(pos);

    match cond.cond.op {
        CondOp::Any => !values.is_empty(),
        CondOp::Empty => values.is_empty(),
        op => values.iter().any(|v| value_matches(op, &cond.cond.values, v)),
    }
}

/// Scalar comparison for one candidate value.
pub fn value_matches(op: CondOp, operands: &[Value], candidate: &Value) -> bool {
    match op {
        CondOp::Eq => operands.first().is_some_and(|o| candidate == o),
        CondOp::Lt => operands.first().is_some_and(|o| candidate < o),
        CondOp::Le => operands.first().is_some_and(|o| candidate <= o),
        CondOp::Gt => operands.first().is_some_and(|o| candidate > o),
        CondOp::Ge => operands.first().is_some_and(|o| candidate >= o),
        CondOp::Range => match operands {
            [lo, hi] => lo <= hi && candidate >= lo && candidate <= hi,
            _ => false,
        },
        CondOp::Set => operands.iter().any(|o| candidate == o),
        CondOp::Any | CondOp::Empty => false,
    }
}

/// Ascending `base` minus ascending `remove`.
pub fn complement(base: &[RowId], remove: &[RowId]) -> Vec<RowId> {
    let mut out = Vec::with_capacity(base.len());
    let mut r = 0;
    for &row in base {
        while r < remove.len() && remove[r] < row {
            r += 1;
        }
        if r < remove.len() && remove[r] == row {
            continue;
        }
        out.push(row);
    }
    out
}

/// Intersection of two ascending row sets.
pub fn intersect(a: &[RowId], b: &[RowId]) -> Vec<RowId> {
    let mut out = Vec::with_capacity(a.len().min(b.len()));
    let (mut i, mut j) = (0, 0);
    while i < a.len() && j < b.len() {
        match a[i].cmp(&b[j]) {
            std::cmp::Ordering::Less => i += 1,
            std::cmp::Ordering::Greater => j += 1,
            std::cmp::Ordering::Equal => {
                out.push(a[i]);
                i += 1;
                j += 1;
            }
        }
    }
    out
}

/// Union of two ascending row sets.
pub fn union(a: &[RowId], b: &[RowId]) -> Vec<RowId> {
    let mut out = Vec::with_capacity(a.len() + b.len());
    let (mut i, mut j) = (0, 0);
    while i < a.len() || j < b.len() {
        let next = match (a.get(i), b.get(j)) {
            (Some(&x), Some(&y)) => {
                if x <= y {
                    if x == y {
                        j += 1;
                    }
                    i += 1;
                    x
                } else {
                    j += 1;
                    y
                }
            }
            (Some(&x), None) => {
                i += 1;
                x
            }
            (None, Some(&y)) => {
                j += 1;
                y
            }
            (None, None) => break,
        };
        out.push(next);
    }
    out
}
