//! Query executor.
//!
//! Drives a plan against one namespace: merges selector row sets per the
//! boolean shape, applies the equal-position constraint, computes
//! aggregations over the full matching set, then sorts, dedups, offsets and
//! limits the returned rows.
//!
//! Ordering of the result is row-id ascending unless a sort was requested.
//! `req_total` is the matched count before limit/offset. The cancellation
//! context is observed between index-merge steps and between row batches.

mod aggregate;
mod context;

pub use aggregate::{AggregationResult, FacetBucket};
pub use context::QueryContext;

use std::collections::HashSet;

use crate::error::Result;
use crate::ns::Namespace;
use crate::planner::{CondTarget, Conjunction, PlanShape, PlannedCond, PlannedNode, QueryPlan};
use crate::query::CondOp;
use crate::selector;
use crate::value::{Payload, RowId, Value};

/// Rows observed per cancellation checkpoint on scan paths.
const SCAN_BATCH: usize = 1024;

/// What the executor hands back to the database facade.
#[derive(Debug)]
pub struct ExecOutput {
    /// Materialized rows in final order, after sort/distinct/offset/limit.
    pub items: Vec<(RowId, Payload)>,
    /// Matched-row count before limit/offset (always computed; surfaced when
    /// `req_total` was requested).
    pub total: usize,
    /// Aggregations in request order.
    pub aggregations: Vec<AggregationResult>,
}

/// Executes a plan. The caller holds the namespace read lock.
pub fn execute(ns: &Namespace, plan: &QueryPlan, ctx: &QueryContext) -> Result<ExecOutput> {
    let mut matched = match &plan.shape {
        PlanShape::Dnf(conjunctions) => {
            let mut acc: Vec<RowId> = Vec::new();
            for conjunction in conjunctions {
                ctx.check()?;
                let rows = run_conjunction(ns, conjunction, ctx)?;
                acc = selector::union(&acc, &rows);
            }
            acc
        }
        PlanShape::Walk(tree) => {
            let mut out = Vec::new();
            for (seen, (row, payload)) in ns.rows().enumerate() {
                if seen % SCAN_BATCH == 0 {
                    ctx.check()?;
                }
                if eval_node(tree, payload) {
                    out.push(row);
                }
            }
            out
        }
    };

    if !plan.equal_position.is_empty() {
        filter_equal_position(ns, plan, &mut matched);
    }

    let total = matched.len();

    let aggregations = if plan.aggregations.is_empty() {
        Vec::new()
    } else {
        aggregate::run(ns, &plan.aggregations, &matched)
    };

    let ordered = order_rows(ns, plan, matched);

    let deduped = match plan.distinct.is_empty() {
        true => ordered,
        false => dedup_by_fields(ns, &plan.distinct, ordered),
    };

    let mut items = Vec::new();
    let end = plan
        .limit
        .map_or(deduped.len(), |l| (plan.offset + l).min(deduped.len()));
    for (seen, &row) in deduped
        .iter()
        .take(end)
        .skip(plan.offset.min(deduped.len()))
        .enumerate()
    {
        if seen % SCAN_BATCH == 0 {
            ctx.check()?;
        }
        // A row deleted between merge and materialization is a tombstone.
        if let Some(payload) = ns.row(row) {
            items.push((row, payload.clone()));
        }
    }

    Ok(ExecOutput {
        items,
        total,
        aggregations,
    })
}

/// Merges one conjunction into its matching row set.
///
/// Positive indexed members intersect in plan order; negated members
/// complement against the conjunction's current candidate set — against the
/// full live set only when nothing narrowed it first. Scan members filter
/// row-wise.
fn run_conjunction(ns: &Namespace, conjunction: &Conjunction, ctx: &QueryContext) -> Result<Vec<RowId>> {
    let mut candidates: Option<Vec<RowId>> = None;
    for cond in &conjunction.conds {
        ctx.check()?;
        match cond.target {
            CondTarget::Index(_) => {
                let rows = selector::row_ids(ns, cond)?;
                candidates = Some(match (candidates, cond.negated) {
                    (None, false) => rows,
                    (None, true) => selector::complement(&ns.live_ids(), &rows),
                    (Some(current), false) => selector::intersect(&current, &rows),
                    (Some(current), true) => selector::complement(&current, &rows),
                });
            }
            CondTarget::Scan => {
                let base = match candidates {
                    Some(current) => current,
                    None => ns.live_ids(),
                };
                let filtered = base
                    .into_iter()
                    .filter(|&row| {
                        ns.row(row)
                            .map(|payload| selector::matches_payload(cond, payload) != cond.negated)
                            .unwrap_or(false)
                    })
                    .collect();
                candidates = Some(filtered);
            }
        }
    }
    Ok(candidates.unwrap_or_else(|| ns.live_ids()))
}

/// Evaluates the walk-fallback tree against one row.
fn eval_node(node: &PlannedNode, payload: &Payload) -> bool {
    match node {
        PlannedNode::Cond(cond) => selector::matches_payload(cond, payload) != cond.negated,
        PlannedNode::Not(inner) => !eval_node(inner, payload),
        PlannedNode::And(children) => children.iter().all(|c| eval_node(c, payload)),
        PlannedNode::Or(children) => children.iter().any(|c| eval_node(c, payload)),
    }
}

/// Keeps rows where some single element index satisfies, per aligned field,
/// every positive condition the plan places on that field.
fn filter_equal_position(ns: &Namespace, plan: &QueryPlan, rows: &mut Vec<RowId>) {
    let mut groups: Vec<Vec<(usize, Vec<&PlannedCond>)>> = Vec::with_capacity(plan.equal_position.len());
    for positions in &plan.equal_position {
        let group = positions
            .iter()
            .map(|&pos| (pos, conds_on_position(plan, pos)))
            .collect();
        groups.push(group);
    }

    rows.retain(|&row| {
        let Some(payload) = ns.row(row) else {
            return false;
        };
        groups.iter().all(|group| aligned(payload, group))
    });
}

fn conds_on_position<'a>(plan: &'a QueryPlan, pos: usize) -> Vec<&'a PlannedCond> {
    let mut out = Vec::new();
    match &plan.shape {
        PlanShape::Dnf(conjunctions) => {
            for conjunction in conjunctions {
                for cond in &conjunction.conds {
                    if aligns_with(cond, pos) {
                        out.push(cond);
                    }
                }
            }
        }
        PlanShape::Walk(tree) => collect_leaves(tree, pos, &mut out),
    }
    out
}

fn collect_leaves<'a>(node: &'a PlannedNode, pos: usize, out: &mut Vec<&'a PlannedCond>) {
    match node {
        PlannedNode::Cond(cond) => {
            if aligns_with(cond, pos) {
                out.push(cond);
            }
        }
        PlannedNode::Not(inner) => collect_leaves(inner, pos, out),
        PlannedNode::And(children) | PlannedNode::Or(children) => {
            for child in children {
                collect_leaves(child, pos, out);
            }
        }
    }
}

fn aligns_with(cond: &PlannedCond, pos: usize) -> bool {
    !cond.negated
        && cond.positions.as_slice() == [pos]
        && !matches!(cond.cond.op, CondOp::Any | CondOp::Empty)
}

fn aligned(payload: &Payload, group: &[(usize, Vec<&PlannedCond>)]) -> bool {
    let element_lists: Vec<Vec<&Value>> = group
        .iter()
        .map(|(pos, _)| payload.field_values(*pos))
        .collect();
    let Some(min_len) = element_lists.iter().map(Vec::len).min() else {
        return true;
    };
    (0..min_len).any(|i| {
        group.iter().zip(&element_lists).all(|((_, conds), elements)| {
            conds
                .iter()
                .all(|cond| selector::value_matches(cond.cond.op, &cond.cond.values, elements[i]))
        })
    })
}

/// Applies the plan's ordering: stream from a tree index when the planner
/// chose one, otherwise a stable materialized sort; row-id order when no sort
/// was requested — except that a bare fulltext match orders by descending
/// score.
fn order_rows(ns: &Namespace, plan: &QueryPlan, matched: Vec<RowId>) -> Vec<RowId> {
    if plan.sort.is_empty() {
        if let Some(scored) = fulltext_score_order(ns, plan, &matched) {
            return scored;
        }
        return matched;
    }

    if let Some((slot_pos, desc)) = plan.stream_sort {
        if let Some(tree) = ns.slot(slot_pos).index.as_ref().and_then(|i| i.as_tree()) {
            let mut member: HashSet<RowId> = matched.iter().copied().collect();
            let mut in_index = Vec::with_capacity(member.len());
            let mut visit = |rows: &[RowId]| {
                for &row in rows {
                    if member.remove(&row) {
                        in_index.push(row);
                    }
                }
            };
            if desc {
                for (_, rows) in tree.iter_rev() {
                    visit(rows);
                }
            } else {
                for (_, rows) in tree.iter() {
                    visit(rows);
                }
            }
            // A dense tree streams its Null bucket first (BTreeMap order),
            // which already places null rows below every value. Anything left
            // in `member` is absent from the index entirely; give it the same
            // null position.
            let mut nulls: Vec<RowId> = member.into_iter().collect();
            nulls.sort_unstable();
            return if desc {
                in_index.extend(nulls);
                in_index
            } else {
                nulls.extend(in_index);
                nulls
            };
        }
    }

    let mut keyed: Vec<(Vec<Value>, RowId)> = matched
        .into_iter()
        .map(|row| {
            let keys = ns.row(row).map_or_else(Vec::new, |payload| {
                plan.sort
                    .iter()
                    .map(|s| payload.get(s.position).clone())
                    .collect()
            });
            (keys, row)
        })
        .collect();
    keyed.sort_by(|(a, _), (b, _)| {
        for (i, spec) in plan.sort.iter().enumerate() {
            let ord = a[i].cmp(&b[i]);
            let ord = if spec.desc { ord.reverse() } else { ord };
            if ord != std::cmp::Ordering::Equal {
                return ord;
            }
        }
        std::cmp::Ordering::Equal
    });
    keyed.into_iter().map(|(_, row)| row).collect()
}

/// When the whole predicate is one positive fulltext EQ, results follow the
/// index's score order (descending, row-id ascending on ties) instead of
/// row-id order.
fn fulltext_score_order(ns: &Namespace, plan: &QueryPlan, matched: &[RowId]) -> Option<Vec<RowId>> {
    let PlanShape::Dnf(conjunctions) = &plan.shape else {
        return None;
    };
    let [conjunction] = conjunctions.as_slice() else {
        return None;
    };
    let [cond] = conjunction.conds.as_slice() else {
        return None;
    };
    if cond.negated || cond.cond.op != CondOp::Eq {
        return None;
    }
    let CondTarget::Index(slot_pos) = cond.target else {
        return None;
    };
    let fulltext = ns.slot(slot_pos).index.as_ref()?.as_fulltext()?;

    let member: HashSet<RowId> = matched.iter().copied().collect();
    Some(
        fulltext
            .matches(cond.cond.values.first()?)
            .into_iter()
            .map(|(row, _)| row)
            .filter(|row| member.contains(row))
            .collect(),
    )
}

/// Keeps the first row per combined distinct-field value.
fn dedup_by_fields(ns: &Namespace, positions: &[usize], ordered: Vec<RowId>) -> Vec<RowId> {
    let mut seen: HashSet<Vec<Value>> = HashSet::new();
    let mut out = Vec::with_capacity(ordered.len());
    for row in ordered {
        let Some(payload) = ns.row(row) else { continue };
        let key: Vec<Value> = positions.iter().map(|&p| payload.get(p).clone()).collect();
        if seen.insert(key) {
            out.push(row);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::planner;
    use crate::query::{CondOp, QueryBuilder};
    use crate::schema::{FieldDef, FieldType, IndexDef, IndexKind, NamespaceDef};
    use serde_json::json;

    fn test_ns() -> Namespace {
        let def = NamespaceDef::new("items")
            .field(FieldDef::new("id", FieldType::Int))
            .field(FieldDef::new("year", FieldType::Int))
            .field(FieldDef::new("genre", FieldType::Int64))
            .field(FieldDef::new("name", FieldType::String))
            .field(FieldDef::new("packages", FieldType::Int).array())
            .field(FieldDef::new("price_id", FieldType::Int).array())
            .index(IndexDef::new("id", IndexKind::Hash).pk())
            .index(IndexDef::new("year", IndexKind::Tree))
            .index(IndexDef::new("genre", IndexKind::Hash))
            .index(IndexDef::new("packages", IndexKind::Hash));
        Namespace::open(def, None).unwrap()
    }

    fn upsert(ns: &mut Namespace, doc: serde_json::Value) -> RowId {
        let payload = ns.payload_from_json(&doc).unwrap();
        ns.upsert(payload).unwrap().0
    }

    fn run(ns: &Namespace, q: &crate::query::Query) -> ExecOutput {
        let plan = planner::plan(ns, q).unwrap();
        execute(ns, &plan, &QueryContext::new()).unwrap()
    }

    fn ids(out: &ExecOutput) -> Vec<RowId> {
        out.items.iter().map(|(row, _)| *row).collect()
    }

    #[test]
    fn test_eq_and_not() {
        let mut ns = test_ns();
        upsert(&mut ns, json!({"id": 1, "year": 2001, "name": "blabla"}));
        upsert(&mut ns, json!({"id": 2, "year": 2002, "name": "sss"}));

        let q = QueryBuilder::new("items").filter("year", CondOp::Eq, 2002).build();
        assert_eq!(ids(&run(&ns, &q)).len(), 1);

        let q = QueryBuilder::new("items")
            .filter("year", CondOp::Eq, 2002)
            .not()
            .filter("name", CondOp::Eq, "sss")
            .build();
        assert!(ids(&run(&ns, &q)).is_empty());
    }

    #[test]
    fn test_lone_not_complements_live_set() {
        let mut ns = test_ns();
        for i in 0..10 {
            upsert(&mut ns, json!({"id": i, "genre": i % 2}));
        }
        let q = QueryBuilder::new("items")
            .not()
            .filter("genre", CondOp::Eq, 0i64)
            .build();
        assert_eq!(ids(&run(&ns, &q)).len(), 5);
    }

    #[test]
    fn test_or_unions_conjunctions() {
        let mut ns = test_ns();
        upsert(&mut ns, json!({"id": 1, "year": 2001, "genre": 1}));
        upsert(&mut ns, json!({"id": 2, "year": 2015, "genre": 2}));
        upsert(&mut ns, json!({"id": 3, "year": 2020, "genre": 3}));

        let q = QueryBuilder::new("items")
            .filter("year", CondOp::Lt, 2010)
            .or()
            .filter("genre", CondOp::Eq, 3i64)
            .build();
        assert_eq!(ids(&run(&ns, &q)).len(), 2);
    }

    #[test]
    fn test_sort_desc_with_limit_after_sort() {
        let mut ns = test_ns();
        for i in 0..50 {
            upsert(&mut ns, json!({"id": i, "year": 2000 + i}));
        }
        let q = QueryBuilder::new("items")
            .filter("year", CondOp::Range, vec![2010, 2020])
            .sort("year", true)
            .limit(5)
            .build();
        let out = run(&ns, &q);
        assert_eq!(out.items.len(), 5);
        let years: Vec<i64> = out
            .items
            .iter()
            .map(|(_, p)| p.get(1).as_int().unwrap())
            .collect();
        assert_eq!(years, vec![2020, 2019, 2018, 2017, 2016]);
        assert_eq!(out.total, 11);
    }

    #[test]
    fn test_offset_applies_after_sort() {
        let mut ns = test_ns();
        for i in 0..10 {
            upsert(&mut ns, json!({"id": i, "year": 2000 + i}));
        }
        let q = QueryBuilder::new("items")
            .sort("year", false)
            .offset(3)
            .limit(2)
            .build();
        let out = run(&ns, &q);
        let years: Vec<i64> = out
            .items
            .iter()
            .map(|(_, p)| p.get(1).as_int().unwrap())
            .collect();
        assert_eq!(years, vec![2003, 2004]);
    }

    #[test]
    fn test_multi_key_sort_is_stable() {
        let mut ns = test_ns();
        upsert(&mut ns, json!({"id": 1, "year": 2000, "name": "b"}));
        upsert(&mut ns, json!({"id": 2, "year": 2000, "name": "a"}));
        upsert(&mut ns, json!({"id": 3, "year": 1999, "name": "z"}));

        let q = QueryBuilder::new("items")
            .sort("year", true)
            .sort("name", false)
            .build();
        let out = run(&ns, &q);
        let names: Vec<&str> = out
            .items
            .iter()
            .map(|(_, p)| p.get(3).as_str().unwrap())
            .collect();
        assert_eq!(names, vec!["a", "b", "z"]);
    }

    #[test]
    fn test_distinct_keeps_first_per_value() {
        let mut ns = test_ns();
        upsert(&mut ns, json!({"id": 1, "year": 2000}));
        upsert(&mut ns, json!({"id": 2, "year": 2000}));
        upsert(&mut ns, json!({"id": 3, "year": 2001}));

        let q = QueryBuilder::new("items").distinct("year").build();
        let out = run(&ns, &q);
        assert_eq!(out.items.len(), 2);
        assert_eq!(out.total, 3);
    }

    #[test]
    fn test_aggregations_ignore_limit() {
        let mut ns = test_ns();
        for i in 0..10 {
            upsert(&mut ns, json!({"id": i, "year": 2000 + i, "genre": 1}));
        }
        let q = QueryBuilder::new("items")
            .filter("genre", CondOp::Eq, 1i64)
            .limit(3)
            .aggregate("year", crate::query::AggKind::Sum)
            .build();
        let out = run(&ns, &q);
        assert_eq!(out.items.len(), 3);
        // sum covers all ten matching rows, not the limited three
        let expected: f64 = (0..10).map(|i| 2000.0 + i as f64).sum();
        assert_eq!(out.aggregations[0].value, expected);
    }

    #[test]
    fn test_set_on_array_field() {
        let mut ns = test_ns();
        upsert(&mut ns, json!({"id": 1, "packages": [10, 20]}));
        upsert(&mut ns, json!({"id": 2, "packages": [30]}));
        upsert(&mut ns, json!({"id": 3, "packages": []}));

        let q = QueryBuilder::new("items")
            .filter("packages", CondOp::Set, vec![20, 30])
            .build();
        assert_eq!(ids(&run(&ns, &q)).len(), 2);
    }

    #[test]
    fn test_any_and_empty_on_array_field() {
        let mut ns = test_ns();
        upsert(&mut ns, json!({"id": 1, "packages": [10]}));
        upsert(&mut ns, json!({"id": 2, "packages": []}));
        upsert(&mut ns, json!({"id": 3}));

        let any = QueryBuilder::new("items")
            .filter("packages", CondOp::Any, Vec::<Value>::new())
            .build();
        assert_eq!(ids(&run(&ns, &any)), vec![0]);

        let empty = QueryBuilder::new("items")
            .filter("packages", CondOp::Empty, Vec::<Value>::new())
            .build();
        assert_eq!(ids(&run(&ns, &empty)), vec![1, 2]);
    }

    #[test]
    fn test_equal_position_alignment() {
        let mut ns = test_ns();
        // element 1 satisfies both conditions in row 1 only
        upsert(&mut ns, json!({"id": 1, "packages": [1, 9], "price_id": [50, 200]}));
        upsert(&mut ns, json!({"id": 2, "packages": [9, 1], "price_id": [50, 200]}));

        let q = QueryBuilder::new("items")
            .filter("packages", CondOp::Ge, 5)
            .filter("price_id", CondOp::Ge, 100)
            .equal_position(&["packages", "price_id"])
            .build();
        assert_eq!(ids(&run(&ns, &q)), vec![0]);
    }

    #[test]
    fn test_bare_fulltext_match_orders_by_score() {
        let def = NamespaceDef::new("ft")
            .field(FieldDef::new("id", FieldType::Int))
            .field(FieldDef::new("description", FieldType::String))
            .index(IndexDef::new("id", IndexKind::Hash).pk())
            .index(IndexDef::new("description", IndexKind::Fulltext));
        let mut ns = Namespace::open(def, None).unwrap();
        // prefix match first in row order, exact token second
        upsert(&mut ns, json!({"id": 1, "description": "moonlight sonata"}));
        upsert(&mut ns, json!({"id": 2, "description": "dark side of the moon"}));

        let q = QueryBuilder::new("ft")
            .filter("description", CondOp::Eq, "moon")
            .build();
        let out = run(&ns, &q);
        // exact token outranks the prefix hit despite the higher row-id
        assert_eq!(ids(&out), vec![1, 0]);
    }

    #[test]
    fn test_walk_fallback_matches_dnf_semantics() {
        use crate::query::{Condition, PredicateNode, Query};

        let mut ns = test_ns();
        for i in 0..40 {
            upsert(&mut ns, json!({"id": i, "year": 2000 + (i % 16), "genre": i % 4}));
        }

        // seven ANDed OR-pairs force the walk fallback
        let pair = |a: i64, b: i64| {
            PredicateNode::Or(vec![
                PredicateNode::Cond(Condition::new("year", CondOp::Ge, vec![Value::Int64(a)])),
                PredicateNode::Cond(Condition::new("year", CondOp::Le, vec![Value::Int64(b)])),
            ])
        };
        let mut wide = Query::new("items");
        wide.root = Some(PredicateNode::And((0..7).map(|_| pair(2004, 2010)).collect()));
        let plan = planner::plan(&ns, &wide).unwrap();
        assert!(matches!(plan.shape, crate::planner::PlanShape::Walk(_)));

        // (year >= 2004 OR year <= 2010) is a tautology over this data
        let out = execute(&ns, &plan, &QueryContext::new()).unwrap();
        assert_eq!(out.total, 40);
    }

    #[test]
    fn test_cancelled_context_aborts() {
        let mut ns = test_ns();
        upsert(&mut ns, json!({"id": 1, "year": 2000}));
        let q = QueryBuilder::new("items").filter("year", CondOp::Eq, 2000).build();
        let plan = planner::plan(&ns, &q).unwrap();

        let token = std::sync::Arc::new(std::sync::atomic::AtomicBool::new(true));
        let ctx = QueryContext::new().with_cancel_token(token);
        assert!(execute(&ns, &plan, &ctx).is_err());
    }

    #[test]
    fn test_req_total_counts_before_limit() {
        let mut ns = test_ns();
        for i in 0..20 {
            upsert(&mut ns, json!({"id": i, "year": 2000}));
        }
        let q = QueryBuilder::new("items")
            .filter("year", CondOp::Eq, 2000)
            .limit(4)
            .req_total()
            .build();
        let out = run(&ns, &q);
        assert_eq!(out.items.len(), 4);
        assert_eq!(out.total, 20);
    }
}
