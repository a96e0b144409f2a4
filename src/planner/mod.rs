//! Query planner.
//!
//! Turns the front-end IR into an executable plan against one namespace:
//! resolves field references case-insensitively, coerces operands to the
//! declared field types, rewrites the predicate tree into a bounded
//! disjunction of conjunctions, orders each conjunction by estimated lookup
//! cost and picks sort/distinct strategies.
//!
//! Planning is deterministic: equivalent IRs — whichever front-end produced
//! them — yield identical plans.
//!
//! Float equality in predicates is exact (bitwise, zero tolerance); a double
//! operand matches only rows carrying the identical value after numeric
//! promotion.

use crate::error::{Error, Result};
use crate::ns::Namespace;
use crate::query::{AggKind, CondOp, Condition, JoinSpec, PredicateNode, Query, SortSpec};
use crate::schema::IndexKind;
use crate::value::Value;

/// Upper bound on DNF conjunctions. Above this the planner keeps the original
/// tree and the executor falls back to walking it row-wise.
pub const DNF_BUDGET: usize = 64;

/// Where a planned condition is answered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CondTarget {
    /// A searchable index slot.
    Index(usize),
    /// Row-wise evaluation against stored payloads (store index, unindexed
    /// field, or an operator the index kind cannot answer).
    Scan,
}

/// A resolved, coerced condition.
#[derive(Debug, Clone)]
pub struct PlannedCond {
    /// Condition with the canonical field spelling and coerced operands.
    pub cond: Condition,
    /// Lookup target.
    pub target: CondTarget,
    /// Schema positions of the constituent fields (one for plain fields,
    /// several for composite).
    pub positions: Vec<usize>,
    /// True when the condition is negated within its conjunction.
    pub negated: bool,
    /// Estimated candidate count, used for ordering only.
    pub cost: u64,
}

/// One conjunction of a DNF plan, members ordered for execution.
#[derive(Debug, Clone)]
pub struct Conjunction {
    pub conds: Vec<PlannedCond>,
}

/// A normalized predicate tree for the walk fallback.
#[derive(Debug, Clone)]
pub enum PlannedNode {
    Cond(PlannedCond),
    Not(Box<PlannedNode>),
    And(Vec<PlannedNode>),
    Or(Vec<PlannedNode>),
}

/// Overall shape of the predicate part of a plan.
#[derive(Debug, Clone)]
pub enum PlanShape {
    /// Disjunction of cost-ordered conjunctions.
    Dnf(Vec<Conjunction>),
    /// Tree kept as-is; evaluated row-wise over the live set.
    Walk(PlannedNode),
}

/// One resolved sort key.
#[derive(Debug, Clone)]
pub struct PlannedSort {
    pub field: String,
    pub position: usize,
    pub desc: bool,
}

/// One resolved aggregation.
#[derive(Debug, Clone)]
pub struct PlannedAgg {
    pub field: String,
    pub position: usize,
    pub kind: AggKind,
}

/// The executable plan.
#[derive(Debug)]
pub struct QueryPlan {
    pub shape: PlanShape,
    pub sort: Vec<PlannedSort>,
    /// Tree index slot whose iteration order matches the leading sort key;
    /// lets the executor stream instead of materializing and sorting.
    pub stream_sort: Option<(usize, bool)>,
    /// Distinct key: schema positions whose combined value dedups rows.
    pub distinct: Vec<usize>,
    pub limit: Option<usize>,
    pub offset: usize,
    pub aggregations: Vec<PlannedAgg>,
    pub req_total: bool,
    /// Groups of array-field positions whose matched element must align.
    pub equal_position: Vec<Vec<usize>>,
    /// Joins, re-planned per execution against their own namespace.
    pub joins: Vec<JoinSpec>,
}

/// Plans a query against a namespace.
pub fn plan(ns: &Namespace, query: &Query) -> Result<QueryPlan> {
    let shape = match &query.root {
        None => PlanShape::Dnf(vec![Conjunction { conds: Vec::new() }]),
        Some(root) => {
            let normalized = push_not(root, false);
            let planned = resolve_tree(ns, &normalized)?;
            match to_dnf(&planned) {
                Some(mut conjunctions) if conjunctions.len() <= DNF_BUDGET => {
                    for conj in &mut conjunctions {
                        merge_composite_eq(ns, conj);
                        order_conjunction(ns, conj);
                    }
                    PlanShape::Dnf(conjunctions)
                }
                _ => {
                    tracing::debug!(target: "stratadb", "predicate tree exceeds DNF budget, walking");
                    PlanShape::Walk(planned)
                }
            }
        }
    };

    let mut sort = Vec::with_capacity(query.sort.len());
    for spec in &query.sort {
        sort.push(resolve_sort(ns, spec)?);
    }
    let stream_sort = pick_stream_sort(ns, &sort);

    let mut distinct = Vec::with_capacity(query.distinct.len());
    for field in &query.distinct {
        let pos = ns
            .resolve_field(field)
            .ok_or_else(|| Error::params(format!("unknown distinct field '{field}'")))?;
        distinct.push(pos);
    }

    let mut aggregations = Vec::with_capacity(query.aggregations.len());
    for agg in &query.aggregations {
        let pos = ns
            .resolve_field(&agg.field)
            .ok_or_else(|| Error::params(format!("unknown aggregation field '{}'", agg.field)))?;
        let field = ns.field_def(pos);
        if agg.kind != AggKind::Facet && !field.field_type.is_numeric() {
            return Err(Error::params(format!(
                "{} requires a numeric field, '{}' is {}",
                agg.kind.name(),
                field.name,
                field.field_type.type_name()
            )));
        }
        aggregations.push(PlannedAgg {
            field: field.name.clone(),
            position: pos,
            kind: agg.kind,
        });
    }

    let mut equal_position = Vec::with_capacity(query.equal_position.len());
    for group in &query.equal_position {
        if group.len() < 2 {
            return Err(Error::query("equal_position needs at least two fields"));
        }
        let mut positions = Vec::with_capacity(group.len());
        for field in group {
            let pos = ns
                .resolve_field(field)
                .ok_or_else(|| Error::params(format!("unknown field '{field}' in equal_position")))?;
            if !ns.field_def(pos).array {
                return Err(Error::query(format!(
                    "equal_position requires array fields, '{field}' is scalar"
                )));
            }
            positions.push(pos);
        }
        equal_position.push(positions);
    }

    for join in &query.joins {
        match ns.resolve_index(&join.field) {
            Some(slot) if ns.slot(slot).def.kind == IndexKind::Joined => {}
            _ => {
                return Err(Error::params(format!(
                    "'{}' is not a joined field of '{}'",
                    join.field,
                    ns.name()
                )))
            }
        }
    }

    Ok(QueryPlan {
        shape,
        sort,
        stream_sort,
        distinct,
        limit: query.limit,
        offset: query.offset,
        aggregations,
        req_total: query.req_total,
        equal_position,
        joins: query.joins.clone(),
    })
}

/// Pushes negation down to the leaves (De Morgan), so DNF only ever sees
/// negated conditions, never negated subtrees.
fn push_not(node: &PredicateNode, negate: bool) -> PredicateNode {
    match node {
        PredicateNode::Cond(cond) => {
            let leaf = PredicateNode::Cond(cond.clone());
            if negate {
                PredicateNode::Not(Box::new(leaf))
            } else {
                leaf
            }
        }
        PredicateNode::Not(inner) => push_not(inner, !negate),
        PredicateNode::And(children) => {
            let mapped = children.iter().map(|c| push_not(c, negate)).collect();
            if negate {
                PredicateNode::Or(mapped)
            } else {
                PredicateNode::And(mapped)
            }
        }
        PredicateNode::Or(children) => {
            let mapped = children.iter().map(|c| push_not(c, negate)).collect();
            if negate {
                PredicateNode::And(mapped)
            } else {
                PredicateNode::Or(mapped)
            }
        }
    }
}

/// Resolves every leaf of a not-normalized tree.
fn resolve_tree(ns: &Namespace, node: &PredicateNode) -> Result<PlannedNode> {
    match node {
        PredicateNode::Cond(cond) => Ok(PlannedNode::Cond(resolve_cond(ns, cond, false)?)),
        PredicateNode::Not(inner) => match inner.as_ref() {
            PredicateNode::Cond(cond) => Ok(PlannedNode::Cond(resolve_cond(ns, cond, true)?)),
            other => Ok(PlannedNode::Not(Box::new(resolve_tree(ns, other)?))),
        },
        PredicateNode::And(children) => Ok(PlannedNode::And(
            children
                .iter()
                .map(|c| resolve_tree(ns, c))
                .collect::<Result<Vec<_>>>()?,
        )),
        PredicateNode::Or(children) => Ok(PlannedNode::Or(
            children
                .iter()
                .map(|c| resolve_tree(ns, c))
                .collect::<Result<Vec<_>>>()?,
        )),
    }
}

/// Resolves one condition: binds the field or composite index, coerces
/// operands, validates arity, estimates cost.
fn resolve_cond(ns: &Namespace, cond: &Condition, negated: bool) -> Result<PlannedCond> {
    // Composite spelling or plain index name first, then schema field.
    if let Some(slot_pos) = ns.resolve_index(&cond.field) {
        let slot = ns.slot(slot_pos);
        match slot.def.kind {
            IndexKind::Joined => {
                return Err(Error::params(format!(
                    "joined field '{}' cannot be filtered directly",
                    cond.field
                )))
            }
            IndexKind::Composite => {
                let values = coerce_composite_operands(ns, slot_pos, cond)?;
                validate_arity(cond.op, values.len(), &cond.field)?;
                let index = slot.index.as_ref().ok_or_else(|| {
                    Error::logic(format!("composite slot '{}' has no index", slot.def.name))
                })?;
                let cost = index.lookup_cost(cond.op, &values);
                return Ok(PlannedCond {
                    cond: Condition::new(slot.def.name.clone(), cond.op, values),
                    target: CondTarget::Index(slot_pos),
                    positions: slot.positions.clone(),
                    negated,
                    cost,
                });
            }
            _ => {
                let pos = slot.positions[0];
                let values = coerce_scalar_operands(ns, pos, cond)?;
                validate_arity(cond.op, values.len(), &cond.field)?;
                let canonical = ns.field_def(pos).name.clone();
                let target = cond_target(ns, slot_pos, cond.op);
                let cost = match target {
                    CondTarget::Index(_) => slot
                        .index
                        .as_ref()
                        .ok_or_else(|| {
                            Error::logic(format!("slot '{}' has no runtime index", slot.def.name))
                        })?
                        .lookup_cost(cond.op, &values),
                    CondTarget::Scan => ns.row_count() as u64 + 1,
                };
                return Ok(PlannedCond {
                    cond: Condition::new(canonical, cond.op, values),
                    target,
                    positions: vec![pos],
                    negated,
                    cost,
                });
            }
        }
    }

    // Store field without an index of the same name.
    let pos = ns
        .resolve_field(&cond.field)
        .ok_or_else(|| Error::params(format!("unknown field '{}'", cond.field)))?;
    let values = coerce_scalar_operands(ns, pos, cond)?;
    validate_arity(cond.op, values.len(), &cond.field)?;
    Ok(PlannedCond {
        cond: Condition::new(ns.field_def(pos).name.clone(), cond.op, values),
        target: CondTarget::Scan,
        positions: vec![pos],
        negated,
        cost: ns.row_count() as u64 + 1,
    })
}

/// Decides whether an index slot can answer an operator, falling back to a
/// scan when it cannot (comparisons on hash, anything but EQ on fulltext).
fn cond_target(ns: &Namespace, slot_pos: usize, op: CondOp) -> CondTarget {
    let slot = ns.slot(slot_pos);
    match slot.def.kind {
        IndexKind::Store | IndexKind::Joined => CondTarget::Scan,
        IndexKind::Hash => match op {
            CondOp::Eq | CondOp::Set | CondOp::Any | CondOp::Empty => CondTarget::Index(slot_pos),
            _ => CondTarget::Scan,
        },
        IndexKind::Fulltext => match op {
            CondOp::Eq | CondOp::Any | CondOp::Empty => CondTarget::Index(slot_pos),
            _ => CondTarget::Scan,
        },
        IndexKind::Tree | IndexKind::Composite => CondTarget::Index(slot_pos),
    }
}

fn coerce_scalar_operands(ns: &Namespace, pos: usize, cond: &Condition) -> Result<Vec<Value>> {
    if matches!(cond.op, CondOp::Any | CondOp::Empty) {
        return Ok(Vec::new());
    }
    let field = ns.field_def(pos);
    cond.values
        .iter()
        .map(|v| v.coerce_to(field.field_type))
        .collect()
}

fn coerce_composite_operands(ns: &Namespace, slot_pos: usize, cond: &Condition) -> Result<Vec<Value>> {
    if matches!(cond.op, CondOp::Any | CondOp::Empty) {
        return Ok(Vec::new());
    }
    let slot = ns.slot(slot_pos);
    cond.values
        .iter()
        .map(|operand| {
            let parts = operand.as_tuple().ok_or_else(|| {
                Error::params(format!(
                    "composite '{}' expects tuple operands",
                    slot.def.name
                ))
            })?;
            if parts.len() != slot.positions.len() {
                return Err(Error::params(format!(
                    "composite '{}' expects {}-element tuples, got {}",
                    slot.def.name,
                    slot.positions.len(),
                    parts.len()
                )));
            }
            let coerced = parts
                .iter()
                .zip(&slot.positions)
                .map(|(part, &pos)| part.coerce_to(ns.field_def(pos).field_type))
                .collect::<Result<Vec<_>>>()?;
            Ok(Value::Tuple(coerced))
        })
        .collect()
}

fn validate_arity(op: CondOp, count: usize, field: &str) -> Result<()> {
    let ok = match op {
        CondOp::Eq | CondOp::Lt | CondOp::Le | CondOp::Gt | CondOp::Ge => count == 1,
        CondOp::Range => count == 2,
        CondOp::Set => true,
        CondOp::Any | CondOp::Empty => count == 0,
    };
    if ok {
        Ok(())
    } else {
        Err(Error::params(format!(
            "{} on '{field}' got {count} operand(s)",
            op.name()
        )))
    }
}

/// DNF rewrite over a not-normalized tree. Returns `None` when the rewrite
/// would exceed [`DNF_BUDGET`].
fn to_dnf(node: &PlannedNode) -> Option<Vec<Conjunction>> {
    match node {
        PlannedNode::Cond(cond) => Some(vec![Conjunction {
            conds: vec![cond.clone()],
        }]),
        // push_not leaves Not only around leaves
        PlannedNode::Not(inner) => to_dnf(inner),
        PlannedNode::Or(children) => {
            let mut out = Vec::new();
            for child in children {
                out.extend(to_dnf(child)?);
                if out.len() > DNF_BUDGET {
                    return None;
                }
            }
            Some(out)
        }
        PlannedNode::And(children) => {
            let mut acc = vec![Conjunction { conds: Vec::new() }];
            for child in children {
                let parts = to_dnf(child)?;
                let mut next = Vec::with_capacity(acc.len() * parts.len());
                for base in &acc {
                    for part in &parts {
                        let mut conds = base.conds.clone();
                        conds.extend(part.conds.iter().cloned());
                        next.push(Conjunction { conds });
                        if next.len() > DNF_BUDGET {
                            return None;
                        }
                    }
                }
                acc = next;
            }
            Some(acc)
        }
    }
}

/// Replaces a group of positive EQ conditions fully covering a composite
/// index with one composite EQ on that index.
fn merge_composite_eq(ns: &Namespace, conj: &mut Conjunction) {
    for (slot_pos, slot) in ns.slots().iter().enumerate() {
        if slot.def.kind != IndexKind::Composite {
            continue;
        }
        let mut member_of: Vec<usize> = Vec::with_capacity(slot.positions.len());
        for &field_pos in &slot.positions {
            match conj.conds.iter().position(|c| {
                !c.negated
                    && c.cond.op == CondOp::Eq
                    && c.target != CondTarget::Index(slot_pos)
                    && c.positions.as_slice() == [field_pos]
                    && c.cond.values.len() == 1
            }) {
                Some(i) => member_of.push(i),
                None => {
                    member_of.clear();
                    break;
                }
            }
        }
        if member_of.is_empty() {
            continue;
        }

        let Some(index) = slot.index.as_ref() else {
            continue;
        };
        let parts: Vec<Value> = member_of
            .iter()
            .map(|&i| conj.conds[i].cond.values[0].clone())
            .collect();
        let key = Value::Tuple(parts);
        let cost = index.lookup_cost(CondOp::Eq, std::slice::from_ref(&key));
        let merged = PlannedCond {
            cond: Condition::new(slot.def.name.clone(), CondOp::Eq, vec![key]),
            target: CondTarget::Index(slot_pos),
            positions: slot.positions.clone(),
            negated: false,
            cost,
        };

        let mut drop: Vec<usize> = member_of;
        drop.sort_unstable_by(|a, b| b.cmp(a));
        for i in drop {
            conj.conds.remove(i);
        }
        conj.conds.push(merged);
    }
}

/// Orders conjunction members for execution: pk and composite EQ first, then
/// positive indexed conditions by ascending cost, then negated indexed, then
/// scans, with ANY/EMPTY always last.
fn order_conjunction(ns: &Namespace, conj: &mut Conjunction) {
    let pk_slot = ns.pk_slot();
    conj.conds.sort_by_key(|c| {
        let tier = if matches!(c.cond.op, CondOp::Any | CondOp::Empty) {
            5
        } else if c.negated {
            match c.target {
                CondTarget::Index(_) => 3,
                CondTarget::Scan => 4,
            }
        } else {
            match c.target {
                CondTarget::Index(slot) => {
                    let is_pk_eq = Some(slot) == pk_slot && c.cond.op == CondOp::Eq;
                    let is_composite_eq =
                        ns.slot(slot).def.kind == IndexKind::Composite && c.cond.op == CondOp::Eq;
                    if is_pk_eq || is_composite_eq {
                        0
                    } else {
                        1
                    }
                }
                CondTarget::Scan => 2,
            }
        };
        (tier, c.cost)
    });
}

fn resolve_sort(ns: &Namespace, spec: &SortSpec) -> Result<PlannedSort> {
    let pos = ns
        .resolve_field(&spec.field)
        .ok_or_else(|| Error::params(format!("unknown sort field '{}'", spec.field)))?;
    Ok(PlannedSort {
        field: ns.field_def(pos).name.clone(),
        position: pos,
        desc: spec.desc,
    })
}

/// A single-key sort over a dense tree index on a scalar field can stream in
/// index order instead of materializing and sorting.
fn pick_stream_sort(ns: &Namespace, sort: &[PlannedSort]) -> Option<(usize, bool)> {
    let [only] = sort else { return None };
    let slot_pos = ns.resolve_index(&only.field)?;
    let slot = ns.slot(slot_pos);
    if slot.def.kind != IndexKind::Tree || slot.is_sparse() {
        return None;
    }
    if ns.field_def(slot.positions[0]).array {
        return None;
    }
    Some((slot_pos, only.desc))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ns::Namespace;
    use crate::query::QueryBuilder;
    use crate::schema::{FieldDef, FieldType, IndexDef, NamespaceDef};
    use serde_json::json;

    fn test_ns() -> Namespace {
        let def = NamespaceDef::new("items")
            .field(FieldDef::new("id", FieldType::Int))
            .field(FieldDef::new("year", FieldType::Int))
            .field(FieldDef::new("genre", FieldType::Int64))
            .field(FieldDef::new("age", FieldType::Int))
            .field(FieldDef::new("name", FieldType::String))
            .field(FieldDef::new("packages", FieldType::Int).array())
            .index(IndexDef::new("id", IndexKind::Hash).pk())
            .index(IndexDef::new("year", IndexKind::Tree))
            .index(IndexDef::new("age", IndexKind::Hash))
            .index(IndexDef::composite(&["age", "genre"]))
            .index(IndexDef::new("packages", IndexKind::Hash));
        let mut ns = Namespace::open(def, None).unwrap();
        for i in 0..20 {
            let doc = json!({
                "id": i,
                "year": 2000 + (i % 10),
                "genre": i % 5,
                "age": i % 3,
                "name": format!("n{i}"),
                "packages": [i, i + 100],
            });
            let payload = ns.payload_from_json(&doc).unwrap();
            ns.upsert(payload).unwrap();
        }
        ns
    }

    fn dnf(plan: &QueryPlan) -> &[Conjunction] {
        match &plan.shape {
            PlanShape::Dnf(c) => c,
            PlanShape::Walk(_) => panic!("expected DNF shape"),
        }
    }

    #[test]
    fn test_unknown_field_is_params_error() {
        let ns = test_ns();
        let q = QueryBuilder::new("items").filter("ghost", CondOp::Eq, 1).build();
        let err = plan(&ns, &q).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Params);
    }

    #[test]
    fn test_field_resolution_is_case_insensitive() {
        let ns = test_ns();
        let q = QueryBuilder::new("items").filter("YEAR", CondOp::Eq, 2002).build();
        let p = plan(&ns, &q).unwrap();
        assert_eq!(dnf(&p)[0].conds[0].cond.field, "year");
    }

    #[test]
    fn test_stringified_numeric_operand_coerces() {
        let ns = test_ns();
        let q = QueryBuilder::new("items").filter("year", CondOp::Gt, "2016").build();
        let p = plan(&ns, &q).unwrap();
        assert_eq!(dnf(&p)[0].conds[0].cond.values[0], Value::Int(2016));
    }

    #[test]
    fn test_numeric_operand_on_string_field_rejected() {
        let ns = test_ns();
        let q = QueryBuilder::new("items").filter("name", CondOp::Eq, 5).build();
        assert!(plan(&ns, &q).is_err());
    }

    #[test]
    fn test_pk_eq_ordered_first() {
        let ns = test_ns();
        let q = QueryBuilder::new("items")
            .filter("year", CondOp::Gt, 2001)
            .filter("id", CondOp::Eq, 3)
            .build();
        let p = plan(&ns, &q).unwrap();
        assert_eq!(dnf(&p)[0].conds[0].cond.field, "id");
    }

    #[test]
    fn test_covering_composite_merges_eq_pair() {
        let ns = test_ns();
        let q = QueryBuilder::new("items")
            .filter("year", CondOp::Gt, 2001)
            .filter("genre", CondOp::Eq, 4i64)
            .filter("age", CondOp::Eq, 1)
            .build();
        let p = plan(&ns, &q).unwrap();
        let conj = &dnf(&p)[0];
        // age and genre collapse into the composite; year survives
        assert_eq!(conj.conds.len(), 2);
        assert_eq!(conj.conds[0].cond.field, "age+genre");
        assert_eq!(
            conj.conds[0].cond.values[0],
            Value::Tuple(vec![Value::Int(1), Value::Int64(4)])
        );
    }

    #[test]
    fn test_any_empty_deferred_last() {
        let ns = test_ns();
        let q = QueryBuilder::new("items")
            .filter("packages", CondOp::Any, Vec::<Value>::new())
            .filter("year", CondOp::Eq, 2002)
            .build();
        let p = plan(&ns, &q).unwrap();
        let conj = &dnf(&p)[0];
        assert_eq!(conj.conds.last().unwrap().cond.op, CondOp::Any);
    }

    #[test]
    fn test_or_produces_two_conjunctions() {
        let ns = test_ns();
        let q = QueryBuilder::new("items")
            .filter("year", CondOp::Le, 2016)
            .or()
            .filter("genre", CondOp::Lt, 5i64)
            .build();
        let p = plan(&ns, &q).unwrap();
        assert_eq!(dnf(&p).len(), 2);
    }

    #[test]
    fn test_and_of_or_distributes() {
        let ns = test_ns();
        let q = QueryBuilder::new("items")
            .filter("age", CondOp::Eq, 1)
            .filter("year", CondOp::Eq, 2002)
            .or()
            .filter("year", CondOp::Eq, 2003)
            .build();
        let p = plan(&ns, &q).unwrap();
        assert_eq!(dnf(&p).len(), 2);
        for conj in dnf(&p) {
            assert_eq!(conj.conds.len(), 2);
        }
    }

    #[test]
    fn test_sort_stream_picked_for_tree_index() {
        let ns = test_ns();
        let q = QueryBuilder::new("items").sort("year", true).build();
        let p = plan(&ns, &q).unwrap();
        let (slot, desc) = p.stream_sort.unwrap();
        assert_eq!(ns.slot(slot).def.name, "year");
        assert!(desc);
    }

    #[test]
    fn test_multi_key_sort_materializes() {
        let ns = test_ns();
        let q = QueryBuilder::new("items")
            .sort("year", true)
            .sort("name", false)
            .build();
        let p = plan(&ns, &q).unwrap();
        assert!(p.stream_sort.is_none());
        assert_eq!(p.sort.len(), 2);
    }

    #[test]
    fn test_equal_position_on_scalar_is_query_error() {
        let ns = test_ns();
        let q = QueryBuilder::new("items")
            .filter("packages", CondOp::Ge, 5)
            .equal_position(&["packages", "year"])
            .build();
        let err = plan(&ns, &q).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Query);
    }

    #[test]
    fn test_sum_on_string_field_rejected() {
        let ns = test_ns();
        let q = QueryBuilder::new("items").aggregate("name", AggKind::Sum).build();
        assert!(plan(&ns, &q).is_err());
    }

    #[test]
    fn test_range_arity_enforced() {
        let ns = test_ns();
        let q = QueryBuilder::new("items")
            .filter("year", CondOp::Range, vec![2001])
            .build();
        assert!(plan(&ns, &q).is_err());
    }

    #[test]
    fn test_composite_operand_tuple_coerced() {
        let ns = test_ns();
        let q = QueryBuilder::new("items")
            .filter(
                "age+genre",
                CondOp::Eq,
                Value::Tuple(vec![Value::Int(3), Value::Int(5)]),
            )
            .build();
        let p = plan(&ns, &q).unwrap();
        let cond = &dnf(&p)[0].conds[0];
        // genre element widened to the declared int64
        assert_eq!(
            cond.cond.values[0],
            Value::Tuple(vec![Value::Int(3), Value::Int64(5)])
        );
    }

    #[test]
    fn test_dnf_budget_falls_back_to_walk() {
        let ns = test_ns();
        // seven ANDed OR-pairs distribute into 128 conjunctions, past the budget
        let pair = |a: i32, b: i32| {
            PredicateNode::Or(vec![
                PredicateNode::Cond(Condition::new("year", CondOp::Eq, vec![Value::Int(a)])),
                PredicateNode::Cond(Condition::new("year", CondOp::Eq, vec![Value::Int(b)])),
            ])
        };
        let mut q = Query::new("items");
        q.root = Some(PredicateNode::And(
            (0..7).map(|i| pair(2000 + i, 2010 + i)).collect(),
        ));
        let p = plan(&ns, &q).unwrap();
        assert!(matches!(p.shape, PlanShape::Walk(_)));
    }

    #[test]
    fn test_not_over_group_demorgans_into_dnf() {
        let ns = test_ns();
        let mut q = Query::new("items");
        q.root = Some(PredicateNode::Not(Box::new(PredicateNode::And(vec![
            PredicateNode::Cond(Condition::new("year", CondOp::Eq, vec![Value::Int(2002)])),
            PredicateNode::Cond(Condition::new("age", CondOp::Eq, vec![Value::Int(1)])),
        ]))));
        let p = plan(&ns, &q).unwrap();
        // NOT (a AND b) => (NOT a) OR (NOT b): two single-member conjunctions
        let conjunctions = dnf(&p);
        assert_eq!(conjunctions.len(), 2);
        assert!(conjunctions.iter().all(|c| c.conds.len() == 1 && c.conds[0].negated));
    }

    #[test]
    fn test_equivalent_front_end_irs_plan_identically() {
        let ns = test_ns();
        let built = QueryBuilder::new("items")
            .filter("year", CondOp::Gt, 2016)
            .filter("genre", CondOp::Set, vec![1i64, 2, 3])
            .sort("year", true)
            .build();
        let dsl = crate::query::dsl_from_json(
            r#"{
                "namespace": "items",
                "filters": [
                    {"field": "YEAR", "cond": "GT", "value": "2016"},
                    {"field": "genre", "cond": "SET", "value": ["1", "2", "3"]}
                ],
                "sort": {"field": "year", "desc": true}
            }"#,
        )
        .unwrap();

        let p1 = plan(&ns, &built).unwrap();
        let p2 = plan(&ns, &dsl).unwrap();
        let c1 = dnf(&p1);
        let c2 = dnf(&p2);
        assert_eq!(c1.len(), c2.len());
        for (a, b) in c1[0].conds.iter().zip(c2[0].conds.iter()) {
            assert_eq!(a.cond, b.cond);
            assert_eq!(a.target, b.target);
        }
    }
}
