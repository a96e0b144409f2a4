//! Fluent query builder.
//!
//! The order of `filter` calls fixes predicate order within the implicit AND;
//! `or()` between two filters makes them siblings under an OR node; `not()`
//! attaches to the next filter.

use super::ir::{AggKind, CondOp, Condition, JoinSpec, PredicateNode, Query, SortSpec};
use crate::value::Value;

/// Anything usable as a filter operand list.
pub trait IntoOperands {
    fn into_operands(self) -> Vec<Value>;
}

impl IntoOperands for Value {
    fn into_operands(self) -> Vec<Value> {
        vec![self]
    }
}

impl IntoOperands for Vec<Value> {
    fn into_operands(self) -> Vec<Value> {
        self
    }
}

macro_rules! scalar_operand {
    ($($t:ty),*) => {
        $(
            impl IntoOperands for $t {
                fn into_operands(self) -> Vec<Value> {
                    vec![Value::from(self)]
                }
            }
            impl IntoOperands for Vec<$t> {
                fn into_operands(self) -> Vec<Value> {
                    self.into_iter().map(Value::from).collect()
                }
            }
        )*
    };
}

scalar_operand!(bool, i32, i64, f64, &str, String);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EntryOp {
    And,
    Or,
}

#[derive(Debug)]
struct Entry {
    op: EntryOp,
    negated: bool,
    cond: Condition,
}

/// Builds a [`Query`] through method chaining.
#[derive(Debug)]
pub struct QueryBuilder {
    query: Query,
    entries: Vec<Entry>,
    next_or: bool,
    next_not: bool,
}

impl QueryBuilder {
    /// Starts a query against a namespace.
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            query: Query::new(namespace),
            entries: Vec::new(),
            next_or: false,
            next_not: false,
        }
    }

    /// Adds a predicate. Consecutive filters AND together unless split by
    /// [`or`](Self::or).
    pub fn filter(mut self, field: impl Into<String>, op: CondOp, operand: impl IntoOperands) -> Self {
        let entry = Entry {
            op: if self.next_or { EntryOp::Or } else { EntryOp::And },
            negated: self.next_not,
            cond: Condition::new(field, op, operand.into_operands()),
        };
        self.next_or = false;
        self.next_not = false;
        self.entries.push(entry);
        self
    }

    /// Makes the previous and the next filter siblings under an OR node.
    pub fn or(mut self) -> Self {
        self.next_or = true;
        self
    }

    /// Negates the next filter.
    pub fn not(mut self) -> Self {
        self.next_not = true;
        self
    }

    /// Adds a sort key. Repeated calls append further keys.
    pub fn sort(mut self, field: impl Into<String>, desc: bool) -> Self {
        self.query.sort.push(SortSpec {
            field: field.into(),
            desc,
        });
        self
    }

    /// Requests distinct rows over a field. An empty name is ignored, which
    /// lets callers thread an optional distinct through unconditionally.
    pub fn distinct(mut self, field: impl Into<String>) -> Self {
        let field = field.into();
        if !field.is_empty() {
            self.query.distinct.push(field);
        }
        self
    }

    /// Caps the number of returned rows.
    pub fn limit(mut self, limit: usize) -> Self {
        self.query.limit = Some(limit);
        self
    }

    /// Skips rows after sort and distinct.
    pub fn offset(mut self, offset: usize) -> Self {
        self.query.offset = offset;
        self
    }

    /// Requests the matched-row count before limit.
    pub fn req_total(mut self) -> Self {
        self.query.req_total = true;
        self
    }

    /// Requests an aggregation over the full matching set.
    pub fn aggregate(mut self, field: impl Into<String>, kind: AggKind) -> Self {
        self.query.aggregations.push(super::ir::AggSpec {
            field: field.into(),
            kind,
        });
        self
    }

    /// Requires the matched element index to align across the listed array
    /// fields.
    pub fn equal_position(mut self, fields: &[&str]) -> Self {
        self.query
            .equal_position
            .push(fields.iter().map(|f| f.to_string()).collect());
        self
    }

    /// Attaches a left-outer join executed per result row.
    pub fn join(mut self, field: impl Into<String>, query: Query, on: Vec<(String, String)>) -> Self {
        self.query.joins.push(JoinSpec {
            field: field.into(),
            query,
            on,
        });
        self
    }

    /// Finishes the chain, producing the IR.
    pub fn build(mut self) -> Query {
        self.query.root = fold_entries(self.entries);
        self.query
    }
}

/// Folds the filter sequence into a predicate tree.
///
/// An OR entry joins the previous sibling into an OR group; chained ORs
/// extend the same group. Everything else is ANDed.
fn fold_entries(entries: Vec<Entry>) -> Option<PredicateNode> {
    let mut siblings: Vec<PredicateNode> = Vec::new();
    for entry in entries {
        let mut node = PredicateNode::Cond(entry.cond);
        if entry.negated {
            node = PredicateNode::Not(Box::new(node));
        }
        if entry.op == EntryOp::Or {
            match siblings.pop() {
                Some(PredicateNode::Or(mut group)) => {
                    group.push(node);
                    siblings.push(PredicateNode::Or(group));
                }
                Some(prev) => siblings.push(PredicateNode::Or(vec![prev, node])),
                // A leading `.or()` has nothing to attach to.
                None => siblings.push(node),
            }
        } else {
            siblings.push(node);
        }
    }
    match siblings.len() {
        0 => None,
        1 => siblings.pop(),
        _ => Some(PredicateNode::And(siblings)),
    }
}
