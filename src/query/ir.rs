//! The normalized query form consumed by the planner.

use crate::error::{Error, Result};
use crate::value::Value;

/// Predicate operators the core recognizes.
///
/// Front-ends normalize operator spellings to these tokens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CondOp {
    /// Field equals the operand.
    Eq,
    /// Field is strictly less than the operand.
    Lt,
    /// Field is less than or equal to the operand.
    Le,
    /// Field is strictly greater than the operand.
    Gt,
    /// Field is greater than or equal to the operand.
    Ge,
    /// Field lies in the closed interval `[lo, hi]`. `lo > hi` matches
    /// nothing.
    Range,
    /// Field equals any of the operands.
    Set,
    /// Field is present (≥ 1 element for arrays).
    Any,
    /// Field is absent; the complement of `Any` over the live set.
    Empty,
}

impl CondOp {
    /// Parses an operator token, case-insensitively.
    pub fn parse(token: &str) -> Result<CondOp> {
        match token.to_ascii_uppercase().as_str() {
            "EQ" => Ok(CondOp::Eq),
            "LT" => Ok(CondOp::Lt),
            "LE" => Ok(CondOp::Le),
            "GT" => Ok(CondOp::Gt),
            "GE" => Ok(CondOp::Ge),
            "RANGE" => Ok(CondOp::Range),
            "SET" => Ok(CondOp::Set),
            "ANY" => Ok(CondOp::Any),
            "EMPTY" => Ok(CondOp::Empty),
            other => Err(Error::params(format!("unknown condition '{other}'"))),
        }
    }

    /// Returns the canonical token.
    pub fn name(self) -> &'static str {
        match self {
            CondOp::Eq => "EQ",
            CondOp::Lt => "LT",
            CondOp::Le => "LE",
            CondOp::Gt => "GT",
            CondOp::Ge => "GE",
            CondOp::Range => "RANGE",
            CondOp::Set => "SET",
            CondOp::Any => "ANY",
            CondOp::Empty => "EMPTY",
        }
    }

}

/// One predicate: field, operator, operands.
#[derive(Debug, Clone, PartialEq)]
pub struct Condition {
    /// Field or composite-index name as written by the caller.
    pub field: String,
    /// Operator.
    pub op: CondOp,
    /// Operands. EQ and the comparisons carry one, RANGE two, SET any number,
    /// ANY/EMPTY none.
    pub values: Vec<Value>,
}

impl Condition {
    /// Creates a condition.
    pub fn new(field: impl Into<String>, op: CondOp, values: Vec<Value>) -> Self {
        Self {
            field: field.into(),
            op,
            values,
        }
    }
}

/// A rooted boolean predicate tree.
#[derive(Debug, Clone, PartialEq)]
pub enum PredicateNode {
    /// Leaf condition.
    Cond(Condition),
    /// Negation of the child, bounded to the enclosing conjunction's
    /// candidate set.
    Not(Box<PredicateNode>),
    /// Conjunction of the children.
    And(Vec<PredicateNode>),
    /// Disjunction of the children.
    Or(Vec<PredicateNode>),
}

/// One sort key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortSpec {
    /// Field to sort by.
    pub field: String,
    /// Descending when true.
    pub desc: bool,
}

impl SortSpec {
    /// Ascending sort on a field.
    pub fn asc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            desc: false,
        }
    }

    /// Descending sort on a field.
    pub fn desc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            desc: true,
        }
    }
}

/// Aggregation kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggKind {
    Sum,
    Avg,
    Min,
    Max,
    /// value → count histogram over the result set.
    Facet,
}

impl AggKind {
    /// Parses an aggregation token, case-insensitively.
    pub fn parse(token: &str) -> Result<AggKind> {
        match token.to_ascii_uppercase().as_str() {
            "SUM" => Ok(AggKind::Sum),
            "AVG" => Ok(AggKind::Avg),
            "MIN" => Ok(AggKind::Min),
            "MAX" => Ok(AggKind::Max),
            "FACET" => Ok(AggKind::Facet),
            other => Err(Error::params(format!("unknown aggregation '{other}'"))),
        }
    }

    /// Returns the canonical token.
    pub fn name(self) -> &'static str {
        match self {
            AggKind::Sum => "SUM",
            AggKind::Avg => "AVG",
            AggKind::Min => "MIN",
            AggKind::Max => "MAX",
            AggKind::Facet => "FACET",
        }
    }
}

/// One requested aggregation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AggSpec {
    /// Field to aggregate, matched case-insensitively.
    pub field: String,
    /// Aggregation kind.
    pub kind: AggKind,
}

/// A join attached to a query.
///
/// For each outer result row the executor runs `query` with every `on`
/// condition bound to the outer row's value and attaches the sub-rows under
/// `field`. Execution is left-outer.
#[derive(Debug, Clone, PartialEq)]
pub struct JoinSpec {
    /// Attach-point field name (a `joined` index of the outer namespace).
    pub field: String,
    /// The inner query.
    pub query: Query,
    /// Pairs of (outer field, inner field) equality bindings.
    pub on: Vec<(String, String)>,
}

/// The normalized query.
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    /// Target namespace, resolved case-insensitively.
    pub namespace: String,
    /// Columns a SQL front-end projected; empty means every field. Rendering
    /// honors this, matching and row identity never do.
    pub select_fields: Vec<String>,
    /// Predicate tree; `None` selects every live row.
    pub root: Option<PredicateNode>,
    /// Sort keys, applied in order with a stable comparator.
    pub sort: Vec<SortSpec>,
    /// Distinct fields; at most one is honored per query.
    pub distinct: Vec<String>,
    /// Maximum number of returned rows.
    pub limit: Option<usize>,
    /// Rows skipped after sort and distinct.
    pub offset: usize,
    /// Requested aggregations, computed over the full matching set.
    pub aggregations: Vec<AggSpec>,
    /// When set, the result carries the matched-row count before limit.
    pub req_total: bool,
    /// Groups of array fields whose matched element index must align.
    pub equal_position: Vec<Vec<String>>,
    /// Joins to run per result row.
    pub joins: Vec<JoinSpec>,
}

impl Query {
    /// Creates an empty query against a namespace.
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            select_fields: Vec::new(),
            root: None,
            sort: Vec::new(),
            distinct: Vec::new(),
            limit: None,
            offset: 0,
            aggregations: Vec::new(),
            req_total: false,
            equal_position: Vec::new(),
            joins: Vec::new(),
        }
    }
}
