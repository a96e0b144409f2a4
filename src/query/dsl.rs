//! Structured query DSL.
//!
//! A serialized query document:
//!
//! ```json
//! {
//!   "namespace": "test_items",
//!   "filters": [
//!     {"field": "year", "cond": "GT", "value": "2016"},
//!     {"field": "genre", "cond": "SET", "value": ["1", "2", "3"]},
//!     {"op": "NOT", "field": "packages", "cond": "EMPTY"}
//!   ],
//!   "sort": {"field": "year", "desc": true},
//!   "limit": 100,
//!   "offset": 0,
//!   "aggregations": [{"field": "year", "type": "SUM"}],
//!   "req_total": true
//! }
//! ```
//!
//! Condition and op spellings are case-insensitive. Stringified numeric
//! values coerce against the target field's declared type at plan time.

use serde::Deserialize;

use super::builder::QueryBuilder;
use super::ir::{AggKind, CondOp, Query};
use crate::error::{Error, Result};
use crate::value::Value;

#[derive(Debug, Deserialize)]
struct DslFilter {
    field: String,
    cond: String,
    #[serde(default)]
    value: serde_json::Value,
    /// AND (default), OR or NOT.
    #[serde(default)]
    op: Option<String>,
}

#[derive(Debug, Deserialize)]
struct DslSort {
    field: String,
    #[serde(default)]
    desc: bool,
}

#[derive(Debug, Deserialize)]
struct DslAgg {
    field: String,
    #[serde(rename = "type")]
    kind: String,
}

#[derive(Debug, Deserialize)]
struct DslQuery {
    namespace: String,
    #[serde(default)]
    filters: Vec<DslFilter>,
    #[serde(default)]
    sort: Option<DslSort>,
    #[serde(default)]
    limit: Option<usize>,
    #[serde(default)]
    offset: Option<usize>,
    #[serde(default)]
    aggregations: Vec<DslAgg>,
    #[serde(default)]
    req_total: bool,
}

/// Parses a DSL document from JSON text into the query IR.
pub fn dsl_from_json(text: &str) -> Result<Query> {
    let raw: serde_json::Value = serde_json::from_str(text)
        .map_err(|e| Error::params(format!("invalid DSL document: {e}")))?;
    dsl_from_value(&raw)
}

/// Parses an already deserialized DSL document into the query IR.
pub fn dsl_from_value(value: &serde_json::Value) -> Result<Query> {
    let dsl: DslQuery = serde_json::from_value(value.clone())
        .map_err(|e| Error::params(format!("invalid DSL document: {e}")))?;

    let mut builder = QueryBuilder::new(dsl.namespace);
    for filter in dsl.filters {
        let op = CondOp::parse(&filter.cond)?;
        match filter.op.as_deref() {
            None => {}
            Some(link) => match link.to_ascii_uppercase().as_str() {
                "AND" => {}
                "OR" => builder = builder.or(),
                "NOT" => builder = builder.not(),
                other => {
                    return Err(Error::params(format!("unknown filter op '{other}'")));
                }
            },
        }
        builder = builder.filter(filter.field, op, operands_from_json(op, &filter.value)?);
    }

    if let Some(sort) = dsl.sort {
        if !sort.field.is_empty() {
            builder = builder.sort(sort.field, sort.desc);
        }
    }
    if let Some(limit) = dsl.limit {
        builder = builder.limit(limit);
    }
    if let Some(offset) = dsl.offset {
        builder = builder.offset(offset);
    }
    if dsl.req_total {
        builder = builder.req_total();
    }
    for agg in dsl.aggregations {
        builder = builder.aggregate(agg.field, AggKind::parse(&agg.kind)?);
    }

    Ok(builder.build())
}

/// Converts a DSL filter value into operands for the given operator.
///
/// SET takes every array element as one operand; RANGE takes a two-element
/// array; ANY/EMPTY ignore the value entirely (the original front-end sends a
/// placeholder `0`).
fn operands_from_json(op: CondOp, value: &serde_json::Value) -> Result<Vec<Value>> {
    match op {
        CondOp::Any | CondOp::Empty => Ok(Vec::new()),
        CondOp::Set => match value {
            serde_json::Value::Array(items) => {
                items.iter().map(Value::from_json).collect::<Result<Vec<_>>>()
            }
            other => Ok(vec![Value::from_json(other)?]),
        },
        CondOp::Range => match value {
            serde_json::Value::Array(items) if items.len() == 2 => {
                items.iter().map(Value::from_json).collect::<Result<Vec<_>>>()
            }
            _ => Err(Error::params("RANGE expects a two-element array value")),
        },
        _ => Ok(vec![Value::from_json(value)?]),
    }
}
