//! Query intermediate representation and front-ends.
//!
//! Every front-end — the fluent builder, the structured DSL and the SQL
//! parser — normalizes into the same `Query` IR before planning, so that
//! equivalent queries produce identical plans regardless of entry point.

mod builder;
mod dsl;
mod ir;

pub use builder::QueryBuilder;
pub use dsl::{dsl_from_json, dsl_from_value};
pub use ir::{
    AggKind, AggSpec, CondOp, Condition, JoinSpec, PredicateNode, Query, SortSpec,
};
