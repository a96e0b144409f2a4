//! stratadb — a strict, deterministic, embeddable in-memory document
//! database with secondary indexes.
//!
//! Rows live in typed namespaces declared at open time; fields may carry
//! hash, tree, store, fulltext or composite indexes. Queries arrive through
//! three equivalent front-ends — a fluent builder, a structured DSL and a
//! SQL subset — and flow through one planner and executor, so equivalent
//! queries return identical rows whichever surface produced them.
//!
//! ```
//! use serde_json::json;
//! use stratadb::{
//!     CondOp, Database, FieldDef, FieldType, IndexDef, IndexKind, NamespaceDef, QueryBuilder,
//! };
//!
//! let db = Database::new();
//! db.open_namespace(
//!     NamespaceDef::new("items")
//!         .field(FieldDef::new("id", FieldType::Int))
//!         .field(FieldDef::new("year", FieldType::Int))
//!         .index(IndexDef::new("id", IndexKind::Hash).pk())
//!         .index(IndexDef::new("year", IndexKind::Tree)),
//! )
//! .unwrap();
//!
//! db.upsert("items", json!({"id": 1, "year": 2001})).unwrap();
//!
//! let q = QueryBuilder::new("items").filter("year", CondOp::Eq, 2001).build();
//! assert_eq!(db.select(&q).unwrap().count(), 1);
//! ```
//!
//! Persistence is optional: attach a [`storage::KvBackend`] and namespaces
//! replay their rows at open. The engine assumes nothing of the backend
//! beyond crash-atomic `batch_commit`.

pub mod db;
pub mod error;
pub mod executor;
pub mod index;
pub mod ns;
pub mod planner;
pub mod query;
pub mod schema;
pub mod selector;
pub mod sql;
pub mod storage;
pub mod value;

pub use db::{Database, DatabaseOptions, QueryResults, ResultItem};
pub use error::{Error, ErrorKind, Result};
pub use executor::{AggregationResult, FacetBucket, QueryContext};
pub use ns::{Namespace, Transaction};
pub use query::{
    AggKind, AggSpec, CondOp, Condition, JoinSpec, PredicateNode, Query, QueryBuilder, SortSpec,
};
pub use schema::{FieldDef, FieldType, IndexDef, IndexKind, IndexOpts, NamespaceDef};
pub use sql::SqlStatement;
pub use storage::{KvBackend, MemoryBackend};
pub use value::{Payload, RowId, Value};
