//! Database facade.
//!
//! Owns every namespace behind one reader-writer lock each, routes the three
//! query front-ends into the shared plan/execute pipeline, applies
//! transactions under a single write-lock acquisition and accounts for
//! outstanding result buffers.
//!
//! Lock discipline: a query plans and executes under one namespace's read
//! lock; joins run after that lock is released, each sub-query taking its
//! own read lock, so cross-namespace lock chains never form. Writes take the
//! namespace write lock for the duration of the mutation plus the storage
//! flush.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};

use tracing::debug;

use crate::error::{Error, Result};
use crate::executor::{self, AggregationResult, ExecOutput, QueryContext};
use crate::ns::{Namespace, Transaction, TxOp};
use crate::planner;
use crate::query::{dsl_from_json, CondOp, Condition, PredicateNode, Query};
use crate::schema::{self, IndexDef, NamespaceDef};
use crate::sql::{self, SqlStatement};
use crate::storage::{BatchOp, KvBackend};
use crate::value::{RowId, Value};

/// Tunables for one database handle.
#[derive(Debug, Clone)]
pub struct DatabaseOptions {
    /// Maximum outstanding [`QueryResults`] buffers before selects are
    /// rejected with `ErrBufferLimit`.
    pub max_result_buffers: usize,
}

impl Default for DatabaseOptions {
    fn default() -> Self {
        Self {
            max_result_buffers: 256,
        }
    }
}

type SharedNamespace = Arc<RwLock<Namespace>>;

/// The embeddable database engine.
pub struct Database {
    namespaces: RwLock<HashMap<String, SharedNamespace>>,
    backend: Option<Arc<dyn KvBackend>>,
    options: DatabaseOptions,
    buffers: Arc<AtomicUsize>,
}

impl Default for Database {
    fn default() -> Self {
        Self::new()
    }
}

impl Database {
    /// An in-memory database without persistence.
    pub fn new() -> Self {
        Self::with_options(None, DatabaseOptions::default())
    }

    /// A database backed by a persistence collaborator.
    pub fn with_backend(backend: Arc<dyn KvBackend>) -> Self {
        Self::with_options(Some(backend), DatabaseOptions::default())
    }

    /// Full-control constructor.
    pub fn with_options(backend: Option<Arc<dyn KvBackend>>, options: DatabaseOptions) -> Self {
        Self {
            namespaces: RwLock::new(HashMap::new()),
            backend,
            options,
            buffers: Arc::new(AtomicUsize::new(0)),
        }
    }

    // ------------------------------------------------------------------
    // Namespace lifecycle
    // ------------------------------------------------------------------

    /// Opens a namespace. Idempotent: reopening with a compatible definition
    /// succeeds; an incompatible one is `ErrConflict`. With a backend
    /// attached, previously persisted rows are replayed and indexes rebuilt.
    pub fn open_namespace(&self, def: NamespaceDef) -> Result<()> {
        schema::validate(&def)?;
        let key = def.name.to_lowercase();

        let mut map = self.write_namespaces();
        if let Some(existing) = map.get(&key) {
            let guard = read_ns(existing)?;
            return if schema::compatible(guard.def(), &def) {
                Ok(())
            } else {
                Err(Error::conflict(format!(
                    "namespace '{}' is already open with a different schema",
                    def.name
                )))
            };
        }

        let mut ns = Namespace::open(def.clone(), self.backend.clone())?;
        if let Some(backend) = &self.backend {
            if let Some(stored) = read_stored_def(backend.as_ref(), &def.name)? {
                if !schema::compatible(&stored, &def) {
                    return Err(Error::conflict(format!(
                        "stored schema for '{}' does not match the submitted definition",
                        def.name
                    )));
                }
                ns.rebuild_from_backend()?;
            }
        }
        ns.persist_definition()?;
        map.insert(key, Arc::new(RwLock::new(ns)));
        Ok(())
    }

    /// Closes a namespace, keeping persisted state for a later reopen.
    pub fn close_namespace(&self, name: &str) -> Result<()> {
        let removed = self.write_namespaces().remove(&name.to_lowercase());
        let Some(ns) = removed else {
            return Err(Error::not_found(format!("namespace '{name}' is not open")));
        };
        write_ns(&ns)?.flush()?;
        debug!(target: "stratadb", namespace = name, "namespace closed");
        Ok(())
    }

    /// Drops a namespace and erases its persisted state.
    pub fn drop_namespace(&self, name: &str) -> Result<()> {
        let removed = self.write_namespaces().remove(&name.to_lowercase());
        if removed.is_none() {
            return Err(Error::not_found(format!("namespace '{name}' is not open")));
        }
        if let Some(backend) = &self.backend {
            let mut ops = vec![BatchOp::Delete(crate::storage::def_key(name))];
            for prefix in [crate::storage::item_prefix(name), crate::storage::meta_prefix(name)] {
                for (key, _) in backend.range(&prefix).map_err(Error::from)? {
                    ops.push(BatchOp::Delete(key));
                }
            }
            backend.batch_commit(ops).map_err(Error::from)?;
        }
        debug!(target: "stratadb", namespace = name, "namespace dropped");
        Ok(())
    }

    /// Adds an index to an open namespace, rebuilding it from stored rows.
    pub fn add_index(&self, namespace: &str, index: IndexDef) -> Result<()> {
        let ns = self.namespace(namespace)?;
        let mut guard = write_ns(&ns)?;
        guard.add_index(index)?;
        guard.flush()
    }

    /// Replaces an index definition on an open namespace.
    pub fn update_index(&self, namespace: &str, index: IndexDef) -> Result<()> {
        let ns = self.namespace(namespace)?;
        let mut guard = write_ns(&ns)?;
        guard.update_index(index)?;
        guard.flush()
    }

    /// Drops an index from an open namespace.
    pub fn drop_index(&self, namespace: &str, index: &str) -> Result<()> {
        let ns = self.namespace(namespace)?;
        let mut guard = write_ns(&ns)?;
        guard.drop_index(index)?;
        guard.flush()
    }

    // ------------------------------------------------------------------
    // Writes
    // ------------------------------------------------------------------

    /// Inserts or replaces one document by pk.
    pub fn upsert(&self, namespace: &str, document: serde_json::Value) -> Result<()> {
        let ns = self.namespace(namespace)?;
        let mut guard = write_ns(&ns)?;
        let payload = guard.payload_from_json(&document)?;
        guard.upsert(payload)?;
        guard.flush()
    }

    /// Insert-only: an existing pk is `ErrConflict`.
    pub fn insert(&self, namespace: &str, document: serde_json::Value) -> Result<()> {
        let ns = self.namespace(namespace)?;
        let mut guard = write_ns(&ns)?;
        let payload = guard.payload_from_json(&document)?;
        guard.insert(payload)?;
        guard.flush()
    }

    /// Deletes by the document's pk values; other fields are ignored.
    /// Returns whether a row was removed — redelete is `Ok(false)`.
    pub fn delete(&self, namespace: &str, document: serde_json::Value) -> Result<bool> {
        let ns = self.namespace(namespace)?;
        let mut guard = write_ns(&ns)?;
        let payload = guard.payload_from_json(&document)?;
        let removed = guard.delete_by_pk(&payload)?;
        guard.flush()?;
        Ok(removed.is_some())
    }

    /// Fetches one document by pk value (a tuple for composite pks).
    pub fn get_by_pk(&self, namespace: &str, pk: impl Into<Value>) -> Result<serde_json::Value> {
        let ns = self.namespace(namespace)?;
        let guard = read_ns(&ns)?;
        let key = pk.into();
        let row = guard
            .row_by_pk(&key)
            .ok_or_else(|| Error::not_found(format!("pk '{key}' not found in '{namespace}'")))?;
        let payload = guard
            .row(row)
            .ok_or_else(|| Error::logic("pk map points at a missing row"))?;
        Ok(guard.payload_to_json(payload))
    }

    /// Executes a query and deletes every matching row. Returns the count.
    pub fn delete_query(&self, query: &Query) -> Result<usize> {
        let ns = self.namespace(&query.namespace)?;
        let mut guard = write_ns(&ns)?;
        let plan = planner::plan(&guard, query)?;
        let output = executor::execute(&guard, &plan, &QueryContext::new())?;
        let rows: Vec<RowId> = output.items.iter().map(|(row, _)| *row).collect();
        let removed = guard.delete_rows(&rows)?;
        guard.flush()?;
        debug!(target: "stratadb", namespace = %query.namespace, removed, "delete query");
        Ok(removed)
    }

    // ------------------------------------------------------------------
    // Transactions
    // ------------------------------------------------------------------

    /// Starts a transaction against an open namespace.
    pub fn begin_tx(&self, namespace: &str) -> Result<Transaction> {
        let ns = self.namespace(namespace)?;
        let guard = read_ns(&ns)?;
        Ok(Transaction::new(guard.name().to_string()))
    }

    /// Applies a transaction under one write-lock acquisition.
    ///
    /// Every staged document is validated before anything mutates; a
    /// validation failure aborts the whole batch with no visible effect.
    /// Returns the number of applied operations.
    pub fn commit(&self, tx: &mut Transaction) -> Result<usize> {
        let ns = self.namespace(tx.namespace())?;
        let ops = tx.take_ops();
        if ops.is_empty() {
            return Ok(0);
        }

        let mut guard = write_ns(&ns)?;

        enum Typed {
            Upsert(crate::value::Payload),
            Delete(crate::value::Payload),
        }
        let mut typed = Vec::with_capacity(ops.len());
        for op in &ops {
            match op {
                TxOp::Upsert(doc) => {
                    let payload = guard.payload_from_json(doc)?;
                    guard.pk_key(&payload)?;
                    typed.push(Typed::Upsert(payload));
                }
                TxOp::Delete(doc) => {
                    let payload = guard.payload_from_json(doc)?;
                    guard.pk_key(&payload)?;
                    typed.push(Typed::Delete(payload));
                }
            }
        }

        let applied = typed.len();
        for op in typed {
            match op {
                Typed::Upsert(payload) => {
                    guard.upsert(payload)?;
                }
                Typed::Delete(payload) => {
                    guard.delete_by_pk(&payload)?;
                }
            }
        }
        guard.flush()?;
        debug!(target: "stratadb", namespace = tx.namespace(), applied, "transaction committed");
        Ok(applied)
    }

    // ------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------

    /// Executes a query IR.
    pub fn select(&self, query: &Query) -> Result<QueryResults> {
        self.select_with_context(query, &QueryContext::new())
    }

    /// Executes a query IR under a cancellation/deadline context.
    pub fn select_with_context(&self, query: &Query, ctx: &QueryContext) -> Result<QueryResults> {
        let guard = self.acquire_buffer()?;
        let (output, documents) = self.run_query(query, ctx)?;
        Ok(QueryResults {
            items: documents,
            total: query.req_total.then_some(output.total),
            aggregations: output.aggregations,
            _buffer: guard,
        })
    }

    /// Executes a SQL statement. SELECT returns rows; DELETE returns an
    /// empty result whose total carries the deleted count.
    pub fn exec_sql(&self, text: &str) -> Result<QueryResults> {
        match sql::parse(text)? {
            SqlStatement::Select(query) => self.select(&query),
            SqlStatement::Delete(query) => {
                let guard = self.acquire_buffer()?;
                let removed = self.delete_query(&query)?;
                Ok(QueryResults {
                    items: Vec::new(),
                    total: Some(removed),
                    aggregations: Vec::new(),
                    _buffer: guard,
                })
            }
        }
    }

    /// Executes a structured-DSL document.
    pub fn exec_dsl(&self, text: &str) -> Result<QueryResults> {
        let query = dsl_from_json(text)?;
        self.select(&query)
    }

    /// Plans and executes against the target namespace, then resolves joins
    /// with the namespace lock released.
    fn run_query(
        &self,
        query: &Query,
        ctx: &QueryContext,
    ) -> Result<(ExecOutput, Vec<ResultItem>)> {
        let ns = self.namespace(&query.namespace)?;
        let (output, mut documents) = {
            let guard = read_ns(&ns)?;
            let plan = planner::plan(&guard, query)?;
            let output = executor::execute(&guard, &plan, ctx)?;
            let documents: Vec<ResultItem> = output
                .items
                .iter()
                .map(|(row, payload)| ResultItem {
                    row_id: *row,
                    document: guard.payload_to_json(payload),
                })
                .collect();
            (output, documents)
        };

        if !query.joins.is_empty() {
            // Outer lock is released; each sub-query takes its own.
            let outer: Vec<(RowId, crate::value::Payload)> = output.items.clone();
            for join in &query.joins {
                for (item, (_, payload)) in documents.iter_mut().zip(&outer) {
                    let mut sub = join.query.clone();
                    let mut bound = sub.root.take().map_or_else(Vec::new, |root| vec![root]);
                    let mut outer_null = false;
                    {
                        let guard = read_ns(&ns)?;
                        for (left, right) in &join.on {
                            let pos = guard.resolve_field(left).ok_or_else(|| {
                                Error::params(format!("unknown join field '{left}'"))
                            })?;
                            let value = payload.get(pos).clone();
                            if value.is_null() {
                                outer_null = true;
                                break;
                            }
                            bound.push(PredicateNode::Cond(Condition::new(
                                right.clone(),
                                CondOp::Eq,
                                vec![value],
                            )));
                        }
                    }
                    let joined_rows = if outer_null {
                        Vec::new()
                    } else {
                        sub.root = match bound.len() {
                            0 => None,
                            1 => bound.pop(),
                            _ => Some(PredicateNode::And(bound)),
                        };
                        let (_, sub_items) = self.run_query(&sub, ctx)?;
                        sub_items.into_iter().map(|item| item.document).collect()
                    };
                    // left-outer: the field is present even when empty
                    if let serde_json::Value::Object(obj) = &mut item.document {
                        obj.insert(join.field.clone(), serde_json::Value::Array(joined_rows));
                    }
                }
            }
        }

        if !query.select_fields.is_empty() {
            for item in &mut documents {
                project(&mut item.document, &query.select_fields);
            }
        }

        Ok((output, documents))
    }

    // ------------------------------------------------------------------
    // Meta
    // ------------------------------------------------------------------

    /// Stores an opaque per-namespace meta value.
    pub fn put_meta(&self, namespace: &str, key: &str, value: &str) -> Result<()> {
        let ns = self.namespace(namespace)?;
        let mut guard = write_ns(&ns)?;
        guard.put_meta(key, value);
        guard.flush()
    }

    /// Reads an opaque per-namespace meta value.
    pub fn get_meta(&self, namespace: &str, key: &str) -> Result<Option<String>> {
        let ns = self.namespace(namespace)?;
        let guard = read_ns(&ns)?;
        Ok(guard.get_meta(key).map(str::to_string))
    }

    /// Lists meta keys in ascending order.
    pub fn enum_meta(&self, namespace: &str) -> Result<Vec<String>> {
        let ns = self.namespace(namespace)?;
        let guard = read_ns(&ns)?;
        Ok(guard.enum_meta())
    }

    /// Outstanding result buffers (observability hook for tests and hosts).
    pub fn outstanding_buffers(&self) -> usize {
        self.buffers.load(Ordering::Relaxed)
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    fn namespace(&self, name: &str) -> Result<SharedNamespace> {
        self.namespaces
            .read()
            .map_err(|_| Error::logic("namespace registry poisoned"))?
            .get(&name.to_lowercase())
            .cloned()
            .ok_or_else(|| Error::params(format!("unknown namespace '{name}'")))
    }

    fn write_namespaces(&self) -> std::sync::RwLockWriteGuard<'_, HashMap<String, SharedNamespace>> {
        self.namespaces.write().unwrap_or_else(|e| e.into_inner())
    }

    fn acquire_buffer(&self) -> Result<BufferGuard> {
        let limit = self.options.max_result_buffers;
        let mut current = self.buffers.load(Ordering::Relaxed);
        loop {
            if current >= limit {
                return Err(Error::buffer_limit(format!(
                    "{current} result buffers outstanding (limit {limit})"
                )));
            }
            match self.buffers.compare_exchange(
                current,
                current + 1,
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => {
                    return Ok(BufferGuard {
                        counter: self.buffers.clone(),
                    })
                }
                Err(actual) => current = actual,
            }
        }
    }
}

fn read_ns(ns: &SharedNamespace) -> Result<std::sync::RwLockReadGuard<'_, Namespace>> {
    ns.read().map_err(|_| Error::logic("namespace lock poisoned"))
}

fn write_ns(ns: &SharedNamespace) -> Result<std::sync::RwLockWriteGuard<'_, Namespace>> {
    ns.write().map_err(|_| Error::logic("namespace lock poisoned"))
}

fn read_stored_def(backend: &dyn KvBackend, name: &str) -> Result<Option<NamespaceDef>> {
    let Some(envelope) = backend
        .get(&crate::storage::def_key(name))
        .map_err(Error::from)?
    else {
        return Ok(None);
    };
    let body = crate::storage::decode_record(&envelope).map_err(Error::from)?;
    serde_json::from_slice(body)
        .map(Some)
        .map_err(|e| Error::io(format!("undecodable stored definition for '{name}': {e}")))
}

/// Keeps only the projected keys, matched case-insensitively.
fn project(document: &mut serde_json::Value, fields: &[String]) {
    if let serde_json::Value::Object(obj) = document {
        obj.retain(|key, _| fields.iter().any(|f| f.eq_ignore_ascii_case(key)));
    }
}

/// Releases one result-buffer slot on drop.
#[derive(Debug)]
pub struct BufferGuard {
    counter: Arc<AtomicUsize>,
}

impl Drop for BufferGuard {
    fn drop(&mut self) {
        self.counter.fetch_sub(1, Ordering::Relaxed);
    }
}

/// One returned row.
#[derive(Debug, Clone)]
pub struct ResultItem {
    /// Engine row-id, stable across fetches.
    pub row_id: RowId,
    /// The rendered document (projection applied, joins attached).
    pub document: serde_json::Value,
}

/// A materialized result set owning one server-side buffer slot.
///
/// The slot is released when the results are dropped; holding more than the
/// configured limit concurrently makes further selects fail with
/// `ErrBufferLimit`.
#[derive(Debug)]
pub struct QueryResults {
    items: Vec<ResultItem>,
    total: Option<usize>,
    aggregations: Vec<AggregationResult>,
    _buffer: BufferGuard,
}

impl QueryResults {
    /// Rows in result order.
    pub fn items(&self) -> &[ResultItem] {
        &self.items
    }

    /// Number of returned rows.
    pub fn count(&self) -> usize {
        self.items.len()
    }

    /// Matched-row count before limit, when `req_total` was requested (or
    /// the deleted count for SQL DELETE).
    pub fn total_count(&self) -> Option<usize> {
        self.total
    }

    /// Aggregation results in request order.
    pub fn aggregations(&self) -> &[AggregationResult] {
        &self.aggregations
    }

    /// Row-ids in result order.
    pub fn row_ids(&self) -> Vec<RowId> {
        self.items.iter().map(|item| item.row_id).collect()
    }

    /// Consumes the results into documents.
    pub fn into_documents(self) -> Vec<serde_json::Value> {
        self.items.into_iter().map(|item| item.document).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::QueryBuilder;
    use crate::schema::{FieldDef, FieldType, IndexKind};
    use serde_json::json;

    fn items_def() -> NamespaceDef {
        NamespaceDef::new("items")
            .field(FieldDef::new("id", FieldType::Int))
            .field(FieldDef::new("year", FieldType::Int))
            .field(FieldDef::new("name", FieldType::String))
            .index(IndexDef::new("id", IndexKind::Hash).pk())
            .index(IndexDef::new("year", IndexKind::Tree))
    }

    fn open_db() -> Database {
        let db = Database::new();
        db.open_namespace(items_def()).unwrap();
        db
    }

    #[test]
    fn test_reopen_compatible_is_idempotent() {
        let db = open_db();
        db.open_namespace(items_def()).unwrap();
    }

    #[test]
    fn test_reopen_incompatible_conflicts() {
        let db = open_db();
        let mut def = items_def();
        def.fields[1].field_type = FieldType::String;
        let err = db.open_namespace(def).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Conflict);
    }

    #[test]
    fn test_upsert_select_roundtrip() {
        let db = open_db();
        db.upsert("items", json!({"id": 1, "year": 2001, "name": "blabla"}))
            .unwrap();

        let q = QueryBuilder::new("items").filter("year", CondOp::Eq, 2001).build();
        let results = db.select(&q).unwrap();
        assert_eq!(results.count(), 1);
        assert_eq!(results.items()[0].document["name"], json!("blabla"));
    }

    #[test]
    fn test_get_by_pk_miss_is_not_found() {
        let db = open_db();
        let err = db.get_by_pk("items", 99).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::NotFound);
    }

    #[test]
    fn test_unknown_namespace_is_params() {
        let db = Database::new();
        let err = db.upsert("ghost", json!({"id": 1})).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Params);
    }

    #[test]
    fn test_namespace_names_resolve_case_insensitively() {
        let db = open_db();
        db.upsert("ITEMS", json!({"id": 5, "year": 2020})).unwrap();
        let q = QueryBuilder::new("Items").filter("id", CondOp::Eq, 5).build();
        assert_eq!(db.select(&q).unwrap().count(), 1);
    }

    #[test]
    fn test_buffer_limit_enforced_and_released() {
        let db = Database::with_options(
            None,
            DatabaseOptions {
                max_result_buffers: 2,
            },
        );
        db.open_namespace(items_def()).unwrap();
        let q = QueryBuilder::new("items").build();

        let a = db.select(&q).unwrap();
        let b = db.select(&q).unwrap();
        let err = db.select(&q).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::BufferLimit);

        drop(a);
        let c = db.select(&q).unwrap();
        drop(b);
        drop(c);
        assert_eq!(db.outstanding_buffers(), 0);
    }

    #[test]
    fn test_sql_delete_returns_count() {
        let db = open_db();
        db.upsert("items", json!({"id": 1000, "year": 2000})).unwrap();
        let results = db.exec_sql("DELETE FROM items WHERE id = 1000").unwrap();
        assert_eq!(results.total_count(), Some(1));
        assert!(db.get_by_pk("items", 1000).is_err());
    }

    #[test]
    fn test_projection_applies_to_rendering_only() {
        let db = open_db();
        db.upsert("items", json!({"id": 1, "year": 2001, "name": "x"})).unwrap();
        let results = db.exec_sql("SELECT id, name FROM items WHERE year = 2001").unwrap();
        let doc = &results.items()[0].document;
        assert!(doc.get("id").is_some());
        assert!(doc.get("name").is_some());
        assert!(doc.get("year").is_none());
    }

    #[test]
    fn test_transaction_all_or_nothing_on_bad_document() {
        let db = open_db();
        let mut tx = db.begin_tx("items").unwrap();
        tx.upsert(json!({"id": 1, "year": 2001}));
        tx.upsert(json!({"id": 2, "ghost_field": true}));
        let err = db.commit(&mut tx).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Params);

        // first op must not have landed
        assert!(db.get_by_pk("items", 1).is_err());
    }

    #[test]
    fn test_transaction_commit_applies_in_order() {
        let db = open_db();
        let mut tx = db.begin_tx("items").unwrap();
        tx.upsert(json!({"id": 1, "year": 2001}));
        tx.upsert(json!({"id": 1, "year": 2002}));
        tx.delete(json!({"id": 1}));
        tx.upsert(json!({"id": 1, "year": 2003}));
        assert_eq!(db.commit(&mut tx).unwrap(), 4);

        let doc = db.get_by_pk("items", 1).unwrap();
        assert_eq!(doc["year"], json!(2003));
    }
}
