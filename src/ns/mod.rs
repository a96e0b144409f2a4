//! Namespaces: row store + index set + metadata.
//!
//! A namespace owns the typed row store, every declared index, the pk→row-id
//! map and an opaque meta KV. All mutation goes through the methods here and
//! is called under the owning database's write lock; replacement is logically
//! atomic because readers cannot observe state between index updates.
//!
//! Persistence is write-through: mutations append batch ops to a dirty list
//! that [`Namespace::flush`] hands to the collaborator in one atomic batch.

mod store;
mod transaction;

pub use store::RowStore;
pub use transaction::{Transaction, TxOp};

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use tracing::debug;

use crate::error::{Error, Result};
use crate::index::{FieldIndex, FulltextIndex, HashIndex, TreeIndex};
use crate::schema::{self, FieldDef, IndexDef, IndexKind, NamespaceDef};
use crate::storage::{self, BatchOp, KvBackend};
use crate::value::{Payload, RowId, Value};

/// One declared index and its runtime state.
#[derive(Debug)]
pub struct IndexSlot {
    /// The declaration.
    pub def: IndexDef,
    /// Schema positions of the constituent fields (empty for joined).
    pub positions: Vec<usize>,
    /// Runtime index; `None` for store and joined kinds.
    pub index: Option<FieldIndex>,
}

impl IndexSlot {
    fn build_index(kind: IndexKind) -> Option<FieldIndex> {
        match kind {
            IndexKind::Hash => Some(FieldIndex::Hash(HashIndex::new())),
            IndexKind::Tree | IndexKind::Composite => Some(FieldIndex::Tree(TreeIndex::new())),
            IndexKind::Fulltext => Some(FieldIndex::Fulltext(FulltextIndex::new())),
            IndexKind::Store | IndexKind::Joined => None,
        }
    }

    /// True when rows lacking the field are omitted from this index.
    pub fn is_sparse(&self) -> bool {
        self.def.opts.sparse
    }
}

/// A named collection of rows sharing one schema and one index set.
pub struct Namespace {
    def: NamespaceDef,
    field_pos: HashMap<String, usize>,
    slots: Vec<IndexSlot>,
    slot_pos: HashMap<String, usize>,
    store: RowStore,
    pk_map: HashMap<Value, RowId>,
    pk_slot: Option<usize>,
    meta: BTreeMap<String, String>,
    backend: Option<Arc<dyn KvBackend>>,
    dirty: Vec<BatchOp>,
}

impl Namespace {
    /// Builds an empty namespace from a validated definition.
    pub fn open(def: NamespaceDef, backend: Option<Arc<dyn KvBackend>>) -> Result<Self> {
        schema::validate(&def)?;

        let mut field_pos = HashMap::new();
        for (pos, field) in def.fields.iter().enumerate() {
            field_pos.insert(field.name.to_lowercase(), pos);
        }

        let mut slots = Vec::with_capacity(def.indexes.len());
        let mut slot_pos = HashMap::new();
        let mut pk_slot = None;
        for (i, index) in def.indexes.iter().enumerate() {
            let positions = if index.kind == IndexKind::Joined {
                Vec::new()
            } else {
                index
                    .fields
                    .iter()
                    .map(|f| {
                        field_pos
                            .get(&f.to_lowercase())
                            .copied()
                            .ok_or_else(|| Error::logic(format!("validated index over unknown field '{f}'")))
                    })
                    .collect::<Result<Vec<_>>>()?
            };
            if index.opts.pk {
                pk_slot = Some(i);
            }
            slot_pos.insert(index.name.to_lowercase(), i);
            slots.push(IndexSlot {
                def: index.clone(),
                positions,
                index: IndexSlot::build_index(index.kind),
            });
        }

        debug!(target: "stratadb", namespace = %def.name, indexes = slots.len(), "namespace opened");

        Ok(Self {
            def,
            field_pos,
            slots,
            slot_pos,
            store: RowStore::new(),
            pk_map: HashMap::new(),
            pk_slot,
            meta: BTreeMap::new(),
            backend,
            dirty: Vec::new(),
        })
    }

    /// The definition this namespace was opened with.
    pub fn def(&self) -> &NamespaceDef {
        &self.def
    }

    /// Canonical namespace name.
    pub fn name(&self) -> &str {
        &self.def.name
    }

    /// Resolves a field name case-insensitively to its schema position.
    pub fn resolve_field(&self, name: &str) -> Option<usize> {
        self.field_pos.get(&name.to_lowercase()).copied()
    }

    /// Field descriptor at a schema position.
    pub fn field_def(&self, pos: usize) -> &FieldDef {
        &self.def.fields[pos]
    }

    /// Resolves an index name (plain field or `a+b` composite spelling)
    /// case-insensitively to its slot.
    pub fn resolve_index(&self, name: &str) -> Option<usize> {
        self.slot_pos.get(&name.to_lowercase()).copied()
    }

    /// Index slot accessor.
    pub fn slot(&self, i: usize) -> &IndexSlot {
        &self.slots[i]
    }

    /// All index slots.
    pub fn slots(&self) -> &[IndexSlot] {
        &self.slots
    }

    /// The pk slot position, if a pk index is declared.
    pub fn pk_slot(&self) -> Option<usize> {
        self.pk_slot
    }

    /// Number of live rows.
    pub fn row_count(&self) -> usize {
        self.store.len()
    }

    /// Reads one row.
    pub fn row(&self, row: RowId) -> Option<&Payload> {
        self.store.get(row)
    }

    /// Every live row-id, ascending.
    pub fn live_ids(&self) -> Vec<RowId> {
        self.store.all_ids()
    }

    /// Iterates live rows ascending by row-id.
    pub fn rows(&self) -> impl Iterator<Item = (RowId, &Payload)> {
        self.store.iter()
    }

    /// Resolves a pk key to its live row.
    pub fn row_by_pk(&self, key: &Value) -> Option<RowId> {
        self.pk_map.get(key).copied()
    }

    // ------------------------------------------------------------------
    // Document conversion
    // ------------------------------------------------------------------

    /// Converts a JSON document into a schema-ordered payload.
    ///
    /// Document keys match fields case-insensitively; undeclared keys are
    /// rejected. Scalar values coerce per field type (stringified numerics
    /// accepted on numeric fields); array fields require JSON arrays.
    pub fn payload_from_json(&self, doc: &serde_json::Value) -> Result<Payload> {
        let obj = doc
            .as_object()
            .ok_or_else(|| Error::params("document must be a JSON object"))?;

        let mut values = vec![Value::Null; self.def.fields.len()];
        for (key, raw) in obj {
            let pos = self.resolve_field(key).ok_or_else(|| {
                Error::params(format!("unknown field '{}' in document", key))
            })?;
            let field = &self.def.fields[pos];
            values[pos] = if field.array {
                match raw {
                    serde_json::Value::Null => Value::Null,
                    serde_json::Value::Array(items) => {
                        let mut elems = Vec::with_capacity(items.len());
                        for item in items {
                            elems.push(Value::from_json(item)?.coerce_to(field.field_type)?);
                        }
                        Value::Tuple(elems)
                    }
                    _ => {
                        return Err(Error::params(format!(
                            "field '{}' expects an array",
                            field.name
                        )))
                    }
                }
            } else {
                Value::from_json(raw)?.coerce_to(field.field_type)?
            };
        }
        Ok(Payload::new(values))
    }

    /// Renders a payload back into a JSON document. Null fields are omitted.
    pub fn payload_to_json(&self, payload: &Payload) -> serde_json::Value {
        let mut obj = serde_json::Map::new();
        for (pos, field) in self.def.fields.iter().enumerate() {
            let value = payload.get(pos);
            if !value.is_null() {
                obj.insert(field.name.clone(), value.to_json());
            }
        }
        serde_json::Value::Object(obj)
    }

    // ------------------------------------------------------------------
    // Mutation
    // ------------------------------------------------------------------

    /// Extracts the pk key from a payload. Every pk constituent must be
    /// present.
    pub fn pk_key(&self, payload: &Payload) -> Result<Value> {
        let slot = self
            .pk_slot
            .map(|i| &self.slots[i])
            .ok_or_else(|| Error::params(format!("namespace '{}' has no pk index", self.def.name)))?;
        if slot.positions.len() == 1 {
            let v = payload.get(slot.positions[0]);
            if v.is_null() {
                return Err(Error::params(format!(
                    "missing pk value for '{}'",
                    slot.def.name
                )));
            }
            return Ok(v.clone());
        }
        let mut parts = Vec::with_capacity(slot.positions.len());
        for &pos in &slot.positions {
            let v = payload.get(pos);
            if v.is_null() {
                return Err(Error::params(format!(
                    "missing pk value for '{}'",
                    slot.def.name
                )));
            }
            parts.push(v.clone());
        }
        Ok(Value::Tuple(parts))
    }

    /// Inserts or replaces by pk. Returns the row-id and whether an existing
    /// row was replaced.
    pub fn upsert(&mut self, payload: Payload) -> Result<(RowId, bool)> {
        let key = self.pk_key(&payload)?;
        match self.pk_map.get(&key).copied() {
            Some(row) => {
                let old = self
                    .store
                    .replace(row, payload.clone())
                    .ok_or_else(|| Error::logic("pk map points at a missing row"))?;
                self.unindex_row(row, &old);
                self.index_row(row, &payload);
                self.persist_put(row, &payload);
                Ok((row, true))
            }
            None => {
                let row = self.store.insert_new(payload.clone());
                self.index_row(row, &payload);
                self.pk_map.insert(key, row);
                self.persist_put(row, &payload);
                Ok((row, false))
            }
        }
    }

    /// Insert-only path: an existing pk is a conflict.
    pub fn insert(&mut self, payload: Payload) -> Result<RowId> {
        let key = self.pk_key(&payload)?;
        if self.pk_map.contains_key(&key) {
            return Err(Error::conflict(format!(
                "pk '{key}' already exists in '{}'",
                self.def.name
            )));
        }
        let (row, _) = self.upsert(payload)?;
        Ok(row)
    }

    /// Deletes by the payload's pk values. Every non-pk field is ignored.
    /// Returns the removed row-id, or `None` when the pk was absent
    /// (redelete is not an error).
    pub fn delete_by_pk(&mut self, payload: &Payload) -> Result<Option<RowId>> {
        let key = self.pk_key(payload)?;
        let Some(row) = self.pk_map.remove(&key) else {
            return Ok(None);
        };
        let old = self
            .store
            .remove(row)
            .ok_or_else(|| Error::logic("pk map points at a missing row"))?;
        self.unindex_row(row, &old);
        self.persist_delete(row);
        Ok(Some(row))
    }

    /// Deletes a set of rows by id (delete-query path). Ids already gone are
    /// skipped. Returns the number removed.
    pub fn delete_rows(&mut self, rows: &[RowId]) -> Result<usize> {
        let mut removed = 0;
        for &row in rows {
            let Some(old) = self.store.remove(row) else {
                continue;
            };
            let key = self.pk_key(&old)?;
            self.pk_map.remove(&key);
            self.unindex_row(row, &old);
            self.persist_delete(row);
            removed += 1;
        }
        Ok(removed)
    }

    fn index_row(&mut self, row: RowId, payload: &Payload) {
        for slot in &mut self.slots {
            if let Some(index) = slot.index.as_mut() {
                for key in slot_keys(&slot.def, &slot.positions, payload) {
                    index.insert(key, row);
                }
            }
        }
    }

    fn unindex_row(&mut self, row: RowId, payload: &Payload) {
        for slot in &mut self.slots {
            if let Some(index) = slot.index.as_mut() {
                for key in slot_keys(&slot.def, &slot.positions, payload) {
                    index.erase(&key, row);
                }
            }
        }
    }

    // ------------------------------------------------------------------
    // Index management
    // ------------------------------------------------------------------

    /// Adds an index, rebuilding it from the row store. Fails with
    /// `ErrConflict` when a new pk index would not be unique.
    pub fn add_index(&mut self, index: IndexDef) -> Result<()> {
        let mut candidate = self.def.clone();
        candidate.indexes.push(index.clone());
        schema::validate(&candidate)?;

        let positions = if index.kind == IndexKind::Joined {
            Vec::new()
        } else {
            index
                .fields
                .iter()
                .map(|f| {
                    self.resolve_field(f)
                        .ok_or_else(|| Error::logic(format!("validated index over unknown field '{f}'")))
                })
                .collect::<Result<Vec<_>>>()?
        };
        let mut slot = IndexSlot {
            def: index.clone(),
            positions,
            index: IndexSlot::build_index(index.kind),
        };

        if index.opts.pk {
            let mut seen: HashMap<Value, RowId> = HashMap::new();
            for (row, payload) in self.store.iter() {
                let keys = slot_keys(&slot.def, &slot.positions, payload);
                let key = keys
                    .into_iter()
                    .next()
                    .filter(|k| !k.is_null())
                    .ok_or_else(|| {
                        Error::conflict(format!("row {row} lacks a value for pk '{}'", index.name))
                    })?;
                if seen.insert(key.clone(), row).is_some() {
                    return Err(Error::conflict(format!(
                        "pk '{}' is not unique over existing rows",
                        index.name
                    )));
                }
            }
            self.pk_map = seen;
            self.pk_slot = Some(self.slots.len());
        }

        if let Some(field_index) = slot.index.as_mut() {
            for (row, payload) in self.store.iter() {
                for key in slot_keys(&slot.def, &slot.positions, payload) {
                    field_index.insert(key, row);
                }
            }
        }

        self.slot_pos.insert(index.name.to_lowercase(), self.slots.len());
        self.slots.push(slot);
        self.def.indexes.push(index);
        self.persist_def();
        Ok(())
    }

    /// Replaces an existing index definition in place and rebuilds it.
    /// Changing pk-ness is rejected.
    pub fn update_index(&mut self, index: IndexDef) -> Result<()> {
        let pos = self
            .resolve_index(&index.name)
            .ok_or_else(|| Error::params(format!("unknown index '{}'", index.name)))?;
        if self.slots[pos].def.opts.pk != index.opts.pk {
            return Err(Error::params(format!(
                "cannot change pk-ness of index '{}'",
                index.name
            )));
        }

        let mut candidate = self.def.clone();
        candidate.indexes[pos] = index.clone();
        schema::validate(&candidate)?;

        let positions = if index.kind == IndexKind::Joined {
            Vec::new()
        } else {
            index
                .fields
                .iter()
                .map(|f| {
                    self.resolve_field(f)
                        .ok_or_else(|| Error::logic(format!("validated index over unknown field '{f}'")))
                })
                .collect::<Result<Vec<_>>>()?
        };
        let mut slot = IndexSlot {
            def: index.clone(),
            positions,
            index: IndexSlot::build_index(index.kind),
        };
        if let Some(field_index) = slot.index.as_mut() {
            for (row, payload) in self.store.iter() {
                for key in slot_keys(&slot.def, &slot.positions, payload) {
                    field_index.insert(key, row);
                }
            }
        }

        self.slots[pos] = slot;
        self.def.indexes[pos] = index;
        self.persist_def();
        Ok(())
    }

    /// Drops an index. The pk index cannot be dropped.
    pub fn drop_index(&mut self, name: &str) -> Result<()> {
        let pos = self
            .resolve_index(name)
            .ok_or_else(|| Error::params(format!("unknown index '{name}'")))?;
        if self.slots[pos].def.opts.pk {
            return Err(Error::params("cannot drop the pk index"));
        }
        self.slots.remove(pos);
        self.def.indexes.remove(pos);
        self.slot_pos.clear();
        for (i, slot) in self.slots.iter().enumerate() {
            self.slot_pos.insert(slot.def.name.to_lowercase(), i);
        }
        if let Some(pk) = self.pk_slot {
            if pk > pos {
                self.pk_slot = Some(pk - 1);
            }
        }
        self.persist_def();
        Ok(())
    }

    // ------------------------------------------------------------------
    // Meta KV
    // ------------------------------------------------------------------

    /// Stores an opaque meta value.
    pub fn put_meta(&mut self, key: &str, value: &str) {
        self.meta.insert(key.to_string(), value.to_string());
        if self.backend.is_some() {
            self.dirty.push(BatchOp::Put(
                storage::meta_key(&self.def.name, key),
                storage::encode_record(value.as_bytes()),
            ));
        }
    }

    /// Reads an opaque meta value.
    pub fn get_meta(&self, key: &str) -> Option<&str> {
        self.meta.get(key).map(String::as_str)
    }

    /// Lists meta keys in ascending order.
    pub fn enum_meta(&self) -> Vec<String> {
        self.meta.keys().cloned().collect()
    }

    // ------------------------------------------------------------------
    // Persistence
    // ------------------------------------------------------------------

    fn persist_put(&mut self, row: RowId, payload: &Payload) {
        if self.backend.is_some() {
            let body = serde_json::to_vec(&self.payload_to_json(payload)).unwrap_or_default();
            self.dirty.push(BatchOp::Put(
                storage::item_key(&self.def.name, row),
                storage::encode_record(&body),
            ));
        }
    }

    fn persist_delete(&mut self, row: RowId) {
        if self.backend.is_some() {
            self.dirty
                .push(BatchOp::Delete(storage::item_key(&self.def.name, row)));
        }
    }

    fn persist_def(&mut self) {
        if self.backend.is_some() {
            let body = serde_json::to_vec(&self.def).unwrap_or_default();
            self.dirty.push(BatchOp::Put(
                storage::def_key(&self.def.name),
                storage::encode_record(&body),
            ));
        }
    }

    /// Sends accumulated writes to the collaborator in one atomic batch.
    pub fn flush(&mut self) -> Result<()> {
        if self.dirty.is_empty() {
            return Ok(());
        }
        let Some(backend) = self.backend.clone() else {
            self.dirty.clear();
            return Ok(());
        };
        let ops = std::mem::take(&mut self.dirty);
        backend.batch_commit(ops).map_err(Error::from)
    }

    /// Writes the definition record immediately (called once at first open).
    pub fn persist_definition(&mut self) -> Result<()> {
        self.persist_def();
        self.flush()
    }

    /// Replays persisted rows and meta from the collaborator and rebuilds
    /// every index.
    pub fn rebuild_from_backend(&mut self) -> Result<()> {
        let Some(backend) = self.backend.clone() else {
            return Ok(());
        };

        let prefix = storage::item_prefix(&self.def.name);
        for (key, envelope) in backend.range(&prefix).map_err(Error::from)? {
            let row = storage::row_from_item_key(prefix.len(), &key)
                .ok_or_else(|| Error::io(format!("malformed item key in '{}'", self.def.name)))?;
            let body = storage::decode_record(&envelope).map_err(Error::from)?;
            let doc: serde_json::Value = serde_json::from_slice(body)
                .map_err(|e| Error::io(format!("undecodable row {row}: {e}")))?;
            let payload = self.payload_from_json(&doc)?;
            let pk = self.pk_key(&payload)?;
            if self.pk_map.insert(pk, row).is_some() {
                return Err(Error::logic(format!(
                    "duplicate pk during replay of '{}'",
                    self.def.name
                )));
            }
            self.store.restore(row, payload.clone());
            self.index_row(row, &payload);
        }

        let prefix = storage::meta_prefix(&self.def.name);
        for (key, envelope) in backend.range(&prefix).map_err(Error::from)? {
            let name = String::from_utf8_lossy(&key[prefix.len()..]).into_owned();
            let body = storage::decode_record(&envelope).map_err(Error::from)?;
            self.meta
                .insert(name, String::from_utf8_lossy(body).into_owned());
        }

        debug!(target: "stratadb", namespace = %self.def.name, rows = self.store.len(), "replayed from storage");
        Ok(())
    }
}

/// Index keys contributed by one payload: one tuple for composite (only when
/// every constituent is present), one key per array element otherwise.
///
/// A sparse index omits rows whose field is absent. A dense index is total
/// over live rows: a missing or null field is indexed under the `Null` key,
/// so every live row stays reachable through the index. The selector keeps
/// `Null` keys out of EQ and range answers.
fn slot_keys(def: &IndexDef, positions: &[usize], payload: &Payload) -> Vec<Value> {
    if def.kind == IndexKind::Composite {
        let mut parts = Vec::with_capacity(positions.len());
        for &pos in positions {
            let v = payload.get(pos);
            if v.is_null() {
                return Vec::new();
            }
            parts.push(v.clone());
        }
        return vec![Value::Tuple(parts)];
    }
    let Some(&pos) = positions.first() else {
        return Vec::new();
    };
    let values: Vec<Value> = payload.field_values(pos).into_iter().cloned().collect();
    if values.is_empty() && !def.opts.sparse {
        return vec![Value::Null];
    }
    values
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{FieldDef, FieldType};
    use serde_json::json;

    fn items_def() -> NamespaceDef {
        NamespaceDef::new("items")
            .field(FieldDef::new("id", FieldType::Int))
            .field(FieldDef::new("year", FieldType::Int))
            .field(FieldDef::new("name", FieldType::String))
            .field(FieldDef::new("packages", FieldType::Int).array())
            .index(IndexDef::new("id", IndexKind::Hash).pk())
            .index(IndexDef::new("year", IndexKind::Tree))
            .index(IndexDef::new("packages", IndexKind::Hash))
    }

    fn open_items() -> Namespace {
        Namespace::open(items_def(), None).unwrap()
    }

    fn upsert_doc(ns: &mut Namespace, doc: serde_json::Value) -> RowId {
        let payload = ns.payload_from_json(&doc).unwrap();
        ns.upsert(payload).unwrap().0
    }

    #[test]
    fn test_upsert_then_pk_lookup() {
        let mut ns = open_items();
        let row = upsert_doc(&mut ns, json!({"id": 1, "year": 2001, "name": "blabla"}));
        assert_eq!(ns.row_by_pk(&Value::Int(1)), Some(row));
        assert_eq!(ns.row(row).unwrap().get(1), &Value::Int(2001));
    }

    #[test]
    fn test_upsert_replace_keeps_row_id_and_reindexes() {
        let mut ns = open_items();
        let row = upsert_doc(&mut ns, json!({"id": 1, "year": 2001, "name": "a"}));
        let row2 = upsert_doc(&mut ns, json!({"id": 1, "year": 2020, "name": "b"}));
        assert_eq!(row, row2);
        assert_eq!(ns.row_count(), 1);

        let year_slot = ns.resolve_index("year").unwrap();
        let tree = ns.slot(year_slot).index.as_ref().unwrap().as_tree().unwrap();
        assert!(tree.lookup_eq(&Value::Int(2001)).is_empty());
        assert_eq!(tree.lookup_eq(&Value::Int(2020)), vec![row]);
    }

    #[test]
    fn test_insert_conflicts_on_existing_pk() {
        let mut ns = open_items();
        upsert_doc(&mut ns, json!({"id": 1, "year": 2001}));
        let payload = ns.payload_from_json(&json!({"id": 1, "year": 2002})).unwrap();
        let err = ns.insert(payload).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Conflict);
    }

    #[test]
    fn test_delete_by_pk_ignores_non_pk_fields() {
        let mut ns = open_items();
        upsert_doc(&mut ns, json!({"id": 7, "year": 2001, "name": "full"}));

        // a pk-only payload deletes the same row a complete payload would
        let pk_only = ns.payload_from_json(&json!({"id": 7})).unwrap();
        assert!(ns.delete_by_pk(&pk_only).unwrap().is_some());
        assert_eq!(ns.row_count(), 0);

        // redelete succeeds with nothing removed
        assert!(ns.delete_by_pk(&pk_only).unwrap().is_none());
    }

    #[test]
    fn test_array_field_fans_out_index_entries() {
        let mut ns = open_items();
        let row = upsert_doc(&mut ns, json!({"id": 1, "packages": [10, 20, 10]}));

        let slot = ns.resolve_index("packages").unwrap();
        let index = ns.slot(slot).index.as_ref().unwrap();
        assert_eq!(index.all_rows(), vec![row]);
        match index {
            FieldIndex::Hash(h) => {
                assert_eq!(h.lookup_eq(&Value::Int(10)), vec![row]);
                assert_eq!(h.lookup_eq(&Value::Int(20)), vec![row]);
            }
            other => panic!("expected hash index, got {other:?}"),
        }
    }

    #[test]
    fn test_unknown_document_field_rejected() {
        let ns = open_items();
        let err = ns.payload_from_json(&json!({"id": 1, "ghost": 5})).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Params);
    }

    #[test]
    fn test_document_keys_match_case_insensitively() {
        let ns = open_items();
        let payload = ns.payload_from_json(&json!({"ID": 1, "YEAR": 2001})).unwrap();
        assert_eq!(payload.get(0), &Value::Int(1));
        assert_eq!(payload.get(1), &Value::Int(2001));
    }

    #[test]
    fn test_add_index_rebuilds_from_store() {
        let mut ns = open_items();
        upsert_doc(&mut ns, json!({"id": 1, "name": "alpha"}));
        upsert_doc(&mut ns, json!({"id": 2, "name": "beta"}));

        ns.add_index(IndexDef::new("name", IndexKind::Tree)).unwrap();
        let slot = ns.resolve_index("name").unwrap();
        let tree = ns.slot(slot).index.as_ref().unwrap().as_tree().unwrap();
        assert_eq!(tree.cardinality(), 2);
    }

    #[test]
    fn test_drop_pk_index_rejected() {
        let mut ns = open_items();
        let err = ns.drop_index("id").unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Params);
    }

    #[test]
    fn test_meta_round_trip() {
        let mut ns = open_items();
        ns.put_meta("cursor", "123");
        ns.put_meta("alpha", "x");
        assert_eq!(ns.get_meta("cursor"), Some("123"));
        assert_eq!(ns.enum_meta(), vec!["alpha".to_string(), "cursor".to_string()]);
    }

    #[test]
    fn test_dense_index_is_total_over_live_rows() {
        let mut ns = open_items();
        let with_year = upsert_doc(&mut ns, json!({"id": 1, "year": 2001}));
        // the document omits the dense-indexed year entirely
        let without_year = upsert_doc(&mut ns, json!({"id": 2, "name": "no year"}));

        let slot = ns.resolve_index("year").unwrap();
        let tree = ns.slot(slot).index.as_ref().unwrap().as_tree().unwrap();

        // both live rows appear in the dense index; the null one under Null
        assert_eq!(tree.all_rows(), vec![with_year, without_year]);
        assert_eq!(tree.lookup_eq(&Value::Int(2001)), vec![with_year]);
        assert_eq!(tree.lookup_eq(&Value::Null), vec![without_year]);

        // replacing the row with a valued year moves it out of the Null bucket
        upsert_doc(&mut ns, json!({"id": 2, "year": 2002}));
        assert!(tree_lookup_null(&ns, slot).is_empty());
    }

    fn tree_lookup_null(ns: &Namespace, slot: usize) -> Vec<RowId> {
        ns.slot(slot)
            .index
            .as_ref()
            .unwrap()
            .as_tree()
            .unwrap()
            .lookup_eq(&Value::Null)
    }

    #[test]
    fn test_composite_key_requires_all_constituents() {
        let def = NamespaceDef::new("c")
            .field(FieldDef::new("id", FieldType::Int))
            .field(FieldDef::new("age", FieldType::Int))
            .field(FieldDef::new("genre", FieldType::Int64))
            .index(IndexDef::new("id", IndexKind::Hash).pk())
            .index(IndexDef::composite(&["age", "genre"]));
        let mut ns = Namespace::open(def, None).unwrap();

        upsert_doc(&mut ns, json!({"id": 1, "age": 3, "genre": 5}));
        upsert_doc(&mut ns, json!({"id": 2, "age": 3}));

        let slot = ns.resolve_index("age+genre").unwrap();
        let tree = ns.slot(slot).index.as_ref().unwrap().as_tree().unwrap();
        // only the row with both fields present is indexed
        assert_eq!(tree.total_entries(), 1);
        let key = Value::Tuple(vec![Value::Int(3), Value::Int64(5)]);
        assert_eq!(tree.lookup_eq(&key).len(), 1);
    }
}
