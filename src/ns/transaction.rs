//! Batched write transactions.
//!
//! A transaction stages upserts and deletes against one namespace in a local
//! buffer. Nothing touches shared state until commit, which the database
//! applies under a single write-lock acquisition, all-or-nothing. Rollback is
//! dropping the buffer.

use serde_json::Value as JsonValue;

/// One staged operation.
#[derive(Debug, Clone)]
pub enum TxOp {
    /// Insert-or-replace by pk.
    Upsert(JsonValue),
    /// Delete by the document's pk values.
    Delete(JsonValue),
}

/// A staged batch of writes against one namespace.
#[derive(Debug)]
pub struct Transaction {
    namespace: String,
    ops: Vec<TxOp>,
}

impl Transaction {
    /// Starts an empty transaction against a namespace.
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            ops: Vec::new(),
        }
    }

    /// Stages an upsert.
    pub fn upsert(&mut self, document: JsonValue) {
        self.ops.push(TxOp::Upsert(document));
    }

    /// Stages a delete by pk.
    pub fn delete(&mut self, document: JsonValue) {
        self.ops.push(TxOp::Delete(document));
    }

    /// Target namespace.
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Number of staged operations.
    pub fn len(&self) -> usize {
        self.ops.len()
    }

    /// True when nothing is staged.
    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// Discards every staged operation.
    pub fn rollback(&mut self) {
        self.ops.clear();
    }

    /// Hands the staged operations to the committer.
    pub(crate) fn take_ops(&mut self) -> Vec<TxOp> {
        std::mem::take(&mut self.ops)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_staging_keeps_order() {
        let mut tx = Transaction::new("items");
        tx.upsert(json!({"id": 1}));
        tx.delete(json!({"id": 2}));
        tx.upsert(json!({"id": 3}));
        assert_eq!(tx.len(), 3);
        let ops = tx.take_ops();
        assert!(matches!(ops[0], TxOp::Upsert(_)));
        assert!(matches!(ops[1], TxOp::Delete(_)));
        assert!(matches!(ops[2], TxOp::Upsert(_)));
    }

    #[test]
    fn test_rollback_discards_buffer() {
        let mut tx = Transaction::new("items");
        tx.upsert(json!({"id": 1}));
        tx.rollback();
        assert!(tx.is_empty());
    }
}
