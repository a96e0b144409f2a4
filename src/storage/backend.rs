//! Key/value backend trait and the in-memory implementation.

use std::collections::BTreeMap;
use std::sync::Mutex;

use super::StorageError;

/// One operation inside an atomic batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchOp {
    Put(Vec<u8>, Vec<u8>),
    Delete(Vec<u8>),
}

/// The opaque persistence collaborator.
///
/// The engine assumes nothing beyond crash-atomic `batch_commit`; `put` is a
/// convenience for single-op batches.
pub trait KvBackend: Send + Sync {
    /// Stores one value.
    fn put(&self, key: &[u8], value: &[u8]) -> Result<(), StorageError>;

    /// Reads one value.
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StorageError>;

    /// Returns every (key, value) pair under a prefix, ascending by key.
    fn range(&self, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>, StorageError>;

    /// Applies a batch atomically: either every op lands or none does.
    fn batch_commit(&self, ops: Vec<BatchOp>) -> Result<(), StorageError>;
}

/// In-memory backend for tests and for running without persistence.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    map: Mutex<BTreeMap<Vec<u8>, Vec<u8>>>,
}

impl MemoryBackend {
    /// Creates an empty backend.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored keys.
    pub fn len(&self) -> usize {
        self.map.lock().expect("backend poisoned").len()
    }

    /// True when nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl KvBackend for MemoryBackend {
    fn put(&self, key: &[u8], value: &[u8]) -> Result<(), StorageError> {
        self.map
            .lock()
            .expect("backend poisoned")
            .insert(key.to_vec(), value.to_vec());
        Ok(())
    }

    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StorageError> {
        Ok(self.map.lock().expect("backend poisoned").get(key).cloned())
    }

    fn range(&self, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>, StorageError> {
        let map = self.map.lock().expect("backend poisoned");
        Ok(map
            .range(prefix.to_vec()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect())
    }

    fn batch_commit(&self, ops: Vec<BatchOp>) -> Result<(), StorageError> {
        let mut map = self.map.lock().expect("backend poisoned");
        for op in ops {
            match op {
                BatchOp::Put(key, value) => {
                    map.insert(key, value);
                }
                BatchOp::Delete(key) => {
                    map.remove(&key);
                }
            }
        }
        Ok(())
    }
}
