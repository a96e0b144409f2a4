//! Persistence collaborator.
//!
//! The engine treats durable storage as an opaque key/value sink with four
//! operations and one guarantee: `batch_commit` is crash-atomic. Everything
//! the engine persists — row payload envelopes, the namespace-definition
//! journal and the namespace meta KV — goes through [`KvBackend`].
//!
//! Record envelopes are crc32-framed JSON so a torn or bit-rotted value is
//! detected at replay time and surfaced as `ErrIO`.

mod backend;
mod codec;

pub use backend::{BatchOp, KvBackend, MemoryBackend};
pub use codec::{decode_record, encode_record};

use thiserror::Error;

/// Failures inside the persistence collaborator.
///
/// Converted into the engine's `ErrIO` at the namespace boundary; the message
/// passes through unchanged.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("io failure: {0}")]
    Io(#[from] std::io::Error),
    #[error("corrupt record: {0}")]
    Corrupt(String),
}

impl From<StorageError> for crate::error::Error {
    fn from(err: StorageError) -> Self {
        crate::error::Error::io(err.to_string())
    }
}

/// Key of a persisted row envelope.
pub fn item_key(namespace: &str, row: u64) -> Vec<u8> {
    let mut key = item_prefix(namespace);
    key.extend_from_slice(&row.to_be_bytes());
    key
}

/// Prefix under which a namespace's rows live.
pub fn item_prefix(namespace: &str) -> Vec<u8> {
    format!("i/{}/", namespace.to_lowercase()).into_bytes()
}

/// Key of a persisted meta entry.
pub fn meta_key(namespace: &str, key: &str) -> Vec<u8> {
    let mut out = meta_prefix(namespace);
    out.extend_from_slice(key.as_bytes());
    out
}

/// Prefix under which a namespace's meta KV lives.
pub fn meta_prefix(namespace: &str) -> Vec<u8> {
    format!("m/{}/", namespace.to_lowercase()).into_bytes()
}

/// Key of the persisted namespace definition.
pub fn def_key(namespace: &str) -> Vec<u8> {
    format!("d/{}", namespace.to_lowercase()).into_bytes()
}

/// Extracts the row-id from an item key produced by [`item_key`].
pub fn row_from_item_key(prefix_len: usize, key: &[u8]) -> Option<u64> {
    let tail = key.get(prefix_len..)?;
    let bytes: [u8; 8] = tail.try_into().ok()?;
    Some(u64::from_be_bytes(bytes))
}
