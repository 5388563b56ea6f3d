//! Bog Store - Durable key-value storage for content-addressed blobs.
//!
//! The core only requires the [`ContentStore`] contract: get/put/remove/clear
//! plus `keys` for one-time backend migration. Which backend sits underneath
//! is a deployment decision; two are provided:
//! - [`MemoryStore`] for tests and ephemeral nodes
//! - [`RocksStore`] for durable daemons
//!
//! No validation of content against its key happens here; that belongs to
//! the codec and the log manager.

#![deny(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms)]

pub mod memory;
pub mod rocks;

pub use memory::MemoryStore;
pub use rocks::RocksStore;

use thiserror::Error;

/// Errors from storage operations.
///
/// Callers treat these as fatal for the single operation: log a warning and
/// skip the mutation, never retry in a loop.
#[derive(Debug, Error)]
pub enum StoreError {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Backend database error
    #[error("database error: {0}")]
    Database(String),
}

/// Durable key-value contract for arbitrary string keys and byte values.
///
/// Implementations must tolerate concurrent access from many connection
/// handlers plus periodic background tasks. Last-write-wins on `put` is
/// acceptable: every write to a content-addressed key carries byte-identical
/// content by construction.
pub trait ContentStore: Send + Sync {
    /// Returns the value stored under `key`, if any.
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError>;

    /// Stores `value` under `key`, overwriting any previous value.
    fn put(&self, key: &str, value: &[u8]) -> Result<(), StoreError>;

    /// Removes the value stored under `key`. Removing an absent key is a
    /// no-op.
    fn remove(&self, key: &str) -> Result<(), StoreError>;

    /// Removes every stored value.
    fn clear(&self) -> Result<(), StoreError>;

    /// Lists every stored key. Used only for one-time migration between
    /// backends, never on the hot path.
    fn keys(&self) -> Result<Vec<String>, StoreError>;
}

impl dyn ContentStore + '_ {
    /// Convenience: fetches a value and decodes it as utf-8 text.
    pub fn get_text(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self
            .get(key)?
            .and_then(|bytes| String::from_utf8(bytes).ok()))
    }
}

/// Copies every entry of `from` into `to`, skipping keys the target already
/// holds. One-time migration between backends.
pub fn migrate(from: &dyn ContentStore, to: &dyn ContentStore) -> Result<usize, StoreError> {
    let mut copied = 0;
    for key in from.keys()? {
        if to.get(&key)?.is_some() {
            continue;
        }
        if let Some(value) = from.get(&key)? {
            to.put(&key, &value)?;
            copied += 1;
        }
    }
    tracing::info!(copied, "migrated store entries");
    Ok(copied)
}
