//! RocksDB store backend.

use std::path::Path;

use rocksdb::{IteratorMode, Options, DB};
use tracing::debug;

use crate::{ContentStore, StoreError};

/// A durable store backed by RocksDB.
pub struct RocksStore {
    db: DB,
}

impl RocksStore {
    /// Opens (or creates) a store at the given path.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let mut opts = Options::default();
        opts.create_if_missing(true);

        let db = DB::open(&opts, path).map_err(|e| StoreError::Database(e.to_string()))?;
        debug!(path = %path.display(), "opened rocksdb store");
        Ok(Self { db })
    }
}

impl ContentStore for RocksStore {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        self.db
            .get(key.as_bytes())
            .map_err(|e| StoreError::Database(e.to_string()))
    }

    fn put(&self, key: &str, value: &[u8]) -> Result<(), StoreError> {
        self.db
            .put(key.as_bytes(), value)
            .map_err(|e| StoreError::Database(e.to_string()))
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        self.db
            .delete(key.as_bytes())
            .map_err(|e| StoreError::Database(e.to_string()))
    }

    fn clear(&self) -> Result<(), StoreError> {
        for key in self.keys()? {
            self.remove(&key)?;
        }
        Ok(())
    }

    fn keys(&self) -> Result<Vec<String>, StoreError> {
        let mut keys = Vec::new();
        for item in self.db.iterator(IteratorMode::Start) {
            let (key, _) = item.map_err(|e| StoreError::Database(e.to_string()))?;
            if let Ok(key) = String::from_utf8(key.to_vec()) {
                keys.push(key);
            }
        }
        Ok(keys)
    }
}
