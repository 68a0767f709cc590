//! Scoped key/value string store
//!
//! Holds the session secret across runs. `SledStore` persists to disk,
//! `MemoryStore` lives only as long as the process.

use crate::error::StoreError;
use dashmap::DashMap;
use std::path::Path;

/// Opaque string store scoped to one profile
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError>;
    fn set(&self, key: &str, value: &str) -> Result<(), StoreError>;
    fn remove(&self, key: &str) -> Result<(), StoreError>;
}

/// In-memory store
#[derive(Default)]
pub struct MemoryStore {
    entries: DashMap<String, String>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.entries.get(key).map(|r| r.value().clone()))
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        self.entries.remove(key);
        Ok(())
    }
}

/// Sled-backed store; each scope is its own tree
pub struct SledStore {
    db: sled::Db,
    tree: sled::Tree,
}

impl SledStore {
    /// Open or create a store at `path`, scoped to `scope`
    pub fn open<P: AsRef<Path>>(path: P, scope: &str) -> Result<Self, StoreError> {
        let db = sled::open(&path)?;
        let tree = db.open_tree(scope)?;

        tracing::info!("Opened key/value store at {:?} (scope {})", path.as_ref(), scope);

        Ok(Self { db, tree })
    }

    /// Flush pending writes to disk
    pub fn flush(&self) -> Result<(), StoreError> {
        self.db.flush()?;
        Ok(())
    }
}

impl KeyValueStore for SledStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        match self.tree.get(key)? {
            Some(bytes) => String::from_utf8(bytes.to_vec())
                .map(Some)
                .map_err(|_| StoreError::Encoding(key.to_string())),
            None => Ok(None),
        }
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.tree.insert(key, value.as_bytes())?;
        self.flush()
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        self.tree.remove(key)?;
        self.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_memory_store() {
        let store = MemoryStore::new();
        assert!(store.get("k").unwrap().is_none());

        store.set("k", "v1").unwrap();
        store.set("k", "v2").unwrap();
        assert_eq!(store.get("k").unwrap().as_deref(), Some("v2"));

        store.remove("k").unwrap();
        assert!(store.get("k").unwrap().is_none());
    }

    #[test]
    fn test_sled_store_survives_reopen() {
        let dir = tempdir().unwrap();

        {
            let store = SledStore::open(dir.path(), "profile").unwrap();
            store.set("secret", "abc123").unwrap();
        }

        let store = SledStore::open(dir.path(), "profile").unwrap();
        assert_eq!(store.get("secret").unwrap().as_deref(), Some("abc123"));
    }

    #[test]
    fn test_sled_scopes_are_isolated() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("db");

        let a = SledStore::open(&db_path, "a").unwrap();
        a.set("secret", "one").unwrap();
        drop(a);

        let b = SledStore::open(&db_path, "b").unwrap();
        assert!(b.get("secret").unwrap().is_none());
    }
}
