//! Durable key/value persistence.
//!
//! Every logical concern owns exactly one [`StorageKey`]. Keys are written
//! independently; nothing here is transactional across keys.

mod file_store;
mod memory_store;
mod storage_key;

pub use file_store::FileStore;
pub use memory_store::MemoryStore;
pub use storage_key::StorageKey;

use log::{error, warn};
use serde::de::DeserializeOwned;
use serde::Serialize;

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("storage i/o failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("stored value is not valid json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("storage backend unavailable: {0}")]
    Unavailable(String),
}

pub trait KeyValueStore {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError>;
    fn set(&self, key: &str, value: &str) -> Result<(), StorageError>;
    fn remove(&self, key: &str) -> Result<(), StorageError>;
}

/// Reads and parses `key`. Missing, unreadable and unparseable values all
/// come back as `None`.
pub fn load_json<T: DeserializeOwned>(store: &dyn KeyValueStore, key: StorageKey) -> Option<T> {
    let raw = match store.get(key.as_str()) {
        Ok(Some(raw)) => raw,
        Ok(None) => return None,
        Err(err) => {
            warn!(target: "storage", "Could not read {}: {}", key, err);
            return None;
        }
    };
    match serde_json::from_str::<T>(&raw) {
        Ok(value) => Some(value),
        Err(err) => {
            warn!(target: "storage", "Discarding corrupt value under {}: {}", key, err);
            None
        }
    }
}

pub fn load_json_or_default<T: DeserializeOwned + Default>(
    store: &dyn KeyValueStore,
    key: StorageKey,
) -> T {
    load_json(store, key).unwrap_or_default()
}

/// Serializes and writes `value`; returns whether it reached the store.
pub fn save_json<T: Serialize>(store: &dyn KeyValueStore, key: StorageKey, value: &T) -> bool {
    let result = serde_json::to_string(value)
        .map_err(StorageError::from)
        .and_then(|raw| store.set(key.as_str(), &raw));
    match result {
        Ok(()) => true,
        Err(err) => {
            error!(target: "storage", "Could not write {}: {}", key, err);
            false
        }
    }
}

pub fn remove_key(store: &dyn KeyValueStore, key: StorageKey) -> bool {
    match store.remove(key.as_str()) {
        Ok(()) => true,
        Err(err) => {
            error!(target: "storage", "Could not remove {}: {}", key, err);
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    struct BrokenStore;

    impl KeyValueStore for BrokenStore {
        fn get(&self, _key: &str) -> Result<Option<String>, StorageError> {
            Err(StorageError::Unavailable("quota".to_string()))
        }
        fn set(&self, _key: &str, _value: &str) -> Result<(), StorageError> {
            Err(StorageError::Unavailable("quota".to_string()))
        }
        fn remove(&self, _key: &str) -> Result<(), StorageError> {
            Err(StorageError::Unavailable("quota".to_string()))
        }
    }

    #[test]
    fn test_round_trip() {
        let store = MemoryStore::new();
        let seen: HashSet<String> = ["a".to_string(), "b".to_string()].into();
        assert!(save_json(&store, StorageKey::InfiniteSeen, &seen));
        let back: HashSet<String> = load_json(&store, StorageKey::InfiniteSeen).unwrap();
        assert_eq!(back, seen);
    }

    #[test]
    fn test_corrupt_value_reads_as_absent() {
        let store = MemoryStore::new();
        store
            .set(StorageKey::InfiniteSeen.as_str(), "{not json")
            .unwrap();
        let loaded: Option<HashSet<String>> = load_json(&store, StorageKey::InfiniteSeen);
        assert!(loaded.is_none());
        let defaulted: HashSet<String> = load_json_or_default(&store, StorageKey::InfiniteSeen);
        assert!(defaulted.is_empty());
    }

    #[test]
    fn test_schema_mismatch_reads_as_absent() {
        let store = MemoryStore::new();
        store.set(StorageKey::HangulSeen.as_str(), "42").unwrap();
        let loaded: Option<HashSet<String>> = load_json(&store, StorageKey::HangulSeen);
        assert!(loaded.is_none());
    }

    #[test]
    fn test_broken_backend_degrades() {
        let loaded: Option<u32> = load_json(&BrokenStore, StorageKey::Visited);
        assert!(loaded.is_none());
        assert!(!save_json(&BrokenStore, StorageKey::Visited, &true));
        assert!(!remove_key(&BrokenStore, StorageKey::Visited));
    }
}
