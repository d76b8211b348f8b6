//! Key-value store abstraction

use crate::Result;
use parking_lot::RwLock;
use std::collections::BTreeMap;

/// Synchronous string key-value persistence
///
/// Shared process-wide; implementations must tolerate concurrent callers
/// writing disjoint keys.
pub trait KeyValueStore: Send + Sync {
    /// Read a value
    fn get(&self, key: &str) -> Result<Option<String>>;

    /// Insert or replace a value
    fn set(&self, key: &str, value: &str) -> Result<()>;

    /// Delete a value, returning whether it existed
    fn remove(&self, key: &str) -> Result<bool>;

    /// All keys starting with `prefix`, in lexicographic order
    fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>>;

    /// Delete everything
    fn clear(&self) -> Result<()>;

    /// `true` if a value exists for `key`
    fn contains(&self, key: &str) -> Result<bool> {
        Ok(self.get(key)?.is_some())
    }
}

/// In-memory store
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RwLock<BTreeMap<String, String>>,
}

impl MemoryStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored entries
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// `true` if nothing is stored
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.entries.read().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.entries
            .write()
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<bool> {
        Ok(self.entries.write().remove(key).is_some())
    }

    fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>> {
        Ok(self
            .entries
            .read()
            .range(prefix.to_string()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, _)| k.clone())
            .collect())
    }

    fn clear(&self) -> Result<()> {
        self.entries.write().clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_store_basic() {
        let store = MemoryStore::new();
        assert!(store.is_empty());
        assert_eq!(store.get("a").unwrap(), None);

        store.set("a", "1").unwrap();
        store.set("a", "2").unwrap();
        assert_eq!(store.get("a").unwrap().as_deref(), Some("2"));
        assert!(store.contains("a").unwrap());
        assert_eq!(store.len(), 1);

        assert!(store.remove("a").unwrap());
        assert!(!store.remove("a").unwrap());
    }

    #[test]
    fn test_memory_store_prefix_scan() {
        let store = MemoryStore::new();
        store.set("tx_a_002", "x").unwrap();
        store.set("tx_a_001", "x").unwrap();
        store.set("tx_b_001", "x").unwrap();
        store.set("account_a", "x").unwrap();

        assert_eq!(
            store.keys_with_prefix("tx_a_").unwrap(),
            vec!["tx_a_001".to_string(), "tx_a_002".to_string()]
        );

        store.clear().unwrap();
        assert!(store.is_empty());
    }
}
