use crate::error::{StorageError, StorageResult};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::sync::RwLock;

/// Durable string key/value storage, the local counterpart of the remote
/// tables.
pub trait LocalStore: Send + Sync {
    fn get(&self, key: &str) -> StorageResult<Option<String>>;

    fn set(&self, key: &str, value: &str) -> StorageResult<()>;

    fn remove(&self, key: &str) -> StorageResult<()>;
}

/// JSON helpers layered over any [`LocalStore`].
pub trait LocalStoreExt: LocalStore {
    /// Reads and decodes a JSON value. A missing key is `Ok(None)`; a value
    /// that fails to decode is [`StorageError::Malformed`].
    fn get_json<T: DeserializeOwned>(&self, key: &str) -> StorageResult<Option<T>> {
        match self.get(key)? {
            None => Ok(None),
            Some(raw) if raw.trim().is_empty() || raw.trim() == "null" => Ok(None),
            Some(raw) => serde_json::from_str(&raw)
                .map(Some)
                .map_err(|source| StorageError::Malformed {
                    key: key.to_string(),
                    source,
                }),
        }
    }

    fn set_json<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> StorageResult<()> {
        let encoded = serde_json::to_string(value)?;
        self.set(key, &encoded)
    }
}

impl<S: LocalStore + ?Sized> LocalStoreExt for S {}

/// Process-local store, used in tests and for throwaway sessions.
#[derive(Debug, Default)]
pub struct MemoryStore {
    values: RwLock<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> StorageResult<usize> {
        let values = self.values.read().map_err(|_| StorageError::Poisoned)?;
        Ok(values.len())
    }

    pub fn is_empty(&self) -> StorageResult<bool> {
        Ok(self.len()? == 0)
    }
}

impl LocalStore for MemoryStore {
    fn get(&self, key: &str) -> StorageResult<Option<String>> {
        let values = self.values.read().map_err(|_| StorageError::Poisoned)?;
        Ok(values.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> StorageResult<()> {
        let mut values = self.values.write().map_err(|_| StorageError::Poisoned)?;
        values.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> StorageResult<()> {
        let mut values = self.values.write().map_err(|_| StorageError::Poisoned)?;
        values.remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::panic::{AssertUnwindSafe, catch_unwind};

    #[test]
    fn poisoned_store_reports_errors() {
        let store = MemoryStore::new();
        store.set("a", "1").unwrap();
        let _ = catch_unwind(AssertUnwindSafe(|| {
            let _guard = store.values.write().unwrap();
            panic!("poison");
        }));

        assert!(matches!(store.len(), Err(StorageError::Poisoned)));
        assert!(matches!(store.is_empty(), Err(StorageError::Poisoned)));
        assert!(matches!(store.get("a"), Err(StorageError::Poisoned)));
    }
}
