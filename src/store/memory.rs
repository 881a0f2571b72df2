//! In-process snapshot store.

use std::collections::BTreeMap;
use std::sync::{Mutex, PoisonError};

use super::{SnapshotStore, check_key};
use crate::model::StoreError;

#[derive(Debug, Default)]
pub struct MemorySnapshotStore {
    documents: Mutex<BTreeMap<String, String>>,
}

impl MemorySnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.documents.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl SnapshotStore for MemorySnapshotStore {
    fn list_keys(&self) -> Result<Vec<String>, StoreError> {
        let documents = self.documents.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(documents.keys().cloned().collect())
    }

    fn read(&self, key: &str) -> Result<String, StoreError> {
        let documents = self.documents.lock().unwrap_or_else(PoisonError::into_inner);
        documents
            .get(key)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(key.to_string()))
    }

    fn write(&self, key: &str, document: &str) -> Result<(), StoreError> {
        check_key(key)?;
        let mut documents = self.documents.lock().unwrap_or_else(PoisonError::into_inner);
        if documents.contains_key(key) {
            return Err(StoreError::AlreadyExists(key.to_string()));
        }
        documents.insert(key.to_string(), document.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_read_and_immutability() {
        let store = MemorySnapshotStore::new();
        store.write("2023-03-21", "{}").unwrap();

        assert_eq!(store.read("2023-03-21").unwrap(), "{}");
        assert!(matches!(store.write("2023-03-21", "{}"), Err(StoreError::AlreadyExists(_))));
        assert!(matches!(store.write("today", "{}"), Err(StoreError::InvalidKey(_))));
        assert_eq!(store.len(), 1);
    }
}
