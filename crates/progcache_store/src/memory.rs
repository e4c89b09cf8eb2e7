//! Volatile in-memory blob store.

use std::collections::BTreeMap;
use std::time::SystemTime;

use parking_lot::RwLock;

use crate::{BinaryStore, EntryId, StoreError, StoreStats};

/// Keeps blobs in a process-local map. Contents are lost when the store
/// is dropped.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RwLock<BTreeMap<EntryId, (Vec<u8>, SystemTime)>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

impl BinaryStore for MemoryStore {
    fn exists(&self, id: &EntryId) -> bool {
        self.entries.read().contains_key(id)
    }

    fn read(&self, id: &EntryId) -> Result<Option<Vec<u8>>, StoreError> {
        Ok(self.entries.read().get(id).map(|(bytes, _)| bytes.clone()))
    }

    fn write(&self, id: &EntryId, bytes: &[u8]) -> Result<(), StoreError> {
        id.validate()?;
        self.entries
            .write()
            .insert(id.clone(), (bytes.to_vec(), SystemTime::now()));
        Ok(())
    }

    fn delete(&self, id: &EntryId) -> Result<bool, StoreError> {
        Ok(self.entries.write().remove(id).is_some())
    }

    fn keys(&self) -> Result<Vec<EntryId>, StoreError> {
        Ok(self.entries.read().keys().cloned().collect())
    }

    fn stats(&self) -> Result<StoreStats, StoreError> {
        let entries = self.entries.read();
        let now = SystemTime::now();
        Ok(StoreStats {
            entry_count: entries.len(),
            total_size_bytes: entries.values().map(|(b, _)| b.len() as u64).sum(),
            oldest_entry_age: entries
                .values()
                .map(|(_, t)| *t)
                .min()
                .and_then(|t| now.duration_since(t).ok()),
        })
    }

    fn clear(&self) -> Result<usize, StoreError> {
        let mut entries = self.entries.write();
        let removed = entries.len();
        entries.clear();
        Ok(removed)
    }

    fn location(&self) -> String {
        "memory".to_string()
    }
}
