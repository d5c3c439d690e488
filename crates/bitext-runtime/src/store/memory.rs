//! In-memory alignment store.

use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;

use super::{AlignmentStore, CacheEntry, PersistenceError};

/// Store backed by a `HashMap`; contents vanish with the process.
#[derive(Debug, Default)]
pub struct MemoryAlignmentStore {
    entries: RwLock<HashMap<String, CacheEntry>>,
}

impl MemoryAlignmentStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AlignmentStore for MemoryAlignmentStore {
    async fn get(&self, chapter_id: &str) -> Result<Option<CacheEntry>, PersistenceError> {
        Ok(self.entries.read().get(chapter_id).cloned())
    }

    async fn save(&self, entry: &CacheEntry) -> Result<(), PersistenceError> {
        self.entries
            .write()
            .insert(entry.chapter_id.clone(), entry.clone());
        Ok(())
    }

    async fn delete(&self, chapter_id: &str) -> Result<bool, PersistenceError> {
        Ok(self.entries.write().remove(chapter_id).is_some())
    }

    async fn count(&self) -> Result<u64, PersistenceError> {
        Ok(self.entries.read().len() as u64)
    }
}
