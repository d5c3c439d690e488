//! Read-through `moka` layer over any alignment store.

use async_trait::async_trait;
use moka::future::Cache;
use std::time::Duration;

use super::{AlignmentStore, CacheEntry, PersistenceError};
use crate::config::CacheConfig;

/// Caches `get` results of the inner store.
///
/// Writes reach the inner store before the cache; a failed save leaves the
/// cache untouched.
pub struct CachedAlignmentStore<S> {
    inner: S,
    cache: Cache<String, CacheEntry>,
}

impl<S: AlignmentStore> CachedAlignmentStore<S> {
    pub fn new(inner: S, max_entries: u64, ttl: Duration) -> Self {
        let cache = Cache::builder()
            .max_capacity(max_entries)
            .time_to_live(ttl)
            .build();
        Self { inner, cache }
    }

    pub fn from_config(inner: S, config: &CacheConfig) -> Self {
        Self::new(inner, config.capacity, config.ttl)
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }

    /// Drop every cached entry; the inner store is untouched.
    pub fn invalidate_all(&self) {
        self.cache.invalidate_all();
    }

    pub fn cached_count(&self) -> u64 {
        self.cache.entry_count()
    }
}

#[async_trait]
impl<S: AlignmentStore> AlignmentStore for CachedAlignmentStore<S> {
    async fn get(&self, chapter_id: &str) -> Result<Option<CacheEntry>, PersistenceError> {
        if let Some(entry) = self.cache.get(chapter_id).await {
            tracing::trace!(chapter_id, "Alignment cache hit");
            return Ok(Some(entry));
        }

        let entry = self.inner.get(chapter_id).await?;
        if let Some(entry) = &entry {
            self.cache
                .insert(chapter_id.to_string(), entry.clone())
                .await;
        }
        Ok(entry)
    }

    async fn save(&self, entry: &CacheEntry) -> Result<(), PersistenceError> {
        self.inner.save(entry).await?;
        self.cache
            .insert(entry.chapter_id.clone(), entry.clone())
            .await;
        Ok(())
    }

    async fn delete(&self, chapter_id: &str) -> Result<bool, PersistenceError> {
        self.cache.invalidate(chapter_id).await;
        self.inner.delete(chapter_id).await
    }

    async fn count(&self) -> Result<u64, PersistenceError> {
        self.inner.count().await
    }
}
