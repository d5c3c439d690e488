//! Persistence of finished alignments.
//!
//! One active [`CacheEntry`] per chapter id. Entries are replaced only by an
//! explicit save; nothing here notices when the chapter text changes.

mod cached;
mod memory;
mod sqlite;

pub use cached::CachedAlignmentStore;
pub use memory::MemoryAlignmentStore;
pub use sqlite::SqliteAlignmentStore;

use async_trait::async_trait;
use bitext_core::{AlignmentMethod, AlignmentResult, QualityMetrics, RenderPayload};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

use crate::controller::AlignmentOutcome;

/// Errors from alignment stores.
#[derive(Error, Debug)]
pub enum PersistenceError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Failed to encode entry: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("Stored entry for chapter {chapter_id} is corrupt: {message}")]
    Corrupt { chapter_id: String, message: String },

    #[error("Failed to prepare {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Store task failed: {0}")]
    Task(String),
}

/// A persisted alignment for one chapter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub chapter_id: String,
    pub alignment: AlignmentResult,
    pub metrics: QualityMetrics,
    pub method: AlignmentMethod,
    pub model_used: Option<String>,
    pub template_used: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl CacheEntry {
    pub fn from_outcome(chapter_id: impl Into<String>, outcome: &AlignmentOutcome) -> Self {
        Self {
            chapter_id: chapter_id.into(),
            alignment: outcome.result.clone(),
            metrics: outcome.metrics.clone(),
            method: outcome.method,
            model_used: outcome.model_used.clone(),
            template_used: outcome.template_used.clone(),
            created_at: Utc::now(),
        }
    }

    pub fn render(&self) -> RenderPayload {
        RenderPayload::new(&self.alignment, &self.metrics, self.method)
    }
}

/// Storage for alignments keyed by chapter id.
///
/// `save` replaces any existing entry for the chapter. Two concurrent saves
/// for the same chapter are not ordered by this contract; callers serialize
/// them.
#[async_trait]
pub trait AlignmentStore: Send + Sync {
    async fn get(&self, chapter_id: &str) -> Result<Option<CacheEntry>, PersistenceError>;

    async fn save(&self, entry: &CacheEntry) -> Result<(), PersistenceError>;

    /// Remove the chapter's entry; `true` if one existed.
    async fn delete(&self, chapter_id: &str) -> Result<bool, PersistenceError>;

    async fn count(&self) -> Result<u64, PersistenceError>;
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entry_renders_payload() {
        let entry = test_support::entry("ch1", AlignmentMethod::RegexFallback);
        let payload = entry.render();
        assert_eq!(payload.alignments.len(), entry.alignment.len());

        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["stats"]["method"], "regex_fallback");
        assert!(json["alignments"][0]["type"].is_string());
    }

    #[test]
    fn test_entry_from_fallback_outcome() {
        let outcome = crate::AlignmentController::align_offline("Да.", "是。").unwrap();
        let entry = CacheEntry::from_outcome("ch9", &outcome);
        assert_eq!(entry.chapter_id, "ch9");
        assert_eq!(entry.method, AlignmentMethod::RegexFallback);
        assert_eq!(entry.metrics.quality_score, 0.5);
        assert!(entry.model_used.is_none());
    }
}
