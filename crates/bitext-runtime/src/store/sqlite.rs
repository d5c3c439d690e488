//! SQLite alignment store.
//!
//! WAL journal, embedded migrations, and a delete-then-insert save inside
//! one transaction. The connection sits behind a mutex and every call runs
//! on the blocking pool.

use async_trait::async_trait;
use bitext_core::AlignmentMethod;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use super::{AlignmentStore, CacheEntry, PersistenceError};

const MIGRATIONS: &[(&str, &str)] = &[(
    "001_alignments",
    include_str!("../../migrations/001_alignments.sql"),
)];

/// Store backed by a single SQLite file.
#[derive(Debug, Clone)]
pub struct SqliteAlignmentStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteAlignmentStore {
    /// Open (or create) the database and apply pending migrations.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, PersistenceError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|source| PersistenceError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        let conn = Connection::open(path)?;
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;",
        )?;
        Self::init(conn)
    }

    pub fn open_in_memory() -> Result<Self, PersistenceError> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self, PersistenceError> {
        conn.busy_timeout(Duration::from_millis(5000))?;
        migrate(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    async fn with_conn<T, F>(&self, f: F) -> Result<T, PersistenceError>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> Result<T, PersistenceError> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || f(&mut conn.lock()))
            .await
            .map_err(|e| PersistenceError::Task(e.to_string()))?
    }
}

fn migrate(conn: &Connection) -> Result<(), PersistenceError> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version TEXT PRIMARY KEY,
            applied_at TEXT NOT NULL
        )",
        [],
    )?;

    for (version, sql) in MIGRATIONS {
        let applied: Option<i64> = conn
            .query_row(
                "SELECT 1 FROM schema_migrations WHERE version = ?1",
                [version],
                |row| row.get(0),
            )
            .optional()?;
        if applied.is_some() {
            continue;
        }
        conn.execute_batch(sql)?;
        conn.execute(
            "INSERT INTO schema_migrations (version, applied_at) VALUES (?1, ?2)",
            params![version, Utc::now().to_rfc3339()],
        )?;
        tracing::debug!(version, "Applied store migration");
    }
    Ok(())
}

struct Row {
    chapter_id: String,
    alignment_json: String,
    metrics_json: String,
    method: String,
    model_used: Option<String>,
    template_used: Option<String>,
    created_at: String,
}

impl Row {
    fn into_entry(self) -> Result<CacheEntry, PersistenceError> {
        let corrupt = |message: String| PersistenceError::Corrupt {
            chapter_id: self.chapter_id.clone(),
            message,
        };

        let method = AlignmentMethod::parse(&self.method)
            .ok_or_else(|| corrupt(format!("unknown method {:?}", self.method)))?;
        let alignment = serde_json::from_str(&self.alignment_json)
            .map_err(|e| corrupt(format!("alignment: {}", e)))?;
        let metrics = serde_json::from_str(&self.metrics_json)
            .map_err(|e| corrupt(format!("metrics: {}", e)))?;
        let created_at = DateTime::parse_from_rfc3339(&self.created_at)
            .map_err(|e| corrupt(format!("created_at: {}", e)))?
            .with_timezone(&Utc);

        Ok(CacheEntry {
            chapter_id: self.chapter_id.clone(),
            alignment,
            metrics,
            method,
            model_used: self.model_used,
            template_used: self.template_used,
            created_at,
        })
    }
}

#[async_trait]
impl AlignmentStore for SqliteAlignmentStore {
    async fn get(&self, chapter_id: &str) -> Result<Option<CacheEntry>, PersistenceError> {
        let chapter_id = chapter_id.to_string();
        self.with_conn(move |conn| {
            let row = conn
                .query_row(
                    "SELECT chapter_id, alignment_json, metrics_json, method, model_used, template_used, created_at
                     FROM alignments WHERE chapter_id = ?1",
                    [&chapter_id],
                    |row| {
                        Ok(Row {
                            chapter_id: row.get(0)?,
                            alignment_json: row.get(1)?,
                            metrics_json: row.get(2)?,
                            method: row.get(3)?,
                            model_used: row.get(4)?,
                            template_used: row.get(5)?,
                            created_at: row.get(6)?,
                        })
                    },
                )
                .optional()?;
            row.map(Row::into_entry).transpose()
        })
        .await
    }

    async fn save(&self, entry: &CacheEntry) -> Result<(), PersistenceError> {
        let alignment_json = serde_json::to_string(&entry.alignment)?;
        let metrics_json = serde_json::to_string(&entry.metrics)?;
        let entry = entry.clone();

        self.with_conn(move |conn| {
            let tx = conn.transaction()?;
            tx.execute(
                "DELETE FROM alignments WHERE chapter_id = ?1",
                [&entry.chapter_id],
            )?;
            tx.execute(
                "INSERT INTO alignments (chapter_id, alignment_json, metrics_json, method, model_used, template_used, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    entry.chapter_id,
                    alignment_json,
                    metrics_json,
                    entry.method.as_str(),
                    entry.model_used,
                    entry.template_used,
                    entry.created_at.to_rfc3339(),
                ],
            )?;
            tx.commit()?;
            Ok(())
        })
        .await
    }

    async fn delete(&self, chapter_id: &str) -> Result<bool, PersistenceError> {
        let chapter_id = chapter_id.to_string();
        self.with_conn(move |conn| {
            let removed = conn.execute("DELETE FROM alignments WHERE chapter_id = ?1", [&chapter_id])?;
            Ok(removed > 0)
        })
        .await
    }

    async fn count(&self) -> Result<u64, PersistenceError> {
        self.with_conn(|conn| {
            let count: i64 = conn.query_row("SELECT COUNT(1) FROM alignments", [], |row| row.get(0))?;
            Ok(count as u64)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::test_support::entry;

    #[tokio::test]
    async fn test_save_get_round_trip() {
        let store = SqliteAlignmentStore::open_in_memory().unwrap();
        let saved = entry("ch1", AlignmentMethod::Llm);
        store.save(&saved).await.unwrap();

        let loaded = store.get("ch1").await.unwrap().unwrap();
        assert_eq!(loaded.chapter_id, "ch1");
        assert_eq!(loaded.method, AlignmentMethod::Llm);
        assert_eq!(loaded.alignment, saved.alignment);
        assert_eq!(loaded.metrics.total_pairs, saved.metrics.total_pairs);
        assert_eq!(loaded.model_used, saved.model_used);
        assert_eq!(loaded.created_at, saved.created_at);
        assert!(store.get("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_second_save_leaves_one_entry() {
        let store = SqliteAlignmentStore::open_in_memory().unwrap();
        store
            .save(&entry("ch1", AlignmentMethod::RegexFallback))
            .await
            .unwrap();
        store.save(&entry("ch1", AlignmentMethod::Llm)).await.unwrap();
        store.save(&entry("ch2", AlignmentMethod::Llm)).await.unwrap();

        assert_eq!(store.count().await.unwrap(), 2);
        assert_eq!(
            store.get("ch1").await.unwrap().unwrap().method,
            AlignmentMethod::Llm
        );
    }

    #[tokio::test]
    async fn test_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("alignments.db");

        {
            let store = SqliteAlignmentStore::open(&path).unwrap();
            store.save(&entry("ch1", AlignmentMethod::Llm)).await.unwrap();
        }

        let reopened = SqliteAlignmentStore::open(&path).unwrap();
        assert_eq!(reopened.count().await.unwrap(), 1);
        assert!(reopened.get("ch1").await.unwrap().is_some());
        assert!(reopened.delete("ch1").await.unwrap());
        assert!(!reopened.delete("ch1").await.unwrap());
    }

    #[tokio::test]
    async fn test_corrupt_row_reported() {
        let store = SqliteAlignmentStore::open_in_memory().unwrap();
        store
            .with_conn(|conn| {
                conn.execute(
                    "INSERT INTO alignments (chapter_id, alignment_json, metrics_json, method, created_at)
                     VALUES ('bad', '[]', '{}', 'telepathy', '2025-01-01T00:00:00Z')",
                    [],
                )?;
                Ok(())
            })
            .await
            .unwrap();

        assert!(matches!(
            store.get("bad").await,
            Err(PersistenceError::Corrupt { .. })
        ));
    }
}
