//! SQLite-backed vector index.
//!
//! Embeddings are stored as little-endian `f32` blobs and metadata as JSON.
//! Similarity is computed in Rust over a full scan, which is fine at the
//! size of a curated QA base.

use crate::types::{EntryMetadata, IndexEntry, NewEntry, ScoredEntry};
use crate::vector_index::{cosine_similarity, VectorIndex};
use chrono::Utc;
use qabase_core::{AppError, AppResult};
use rusqlite::{params, Connection};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

const SCHEMA: &str = r#"
    CREATE TABLE IF NOT EXISTS entries (
        index_key TEXT PRIMARY KEY,
        record_id TEXT NOT NULL,
        text TEXT NOT NULL,
        embedding BLOB NOT NULL,
        metadata TEXT NOT NULL,
        inserted_at TEXT NOT NULL
    );

    CREATE INDEX IF NOT EXISTS idx_entries_record ON entries(record_id);
"#;

pub struct SqliteIndex {
    conn: Mutex<Connection>,
}

impl SqliteIndex {
    /// Open (or create) the index database at `db_path`.
    pub fn open(db_path: &Path) -> AppResult<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| AppError::Index(format!("Failed to create index directory: {}", e)))?;
        }

        let conn = Connection::open(db_path)
            .map_err(|e| AppError::Index(format!("Failed to open SQLite index: {}", e)))?;

        tracing::debug!("Opened SQLite index at {:?}", db_path);
        Self::init(conn)
    }

    /// Index that lives only as long as this value.
    pub fn open_in_memory() -> AppResult<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| AppError::Index(format!("Failed to open in-memory index: {}", e)))?;
        Self::init(conn)
    }

    fn init(conn: Connection) -> AppResult<Self> {
        conn.execute_batch(SCHEMA)
            .map_err(|e| AppError::Index(format!("Failed to create tables: {}", e)))?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> AppResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| AppError::Index("index connection lock poisoned".to_string()))
    }

    /// Rows as `(entry, embedding)`; rows with unreadable metadata are skipped.
    fn scan(&self, with_embeddings: bool) -> AppResult<Vec<(IndexEntry, Vec<f32>)>> {
        let conn = self.conn()?;
        let sql = if with_embeddings {
            "SELECT index_key, text, metadata, embedding FROM entries ORDER BY rowid"
        } else {
            "SELECT index_key, text, metadata, NULL FROM entries ORDER BY rowid"
        };

        let mut stmt = conn
            .prepare(sql)
            .map_err(|e| AppError::Index(format!("Failed to prepare query: {}", e)))?;

        let rows = stmt
            .query_map([], |row| {
                let index_key: String = row.get(0)?;
                let text: String = row.get(1)?;
                let metadata: String = row.get(2)?;
                let embedding: Option<Vec<u8>> = row.get(3)?;
                Ok((index_key, text, metadata, embedding))
            })
            .map_err(|e| AppError::Index(format!("Failed to query entries: {}", e)))?;

        let mut entries = Vec::new();
        for row in rows {
            let (index_key, embedded_text, metadata_json, embedding_bytes) =
                row.map_err(|e| AppError::Index(format!("Failed to read entry: {}", e)))?;

            let metadata: EntryMetadata = match serde_json::from_str(&metadata_json) {
                Ok(metadata) => metadata,
                Err(e) => {
                    tracing::warn!("Skipping index entry {} with bad metadata: {}", index_key, e);
                    continue;
                }
            };

            let embedding = match embedding_bytes {
                Some(bytes) => bytes_to_embedding(&bytes)?,
                None => Vec::new(),
            };

            entries.push((
                IndexEntry {
                    index_key,
                    embedded_text,
                    metadata,
                },
                embedding,
            ));
        }

        Ok(entries)
    }
}

impl VectorIndex for SqliteIndex {
    fn get_all(&self) -> AppResult<Vec<IndexEntry>> {
        let entries: Vec<IndexEntry> = self
            .scan(false)?
            .into_iter()
            .map(|(entry, _)| entry)
            .collect();
        tracing::debug!("Read {} index entries", entries.len());
        Ok(entries)
    }

    fn delete(&self, index_keys: &[String]) -> AppResult<usize> {
        if index_keys.is_empty() {
            return Ok(0);
        }

        let mut conn = self.conn()?;
        let tx = conn
            .transaction()
            .map_err(|e| AppError::Index(format!("Failed to begin transaction: {}", e)))?;

        let mut removed = 0;
        {
            let mut stmt = tx
                .prepare("DELETE FROM entries WHERE index_key = ?1")
                .map_err(|e| AppError::Index(format!("Failed to prepare delete: {}", e)))?;
            for key in index_keys {
                removed += stmt
                    .execute(params![key])
                    .map_err(|e| AppError::Index(format!("Failed to delete {}: {}", key, e)))?;
            }
        }

        tx.commit()
            .map_err(|e| AppError::Index(format!("Failed to commit delete: {}", e)))?;

        tracing::debug!("Deleted {} of {} requested index entries", removed, index_keys.len());
        Ok(removed)
    }

    fn insert(&self, entries: &[NewEntry]) -> AppResult<Vec<String>> {
        if entries.is_empty() {
            return Ok(Vec::new());
        }

        let mut conn = self.conn()?;
        let tx = conn
            .transaction()
            .map_err(|e| AppError::Index(format!("Failed to begin transaction: {}", e)))?;

        let inserted_at = Utc::now().to_rfc3339();
        let mut keys = Vec::with_capacity(entries.len());
        {
            let mut stmt = tx
                .prepare(
                    "INSERT INTO entries (index_key, record_id, text, embedding, metadata, inserted_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                )
                .map_err(|e| AppError::Index(format!("Failed to prepare insert: {}", e)))?;

            for entry in entries {
                let index_key = uuid::Uuid::new_v4().to_string();
                let metadata_json = serde_json::to_string(&entry.metadata)?;

                stmt.execute(params![
                    index_key,
                    entry.metadata.id.key(),
                    entry.embedded_text,
                    embedding_to_bytes(&entry.embedding),
                    metadata_json,
                    inserted_at,
                ])
                .map_err(|e| AppError::Index(format!("Failed to insert entry: {}", e)))?;

                keys.push(index_key);
            }
        }

        tx.commit()
            .map_err(|e| AppError::Index(format!("Failed to commit insert: {}", e)))?;

        tracing::debug!("Inserted {} index entries", keys.len());
        Ok(keys)
    }

    fn nearest(&self, query_embedding: &[f32], fetch_k: usize) -> AppResult<Vec<ScoredEntry>> {
        let mut results: Vec<ScoredEntry> = self
            .scan(true)?
            .into_iter()
            .map(|(entry, embedding)| ScoredEntry {
                score: cosine_similarity(query_embedding, &embedding),
                entry,
                embedding,
            })
            .collect();

        results.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        results.truncate(fetch_k);

        tracing::debug!("Retrieved {} candidates (requested {})", results.len(), fetch_k);
        Ok(results)
    }

    fn count(&self) -> AppResult<usize> {
        let conn = self.conn()?;
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM entries", [], |row| row.get(0))
            .map_err(|e| AppError::Index(format!("Failed to count entries: {}", e)))?;
        Ok(count as usize)
    }
}

/// Convert embedding vector to bytes for storage.
fn embedding_to_bytes(embedding: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(embedding.len() * 4);
    for &value in embedding {
        bytes.extend_from_slice(&value.to_le_bytes());
    }
    bytes
}

/// Convert bytes back to embedding vector.
fn bytes_to_embedding(bytes: &[u8]) -> AppResult<Vec<f32>> {
    if bytes.len() % 4 != 0 {
        return Err(AppError::Index("Invalid embedding bytes length".to_string()));
    }

    Ok(bytes
        .chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{RecordId, RecordStatus};
    use chrono::NaiveDate;
    use tempfile::TempDir;

    fn new_entry(id: u64, text: &str, embedding: Vec<f32>) -> NewEntry {
        NewEntry {
            embedded_text: text.to_string(),
            metadata: EntryMetadata {
                id: RecordId::Numeric(id),
                question: format!("q{}", id),
                version: 1,
                status: RecordStatus::Active,
                created_at: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            },
            embedding,
        }
    }

    #[test]
    fn test_insert_and_get_all() {
        let index = SqliteIndex::open_in_memory().unwrap();
        let keys = index
            .insert(&[
                new_entry(1, "one", vec![1.0, 0.0]),
                new_entry(2, "two", vec![0.0, 1.0]),
            ])
            .unwrap();

        assert_eq!(keys.len(), 2);
        assert_ne!(keys[0], keys[1]);

        let entries = index.get_all().unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].index_key, keys[0]);
        assert_eq!(entries[0].embedded_text, "one");
        assert_eq!(entries[1].metadata.id, RecordId::Numeric(2));
        assert_eq!(index.count().unwrap(), 2);
    }

    #[test]
    fn test_delete_missing_key_is_noop() {
        let index = SqliteIndex::open_in_memory().unwrap();
        let keys = index.insert(&[new_entry(1, "one", vec![1.0])]).unwrap();

        let removed = index
            .delete(&["does-not-exist".to_string(), keys[0].clone()])
            .unwrap();
        assert_eq!(removed, 1);
        assert_eq!(index.delete(&keys).unwrap(), 0);
        assert_eq!(index.count().unwrap(), 0);
    }

    #[test]
    fn test_nearest_orders_by_similarity() {
        let index = SqliteIndex::open_in_memory().unwrap();
        index
            .insert(&[
                new_entry(1, "east", vec![1.0, 0.0]),
                new_entry(2, "north", vec![0.0, 1.0]),
                new_entry(3, "north-east", vec![0.7, 0.7]),
            ])
            .unwrap();

        let results = index.nearest(&[0.0, 1.0], 2).unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].entry.embedded_text, "north");
        assert_eq!(results[1].entry.embedded_text, "north-east");
        assert_eq!(results[0].embedding, vec![0.0, 1.0]);
    }

    #[test]
    fn test_persists_across_reopen() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("state/index.sqlite");

        {
            let index = SqliteIndex::open(&path).unwrap();
            index.insert(&[new_entry(1, "one", vec![1.0])]).unwrap();
        }

        let reopened = SqliteIndex::open(&path).unwrap();
        assert_eq!(reopened.count().unwrap(), 1);
    }

    #[test]
    fn test_embedding_bytes_roundtrip() {
        let original = vec![0.25, -1.5, 3.0];
        let bytes = embedding_to_bytes(&original);
        assert_eq!(bytes_to_embedding(&bytes).unwrap(), original);
        assert!(bytes_to_embedding(&bytes[..5]).is_err());
    }
}
