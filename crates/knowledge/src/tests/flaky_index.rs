//! Failure-injecting `VectorIndex` double over an in-memory `SqliteIndex`.

use crate::index::SqliteIndex;
use crate::types::{IndexEntry, NewEntry, ScoredEntry};
use crate::vector_index::VectorIndex;
use qabase_core::{AppError, AppResult};
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

pub struct FlakyIndex {
    inner: SqliteIndex,
    /// Inserts containing one of these record ids fail
    failing_records: Mutex<HashSet<String>>,
    /// Deletes containing one of these index keys fail
    failing_keys: Mutex<HashSet<String>>,
    pub insert_calls: AtomicUsize,
    pub delete_calls: AtomicUsize,
}

impl FlakyIndex {
    pub fn new() -> Self {
        Self {
            inner: SqliteIndex::open_in_memory().unwrap(),
            failing_records: Mutex::new(HashSet::new()),
            failing_keys: Mutex::new(HashSet::new()),
            insert_calls: AtomicUsize::new(0),
            delete_calls: AtomicUsize::new(0),
        }
    }

    pub fn fail_inserts_for(&self, record_id: &str) {
        self.failing_records.lock().unwrap().insert(record_id.to_string());
    }

    pub fn fail_deletes_of(&self, index_key: &str) {
        self.failing_keys.lock().unwrap().insert(index_key.to_string());
    }

    pub fn heal(&self) {
        self.failing_records.lock().unwrap().clear();
        self.failing_keys.lock().unwrap().clear();
    }
}

impl VectorIndex for FlakyIndex {
    fn get_all(&self) -> AppResult<Vec<IndexEntry>> {
        self.inner.get_all()
    }

    fn delete(&self, index_keys: &[String]) -> AppResult<usize> {
        self.delete_calls.fetch_add(1, Ordering::SeqCst);
        let failing = self.failing_keys.lock().unwrap();
        if let Some(key) = index_keys.iter().find(|k| failing.contains(*k)) {
            return Err(AppError::Index(format!("injected delete failure for {}", key)));
        }
        drop(failing);
        self.inner.delete(index_keys)
    }

    fn insert(&self, entries: &[NewEntry]) -> AppResult<Vec<String>> {
        self.insert_calls.fetch_add(1, Ordering::SeqCst);
        let failing = self.failing_records.lock().unwrap();
        if let Some(entry) = entries
            .iter()
            .find(|e| failing.contains(&e.metadata.id.key()))
        {
            return Err(AppError::Index(format!(
                "injected insert failure for record {}",
                entry.metadata.id
            )));
        }
        drop(failing);
        self.inner.insert(entries)
    }

    fn nearest(&self, query_embedding: &[f32], fetch_k: usize) -> AppResult<Vec<ScoredEntry>> {
        self.inner.nearest(query_embedding, fetch_k)
    }
}
