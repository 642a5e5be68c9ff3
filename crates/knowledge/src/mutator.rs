//! Index mutator: the only component that writes to the vector index.
//!
//! Deletions run before insertions. Both are attempted as batches first and
//! retried once per item when the batch is rejected, so one bad record cannot
//! block the rest of a sync.

use crate::embeddings::EmbeddingProvider;
use crate::types::{Deletion, EntryMetadata, MutationReport, NewEntry, QaRecord, SyncPlan};
use crate::vector_index::VectorIndex;
use qabase_core::{AppError, AppResult};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::instrument;

const DEFAULT_BATCH_SIZE: usize = 64;

pub struct IndexMutator {
    index: Arc<dyn VectorIndex>,
    embedder: Arc<dyn EmbeddingProvider>,
    batch_size: usize,
}

impl IndexMutator {
    pub fn new(index: Arc<dyn VectorIndex>, embedder: Arc<dyn EmbeddingProvider>) -> Self {
        Self {
            index,
            embedder,
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }

    /// Records per embedding/insert batch.
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Apply `plan` to the index.
    ///
    /// Never fails as a whole: records that could not be synced after one
    /// retry are listed in `MutationReport::failed_ids`. A record whose old
    /// entry could not be deleted is not re-inserted, which would duplicate it.
    #[instrument(skip_all, fields(deletes = plan.to_delete.len(), upserts = plan.to_upsert.len()))]
    pub async fn apply(&self, plan: &SyncPlan) -> MutationReport {
        let mut report = MutationReport::default();

        let blocked = self.delete_entries(&plan.to_delete, &mut report);

        let upserts: Vec<&QaRecord> = plan
            .to_upsert
            .iter()
            .filter(|record| {
                let key = record.id.as_ref().map(|id| id.key()).unwrap_or_default();
                if blocked.contains(&key) {
                    tracing::warn!("Skipping upsert of record {}: old entry still present", key);
                    false
                } else {
                    true
                }
            })
            .collect();

        for batch in upserts.chunks(self.batch_size) {
            self.upsert_batch(batch, &mut report).await;
        }

        if report.failed_ids.is_empty() {
            tracing::info!(
                "Index updated: {} deleted, {} inserted",
                report.deleted,
                report.inserted.len()
            );
        } else {
            tracing::warn!(
                "Partial sync: {} deleted, {} inserted, failed ids {:?}",
                report.deleted,
                report.inserted.len(),
                report.failed_ids
            );
        }

        report
    }

    /// Returns the record ids whose entries could not be removed.
    fn delete_entries(&self, deletions: &[Deletion], report: &mut MutationReport) -> HashSet<String> {
        let mut blocked = HashSet::new();
        if deletions.is_empty() {
            return blocked;
        }

        let keys: Vec<String> = deletions.iter().map(|d| d.index_key.clone()).collect();
        match self.index.delete(&keys) {
            Ok(removed) => {
                report.deleted += removed;
                return blocked;
            }
            Err(e) => tracing::warn!(
                "Batch delete of {} entries failed, retrying one by one: {}",
                keys.len(),
                e
            ),
        }

        for deletion in deletions {
            match self.index.delete(std::slice::from_ref(&deletion.index_key)) {
                Ok(removed) => report.deleted += removed,
                Err(e) => {
                    tracing::error!(
                        "Failed to delete entry {} of record {}: {}",
                        deletion.index_key,
                        deletion.record_id,
                        e
                    );
                    blocked.insert(deletion.record_id.clone());
                    push_failed(report, &deletion.record_id);
                }
            }
        }

        blocked
    }

    async fn upsert_batch(&self, records: &[&QaRecord], report: &mut MutationReport) {
        match self.insert_records(records).await {
            Ok(inserted) => {
                report.inserted.extend(inserted);
                return;
            }
            Err(e) if records.len() > 1 => tracing::warn!(
                "Batch upsert of {} records failed, retrying one by one: {}",
                records.len(),
                e
            ),
            Err(e) => tracing::warn!("Upsert failed, retrying once: {}", e),
        }

        for record in records {
            let key = record.id.as_ref().map(|id| id.key()).unwrap_or_default();
            match self.insert_records(std::slice::from_ref(record)).await {
                Ok(inserted) => report.inserted.extend(inserted),
                Err(e) => {
                    tracing::error!("Failed to upsert record {}: {}", key, e);
                    push_failed(report, &key);
                }
            }
        }
    }

    /// Embed and insert `records` as one call; returns `(record id, index key)`.
    async fn insert_records(&self, records: &[&QaRecord]) -> AppResult<Vec<(String, String)>> {
        let texts: Vec<String> = records.iter().map(|r| r.answer.clone()).collect();
        let embeddings = self.embedder.embed_batch(&texts).await?;
        if embeddings.len() != records.len() {
            return Err(AppError::Embedding(format!(
                "Provider returned {} embeddings for {} texts",
                embeddings.len(),
                records.len()
            )));
        }

        let mut entries = Vec::with_capacity(records.len());
        for (record, embedding) in records.iter().zip(embeddings) {
            let metadata = EntryMetadata::from_record(record).ok_or_else(|| {
                AppError::InvalidRecord(format!("record without id: {:?}", record.question))
            })?;
            entries.push(NewEntry {
                embedded_text: record.answer.clone(),
                metadata,
                embedding,
            });
        }

        let keys = self.index.insert(&entries)?;
        Ok(entries
            .iter()
            .map(|e| e.metadata.id.key())
            .zip(keys)
            .collect())
    }
}

fn push_failed(report: &mut MutationReport, record_id: &str) {
    if !report.failed_ids.iter().any(|id| id == record_id) {
        report.failed_ids.push(record_id.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embeddings::HashingProvider;
    use crate::index::SqliteIndex;
    use crate::types::{RecordId, RecordStatus};
    use chrono::NaiveDate;

    fn record(id: u64, answer: &str) -> QaRecord {
        QaRecord {
            id: Some(RecordId::Numeric(id)),
            question: format!("Pergunta {}", id),
            answer: answer.to_string(),
            version: 1,
            status: RecordStatus::Active,
            created_at: NaiveDate::from_ymd_opt(2024, 5, 20).unwrap(),
        }
    }

    fn mutator(index: Arc<SqliteIndex>) -> IndexMutator {
        IndexMutator::new(index, Arc::new(HashingProvider::new(32))).with_batch_size(2)
    }

    #[tokio::test]
    async fn test_apply_inserts_in_batches() {
        let index = Arc::new(SqliteIndex::open_in_memory().unwrap());
        let plan = SyncPlan {
            to_delete: Vec::new(),
            to_upsert: (1..=5).map(|id| record(id, "resposta")).collect(),
        };

        let report = mutator(index.clone()).apply(&plan).await;
        assert_eq!(report.inserted.len(), 5);
        assert!(report.failed_ids.is_empty());
        assert_eq!(index.count().unwrap(), 5);

        let entry = &index.get_all().unwrap()[0];
        assert_eq!(entry.metadata.id, RecordId::Numeric(1));
        assert_eq!(entry.embedded_text, "resposta");
    }

    #[tokio::test]
    async fn test_apply_deletes_then_inserts() {
        let index = Arc::new(SqliteIndex::open_in_memory().unwrap());
        let mutator = mutator(index.clone());
        let first = mutator
            .apply(&SyncPlan {
                to_delete: Vec::new(),
                to_upsert: vec![record(1, "A1")],
            })
            .await;
        let old_key = first.inserted[0].1.clone();

        let report = mutator
            .apply(&SyncPlan {
                to_delete: vec![Deletion {
                    index_key: old_key.clone(),
                    record_id: "1".to_string(),
                }],
                to_upsert: vec![record(1, "A1-new")],
            })
            .await;

        assert_eq!(report.deleted, 1);
        let entries = index.get_all().unwrap();
        assert_eq!(entries.len(), 1);
        assert_ne!(entries[0].index_key, old_key);
        assert_eq!(entries[0].embedded_text, "A1-new");
    }

    #[tokio::test]
    async fn test_empty_plan_touches_nothing() {
        let index = Arc::new(SqliteIndex::open_in_memory().unwrap());
        let report = mutator(index.clone()).apply(&SyncPlan::default()).await;

        assert_eq!(report.deleted, 0);
        assert!(report.inserted.is_empty());
        assert_eq!(index.count().unwrap(), 0);
    }
}
