//! Sync orchestrator: persists the record store and reconciles the index as
//! one logical operation.
//!
//! Writers are serialized by an async mutex: id assignment and the
//! diff-then-apply sequence both read before they write. Readers of the
//! index are never blocked and may briefly observe a record missing while
//! it is being replaced.

use crate::cache::RecordCache;
use crate::diff;
use crate::embeddings::EmbeddingProvider;
use crate::mutator::IndexMutator;
use crate::store::RecordStore;
use crate::types::{AuditReport, Deletion, QaRecord, SyncPlan, SyncReport};
use crate::vector_index::VectorIndex;
use qabase_core::{AppError, AppResult};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Mutex;
use tracing::instrument;

pub struct SyncOrchestrator {
    cache: RecordCache,
    index: Arc<dyn VectorIndex>,
    mutator: IndexMutator,
    write_lock: Mutex<()>,
}

impl SyncOrchestrator {
    pub fn new(
        store: RecordStore,
        index: Arc<dyn VectorIndex>,
        embedder: Arc<dyn EmbeddingProvider>,
    ) -> Self {
        Self {
            cache: RecordCache::new(store),
            mutator: IndexMutator::new(Arc::clone(&index), embedder),
            index,
            write_lock: Mutex::new(()),
        }
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.mutator = self.mutator.with_batch_size(batch_size);
        self
    }

    /// Shared handle to the index, for readers.
    pub fn index(&self) -> Arc<dyn VectorIndex> {
        Arc::clone(&self.index)
    }

    pub fn store(&self) -> &RecordStore {
        self.cache.store()
    }

    /// Current records, served from the cache. A missing store reads as empty.
    pub fn snapshot(&self) -> AppResult<Arc<Vec<QaRecord>>> {
        match self.cache.get() {
            Err(AppError::NotFound(path)) => {
                tracing::debug!("No record store at {:?}, empty snapshot", path);
                Ok(Arc::new(Vec::new()))
            }
            other => other,
        }
    }

    /// Persist `records` as the new store contents, then sync the index to them.
    ///
    /// If the save fails the index is not touched and `AppError::Persistence`
    /// is returned. Per-record index failures do not fail the commit; check
    /// `SyncReport::is_partial`.
    #[instrument(skip_all, fields(records = records.len()))]
    pub async fn commit(&self, records: &[QaRecord]) -> AppResult<SyncReport> {
        let _guard = self.write_lock.lock().await;
        self.commit_locked(records).await
    }

    /// Edit the stored records and commit the result, all under the writer
    /// lock so concurrent edits cannot be handed the same snapshot.
    ///
    /// The records are read from the store itself, not the cache, which an
    /// unlocked reader may have filled just before the last save.
    pub async fn update<T, F>(&self, edit: F) -> AppResult<(T, SyncReport)>
    where
        F: FnOnce(&mut Vec<QaRecord>) -> AppResult<T>,
    {
        let _guard = self.write_lock.lock().await;

        let mut records = self.cache.store().load_or_empty()?;
        let value = edit(&mut records)?;
        let report = self.commit_locked(&records).await?;
        Ok((value, report))
    }

    /// Re-sync the index against the stored records without changing them.
    #[instrument(skip_all)]
    pub async fn sync(&self) -> AppResult<SyncReport> {
        let _guard = self.write_lock.lock().await;
        let start = Instant::now();

        let records = self.cache.store().load()?;
        let plan = diff::plan(&records, &self.index.get_all()?);
        Ok(self.apply(plan, start).await)
    }

    async fn commit_locked(&self, records: &[QaRecord]) -> AppResult<SyncReport> {
        let start = Instant::now();

        self.cache.store().save(records)?;
        self.cache.invalidate();

        let observed = self.index.get_all()?;
        let plan = diff::plan(records, &observed);
        Ok(self.apply(plan, start).await)
    }

    async fn apply(&self, plan: SyncPlan, start: Instant) -> SyncReport {
        tracing::info!(
            "Sync plan: {} deletions, {} upserts",
            plan.to_delete.len(),
            plan.to_upsert.len()
        );

        let mutation = if plan.is_empty() {
            Default::default()
        } else {
            self.mutator.apply(&plan).await
        };

        SyncReport {
            planned_deletes: plan.to_delete.len(),
            planned_upserts: plan.to_upsert.len(),
            mutation,
            duration_secs: start.elapsed().as_secs_f64(),
        }
    }

    /// Full reconciliation: drop every index entry and re-embed every
    /// indexable record in the store. This is the recovery path for orphans.
    #[instrument(skip_all)]
    pub async fn rebuild(&self) -> AppResult<SyncReport> {
        let _guard = self.write_lock.lock().await;
        let start = Instant::now();

        let records = self.cache.store().load_or_empty()?;
        let observed = self.index.get_all()?;

        let plan = SyncPlan {
            to_delete: observed
                .iter()
                .map(|entry| Deletion {
                    index_key: entry.index_key.clone(),
                    record_id: entry.metadata.id.key(),
                })
                .collect(),
            // Planning against an empty index yields every indexable record once
            to_upsert: diff::plan(&records, &[]).to_upsert,
        };

        tracing::info!(
            "Rebuilding index: {} existing entries, {} records to embed",
            observed.len(),
            plan.to_upsert.len()
        );
        Ok(self.apply(plan, start).await)
    }

    /// Compare the index with the stored records without changing either.
    pub async fn audit(&self) -> AppResult<AuditReport> {
        let records = self.snapshot()?;
        let observed = self.index.get_all()?;
        let report = diff::audit(&records, &observed);

        if !report.is_consistent() {
            tracing::warn!(
                "Index inconsistent: {} orphan entries, {} records missing",
                report.orphans.len(),
                report.missing_ids.len()
            );
        }
        Ok(report)
    }
}
