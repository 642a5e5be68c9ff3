//! QA knowledge base: record store, vector index synchronization and retrieval.
//!
//! The record store is the source of truth. Every committed change is
//! reconciled into the vector index by diffing the new target state against
//! what the index actually holds, so repeated commits converge and never
//! duplicate entries.

pub mod cache;
pub mod diff;
pub mod embeddings;
pub mod grading;
pub mod index;
pub mod mutator;
pub mod records;
pub mod retrieval;
pub mod store;
pub mod sync;
pub mod types;
pub mod vector_index;

#[cfg(test)]
mod tests;

// Re-export commonly used types
pub use index::SqliteIndex;
pub use retrieval::Retriever;
pub use store::RecordStore;
pub use sync::SyncOrchestrator;
pub use types::{
    AuditReport, EntryMetadata, IndexEntry, QaRecord, RecordId, RecordStatus, SearchHit,
    SyncPlan, SyncReport,
};
pub use vector_index::VectorIndex;

use embeddings::create_provider;
use qabase_core::{AppConfig, AppResult};
use std::sync::Arc;

/// The record store, index, and embedder wired together for one workspace.
pub struct KnowledgeBase {
    orchestrator: SyncOrchestrator,
    retriever: Retriever,
}

impl KnowledgeBase {
    /// Open the index and embedding provider described by `config`.
    ///
    /// The record store file is not touched until the first read or commit.
    pub async fn open(config: &AppConfig) -> AppResult<Self> {
        config.validate()?;
        config.ensure_dirs()?;

        tracing::info!(
            "Opening knowledge base: records={:?}, index={:?}, embedding={}",
            config.records_path,
            config.index_path,
            config.embedding.provider
        );

        let index: Arc<dyn VectorIndex> = Arc::new(SqliteIndex::open(&config.index_path)?);
        let embedder = create_provider(&config.embedding).await?;

        Ok(Self::from_parts(
            RecordStore::new(config.records_path.clone()),
            index,
            embedder,
            config,
        ))
    }

    /// Assemble from already constructed components.
    pub fn from_parts(
        store: RecordStore,
        index: Arc<dyn VectorIndex>,
        embedder: Arc<dyn embeddings::EmbeddingProvider>,
        config: &AppConfig,
    ) -> Self {
        let orchestrator = SyncOrchestrator::new(store, Arc::clone(&index), Arc::clone(&embedder))
            .with_batch_size(config.embedding.batch_size);
        let retriever = Retriever::new(index, embedder, config.retrieval);
        Self {
            orchestrator,
            retriever,
        }
    }

    pub fn orchestrator(&self) -> &SyncOrchestrator {
        &self.orchestrator
    }

    pub fn retriever(&self) -> &Retriever {
        &self.retriever
    }
}
