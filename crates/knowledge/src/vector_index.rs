//! Vector index abstraction.
//!
//! This is the whole contract the sync engine needs from a search backend;
//! any store that implements it can be swapped in. Methods take `&self` so a
//! single index can be shared between the writer and concurrent readers.

use crate::types::{IndexEntry, NewEntry, ScoredEntry};
use qabase_core::AppResult;

/// Trait for vector index backends.
pub trait VectorIndex: Send + Sync {
    /// Every live entry, read from the backend (never cached).
    fn get_all(&self) -> AppResult<Vec<IndexEntry>>;

    /// Remove entries by index key. Unknown keys are ignored.
    ///
    /// Returns the number of entries actually removed.
    fn delete(&self, index_keys: &[String]) -> AppResult<usize>;

    /// Insert new entries, returning the index keys assigned to them in order.
    ///
    /// A call that fails must leave none of its entries behind, so callers
    /// can safely retry the same entries one by one.
    fn insert(&self, entries: &[NewEntry]) -> AppResult<Vec<String>>;

    /// The `fetch_k` entries most similar to `query_embedding`, best first.
    fn nearest(&self, query_embedding: &[f32], fetch_k: usize) -> AppResult<Vec<ScoredEntry>>;

    /// Number of live entries.
    fn count(&self) -> AppResult<usize> {
        Ok(self.get_all()?.len())
    }
}

/// Cosine similarity; 0.0 for mismatched or zero vectors.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }

    let dot_product: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot_product / (norm_a * norm_b)
}
