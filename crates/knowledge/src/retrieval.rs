//! Retrieval over the vector index with maximal marginal relevance.
//!
//! `fetch_k` nearest candidates are pulled from the index, then `k` of them
//! are picked greedily, each maximizing
//! `lambda * sim(query, doc) - (1 - lambda) * max sim(doc, already picked)`.

use crate::embeddings::EmbeddingProvider;
use crate::types::{ScoredEntry, SearchHit};
use crate::vector_index::{cosine_similarity, VectorIndex};
use qabase_core::{AppResult, RetrievalSettings};
use std::sync::Arc;
use tracing::instrument;

pub struct Retriever {
    index: Arc<dyn VectorIndex>,
    embedder: Arc<dyn EmbeddingProvider>,
    settings: RetrievalSettings,
}

impl Retriever {
    pub fn new(
        index: Arc<dyn VectorIndex>,
        embedder: Arc<dyn EmbeddingProvider>,
        settings: RetrievalSettings,
    ) -> Self {
        Self {
            index,
            embedder,
            settings,
        }
    }

    pub fn settings(&self) -> RetrievalSettings {
        self.settings
    }

    /// Search with the configured `k` and `fetch_k`.
    pub async fn search_default(&self, query: &str) -> AppResult<Vec<SearchHit>> {
        self.search(query, self.settings.k, self.settings.fetch_k).await
    }

    /// Up to `k` diverse hits for `query`, chosen among the `fetch_k` nearest.
    #[instrument(skip(self, query), fields(query_len = query.len()))]
    pub async fn search(&self, query: &str, k: usize, fetch_k: usize) -> AppResult<Vec<SearchHit>> {
        if k == 0 || query.trim().is_empty() {
            return Ok(Vec::new());
        }

        let query_embedding = self.embedder.embed(query).await?;
        let candidates: Vec<ScoredEntry> = self
            .index
            .nearest(&query_embedding, fetch_k.max(k))?
            .into_iter()
            // Tolerate entries an in-flight sync has not removed yet
            .filter(|c| c.entry.metadata.status.is_active())
            .collect();

        let picked = mmr_select(&candidates, k, self.settings.lambda);
        tracing::debug!(
            "Selected {} of {} candidates for query",
            picked.len(),
            candidates.len()
        );

        Ok(picked
            .into_iter()
            .map(|i| {
                let candidate = &candidates[i];
                SearchHit {
                    text: candidate.entry.embedded_text.clone(),
                    metadata: candidate.entry.metadata.clone(),
                    score: candidate.score,
                }
            })
            .collect())
    }
}

/// Indices of up to `k` candidates in selection order.
///
/// Candidates carry their similarity to the query in `score`. Ties go to the
/// earlier (better ranked) candidate.
pub fn mmr_select(candidates: &[ScoredEntry], k: usize, lambda: f32) -> Vec<usize> {
    let mut selected: Vec<usize> = Vec::with_capacity(k.min(candidates.len()));
    let mut remaining: Vec<usize> = (0..candidates.len()).collect();

    while selected.len() < k && !remaining.is_empty() {
        let mut best_pos = 0;
        let mut best_score = f32::NEG_INFINITY;

        for (pos, &i) in remaining.iter().enumerate() {
            let redundancy = selected
                .iter()
                .map(|&j| cosine_similarity(&candidates[i].embedding, &candidates[j].embedding))
                .fold(None, |max: Option<f32>, s| Some(max.map_or(s, |m| m.max(s))))
                .unwrap_or(0.0);

            let score = lambda * candidates[i].score - (1.0 - lambda) * redundancy;
            if score > best_score {
                best_score = score;
                best_pos = pos;
            }
        }

        selected.push(remaining.remove(best_pos));
    }

    selected
}
