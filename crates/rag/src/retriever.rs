//! Hybrid Retriever
//!
//! Combines dense and sparse search with query-dependent weights, then
//! reranks.
//!
//! ## Scoring
//!
//! - dense: cosine similarity clamped to [0, 1], kept absolute so a weak match
//!   stays weak even when it is the best one
//! - sparse: BM25 divided by the best BM25 in the candidate set
//! - hybrid: `w_dense * dense + w_sparse * sparse`
//! - final: `(1 - w_rerank) * hybrid + w_rerank * rerank` (or hybrid when
//!   reranking is off)
//!
//! Ties keep original document order, so identical queries give identical
//! rankings.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use dfir_config::RetrievalSettings;
use dfir_core::{Chunk, RetryPolicy, SearchResult, SearchWeights};

use crate::embeddings::Embedder;
use crate::index::KnowledgeIndex;
use crate::reranker::Reranker;
use crate::sparse_search::SparseHit;
use crate::vector_store::{DenseHit, SearchFilter};
use crate::RagError;

/// Retriever configuration
#[derive(Debug, Clone)]
pub struct RetrieverConfig {
    /// Candidates per index and after fusion
    pub candidate_k: usize,
    /// Results after reranking
    pub final_k: usize,
    pub reranking_enabled: bool,
    /// Share of the final score taken by the reranker
    pub rerank_weight: f32,
    /// Per index call
    pub search_timeout: Duration,
    /// Retries of transient dense search failures
    pub retry: RetryPolicy,
}

impl Default for RetrieverConfig {
    fn default() -> Self {
        Self::from(&RetrievalSettings::default())
    }
}

impl From<&RetrievalSettings> for RetrieverConfig {
    fn from(settings: &RetrievalSettings) -> Self {
        Self {
            candidate_k: settings.candidate_k,
            final_k: settings.final_k,
            reranking_enabled: settings.reranking_enabled,
            rerank_weight: settings.rerank_weight,
            search_timeout: Duration::from_secs(settings.search_timeout_seconds),
            retry: RetryPolicy::new(
                settings.max_retries,
                Duration::from_millis(settings.initial_backoff_ms),
            ),
        }
    }
}

/// Hybrid retriever combining dense and sparse search
pub struct HybridRetriever {
    config: RetrieverConfig,
    embedder: Arc<dyn Embedder>,
    index: Arc<KnowledgeIndex>,
    reranker: Arc<dyn Reranker>,
}

struct Candidate {
    chunk: Chunk,
    dense: f32,
    sparse: Option<f32>,
}

impl HybridRetriever {
    pub fn new(
        config: RetrieverConfig,
        embedder: Arc<dyn Embedder>,
        index: Arc<KnowledgeIndex>,
        reranker: Arc<dyn Reranker>,
    ) -> Self {
        Self {
            config,
            embedder,
            index,
            reranker,
        }
    }

    pub fn config(&self) -> &RetrieverConfig {
        &self.config
    }

    pub fn index(&self) -> &Arc<KnowledgeIndex> {
        &self.index
    }

    /// Ranked results, best first, at most `final_k`
    pub async fn search(
        &self,
        query: &str,
        weights: SearchWeights,
        filter: &SearchFilter,
    ) -> Result<Vec<SearchResult>, RagError> {
        if query.trim().is_empty() {
            return Ok(Vec::new());
        }

        self.index
            .check_model(self.embedder.model_id(), self.embedder.dimension())?;

        let query_vector = self.embedder.embed_query(query).await?;

        let k = self.config.candidate_k;
        let (dense, sparse) = tokio::join!(
            self.dense_search(&query_vector, filter, k),
            self.sparse_search(query, filter, k),
        );
        let dense = dense?;
        let sparse = sparse?;

        tracing::debug!(
            dense_hits = dense.len(),
            sparse_hits = sparse.len(),
            dense_weight = weights.dense,
            sparse_weight = weights.sparse,
            "Hybrid candidates"
        );

        let mut candidates: HashMap<String, Candidate> = HashMap::new();
        for hit in dense {
            candidates.insert(
                hit.chunk.id.clone(),
                Candidate {
                    chunk: hit.chunk,
                    dense: hit.score,
                    sparse: None,
                },
            );
        }

        let max_bm25 = sparse.iter().map(|h| h.score).fold(0.0f32, f32::max);
        for hit in sparse {
            let normalized = if max_bm25 > 0.0 { hit.score / max_bm25 } else { 0.0 };
            candidates
                .entry(hit.chunk.id.clone())
                .and_modify(|c| c.sparse = Some(normalized))
                .or_insert(Candidate {
                    chunk: hit.chunk,
                    dense: 0.0,
                    sparse: Some(normalized),
                });
        }

        let mut results: Vec<SearchResult> = candidates
            .into_values()
            .map(|c| self.to_result(c, weights))
            .collect();

        sort_results(&mut results);
        results.truncate(self.config.candidate_k);

        if self.config.reranking_enabled && !results.is_empty() {
            self.reranker
                .rerank(query, &mut results, self.config.rerank_weight);
            sort_results(&mut results);
        }

        results.truncate(self.config.final_k);

        tracing::debug!(
            results = results.len(),
            top_score = results.first().map(|r| r.score).unwrap_or(0.0),
            reranker = self.reranker.name(),
            reranked = self.config.reranking_enabled,
            "Retrieved"
        );

        Ok(results)
    }

    /// Dense search with a per-attempt timeout; connection failures and
    /// timeouts are retried under the configured policy
    async fn dense_search(
        &self,
        vector: &[f32],
        filter: &SearchFilter,
        k: usize,
    ) -> Result<Vec<DenseHit>, RagError> {
        let timeout = self.config.search_timeout;
        let dense = self.index.dense();
        self.config
            .retry
            .run("dense_search", RagError::is_transient, || async move {
                tokio::time::timeout(timeout, dense.search(vector, filter, k))
                    .await
                    .map_err(|_| {
                        RagError::Timeout(format!("Dense search exceeded {}ms", timeout.as_millis()))
                    })?
            })
            .await
    }

    async fn sparse_search(
        &self,
        query: &str,
        filter: &SearchFilter,
        k: usize,
    ) -> Result<Vec<SparseHit>, RagError> {
        let sparse = Arc::clone(self.index.sparse());
        let query = query.to_string();
        let filter = filter.clone();
        run_blocking("Sparse search", self.config.search_timeout, move || {
            sparse.search(&query, &filter, k)
        })
        .await
    }

    fn to_result(&self, candidate: Candidate, weights: SearchWeights) -> SearchResult {
        let Candidate {
            chunk,
            dense,
            sparse,
        } = candidate;
        let hybrid = weights.dense * dense + weights.sparse * sparse.unwrap_or(0.0);
        let document_order = self.index.document_order(&chunk.document_id);

        SearchResult {
            chunk_id: chunk.id,
            document_id: chunk.document_id,
            title: chunk.title,
            chapter: chunk.chapter,
            section: chunk.section,
            page: chunk.page,
            source_type: chunk.source_type,
            text: chunk.raw_text,
            dense_score: dense,
            sparse_score: sparse,
            rerank_score: None,
            hybrid_score: hybrid,
            score: hybrid,
            document_order,
            chunk_index: chunk.index,
        }
    }
}

/// Run synchronous index work on the blocking pool under a deadline
///
/// The deadline fires even while the work is still running; the work itself
/// finishes in the background and its result is dropped.
async fn run_blocking<T, F>(label: &str, timeout: Duration, work: F) -> Result<T, RagError>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, RagError> + Send + 'static,
{
    match tokio::time::timeout(timeout, tokio::task::spawn_blocking(work)).await {
        Ok(Ok(result)) => result,
        Ok(Err(e)) => Err(RagError::Search(format!("{} task failed: {}", label, e))),
        Err(_) => Err(RagError::Timeout(format!(
            "{} exceeded {}ms",
            label,
            timeout.as_millis()
        ))),
    }
}

/// Score descending, then original document order; stable
pub fn sort_results(results: &mut [SearchResult]) {
    results.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.order_key().cmp(&b.order_key()))
    });
}
