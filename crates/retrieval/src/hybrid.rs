//! Hybrid retrieval for a single query string.
//!
//! Four steps: lexical search, vector search, reciprocal rank fusion,
//! rerank. Every step fails open — a dead embedding service costs the
//! vector list, a dead reranker costs the reranked order — so a retrieval
//! miss degrades quality, never availability.

use crate::embedding::EmbeddingProvider;
use crate::fusion;
use crate::keywords;
use crate::rerank::RerankClient;
use crate::store::SearchBackend;
use crate::types::{FusedResult, ScoredResult};
use docrag_core::AppResult;
use std::sync::Arc;
use tracing::{debug, warn};

/// What happened to the rerank step of one retrieval.
///
/// Anything other than `Applied` means final order is fusion order and all
/// rerank scores are 0.0.
#[derive(Debug, Clone, PartialEq)]
pub enum RerankStatus {
    /// Scores attached, final order is rerank order
    Applied,
    /// Nothing to rerank (empty fusion output)
    NoCandidates,
    /// No reranker configured
    Disabled,
    /// The service call failed
    ServiceError(String),
    /// The service returned the wrong number of scores
    LengthMismatch { expected: usize, got: usize },
}

/// Per-call observability for the fail-open steps.
#[derive(Debug, Clone)]
pub struct RetrievalDiagnostics {
    pub lexical_hits: usize,
    pub vector_hits: usize,
    pub rerank: RerankStatus,
}

/// One-query retrieval interface.
///
/// The session orchestrator fans out over this trait, which keeps it
/// testable without a document store.
#[async_trait::async_trait]
pub trait Retriever: Send + Sync {
    /// Retrieve an evidence list for one query.
    ///
    /// `top_k_retrieval` hits are requested from each search mode;
    /// `top_k_rerank` bounds the returned list.
    async fn retrieve(
        &self,
        query: &str,
        top_k_retrieval: usize,
        top_k_rerank: usize,
    ) -> AppResult<Vec<ScoredResult>>;
}

/// Hybrid (lexical + vector) retriever with RRF fusion and reranking.
pub struct HybridRetriever {
    store: Arc<dyn SearchBackend>,
    embedder: Arc<dyn EmbeddingProvider>,
    reranker: Option<Arc<dyn RerankClient>>,
    rrf_k: f64,
}

impl HybridRetriever {
    pub fn new(
        store: Arc<dyn SearchBackend>,
        embedder: Arc<dyn EmbeddingProvider>,
        reranker: Option<Arc<dyn RerankClient>>,
        rrf_k: f64,
    ) -> Self {
        Self {
            store,
            embedder,
            reranker,
            rrf_k,
        }
    }

    /// Retrieve with per-step diagnostics.
    pub async fn retrieve_with_diagnostics(
        &self,
        query: &str,
        top_k_retrieval: usize,
        top_k_rerank: usize,
    ) -> (Vec<ScoredResult>, RetrievalDiagnostics) {
        // Step 1: lexical search. An empty keyword set means "no lexical
        // query possible", not an error.
        let query_keywords = keywords::extract(query);
        let lexical_hits = if query_keywords.is_empty() {
            Vec::new()
        } else {
            match self.store.lexical_search(&query_keywords, top_k_retrieval).await {
                Ok(hits) => hits,
                Err(e) => {
                    warn!(backend = self.store.backend_name(), "Lexical search failed: {}", e);
                    Vec::new()
                }
            }
        };

        // Step 2: vector search; an embedding failure costs only this list.
        let vector_hits = match self.embedder.embed(query).await {
            Ok(vector) => match self.store.vector_search(&vector, top_k_retrieval).await {
                Ok(hits) => hits,
                Err(e) => {
                    warn!(backend = self.store.backend_name(), "Vector search failed: {}", e);
                    Vec::new()
                }
            },
            Err(e) => {
                warn!("Query embedding failed, skipping vector search: {}", e);
                Vec::new()
            }
        };

        let mut diagnostics = RetrievalDiagnostics {
            lexical_hits: lexical_hits.len(),
            vector_hits: vector_hits.len(),
            rerank: RerankStatus::NoCandidates,
        };

        if lexical_hits.is_empty() && vector_hits.is_empty() {
            debug!(query, "No hits from either search mode");
            return (Vec::new(), diagnostics);
        }

        // Step 3: fusion.
        let fused = fusion::reciprocal_rank_fusion(lexical_hits, vector_hits, self.rrf_k);

        // Step 4: rerank; fusion order is the fallback.
        let (mut scored, status) = self.apply_rerank(query, fused).await;
        diagnostics.rerank = status;

        if let RerankStatus::Applied = diagnostics.rerank {
            // Rerank score overrides fusion order; stable sort keeps fusion
            // order for equal scores.
            scored.sort_by(|a, b| {
                b.rerank_score
                    .partial_cmp(&a.rerank_score)
                    .unwrap_or(std::cmp::Ordering::Equal)
            });
        }

        scored.truncate(top_k_rerank);
        (scored, diagnostics)
    }

    /// Attach rerank scores, or fall back to fusion order with zero scores.
    async fn apply_rerank(
        &self,
        query: &str,
        fused: Vec<FusedResult>,
    ) -> (Vec<ScoredResult>, RerankStatus) {
        if fused.is_empty() {
            return (Vec::new(), RerankStatus::NoCandidates);
        }

        let Some(reranker) = &self.reranker else {
            return (fallback_scores(fused), RerankStatus::Disabled);
        };

        let texts: Vec<String> = fused.iter().map(|f| f.doc.text.clone()).collect();

        match reranker.score(query, &texts).await {
            Ok(scores) if scores.len() == fused.len() => {
                let scored = fused
                    .into_iter()
                    .zip(scores)
                    .map(|(f, score)| ScoredResult::from_fused(f, score))
                    .collect();
                (scored, RerankStatus::Applied)
            }
            Ok(scores) => {
                let status = RerankStatus::LengthMismatch {
                    expected: fused.len(),
                    got: scores.len(),
                };
                warn!(?status, "Reranker returned mismatched scores, keeping fusion order");
                (fallback_scores(fused), status)
            }
            Err(e) => {
                warn!("Rerank failed, keeping fusion order: {}", e);
                (fallback_scores(fused), RerankStatus::ServiceError(e.to_string()))
            }
        }
    }
}

fn fallback_scores(fused: Vec<FusedResult>) -> Vec<ScoredResult> {
    fused
        .into_iter()
        .map(|f| ScoredResult::from_fused(f, 0.0))
        .collect()
}

#[async_trait::async_trait]
impl Retriever for HybridRetriever {
    async fn retrieve(
        &self,
        query: &str,
        top_k_retrieval: usize,
        top_k_rerank: usize,
    ) -> AppResult<Vec<ScoredResult>> {
        let (results, diagnostics) = self
            .retrieve_with_diagnostics(query, top_k_retrieval, top_k_rerank)
            .await;

        debug!(
            query,
            lexical = diagnostics.lexical_hits,
            vector = diagnostics.vector_hits,
            rerank = ?diagnostics.rerank,
            results = results.len(),
            "Hybrid retrieval completed"
        );

        Ok(results)
    }
}
