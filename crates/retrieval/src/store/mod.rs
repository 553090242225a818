//! Document store backends.
//!
//! A backend must answer the two query shapes the pipeline needs: a
//! disjunctive keyword match and a vector similarity ranking. Hits come
//! back with dense 1-based ranks in relevance order.

pub mod elastic;
pub mod memory;

use crate::types::RankedHit;
use docrag_core::AppResult;
use std::collections::BTreeSet;

pub use elastic::ElasticStore;
pub use memory::MemoryStore;

/// Search backend over an indexed document collection.
#[async_trait::async_trait]
pub trait SearchBackend: Send + Sync {
    /// Backend name for logging (e.g., "elasticsearch", "memory").
    fn backend_name(&self) -> &str;

    /// Disjunctive keyword match over the text field with typo tolerance.
    ///
    /// Returns up to `top_k` hits in relevance order. An empty keyword set
    /// yields zero hits.
    async fn lexical_search(
        &self,
        keywords: &BTreeSet<String>,
        top_k: usize,
    ) -> AppResult<Vec<RankedHit>>;

    /// Cosine-similarity ranking against the stored vector field.
    ///
    /// Returns up to `top_k` hits in similarity order.
    async fn vector_search(&self, query_vector: &[f32], top_k: usize) -> AppResult<Vec<RankedHit>>;

    /// Number of indexed documents.
    async fn count(&self) -> AppResult<u64>;
}
