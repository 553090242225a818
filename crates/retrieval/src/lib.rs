//! Retrieval orchestration engine for docrag.
//!
//! Turns one user question into a ranked, deduplicated, source-attributed
//! evidence set by combining lexical and vector search (reciprocal rank
//! fusion), cross-encoder reranking, and three query rewriting strategies
//! (coreference resolution, decomposition, fan-out expansion).

pub mod answer;
pub mod embedding;
pub mod fusion;
pub mod hybrid;
pub mod keywords;
pub mod reformulate;
pub mod rerank;
pub mod session;
pub mod store;
pub mod types;

#[cfg(test)]
mod tests;

// Re-export commonly used types
pub use hybrid::{HybridRetriever, RerankStatus, Retriever};
pub use session::{RagSession, SessionConfig};
pub use types::{ContentType, Document, FusedResult, RankedHit, ScoredResult};
