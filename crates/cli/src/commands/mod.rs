//! Command handlers for the docrag CLI.
//!
//! This module organizes all CLI commands into separate submodules and
//! holds the shared pipeline wiring they build on.

pub mod ask;
pub mod chat;
pub mod stats;

// Re-export command types for convenience
pub use ask::AskCommand;
pub use chat::ChatCommand;
pub use stats::StatsCommand;

use docrag_core::config::AppConfig;
use docrag_core::AppResult;
use docrag_llm::create_client;
use docrag_retrieval::answer::AnswerGenerator;
use docrag_retrieval::embedding::create_provider;
use docrag_retrieval::reformulate::QueryReformulator;
use docrag_retrieval::rerank::{HttpReranker, RerankClient};
use docrag_retrieval::store::ElasticStore;
use docrag_retrieval::{HybridRetriever, RagSession, SessionConfig};
use std::sync::Arc;

/// Everything a command needs to answer questions.
pub struct Pipeline {
    pub session: RagSession,
    pub generator: AnswerGenerator,
}

/// Wire the full pipeline from configuration: document store, embedding
/// provider, optional reranker, generation client.
pub fn build_pipeline(config: &AppConfig) -> AppResult<Pipeline> {
    let store = Arc::new(ElasticStore::new(&config.elasticsearch)?);
    let embedder = create_provider(&config.embedding)?;

    let reranker: Option<Arc<dyn RerankClient>> = match config.rerank.url {
        Some(ref url) => Some(Arc::new(HttpReranker::new(url)?)),
        None => {
            tracing::warn!("No reranker configured, fusion order will be used");
            None
        }
    };

    let retriever = Arc::new(HybridRetriever::new(
        store,
        embedder,
        reranker,
        config.retrieval.rrf_k,
    ));

    let client = create_client(
        &config.provider,
        config.endpoint.as_deref(),
        config.api_key.as_deref(),
    )?;

    let reformulator = QueryReformulator::new(client.clone(), &config.model);
    let session = RagSession::new(
        retriever,
        reformulator,
        SessionConfig::from(&config.retrieval),
    );
    let generator = AnswerGenerator::new(client, &config.model);

    Ok(Pipeline { session, generator })
}
