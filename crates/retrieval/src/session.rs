//! Stateful retrieval session.
//!
//! Owns the conversation history and drives one question through the
//! full pipeline: coreference resolution, optional decomposition and
//! fan-out expansion, bounded-parallel retrieval per query, then a
//! winner-take-all merge into a single evidence list.

use crate::hybrid::Retriever;
use crate::reformulate::{QueryReformulator, Reformulation};
use crate::types::ScoredResult;
use docrag_core::config::RetrievalSettings;
use docrag_core::{AppError, AppResult};
use docrag_llm::ChatMessage;
use futures::stream::{self, StreamExt};
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Coreference resolution looks at most this many turns back.
const COREF_WINDOW_TURNS: usize = 3;

/// Turns of history handed to answer synthesis.
pub const ANSWER_HISTORY_TURNS: usize = 3;

/// Tuning knobs for a session, derived from configuration.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub top_k_retrieval: usize,
    pub top_k_rerank: usize,
    pub use_decomposition: bool,
    pub use_fan_out: bool,
    pub max_concurrent_retrievals: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            top_k_retrieval: 10,
            top_k_rerank: 5,
            use_decomposition: false,
            use_fan_out: false,
            max_concurrent_retrievals: 4,
        }
    }
}

impl From<&RetrievalSettings> for SessionConfig {
    fn from(settings: &RetrievalSettings) -> Self {
        Self {
            top_k_retrieval: settings.top_k_retrieval,
            top_k_rerank: settings.top_k_rerank,
            use_decomposition: settings.use_decomposition,
            use_fan_out: settings.use_fan_out,
            max_concurrent_retrievals: settings.max_concurrent_retrievals,
        }
    }
}

/// What one question turned into and what came back.
#[derive(Debug)]
pub struct RetrievalOutcome {
    /// The question after coreference resolution
    pub resolved_query: String,
    /// Every query actually sent to the retriever, in plan order
    pub executed_queries: Vec<String>,
    /// Merged, deduplicated evidence, best first
    pub results: Vec<ScoredResult>,
}

/// A conversation-scoped retrieval orchestrator.
pub struct RagSession {
    retriever: Arc<dyn Retriever>,
    reformulator: QueryReformulator,
    config: SessionConfig,
    history: Vec<ChatMessage>,
}

impl RagSession {
    pub fn new(
        retriever: Arc<dyn Retriever>,
        reformulator: QueryReformulator,
        config: SessionConfig,
    ) -> Self {
        Self {
            retriever,
            reformulator,
            config,
            history: Vec::new(),
        }
    }

    /// Run the full pipeline for one question.
    ///
    /// Rejects blank input; everything past validation fails open, so the
    /// worst outcome is an empty evidence list.
    pub async fn retrieve(&self, question: &str) -> AppResult<RetrievalOutcome> {
        let question = question.trim();
        if question.is_empty() {
            return Err(AppError::InvalidInput(
                "question must not be empty".to_string(),
            ));
        }

        // Coreference resolution only makes sense mid-conversation.
        let resolved_query = if self.history.is_empty() {
            question.to_string()
        } else {
            let window = self.recent_history(COREF_WINDOW_TURNS);
            let outcome = self
                .reformulator
                .resolve_coreferences(question, window)
                .await;
            if let Reformulation::Applied(ref resolved) = outcome {
                info!(original = question, resolved, "Question resolved against history");
            }
            outcome.query_or(question).to_string()
        };

        let queries = self.plan_queries(&resolved_query).await;
        debug!(count = queries.len(), "Query plan built");

        let results = self.retrieve_all(&queries).await;
        info!(
            queries = queries.len(),
            results = results.len(),
            "Retrieval completed"
        );

        Ok(RetrievalOutcome {
            resolved_query,
            executed_queries: queries,
            results,
        })
    }

    /// Expand the resolved question into the set of queries to execute.
    ///
    /// Decomposition replaces the query set when it produces sub-questions;
    /// fan-out then adds paraphrases after each query it covers.
    async fn plan_queries(&self, resolved_query: &str) -> Vec<String> {
        let mut queries = vec![resolved_query.to_string()];

        if self.config.use_decomposition {
            let sub_queries = self.reformulator.decompose(resolved_query).await;
            if !sub_queries.is_empty() {
                info!(count = sub_queries.len(), "Question decomposed");
                queries = sub_queries;
            }
        }

        if self.config.use_fan_out {
            let mut expanded = Vec::with_capacity(queries.len() * 3);
            for query in &queries {
                let variations = self.reformulator.expand(query).await;
                expanded.push(query.clone());
                expanded.extend(variations);
            }
            queries = expanded;
        }

        queries
    }

    /// Retrieve for every query with bounded parallelism and merge.
    ///
    /// A failed retrieval costs only that query's contribution.
    async fn retrieve_all(&self, queries: &[String]) -> Vec<ScoredResult> {
        let concurrency = self.config.max_concurrent_retrievals.max(1);

        let per_query: Vec<Vec<ScoredResult>> = stream::iter(queries)
            .map(|query| async move {
                match self
                    .retriever
                    .retrieve(query, self.config.top_k_retrieval, self.config.top_k_rerank)
                    .await
                {
                    Ok(results) => results,
                    Err(e) => {
                        warn!(query, "Retrieval failed for query, dropping it: {}", e);
                        Vec::new()
                    }
                }
            })
            .buffer_unordered(concurrency)
            .collect()
            .await;

        self.merge(per_query)
    }

    /// Winner-take-all merge: dedup by document id keeping the highest
    /// rerank score, sort best first, cut to the final size.
    fn merge(&self, per_query: Vec<Vec<ScoredResult>>) -> Vec<ScoredResult> {
        let mut by_id: HashMap<String, ScoredResult> = HashMap::new();
        for result in per_query.into_iter().flatten() {
            match by_id.entry(result.doc.id.clone()) {
                Entry::Occupied(mut entry) => {
                    if result.rerank_score > entry.get().rerank_score {
                        entry.insert(result);
                    }
                }
                Entry::Vacant(entry) => {
                    entry.insert(result);
                }
            }
        }

        let mut merged: Vec<ScoredResult> = by_id.into_values().collect();
        // Equal rerank scores (reranker disabled or degraded) fall back to
        // the per-query fusion rank, so a degraded merge keeps fusion
        // order; document id is the final tie-break for determinism.
        merged.sort_by(|a, b| {
            b.rerank_score
                .partial_cmp(&a.rerank_score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.rank.cmp(&b.rank))
                .then_with(|| a.doc.id.cmp(&b.doc.id))
        });
        merged.truncate(self.config.top_k_rerank);
        merged
    }

    /// Record a completed question/answer exchange.
    pub fn record_turn(&mut self, question: impl Into<String>, answer: impl Into<String>) {
        self.history.push(ChatMessage::user(question));
        self.history.push(ChatMessage::assistant(answer));
    }

    /// The last `max_turns` exchanges, oldest first.
    pub fn recent_history(&self, max_turns: usize) -> &[ChatMessage] {
        let keep = max_turns * 2;
        let start = self.history.len().saturating_sub(keep);
        &self.history[start..]
    }

    pub fn clear_history(&mut self) {
        self.history.clear();
        debug!("Session history cleared");
    }

    pub fn history_len(&self) -> usize {
        self.history.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ContentType, Document};
    use docrag_llm::{LlmClient, LlmRequest, LlmResponse};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    fn scored(id: &str, rerank_score: f64) -> ScoredResult {
        scored_at(id, 1, rerank_score)
    }

    fn scored_at(id: &str, rank: usize, rerank_score: f64) -> ScoredResult {
        ScoredResult {
            doc: Document {
                id: id.to_string(),
                text: format!("text of {id}"),
                content_type: ContentType::Text,
                metadata: serde_json::Map::new(),
                image_path: None,
                table_markdown: None,
            },
            rank,
            rrf_score: 0.0,
            rerank_score,
        }
    }

    /// Records queries and serves canned results keyed by query text.
    struct RecordingRetriever {
        queries: Mutex<Vec<String>>,
        responses: HashMap<String, Vec<ScoredResult>>,
        default: Vec<ScoredResult>,
    }

    impl RecordingRetriever {
        fn returning(default: Vec<ScoredResult>) -> Self {
            Self {
                queries: Mutex::new(Vec::new()),
                responses: HashMap::new(),
                default,
            }
        }

        fn with_response(mut self, query: &str, results: Vec<ScoredResult>) -> Self {
            self.responses.insert(query.to_string(), results);
            self
        }

        fn seen(&self) -> Vec<String> {
            self.queries.lock().unwrap().clone()
        }
    }

    #[async_trait::async_trait]
    impl Retriever for RecordingRetriever {
        async fn retrieve(
            &self,
            query: &str,
            _top_k_retrieval: usize,
            _top_k_rerank: usize,
        ) -> AppResult<Vec<ScoredResult>> {
            self.queries.lock().unwrap().push(query.to_string());
            Ok(self
                .responses
                .get(query)
                .cloned()
                .unwrap_or_else(|| self.default.clone()))
        }
    }

    /// Counts completions and replies with one canned body.
    struct CountingLlm {
        calls: AtomicUsize,
        content: String,
    }

    impl CountingLlm {
        fn new(content: &str) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                content: content.to_string(),
            })
        }
    }

    #[async_trait::async_trait]
    impl LlmClient for CountingLlm {
        fn provider_name(&self) -> &str {
            "counting"
        }

        async fn complete(&self, request: &LlmRequest) -> AppResult<LlmResponse> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(LlmResponse {
                content: self.content.clone(),
                model: request.model.clone(),
            })
        }
    }

    fn session_with(
        retriever: Arc<dyn Retriever>,
        llm: Arc<dyn LlmClient>,
        config: SessionConfig,
    ) -> RagSession {
        RagSession::new(retriever, QueryReformulator::new(llm, "llama3.2"), config)
    }

    #[tokio::test]
    async fn test_blank_question_rejected() {
        let retriever = Arc::new(RecordingRetriever::returning(vec![]));
        let session = session_with(
            retriever,
            CountingLlm::new("{}"),
            SessionConfig::default(),
        );

        let err = session.retrieve("   ").await.unwrap_err();
        assert!(matches!(err, AppError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn test_no_history_skips_coreference_call() {
        let retriever = Arc::new(RecordingRetriever::returning(vec![scored("d1", 0.5)]));
        let llm = CountingLlm::new(r#"{"query":"should not be used"}"#);
        let session = session_with(retriever.clone(), llm.clone(), SessionConfig::default());

        let outcome = session.retrieve("What is Milvus?").await.unwrap();

        assert_eq!(llm.calls.load(Ordering::SeqCst), 0);
        assert_eq!(outcome.resolved_query, "What is Milvus?");
        assert_eq!(retriever.seen(), vec!["What is Milvus?"]);
    }

    #[tokio::test]
    async fn test_resolved_query_is_forwarded() {
        let retriever = Arc::new(RecordingRetriever::returning(vec![scored("d1", 0.5)]));
        let llm = CountingLlm::new(r#"{"query":"How to use Milvus?"}"#);
        let mut session = session_with(retriever.clone(), llm, SessionConfig::default());
        session.record_turn("What is Milvus?", "Milvus is a vector database.");

        let outcome = session.retrieve("How to use it?").await.unwrap();

        assert_eq!(outcome.resolved_query, "How to use Milvus?");
        assert_eq!(retriever.seen(), vec!["How to use Milvus?"]);
    }

    #[tokio::test]
    async fn test_decomposition_replaces_query_set() {
        let retriever = Arc::new(RecordingRetriever::returning(vec![scored("d1", 0.5)]));
        let llm = CountingLlm::new(r#"{"query":["What is LangChain?","What is LangGraph?"]}"#);
        let config = SessionConfig {
            use_decomposition: true,
            ..SessionConfig::default()
        };
        let session = session_with(retriever.clone(), llm, config);

        let outcome = session
            .retrieve("What is the difference between LangChain and LangGraph?")
            .await
            .unwrap();

        let seen = retriever.seen();
        assert_eq!(seen.len(), 2);
        assert!(seen.contains(&"What is LangChain?".to_string()));
        assert!(seen.contains(&"What is LangGraph?".to_string()));
        assert_eq!(outcome.executed_queries.len(), 2);
    }

    #[tokio::test]
    async fn test_fan_out_adds_variations() {
        let retriever = Arc::new(RecordingRetriever::returning(vec![scored("d1", 0.5)]));
        let llm = CountingLlm::new(r#"{"rag_fusion":["variation one","variation two"]}"#);
        let config = SessionConfig {
            use_fan_out: true,
            ..SessionConfig::default()
        };
        let session = session_with(retriever.clone(), llm, config);

        let outcome = session.retrieve("What is deep learning?").await.unwrap();

        // Original plus two paraphrases
        assert_eq!(outcome.executed_queries.len(), 3);
        assert_eq!(outcome.executed_queries[0], "What is deep learning?");
        assert_eq!(retriever.seen().len(), 3);
    }

    #[tokio::test]
    async fn test_winner_take_all_merge_keeps_highest_score() {
        let retriever = Arc::new(
            RecordingRetriever::returning(vec![])
                .with_response("What is LangChain?", vec![scored("shared", 0.4), scored("a", 0.3)])
                .with_response("What is LangGraph?", vec![scored("shared", 0.9), scored("b", 0.2)]),
        );
        let llm = CountingLlm::new(r#"{"query":["What is LangChain?","What is LangGraph?"]}"#);
        let config = SessionConfig {
            use_decomposition: true,
            ..SessionConfig::default()
        };
        let session = session_with(retriever, llm, config);

        let outcome = session.retrieve("LangChain vs LangGraph?").await.unwrap();

        let shared: Vec<&ScoredResult> = outcome
            .results
            .iter()
            .filter(|r| r.doc.id == "shared")
            .collect();
        assert_eq!(shared.len(), 1);
        assert!((shared[0].rerank_score - 0.9).abs() < 1e-9);
        assert_eq!(outcome.results[0].doc.id, "shared");
        assert_eq!(outcome.results.len(), 3);
    }

    #[tokio::test]
    async fn test_failed_query_drops_only_its_contribution() {
        struct HalfFailing {
            calls: AtomicUsize,
        }

        #[async_trait::async_trait]
        impl Retriever for HalfFailing {
            async fn retrieve(
                &self,
                query: &str,
                _top_k_retrieval: usize,
                _top_k_rerank: usize,
            ) -> AppResult<Vec<ScoredResult>> {
                self.calls.fetch_add(1, Ordering::SeqCst);
                if query.contains("LangGraph") {
                    Err(AppError::Store("search timed out".to_string()))
                } else {
                    Ok(vec![scored("ok", 0.7)])
                }
            }
        }

        let retriever = Arc::new(HalfFailing {
            calls: AtomicUsize::new(0),
        });
        let llm = CountingLlm::new(r#"{"query":["What is LangChain?","What is LangGraph?"]}"#);
        let config = SessionConfig {
            use_decomposition: true,
            ..SessionConfig::default()
        };
        let session = session_with(retriever.clone(), llm, config);

        let outcome = session.retrieve("LangChain vs LangGraph?").await.unwrap();

        assert_eq!(retriever.calls.load(Ordering::SeqCst), 2);
        assert_eq!(outcome.results.len(), 1);
        assert_eq!(outcome.results[0].doc.id, "ok");
    }

    #[tokio::test]
    async fn test_zero_score_merge_keeps_fusion_order() {
        // Reranker disabled or degraded: every score is 0.0 and the
        // merged list must keep the retriever's fusion order, not fall
        // back to document-id order.
        let fusion_order = vec![
            scored_at("z-doc", 1, 0.0),
            scored_at("a-doc", 2, 0.0),
            scored_at("m-doc", 3, 0.0),
        ];
        let retriever = Arc::new(RecordingRetriever::returning(fusion_order));
        let session = session_with(
            retriever,
            CountingLlm::new("{}"),
            SessionConfig::default(),
        );

        let outcome = session.retrieve("anything").await.unwrap();

        let ids: Vec<&str> = outcome.results.iter().map(|r| r.doc.id.as_str()).collect();
        assert_eq!(ids, vec!["z-doc", "a-doc", "m-doc"]);
    }

    #[tokio::test]
    async fn test_merge_truncates_to_top_k_rerank() {
        let many: Vec<ScoredResult> = (0..8).map(|i| scored(&format!("d{i}"), i as f64)).collect();
        let retriever = Arc::new(RecordingRetriever::returning(many));
        let config = SessionConfig {
            top_k_rerank: 3,
            ..SessionConfig::default()
        };
        let session = session_with(retriever, CountingLlm::new("{}"), config);

        let outcome = session.retrieve("anything").await.unwrap();
        assert_eq!(outcome.results.len(), 3);
        assert_eq!(outcome.results[0].doc.id, "d7");
    }

    #[test]
    fn test_history_window_and_clear() {
        let retriever = Arc::new(RecordingRetriever::returning(vec![]));
        let mut session = session_with(
            retriever,
            CountingLlm::new("{}"),
            SessionConfig::default(),
        );

        for i in 0..5 {
            session.record_turn(format!("q{i}"), format!("a{i}"));
        }
        assert_eq!(session.history_len(), 10);

        let recent = session.recent_history(3);
        assert_eq!(recent.len(), 6);
        assert_eq!(recent[0].content, "q2");

        session.clear_history();
        assert_eq!(session.history_len(), 0);
        assert!(session.recent_history(3).is_empty());
    }
}
