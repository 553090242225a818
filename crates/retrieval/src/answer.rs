//! Grounded answer synthesis from a retrieved evidence list.

use crate::types::{ContentType, ScoredResult};
use docrag_core::AppResult;
use docrag_llm::{ChatMessage, LlmClient, LlmRequest};
use serde::Serialize;
use std::sync::Arc;
use tracing::debug;

/// Returned without calling the model when retrieval produced nothing.
pub const NO_EVIDENCE_ANSWER: &str =
    "I cannot find any relevant information in the indexed documents to answer this question.";

/// Characters of source text shown in a citation preview.
const PREVIEW_CHARS: usize = 300;

/// A citation pointing back at one evidence document.
#[derive(Debug, Clone, Serialize)]
pub struct SourceRef {
    pub rank: usize,
    pub text_preview: String,
    pub content_type: ContentType,
    pub metadata: serde_json::Map<String, serde_json::Value>,
    pub rerank_score: f64,
}

/// An answer plus the citations it was grounded on.
#[derive(Debug, Clone, Serialize)]
pub struct AnswerWithSources {
    pub answer: String,
    pub sources: Vec<SourceRef>,
}

/// Synthesizes answers strictly from retrieved evidence.
pub struct AnswerGenerator {
    client: Arc<dyn LlmClient>,
    model: String,
}

impl AnswerGenerator {
    pub fn new(client: Arc<dyn LlmClient>, model: impl Into<String>) -> Self {
        Self {
            client,
            model: model.into(),
        }
    }

    /// Generate an answer grounded only in `results`.
    ///
    /// Empty evidence yields a fixed refusal without touching the model.
    pub async fn generate(
        &self,
        query: &str,
        results: &[ScoredResult],
        history: &[ChatMessage],
    ) -> AppResult<String> {
        if results.is_empty() {
            return Ok(NO_EVIDENCE_ANSWER.to_string());
        }

        let prompt = build_prompt(query, &build_context(results));
        let request = LlmRequest::new(prompt, &self.model)
            .with_history(history.to_vec())
            .with_temperature(0.3);

        let response = self.client.complete(&request).await?;
        let answer = response.content.trim().to_string();
        debug!(chars = answer.len(), "Answer generated");
        Ok(answer)
    }

    /// Generate an answer and attach one citation per evidence document.
    pub async fn generate_with_sources(
        &self,
        query: &str,
        results: &[ScoredResult],
        history: &[ChatMessage],
    ) -> AppResult<AnswerWithSources> {
        let answer = self.generate(query, results, history).await?;

        let sources = results
            .iter()
            .enumerate()
            .map(|(i, result)| SourceRef {
                rank: i + 1,
                text_preview: preview(&result.doc.text),
                content_type: result.doc.content_type,
                metadata: result.doc.metadata.clone(),
                rerank_score: result.rerank_score,
            })
            .collect();

        Ok(AnswerWithSources { answer, sources })
    }
}

/// Format the evidence list as numbered, page-attributed context blocks.
pub fn build_context(results: &[ScoredResult]) -> String {
    results
        .iter()
        .enumerate()
        .map(|(i, result)| {
            let page = result
                .doc
                .page()
                .map(|p| p.to_string())
                .unwrap_or_else(|| "?".to_string());
            format!("[Source {} - Page {}]\n{}", i + 1, page, result.doc.text)
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

fn build_prompt(query: &str, context: &str) -> String {
    format!(
        r#"You are a document Q&A assistant. You MUST answer based ONLY on the provided documents below.

IMPORTANT RULES:
1. If the answer is not in the documents, say "I cannot find this information in the provided documents."
2. DO NOT use any external knowledge
3. Quote specific parts from the documents when possible
4. If unsure, say so

DOCUMENTS:
{context}

USER QUESTION: {query}

YOUR ANSWER (based ONLY on the documents above):"#
    )
}

fn preview(text: &str) -> String {
    if text.chars().count() <= PREVIEW_CHARS {
        text.to_string()
    } else {
        let mut cut: String = text.chars().take(PREVIEW_CHARS).collect();
        cut.push_str("...");
        cut
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Document;
    use docrag_llm::LlmResponse;

    fn result(id: &str, text: &str, page: Option<i64>) -> ScoredResult {
        let mut metadata = serde_json::Map::new();
        if let Some(p) = page {
            metadata.insert("page".to_string(), serde_json::json!(p));
        }
        ScoredResult {
            doc: Document {
                id: id.to_string(),
                text: text.to_string(),
                content_type: ContentType::Text,
                metadata,
                image_path: None,
                table_markdown: None,
            },
            rank: 1,
            rrf_score: 0.1,
            rerank_score: 0.8,
        }
    }

    struct EchoClient;

    #[async_trait::async_trait]
    impl LlmClient for EchoClient {
        fn provider_name(&self) -> &str {
            "echo"
        }

        async fn complete(&self, request: &LlmRequest) -> AppResult<LlmResponse> {
            Ok(LlmResponse {
                content: format!("prompt was: {}", request.prompt),
                model: request.model.clone(),
            })
        }
    }

    #[test]
    fn test_build_context_numbers_and_pages() {
        let results = vec![
            result("d1", "First chunk.", Some(3)),
            result("d2", "Second chunk.", None),
        ];
        let context = build_context(&results);
        assert!(context.contains("[Source 1 - Page 3]\nFirst chunk."));
        assert!(context.contains("[Source 2 - Page ?]\nSecond chunk."));
    }

    #[tokio::test]
    async fn test_empty_evidence_short_circuits() {
        let generator = AnswerGenerator::new(Arc::new(EchoClient), "llama3.2");
        let answer = generator.generate("anything?", &[], &[]).await.unwrap();
        assert_eq!(answer, NO_EVIDENCE_ANSWER);
    }

    #[tokio::test]
    async fn test_prompt_carries_question_and_context() {
        let generator = AnswerGenerator::new(Arc::new(EchoClient), "llama3.2");
        let results = vec![result("d1", "Milvus stores vectors.", Some(1))];

        let answer = generator
            .generate("What does Milvus store?", &results, &[])
            .await
            .unwrap();

        assert!(answer.contains("USER QUESTION: What does Milvus store?"));
        assert!(answer.contains("[Source 1 - Page 1]\nMilvus stores vectors."));
        assert!(answer.contains("ONLY on the provided documents"));
    }

    #[tokio::test]
    async fn test_sources_carry_rank_and_preview() {
        let generator = AnswerGenerator::new(Arc::new(EchoClient), "llama3.2");
        let long_text = "x".repeat(400);
        let results = vec![
            result("d1", "short text", Some(2)),
            result("d2", &long_text, None),
        ];

        let with_sources = generator
            .generate_with_sources("q?", &results, &[])
            .await
            .unwrap();

        assert_eq!(with_sources.sources.len(), 2);
        assert_eq!(with_sources.sources[0].rank, 1);
        assert_eq!(with_sources.sources[0].text_preview, "short text");
        assert_eq!(with_sources.sources[1].text_preview.chars().count(), 303);
        assert!(with_sources.sources[1].text_preview.ends_with("..."));
    }

    #[test]
    fn test_preview_respects_char_boundaries() {
        let text = "é".repeat(350);
        let p = preview(&text);
        assert!(p.ends_with("..."));
        assert_eq!(p.chars().count(), 303);
    }
}
