//! LLM-driven query rewriting: coreference resolution, decomposition,
//! and fan-out expansion.
//!
//! All three strategies fail open. A provider error or a malformed
//! response leaves the original question in play and is reported through
//! the return value rather than an `Err`.

use docrag_llm::{ChatMessage, LlmClient, LlmRequest, Role};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, warn};

/// How many paraphrases fan-out expansion asks for.
pub const FAN_OUT_VARIATIONS: usize = 2;

/// Outcome of coreference resolution.
#[derive(Debug, Clone, PartialEq)]
pub enum Reformulation {
    /// The question was rewritten into a standalone form
    Applied(String),
    /// The original question stands
    Skipped(SkipReason),
}

impl Reformulation {
    /// The question to use downstream, given the original.
    pub fn query_or<'a>(&'a self, original: &'a str) -> &'a str {
        match self {
            Reformulation::Applied(resolved) => resolved,
            Reformulation::Skipped(_) => original,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SkipReason {
    /// No prior turns, nothing to resolve against
    NoHistory,
    /// Provider call failed
    LlmError(String),
    /// Response was not the expected JSON shape
    MalformedResponse,
}

/// Rewrites questions before retrieval.
pub struct QueryReformulator {
    client: Arc<dyn LlmClient>,
    model: String,
}

impl QueryReformulator {
    pub fn new(client: Arc<dyn LlmClient>, model: impl Into<String>) -> Self {
        Self {
            client,
            model: model.into(),
        }
    }

    /// Replace pronouns and references in `query` with explicit entities
    /// from recent conversation turns.
    pub async fn resolve_coreferences(
        &self,
        query: &str,
        history: &[ChatMessage],
    ) -> Reformulation {
        if history.is_empty() {
            return Reformulation::Skipped(SkipReason::NoHistory);
        }

        let prompt = format!(
            r#"Goal: Based on the provided conversation history between the user and the knowledge base assistant, perform coreference resolution. Replace pronouns or references in the user's latest question with explicit objects from the history to generate a complete, standalone question.

Instructions:
- Replace referential words in the user's question with specific content from the conversation history to generate a standalone question.

Output in JSON format:
{{"query":"Complete question after resolving references"}}

Here are some examples:

----------
Conversation history:
['user': What is Milvus?
'assistant': Milvus is a vector database]
User question: How to use it?

Output JSON: {{"query":"How to use Milvus?"}}
----------
Conversation history:
['user': What is PyTorch?
'assistant': PyTorch is an open-source machine learning library for Python.
'user': What is TensorFlow?
'assistant': TensorFlow is an open-source machine learning framework.]
User question: What are their differences?

Output JSON: {{"query":"What are the differences between PyTorch and TensorFlow?"}}
----------
Conversation history:
{}
User question: {}

Output JSON:
"#,
            format_history(history),
            query
        );

        let request = LlmRequest::new(prompt, &self.model)
            .with_system(
                "You are an AI assistant that specializes in coreference resolution. \
                 Output in JSON format.",
            )
            .with_json_output();

        let content = match self.client.complete(&request).await {
            Ok(response) => response.content,
            Err(e) => {
                warn!("Coreference resolution failed, using original question: {}", e);
                return Reformulation::Skipped(SkipReason::LlmError(e.to_string()));
            }
        };

        match extract_string_field(&content, "query") {
            Some(resolved) if !resolved.trim().is_empty() => {
                debug!(resolved, "Coreference resolution applied");
                Reformulation::Applied(resolved)
            }
            _ => {
                warn!("Coreference resolution returned malformed output, using original question");
                Reformulation::Skipped(SkipReason::MalformedResponse)
            }
        }
    }

    /// Break a multi-concept question into focused sub-questions.
    ///
    /// An empty list means the question is already focused, or the call
    /// failed; either way the caller keeps the original question.
    pub async fn decompose(&self, query: &str) -> Vec<String> {
        let prompt = format!(
            r#"Goal: Analyze the user's question and determine if it needs to be decomposed into sub-questions to improve information retrieval accuracy. If decomposition is needed, provide a list of sub-questions; if not, return an empty list.

Instructions:
- The user's question may be ambiguous or contain multiple concepts, making it difficult to answer directly.
- To improve the quality and relevance of knowledge base queries, evaluate whether the question should be decomposed into more specific sub-questions.
- Based on the complexity and breadth of the question, determine if decomposition is needed:
  - If the question involves multiple aspects (e.g., comparing multiple entities, containing multiple independent steps), decompose it into sub-questions.
  - If the question is already focused and clear, no decomposition is needed, return an empty list.
- Output must be in JSON format. Output JSON directly without any explanation.

Output format:
{{
  "query": ["sub-question1", "sub-question2"...]
}}

Case 1
---
User question: "What are the differences between Lincoln, Guan Yu, and Sun Wukong?"
Reasoning: This question involves comparing multiple entities and requires understanding each entity's characteristics separately.
Output:
{{
  "query": ["What is Lincoln like?", "What is Guan Yu like?", "What is Sun Wukong like?"]
}}

Case 2
---
User question: "What is the difference between LangChain and LangGraph?"
Reasoning: This question involves comparison and can be decomposed into understanding each entity separately to improve retrieval accuracy.
Output:
{{
  "query": ["What is LangChain?", "What is LangGraph?"]
}}

Case 3
---
User question: "How to design a smart home system and monitor device status in real-time?"
Reasoning: The question contains two independent aspects (system design and status monitoring) and needs to be decomposed.
Output:
{{
  "query": ["How to design a smart home system?", "How to monitor smart home device status in real-time?"]
}}

Case 4
---
User question: "What is machine learning?"
Reasoning: The question is focused and clear, no decomposition needed.
Output:
{{
  "query": []
}}

User question:
"{query}"
"#
        );

        let request = LlmRequest::new(prompt, &self.model)
            .with_system(
                "You are an AI assistant that specializes in query decomposition. \
                 Output in JSON format.",
            )
            .with_json_output();

        let sub_queries = self.string_list(&request, "query").await;
        if sub_queries.is_empty() {
            debug!("No decomposition needed");
        } else {
            debug!(count = sub_queries.len(), "Question decomposed");
        }
        sub_queries
    }

    /// Generate paraphrases of the question to widen retrieval coverage.
    pub async fn expand(&self, query: &str) -> Vec<String> {
        let prompt = format!(
            r#"Based on the user's query, rewrite it into {FAN_OUT_VARIATIONS} different queries. These rewritten queries should cover different aspects or angles of the original query to retrieve more comprehensive information. Ensure each rewritten query is still relevant to the original query and different in content.

Output in JSON format:
{{
    "rag_fusion":["query1","query2"]
}}

Original query: {query}
"#
        );

        let request = LlmRequest::new(prompt, &self.model)
            .with_system(
                "You are an AI assistant that specializes in rewriting user queries. \
                 Output in JSON format.",
            )
            .with_json_output();

        let variations = self.string_list(&request, "rag_fusion").await;
        debug!(count = variations.len(), "Fan-out variations generated");
        variations
    }

    /// Complete the request and pull a list of non-blank strings out of
    /// the named field. Failures of any kind yield an empty list.
    async fn string_list(&self, request: &LlmRequest, field: &str) -> Vec<String> {
        let content = match self.client.complete(request).await {
            Ok(response) => response.content,
            Err(e) => {
                warn!("Query rewriting call failed: {}", e);
                return Vec::new();
            }
        };

        let Some(parsed) = parse_json_object(&content) else {
            warn!("Query rewriting returned malformed output");
            return Vec::new();
        };

        match parsed.get(field).and_then(Value::as_array) {
            Some(items) => items
                .iter()
                .filter_map(Value::as_str)
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from)
                .collect(),
            None => {
                warn!(field, "Query rewriting output missing expected field");
                Vec::new()
            }
        }
    }
}

/// Render turns the way the rewriting prompts expect them.
fn format_history(history: &[ChatMessage]) -> String {
    let lines: Vec<String> = history
        .iter()
        .map(|m| {
            let role = match m.role {
                Role::System => "system",
                Role::User => "user",
                Role::Assistant => "assistant",
            };
            format!("'{}': {}", role, m.content)
        })
        .collect();
    format!("[{}]", lines.join("\n"))
}

/// Parse the response as a JSON object, tolerating prose around it.
///
/// Some models wrap the object in explanation text even when asked for
/// JSON only, so fall back to the outermost brace pair.
fn parse_json_object(content: &str) -> Option<Value> {
    if let Ok(value) = serde_json::from_str::<Value>(content.trim()) {
        if value.is_object() {
            return Some(value);
        }
    }

    let start = content.find('{')?;
    let end = content.rfind('}')?;
    if end <= start {
        return None;
    }
    serde_json::from_str::<Value>(&content[start..=end])
        .ok()
        .filter(Value::is_object)
}

fn extract_string_field(content: &str, field: &str) -> Option<String> {
    parse_json_object(content)?
        .get(field)?
        .as_str()
        .map(String::from)
}
