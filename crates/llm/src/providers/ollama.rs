//! Ollama LLM provider implementation.
//!
//! Talks to a local Ollama runtime via `/api/generate`.
//! Ollama API: https://github.com/ollama/ollama/blob/main/docs/api.md

use crate::client::{ChatMessage, LlmClient, LlmRequest, LlmResponse, Role};
use docrag_core::{AppError, AppResult};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Generation calls can take a while on CPU-only hosts.
const REQUEST_TIMEOUT_SECS: u64 = 120;

/// Ollama API request format.
#[derive(Debug, Serialize)]
struct OllamaRequest {
    model: String,
    prompt: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    format: Option<&'static str>,
    options: OllamaOptions,
    stream: bool,
}

#[derive(Debug, Serialize)]
struct OllamaOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    num_predict: Option<u32>,
}

/// Ollama API response format.
#[derive(Debug, Deserialize)]
struct OllamaResponse {
    model: String,
    response: String,
}

/// Ollama LLM client.
pub struct OllamaClient {
    /// Base URL for Ollama API
    base_url: String,

    /// HTTP client
    client: reqwest::Client,
}

impl OllamaClient {
    /// Create a new Ollama client with default settings.
    ///
    /// Default URL: http://localhost:11434
    pub fn new() -> Self {
        Self::with_base_url("http://localhost:11434")
    }

    /// Create a new Ollama client with a custom base URL.
    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
                .build()
                .unwrap_or_default(),
        }
    }

    /// Convert LlmRequest to Ollama format.
    ///
    /// Ollama's generate endpoint has no message list, so prior turns are
    /// folded into the prompt as role-tagged lines.
    fn to_ollama_request(&self, request: &LlmRequest) -> OllamaRequest {
        let prompt = if request.history.is_empty() {
            request.prompt.clone()
        } else {
            let mut folded = String::new();
            for message in &request.history {
                let role = match message.role {
                    Role::System => "system",
                    Role::User => "user",
                    Role::Assistant => "assistant",
                };
                folded.push_str(&format!("{}: {}\n", role, message.content));
            }
            folded.push_str(&request.prompt);
            folded
        };

        OllamaRequest {
            model: request.model.clone(),
            prompt,
            system: request.system.clone(),
            format: request.json_output.then_some("json"),
            options: OllamaOptions {
                temperature: request.temperature,
                num_predict: request.max_tokens,
            },
            stream: false,
        }
    }
}

impl Default for OllamaClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl LlmClient for OllamaClient {
    fn provider_name(&self) -> &str {
        "ollama"
    }

    async fn complete(&self, request: &LlmRequest) -> AppResult<LlmResponse> {
        tracing::debug!(model = %request.model, "Sending completion request to Ollama");

        let ollama_request = self.to_ollama_request(request);
        let url = format!("{}/api/generate", self.base_url);

        let response = self
            .client
            .post(&url)
            .json(&ollama_request)
            .send()
            .await
            .map_err(|e| AppError::Llm(format!("Failed to send request to Ollama: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(AppError::Llm(format!(
                "Ollama API error ({}): {}",
                status, error_text
            )));
        }

        let ollama_response: OllamaResponse = response
            .json()
            .await
            .map_err(|e| AppError::Llm(format!("Failed to parse Ollama response: {}", e)))?;

        Ok(LlmResponse {
            content: ollama_response.response,
            model: ollama_response.model,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_history() -> Vec<ChatMessage> {
        vec![
            ChatMessage::user("What is Milvus?"),
            ChatMessage::assistant("Milvus is a vector database"),
        ]
    }

    #[test]
    fn test_history_folded_into_prompt() {
        let client = OllamaClient::new();
        let request = LlmRequest::new("How to use it?", "llama3.2").with_history(sample_history());

        let ollama_request = client.to_ollama_request(&request);
        assert!(ollama_request.prompt.starts_with("user: What is Milvus?"));
        assert!(ollama_request
            .prompt
            .contains("assistant: Milvus is a vector database"));
        assert!(ollama_request.prompt.ends_with("How to use it?"));
    }

    #[test]
    fn test_json_output_sets_format() {
        let client = OllamaClient::new();
        let request = LlmRequest::new("q", "llama3.2").with_json_output();
        let ollama_request = client.to_ollama_request(&request);
        assert_eq!(ollama_request.format, Some("json"));
        assert!(!ollama_request.stream);
    }
}
