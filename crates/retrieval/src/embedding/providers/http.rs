//! HTTP embedding service provider.
//!
//! Posts `{"texts": [...]}` and reads `{"data": {"text_vectors": [...]}}`.
//! Transient failures are retried with exponential backoff; after the
//! retry budget is exhausted the error is raised to the caller. Large
//! inputs are chunked to bound request size.

use crate::embedding::provider::EmbeddingProvider;
use docrag_core::{AppError, AppResult};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

/// Maximum retry attempts for failed requests
const MAX_RETRIES: u32 = 3;

/// Initial backoff duration in milliseconds
const INITIAL_BACKOFF_MS: u64 = 100;

/// Request timeout in seconds
const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Request payload for the embedding service.
#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    texts: &'a [String],
}

/// Response from the embedding service.
#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: EmbeddingData,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    text_vectors: Vec<Vec<f32>>,
}

/// Remote embedding service client.
pub struct HttpEmbedder {
    client: reqwest::Client,
    url: String,
    dimensions: usize,
    batch_size: usize,
}

impl HttpEmbedder {
    pub fn new(url: impl Into<String>, dimensions: usize, batch_size: usize) -> AppResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .map_err(|e| AppError::Embedding(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            url: url.into(),
            dimensions,
            batch_size: batch_size.max(1),
        })
    }

    /// One service round trip for a single chunk of texts.
    async fn request_chunk(&self, texts: &[String]) -> AppResult<Vec<Vec<f32>>> {
        let response = self
            .client
            .post(&self.url)
            .json(&EmbeddingRequest { texts })
            .send()
            .await
            .map_err(|e| AppError::Embedding(format!("Embedding request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(AppError::Embedding(format!(
                "Embedding service error ({})",
                response.status()
            )));
        }

        let parsed: EmbeddingResponse = response
            .json()
            .await
            .map_err(|e| AppError::Embedding(format!("Failed to parse embedding response: {}", e)))?;

        let vectors = parsed.data.text_vectors;

        if vectors.len() != texts.len() {
            return Err(AppError::Embedding(format!(
                "Embedding count mismatch: {} texts, {} vectors",
                texts.len(),
                vectors.len()
            )));
        }

        if let Some(vector) = vectors.first() {
            if vector.len() != self.dimensions {
                return Err(AppError::Embedding(format!(
                    "Unexpected embedding dimensions: got {}, expected {}",
                    vector.len(),
                    self.dimensions
                )));
            }
        }

        Ok(vectors)
    }

    /// Embed one chunk with retry and backoff.
    async fn embed_chunk(&self, texts: &[String]) -> AppResult<Vec<Vec<f32>>> {
        let mut attempt = 0;
        let mut last_error = None;

        while attempt < MAX_RETRIES {
            match self.request_chunk(texts).await {
                Ok(vectors) => return Ok(vectors),
                Err(e) => {
                    attempt += 1;
                    last_error = Some(e);

                    if attempt < MAX_RETRIES {
                        let backoff_ms = INITIAL_BACKOFF_MS * 2_u64.pow(attempt);
                        warn!(
                            "Embedding failed (attempt {}/{}), retrying in {}ms",
                            attempt, MAX_RETRIES, backoff_ms
                        );
                        tokio::time::sleep(Duration::from_millis(backoff_ms)).await;
                    }
                }
            }
        }

        Err(last_error
            .unwrap_or_else(|| AppError::Embedding("Unknown embedding error".to_string())))
    }
}

#[async_trait::async_trait]
impl EmbeddingProvider for HttpEmbedder {
    fn provider_name(&self) -> &str {
        "http"
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    async fn embed_batch(&self, texts: &[String]) -> AppResult<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let mut all_vectors = Vec::with_capacity(texts.len());

        for chunk in texts.chunks(self.batch_size) {
            let vectors = self.embed_chunk(chunk).await?;
            all_vectors.extend(vectors);
            debug!("Embedded {}/{} texts", all_vectors.len(), texts.len());
        }

        Ok(all_vectors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_response_parsing() {
        let raw = r#"{"data": {"text_vectors": [[0.1, 0.2], [0.3, 0.4]]}}"#;
        let parsed: EmbeddingResponse = serde_json::from_str(raw).unwrap();
        assert_eq!(parsed.data.text_vectors.len(), 2);
        assert_eq!(parsed.data.text_vectors[0], vec![0.1, 0.2]);
    }

    #[test]
    fn test_request_shape() {
        let texts = vec!["a".to_string(), "b".to_string()];
        let body = serde_json::to_value(EmbeddingRequest { texts: &texts }).unwrap();
        assert_eq!(body["texts"].as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_empty_batch_short_circuits() {
        // No server needed: the empty batch never issues a request.
        let embedder = HttpEmbedder::new("http://localhost:1/emb", 4, 25).unwrap();
        let vectors = embedder.embed_batch(&[]).await.unwrap();
        assert!(vectors.is_empty());
    }

    #[tokio::test]
    async fn test_unreachable_service_errors_after_retries() {
        let embedder = HttpEmbedder::new("http://localhost:1/emb", 4, 25).unwrap();
        let result = embedder.embed_batch(&["text".to_string()]).await;
        assert!(matches!(result, Err(AppError::Embedding(_))));
    }
}
