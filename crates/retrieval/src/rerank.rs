//! Reranking service client.
//!
//! A cross-encoder scores (query, candidate) pairs; the service returns a
//! parallel list of floats, higher = more relevant. Length mismatches and
//! transport errors are surfaced as errors here — the hybrid retriever
//! decides to fall back to fusion order, never to fail the retrieval.

use docrag_core::{AppError, AppResult};
use serde::{Deserialize, Serialize};
use std::time::Duration;

const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Trait for reranking services.
#[async_trait::async_trait]
pub trait RerankClient: Send + Sync {
    /// Score each candidate text against the query.
    ///
    /// Returns one score per candidate, same order as the input.
    async fn score(&self, query: &str, documents: &[String]) -> AppResult<Vec<f64>>;
}

#[derive(Debug, Serialize)]
struct RerankRequest<'a> {
    query: &'a str,
    documents: &'a [String],
}

#[derive(Debug, Deserialize)]
struct RerankResponse {
    scores: Vec<f64>,
}

/// HTTP reranking service client.
pub struct HttpReranker {
    client: reqwest::Client,
    url: String,
}

impl HttpReranker {
    pub fn new(url: impl Into<String>) -> AppResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .map_err(|e| AppError::Rerank(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

#[async_trait::async_trait]
impl RerankClient for HttpReranker {
    async fn score(&self, query: &str, documents: &[String]) -> AppResult<Vec<f64>> {
        let response = self
            .client
            .post(&self.url)
            .json(&RerankRequest { query, documents })
            .send()
            .await
            .map_err(|e| AppError::Rerank(format!("Rerank request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(AppError::Rerank(format!(
                "Rerank service error ({})",
                response.status()
            )));
        }

        let parsed: RerankResponse = response
            .json()
            .await
            .map_err(|e| AppError::Rerank(format!("Failed to parse rerank response: {}", e)))?;

        Ok(parsed.scores)
    }
}
