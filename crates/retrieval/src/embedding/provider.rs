//! Embedding provider trait and factory.

use docrag_core::config::EmbeddingSettings;
use docrag_core::{AppError, AppResult};
use std::sync::Arc;

/// Trait for embedding providers.
///
/// The contract: input is an ordered list of strings, output is a list of
/// equal-length vectors in the same order with fixed dimensionality. A
/// provider fails loudly after exhausting its retries rather than
/// returning partial vectors; the caller decides how to degrade.
#[async_trait::async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Get provider name (e.g., "http", "mock")
    fn provider_name(&self) -> &str;

    /// Get embedding dimensions
    fn dimensions(&self) -> usize;

    /// Generate embeddings for multiple texts in a batch.
    async fn embed_batch(&self, texts: &[String]) -> AppResult<Vec<Vec<f32>>>;

    /// Generate embedding for a single text (convenience method).
    async fn embed(&self, text: &str) -> AppResult<Vec<f32>> {
        let mut results = self.embed_batch(&[text.to_string()]).await?;
        results
            .pop()
            .ok_or_else(|| AppError::Embedding("No embedding returned".to_string()))
    }
}

/// Create an embedding provider from settings.
///
/// A configured service URL selects the HTTP provider; otherwise the
/// deterministic mock provider is used (offline operation and tests).
pub fn create_provider(settings: &EmbeddingSettings) -> AppResult<Arc<dyn EmbeddingProvider>> {
    match settings.url {
        Some(ref url) => Ok(Arc::new(super::HttpEmbedder::new(
            url,
            settings.dimensions,
            settings.batch_size,
        )?)),
        None => Ok(Arc::new(super::MockEmbedder::new(settings.dimensions))),
    }
}
