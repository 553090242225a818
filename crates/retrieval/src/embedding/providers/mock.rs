//! Deterministic mock embedding provider.
//!
//! Hashes tokens into a fixed-dimension vector and normalizes it. Not
//! semantically meaningful, but deterministic and content-dependent, which
//! is what offline development and tests need.

use crate::embedding::provider::EmbeddingProvider;
use docrag_core::AppResult;
use unicode_segmentation::UnicodeSegmentation;

/// Mock provider producing unit vectors from token hashes.
pub struct MockEmbedder {
    dimensions: usize,
}

impl MockEmbedder {
    pub fn new(dimensions: usize) -> Self {
        Self { dimensions }
    }

    fn embed_text(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimensions];

        for word in text.to_lowercase().unicode_words() {
            // FNV-1a over the token bytes
            let mut hash: u64 = 0xcbf29ce484222325;
            for byte in word.bytes() {
                hash ^= byte as u64;
                hash = hash.wrapping_mul(0x100000001b3);
            }

            vector[(hash % self.dimensions as u64) as usize] += 1.0;
            // A second position per token reduces collisions
            vector[((hash >> 32) % self.dimensions as u64) as usize] += 0.5;
        }

        let norm: f32 = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for v in &mut vector {
                *v /= norm;
            }
        }

        vector
    }
}

#[async_trait::async_trait]
impl EmbeddingProvider for MockEmbedder {
    fn provider_name(&self) -> &str {
        "mock"
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    async fn embed_batch(&self, texts: &[String]) -> AppResult<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|text| self.embed_text(text)).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_dimensions_and_name() {
        let provider = MockEmbedder::new(256);
        assert_eq!(provider.dimensions(), 256);
        assert_eq!(provider.provider_name(), "mock");
    }

    #[tokio::test]
    async fn test_unit_norm() {
        let provider = MockEmbedder::new(256);
        let embedding = provider.embed("hello world").await.unwrap();
        assert_eq!(embedding.len(), 256);

        let norm: f32 = embedding.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 0.001);
    }

    #[tokio::test]
    async fn test_deterministic() {
        let provider = MockEmbedder::new(256);
        let a = provider.embed("deterministic test").await.unwrap();
        let b = provider.embed("deterministic test").await.unwrap();
        assert_eq!(a, b);
    }

    #[tokio::test]
    async fn test_different_texts_differ() {
        let provider = MockEmbedder::new(256);
        let a = provider.embed("hello world").await.unwrap();
        let b = provider.embed("goodbye world").await.unwrap();
        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn test_empty_text_is_zero_vector() {
        let provider = MockEmbedder::new(256);
        let embedding = provider.embed("").await.unwrap();
        assert!(embedding.iter().all(|&x| x == 0.0));
    }

    #[tokio::test]
    async fn test_batch_order_preserved() {
        let provider = MockEmbedder::new(64);
        let texts = vec!["first".to_string(), "second".to_string()];
        let batch = provider.embed_batch(&texts).await.unwrap();
        assert_eq!(batch.len(), 2);
        assert_eq!(batch[0], provider.embed("first").await.unwrap());
        assert_eq!(batch[1], provider.embed("second").await.unwrap());
    }
}
