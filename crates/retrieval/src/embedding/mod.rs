//! Embedding providers.

pub mod provider;
pub mod providers;

pub use provider::{create_provider, EmbeddingProvider};
pub use providers::http::HttpEmbedder;
pub use providers::mock::MockEmbedder;
