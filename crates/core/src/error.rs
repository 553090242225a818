//! Error types for docrag.
//!
//! This module defines a unified error enum that covers all error categories
//! in the application: configuration, I/O, the generation service, the
//! embedding service, the document store, the reranker, and caller input.

use thiserror::Error;

/// Unified error type for docrag.
///
/// All fallible functions in the workspace return `Result<T, AppError>`.
/// We never panic — errors must be represented and propagated. Most
/// retrieval-side failures are additionally recovered locally (empty hit
/// list, skipped rerank, fallback query string) before they reach a caller;
/// see the session orchestrator for the degradation policy.
#[derive(Error, Debug)]
pub enum AppError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O and filesystem errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Generation service (LLM) errors
    #[error("LLM error: {0}")]
    Llm(String),

    /// Embedding service errors
    #[error("Embedding error: {0}")]
    Embedding(String),

    /// Document store errors
    #[error("Store error: {0}")]
    Store(String),

    /// Reranking service errors
    #[error("Rerank error: {0}")]
    Rerank(String),

    /// Invalid caller input rejected at an API boundary
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Generic errors
    #[error("{0}")]
    Other(String),
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Serialization(err.to_string())
    }
}

impl From<serde_yaml::Error> for AppError {
    fn from(err: serde_yaml::Error) -> Self {
        AppError::Serialization(err.to_string())
    }
}

/// Convenience type alias for Results with AppError.
pub type AppResult<T> = Result<T, AppError>;
