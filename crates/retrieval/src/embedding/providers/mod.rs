//! Embedding provider implementations.

pub mod http;
pub mod mock;
