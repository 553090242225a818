//! Generation service clients for docrag.
//!
//! Defines the `LlmClient` abstraction used for query reformulation and
//! answer synthesis, with provider implementations behind a factory.

pub mod client;
pub mod factory;
pub mod providers;

pub use client::{ChatMessage, LlmClient, LlmRequest, LlmResponse, Role};
pub use factory::create_client;
