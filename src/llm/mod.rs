//! LLM module - model gateway and backends
//!
//! Provides the gateway abstraction used by the orchestration graph, with Ollama as the backend.

pub mod ollama;
pub mod traits;

pub use ollama::OllamaClient;
pub use traits::{GenerateOptions, ModelGateway, StreamCallback, TokenUsage};
