//! Careline - Conversational healthcare assistant
//!
//! A stateful chat engine that answers health questions and helps users book
//! doctor appointments. It uses Ollama for local LLM inference.
//!
//! # Architecture
//!
//! - **Core**: Shared types, configuration, and error handling
//! - **LLM**: Model gateway abstraction with Ollama implementation
//! - **Tools**: Tool registry with the healthcare tools
//! - **Agent**: Orchestration graph, compaction and session persistence
//! - **CLI**: Command-line interface and REPL
//!
//! # Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use careline::{ChatEvent, ChatGraph, Config};
//! use tokio_stream::StreamExt;
//!
//! #[tokio::main]
//! async fn main() -> careline::Result<()> {
//!     let graph = Arc::new(ChatGraph::from_config(&Config::load())?);
//!
//!     let mut events = graph.stream_turn("user-42", "I have had a fever for two days");
//!     while let Some(event) = events.next().await {
//!         print!("{}", event.to_sse());
//!     }
//!     Ok(())
//! }
//! ```

pub mod agent;
pub mod cli;
pub mod core;
pub mod llm;
pub mod tools;

// Re-export commonly used items
pub use agent::{ChatEvent, ChatGraph, ChatStream, ConversationState};
pub use cli::Repl;
pub use core::{CarelineError, Config, Result};
