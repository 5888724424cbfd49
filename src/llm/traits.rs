//! Model gateway trait for abstracting text-generation backends
//!
//! The orchestration graph only talks to this trait, so backends (Ollama,
//! hosted APIs, scripted fakes in tests) are interchangeable.

use async_trait::async_trait;

use crate::core::{Message, Result, ToolDefinition};

/// Callback invoked for each streamed content fragment
pub type StreamCallback = Box<dyn Fn(&str) + Send + Sync>;

/// Token usage information
#[derive(Debug, Clone, Default)]
pub struct TokenUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

/// Options for LLM generation
#[derive(Debug, Clone, Default)]
pub struct GenerateOptions {
    /// Temperature for sampling (0.0 - 2.0)
    pub temperature: Option<f32>,
    /// Maximum tokens to generate
    pub max_tokens: Option<u32>,
}

/// Build the instruction handed to the summarizer
pub fn summary_instruction(max_words: usize) -> String {
    format!(
        "Summarize the above messages. Summary must be to the point and should be under {} words",
        max_words
    )
}

/// Abstraction over a text-generation capability
#[async_trait]
pub trait ModelGateway: Send + Sync {
    /// Produce one assistant message for `messages`, bound to `tools`.
    ///
    /// With `on_token` set, content fragments are delivered as they arrive.
    /// Tool calls are only known once the full response is assembled and are
    /// returned on the message, never through the callback.
    async fn generate(
        &self,
        messages: &[Message],
        tools: &[ToolDefinition],
        on_token: Option<&StreamCallback>,
    ) -> Result<Message>;

    /// Condense `anchor` and the current `summary` message into a new summary
    async fn summarize(&self, anchor: &Message, summary: &Message) -> Result<String>;

    /// Get the backend name
    fn name(&self) -> &str;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_summary_instruction_caps_words() {
        let text = summary_instruction(200);
        assert!(text.ends_with("under 200 words"));
    }
}
