//! History compaction
//!
//! Estimates the token cost of the active messages and, when it exceeds the
//! threshold, folds the oldest message into the rolling summary.

use tracing::debug;

use crate::agent::state::ConversationState;
use crate::core::config::CompactionConfig;
use crate::core::{Message, Result, Role};
use crate::llm::ModelGateway;

/// Decides when and how to shrink the active history
#[derive(Debug, Clone)]
pub struct CompactionPolicy {
    threshold_tokens: usize,
    chars_per_token: usize,
    extra_tokens_per_message: usize,
}

impl CompactionPolicy {
    /// Create a policy; `chars_per_token` is clamped to at least 1
    pub fn new(
        threshold_tokens: usize,
        chars_per_token: usize,
        extra_tokens_per_message: usize,
    ) -> Self {
        Self {
            threshold_tokens,
            chars_per_token: chars_per_token.max(1),
            extra_tokens_per_message,
        }
    }

    pub fn from_config(config: &CompactionConfig) -> Self {
        Self::new(
            config.threshold_tokens,
            config.chars_per_token,
            config.extra_tokens_per_message,
        )
    }

    pub fn threshold(&self) -> usize {
        self.threshold_tokens
    }

    /// `ceil(chars / chars_per_token) + extra_tokens_per_message * count`
    pub fn estimate_tokens(&self, messages: &[Message]) -> usize {
        let chars: usize = messages.iter().map(Message::char_count).sum();
        chars.div_ceil(self.chars_per_token) + self.extra_tokens_per_message * messages.len()
    }

    /// Whether the active messages exceed the budget
    pub fn needs_compaction(&self, messages: &[Message]) -> bool {
        self.estimate_tokens(messages) > self.threshold_tokens
    }

    /// How many leading messages one pass evicts.
    ///
    /// Always at least one for a non-empty history. An assistant message that
    /// requested tools takes its immediately following tool results with it,
    /// so the remaining history never starts with orphaned results.
    pub fn eviction_len(messages: &[Message]) -> usize {
        let Some(first) = messages.first() else {
            return 0;
        };

        if !first.has_tool_calls() {
            return 1;
        }

        1 + messages[1..]
            .iter()
            .take_while(|m| m.role == Role::Tool)
            .count()
    }

    /// The single message handed to the summarizer for an evicted block
    pub fn anchor_for(evicted: &[Message]) -> Message {
        match evicted {
            [] => Message::system(""),
            [only] if !only.has_tool_calls() => only.clone(),
            [first, rest @ ..] => {
                let mut content = first.content.clone();
                for call in &first.tool_calls {
                    content.push_str(&format!("\n[called {} with {}]", call.name, call.arguments));
                }
                for result in rest {
                    content.push_str(&format!(
                        "\n[{} result]: {}",
                        result.tool_name.as_deref().unwrap_or("tool"),
                        result.content
                    ));
                }
                Message {
                    role: first.role,
                    content,
                    tool_calls: Vec::new(),
                    tool_call_id: None,
                    tool_name: None,
                }
            }
        }
    }

    /// Run one compaction pass: summarize the oldest block with the current
    /// summary, replace the summary, and drop the block.
    ///
    /// Returns the number of messages evicted. The state is untouched when the
    /// summarizer fails.
    pub async fn compact_step(
        &self,
        state: &mut ConversationState,
        summarizer: &dyn ModelGateway,
    ) -> Result<usize> {
        let evict = Self::eviction_len(&state.messages);
        if evict == 0 {
            return Ok(0);
        }

        let anchor = Self::anchor_for(&state.messages[..evict]);
        let summary = summarizer.summarize(&anchor, &state.summary_view()).await?;

        state.summary = summary;
        state.messages.drain(..evict);

        debug!(
            evicted = evict,
            remaining = state.messages.len(),
            estimate = self.estimate_tokens(&state.messages),
            "compacted history"
        );

        Ok(evict)
    }
}

impl Default for CompactionPolicy {
    fn default() -> Self {
        Self::from_config(&CompactionConfig::default())
    }
}
