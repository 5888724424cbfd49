//! Conversation state threaded through the graph
//!
//! The two system messages that prime every model call are derived from the
//! state's fields on demand and never stored.

use serde::{Deserialize, Serialize};

use crate::core::Message;

/// State of one session's conversation
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConversationState {
    /// Fixed persona/policy text
    #[serde(skip)]
    pub static_system: String,
    /// Time, location and user id; recomputed every turn
    #[serde(skip)]
    pub dynamic_system: String,
    /// Rolling summary of evicted history
    #[serde(default)]
    pub summary: String,
    /// Active, not yet summarized messages, oldest first
    #[serde(default)]
    pub messages: Vec<Message>,
}

/// System message combining the static and dynamic instructions
pub fn system_message(static_system: &str, dynamic_system: &str) -> Message {
    Message::system(format!("{}\n{}", static_system, dynamic_system))
}

/// System message carrying the rolling summary; rendered even when empty
pub fn summary_message(summary: &str) -> Message {
    Message::system(format!("Long term memory with the user:\n{}", summary))
}

impl ConversationState {
    /// Create an empty state with the given system instructions
    pub fn new(static_system: impl Into<String>, dynamic_system: impl Into<String>) -> Self {
        Self {
            static_system: static_system.into(),
            dynamic_system: dynamic_system.into(),
            ..Default::default()
        }
    }

    /// Replace the per-turn system instructions
    pub fn set_system(
        &mut self,
        static_system: impl Into<String>,
        dynamic_system: impl Into<String>,
    ) {
        self.static_system = static_system.into();
        self.dynamic_system = dynamic_system.into();
    }

    /// The `[system, summary]` pair that primes every model call
    pub fn system_view(&self) -> [Message; 2] {
        [
            system_message(&self.static_system, &self.dynamic_system),
            summary_message(&self.summary),
        ]
    }

    /// The summary as a message, as handed to the summarizer
    pub fn summary_view(&self) -> Message {
        summary_message(&self.summary)
    }

    /// Everything sent to the model: system view followed by active messages
    pub fn model_view(&self) -> Vec<Message> {
        let mut view = Vec::with_capacity(self.messages.len() + 2);
        view.extend(self.system_view());
        view.extend(self.messages.iter().cloned());
        view
    }

    /// Append a message
    pub fn push(&mut self, message: Message) {
        self.messages.push(message);
    }

    /// Append several messages, keeping their order
    pub fn extend(&mut self, messages: impl IntoIterator<Item = Message>) {
        self.messages.extend(messages);
    }

    /// Get the last message
    pub fn last_message(&self) -> Option<&Message> {
        self.messages.last()
    }

    /// Get message count
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}
