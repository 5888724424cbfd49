//! Events streamed to the caller during a turn

use tokio_stream::wrappers::UnboundedReceiverStream;

/// One item of a turn's output stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatEvent {
    /// A fragment of the final answer text
    Token(String),
    /// The turn finished and its state was saved
    Done,
    /// The turn failed; nothing from it was saved
    Error(String),
}

/// Stream of events for one turn. Dropping it cancels the turn.
pub type ChatStream = UnboundedReceiverStream<ChatEvent>;

impl ChatEvent {
    pub fn is_terminal(&self) -> bool {
        matches!(self, ChatEvent::Done | ChatEvent::Error(_))
    }

    /// Render as a server-sent event frame
    pub fn to_sse(&self) -> String {
        match self {
            ChatEvent::Token(text) => data_lines(text),
            ChatEvent::Error(message) => format!("event: error\n{}", data_lines(message)),
            ChatEvent::Done => "event: done\ndata: [DONE]\n\n".to_string(),
        }
    }
}

fn data_lines(text: &str) -> String {
    let mut frame = String::new();
    for line in text.split('\n') {
        frame.push_str("data: ");
        frame.push_str(line);
        frame.push('\n');
    }
    frame.push('\n');
    frame
}
