//! Agent module - the conversation orchestration engine
//!
//! Contains the per-session state, history compaction, session persistence
//! and the graph that drives a turn through inference and tool rounds.

pub mod compaction;
pub mod context;
pub mod events;
pub mod graph;
pub mod session;
pub mod state;

pub use compaction::CompactionPolicy;
pub use context::{ContextProvider, StaticContext, SystemContext};
pub use events::{ChatEvent, ChatStream};
pub use graph::{ChatGraph, NextStep};
pub use session::{FileSessionStore, MemorySessionStore, SessionLeases, SessionStore};
pub use state::ConversationState;
