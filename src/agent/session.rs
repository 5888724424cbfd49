//! Session persistence
//!
//! Durable keyed storage of conversation state across turns and restarts,
//! plus the per-session lease that keeps concurrent turns from interleaving.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};
use tracing::debug;

use crate::agent::state::ConversationState;
use crate::core::{CarelineError, Message, Result};

/// Keyed storage of conversation state
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Load the state saved under `session_id`, if any
    async fn load(&self, session_id: &str) -> Result<Option<ConversationState>>;

    /// Overwrite the state saved under `session_id`
    async fn save(&self, session_id: &str, state: &ConversationState) -> Result<()>;
}

/// Durable form of a conversation; system instructions are not kept
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionRecord {
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub messages: Vec<Message>,
    pub updated_at: DateTime<Utc>,
}

impl SessionRecord {
    pub fn from_state(state: &ConversationState) -> Self {
        Self {
            summary: state.summary.clone(),
            messages: state.messages.clone(),
            updated_at: Utc::now(),
        }
    }

    pub fn into_state(self) -> ConversationState {
        ConversationState {
            summary: self.summary,
            messages: self.messages,
            ..Default::default()
        }
    }
}

/// In-process store, lost on restart
#[derive(Default)]
pub struct MemorySessionStore {
    sessions: RwLock<HashMap<String, SessionRecord>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn load(&self, session_id: &str) -> Result<Option<ConversationState>> {
        let sessions = self.sessions.read().await;
        Ok(sessions
            .get(session_id)
            .cloned()
            .map(SessionRecord::into_state))
    }

    async fn save(&self, session_id: &str, state: &ConversationState) -> Result<()> {
        let mut sessions = self.sessions.write().await;
        sessions.insert(session_id.to_string(), SessionRecord::from_state(state));
        Ok(())
    }
}

/// One JSON file per session under a directory
pub struct FileSessionStore {
    directory: PathBuf,
}

impl FileSessionStore {
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
        }
    }

    /// Path of the file backing `session_id`.
    ///
    /// The id is percent-encoded, so it never contains a path separator and
    /// distinct ids never share a file.
    pub fn session_path(&self, session_id: &str) -> PathBuf {
        self.directory
            .join(format!("{}.json", urlencoding::encode(session_id)))
    }
}

#[async_trait]
impl SessionStore for FileSessionStore {
    async fn load(&self, session_id: &str) -> Result<Option<ConversationState>> {
        let path = self.session_path(session_id);

        let content = match tokio::fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(CarelineError::session(format!(
                    "Failed to read {}: {}",
                    path.display(),
                    e
                )))
            }
        };

        let record: SessionRecord = serde_json::from_str(&content).map_err(|e| {
            CarelineError::session(format!("Corrupt session file {}: {}", path.display(), e))
        })?;

        debug!(session_id, messages = record.messages.len(), "session loaded");
        Ok(Some(record.into_state()))
    }

    async fn save(&self, session_id: &str, state: &ConversationState) -> Result<()> {
        tokio::fs::create_dir_all(&self.directory)
            .await
            .map_err(|e| CarelineError::session(format!("Failed to create session dir: {}", e)))?;

        let path = self.session_path(session_id);
        let tmp = path.with_extension("json.tmp");
        let content = serde_json::to_string_pretty(&SessionRecord::from_state(state))?;

        // Write then rename so readers never see a half-written record
        tokio::fs::write(&tmp, content)
            .await
            .map_err(|e| CarelineError::session(format!("Failed to write session: {}", e)))?;
        tokio::fs::rename(&tmp, &path)
            .await
            .map_err(|e| CarelineError::session(format!("Failed to write session: {}", e)))?;

        debug!(session_id, messages = state.messages.len(), "session saved");
        Ok(())
    }
}

/// Per-session exclusive leases, held for the duration of a turn
#[derive(Default)]
pub struct SessionLeases {
    leases: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl SessionLeases {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `session_id`
    pub async fn acquire(&self, session_id: &str) -> OwnedMutexGuard<()> {
        let lease = {
            let mut leases = self.leases.lock().await;
            // Drop leases nobody holds or waits on
            leases.retain(|_, lease| Arc::strong_count(lease) > 1);
            leases
                .entry(session_id.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };
        lease.lock_owned().await
    }
}
