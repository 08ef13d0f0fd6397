use crate::error::SessionError;
use crate::types::{ChatMessage, ChatRole};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::debug;

/// Ten user/assistant exchanges.
pub const DEFAULT_MAX_MESSAGES: usize = 20;

/// Shared, mutex-guarded map of session id to chat history.
///
/// Cloning the store is cheap and every clone observes the same sessions,
/// so one instance can be handed to every concurrent request.
#[derive(Debug, Clone)]
pub struct SessionStore {
    inner: Arc<Mutex<HashMap<String, Vec<ChatMessage>>>>,
    max_messages: usize,
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_MESSAGES)
    }
}

impl SessionStore {
    pub fn new(max_messages: usize) -> Self {
        Self {
            inner: Arc::new(Mutex::new(HashMap::new())),
            max_messages: max_messages.max(2),
        }
    }

    pub fn max_messages(&self) -> usize {
        self.max_messages
    }

    /// Snapshot of the stored history; empty for unknown sessions.
    pub fn history(&self, session_id: &str) -> Vec<ChatMessage> {
        self.sessions()
            .get(session_id)
            .cloned()
            .unwrap_or_default()
    }

    pub fn contains(&self, session_id: &str) -> bool {
        self.sessions().contains_key(session_id)
    }

    /// Append one user/assistant pair and prune the session to its bound.
    pub fn record_exchange(
        &self,
        session_id: &str,
        user: impl Into<String>,
        assistant: impl Into<String>,
    ) {
        let mut sessions = self.sessions();
        let history = sessions.entry(session_id.to_string()).or_default();
        history.push(ChatMessage::user(user));
        history.push(ChatMessage::assistant(assistant));
        prune(history, self.max_messages);
        debug!(
            session_id,
            total_messages = history.len(),
            "Recorded chat exchange"
        );
    }

    /// Forget a session entirely. Returns whether it existed.
    pub fn clear(&self, session_id: &str) -> bool {
        let removed = self.sessions().remove(session_id).is_some();
        if removed {
            debug!(session_id, "Cleared chat session");
        }
        removed
    }

    pub fn session_count(&self) -> usize {
        self.sessions().len()
    }

    /// Serialize one session's history so an external store can persist it.
    pub fn export(&self, session_id: &str) -> Result<Vec<u8>, SessionError> {
        let history = self.history(session_id);
        serde_json::to_vec(&history).map_err(|source| SessionError::Serialize {
            session: session_id.to_string(),
            source,
        })
    }

    /// Replace a session's history with a previously exported snapshot.
    pub fn import(&self, session_id: &str, bytes: &[u8]) -> Result<usize, SessionError> {
        let mut history: Vec<ChatMessage> =
            serde_json::from_slice(bytes).map_err(|source| SessionError::Deserialize {
                session: session_id.to_string(),
                source,
            })?;
        prune(&mut history, self.max_messages);
        let count = history.len();
        self.sessions().insert(session_id.to_string(), history);
        Ok(count)
    }

    fn sessions(&self) -> MutexGuard<'_, HashMap<String, Vec<ChatMessage>>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

// History must keep starting on a user message after pruning.
fn prune(history: &mut Vec<ChatMessage>, max_messages: usize) {
    if history.len() > max_messages {
        let excess = history.len() - max_messages;
        history.drain(..excess);
    }
    while history
        .first()
        .is_some_and(|message| message.role == ChatRole::Assistant)
    {
        history.remove(0);
    }
}
