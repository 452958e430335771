//! Session manager contract + in-memory default (§6).
//!
//! The core treats durable session persistence as an opaque external
//! collaborator behind four operations: `initialize`, `append_message`,
//! `sync_agent`, `redact_message`. This crate ships one concrete
//! implementation, [`InMemorySessionManager`], grounded on the donor's
//! pattern of owning a plain `Vec<Message>` directly on `Client` — generalized
//! here into process-wide maps keyed by `session_id`/`agent_id` so it can
//! stand in for a real backend in tests and single-process deployments.
//! Durable backends (file, S3, DynamoDB) are out of scope; embedding
//! applications implement [`SessionManager`] against their own store.

use crate::error::{Error, Result};
use crate::types::Message;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Mutex;

/// One persisted message record: the message itself plus an optional
/// redaction overlay and a dense per-agent `message_id`.
#[derive(Debug, Clone)]
pub struct SessionMessage {
    pub message_id: u64,
    pub message: Message,
    pub redacted: Option<Message>,
}

/// Per-agent persisted state: `agent.state`, `conversation_manager_state`,
/// and the message log.
#[derive(Debug, Clone, Default)]
pub struct SessionAgent {
    pub agent_id: String,
    pub state: Value,
    pub conversation_manager_state: Value,
    pub messages: Vec<SessionMessage>,
}

/// A durable conversation container holding one or more [`SessionAgent`]s.
#[derive(Debug, Clone, Default)]
pub struct Session {
    pub session_id: String,
    pub agents: HashMap<String, SessionAgent>,
}

/// External collaborator the core depends on only through this contract.
/// Implementations must be safe to call from a single invocation thread;
/// the core makes no concurrent calls into the same session/agent pair.
pub trait SessionManager: Send + Sync {
    /// Creates the session/agent record if absent; idempotent.
    fn initialize(&self, session_id: &str, agent_id: &str) -> Result<()>;

    /// Appends `message` to the agent's log, returning its new `message_id`.
    fn append_message(&self, session_id: &str, agent_id: &str, message: Message) -> Result<u64>;

    /// Persists `state` and `conversation_manager_state` for the agent.
    fn sync_agent(
        &self,
        session_id: &str,
        agent_id: &str,
        state: Value,
        conversation_manager_state: Value,
    ) -> Result<()>;

    /// Overlays a redacted replacement onto a previously appended message,
    /// preserving its `message_id`.
    fn redact_message(
        &self,
        session_id: &str,
        agent_id: &str,
        message_id: u64,
        redacted_content: Message,
    ) -> Result<()>;
}

/// In-process [`SessionManager`] backed by a mutex-guarded map. Suitable for
/// tests and single-process deployments; does not survive process restart.
#[derive(Default)]
pub struct InMemorySessionManager {
    sessions: Mutex<HashMap<String, Session>>,
}

impl InMemorySessionManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of one agent's current message log, for callers rehydrating
    /// history at startup.
    pub fn history(&self, session_id: &str, agent_id: &str) -> Vec<Message> {
        let sessions = self.sessions.lock().unwrap();
        sessions
            .get(session_id)
            .and_then(|s| s.agents.get(agent_id))
            .map(|a| {
                a.messages
                    .iter()
                    .map(|m| m.redacted.clone().unwrap_or_else(|| m.message.clone()))
                    .collect()
            })
            .unwrap_or_default()
    }
}

impl SessionManager for InMemorySessionManager {
    fn initialize(&self, session_id: &str, agent_id: &str) -> Result<()> {
        let mut sessions = self.sessions.lock().unwrap();
        let session = sessions.entry(session_id.to_string()).or_insert_with(|| Session {
            session_id: session_id.to_string(),
            agents: HashMap::new(),
        });
        session.agents.entry(agent_id.to_string()).or_insert_with(|| SessionAgent {
            agent_id: agent_id.to_string(),
            ..Default::default()
        });
        Ok(())
    }

    fn append_message(&self, session_id: &str, agent_id: &str, message: Message) -> Result<u64> {
        let mut sessions = self.sessions.lock().unwrap();
        let agent = sessions
            .get_mut(session_id)
            .and_then(|s| s.agents.get_mut(agent_id))
            .ok_or_else(|| Error::other("session/agent not initialized"))?;
        let message_id = agent.messages.len() as u64;
        agent.messages.push(SessionMessage {
            message_id,
            message,
            redacted: None,
        });
        Ok(message_id)
    }

    fn sync_agent(
        &self,
        session_id: &str,
        agent_id: &str,
        state: Value,
        conversation_manager_state: Value,
    ) -> Result<()> {
        let mut sessions = self.sessions.lock().unwrap();
        let agent = sessions
            .get_mut(session_id)
            .and_then(|s| s.agents.get_mut(agent_id))
            .ok_or_else(|| Error::other("session/agent not initialized"))?;
        agent.state = state;
        agent.conversation_manager_state = conversation_manager_state;
        Ok(())
    }

    fn redact_message(
        &self,
        session_id: &str,
        agent_id: &str,
        message_id: u64,
        redacted_content: Message,
    ) -> Result<()> {
        let mut sessions = self.sessions.lock().unwrap();
        let agent = sessions
            .get_mut(session_id)
            .and_then(|s| s.agents.get_mut(agent_id))
            .ok_or_else(|| Error::other("session/agent not initialized"))?;
        let record = agent
            .messages
            .iter_mut()
            .find(|m| m.message_id == message_id)
            .ok_or_else(|| Error::other("unknown message_id"))?;
        record.redacted = Some(redacted_content);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Message;

    #[test]
    fn test_initialize_then_append_then_history() {
        let sessions = InMemorySessionManager::new();
        sessions.initialize("s1", "a1").unwrap();
        sessions.append_message("s1", "a1", Message::user("hi")).unwrap();
        sessions.append_message("s1", "a1", Message::user("again")).unwrap();
        let history = sessions.history("s1", "a1");
        assert_eq!(history.len(), 2);
    }

    #[test]
    fn test_append_without_initialize_errors() {
        let sessions = InMemorySessionManager::new();
        let result = sessions.append_message("s1", "a1", Message::user("hi"));
        assert!(result.is_err());
    }

    #[test]
    fn test_redact_message_overlays_without_losing_message_id() {
        let sessions = InMemorySessionManager::new();
        sessions.initialize("s1", "a1").unwrap();
        let id = sessions.append_message("s1", "a1", Message::user("secret")).unwrap();
        sessions
            .redact_message("s1", "a1", id, Message::user("[redacted]"))
            .unwrap();
        let history = sessions.history("s1", "a1");
        assert_eq!(history[0].content[0].as_text(), Some("[redacted]"));
    }

    #[test]
    fn test_sync_agent_persists_state() {
        let sessions = InMemorySessionManager::new();
        sessions.initialize("s1", "a1").unwrap();
        sessions
            .sync_agent("s1", "a1", serde_json::json!({"k": 1}), serde_json::json!({}))
            .unwrap();
        let guard = sessions.sessions.lock().unwrap();
        let agent = &guard.get("s1").unwrap().agents["a1"];
        assert_eq!(agent.state, serde_json::json!({"k": 1}));
    }
}
