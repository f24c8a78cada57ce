//! Observable conversation state
//!
//! [`ConversationStore`] wraps a `tokio::sync::watch` channel. Readers take
//! snapshots or subscribe; only the reducer (inside this crate) mutates, and
//! each mutation is published as a single notification so observers never see
//! a half-applied update.

use std::sync::Arc;

use tokio::sync::watch;

use crate::types::{AgentState, ConnectionState, Message, TypingBuffer};

/// Everything the presentation layer renders.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChatState {
    /// Finalized conversation history
    pub messages: Vec<Message>,
    /// Server-asserted session id
    pub session_id: Option<String>,
    pub connection: ConnectionState,
    /// User-visible error text
    pub error: Option<String>,
    /// Read-only copy of the reducer's typing buffer
    pub typing: TypingBuffer,
    pub agent: AgentState,
    /// A request is in flight and no reply has been finalized yet
    pub loading: bool,
    /// Result of the last health probe, if any
    pub backend_reachable: Option<bool>,
}

impl ChatState {
    /// Reset history, typing, error text and the transition trigger.
    ///
    /// The current agent and story context are kept.
    pub(crate) fn clear_conversation(&mut self) {
        self.messages.clear();
        self.typing = TypingBuffer::default();
        self.error = None;
        self.agent.last_transition_trigger = None;
    }
}

/// Shared handle to the conversation state. Clones observe the same state.
#[derive(Clone)]
pub struct ConversationStore {
    tx: Arc<watch::Sender<ChatState>>,
}

impl Default for ConversationStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ConversationStore {
    pub fn new() -> Self {
        Self::with_state(ChatState::default())
    }

    pub fn with_state(state: ChatState) -> Self {
        let (tx, _rx) = watch::channel(state);
        Self { tx: Arc::new(tx) }
    }

    /// Clone of the current state.
    pub fn snapshot(&self) -> ChatState {
        self.tx.borrow().clone()
    }

    /// Receiver that is notified after every mutation.
    pub fn subscribe(&self) -> watch::Receiver<ChatState> {
        self.tx.subscribe()
    }

    pub fn session_id(&self) -> Option<String> {
        self.tx.borrow().session_id.clone()
    }

    pub fn connection(&self) -> ConnectionState {
        self.tx.borrow().connection
    }

    pub fn message_count(&self) -> usize {
        self.tx.borrow().messages.len()
    }

    /// Apply a mutation atomically and notify observers once.
    pub(crate) fn update<F>(&self, f: F)
    where
        F: FnOnce(&mut ChatState),
    {
        self.tx.send_modify(f);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::AgentKind;

    #[test]
    fn test_clones_share_state() {
        let store = ConversationStore::new();
        let other = store.clone();
        store.update(|state| state.messages.push(Message::user("Hello", None)));
        assert_eq!(other.message_count(), 1);
    }

    #[test]
    fn test_update_notifies_once() {
        let store = ConversationStore::new();
        let mut rx = store.subscribe();
        assert!(!rx.has_changed().unwrap());

        store.update(|state| {
            state.messages.push(Message::user("Hello", None));
            state.loading = true;
            state.session_id = Some("s1".to_string());
        });

        assert!(rx.has_changed().unwrap());
        let seen = rx.borrow_and_update().clone();
        assert_eq!(seen.messages.len(), 1);
        assert!(seen.loading);
        assert!(!rx.has_changed().unwrap());
    }

    #[test]
    fn test_clear_conversation_keeps_agent_and_session() {
        let mut state = ChatState {
            messages: vec![Message::user("Hello", None)],
            session_id: Some("s1".to_string()),
            error: Some("busy".to_string()),
            ..Default::default()
        };
        state.typing.push("partial");
        state.agent.current_agent = Some(AgentKind::Gameplay);
        state.agent.last_transition_trigger = Some("setup_complete".to_string());

        state.clear_conversation();

        assert!(state.messages.is_empty());
        assert!(state.error.is_none());
        assert_eq!(state.typing, TypingBuffer::default());
        assert!(state.agent.last_transition_trigger.is_none());
        assert_eq!(state.agent.current_agent, Some(AgentKind::Gameplay));
        assert_eq!(state.session_id.as_deref(), Some("s1"));
    }
}
