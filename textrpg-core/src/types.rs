//! Core domain types for textrpg
//!
//! These types describe the conversation as the client sees it: finalized
//! messages, the in-flight typing buffer, the game agent driving the story,
//! and the state of the stream connection.
//!
//! ## Terminology
//!
//! | Term | Definition |
//! |------|------------|
//! | **Message** | A finalized entry in the conversation history |
//! | **Typing buffer** | Assistant text received so far for the reply being streamed |
//! | **Agent** | The backend persona currently running the game (setup or gameplay) |
//! | **Session** | Server-side conversation identified by a `session_id` |
//! | **Generation** | Epoch counter for stream subscriptions; stale generations are ignored |

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ============================================
// Messages
// ============================================

/// Who authored a message.
///
/// The backend calls these `human`, `ai` and `system`; both spellings are accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[serde(alias = "human")]
    User,
    #[serde(alias = "ai")]
    Assistant,
    System,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::System => "system",
        }
    }
}

/// A finalized conversation entry.
///
/// Messages are never edited after they are appended to history. Ids are
/// UUIDv7 so they sort by creation time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub role: Role,
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub session_id: Option<String>,
    /// Opaque metadata (finalize reason, backend metadata, ...)
    #[serde(default)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl Message {
    pub fn new(role: Role, content: impl Into<String>, session_id: Option<String>) -> Self {
        Self {
            id: Uuid::now_v7().to_string(),
            role,
            content: content.into(),
            created_at: Utc::now(),
            session_id,
            extra: serde_json::Map::new(),
        }
    }

    pub fn user(content: impl Into<String>, session_id: Option<String>) -> Self {
        Self::new(Role::User, content, session_id)
    }

    pub fn assistant(content: impl Into<String>, session_id: Option<String>) -> Self {
        Self::new(Role::Assistant, content, session_id)
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content, None)
    }

    /// Attach a metadata entry.
    pub fn with_extra(mut self, key: &str, value: impl Into<serde_json::Value>) -> Self {
        self.extra.insert(key.to_string(), value.into());
        self
    }
}

// ============================================
// Typing buffer
// ============================================

/// Accumulates streamed assistant text until the reply is finalized.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TypingBuffer {
    pub accumulated_text: String,
    pub active: bool,
}

impl TypingBuffer {
    /// Append a chunk and mark the buffer active.
    pub fn push(&mut self, chunk: &str) {
        self.accumulated_text.push_str(chunk);
        self.active = true;
    }

    /// True if the buffer holds anything besides whitespace.
    pub fn has_text(&self) -> bool {
        !self.accumulated_text.trim().is_empty()
    }

    /// Take the accumulated text and reset the buffer.
    pub fn take(&mut self) -> String {
        self.active = false;
        std::mem::take(&mut self.accumulated_text)
    }
}

// ============================================
// Agents
// ============================================

/// The backend agent currently running the game.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentKind {
    None,
    /// Collects player preferences and prepares the adventure
    Setup,
    /// Narrates the story and runs gameplay
    Gameplay,
}

impl AgentKind {
    /// Map a wire spelling onto an agent.
    ///
    /// The backend has used several names for the same two agents over time.
    pub fn from_wire(value: &str) -> Option<AgentKind> {
        match value {
            "none" => Some(AgentKind::None),
            "setup" | "setup_agent" | "story_creator" => Some(AgentKind::Setup),
            "gameplay" | "gameplay_agent" | "gamemaster" => Some(AgentKind::Gameplay),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AgentKind::None => "none",
            AgentKind::Setup => "setup",
            AgentKind::Gameplay => "gameplay",
        }
    }

    /// Human-friendly label for status badges.
    pub fn label(&self) -> &'static str {
        match self {
            AgentKind::None => "No agent",
            AgentKind::Setup => "Setup Agent",
            AgentKind::Gameplay => "Gameplay Agent",
        }
    }
}

/// Agent/phase information carried by completion frames.
///
/// Sticky: fields only change when a completion frame supplies them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AgentState {
    pub current_agent: Option<AgentKind>,
    pub last_transition_trigger: Option<String>,
    pub story_context: Option<String>,
}

// ============================================
// Connection
// ============================================

/// Status of the stream transport.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    Connecting,
    Connected,
    #[default]
    Disconnected,
    Error,
}

impl ConnectionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Error => "error",
        }
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
