//! Wire frames of the chat stream
//!
//! Every SSE `data` payload is either the terminal sentinel `[DONE]` or a JSON
//! object tagged by `type`:
//!
//! ```text
//! data: {"type":"session_info","session_id":"s1","timestamp":{...}}
//! data: {"type":"user_message","content":"Hello","session_id":"s1"}
//! data: {"type":"ai_chunk","content":"Hi","chunk_id":0,"is_final":false,"session_id":"s1"}
//! data: {"type":"completion","total_chunks":1,"message_count":2,"complete_response":"Hi","session_id":"s1","agent":"setup_agent"}
//! data: [DONE]
//! ```

use serde::Deserialize;
use thiserror::Error;

/// Reserved payload that ends a stream.
pub const DONE_SENTINEL: &str = "[DONE]";

/// Frame types this client understands.
const KNOWN_FRAME_TYPES: &[&str] = &[
    "session_info",
    "user_message",
    "ai_chunk",
    "completion",
    "error",
];

/// A decoded stream frame.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Frame {
    SessionInfo(SessionInfo),
    UserMessage(UserMessageAck),
    AiChunk(AiChunk),
    Completion(Completion),
    Error(ServerError),
}

impl Frame {
    pub fn type_name(&self) -> &'static str {
        match self {
            Frame::SessionInfo(_) => "session_info",
            Frame::UserMessage(_) => "user_message",
            Frame::AiChunk(_) => "ai_chunk",
            Frame::Completion(_) => "completion",
            Frame::Error(_) => "error",
        }
    }
}

/// First frame of every stream; names the session the server is using.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SessionInfo {
    pub session_id: String,
    /// Server-side session summary (opaque)
    #[serde(default)]
    pub timestamp: serde_json::Value,
}

/// Echo of the user message the server accepted.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct UserMessageAck {
    pub content: String,
    #[serde(default)]
    pub session_id: Option<String>,
}

/// A fragment of the assistant reply.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct AiChunk {
    pub content: String,
    pub chunk_id: u64,
    #[serde(default)]
    pub is_final: bool,
    #[serde(default)]
    pub session_id: Option<String>,
}

/// The reply is complete; carries the full text and agent metadata.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct Completion {
    #[serde(default)]
    pub total_chunks: u64,
    #[serde(default)]
    pub message_count: u64,
    #[serde(default)]
    pub complete_response: String,
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub agent: Option<String>,
    #[serde(default)]
    pub transition_trigger: Option<String>,
    #[serde(default)]
    pub story_context: Option<String>,
}

/// Explicit error reported by the backend.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ServerError {
    #[serde(default)]
    pub error_type: String,
    pub error_message: String,
    #[serde(default)]
    pub recoverable: bool,
    #[serde(default)]
    pub session_id: Option<String>,
}

/// Result of decoding one `data` payload.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    /// Terminal sentinel
    Done,
    Frame(Frame),
    /// Well-formed JSON with a `type` this client does not know
    Unknown(String),
}

/// Decode one SSE `data` payload.
///
/// Malformed payloads produce a non-recoverable [`StreamErrorKind::Parse`] error.
pub fn parse_payload(data: &str) -> Result<Payload, StreamError> {
    let data = data.trim();
    if data == DONE_SENTINEL {
        return Ok(Payload::Done);
    }

    let value: serde_json::Value = serde_json::from_str(data)
        .map_err(|e| StreamError::parse(format!("Failed to parse SSE data: {}", e)))?;

    let frame_type = value
        .get("type")
        .and_then(|t| t.as_str())
        .ok_or_else(|| StreamError::parse("Failed to parse SSE data: missing frame type"))?;

    if !KNOWN_FRAME_TYPES.contains(&frame_type) {
        return Ok(Payload::Unknown(frame_type.to_string()));
    }

    let frame: Frame = serde_json::from_value(value)
        .map_err(|e| StreamError::parse(format!("Failed to parse SSE data: {}", e)))?;
    Ok(Payload::Frame(frame))
}

// ============================================
// Stream errors
// ============================================

/// Category of a stream failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StreamErrorKind {
    /// Channel could not open or died unexpectedly
    Connection,
    /// No response within the configured window
    Timeout,
    /// Malformed frame payload
    Parse,
    /// Explicit error frame from the backend
    Server,
}

impl StreamErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StreamErrorKind::Connection => "connection",
            StreamErrorKind::Timeout => "timeout",
            StreamErrorKind::Parse => "parse",
            StreamErrorKind::Server => "server",
        }
    }
}

impl std::fmt::Display for StreamErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An error surfaced by the stream transport.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{kind} error: {message}")]
pub struct StreamError {
    pub kind: StreamErrorKind,
    pub message: String,
    /// Eligible for automatic retry with backoff
    pub recoverable: bool,
}

impl StreamError {
    pub fn connection(message: impl Into<String>) -> Self {
        Self {
            kind: StreamErrorKind::Connection,
            message: message.into(),
            recoverable: true,
        }
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self {
            kind: StreamErrorKind::Timeout,
            message: message.into(),
            recoverable: true,
        }
    }

    pub fn parse(message: impl Into<String>) -> Self {
        Self {
            kind: StreamErrorKind::Parse,
            message: message.into(),
            recoverable: false,
        }
    }

    pub fn server(message: impl Into<String>, recoverable: bool) -> Self {
        Self {
            kind: StreamErrorKind::Server,
            message: message.into(),
            recoverable,
        }
    }
}

impl From<ServerError> for StreamError {
    fn from(err: ServerError) -> Self {
        StreamError::server(err.error_message, err.recoverable)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_done_sentinel() {
        assert_eq!(parse_payload("[DONE]").unwrap(), Payload::Done);
        assert_eq!(parse_payload(" [DONE] ").unwrap(), Payload::Done);
    }

    #[test]
    fn test_parse_ai_chunk() {
        let payload = parse_payload(
            r#"{"type":"ai_chunk","content":"Hi","chunk_id":0,"is_final":false,"session_id":"s1"}"#,
        )
        .unwrap();
        let Payload::Frame(Frame::AiChunk(chunk)) = payload else {
            panic!("expected ai_chunk, got {:?}", payload);
        };
        assert_eq!(chunk.content, "Hi");
        assert_eq!(chunk.chunk_id, 0);
        assert!(!chunk.is_final);
        assert_eq!(chunk.session_id.as_deref(), Some("s1"));
    }

    #[test]
    fn test_parse_completion_with_null_agent() {
        let payload = parse_payload(
            r#"{"type":"completion","session_id":"s1","total_chunks":2,"message_count":4,"complete_response":"Hi there","agent":null}"#,
        )
        .unwrap();
        let Payload::Frame(Frame::Completion(completion)) = payload else {
            panic!("expected completion, got {:?}", payload);
        };
        assert_eq!(completion.complete_response, "Hi there");
        assert_eq!(completion.total_chunks, 2);
        assert!(completion.agent.is_none());
        assert!(completion.transition_trigger.is_none());
    }

    #[test]
    fn test_parse_server_error() {
        let payload = parse_payload(
            r#"{"type":"error","error_type":"server","error_message":"busy","recoverable":true,"session_id":"unknown"}"#,
        )
        .unwrap();
        let Payload::Frame(Frame::Error(err)) = payload else {
            panic!("expected error frame, got {:?}", payload);
        };
        let stream_err = StreamError::from(err);
        assert_eq!(stream_err.kind, StreamErrorKind::Server);
        assert_eq!(stream_err.message, "busy");
        assert!(stream_err.recoverable);
    }

    #[test]
    fn test_parse_session_info_keeps_opaque_timestamp() {
        let payload = parse_payload(
            r#"{"type":"session_info","session_id":"s1","timestamp":{"active":true,"message_count":0}}"#,
        )
        .unwrap();
        let Payload::Frame(Frame::SessionInfo(info)) = payload else {
            panic!("expected session_info, got {:?}", payload);
        };
        assert_eq!(info.session_id, "s1");
        assert_eq!(info.timestamp["active"], serde_json::Value::Bool(true));
    }

    #[test]
    fn test_unknown_type_is_not_an_error() {
        let payload = parse_payload(r#"{"type":"heartbeat","n":1}"#).unwrap();
        assert_eq!(payload, Payload::Unknown("heartbeat".to_string()));
    }

    #[test]
    fn test_malformed_payloads_are_parse_errors() {
        for data in [
            "{not json",
            r#"{"content":"no type"}"#,
            r#"{"type":"ai_chunk","content":"missing chunk id"}"#,
        ] {
            let err = parse_payload(data).unwrap_err();
            assert_eq!(err.kind, StreamErrorKind::Parse, "payload: {}", data);
            assert!(!err.recoverable);
        }
    }

    #[test]
    fn test_error_kinds_default_recoverability() {
        assert!(StreamError::connection("x").recoverable);
        assert!(StreamError::timeout("x").recoverable);
        assert!(!StreamError::parse("x").recoverable);
        assert_eq!(
            StreamError::timeout("no response").to_string(),
            "timeout error: no response"
        );
    }
}
