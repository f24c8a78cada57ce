//! Streaming chat transport
//!
//! - [`frame`]: wire frames carried in SSE `data` payloads
//! - [`sse`]: incremental SSE decoder
//! - [`transport`]: the [`Transport`] seam and its reqwest implementation

pub mod frame;
pub mod sse;
pub mod transport;

pub use frame::{
    parse_payload, AiChunk, Completion, Frame, Payload, ServerError, SessionInfo, StreamError,
    StreamErrorKind, UserMessageAck, DONE_SENTINEL,
};
pub use sse::SseDecoder;
pub use transport::{HttpTransport, Transport, TransportEvent, TransportEventKind};
