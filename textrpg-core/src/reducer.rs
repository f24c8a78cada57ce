//! Stream reducer: folds transport events into the conversation store
//!
//! The reducer is a plain `&mut self` state machine. A driver loop feeds it
//! [`TransportEvent`]s and calls [`StreamReducer::poll_inactivity`] around the
//! deadline from [`StreamReducer::next_deadline`].
//!
//! A reply is finalized exactly once per stream generation, by whichever
//! arrives first:
//! - a `completion` frame
//! - the terminal sentinel (when text is still buffered)
//! - the inactivity timeout after the last chunk

use std::time::{Duration, Instant};

use crate::client::SessionApi;
use crate::error::{Error, Result};
use crate::store::ConversationStore;
use crate::stream::{AiChunk, Completion, Frame, StreamError, Transport, TransportEvent, TransportEventKind};
use crate::types::{AgentKind, ConnectionState, Message, TypingBuffer};

/// What turned the typing buffer into a history entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinalizeReason {
    Completion,
    StreamFinished,
    InactivityTimeout,
}

impl FinalizeReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            FinalizeReason::Completion => "completion",
            FinalizeReason::StreamFinished => "stream_finished",
            FinalizeReason::InactivityTimeout => "inactivity_timeout",
        }
    }
}

pub struct StreamReducer<T, S> {
    transport: T,
    api: S,
    store: ConversationStore,
    typing: TypingBuffer,
    /// Generation of the stream started by the last `send_message`
    generation: Option<u64>,
    /// The current generation's reply has been finalized
    finalized: bool,
    deadline: Option<Instant>,
    typing_timeout: Duration,
}

impl<T: Transport, S: SessionApi> StreamReducer<T, S> {
    pub fn new(transport: T, api: S, store: ConversationStore, typing_timeout: Duration) -> Self {
        Self {
            transport,
            api,
            store,
            typing: TypingBuffer::default(),
            generation: None,
            finalized: false,
            deadline: None,
            typing_timeout,
        }
    }

    pub fn store(&self) -> &ConversationStore {
        &self.store
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn typing(&self) -> &TypingBuffer {
        &self.typing
    }

    pub fn generation(&self) -> Option<u64> {
        self.generation
    }

    /// Pending inactivity deadline, if a reply is being typed.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.deadline
    }

    // ========== User intents ==========

    /// Append the user message and open a stream for it.
    ///
    /// Returns once the request is submitted; the reply arrives as events.
    pub fn send_message(&mut self, text: &str) -> Result<()> {
        let text = text.trim();
        if text.is_empty() {
            tracing::warn!("Empty message, skipping send");
            return Err(Error::EmptyMessage);
        }

        let session_id = self.store.session_id();

        self.typing = TypingBuffer::default();
        self.deadline = None;
        self.finalized = false;

        self.store.update(|state| {
            state
                .messages
                .push(Message::user(text, session_id.clone()));
            state.typing = TypingBuffer::default();
            state.error = None;
            state.loading = true;
        });

        let generation = self.transport.connect(text, session_id.as_deref());
        self.generation = Some(generation);

        let status = self.transport.status();
        self.store.update(|state| state.connection = status);

        tracing::info!(generation, ?session_id, "message sent");
        Ok(())
    }

    /// Request a fresh session from the backend and start an empty conversation.
    ///
    /// A reply still streaming for the old session is abandoned. On failure the
    /// error is surfaced and everything else is left untouched.
    pub async fn create_new_session(&mut self) -> Result<String> {
        match self.api.create_session().await {
            Ok(session_id) => {
                self.transport.disconnect();
                self.generation = None;
                self.finalized = false;
                self.typing = TypingBuffer::default();
                self.deadline = None;
                let status = self.transport.status();
                self.store.update(|state| {
                    state.clear_conversation();
                    state.session_id = Some(session_id.clone());
                    state.connection = status;
                    state.loading = false;
                });
                tracing::info!(%session_id, "new session");
                Ok(session_id)
            }
            Err(e) => {
                tracing::warn!(error = %e, "failed to create session");
                let message = e.to_string();
                self.store.update(|state| state.error = Some(message));
                Err(e)
            }
        }
    }

    /// Replace history and session id with the server's copy of `session_id`.
    pub async fn resume_session(&mut self, session_id: &str) -> Result<usize> {
        match self.api.fetch_session(session_id).await {
            Ok(history) => {
                let resumed_id = history.session_id.clone();
                let messages = history.into_messages();
                let count = messages.len();
                self.typing = TypingBuffer::default();
                self.deadline = None;
                self.store.update(|state| {
                    state.clear_conversation();
                    state.messages = messages;
                    state.session_id = Some(resumed_id);
                });
                tracing::info!(session_id, count, "resumed session");
                Ok(count)
            }
            Err(e) => {
                tracing::warn!(session_id, error = %e, "failed to resume session");
                let message = e.to_string();
                self.store.update(|state| state.error = Some(message));
                Err(e)
            }
        }
    }

    /// Probe the backend and record whether it is reachable.
    pub async fn check_backend(&mut self) -> bool {
        let reachable = match self.api.health_check().await {
            Ok(reachable) => reachable,
            Err(e) => {
                tracing::warn!(error = %e, "health check errored");
                false
            }
        };

        if reachable {
            tracing::info!("Backend is reachable");
        } else {
            tracing::warn!("Backend health check failed");
        }

        self.store.update(|state| {
            state.backend_reachable = Some(reachable);
            if reachable {
                state.error = None;
            } else {
                state.error = Some("Backend unreachable - is the server running?".to_string());
            }
        });
        reachable
    }

    /// Reset history, typing buffer, error text and transition trigger.
    ///
    /// The stream subscription, session id and current agent are kept.
    pub fn clear_chat(&mut self) {
        self.typing = TypingBuffer::default();
        self.deadline = None;
        self.store.update(|state| state.clear_conversation());
    }

    /// Tear down the transport and mirror its actual status. Never resends.
    pub fn reconnect(&mut self) {
        self.transport.disconnect();
        let status = self.transport.status();
        self.store.update(|state| {
            state.error = None;
            state.connection = status;
            state.loading = false;
        });
    }

    // ========== Transport events ==========

    pub fn handle_event(&mut self, event: TransportEvent) {
        if self.generation != Some(event.generation) {
            tracing::trace!(
                generation = event.generation,
                current = ?self.generation,
                "dropping event from stale stream"
            );
            return;
        }

        match event.kind {
            TransportEventKind::Status(status) => {
                self.store.update(|state| {
                    state.connection = status;
                    if status == ConnectionState::Connected {
                        state.error = None;
                    }
                });
            }
            TransportEventKind::Frame(Frame::AiChunk(chunk)) => self.apply_chunk(chunk),
            TransportEventKind::Frame(Frame::Completion(completion)) => {
                self.finalize(FinalizeReason::Completion, Some(&completion));
            }
            TransportEventKind::Frame(Frame::SessionInfo(info)) => {
                tracing::debug!(session_id = %info.session_id, "session info received");
            }
            TransportEventKind::Frame(Frame::UserMessage(ack)) => {
                tracing::debug!(len = ack.content.len(), "user message confirmed");
            }
            TransportEventKind::Frame(Frame::Error(err)) => self.apply_error(err.into()),
            TransportEventKind::StreamFinished => {
                self.store.update(|state| state.loading = false);
                self.finalize(FinalizeReason::StreamFinished, None);
            }
            TransportEventKind::Error(err) => self.apply_error(err),
            TransportEventKind::Notice(message) => {
                self.store.update(|state| state.messages.push(message));
            }
        }
    }

    /// Force-finalize if the inactivity deadline has passed.
    pub fn poll_inactivity(&mut self) -> bool {
        self.poll_inactivity_at(Instant::now())
    }

    /// A whitespace-only buffer is not finalized: the deadline is dropped and
    /// the stream may still deliver the reply.
    pub fn poll_inactivity_at(&mut self, now: Instant) -> bool {
        match self.deadline {
            Some(deadline) if now >= deadline && !self.typing.has_text() => {
                tracing::debug!(generation = ?self.generation, "typing timeout with blank buffer");
                self.deadline = None;
                false
            }
            Some(deadline) if now >= deadline => {
                tracing::info!(
                    generation = ?self.generation,
                    buffered = self.typing.accumulated_text.len(),
                    "no completion before typing timeout"
                );
                self.finalize(FinalizeReason::InactivityTimeout, None)
            }
            _ => false,
        }
    }

    fn apply_chunk(&mut self, chunk: AiChunk) {
        if self.finalized {
            tracing::debug!(chunk_id = chunk.chunk_id, "chunk after finalize ignored");
            return;
        }

        tracing::trace!(chunk_id = chunk.chunk_id, is_final = chunk.is_final, "chunk");
        self.typing.push(&chunk.content);
        self.deadline = Some(Instant::now() + self.typing_timeout);

        let typing = self.typing.clone();
        self.store.update(|state| state.typing = typing);
    }

    fn apply_error(&mut self, err: StreamError) {
        self.typing = TypingBuffer::default();
        self.deadline = None;
        self.store.update(|state| {
            state.typing = TypingBuffer::default();
            state.error = Some(err.message);
            state.loading = false;
        });
    }

    /// Turn the reply into a history entry. Returns false if already finalized.
    fn finalize(&mut self, reason: FinalizeReason, completion: Option<&Completion>) -> bool {
        if self.finalized {
            tracing::trace!(reason = reason.as_str(), "already finalized");
            return false;
        }
        self.finalized = true;
        self.deadline = None;

        let buffered = self.typing.take();
        let content = completion
            .map(|c| c.complete_response.as_str())
            .filter(|text| !text.trim().is_empty())
            .map(str::to_string)
            .unwrap_or(buffered);

        let session_update = completion.and_then(|c| c.session_id.clone());
        let agent_update = completion
            .and_then(|c| c.agent.as_deref())
            .and_then(|agent| {
                let kind = AgentKind::from_wire(agent);
                if kind.is_none() {
                    tracing::warn!(agent, "unknown agent in completion frame");
                }
                kind
            });
        let trigger_update = completion.and_then(|c| c.transition_trigger.clone());
        let context_update = completion.and_then(|c| c.story_context.clone());

        self.store.update(|state| {
            state.typing = TypingBuffer::default();
            state.loading = false;

            if let Some(session_id) = session_update {
                if state.session_id.as_deref() != Some(session_id.as_str()) {
                    tracing::info!(%session_id, "session id assigned by server");
                    state.session_id = Some(session_id);
                }
            }
            if let Some(agent) = agent_update {
                state.agent.current_agent = Some(agent);
            }
            if let Some(trigger) = trigger_update {
                state.agent.last_transition_trigger = Some(trigger);
            }
            if let Some(context) = context_update {
                state.agent.story_context = Some(context);
            }

            if !content.trim().is_empty() {
                state.messages.push(
                    Message::assistant(content, state.session_id.clone())
                        .with_extra("finalized_by", reason.as_str()),
                );
            }
        });

        true
    }
}
