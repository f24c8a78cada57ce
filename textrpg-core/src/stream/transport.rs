//! Stream transport: one SSE subscription per user message
//!
//! [`HttpTransport`] opens `GET {base_url}/chat/stream?message=..&session_id=..`,
//! decodes frames and broadcasts [`TransportEvent`]s to every subscriber.
//!
//! Each `connect` starts a new *generation*. Work belonging to an older
//! generation (stream readers, timers, backoff probes) is aborted, and every
//! emit re-checks the generation under the lock, so a superseded request can
//! never leak events into the next one.

use std::ops::ControlFlow;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures_util::StreamExt;
use reqwest::header::{HeaderValue, ACCEPT};
use tokio::sync::mpsc;
use tokio::task::AbortHandle;

use crate::config::StreamConfig;
use crate::error::{Error, Result};
use crate::types::{ConnectionState, Message};

use super::frame::{parse_payload, Frame, Payload, StreamError};
use super::sse::SseDecoder;

/// The seam between the reducer and the network.
pub trait Transport {
    /// Close any live subscription and open a new one for `message`.
    ///
    /// Returns the generation that events of the new subscription carry.
    fn connect(&mut self, message: &str, session_id: Option<&str>) -> u64;

    /// Close the live subscription, if any. Idempotent.
    fn disconnect(&mut self);

    /// Current connection status.
    fn status(&self) -> ConnectionState;
}

/// Something the transport observed, tagged with the generation it belongs to.
#[derive(Debug, Clone, PartialEq)]
pub struct TransportEvent {
    pub generation: u64,
    pub kind: TransportEventKind,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TransportEventKind {
    /// Connection status changed
    Status(ConnectionState),
    /// A decoded frame (server errors arrive as [`TransportEventKind::Error`] instead)
    Frame(Frame),
    /// The terminal sentinel arrived and the channel was closed
    StreamFinished,
    /// A stream failure
    Error(StreamError),
    /// A message for the conversation history, appended verbatim
    Notice(Message),
}

/// Production transport over reqwest.
///
/// Must be used from within a Tokio runtime: `connect` spawns the stream reader.
pub struct HttpTransport {
    inner: Arc<Inner>,
}

struct Inner {
    config: StreamConfig,
    base_url: String,
    http_client: reqwest::Client,
    state: Mutex<Shared>,
}

#[derive(Default)]
struct Shared {
    generation: u64,
    status: ConnectionState,
    reconnect_attempts: u32,
    subscribers: Vec<mpsc::UnboundedSender<TransportEvent>>,
    tasks: Vec<AbortHandle>,
}

impl Shared {
    fn broadcast(&mut self, kind: TransportEventKind) {
        let event = TransportEvent {
            generation: self.generation,
            kind,
        };
        // Receivers that were dropped are pruned here.
        self.subscribers
            .retain(|subscriber| subscriber.send(event.clone()).is_ok());
    }

    fn set_status(&mut self, status: ConnectionState) {
        if self.status != status {
            tracing::debug!(generation = self.generation, %status, "connection status");
            self.status = status;
            self.broadcast(TransportEventKind::Status(status));
        }
    }

    fn abort_tasks(&mut self) {
        for task in self.tasks.drain(..) {
            task.abort();
        }
    }
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, Shared> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl HttpTransport {
    /// Create a transport for the backend at `base_url`.
    pub fn new(base_url: &str, config: StreamConfig) -> Result<Self> {
        config.validate()?;
        reqwest::Url::parse(base_url)
            .map_err(|e| Error::Config(format!("invalid base url {:?}: {}", base_url, e)))?;

        let http_client = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout())
            .build()
            .map_err(|e| Error::Config(format!("failed to create HTTP client: {}", e)))?;

        Ok(Self {
            inner: Arc::new(Inner {
                config,
                base_url: base_url.trim_end_matches('/').to_string(),
                http_client,
                state: Mutex::new(Shared::default()),
            }),
        })
    }

    /// Register an observer. Dropping the receiver unsubscribes it.
    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<TransportEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.inner.lock().subscribers.push(tx);
        rx
    }

    /// Generation of the live (or most recent) subscription.
    pub fn generation(&self) -> u64 {
        self.inner.lock().generation
    }

    /// Automatic reconnect attempts consumed since the last successful open.
    pub fn reconnect_attempts(&self) -> u32 {
        self.inner.lock().reconnect_attempts
    }
}

impl Transport for HttpTransport {
    fn connect(&mut self, message: &str, session_id: Option<&str>) -> u64 {
        let generation = {
            let mut shared = self.inner.lock();
            shared.abort_tasks();
            shared.generation += 1;
            shared.reconnect_attempts = 0;
            // Forced transition: a new request always starts from `connecting`.
            shared.status = ConnectionState::Connecting;
            shared.broadcast(TransportEventKind::Status(ConnectionState::Connecting));
            shared.generation
        };

        tracing::info!(generation, ?session_id, "opening chat stream");

        let emitter = Emitter {
            inner: Arc::clone(&self.inner),
            generation,
        };

        let reader = tokio::spawn(run_stream(
            emitter.clone(),
            message.to_string(),
            session_id.map(str::to_string),
        ));
        let timer = tokio::spawn(connect_timeout(emitter));

        let mut shared = self.inner.lock();
        if shared.generation == generation {
            shared.tasks.push(reader.abort_handle());
            shared.tasks.push(timer.abort_handle());
        } else {
            reader.abort();
            timer.abort();
        }

        generation
    }

    fn disconnect(&mut self) {
        let mut shared = self.inner.lock();
        shared.abort_tasks();
        shared.generation += 1;
        shared.reconnect_attempts = 0;
        shared.set_status(ConnectionState::Disconnected);
    }

    fn status(&self) -> ConnectionState {
        self.inner.lock().status
    }
}

impl Drop for HttpTransport {
    fn drop(&mut self) {
        self.inner.lock().abort_tasks();
    }
}

/// Handle held by background tasks; mute once its generation is superseded.
#[derive(Clone)]
struct Emitter {
    inner: Arc<Inner>,
    generation: u64,
}

impl Emitter {
    /// Lock the shared state if this generation is still live.
    fn live(&self) -> Option<MutexGuard<'_, Shared>> {
        let shared = self.inner.lock();
        (shared.generation == self.generation).then_some(shared)
    }

    fn emit(&self, kind: TransportEventKind) {
        if let Some(mut shared) = self.live() {
            shared.broadcast(kind);
        }
    }

    fn set_status(&self, status: ConnectionState) {
        if let Some(mut shared) = self.live() {
            shared.set_status(status);
        }
    }

    fn status(&self) -> Option<ConnectionState> {
        self.live().map(|shared| shared.status)
    }

    /// Still waiting for the first response; reconnect probes do not count.
    fn awaiting_open(&self) -> bool {
        self.live().is_some_and(|shared| {
            shared.status == ConnectionState::Connecting && shared.reconnect_attempts == 0
        })
    }

    /// The server accepted the stream request.
    fn opened(&self) {
        if let Some(mut shared) = self.live() {
            shared.reconnect_attempts = 0;
            shared.set_status(ConnectionState::Connected);
        }
    }

    /// Report an error and decide whether to schedule a reconnect probe.
    fn fail(&self, error: StreamError) {
        let Some(mut shared) = self.live() else {
            return;
        };

        tracing::warn!(
            generation = self.generation,
            kind = %error.kind,
            recoverable = error.recoverable,
            "stream error: {}",
            error.message
        );

        shared.set_status(ConnectionState::Error);
        shared.broadcast(TransportEventKind::Error(error.clone()));

        let max_attempts = self.inner.config.max_reconnect_attempts;
        if error.recoverable && shared.reconnect_attempts < max_attempts {
            shared.reconnect_attempts += 1;
            let attempt = shared.reconnect_attempts;
            let delay = self.inner.config.backoff_delay(attempt);
            tracing::info!(attempt, max_attempts, ?delay, "scheduling reconnect probe");
            let probe = tokio::spawn(reconnect_probe(self.clone(), attempt, delay));
            shared.tasks.push(probe.abort_handle());
        } else {
            if error.recoverable {
                tracing::warn!(max_attempts, "reconnect attempts exhausted");
            }
            shared.set_status(ConnectionState::Disconnected);
        }
    }
}

async fn run_stream(emitter: Emitter, message: String, session_id: Option<String>) {
    let mut params = vec![("message", message.as_str())];
    if let Some(session_id) = session_id.as_deref() {
        params.push(("session_id", session_id));
    }

    let url = format!("{}/chat/stream", emitter.inner.base_url);
    let url = match reqwest::Url::parse_with_params(&url, &params) {
        Ok(url) => url,
        Err(e) => {
            emitter.fail(StreamError::connection(format!(
                "Failed to connect: invalid stream URL: {}",
                e
            )));
            return;
        }
    };

    let response = match emitter
        .inner
        .http_client
        .get(url)
        .header(ACCEPT, HeaderValue::from_static("text/event-stream"))
        .send()
        .await
    {
        Ok(response) => response,
        Err(e) => {
            emitter.fail(StreamError::connection(format!("Failed to connect: {}", e)));
            return;
        }
    };

    let status = response.status();
    if !status.is_success() {
        emitter.fail(StreamError {
            recoverable: status.is_server_error(),
            ..StreamError::connection(format!("Stream request failed ({})", status))
        });
        return;
    }

    emitter.opened();

    let mut decoder = SseDecoder::new();
    let mut body = response.bytes_stream();

    while let Some(chunk) = body.next().await {
        let bytes = match chunk {
            Ok(bytes) => bytes,
            Err(e) => {
                emitter.fail(StreamError::connection(format!(
                    "SSE connection error occurred: {}",
                    e
                )));
                return;
            }
        };

        for data in decoder.push(&bytes) {
            if dispatch(&emitter, &data).is_break() {
                return;
            }
        }
    }

    if let Some(data) = decoder.finish() {
        if dispatch(&emitter, &data).is_break() {
            return;
        }
    }

    tracing::debug!(generation = emitter.generation, "stream closed by server");
    emitter.set_status(ConnectionState::Disconnected);
}

/// Handle one decoded payload; `Break` once the stream is finished.
fn dispatch(emitter: &Emitter, data: &str) -> ControlFlow<()> {
    match parse_payload(data) {
        Ok(Payload::Done) => {
            tracing::debug!(generation = emitter.generation, "stream completed");
            emitter.set_status(ConnectionState::Disconnected);
            emitter.emit(TransportEventKind::StreamFinished);
            ControlFlow::Break(())
        }
        Ok(Payload::Frame(Frame::Error(err))) => {
            emitter.fail(err.into());
            ControlFlow::Continue(())
        }
        Ok(Payload::Frame(frame)) => {
            tracing::trace!(generation = emitter.generation, frame = frame.type_name(), "frame");
            emitter.emit(TransportEventKind::Frame(frame));
            ControlFlow::Continue(())
        }
        Ok(Payload::Unknown(frame_type)) => {
            tracing::warn!(frame_type = %frame_type, "ignoring unknown frame type");
            ControlFlow::Continue(())
        }
        Err(err) => {
            // The server is expected to close the channel itself.
            emitter.fail(err);
            ControlFlow::Continue(())
        }
    }
}

async fn connect_timeout(emitter: Emitter) {
    let timeout = emitter.inner.config.connect_timeout();
    tokio::time::sleep(timeout).await;

    if emitter.awaiting_open() {
        emitter.fail(StreamError::timeout(
            "Connection timeout - no response from server",
        ));
    }
}

/// After the backoff, check whether the backend is reachable again.
///
/// The user message is not resubmitted; on success the transport becomes
/// ready for the caller to send again.
async fn reconnect_probe(emitter: Emitter, attempt: u32, delay: std::time::Duration) {
    tokio::time::sleep(delay).await;

    if emitter.status() != Some(ConnectionState::Error) {
        return;
    }

    emitter.set_status(ConnectionState::Connecting);
    tracing::info!(generation = emitter.generation, attempt, "probing backend health");

    let url = format!("{}/health", emitter.inner.base_url);
    let probe = emitter
        .inner
        .http_client
        .get(&url)
        .timeout(emitter.inner.config.connect_timeout())
        .send()
        .await;

    match probe {
        Ok(response) if response.status().is_success() => {
            emitter.emit(TransportEventKind::Notice(
                Message::system("Connection restored. Send your message again to retry.")
                    .with_extra("reconnect_attempt", attempt),
            ));
            emitter.set_status(ConnectionState::Disconnected);
        }
        Ok(response) => {
            emitter.fail(StreamError::connection(format!(
                "Reconnect attempt {} failed: backend answered {}",
                attempt,
                response.status()
            )));
        }
        Err(e) => {
            emitter.fail(StreamError::connection(format!(
                "Reconnect attempt {} failed: {}",
                attempt, e
            )));
        }
    }
}
