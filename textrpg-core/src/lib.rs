//! # textrpg-core
//!
//! Core library for textrpg - a terminal client for a streaming text adventure backend.
//!
//! This library provides:
//! - Domain types for messages, agents and connection state
//! - The SSE stream transport and wire frames
//! - The stream reducer and observable conversation store
//! - Configuration management
//! - Logging infrastructure
//!
//! ## Architecture
//!
//! Data flows in one direction:
//! - **Transport:** [`HttpTransport`] opens `/chat/stream` and emits generation-tagged events
//! - **Reducer:** [`StreamReducer`] folds events into state and decides when a reply is final
//! - **Store:** [`ConversationStore`] publishes snapshots to the presentation layer
//!
//! ## Example
//!
//! ```rust,no_run
//! use textrpg_core::{BackendClient, Config, ConversationStore, HttpTransport, StreamReducer};
//!
//! # async fn run() -> textrpg_core::Result<()> {
//! let config = Config::load()?;
//! let transport = HttpTransport::new(&config.backend.base_url, config.stream.clone())?;
//! let mut events = transport.subscribe();
//! let api = BackendClient::new(&config.backend)?;
//!
//! let mut reducer = StreamReducer::new(
//!     transport,
//!     api,
//!     ConversationStore::new(),
//!     config.stream.typing_timeout(),
//! );
//! reducer.send_message("Hello")?;
//!
//! while let Some(event) = events.recv().await {
//!     reducer.handle_event(event);
//!     if !reducer.store().snapshot().loading {
//!         break;
//!     }
//! }
//! # Ok(())
//! # }
//! ```

// Re-export commonly used items at the crate root
pub use client::{BackendClient, SessionApi, SessionHistory};
pub use config::Config;
pub use error::{Error, Result};
pub use reducer::{FinalizeReason, StreamReducer};
pub use store::{ChatState, ConversationStore};
pub use stream::{HttpTransport, StreamError, StreamErrorKind, Transport, TransportEvent};
pub use types::*;

// Public modules
pub mod client;
pub mod config;
pub mod error;
pub mod logging;
pub mod reducer;
pub mod store;
pub mod stream;
pub mod types;
