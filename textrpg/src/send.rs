//! textrpg-send - send one message to the TextRPG backend and print the reply
//!
//! Runs the same transport and reducer as the TUI, without a terminal UI.
//! The finalized reply goes to stdout and the session id to stderr, so the
//! output can be piped.

mod options;

use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};
use clap::Parser;
use textrpg_core::{
    BackendClient, ConnectionState, ConversationStore, HttpTransport, Role, StreamReducer,
};

use crate::options::ConnectionArgs;

#[derive(Parser)]
#[command(name = "textrpg-send")]
#[command(about = "Send one message to the TextRPG backend and print the reply")]
#[command(version)]
struct Args {
    #[command(flatten)]
    connection: ConnectionArgs,

    /// Message to send
    message: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = args.connection.load_config()?;

    let _log_guard =
        textrpg_core::logging::init(&config.logging).context("failed to initialize logging")?;

    tracing::info!(base_url = %config.backend.base_url, "textrpg-send starting");

    let transport = HttpTransport::new(&config.backend.base_url, config.stream.clone())
        .context("failed to create stream transport")?;
    let mut events = transport.subscribe();
    let api = BackendClient::new(&config.backend).context("failed to create backend client")?;
    let mut reducer = StreamReducer::new(
        transport,
        api,
        ConversationStore::new(),
        config.stream.typing_timeout(),
    );

    if let Some(session_id) = &args.connection.session {
        reducer
            .resume_session(session_id)
            .await
            .with_context(|| format!("failed to resume session {}", session_id))?;
    }

    let sent_at = reducer.store().message_count();
    reducer.send_message(&args.message)?;

    // Loading stays set until the reply is finalized or the stream fails
    while reducer.store().snapshot().loading {
        let wait = reducer
            .next_deadline()
            .map(|deadline| deadline.saturating_duration_since(Instant::now()))
            .unwrap_or(Duration::from_secs(1));

        match tokio::time::timeout(wait, events.recv()).await {
            Ok(Some(event)) => reducer.handle_event(event),
            Ok(None) => break,
            Err(_) => {
                reducer.poll_inactivity();
            }
        }

        // Body closed without a terminal sentinel and nothing left to flush
        let state = reducer.store().snapshot();
        if state.connection == ConnectionState::Disconnected && !state.typing.active {
            break;
        }
    }

    let state = reducer.store().snapshot();
    if let Some(session_id) = &state.session_id {
        eprintln!("session: {}", session_id);
    }
    if let Some(error) = state.error {
        bail!("{}", error);
    }

    for message in state.messages.iter().skip(sent_at) {
        if message.role == Role::Assistant {
            println!("{}", message.content);
        }
    }

    Ok(())
}
