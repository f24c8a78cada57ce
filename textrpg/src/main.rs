//! textrpg - terminal client for the TextRPG game master
//!
//! Streams the game master's replies into a chat view as they are generated.
//!
//! Uses XDG Base Directory specification for file locations:
//! - Logs: $XDG_STATE_HOME/textrpg/textrpg.YYYY-MM-DD.log (~/.local/state/textrpg/)
//! - Config: $XDG_CONFIG_HOME/textrpg/config.toml (~/.config/textrpg/config.toml)

mod app;
mod options;
mod ui;

use std::io;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use clap::Parser;
use crossterm::{
    event::{self, Event},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{backend::CrosstermBackend, Terminal};
use textrpg_core::{
    BackendClient, ConversationStore, HttpTransport, StreamReducer, TransportEvent,
};
use tokio::runtime::Runtime;
use tokio::sync::mpsc::UnboundedReceiver;

use crate::app::{App, Intent};
use crate::options::ConnectionArgs;

type Reducer = StreamReducer<HttpTransport, BackendClient>;

#[derive(Parser)]
#[command(name = "textrpg")]
#[command(about = "Terminal chat client for the TextRPG game master")]
#[command(version)]
struct Args {
    #[command(flatten)]
    connection: ConnectionArgs,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let config = args.connection.load_config()?;

    // Initialize logging (to file, not stdout since we have a TUI)
    let _log_guard =
        textrpg_core::logging::init(&config.logging).context("failed to initialize logging")?;

    tracing::info!(base_url = %config.backend.base_url, "textrpg starting up");

    // The transport spawns its stream tasks onto this runtime
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to create tokio runtime")?;
    let _enter = runtime.enter();

    let transport = HttpTransport::new(&config.backend.base_url, config.stream.clone())
        .context("failed to create stream transport")?;
    let mut events = transport.subscribe();
    let api = BackendClient::new(&config.backend).context("failed to create backend client")?;
    let store = ConversationStore::new();
    let mut reducer = StreamReducer::new(
        transport,
        api,
        store.clone(),
        config.stream.typing_timeout(),
    );

    runtime.block_on(reducer.check_backend());
    if let Some(session_id) = &args.connection.session {
        if let Err(e) = runtime.block_on(reducer.resume_session(session_id)) {
            tracing::warn!(session_id, error = %e, "could not resume session, starting fresh");
        }
    }

    let mut app = App::new(store.subscribe(), config.backend.trimmed_base_url());

    // Setup terminal
    enable_raw_mode().context("failed to enable raw mode")?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen).context("failed to enter alternate screen")?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend).context("failed to create terminal")?;

    // Run the main loop
    let result = run_app(
        &mut terminal,
        &mut app,
        &mut reducer,
        &mut events,
        &runtime,
        config.stream.chunk_delay(),
    );

    // Restore terminal
    disable_raw_mode().context("failed to disable raw mode")?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)
        .context("failed to leave alternate screen")?;
    terminal.show_cursor().context("failed to show cursor")?;

    tracing::info!("textrpg shutting down");

    result
}

/// Run the main application loop.
///
/// Each tick drains transport events into the reducer, checks the inactivity
/// deadline, redraws, and waits up to `chunk_delay` for a key press.
fn run_app(
    terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    app: &mut App,
    reducer: &mut Reducer,
    events: &mut UnboundedReceiver<TransportEvent>,
    runtime: &Runtime,
    chunk_delay: Duration,
) -> Result<()> {
    let idle_poll = Duration::from_millis(250);
    let mut dirty = true;

    loop {
        while let Ok(event) = events.try_recv() {
            reducer.handle_event(event);
        }
        reducer.poll_inactivity();

        if app.refresh() {
            dirty = true;
        }

        if dirty {
            terminal.draw(|frame| ui::render(frame, app))?;
            dirty = false;
        }

        // Poll fast while a reply streams in, slowly otherwise
        let mut wait = if app.is_streaming() { chunk_delay } else { idle_poll };
        if let Some(deadline) = reducer.next_deadline() {
            wait = wait.min(deadline.saturating_duration_since(Instant::now()));
        }

        if event::poll(wait)? {
            match event::read()? {
                Event::Key(key) => {
                    if let Some(intent) = app.handle_key(key) {
                        apply_intent(reducer, runtime, intent);
                    }
                    dirty = true;
                }
                Event::Resize(_, _) => dirty = true,
                _ => {}
            }
        }

        // Check if we should quit
        if app.should_quit {
            break;
        }
    }

    Ok(())
}

/// Hand a user intent to the reducer. Failures end up in the store's error text.
fn apply_intent(reducer: &mut Reducer, runtime: &Runtime, intent: Intent) {
    match intent {
        Intent::Send(text) => {
            if let Err(e) = reducer.send_message(&text) {
                tracing::warn!(error = %e, "message not sent");
            }
        }
        Intent::NewSession => {
            if let Err(e) = runtime.block_on(reducer.create_new_session()) {
                tracing::warn!(error = %e, "new session not created");
            }
        }
        Intent::Clear => reducer.clear_chat(),
        Intent::Reconnect => {
            reducer.reconnect();
            runtime.block_on(reducer.check_backend());
        }
    }
}
