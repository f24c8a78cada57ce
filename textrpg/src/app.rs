//! Application state and key handling for the TUI.

use crossterm::event::{KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use textrpg_core::ChatState;
use tokio::sync::watch;

/// Lines scrolled per PageUp/PageDown.
const PAGE_SIZE: usize = 10;

/// Something the user asked for that the reducer has to carry out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Intent {
    Send(String),
    NewSession,
    Clear,
    Reconnect,
}

/// Main application state
pub struct App {
    /// Latest snapshot of the conversation store
    pub state: ChatState,
    updates: watch::Receiver<ChatState>,
    /// Text being composed
    pub input: String,
    /// Lines scrolled up from the bottom of the message list (0 = follow)
    pub scroll_offset: usize,
    /// Backend the client talks to, shown in the header
    pub base_url: String,
    /// Whether the app should quit
    pub should_quit: bool,
}

impl App {
    pub fn new(updates: watch::Receiver<ChatState>, base_url: impl Into<String>) -> Self {
        let state = updates.borrow().clone();
        Self {
            state,
            updates,
            input: String::new(),
            scroll_offset: 0,
            base_url: base_url.into(),
            should_quit: false,
        }
    }

    /// Pull the latest store snapshot. Returns true if anything changed.
    pub fn refresh(&mut self) -> bool {
        match self.updates.has_changed() {
            Ok(true) => {
                let previous = self.state.messages.len();
                self.state = self.updates.borrow_and_update().clone();
                if self.state.messages.len() < previous {
                    self.scroll_offset = 0;
                }
                true
            }
            Ok(false) => false,
            Err(_) => {
                tracing::warn!("conversation store closed");
                self.should_quit = true;
                false
            }
        }
    }

    /// A reply is streaming in.
    pub fn is_streaming(&self) -> bool {
        self.state.loading || self.state.typing.active
    }

    pub fn handle_key(&mut self, key: KeyEvent) -> Option<Intent> {
        if key.kind != KeyEventKind::Press {
            return None;
        }

        if key.modifiers.contains(KeyModifiers::CONTROL) {
            return match key.code {
                KeyCode::Char('c') => {
                    self.should_quit = true;
                    None
                }
                KeyCode::Char('n') => Some(Intent::NewSession),
                KeyCode::Char('l') => {
                    self.scroll_offset = 0;
                    Some(Intent::Clear)
                }
                KeyCode::Char('r') => Some(Intent::Reconnect),
                _ => None,
            };
        }

        match key.code {
            KeyCode::Esc => {
                self.should_quit = true;
                None
            }
            KeyCode::Enter => {
                if self.input.trim().is_empty() {
                    return None;
                }
                self.scroll_offset = 0;
                Some(Intent::Send(std::mem::take(&mut self.input)))
            }
            KeyCode::Backspace => {
                self.input.pop();
                None
            }
            KeyCode::PageUp => {
                self.scroll_offset = self.scroll_offset.saturating_add(PAGE_SIZE);
                None
            }
            KeyCode::PageDown => {
                self.scroll_offset = self.scroll_offset.saturating_sub(PAGE_SIZE);
                None
            }
            KeyCode::End => {
                self.scroll_offset = 0;
                None
            }
            KeyCode::Char(c) => {
                self.input.push(c);
                None
            }
            _ => None,
        }
    }
}
