//! UI rendering for the TUI.

use chrono::Local;
use ratatui::{
    layout::{Constraint, Layout, Rect},
    style::{Color, Style, Stylize},
    text::{Line, Span},
    widgets::{Block, BorderType, Borders, Paragraph, Scrollbar, ScrollbarOrientation, ScrollbarState},
    Frame,
};
use textrpg_core::{AgentKind, ConnectionState, Message, Role};

use crate::app::App;

// ========== Colors ==========

/// Border color for the story panel
const BORDER_STORY: Color = Color::Rgb(0, 150, 150);
/// Border color for the input box
const BORDER_INPUT: Color = Color::Rgb(100, 100, 180);
/// Setup agent badge color
const BADGE_SETUP: Color = Color::Rgb(220, 180, 0);
/// Gameplay agent badge color
const BADGE_GAMEPLAY: Color = Color::Rgb(180, 100, 220);
/// Dim gray for secondary text
const DIM: Color = Color::Rgb(128, 128, 128);

/// Render the whole screen.
pub fn render(frame: &mut Frame, app: &App) {
    let [header, story, error, input, footer] = Layout::vertical([
        Constraint::Length(1),
        Constraint::Min(3),
        Constraint::Length(1),
        Constraint::Length(3),
        Constraint::Length(1),
    ])
    .areas(frame.area());

    render_header(frame, app, header);
    render_story(frame, app, story);
    render_error(frame, app, error);
    render_input(frame, app, input);
    render_footer(frame, footer);
}

fn connection_style(state: ConnectionState) -> Style {
    match state {
        ConnectionState::Connected => Style::default().fg(Color::Green).bold(),
        ConnectionState::Connecting => Style::default().fg(Color::Yellow).bold(),
        ConnectionState::Disconnected => Style::default().fg(DIM),
        ConnectionState::Error => Style::default().fg(Color::Red).bold(),
    }
}

fn agent_style(agent: Option<AgentKind>) -> Style {
    match agent {
        Some(AgentKind::Setup) => Style::default().fg(BADGE_SETUP).bold(),
        Some(AgentKind::Gameplay) => Style::default().fg(BADGE_GAMEPLAY).bold(),
        Some(AgentKind::None) | None => Style::default().fg(DIM),
    }
}

fn render_header(frame: &mut Frame, app: &App, area: Rect) {
    let state = &app.state;
    let separator = Span::styled("  │  ", Style::default().fg(Color::DarkGray));

    let agent_label = state
        .agent
        .current_agent
        .map(|agent| agent.label())
        .unwrap_or("No agent");

    let backend = match state.backend_reachable {
        Some(true) => Span::styled(app.base_url.clone(), Style::default().fg(DIM)),
        Some(false) => Span::styled(
            format!("{} (unreachable)", app.base_url),
            Style::default().fg(Color::Red),
        ),
        None => Span::styled(app.base_url.clone(), Style::default().fg(DIM)),
    };

    let mut spans = vec![
        Span::styled(" TextRPG ", Style::default().fg(Color::Black).bg(BORDER_STORY).bold()),
        Span::raw(" "),
        Span::styled(
            format!("● {}", state.connection),
            connection_style(state.connection),
        ),
        separator.clone(),
        Span::styled(agent_label, agent_style(state.agent.current_agent)),
        separator.clone(),
        Span::styled(
            format!(
                "session {}",
                state.session_id.as_deref().map(short_id).unwrap_or("(new)")
            ),
            Style::default().fg(DIM),
        ),
        separator,
        backend,
    ];

    if let Some(trigger) = &state.agent.last_transition_trigger {
        spans.push(Span::styled(
            format!("  [{}]", trigger),
            Style::default().fg(BADGE_SETUP),
        ));
    }

    frame.render_widget(Paragraph::new(Line::from(spans)), area);
}

fn render_story(frame: &mut Frame, app: &App, area: Rect) {
    let state = &app.state;
    let width = area.width.saturating_sub(4).max(10) as usize;
    let visible_height = area.height.saturating_sub(2) as usize;

    let mut lines: Vec<Line> = Vec::new();

    if let Some(context) = &state.agent.story_context {
        for text in wrap_text(context, width) {
            lines.push(Line::styled(text, Style::default().fg(DIM).italic()));
        }
        lines.push(Line::raw(""));
    }

    for message in &state.messages {
        lines.extend(format_message(message, width));
        lines.push(Line::raw(""));
    }

    // Reply in progress
    if state.typing.active {
        lines.push(Line::from(vec![
            Span::styled("Game Master", Style::default().fg(Color::Green).bold()),
            Span::styled(" typing...", Style::default().fg(DIM).italic()),
        ]));
        let mut body = wrap_text(&state.typing.accumulated_text, width);
        if let Some(last) = body.last_mut() {
            last.push('▌');
        }
        for text in body {
            lines.push(Line::raw(format!("  {}", text)));
        }
    } else if state.loading {
        lines.push(Line::styled(
            "Game Master is thinking...",
            Style::default().fg(DIM).italic(),
        ));
    }

    if lines.is_empty() {
        lines.push(Line::styled(
            "Type a message and press Enter to begin your adventure.",
            Style::default().fg(DIM),
        ));
    }

    let total = lines.len();
    let max_offset = total.saturating_sub(visible_height);
    let offset = app.scroll_offset.min(max_offset);
    let top = max_offset - offset;

    let paragraph = Paragraph::new(lines)
        .scroll((top.min(u16::MAX as usize) as u16, 0))
        .block(
            Block::default()
                .borders(Borders::ALL)
                .border_type(BorderType::Rounded)
                .border_style(Style::default().fg(BORDER_STORY))
                .title(" Story ")
                .title_style(Style::default().fg(BORDER_STORY).bold()),
        );
    frame.render_widget(paragraph, area);

    if total > visible_height {
        let scrollbar = Scrollbar::new(ScrollbarOrientation::VerticalRight)
            .begin_symbol(None)
            .end_symbol(None);
        let mut scrollbar_state = ScrollbarState::new(max_offset).position(top);
        frame.render_stateful_widget(
            scrollbar,
            area.inner(ratatui::layout::Margin {
                vertical: 1,
                horizontal: 0,
            }),
            &mut scrollbar_state,
        );
    }
}

/// Format one finalized message: a header line and its indented body.
fn format_message(message: &Message, width: usize) -> Vec<Line<'static>> {
    let (label, style) = match message.role {
        Role::User => ("You", Style::default().fg(Color::Cyan).bold()),
        Role::Assistant => ("Game Master", Style::default().fg(Color::Green).bold()),
        Role::System => ("System", Style::default().fg(Color::Yellow)),
    };
    let time = message
        .created_at
        .with_timezone(&Local)
        .format("%H:%M")
        .to_string();

    let mut lines = vec![Line::from(vec![
        Span::styled(label, style),
        Span::raw(" "),
        Span::styled(time, Style::default().fg(DIM)),
    ])];

    let body_style = match message.role {
        Role::System => Style::default().fg(DIM),
        _ => Style::default(),
    };
    for text in wrap_text(&message.content, width.saturating_sub(2)) {
        lines.push(Line::styled(format!("  {}", text), body_style));
    }
    lines
}

fn render_error(frame: &mut Frame, app: &App, area: Rect) {
    let line = match &app.state.error {
        Some(error) => Line::styled(
            format!(" ⚠ {}", error),
            Style::default().fg(Color::Red),
        ),
        None => Line::raw(""),
    };
    frame.render_widget(Paragraph::new(line), area);
}

fn render_input(frame: &mut Frame, app: &App, area: Rect) {
    let title = if app.is_streaming() {
        " Your move (reply streaming) "
    } else {
        " Your move "
    };

    // Keep the tail of long input visible
    let inner_width = area.width.saturating_sub(2) as usize;
    let chars = app.input.chars().count();
    let visible: String = app
        .input
        .chars()
        .skip(chars.saturating_sub(inner_width.saturating_sub(1)))
        .collect();

    let input = Paragraph::new(visible.clone()).block(
        Block::default()
            .borders(Borders::ALL)
            .border_type(BorderType::Rounded)
            .border_style(Style::default().fg(BORDER_INPUT))
            .title(title),
    );
    frame.render_widget(input, area);

    let cursor_x = area.x + 1 + visible.chars().count() as u16;
    frame.set_cursor_position((cursor_x, area.y + 1));
}

fn render_footer(frame: &mut Frame, area: Rect) {
    let key_style = Style::default().fg(Color::Cyan).bold();
    let label_style = Style::default().fg(Color::DarkGray);
    let separator = Span::styled("  │  ", Style::default().fg(Color::DarkGray));

    let footer = Paragraph::new(Line::from(vec![
        Span::raw(" "),
        Span::styled("[Enter]", key_style),
        Span::styled(" Send", label_style),
        separator.clone(),
        Span::styled("[^N]", key_style),
        Span::styled(" New session", label_style),
        separator.clone(),
        Span::styled("[^L]", key_style),
        Span::styled(" Clear", label_style),
        separator.clone(),
        Span::styled("[^R]", key_style),
        Span::styled(" Reconnect", label_style),
        separator.clone(),
        Span::styled("[PgUp/PgDn]", key_style),
        Span::styled(" Scroll", label_style),
        separator,
        Span::styled("[Esc]", key_style),
        Span::styled(" Quit", label_style),
    ]));

    frame.render_widget(footer, area);
}

/// First eight characters of a session id.
fn short_id(id: &str) -> &str {
    match id.char_indices().nth(8) {
        Some((end, _)) => &id[..end],
        None => id,
    }
}

/// Greedy word wrap by character count. Blank lines are kept.
fn wrap_text(text: &str, width: usize) -> Vec<String> {
    let width = width.max(1);
    let mut lines = Vec::new();

    for paragraph in text.split('\n') {
        let mut current = String::new();
        let mut current_len = 0;

        for word in paragraph.split_whitespace() {
            let mut word: Vec<char> = word.chars().collect();

            // Break words longer than a line
            while word.len() > width {
                if current_len > 0 {
                    lines.push(std::mem::take(&mut current));
                    current_len = 0;
                }
                let rest = word.split_off(width);
                lines.push(word.into_iter().collect());
                word = rest;
            }

            let needed = if current_len == 0 { word.len() } else { word.len() + 1 };
            if current_len + needed > width {
                lines.push(std::mem::take(&mut current));
                current_len = 0;
            }
            if current_len > 0 {
                current.push(' ');
                current_len += 1;
            }
            current_len += word.len();
            current.extend(word);
        }

        lines.push(current);
    }

    lines
}

#[cfg(test)]
mod tests {
    use super::*;
    use ratatui::{backend::TestBackend, Terminal};
    use textrpg_core::ConversationStore;

    #[test]
    fn test_wrap_text() {
        assert_eq!(wrap_text("the quick brown fox", 9), vec!["the quick", "brown fox"]);
        assert_eq!(wrap_text("a\n\nb", 10), vec!["a", "", "b"]);
        assert_eq!(wrap_text("abcdefghij", 4), vec!["abcd", "efgh", "ij"]);
        assert_eq!(wrap_text("", 10), vec![""]);
    }

    #[test]
    fn test_short_id() {
        assert_eq!(short_id("0123456789abcdef"), "01234567");
        assert_eq!(short_id("s1"), "s1");
    }

    #[test]
    fn test_render_smoke() {
        let store = ConversationStore::new();
        let mut app = App::new(store.subscribe(), "http://localhost:8000");
        app.state.messages.push(Message::user("Hello", None));
        app.state.messages.push(Message::assistant("Welcome, traveler.", None));
        app.state.typing.push("The road");
        app.state.error = Some("busy".to_string());
        app.input = "go north".to_string();

        let mut terminal = Terminal::new(TestBackend::new(80, 24)).unwrap();
        terminal.draw(|frame| render(frame, &app)).unwrap();

        let buffer = terminal.backend().buffer().clone();
        let text: String = buffer
            .content
            .iter()
            .map(|cell| cell.symbol())
            .collect();
        assert!(text.contains("Welcome, traveler."));
        assert!(text.contains("The road"));
        assert!(text.contains("busy"));
        assert!(text.contains("go north"));
    }
}
