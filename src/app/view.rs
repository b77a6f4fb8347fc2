// ABOUTME: Layout and rendering for the terminal host: bordered terminal view plus a status bar

//! Terminal host layout.

use crate::app::App;
use crate::terminal::{ConnectionState, Connector, TerminalView};
use ratatui::{
    layout::{Constraint, Direction, Layout},
    prelude::*,
    style::{Color, Modifier, Style},
    widgets::{Block, Borders, Paragraph},
};
use std::time::Instant;

const STATUS_BAR_HEIGHT: u16 = 1;
const BORDER_SIZE: u16 = 2;

/// Remote pty geometry as (rows, cols) for a local terminal of the given size
pub fn terminal_size(cols: u16, rows: u16) -> (u16, u16) {
    let rows = rows.saturating_sub(STATUS_BAR_HEIGHT + BORDER_SIZE).max(1);
    let cols = cols.saturating_sub(BORDER_SIZE).max(1);
    (rows, cols)
}

const fn state_color(state: ConnectionState) -> Color {
    match state {
        ConnectionState::Idle => Color::Gray,
        ConnectionState::Connecting => Color::Yellow,
        ConnectionState::Connected => Color::Green,
        ConnectionState::Disconnected => Color::DarkGray,
        ConnectionState::Errored => Color::Red,
    }
}

const fn state_indicator(state: ConnectionState) -> &'static str {
    match state {
        ConnectionState::Idle => "○",
        ConnectionState::Connecting => "◌",
        ConnectionState::Connected => "●",
        ConnectionState::Disconnected => "⏸",
        ConnectionState::Errored => "✗",
    }
}

/// Draw the terminal pane and the status bar
pub fn render<C: Connector + Clone>(frame: &mut Frame<'_>, app: &App<C>) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Min(BORDER_SIZE + 1), Constraint::Length(STATUS_BAR_HEIGHT)])
        .split(frame.size());

    let state = app.session().state();
    let block = Block::default()
        .title(format!(" {} ", app.target()))
        .borders(Borders::ALL)
        .border_style(Style::default().fg(state_color(state)));

    frame.render_widget(TerminalView::new(app.session().screen()).block(block), chunks[0]);
    frame.render_widget(status_bar(app), chunks[1]);
}

fn status_bar<C: Connector + Clone>(app: &App<C>) -> Paragraph<'static> {
    let state = app.session().state();

    let mut spans = vec![
        Span::styled(
            format!(" {} {} ", state_indicator(state), state),
            Style::default().fg(state_color(state)).add_modifier(Modifier::BOLD),
        ),
        Span::raw(format!("│ {} ", app.relay_url())),
    ];

    if let Some(at) = app.reconnect_at() {
        let remaining = at.saturating_duration_since(Instant::now());
        spans.push(Span::styled(
            format!("│ retry in {}s ", remaining.as_secs() + 1),
            Style::default().fg(Color::Yellow),
        ));
    }

    let hint = if state.is_finished() {
        "│ r reconnect · q quit"
    } else {
        "│ Ctrl-] quit · Shift-PgUp/PgDn scroll"
    };
    spans.push(Span::styled(hint, Style::default().fg(Color::DarkGray)));

    Paragraph::new(Line::from(spans))
}
