// ABOUTME: Maps local terminal events to terminal host actions
// Reserved chords drive the host; every other key is encoded and forwarded to the meter shell

//! Local input to host actions.

use crate::terminal::keys::encode_key;
use crossterm::event::{Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};

/// Lines moved per scroll step
pub const SCROLL_STEP: usize = 10;

/// Host actions produced from local input
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppEvent {
    /// Close the session and leave
    Quit,
    /// Start a new session to the same meter
    Reconnect,
    /// Scroll the terminal view back
    ScrollUp,
    /// Scroll the terminal view forward
    ScrollDown,
    /// Bytes for the remote shell
    Input(String),
    /// The local terminal changed size
    Resize {
        /// New width in columns
        cols: u16,
        /// New height in rows
        rows: u16,
    },
}

/// Stateless mapping from crossterm events to [`AppEvent`]s
pub struct EventHandler;

impl EventHandler {
    /// Translate a crossterm event. `session_finished` enables the
    /// single-key quit/reconnect shortcuts once the remote shell is gone.
    pub fn handle_event(event: &Event, session_finished: bool) -> Option<AppEvent> {
        match event {
            Event::Key(key) => Self::handle_key_event(*key, session_finished),
            Event::Paste(text) => Some(AppEvent::Input(text.clone())),
            Event::Resize(cols, rows) => Some(AppEvent::Resize {
                cols: *cols,
                rows: *rows,
            }),
            _ => None,
        }
    }

    /// Reserved chords first, then the key encoded for the remote shell
    pub fn handle_key_event(key: KeyEvent, session_finished: bool) -> Option<AppEvent> {
        if key.kind == KeyEventKind::Release {
            return None;
        }

        let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);
        let shift = key.modifiers.contains(KeyModifiers::SHIFT);

        match key.code {
            // A Unix tty delivers Ctrl-] as Ctrl+5
            KeyCode::Char(']' | '5') if ctrl => return Some(AppEvent::Quit),
            KeyCode::Char('r') if ctrl && session_finished => return Some(AppEvent::Reconnect),
            KeyCode::Char('q') if session_finished && !ctrl => return Some(AppEvent::Quit),
            KeyCode::Char('r') if session_finished && !ctrl => return Some(AppEvent::Reconnect),
            KeyCode::PageUp if shift => return Some(AppEvent::ScrollUp),
            KeyCode::PageDown if shift => return Some(AppEvent::ScrollDown),
            _ => {}
        }

        if session_finished {
            return None;
        }

        encode_key(key).map(|bytes| AppEvent::Input(String::from_utf8_lossy(&bytes).into_owned()))
    }
}
