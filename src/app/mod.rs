// ABOUTME: Terminal host binding one meter shell session to the local terminal
// Runs the event loop over transport events, keyboard input and redraw ticks

//! Full-screen host for one meter terminal session.

pub mod events;
pub mod state;
pub mod view;

pub use events::{AppEvent, EventHandler};
pub use state::App;

use crate::config::AppConfig;
use crate::identity::IdentityProvider;
use crate::terminal::{event_channel, SessionTarget, WebSocketConnector};
use anyhow::Result;
use crossterm::{
    event::{DisableBracketedPaste, EnableBracketedPaste, EventStream},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use futures_util::StreamExt;
use ratatui::{backend::CrosstermBackend, Terminal};
use std::io::{self, Stdout};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{error, info};

const TICK_RATE: Duration = Duration::from_millis(100);

/// Raw mode and alternate screen for as long as it lives
struct TerminalGuard {
    terminal: Terminal<CrosstermBackend<Stdout>>,
}

impl TerminalGuard {
    fn enter() -> Result<Self> {
        enable_raw_mode()?;
        let mut stdout = io::stdout();
        if let Err(e) = execute!(stdout, EnterAlternateScreen, EnableBracketedPaste) {
            let _ = disable_raw_mode();
            return Err(e.into());
        }
        let terminal = Terminal::new(CrosstermBackend::new(stdout))?;
        Ok(Self { terminal })
    }
}

impl Drop for TerminalGuard {
    fn drop(&mut self) {
        let _ = disable_raw_mode();
        let _ = execute!(
            self.terminal.backend_mut(),
            DisableBracketedPaste,
            LeaveAlternateScreen
        );
        let _ = self.terminal.show_cursor();
    }
}

/// Open a terminal to `target` and run until the user quits
pub async fn run(
    config: AppConfig,
    target: SessionTarget,
    identity: Arc<dyn IdentityProvider>,
) -> Result<()> {
    let (events_tx, mut transport_events) = event_channel();
    let connector = WebSocketConnector::new(events_tx, config.connect_timeout());

    let (cols, rows) = crossterm::terminal::size()?;
    let mut app = App::new(config, target, identity, connector, view::terminal_size(cols, rows));

    let mut guard = TerminalGuard::enter()?;
    info!("Opening terminal to {} via {}", app.target(), app.relay_url());
    app.start();

    let result = event_loop(&mut app, &mut guard, &mut transport_events).await;
    if let Err(e) = &result {
        error!("Terminal host stopped: {}", e);
    }

    app.shutdown();
    drop(guard);
    result
}

async fn event_loop(
    app: &mut App<WebSocketConnector>,
    guard: &mut TerminalGuard,
    transport_events: &mut crate::terminal::transport::EventReceiver,
) -> Result<()> {
    let mut input = EventStream::new();
    let mut ticker = tokio::time::interval(TICK_RATE);

    loop {
        guard.terminal.draw(|frame| view::render(frame, app))?;

        tokio::select! {
            Some((connection, event)) = transport_events.recv() => {
                app.handle_transport_event(connection, event);
            }
            maybe_event = input.next() => match maybe_event {
                Some(Ok(event)) => {
                    if let Some(app_event) = EventHandler::handle_event(&event, app.is_finished()) {
                        app.process_event(app_event);
                    }
                }
                Some(Err(e)) => return Err(e.into()),
                None => break,
            },
            _ = ticker.tick() => app.tick(Instant::now()),
        }

        if app.should_quit {
            break;
        }
    }

    Ok(())
}
