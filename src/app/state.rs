// ABOUTME: Terminal host state binding one relay session to the local viewport
// Applies user actions, transport events and the reconnect policy to the active session

//! Terminal host state and reconnect scheduling.

use crate::app::events::{AppEvent, SCROLL_STEP};
use crate::config::AppConfig;
use crate::identity::IdentityProvider;
use crate::terminal::{
    ConnectionId, ConnectionState, Connector, SessionTarget, TerminalEmulator, TerminalScreen,
    TerminalSession, TransportEvent,
};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Terminal host state: the active session plus everything needed to
/// replace it on reconnect.
///
/// Only one session exists at a time. A reconnect drops the finished one,
/// which releases its transport, before opening the next.
pub struct App<C: Connector + Clone> {
    config: AppConfig,
    target: SessionTarget,
    identity: Arc<dyn IdentityProvider>,
    connector: C,

    session: TerminalSession<C, TerminalEmulator>,

    /// Remote pty geometry as (rows, cols)
    viewport: (u16, u16),

    /// Consecutive reconnect attempts since the last successful connection
    reconnect_attempt: u32,
    reconnect_at: Option<Instant>,
    /// Whether the end of the current session has already been handled
    finish_handled: bool,

    /// Set once the user asked to leave; the host loop exits on it
    pub should_quit: bool,
}

impl<C: Connector + Clone> App<C> {
    /// Build the host with an unopened session sized to `viewport` (rows, cols)
    pub fn new(
        config: AppConfig,
        target: SessionTarget,
        identity: Arc<dyn IdentityProvider>,
        connector: C,
        viewport: (u16, u16),
    ) -> Self {
        let session = Self::new_session(&config, &identity, &connector, viewport);
        Self {
            config,
            target,
            identity,
            connector,
            session,
            viewport,
            reconnect_attempt: 0,
            reconnect_at: None,
            finish_handled: false,
            should_quit: false,
        }
    }

    fn new_session(
        config: &AppConfig,
        identity: &Arc<dyn IdentityProvider>,
        connector: &C,
        (rows, cols): (u16, u16),
    ) -> TerminalSession<C, TerminalEmulator> {
        TerminalSession::new(
            config.relay_url.clone(),
            connector.clone(),
            TerminalEmulator::new(rows, cols),
            identity.clone(),
        )
    }

    /// Open the session to the configured target
    pub fn start(&mut self) {
        if let Err(e) = self.session.open(self.target.meter_id.clone(), self.target.port) {
            warn!("Failed to open terminal to {}: {}", self.target, e);
        }
        self.after_session_update();
    }

    /// The active session
    pub const fn session(&self) -> &TerminalSession<C, TerminalEmulator> {
        &self.session
    }

    /// Meter and port every session connects to
    pub const fn target(&self) -> &SessionTarget {
        &self.target
    }

    /// Relay endpoint from the configuration
    pub fn relay_url(&self) -> &str {
        &self.config.relay_url
    }

    /// Remote pty geometry as (rows, cols)
    pub const fn viewport(&self) -> (u16, u16) {
        self.viewport
    }

    /// When the next automatic reconnect fires, if one is scheduled
    pub const fn reconnect_at(&self) -> Option<Instant> {
        self.reconnect_at
    }

    /// Automatic attempts made since the last successful connection
    pub const fn reconnect_attempt(&self) -> u32 {
        self.reconnect_attempt
    }

    /// Whether the active session has ended
    pub const fn is_finished(&self) -> bool {
        self.session.state().is_finished()
    }

    /// Apply one user action
    pub fn process_event(&mut self, event: AppEvent) {
        match event {
            AppEvent::Quit => {
                info!("Quit requested");
                self.should_quit = true;
            }
            AppEvent::Reconnect => {
                if self.is_finished() {
                    self.reconnect_attempt = 0;
                    self.reconnect();
                }
            }
            AppEvent::ScrollUp => self.session.screen_mut().scroll_up(SCROLL_STEP),
            AppEvent::ScrollDown => self.session.screen_mut().scroll_down(SCROLL_STEP),
            AppEvent::Input(data) => {
                self.session.screen_mut().scroll_to_bottom();
                self.session.send_input(&data);
            }
            AppEvent::Resize { cols, rows } => {
                let viewport = crate::app::view::terminal_size(cols, rows);
                if viewport != self.viewport {
                    debug!("Viewport resized to {}x{}", viewport.1, viewport.0);
                    self.viewport = viewport;
                    self.session.resize(viewport.0, viewport.1);
                }
            }
        }
    }

    /// Feed a transport event to the active session
    pub fn handle_transport_event(&mut self, connection: ConnectionId, event: TransportEvent) {
        self.session.handle_event(connection, event);
        self.after_session_update();
    }

    /// Fire a scheduled reconnect once its deadline has passed
    pub fn tick(&mut self, now: Instant) {
        if let Some(at) = self.reconnect_at {
            if now >= at {
                self.reconnect();
            }
        }
    }

    /// Close the active session; used on every exit path of the host loop
    pub fn shutdown(&mut self) {
        self.reconnect_at = None;
        self.session.close();
    }

    fn reconnect(&mut self) {
        self.reconnect_at = None;
        info!(
            "Reconnecting to {} (attempt {})",
            self.target,
            self.reconnect_attempt.max(1)
        );

        // Dropping the old session closes its transport
        self.session = Self::new_session(&self.config, &self.identity, &self.connector, self.viewport);
        self.finish_handled = false;
        self.session
            .screen_mut()
            .write_status(&format!("Reconnecting to {}", self.target));
        self.start();
    }

    fn after_session_update(&mut self) {
        match self.session.state() {
            ConnectionState::Connected => {
                self.reconnect_attempt = 0;
            }
            state if state.is_finished() && !self.finish_handled => {
                self.finish_handled = true;
                self.schedule_reconnect();
            }
            _ => {}
        }
    }

    fn schedule_reconnect(&mut self) {
        let policy = &self.config.reconnect;
        let next_attempt = self.reconnect_attempt + 1;

        if let Some(delay) = policy.delay_for(next_attempt) {
            self.reconnect_attempt = next_attempt;
            self.reconnect_at = Some(Instant::now() + delay);
            let line = format!(
                "Reconnecting in {} (attempt {}/{})",
                format_delay(delay),
                next_attempt,
                policy.max_attempts
            );
            info!("{}", line);
            self.session.screen_mut().write_status(&line);
        } else {
            if policy.is_enabled() {
                warn!("Giving up on {} after {} attempts", self.target, self.reconnect_attempt);
            }
            self.session
                .screen_mut()
                .write_status("Press r to reconnect or q to quit");
        }
    }
}

fn format_delay(delay: Duration) -> String {
    if delay.as_millis() < 1_000 {
        format!("{}ms", delay.as_millis())
    } else {
        format!("{:.1}s", delay.as_secs_f64())
    }
}
