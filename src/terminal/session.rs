// ABOUTME: Terminal session state machine binding one relay transport to one terminal screen
// Encodes input and resize frames, dispatches relay frames, and releases resources on close

//! The terminal session state machine.

use crate::identity::IdentityProvider;
use crate::terminal::error::SessionError;
use crate::terminal::protocol::{ClientFrame, ConnectionState, Incoming, ServerFrame};
use crate::terminal::terminal_emulator::TerminalScreen;
use crate::terminal::transport::{ConnectionId, Connector, Transport, TransportEvent};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// The meter shell a session is bound to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionTarget {
    /// Meter identifier as known to the relay
    pub meter_id: String,
    /// SSH port on the meter
    pub port: u16,
}

impl SessionTarget {
    /// Target `meter_id` on `port`
    pub fn new(meter_id: impl Into<String>, port: u16) -> Self {
        Self {
            meter_id: meter_id.into(),
            port,
        }
    }
}

impl fmt::Display for SessionTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.meter_id, self.port)
    }
}

/// One remote terminal session.
///
/// All methods are driven from a single task; transports report back through
/// [`TerminalSession::handle_event`]. At most one transport is live at a time,
/// and every exit path (explicit [`close`](Self::close) or drop) releases it.
pub struct TerminalSession<C: Connector, S: TerminalScreen> {
    id: Uuid,
    relay_url: String,
    connector: C,
    identity: Arc<dyn IdentityProvider>,

    transport: Option<C::Transport>,
    screen: S,

    target: Option<SessionTarget>,
    state: ConnectionState,
    /// Whether the relay has acknowledged with a `connected` frame
    acknowledged: bool,
    last_error: Option<String>,
    closed: bool,
}

impl<C: Connector, S: TerminalScreen> TerminalSession<C, S> {
    /// Create an idle session. Nothing connects until [`open`](Self::open).
    pub fn new(
        relay_url: impl Into<String>,
        connector: C,
        screen: S,
        identity: Arc<dyn IdentityProvider>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            relay_url: relay_url.into(),
            connector,
            identity,
            transport: None,
            screen,
            target: None,
            state: ConnectionState::Idle,
            acknowledged: false,
            last_error: None,
            closed: false,
        }
    }

    /// Session id used in log lines
    pub const fn id(&self) -> Uuid {
        self.id
    }

    /// Current lifecycle state
    pub const fn state(&self) -> ConnectionState {
        self.state
    }

    /// Target of the last `open`
    pub const fn target(&self) -> Option<&SessionTarget> {
        self.target.as_ref()
    }

    /// Diagnostic that moved the session to Errored
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// Whether [`close`](Self::close) has run
    pub const fn is_closed(&self) -> bool {
        self.closed
    }

    /// The screen output is written to
    pub const fn screen(&self) -> &S {
        &self.screen
    }

    /// Mutable access to the screen, for scrolling
    pub fn screen_mut(&mut self) -> &mut S {
        &mut self.screen
    }

    /// Connection id of the live transport, if any
    pub fn connection_id(&self) -> Option<ConnectionId> {
        self.transport.as_ref().map(|transport| transport.id())
    }

    /// Open a transport to the relay for the given meter.
    ///
    /// Any transport this session already holds is closed first. Connector
    /// failures are written to the screen and also returned.
    pub fn open(&mut self, meter_id: impl Into<String>, port: u16) -> Result<(), SessionError> {
        if self.closed {
            return Err(SessionError::Closed);
        }

        if let Some(mut previous) = self.transport.take() {
            info!(
                "Session {}: closing {} before opening a new connection",
                self.id,
                previous.id()
            );
            previous.close();
        }

        let target = SessionTarget::new(meter_id, port);
        info!("Session {}: opening terminal to {} via {}", self.id, target, self.relay_url);
        self.target = Some(target);
        self.state = ConnectionState::Connecting;
        self.acknowledged = false;
        self.last_error = None;

        match self.connector.connect(&self.relay_url) {
            Ok(transport) => {
                debug!("Session {}: transport {} created", self.id, transport.id());
                self.transport = Some(transport);
                Ok(())
            }
            Err(e) => {
                self.fail(&e.to_string());
                Err(e.into())
            }
        }
    }

    /// Forward locally captured input. Dropped silently unless the transport is open.
    pub fn send_input(&mut self, data: &str) {
        if data.is_empty() {
            return;
        }
        if let Err(e) = self.send_if_open(&ClientFrame::input(data)) {
            debug!("Session {}: input dropped: {}", self.id, e);
        }
    }

    /// Resize the local screen and tell the remote pty about the new geometry
    pub fn resize(&mut self, rows: u16, cols: u16) {
        if self.closed {
            return;
        }
        self.screen.resize(rows, cols);
        if let Err(e) = self.send_if_open(&ClientFrame::resize(rows, cols)) {
            debug!("Session {}: resize not sent: {}", self.id, e);
        }
    }

    /// Feed a transport event into the session
    pub fn handle_event(&mut self, connection: ConnectionId, event: TransportEvent) {
        if self.closed || self.connection_id() != Some(connection) {
            debug!("Session {}: ignoring {:?} from stale {}", self.id, event, connection);
            return;
        }

        match event {
            TransportEvent::Opened => self.on_transport_open(),
            TransportEvent::Message(text) => self.on_frame(Incoming::decode(&text)),
            TransportEvent::Binary(bytes) => {
                self.on_frame(Incoming::Raw(String::from_utf8_lossy(&bytes).into_owned()));
            }
            TransportEvent::Closed(reason) => {
                self.transport = None;
                if matches!(self.state, ConnectionState::Connecting | ConnectionState::Connected) {
                    self.state = ConnectionState::Disconnected;
                    let line = reason.map_or_else(
                        || "Connection closed".to_string(),
                        |reason| format!("Connection closed: {reason}"),
                    );
                    info!("Session {}: {}", self.id, line);
                    self.screen.write_status(&line);
                }
            }
            TransportEvent::Error(message) => {
                if let Some(mut transport) = self.transport.take() {
                    transport.close();
                }
                if self.state.is_finished() {
                    debug!("Session {}: transport error after finish: {}", self.id, message);
                } else {
                    self.fail(&message);
                }
            }
        }
    }

    /// Dispatch one decoded relay message
    pub fn on_frame(&mut self, incoming: Incoming) {
        if self.closed {
            return;
        }

        match incoming {
            Incoming::Frame(ServerFrame::Output { data }) => self.write_output(&data),
            Incoming::Raw(data) => self.write_output(&data),
            Incoming::Frame(ServerFrame::Connected) => {
                if self.acknowledged || self.state.is_finished() {
                    return;
                }
                self.acknowledged = true;
                self.state = ConnectionState::Connected;
                let line = self
                    .target
                    .as_ref()
                    .map_or_else(|| "Connected".to_string(), |target| format!("Connected to {target}"));
                info!("Session {}: {}", self.id, line);
                self.screen.write_status(&line);
            }
            Incoming::Frame(ServerFrame::Disconnected) => {
                if self.state.is_finished() {
                    return;
                }
                self.state = ConnectionState::Disconnected;
                info!("Session {}: relay reported disconnect", self.id);
                self.screen.write_status("Disconnected");
            }
            Incoming::Frame(ServerFrame::Error { error }) => {
                if self.state.is_finished() {
                    debug!("Session {}: ignoring relay error after finish: {}", self.id, error);
                    return;
                }
                warn!("Session {}: relay error: {}", self.id, error);
                self.state = ConnectionState::Errored;
                self.screen.write_status(&format!("Error: {error}"));
                self.last_error = Some(error);
            }
        }
    }

    /// Send `disconnect` if possible, release the transport and the screen.
    /// Safe to call any number of times.
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;

        if let Some(mut transport) = self.transport.take() {
            if transport.is_open() {
                match ClientFrame::Disconnect.encode() {
                    Ok(json) => {
                        if let Err(e) = transport.send_text(json) {
                            debug!("Session {}: disconnect frame not sent: {}", self.id, e);
                        }
                    }
                    Err(e) => error!("Session {}: failed to encode disconnect: {}", self.id, e),
                }
            }
            transport.close();
        }

        if matches!(self.state, ConnectionState::Connecting | ConnectionState::Connected) {
            self.state = ConnectionState::Disconnected;
        }
        self.screen.dispose();
        info!("Session {}: closed", self.id);
    }

    fn on_transport_open(&mut self) {
        let Some(target) = self.target.clone() else {
            return;
        };

        let connect = ClientFrame::connect(target.meter_id, target.port, self.identity.user_id());
        if let Err(e) = self.send_if_open(&connect) {
            if let Some(mut transport) = self.transport.take() {
                transport.close();
            }
            self.fail(&format!("Failed to send connect request: {e}"));
            return;
        }

        let (rows, cols) = self.screen.size();
        if let Err(e) = self.send_if_open(&ClientFrame::resize(rows, cols)) {
            debug!("Session {}: initial resize not sent: {}", self.id, e);
        }
    }

    fn write_output(&mut self, data: &str) {
        if self.state == ConnectionState::Connecting {
            self.state = ConnectionState::Connected;
        }
        self.screen.write(data);
    }

    fn send_if_open(&mut self, frame: &ClientFrame) -> Result<(), SessionError> {
        if self.closed {
            return Err(SessionError::Closed);
        }
        if !self.state.accepts_input() {
            return Err(crate::terminal::error::TransportError::NotOpen.into());
        }
        let transport = match self.transport.as_mut() {
            Some(transport) if transport.is_open() => transport,
            _ => return Err(crate::terminal::error::TransportError::NotOpen.into()),
        };
        transport.send_text(frame.encode()?)?;
        Ok(())
    }

    fn fail(&mut self, message: &str) {
        error!("Session {}: {}", self.id, message);
        self.state = ConnectionState::Errored;
        self.last_error = Some(message.to_string());
        self.screen.write_status(&format!("Error: {message}"));
    }
}

impl<C: Connector, S: TerminalScreen> Drop for TerminalSession<C, S> {
    fn drop(&mut self) {
        self.close();
    }
}
