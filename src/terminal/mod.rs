// ABOUTME: Terminal module for remote meter shells over the WebSocket SSH relay
// Provides the session state machine, wire protocol, transports and terminal emulation

//! Remote meter shells: sessions, the relay protocol and terminal emulation.

pub mod error;
pub mod keys;
pub mod protocol;
pub mod session;
pub mod terminal_emulator;
pub mod transport;
pub mod websocket_client;

pub use error::{SessionError, TransportError};
pub use protocol::{ClientFrame, ConnectionState, Incoming, ServerFrame};
pub use session::{SessionTarget, TerminalSession};
pub use terminal_emulator::{TerminalEmulator, TerminalScreen, TerminalView};
pub use transport::{event_channel, ConnectionId, Connector, Transport, TransportEvent};
pub use websocket_client::{WebSocketConnector, WebSocketTransport};
