// ABOUTME: Transport seam between the session state machine and a concrete relay socket
// Transports report lifecycle and messages as events tagged with their connection id

//! Transport abstraction over relay sockets.

use crate::terminal::error::TransportError;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::mpsc;

static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

/// Identifies one transport instance for the lifetime of the process.
///
/// Ids are never reused, so events still in flight from a superseded or
/// released transport can always be told apart from the current one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Allocate a fresh id
    pub fn next() -> Self {
        Self(NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Something that happened on a transport, reported to its owner
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// The handshake finished; frames can be sent
    Opened,
    /// A text message from the relay
    Message(String),
    /// A binary message from the relay
    Binary(Vec<u8>),
    /// The socket closed, with the peer's close reason if it gave one
    Closed(Option<String>),
    /// The socket failed; no further events follow
    Error(String),
}

/// Sending half of the transport event channel
pub type EventSender = mpsc::UnboundedSender<(ConnectionId, TransportEvent)>;
/// Receiving half of the transport event channel
pub type EventReceiver = mpsc::UnboundedReceiver<(ConnectionId, TransportEvent)>;

/// Create the channel transports use to report back to their owner
pub fn event_channel() -> (EventSender, EventReceiver) {
    mpsc::unbounded_channel()
}

/// One live connection to the relay.
///
/// Implementations report back asynchronously with [`TransportEvent`]s
/// tagged by [`Transport::id`].
pub trait Transport {
    /// Id carried by every event this transport reports
    fn id(&self) -> ConnectionId;

    /// Whether the handshake finished and the socket has not closed since
    fn is_open(&self) -> bool;

    /// Queue a text message. Fails with [`TransportError::NotOpen`] unless open.
    fn send_text(&mut self, text: String) -> Result<(), TransportError>;

    /// Must be safe to call on an already closed transport
    fn close(&mut self);
}

/// Creates transports for a relay URL. Opening completes asynchronously and
/// is reported through a [`TransportEvent::Opened`] event.
pub trait Connector {
    /// Transport type this connector creates
    type Transport: Transport;

    /// Start connecting to `url`. Errors here mean no transport was created.
    fn connect(&mut self, url: &str) -> Result<Self::Transport, TransportError>;
}
