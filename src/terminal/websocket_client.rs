// ABOUTME: WebSocket transport for connecting to the meter SSH relay
// Runs each socket in its own task and reports lifecycle and messages back as transport events

//! WebSocket implementation of the relay transport.

use crate::terminal::error::TransportError;
use crate::terminal::transport::{ConnectionId, Connector, EventSender, Transport, TransportEvent};
use futures_util::{SinkExt, StreamExt};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Duration;
use tokio_tungstenite::{connect_async, tungstenite};
use tracing::{debug, error, info, warn};

#[derive(Debug)]
enum Outgoing {
    Text(String),
    Close,
}

const CONNECTING: u8 = 0;
const OPEN: u8 = 1;
const CLOSED: u8 = 2;

/// Lifecycle shared between a transport handle and its connection task.
/// Only the task moves it to `OPEN`, and only from `CONNECTING`.
#[derive(Debug, Default)]
struct SocketState(AtomicU8);

impl SocketState {
    fn is_open(&self) -> bool {
        self.0.load(Ordering::Acquire) == OPEN
    }

    /// Returns false if the handle was closed while the handshake ran
    fn mark_open(&self) -> bool {
        self.0
            .compare_exchange(CONNECTING, OPEN, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Returns the previous state
    fn mark_closed(&self) -> u8 {
        self.0.swap(CLOSED, Ordering::AcqRel)
    }
}

/// Opens WebSocket transports to the relay.
#[derive(Clone)]
pub struct WebSocketConnector {
    /// Channel every transport created here reports its events on
    events: EventSender,

    connect_timeout: Duration,
}

impl WebSocketConnector {
    /// Connector reporting on `events`, giving up handshakes after `connect_timeout`
    pub const fn new(events: EventSender, connect_timeout: Duration) -> Self {
        Self {
            events,
            connect_timeout,
        }
    }
}

impl Connector for WebSocketConnector {
    type Transport = WebSocketTransport;

    fn connect(&mut self, url: &str) -> Result<WebSocketTransport, TransportError> {
        let runtime = tokio::runtime::Handle::try_current().map_err(|_| TransportError::NoRuntime)?;

        let id = ConnectionId::next();
        let state = Arc::new(SocketState::default());
        let (outgoing_tx, outgoing_rx) = mpsc::unbounded_channel();

        info!("Starting WebSocket connection {} to {}", id, url);
        let task = runtime.spawn(connection_handler(
            url.to_string(),
            id,
            outgoing_rx,
            self.events.clone(),
            state.clone(),
            self.connect_timeout,
        ));

        Ok(WebSocketTransport {
            id,
            state,
            outgoing: outgoing_tx,
            task,
        })
    }
}

/// Handle to one relay socket. Dropping it closes the socket.
pub struct WebSocketTransport {
    id: ConnectionId,

    state: Arc<SocketState>,

    outgoing: mpsc::UnboundedSender<Outgoing>,

    /// Aborted if the handle is closed before the handshake finishes
    task: JoinHandle<()>,
}

impl Transport for WebSocketTransport {
    fn id(&self) -> ConnectionId {
        self.id
    }

    fn is_open(&self) -> bool {
        self.state.is_open()
    }

    fn send_text(&mut self, text: String) -> Result<(), TransportError> {
        if !self.is_open() {
            return Err(TransportError::NotOpen);
        }
        self.outgoing
            .send(Outgoing::Text(text))
            .map_err(|e| TransportError::SendFailed(e.to_string()))
    }

    fn close(&mut self) {
        match self.state.mark_closed() {
            CONNECTING => {
                debug!("Aborting handshake for {}", self.id);
                self.task.abort();
            }
            OPEN => {
                // The task may already be gone; nothing left to close then
                let _ = self.outgoing.send(Outgoing::Close);
            }
            _ => {}
        }
    }
}

impl Drop for WebSocketTransport {
    fn drop(&mut self) {
        self.close();
    }
}

/// Handle a single WebSocket connection from handshake to close
async fn connection_handler(
    url: String,
    id: ConnectionId,
    mut outgoing: mpsc::UnboundedReceiver<Outgoing>,
    events: EventSender,
    state: Arc<SocketState>,
    connect_timeout: Duration,
) {
    let emit = |event: TransportEvent| {
        if events.send((id, event)).is_err() {
            debug!("Event receiver for {} is gone", id);
        }
    };

    debug!("Attempting WebSocket handshake for {}", id);
    let ws_stream = match tokio::time::timeout(connect_timeout, connect_async(url.as_str())).await {
        Ok(Ok((stream, response))) => {
            debug!("WebSocket response status: {:?}", response.status());
            stream
        }
        Ok(Err(e)) => {
            error!("WebSocket handshake failed for {}: {}", id, e);
            emit(TransportEvent::Error(
                TransportError::ConnectFailed(e.to_string()).to_string(),
            ));
            return;
        }
        Err(_) => {
            error!("WebSocket handshake for {} timed out", id);
            emit(TransportEvent::Error(
                TransportError::Timeout(connect_timeout.as_secs()).to_string(),
            ));
            return;
        }
    };

    let (mut ws_sender, mut ws_receiver) = ws_stream.split();

    if !state.mark_open() {
        debug!("WebSocket {} was released during the handshake", id);
        let _ = ws_sender.send(tungstenite::Message::Close(None)).await;
        let _ = ws_sender.close().await;
        return;
    }
    info!("WebSocket {} connected to {}", id, url);
    emit(TransportEvent::Opened);

    loop {
        tokio::select! {
            command = outgoing.recv() => match command {
                Some(Outgoing::Text(text)) => {
                    if let Err(e) = ws_sender.send(tungstenite::Message::Text(text)).await {
                        error!("Failed to send WebSocket message on {}: {}", id, e);
                        state.mark_closed();
                        emit(TransportEvent::Error(format!("Send failed: {e}")));
                        break;
                    }
                }
                // Explicit close, or the transport handle was dropped
                Some(Outgoing::Close) | None => {
                    state.mark_closed();
                    let _ = ws_sender.send(tungstenite::Message::Close(None)).await;
                    let _ = ws_sender.close().await;
                    debug!("WebSocket {} closed by client", id);
                    break;
                }
            },

            message = ws_receiver.next() => match message {
                Some(Ok(tungstenite::Message::Text(text))) => {
                    emit(TransportEvent::Message(text));
                }
                Some(Ok(tungstenite::Message::Binary(bytes))) => {
                    emit(TransportEvent::Binary(bytes));
                }
                Some(Ok(tungstenite::Message::Close(frame))) => {
                    info!("WebSocket {} closed by relay", id);
                    state.mark_closed();
                    let reason = frame
                        .map(|f| f.reason.into_owned())
                        .filter(|reason| !reason.is_empty());
                    emit(TransportEvent::Closed(reason));
                    // Flush the close reply tungstenite queued for the relay
                    if let Err(e) = ws_sender.close().await {
                        debug!("Close handshake for {} not completed: {}", id, e);
                    }
                    break;
                }
                Some(Ok(_)) => {
                    // Ping/Pong are answered by tungstenite itself
                }
                Some(Err(e)) => {
                    warn!("WebSocket error on {}: {}", id, e);
                    state.mark_closed();
                    emit(TransportEvent::Error(format!("WebSocket error: {e}")));
                    break;
                }
                None => {
                    state.mark_closed();
                    emit(TransportEvent::Closed(None));
                    break;
                }
            },
        }
    }
}
