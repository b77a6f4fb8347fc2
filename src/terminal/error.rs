// ABOUTME: Error types for relay transports and terminal sessions
// Defines error conditions that can occur while talking to the meter SSH relay

//! Transport and session errors.

use thiserror::Error;

/// Failures of a relay transport
#[derive(Debug, Error)]
pub enum TransportError {
    /// The WebSocket handshake was refused or failed
    #[error("Failed to connect to relay: {0}")]
    ConnectFailed(String),

    /// The handshake did not finish within the connect timeout
    #[error("Connection timed out after {0} seconds")]
    Timeout(u64),

    /// The socket has not opened yet, or has already closed
    #[error("Transport is not open")]
    NotOpen,

    /// The connection task is gone
    #[error("Send failed: {0}")]
    SendFailed(String),

    /// `connect` was called outside a tokio runtime
    #[error("No async runtime available to drive the connection")]
    NoRuntime,
}

/// Failures of terminal session operations
#[derive(Debug, Error)]
pub enum SessionError {
    /// The session was closed and cannot be reopened
    #[error("Session is closed")]
    Closed,

    /// The underlying transport failed
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// A client frame could not be serialized
    #[error("Frame encoding failed: {0}")]
    Encode(#[from] serde_json::Error),
}
