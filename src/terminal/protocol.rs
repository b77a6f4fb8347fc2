// ABOUTME: JSON wire protocol spoken between the terminal client and the meter SSH relay
// Frames are tagged by a `type` field; anything that is not a known frame is treated as raw output

//! JSON frames exchanged with the SSH relay.

use serde::{Deserialize, Serialize};
use std::fmt;

// ============================================
// Client → Relay Frames
// ============================================

/// Frames the client sends to the relay
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ClientFrame {
    /// Ask the relay to open a shell on a meter
    #[serde(rename_all = "camelCase")]
    Connect {
        /// Meter to reach
        meter_id: String,
        /// SSH port on the meter
        port: u16,
        /// Operator identity, omitted from the JSON when unknown
        #[serde(default, skip_serializing_if = "Option::is_none")]
        user_id: Option<String>,
    },
    /// Keystrokes or pasted text for the remote shell
    Input {
        /// Raw bytes as a string, escape sequences included
        data: String,
    },
    /// New pty geometry
    Resize {
        /// Height in rows
        rows: u16,
        /// Width in columns
        cols: u16,
    },
    /// End the remote shell
    Disconnect,
}

// ============================================
// Relay → Client Frames
// ============================================

/// Frames the relay sends to the client
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ServerFrame {
    /// Terminal output from the remote shell
    Output {
        /// Output text, escape sequences included
        data: String,
    },
    /// The relay reached the meter's shell
    Connected,
    /// The remote shell ended
    Disconnected,
    /// The relay could not serve the session
    Error {
        /// Diagnostic text
        #[serde(default, alias = "message")]
        error: String,
    },
}

/// A message received from the relay after decoding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Incoming {
    /// A recognised relay frame
    Frame(ServerFrame),
    /// Payload that did not parse as a frame; rendered verbatim
    Raw(String),
}

// ============================================
// Connection State
// ============================================

/// Lifecycle of a terminal session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    /// Not opened yet
    #[default]
    Idle,
    /// Transport requested; waiting for the relay
    Connecting,
    /// The relay acknowledged or the shell produced output
    Connected,
    /// The shell or the socket went away
    Disconnected,
    /// The transport or the relay reported a failure
    Errored,
}

// ============================================
// Helper functions
// ============================================

impl ClientFrame {
    /// Create the handshake frame sent once the socket is open
    pub fn connect(meter_id: impl Into<String>, port: u16, user_id: Option<String>) -> Self {
        Self::Connect {
            meter_id: meter_id.into(),
            port,
            user_id,
        }
    }

    /// Create an input frame
    pub fn input(data: impl Into<String>) -> Self {
        Self::Input { data: data.into() }
    }

    /// Create a resize frame
    pub const fn resize(rows: u16, cols: u16) -> Self {
        Self::Resize { rows, cols }
    }

    /// Serialize to the JSON text sent on the wire
    pub fn encode(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

impl Incoming {
    /// Decode a text message from the relay, falling back to raw output
    pub fn decode(text: &str) -> Self {
        match serde_json::from_str::<ServerFrame>(text) {
            Ok(frame) => Self::Frame(frame),
            Err(e) => {
                tracing::trace!("Passing through unframed relay message: {}", e);
                Self::Raw(text.to_string())
            }
        }
    }
}

impl ConnectionState {
    /// Short lowercase name shown in the status bar
    pub const fn label(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Disconnected => "disconnected",
            Self::Errored => "error",
        }
    }

    /// Whether input and resize frames may be forwarded in this state
    pub const fn accepts_input(self) -> bool {
        matches!(self, Self::Connecting | Self::Connected)
    }

    /// Disconnected and Errored end a session; nothing moves it out again
    pub const fn is_finished(self) -> bool {
        matches!(self, Self::Disconnected | Self::Errored)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}
