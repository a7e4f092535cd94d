//! Connection lifecycle state and notifications

use std::fmt;

/// Top-level state of the event channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
}

impl ConnectionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a connection ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DisconnectReason {
    /// `disconnect()` was called
    ClientRequested,
    /// The server sent a namespace DISCONNECT
    ServerDisconnect,
    /// The WebSocket closed
    TransportClosed,
    /// The WebSocket failed
    TransportError(String),
    /// No packet within the server's ping interval plus ping timeout
    HeartbeatTimeout,
}

impl DisconnectReason {
    /// Whether the host did not ask for this disconnect
    pub fn is_involuntary(&self) -> bool {
        !matches!(self, DisconnectReason::ClientRequested)
    }
}

impl fmt::Display for DisconnectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DisconnectReason::ClientRequested => f.write_str("client requested"),
            DisconnectReason::ServerDisconnect => f.write_str("server disconnect"),
            DisconnectReason::TransportClosed => f.write_str("transport closed"),
            DisconnectReason::TransportError(e) => write!(f, "transport error: {e}"),
            DisconnectReason::HeartbeatTimeout => f.write_str("heartbeat timeout"),
        }
    }
}

/// Lifecycle notification published by the channel
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelStatus {
    Connecting,
    Connected { session_id: String },
    Disconnected { reason: DisconnectReason },
}
