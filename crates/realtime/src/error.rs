//! Realtime client error types

use std::time::Duration;

use dispatch_shared::RoomScope;

use crate::websocket::packet::PacketError;

/// Errors surfaced by the token provider and the event channel
#[derive(Debug, thiserror::Error)]
pub enum RealtimeError {
    // Connection lifecycle
    #[error("No authentication token found")]
    AuthenticationMissing,
    #[error("Handshake failed: {0}")]
    HandshakeFailure(String),
    #[error("WebSocket not connected")]
    NotConnected,
    #[error("WebSocket already connected")]
    AlreadyConnected,
    #[error("Connection attempt abandoned by disconnect")]
    ConnectAborted,

    // Rooms
    #[error("{0}")]
    JoinRejected(String),
    #[error("No join acknowledgement within {0:?}")]
    JoinTimeout(Duration),
    #[error("Already in room {scope}:{resource_id}")]
    RoomAlreadyJoined {
        scope: RoomScope,
        resource_id: String,
    },
    #[error("Join of room {scope}:{resource_id} still pending")]
    JoinInProgress {
        scope: RoomScope,
        resource_id: String,
    },

    // Dispatch (logged, never returned to callers)
    #[error("Listener for '{event}' panicked: {message}")]
    ListenerFault { event: String, message: String },

    // Plumbing
    #[error("Protocol error: {0}")]
    Protocol(#[from] PacketError),
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
}

/// Result type for realtime operations
pub type RealtimeResult<T> = Result<T, RealtimeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_join_rejected_carries_server_message() {
        let err = RealtimeError::JoinRejected("room full".to_string());
        assert_eq!(err.to_string(), "room full");
    }

    #[test]
    fn test_authentication_missing_message() {
        assert_eq!(
            RealtimeError::AuthenticationMissing.to_string(),
            "No authentication token found"
        );
    }

    #[test]
    fn test_room_errors_name_the_room() {
        let err = RealtimeError::RoomAlreadyJoined {
            scope: RoomScope::ServiceRequest,
            resource_id: "sr-1".to_string(),
        };
        assert_eq!(err.to_string(), "Already in room service_request:sr-1");

        let err = RealtimeError::JoinInProgress {
            scope: RoomScope::ServiceRequest,
            resource_id: "sr-2".to_string(),
        };
        assert_eq!(err.to_string(), "Join of room service_request:sr-2 still pending");

        let err = RealtimeError::JoinTimeout(Duration::from_secs(5));
        assert_eq!(err.to_string(), "No join acknowledgement within 5s");
    }
}
