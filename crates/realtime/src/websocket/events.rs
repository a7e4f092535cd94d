//! Realtime event payload types
//!
//! Outbound requests the client emits and the normalized shapes it hands to
//! listeners.

use dispatch_shared::RoomScope;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use time::OffsetDateTime;

// =============================================================================
// Client-to-Server Events
// =============================================================================

/// Event name of the room join request
pub const JOIN_EVENT: &str = "join";

/// Payload of the `join` event
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinRequest {
    pub resource_id: String,
    pub scope: RoomScope,
}

/// Acknowledgement the server returns for a `join`
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct JoinAck {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub message: Option<String>,
}

impl JoinAck {
    /// Interpret the ack arguments; a missing or unparseable ack counts as failure
    pub fn from_args(args: &Value) -> Self {
        let first = match args {
            Value::Array(items) => items.first(),
            other => Some(other),
        };
        first
            .and_then(|value| JoinAck::deserialize(value).ok())
            .unwrap_or(JoinAck {
                success: false,
                message: None,
            })
    }
}

// =============================================================================
// Server-to-Client Events
// =============================================================================

/// Normalized copy of an inbound event delivered to wildcard listeners
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope {
    /// Name the server emitted the event under
    #[serde(rename = "type")]
    pub event_type: String,
    pub data: Value,
    /// Receipt time assigned by the channel at dispatch
    #[serde(with = "time::serde::rfc3339")]
    pub received_at: OffsetDateTime,
}

impl Envelope {
    pub fn new(event_type: &str, data: Value, received_at: OffsetDateTime) -> Self {
        Self {
            event_type: event_type.to_string(),
            data,
            received_at,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_join_request_serialization() {
        let request = JoinRequest {
            resource_id: "sr-1".to_string(),
            scope: RoomScope::ServiceRequest,
        };
        assert_eq!(
            serde_json::to_value(&request).unwrap(),
            json!({"resourceId": "sr-1", "scope": "service_request"})
        );
    }

    #[test]
    fn test_join_ack_parsing() {
        let ack = JoinAck::from_args(&json!([{"success": true}]));
        assert!(ack.success);

        let ack = JoinAck::from_args(&json!([{"success": false, "message": "room full"}]));
        assert!(!ack.success);
        assert_eq!(ack.message.as_deref(), Some("room full"));
    }

    #[test]
    fn test_join_ack_garbage_is_failure() {
        assert!(!JoinAck::from_args(&json!([])).success);
        assert!(!JoinAck::from_args(&json!(["ok"])).success);
        assert!(!JoinAck::from_args(&Value::Null).success);
    }

    #[test]
    fn test_envelope_serialization() {
        let envelope = Envelope::new(
            "status_changed",
            json!({"eventId": "e1", "sequence": 7}),
            OffsetDateTime::UNIX_EPOCH,
        );
        let value = serde_json::to_value(&envelope).unwrap();
        assert_eq!(value["type"], "status_changed");
        assert_eq!(value["data"], json!({"eventId": "e1", "sequence": 7}));
        assert_eq!(value["receivedAt"], "1970-01-01T00:00:00Z");
    }
}
