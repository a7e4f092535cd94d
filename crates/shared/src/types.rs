//! Common types used across the dispatch console

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use time::OffsetDateTime;

// =============================================================================
// Room Scopes
// =============================================================================

/// Kind of resource a realtime room is scoped to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoomScope {
    /// One service request (pickup/delivery job)
    ServiceRequest,
}

impl RoomScope {
    pub fn as_str(&self) -> &'static str {
        match self {
            RoomScope::ServiceRequest => "service_request",
        }
    }
}

impl fmt::Display for RoomScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Service Requests
// =============================================================================

/// Lifecycle status of a service request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceRequestStatus {
    Requested,
    Assigned,
    InProgress,
    Completed,
    Cancelled,
}

impl ServiceRequestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ServiceRequestStatus::Requested => "requested",
            ServiceRequestStatus::Assigned => "assigned",
            ServiceRequestStatus::InProgress => "in_progress",
            ServiceRequestStatus::Completed => "completed",
            ServiceRequestStatus::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for ServiceRequestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Realtime Events
// =============================================================================

/// Event name the backend pushes when a service request changes status
pub const STATUS_CHANGED_EVENT: &str = "service_request:status_changed";

/// Payload of a `service_request:status_changed` event
///
/// Only the fields the console reads are declared; everything else the
/// producer sends is kept in `extra`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusChangedPayload {
    pub event_id: String,
    pub sequence: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<ServiceRequestStatus>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

/// One received event as kept in the console's recent-history buffer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventMessage {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sequence: Option<i64>,
    /// Receipt time, assigned by the receiver rather than the producer
    #[serde(with = "time::serde::rfc3339")]
    pub time_stamp: OffsetDateTime,
    #[serde(rename = "type")]
    pub event_type: String,
    pub data: Value,
}

impl EventMessage {
    /// Build a record from any payload, picking up `eventId`/`sequence` when present
    pub fn from_payload(
        event_type: impl Into<String>,
        data: Value,
        time_stamp: OffsetDateTime,
    ) -> Self {
        let event_id = data
            .get("eventId")
            .and_then(Value::as_str)
            .map(str::to_string);
        let sequence = data.get("sequence").and_then(Value::as_i64);

        Self {
            event_id,
            sequence,
            time_stamp,
            event_type: event_type.into(),
            data,
        }
    }

    /// Build a record from a parsed status change
    pub fn from_status_change(
        payload: &StatusChangedPayload,
        data: Value,
        time_stamp: OffsetDateTime,
    ) -> Self {
        Self {
            event_id: Some(payload.event_id.clone()),
            sequence: Some(payload.sequence),
            time_stamp,
            event_type: STATUS_CHANGED_EVENT.to_string(),
            data,
        }
    }
}
