//! Connection monitor
//!
//! Wires the token provider, the event channel and the event history together
//! for one service request at a time.

use std::sync::Arc;

use dispatch_realtime::{
    wildcard_listener, ChannelStatus, ConnectionState, Envelope, EventChannel, RealtimeError,
    RealtimeResult, TokenClient,
};
use dispatch_shared::{EventMessage, RoomScope, StatusChangedPayload, STATUS_CHANGED_EVENT};
use parking_lot::Mutex;
use time::OffsetDateTime;
use tokio::sync::broadcast;

use crate::config::ConsoleConfig;
use crate::history::EventHistory;

pub struct ConnectionMonitor {
    tokens: TokenClient,
    channel: EventChannel,
    history: Arc<EventHistory>,
    last_error: Mutex<Option<String>>,
}

impl ConnectionMonitor {
    pub fn new(config: &ConsoleConfig) -> RealtimeResult<Self> {
        Ok(Self::with_parts(
            TokenClient::new(&config.realtime)?,
            EventChannel::new(config.realtime.channel()),
            Arc::new(EventHistory::new(config.history_limit)),
        ))
    }

    pub fn with_parts(tokens: TokenClient, channel: EventChannel, history: Arc<EventHistory>) -> Self {
        Self {
            tokens,
            channel,
            history,
            last_error: Mutex::new(None),
        }
    }

    /// Fetch a token, connect and join the service request's room
    ///
    /// On failure the channel is left disconnected and the error is kept for
    /// [`ConnectionMonitor::last_error`]. A channel that is already connected
    /// or connecting is left untouched and `AlreadyConnected` is returned.
    pub async fn connect(&self, service_request_id: &str) -> RealtimeResult<()> {
        if self.channel.state() != ConnectionState::Disconnected {
            tracing::warn!(service_request_id = %service_request_id, "Already connected");
            return Err(RealtimeError::AlreadyConnected);
        }

        match self.try_connect(service_request_id).await {
            // Another connect won the race; its connection is not ours to drop
            Err(RealtimeError::AlreadyConnected) => {
                tracing::warn!(service_request_id = %service_request_id, "Already connected");
                Err(RealtimeError::AlreadyConnected)
            }
            Ok(()) => {
                *self.last_error.lock() = None;
                tracing::info!(service_request_id = %service_request_id, "Monitoring service request");
                Ok(())
            }
            Err(e) => {
                self.channel.disconnect();
                let message = format!("Connection failed: {e}");
                tracing::error!(service_request_id = %service_request_id, error = %e, "{message}");
                *self.last_error.lock() = Some(message);
                Err(e)
            }
        }
    }

    async fn try_connect(&self, service_request_id: &str) -> RealtimeResult<()> {
        let token = self.tokens.fetch_token(service_request_id).await?;
        self.channel.connect(&token).await?;
        self.register_listeners();
        self.channel
            .join_room(RoomScope::ServiceRequest, service_request_id)
            .await
    }

    fn register_listeners(&self) {
        let history = Arc::clone(&self.history);
        self.channel.on_typed(STATUS_CHANGED_EVENT, move |payload: StatusChangedPayload| {
            tracing::info!(
                event_id = %payload.event_id,
                sequence = payload.sequence,
                status = payload.status.map_or("unknown", |s| s.as_str()),
                "Status changed"
            );
            history.push(status_change_message(&payload, OffsetDateTime::now_utc()));
        });

        let history = Arc::clone(&self.history);
        self.channel.on_any(wildcard_listener(move |envelope| {
            if let Some(message) = envelope_message(envelope) {
                tracing::info!(event = %envelope.event_type, "Event received");
                history.push(message);
            }
        }));
    }

    /// Drop the connection and every listener
    pub fn disconnect(&self) {
        self.channel.disconnect();
    }

    pub fn is_connected(&self) -> bool {
        self.channel.is_connected()
    }

    pub fn status_label(&self) -> &'static str {
        if self.is_connected() {
            "Connected"
        } else {
            "Disconnected"
        }
    }

    pub fn last_error(&self) -> Option<String> {
        self.last_error.lock().clone()
    }

    pub fn history(&self) -> &Arc<EventHistory> {
        &self.history
    }

    pub fn channel(&self) -> &EventChannel {
        &self.channel
    }

    pub fn subscribe_status(&self) -> broadcast::Receiver<ChannelStatus> {
        self.channel.subscribe_status()
    }
}

fn status_change_message(payload: &StatusChangedPayload, received_at: OffsetDateTime) -> EventMessage {
    let data = serde_json::to_value(payload).unwrap_or_default();
    EventMessage::from_status_change(payload, data, received_at)
}

/// History entry for a wildcard delivery; status changes are recorded by their own listener
fn envelope_message(envelope: &Envelope) -> Option<EventMessage> {
    if envelope.event_type == STATUS_CHANGED_EVENT {
        return None;
    }
    Some(EventMessage::from_payload(
        envelope.event_type.clone(),
        envelope.data.clone(),
        envelope.received_at,
    ))
}
