//! The event channel: one connection, one room, many listeners
//!
//! [`EventChannel`] is a cheap handle over shared state; clones observe the
//! same connection and listener registry. Every connection attempt gets a new
//! generation number, and anything a superseded transport reports (events,
//! closes, late handshakes) is ignored.

use std::sync::{Arc, Weak};

use dispatch_shared::RoomScope;
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::sync::broadcast;

use super::connection::{Connection, InboundSink};
use super::events::{JoinAck, JoinRequest, JOIN_EVENT};
use super::packet::{InboundEvent, PacketError};
use super::registry::{listener, Listener, ListenerRegistry, WildcardListener};
use super::room::{Room, RoomSlot};
use super::state::{ChannelStatus, ConnectionState, DisconnectReason};
use crate::config::ChannelConfig;
use crate::error::{RealtimeError, RealtimeResult};

/// Capacity of the lifecycle notification channel
const STATUS_CHANNEL_CAPACITY: usize = 16;

/// Client for the backend's realtime event stream
#[derive(Clone)]
pub struct EventChannel {
    shared: Arc<Shared>,
}

struct Shared {
    config: ChannelConfig,
    registry: ListenerRegistry,
    link: Mutex<Link>,
    status_tx: broadcast::Sender<ChannelStatus>,
}

/// Connection-scoped state, always mutated under one lock
#[derive(Default)]
struct Link {
    state: ConnectionState,
    generation: u64,
    connection: Option<Connection>,
    room: RoomSlot,
}

impl Shared {
    fn publish(&self, status: ChannelStatus) {
        // No subscribers is fine
        let _ = self.status_tx.send(status);
    }
}

impl EventChannel {
    pub fn new(config: ChannelConfig) -> Self {
        let (status_tx, _) = broadcast::channel(STATUS_CHANNEL_CAPACITY);
        Self {
            shared: Arc::new(Shared {
                config,
                registry: ListenerRegistry::new(),
                link: Mutex::new(Link::default()),
                status_tx,
            }),
        }
    }

    pub fn config(&self) -> &ChannelConfig {
        &self.shared.config
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Open and authenticate the connection
    ///
    /// Resolves once the server has accepted `token` for the namespace.
    pub async fn connect(&self, token: &str) -> RealtimeResult<()> {
        if token.trim().is_empty() {
            return Err(RealtimeError::AuthenticationMissing);
        }

        let generation = {
            let mut link = self.shared.link.lock();
            if link.state != ConnectionState::Disconnected {
                return Err(RealtimeError::AlreadyConnected);
            }
            link.generation += 1;
            link.state = ConnectionState::Connecting;
            link.generation
        };
        self.shared.publish(ChannelStatus::Connecting);

        tracing::info!(
            url = %self.shared.config.url,
            namespace = %self.shared.config.namespace,
            "Connecting WebSocket"
        );

        let sink: Arc<dyn InboundSink> = Arc::new(ChannelSink {
            shared: Arc::downgrade(&self.shared),
        });
        let result = Connection::open(&self.shared.config, token, generation, sink).await;

        let mut link = self.shared.link.lock();
        if link.generation != generation {
            // disconnect() ran, or the transport died, while we were waiting
            drop(link);
            if let Ok(connection) = result {
                connection.close();
            }
            tracing::warn!("Connection attempt superseded before it completed");
            return Err(RealtimeError::ConnectAborted);
        }

        match result {
            Ok(connection) => {
                let session_id = connection.session_id.clone();
                link.state = ConnectionState::Connected;
                link.connection = Some(connection);
                drop(link);

                tracing::info!(session_id = %session_id, "WebSocket connected");
                self.shared.publish(ChannelStatus::Connected { session_id });
                Ok(())
            }
            Err(e) => {
                link.state = ConnectionState::Disconnected;
                drop(link);

                tracing::error!(error = %e, "WebSocket connection error");
                self.shared.publish(ChannelStatus::Disconnected {
                    reason: DisconnectReason::TransportError(e.to_string()),
                });
                Err(e)
            }
        }
    }

    /// Close the connection and drop every listener
    ///
    /// Safe to call at any time, any number of times.
    pub fn disconnect(&self) {
        let (previous, connection) = {
            let mut link = self.shared.link.lock();
            let previous = link.state;
            link.generation += 1;
            link.state = ConnectionState::Disconnected;
            link.room.vacate();
            (previous, link.connection.take())
        };
        self.shared.registry.clear();

        if let Some(connection) = connection {
            tracing::info!(session_id = %connection.session_id, "WebSocket disconnected");
            connection.close();
        }
        if previous != ConnectionState::Disconnected {
            self.shared.publish(ChannelStatus::Disconnected {
                reason: DisconnectReason::ClientRequested,
            });
        }
    }

    // =========================================================================
    // Rooms
    // =========================================================================

    /// Join the room for one resource and wait for the server's acknowledgement
    ///
    /// The room is reserved before the request is sent, so a concurrent join
    /// on any clone of this channel fails with `JoinInProgress`.
    pub async fn join_room(&self, scope: RoomScope, resource_id: &str) -> RealtimeResult<()> {
        let room = Room::new(scope, resource_id);

        let (generation, ack) = {
            let mut link = self.shared.link.lock();
            let link = &mut *link;
            let connection = match (&link.connection, link.state) {
                (Some(connection), ConnectionState::Connected) => connection,
                _ => return Err(RealtimeError::NotConnected),
            };
            link.room.reserve(self.shared.config.room_policy, &room)?;

            let request = JoinRequest {
                resource_id: resource_id.to_string(),
                scope,
            };
            let sent = serde_json::to_value(&request)
                .map_err(|e| RealtimeError::Protocol(PacketError::from(e)))
                .and_then(|payload| connection.emit_with_ack(JOIN_EVENT, payload));
            match sent {
                Ok(ack) => (link.generation, ack),
                Err(e) => {
                    link.room.release();
                    return Err(e);
                }
            }
        };

        tracing::debug!(room = %room, "Joining room");

        let timeout = self.shared.config.join_timeout;
        let args = match tokio::time::timeout(timeout, ack).await {
            Ok(Ok(args)) => args,
            Ok(Err(_)) => {
                self.release_room(generation);
                return Err(RealtimeError::NotConnected);
            }
            Err(_) => {
                tracing::warn!(room = %room, timeout = ?timeout, "Join acknowledgement timed out");
                self.release_room(generation);
                return Err(RealtimeError::JoinTimeout(timeout));
            }
        };

        let ack = JoinAck::from_args(&args);
        if !ack.success {
            let message = ack
                .message
                .unwrap_or_else(|| "Failed to join room".to_string());
            tracing::warn!(room = %room, reason = %message, "Room join rejected");
            self.release_room(generation);
            return Err(RealtimeError::JoinRejected(message));
        }

        let mut link = self.shared.link.lock();
        if link.generation != generation {
            return Err(RealtimeError::NotConnected);
        }
        link.room.occupy();
        tracing::info!(room = %room, "Successfully joined room");
        Ok(())
    }

    /// Drop this connection's pending join; a newer connection's slot is left alone
    fn release_room(&self, generation: u64) {
        let mut link = self.shared.link.lock();
        if link.generation == generation {
            link.room.release();
        }
    }

    pub fn current_room(&self) -> Option<Room> {
        self.shared.link.lock().room.current().cloned()
    }

    // =========================================================================
    // Listeners
    // =========================================================================

    /// Call `listener` with the raw payload of every `event`
    pub fn on(&self, event: &str, listener: Listener) {
        self.shared.registry.on(event, listener);
    }

    /// Call `listener` with an envelope for every event
    pub fn on_any(&self, listener: WildcardListener) {
        self.shared.registry.on_any(listener);
    }

    /// Call `callback` with each `event` payload parsed as `T`
    ///
    /// Payloads that do not parse are logged and skipped. The returned handle
    /// can be passed to [`EventChannel::off`].
    pub fn on_typed<T, F>(&self, event: &str, callback: F) -> Listener
    where
        T: DeserializeOwned + 'static,
        F: Fn(T) + Send + Sync + 'static,
    {
        let name = event.to_string();
        let handle = listener(move |payload: &Value| match serde_json::from_value::<T>(payload.clone()) {
            Ok(parsed) => callback(parsed),
            Err(e) => tracing::warn!(event = %name, error = %e, "Dropping malformed payload"),
        });
        self.on(event, Arc::clone(&handle));
        handle
    }

    /// Remove one registration of `listener`, or every listener for `event` when `None`
    pub fn off(&self, event: &str, listener: Option<&Listener>) {
        let removed = self.shared.registry.off(event, listener);
        tracing::debug!(event = %event, removed, "Removed listeners");
    }

    /// Wildcard counterpart of [`EventChannel::off`]
    pub fn off_any(&self, listener: Option<&WildcardListener>) {
        let removed = self.shared.registry.off_any(listener);
        tracing::debug!(removed, "Removed wildcard listeners");
    }

    pub fn listener_count(&self, event: &str) -> usize {
        self.shared.registry.listener_count(event)
    }

    pub fn wildcard_count(&self) -> usize {
        self.shared.registry.wildcard_count()
    }

    pub fn has_listeners(&self) -> bool {
        !self.shared.registry.is_empty()
    }

    // =========================================================================
    // Status
    // =========================================================================

    pub fn is_connected(&self) -> bool {
        self.shared.link.lock().state == ConnectionState::Connected
    }

    pub fn state(&self) -> ConnectionState {
        self.shared.link.lock().state
    }

    /// Session ID of the live connection
    pub fn session_id(&self) -> Option<String> {
        self.shared
            .link
            .lock()
            .connection
            .as_ref()
            .map(|c| c.session_id.clone())
    }

    /// Receive lifecycle notifications, including involuntary disconnects
    pub fn subscribe_status(&self) -> broadcast::Receiver<ChannelStatus> {
        self.shared.status_tx.subscribe()
    }
}

/// Bridges the transport task back to the channel without keeping it alive
struct ChannelSink {
    shared: Weak<Shared>,
}

impl InboundSink for ChannelSink {
    fn deliver(&self, generation: u64, event: InboundEvent) {
        let Some(shared) = self.shared.upgrade() else {
            return;
        };
        if shared.link.lock().generation != generation {
            tracing::debug!(event = %event.name, "Dropping event from stale connection");
            return;
        }

        let report = shared.registry.dispatch(&event.name, &event.payload);
        tracing::trace!(
            event = %event.name,
            named = report.named,
            wildcard = report.wildcard,
            faults = report.faults,
            "Dispatched event"
        );
    }

    fn closed(&self, generation: u64, reason: DisconnectReason) {
        let Some(shared) = self.shared.upgrade() else {
            return;
        };

        let connection = {
            let mut link = shared.link.lock();
            if link.generation != generation {
                return;
            }
            link.generation += 1;
            link.state = ConnectionState::Disconnected;
            link.room.vacate();
            link.connection.take()
        };

        tracing::warn!(
            session_id = ?connection.as_ref().map(|c| c.session_id.as_str()),
            reason = %reason,
            "WebSocket disconnected"
        );
        shared.publish(ChannelStatus::Disconnected { reason });
    }
}
