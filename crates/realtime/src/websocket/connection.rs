//! WebSocket connection management
//!
//! One [`Connection`] is one authenticated Socket.IO namespace session over a
//! single WebSocket. A background task owns the socket; the connection handle
//! talks to it through a command channel.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use super::packet::{EnginePacket, InboundEvent, OpenHandshake, SocketPacket, SocketPacketKind};
use super::state::DisconnectReason;
use crate::config::ChannelConfig;
use crate::error::{RealtimeError, RealtimeResult};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Receives what the transport task reads off the wire
pub(crate) trait InboundSink: Send + Sync + 'static {
    /// A validated named event arrived
    fn deliver(&self, generation: u64, event: InboundEvent);

    /// The transport ended; called exactly once per connection
    fn closed(&self, generation: u64, reason: DisconnectReason);
}

/// Commands from the connection handle to the transport task
enum Outbound {
    EmitWithAck {
        event: String,
        payload: Value,
        reply: oneshot::Sender<Value>,
    },
    Close,
}

/// Represents an active, authenticated connection
#[derive(Debug)]
pub struct Connection {
    /// Session ID the server assigned to the namespace connection
    pub session_id: String,

    outbound: mpsc::UnboundedSender<Outbound>,

    _task: JoinHandle<()>,
}

impl Connection {
    /// Open the WebSocket, authenticate the namespace and start the transport task
    pub(crate) async fn open(
        config: &ChannelConfig,
        token: &str,
        generation: u64,
        sink: Arc<dyn InboundSink>,
    ) -> RealtimeResult<Self> {
        let url = config.socket_url();
        let handshake = tokio::time::timeout(
            config.connect_timeout,
            handshake(&url, &config.namespace, token),
        )
        .await
        .map_err(|_| {
            RealtimeError::HandshakeFailure(format!(
                "no handshake response within {:?}",
                config.connect_timeout
            ))
        })??;

        let heartbeat = Duration::from_millis(
            handshake
                .open
                .ping_interval
                .saturating_add(handshake.open.ping_timeout),
        );

        tracing::debug!(
            engine_sid = %handshake.open.sid,
            session_id = %handshake.session_id,
            heartbeat = ?heartbeat,
            "Namespace handshake complete"
        );

        let (tx, rx) = mpsc::unbounded_channel();
        let transport = Transport {
            namespace: config.namespace.clone(),
            generation,
            heartbeat,
            sink,
        };
        let task = tokio::spawn(transport.run(handshake.ws, rx));

        Ok(Self {
            session_id: handshake.session_id,
            outbound: tx,
            _task: task,
        })
    }

    /// Emit an event that expects one acknowledgement
    ///
    /// The receiver yields the ack arguments, or errors if the transport ends first.
    pub(crate) fn emit_with_ack(
        &self,
        event: &str,
        payload: Value,
    ) -> RealtimeResult<oneshot::Receiver<Value>> {
        let (reply, rx) = oneshot::channel();
        self.outbound
            .send(Outbound::EmitWithAck {
                event: event.to_string(),
                payload,
                reply,
            })
            .map_err(|_| RealtimeError::NotConnected)?;
        Ok(rx)
    }

    /// Leave the namespace and close the socket
    pub(crate) fn close(self) {
        if self.outbound.send(Outbound::Close).is_err() {
            tracing::debug!(session_id = %self.session_id, "Transport already closed");
        }
    }
}

// =============================================================================
// Handshake
// =============================================================================

struct Handshake {
    ws: WsStream,
    open: OpenHandshake,
    session_id: String,
}

async fn handshake(url: &str, namespace: &str, token: &str) -> RealtimeResult<Handshake> {
    let (mut ws, _response) = connect_async(url)
        .await
        .map_err(|e| RealtimeError::HandshakeFailure(e.to_string()))?;

    let open = loop {
        match next_packet(&mut ws).await? {
            EnginePacket::Open(open) => break open,
            other => tracing::debug!(packet = ?other, "Ignoring packet before open"),
        }
    };

    // The token travels with CONNECT, never as an application event
    let connect = SocketPacket::connect(namespace, json!({ "token": token }));
    send_frame(&mut ws, connect.into_frame()).await?;

    loop {
        match next_packet(&mut ws).await? {
            EnginePacket::Ping(data) => send_frame(&mut ws, EnginePacket::Pong(data).encode()).await?,
            EnginePacket::Close => {
                return Err(RealtimeError::HandshakeFailure(
                    "server closed the session".to_string(),
                ))
            }
            EnginePacket::Message(packet) if packet.namespace == namespace => match packet.kind {
                SocketPacketKind::Connect => {
                    let session_id = packet
                        .data
                        .as_ref()
                        .and_then(|d| d.get("sid"))
                        .and_then(Value::as_str)
                        .unwrap_or(open.sid.as_str())
                        .to_string();
                    return Ok(Handshake {
                        ws,
                        open,
                        session_id,
                    });
                }
                SocketPacketKind::ConnectError => {
                    let reason = packet
                        .data
                        .as_ref()
                        .and_then(|d| d.get("message").and_then(Value::as_str).or(d.as_str()))
                        .unwrap_or("connection refused")
                        .to_string();
                    return Err(RealtimeError::HandshakeFailure(reason));
                }
                kind => tracing::debug!(kind = ?kind, "Ignoring packet during handshake"),
            },
            other => tracing::debug!(packet = ?other, "Ignoring packet during handshake"),
        }
    }
}

async fn next_packet(ws: &mut WsStream) -> RealtimeResult<EnginePacket> {
    loop {
        match ws.next().await {
            Some(Ok(Message::Text(text))) => return Ok(EnginePacket::decode(&text)?),
            Some(Ok(Message::Close(_))) | None => {
                return Err(RealtimeError::HandshakeFailure(
                    "connection closed during handshake".to_string(),
                ))
            }
            Some(Ok(_)) => continue,
            Some(Err(e)) => return Err(RealtimeError::HandshakeFailure(e.to_string())),
        }
    }
}

async fn send_frame(ws: &mut WsStream, frame: String) -> RealtimeResult<()> {
    ws.send(Message::Text(frame.into()))
        .await
        .map_err(|e| RealtimeError::HandshakeFailure(e.to_string()))
}

// =============================================================================
// Transport task
// =============================================================================

/// Emits waiting for an acknowledgement, keyed by ack id
#[derive(Default)]
struct PendingAcks {
    next_id: u64,
    waiting: HashMap<u64, oneshot::Sender<Value>>,
}

impl PendingAcks {
    /// Allocate an ack id for `reply`, forgetting requests whose caller gave up
    fn register(&mut self, reply: oneshot::Sender<Value>) -> u64 {
        self.waiting.retain(|_, tx| !tx.is_closed());
        let id = self.next_id;
        self.next_id += 1;
        self.waiting.insert(id, reply);
        id
    }

    /// Hand `args` to the request with `id`; false if none is waiting
    fn resolve(&mut self, id: u64, args: Value) -> bool {
        match self.waiting.remove(&id) {
            Some(reply) => {
                let _ = reply.send(args);
                true
            }
            None => false,
        }
    }

    fn len(&self) -> usize {
        self.waiting.len()
    }
}

struct Transport {
    namespace: String,
    generation: u64,
    heartbeat: Duration,
    sink: Arc<dyn InboundSink>,
}

/// What the loop must do after handling one inbound packet
enum Step {
    Continue,
    Reply(String),
    Stop(DisconnectReason),
}

impl Transport {
    async fn run(self, ws: WsStream, mut outbound: mpsc::UnboundedReceiver<Outbound>) {
        let (mut ws_tx, mut ws_rx) = ws.split();
        let mut pending = PendingAcks::default();

        let deadline = tokio::time::sleep(self.heartbeat);
        tokio::pin!(deadline);

        let reason = loop {
            tokio::select! {
                cmd = outbound.recv() => match cmd {
                    Some(Outbound::EmitWithAck { event, payload, reply }) => {
                        let ack_id = pending.register(reply);
                        let frame = SocketPacket::event(&self.namespace, &event, payload, Some(ack_id))
                            .into_frame();
                        tracing::debug!(event = %event, ack_id, "Emitting event");
                        if let Err(e) = ws_tx.send(Message::Text(frame.into())).await {
                            break DisconnectReason::TransportError(e.to_string());
                        }
                    }
                    // Handle dropped or explicit close
                    Some(Outbound::Close) | None => {
                        let leave = SocketPacket::disconnect(&self.namespace).into_frame();
                        let _ = ws_tx.send(Message::Text(leave.into())).await;
                        let _ = ws_tx.send(Message::Close(None)).await;
                        break DisconnectReason::ClientRequested;
                    }
                },
                msg = ws_rx.next() => match msg {
                    Some(Ok(Message::Text(text))) => {
                        deadline.as_mut().reset(Instant::now() + self.heartbeat);
                        match self.handle_frame(&text, &mut pending) {
                            Step::Continue => {}
                            Step::Reply(frame) => {
                                if let Err(e) = ws_tx.send(Message::Text(frame.into())).await {
                                    break DisconnectReason::TransportError(e.to_string());
                                }
                            }
                            Step::Stop(reason) => break reason,
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break DisconnectReason::TransportClosed,
                    Some(Ok(_)) => {} // Binary frames are not part of this protocol
                    Some(Err(e)) => break DisconnectReason::TransportError(e.to_string()),
                },
                () = &mut deadline => break DisconnectReason::HeartbeatTimeout,
            }
        };

        if reason.is_involuntary() {
            tracing::warn!(
                namespace = %self.namespace,
                reason = %reason,
                pending_acks = pending.len(),
                "WebSocket transport ended"
            );
        } else {
            tracing::debug!(namespace = %self.namespace, "WebSocket transport closed");
        }

        // Dropping pending senders fails any join still waiting for its ack
        drop(pending);
        self.sink.closed(self.generation, reason);
    }

    fn handle_frame(&self, text: &str, pending: &mut PendingAcks) -> Step {
        let packet = match EnginePacket::decode(text) {
            Ok(packet) => packet,
            Err(e) => {
                tracing::warn!(error = %e, frame = %text, "Dropping undecodable frame");
                return Step::Continue;
            }
        };

        let packet = match packet {
            EnginePacket::Ping(data) => return Step::Reply(EnginePacket::Pong(data).encode()),
            EnginePacket::Close => return Step::Stop(DisconnectReason::TransportClosed),
            EnginePacket::Message(packet) => packet,
            _ => return Step::Continue,
        };

        if packet.namespace != self.namespace {
            tracing::debug!(namespace = %packet.namespace, "Ignoring packet for another namespace");
            return Step::Continue;
        }

        match packet.kind {
            SocketPacketKind::Event => {
                // Catch-all: every named event passes through here before dispatch
                match InboundEvent::from_data(packet.data) {
                    Ok(event) => {
                        tracing::debug!(event = %event.name, "Received event");
                        self.sink.deliver(self.generation, event);
                    }
                    Err(e) => tracing::warn!(error = %e, "Dropping malformed event"),
                }
                Step::Continue
            }
            SocketPacketKind::Ack => {
                let args = packet.data.unwrap_or_else(|| Value::Array(Vec::new()));
                if !packet.ack_id.is_some_and(|id| pending.resolve(id, args)) {
                    tracing::debug!(ack_id = ?packet.ack_id, "Ack with no pending request");
                }
                Step::Continue
            }
            SocketPacketKind::Disconnect => Step::Stop(DisconnectReason::ServerDisconnect),
            SocketPacketKind::ConnectError => {
                tracing::warn!(data = ?packet.data, "Connect error after handshake");
                Step::Continue
            }
            SocketPacketKind::Connect => Step::Continue,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_ack_resolves_waiting_request() {
        let mut pending = PendingAcks::default();
        let (tx, rx) = oneshot::channel();
        let id = pending.register(tx);

        assert!(pending.resolve(id, json!([{"success": true}])));
        assert_eq!(rx.await.unwrap(), json!([{"success": true}]));
        assert!(!pending.resolve(id, Value::Null));
        assert_eq!(pending.len(), 0);
    }

    #[test]
    fn test_abandoned_requests_are_pruned() {
        let mut pending = PendingAcks::default();
        for _ in 0..3 {
            let (tx, rx) = oneshot::channel::<Value>();
            pending.register(tx);
            // The caller timed out and dropped its receiver
            drop(rx);
        }

        let (tx, _rx) = oneshot::channel();
        let id = pending.register(tx);
        assert_eq!(id, 3);
        assert_eq!(pending.len(), 1);
    }
}
