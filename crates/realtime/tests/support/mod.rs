//! In-process Socket.IO server for channel tests
//!
//! Speaks just enough Engine.IO v4 / Socket.IO v5 over a raw WebSocket to
//! drive the client through handshake, join and event delivery.

#![allow(dead_code, clippy::unwrap_used, clippy::expect_used)]

use std::time::Duration;

use dispatch_realtime::websocket::packet::{
    EnginePacket, OpenHandshake, SocketPacket, SocketPacketKind,
};
use dispatch_realtime::ChannelConfig;
use futures::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{accept_async, WebSocketStream};

pub const NAMESPACE: &str = "/customer";

const RECV_TIMEOUT: Duration = Duration::from_secs(5);

/// Listening mock server; accepts one client per `accept` call
pub struct MockServer {
    listener: TcpListener,
    pub url: String,
}

impl MockServer {
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}", listener.local_addr().unwrap());
        Self { listener, url }
    }

    pub fn channel_config(&self) -> ChannelConfig {
        ChannelConfig::new(&self.url)
            .with_connect_timeout(Duration::from_secs(2))
            .with_join_timeout(Duration::from_millis(500))
    }

    /// Accept a WebSocket client and send the Engine.IO open packet
    pub async fn accept(&self, ping_interval: u64, ping_timeout: u64) -> MockClient {
        let (stream, _) = self.listener.accept().await.unwrap();
        let ws = accept_async(stream).await.unwrap();
        let mut client = MockClient { ws };

        let open = EnginePacket::Open(OpenHandshake {
            sid: "engine-sid".to_string(),
            upgrades: Vec::new(),
            ping_interval,
            ping_timeout,
            max_payload: Some(1_000_000),
        });
        client.send_raw(open.encode()).await;
        client
    }

    /// Accept and complete the namespace handshake, returning the client's auth
    pub async fn accept_connected(&self) -> (MockClient, Value) {
        let mut client = self.accept(25_000, 20_000).await;
        let auth = client.expect_connect().await;
        client.accept_namespace("ns-sid").await;
        (client, auth)
    }
}

/// Server side of one accepted connection
pub struct MockClient {
    ws: WebSocketStream<TcpStream>,
}

impl MockClient {
    pub async fn send_raw(&mut self, frame: String) {
        self.ws.send(Message::Text(frame.into())).await.unwrap();
    }

    pub async fn send_packet(&mut self, packet: SocketPacket) {
        self.send_raw(packet.into_frame()).await;
    }

    /// Next text frame from the client, undecoded
    pub async fn recv_raw(&mut self) -> Option<String> {
        loop {
            let msg = tokio::time::timeout(RECV_TIMEOUT, self.ws.next())
                .await
                .expect("timed out waiting for client frame");
            match msg {
                Some(Ok(Message::Text(text))) => return Some(text.to_string()),
                Some(Ok(Message::Close(_))) | None | Some(Err(_)) => return None,
                Some(Ok(_)) => continue,
            }
        }
    }

    /// Next Socket.IO packet from the client, answering nothing
    pub async fn recv_packet(&mut self) -> Option<SocketPacket> {
        loop {
            let msg = tokio::time::timeout(RECV_TIMEOUT, self.ws.next())
                .await
                .expect("timed out waiting for client frame");
            match msg {
                Some(Ok(Message::Text(text))) => match EnginePacket::decode(&text).unwrap() {
                    EnginePacket::Message(packet) => return Some(packet),
                    _ => continue,
                },
                Some(Ok(Message::Close(_))) | None | Some(Err(_)) => return None,
                Some(Ok(_)) => continue,
            }
        }
    }

    /// Wait for the namespace CONNECT and return its auth payload
    pub async fn expect_connect(&mut self) -> Value {
        let packet = self.recv_packet().await.expect("client closed before CONNECT");
        assert_eq!(packet.kind, SocketPacketKind::Connect);
        assert_eq!(packet.namespace, NAMESPACE);
        packet.data.unwrap_or(Value::Null)
    }

    pub async fn accept_namespace(&mut self, sid: &str) {
        self.send_packet(SocketPacket {
            kind: SocketPacketKind::Connect,
            namespace: NAMESPACE.to_string(),
            ack_id: None,
            data: Some(json!({ "sid": sid })),
        })
        .await;
    }

    pub async fn reject_namespace(&mut self, message: &str) {
        self.send_packet(SocketPacket {
            kind: SocketPacketKind::ConnectError,
            namespace: NAMESPACE.to_string(),
            ack_id: None,
            data: Some(json!({ "message": message })),
        })
        .await;
    }

    /// Wait for an EVENT, returning its name, payload and ack id
    pub async fn expect_event(&mut self) -> (String, Value, Option<u64>) {
        let packet = self.recv_packet().await.expect("client closed before EVENT");
        assert_eq!(packet.kind, SocketPacketKind::Event);
        let mut args = match packet.data {
            Some(Value::Array(args)) => args.into_iter(),
            other => panic!("unexpected event data {other:?}"),
        };
        let name = args.next().and_then(|v| v.as_str().map(str::to_string)).unwrap();
        let payload = args.next().unwrap_or(Value::Null);
        (name, payload, packet.ack_id)
    }

    pub async fn ack(&mut self, ack_id: u64, response: Value) {
        self.send_packet(SocketPacket::ack(NAMESPACE, ack_id, vec![response]))
            .await;
    }

    pub async fn emit(&mut self, event: &str, payload: Value) {
        self.send_packet(SocketPacket::event(NAMESPACE, event, payload, None))
            .await;
    }

    /// Emit without caring whether the client is still listening
    pub async fn try_emit(&mut self, event: &str, payload: Value) {
        let frame = SocketPacket::event(NAMESPACE, event, payload, None).into_frame();
        let _ = self.ws.send(Message::Text(frame.into())).await;
    }

    pub async fn disconnect_namespace(&mut self) {
        self.send_packet(SocketPacket::disconnect(NAMESPACE)).await;
    }

    /// Answer the next join with `response`, returning the join payload
    pub async fn answer_join(&mut self, response: Value) -> Value {
        let (name, payload, ack_id) = self.expect_event().await;
        assert_eq!(name, "join");
        self.ack(ack_id.expect("join must request an ack"), response)
            .await;
        payload
    }
}
