//! Engine.IO v4 / Socket.IO v5 text packet codec
//!
//! Every WebSocket text frame is one Engine.IO packet. Socket.IO packets ride
//! inside Engine.IO `message` packets:
//!
//! ```text
//! 4  2  /customer,  12  ["join",{"resourceId":"sr-1","scope":"service_request"}]
//! |  |  |           |   |
//! |  |  namespace   ack payload
//! |  socket.io type
//! engine.io type
//! ```
//!
//! Binary attachments are not supported.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Socket.IO's default namespace, omitted on the wire
const ROOT_NAMESPACE: &str = "/";

#[derive(Debug, thiserror::Error)]
pub enum PacketError {
    #[error("Empty packet")]
    Empty,
    #[error("Unknown {layer} packet type '{kind}'")]
    UnknownType { layer: &'static str, kind: char },
    #[error("Unsupported packet: {0}")]
    Unsupported(&'static str),
    #[error("Invalid ack id")]
    InvalidAckId,
    #[error("Invalid JSON payload: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Malformed event: {0}")]
    MalformedEvent(&'static str),
}

// =============================================================================
// Engine.IO
// =============================================================================

/// Parameters the server sends in the Engine.IO `open` packet
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenHandshake {
    pub sid: String,
    #[serde(default)]
    pub upgrades: Vec<String>,
    pub ping_interval: u64,
    pub ping_timeout: u64,
    #[serde(default)]
    pub max_payload: Option<u64>,
}

/// One Engine.IO packet (one WebSocket text frame)
#[derive(Debug, Clone, PartialEq)]
pub enum EnginePacket {
    Open(OpenHandshake),
    Close,
    Ping(String),
    Pong(String),
    Message(SocketPacket),
    Upgrade,
    Noop,
}

impl EnginePacket {
    pub fn decode(frame: &str) -> Result<Self, PacketError> {
        let mut chars = frame.chars();
        let kind = chars.next().ok_or(PacketError::Empty)?;
        let rest = chars.as_str();

        match kind {
            '0' => Ok(EnginePacket::Open(serde_json::from_str(rest)?)),
            '1' => Ok(EnginePacket::Close),
            '2' => Ok(EnginePacket::Ping(rest.to_string())),
            '3' => Ok(EnginePacket::Pong(rest.to_string())),
            '4' => Ok(EnginePacket::Message(SocketPacket::decode(rest)?)),
            '5' => Ok(EnginePacket::Upgrade),
            '6' => Ok(EnginePacket::Noop),
            other => Err(PacketError::UnknownType {
                layer: "engine.io",
                kind: other,
            }),
        }
    }

    pub fn encode(&self) -> String {
        match self {
            EnginePacket::Open(handshake) => {
                format!("0{}", serde_json::to_string(handshake).unwrap_or_default())
            }
            EnginePacket::Close => "1".to_string(),
            EnginePacket::Ping(data) => format!("2{data}"),
            EnginePacket::Pong(data) => format!("3{data}"),
            EnginePacket::Message(packet) => format!("4{}", packet.encode()),
            EnginePacket::Upgrade => "5".to_string(),
            EnginePacket::Noop => "6".to_string(),
        }
    }
}

// =============================================================================
// Socket.IO
// =============================================================================

/// Socket.IO packet types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SocketPacketKind {
    Connect,
    Disconnect,
    Event,
    Ack,
    ConnectError,
}

impl SocketPacketKind {
    fn code(self) -> char {
        match self {
            SocketPacketKind::Connect => '0',
            SocketPacketKind::Disconnect => '1',
            SocketPacketKind::Event => '2',
            SocketPacketKind::Ack => '3',
            SocketPacketKind::ConnectError => '4',
        }
    }
}

/// One Socket.IO packet
#[derive(Debug, Clone, PartialEq)]
pub struct SocketPacket {
    pub kind: SocketPacketKind,
    pub namespace: String,
    pub ack_id: Option<u64>,
    pub data: Option<Value>,
}

impl SocketPacket {
    /// CONNECT to a namespace, carrying the auth payload
    pub fn connect(namespace: &str, auth: Value) -> Self {
        Self {
            kind: SocketPacketKind::Connect,
            namespace: namespace.to_string(),
            ack_id: None,
            data: Some(auth),
        }
    }

    pub fn disconnect(namespace: &str) -> Self {
        Self {
            kind: SocketPacketKind::Disconnect,
            namespace: namespace.to_string(),
            ack_id: None,
            data: None,
        }
    }

    /// EVENT `[name, payload]`, optionally requesting an acknowledgement
    pub fn event(namespace: &str, name: &str, payload: Value, ack_id: Option<u64>) -> Self {
        Self {
            kind: SocketPacketKind::Event,
            namespace: namespace.to_string(),
            ack_id,
            data: Some(Value::Array(vec![Value::String(name.to_string()), payload])),
        }
    }

    pub fn ack(namespace: &str, ack_id: u64, args: Vec<Value>) -> Self {
        Self {
            kind: SocketPacketKind::Ack,
            namespace: namespace.to_string(),
            ack_id: Some(ack_id),
            data: Some(Value::Array(args)),
        }
    }

    pub fn decode(input: &str) -> Result<Self, PacketError> {
        let mut chars = input.chars();
        let kind = match chars.next().ok_or(PacketError::Empty)? {
            '0' => SocketPacketKind::Connect,
            '1' => SocketPacketKind::Disconnect,
            '2' => SocketPacketKind::Event,
            '3' => SocketPacketKind::Ack,
            '4' => SocketPacketKind::ConnectError,
            '5' | '6' => return Err(PacketError::Unsupported("binary attachments")),
            other => {
                return Err(PacketError::UnknownType {
                    layer: "socket.io",
                    kind: other,
                })
            }
        };
        let mut rest = chars.as_str();

        let namespace = if rest.starts_with('/') {
            match rest.find(',') {
                Some(idx) => {
                    let namespace = &rest[..idx];
                    rest = &rest[idx + 1..];
                    namespace
                }
                None => {
                    let namespace = rest;
                    rest = "";
                    namespace
                }
            }
        } else {
            ROOT_NAMESPACE
        };

        let digits = rest.bytes().take_while(u8::is_ascii_digit).count();
        let ack_id = if digits > 0 {
            let id = rest[..digits]
                .parse()
                .map_err(|_| PacketError::InvalidAckId)?;
            rest = &rest[digits..];
            Some(id)
        } else {
            None
        };

        let data = if rest.is_empty() {
            None
        } else {
            Some(serde_json::from_str(rest)?)
        };

        Ok(Self {
            kind,
            namespace: namespace.to_string(),
            ack_id,
            data,
        })
    }

    pub fn encode(&self) -> String {
        let mut out = String::new();
        out.push(self.kind.code());
        if self.namespace != ROOT_NAMESPACE && !self.namespace.is_empty() {
            out.push_str(&self.namespace);
            out.push(',');
        }
        if let Some(id) = self.ack_id {
            out.push_str(&id.to_string());
        }
        if let Some(data) = &self.data {
            out.push_str(&data.to_string());
        }
        out
    }

    /// Wrap in an Engine.IO `message` and encode as a frame
    pub fn into_frame(self) -> String {
        EnginePacket::Message(self).encode()
    }
}

/// A server-pushed named event, validated before dispatch
#[derive(Debug, Clone, PartialEq)]
pub struct InboundEvent {
    pub name: String,
    /// First argument after the name, `null` when the server sent none
    pub payload: Value,
}

impl InboundEvent {
    /// Extract `[name, payload, ...]` from EVENT packet data
    pub fn from_data(data: Option<Value>) -> Result<Self, PacketError> {
        let Some(Value::Array(args)) = data else {
            return Err(PacketError::MalformedEvent("data is not an array"));
        };
        let mut args = args.into_iter();
        let name = match args.next() {
            Some(Value::String(name)) if !name.is_empty() => name,
            Some(Value::String(_)) => return Err(PacketError::MalformedEvent("empty event name")),
            _ => return Err(PacketError::MalformedEvent("event name is not a string")),
        };

        Ok(Self {
            name,
            payload: args.next().unwrap_or(Value::Null),
        })
    }
}
