//! Dispatch realtime client
//!
//! Token provider and Socket.IO event channel for service request updates.

pub mod config;
pub mod error;
pub mod token;
pub mod websocket;

pub use config::{ChannelConfig, Config, ConfigError};
pub use error::{RealtimeError, RealtimeResult};
pub use token::TokenClient;
pub use websocket::{
    listener, wildcard_listener, ChannelStatus, ConnectionState, DisconnectReason, Envelope,
    EventChannel, Listener, Room, RoomPolicy, WildcardListener,
};
