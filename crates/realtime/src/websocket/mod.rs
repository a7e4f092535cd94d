//! Socket.IO event channel for service request updates
//!
//! Connects to the backend's realtime endpoint, joins the room of one service
//! request and fans inbound events out to registered listeners.
//!
//! # Architecture
//!
//! - **Channel**: Public handle; lifecycle, room join and listener registration
//! - **Connection**: One authenticated namespace session and its transport task
//! - **Packet**: Engine.IO / Socket.IO text frame codec
//! - **Registry**: Named and wildcard listeners, panic-isolated dispatch
//! - **Room**: Single-room membership and the second-join policy
//! - **State**: Connection state and lifecycle notifications
//! - **Events**: Join request/ack and wildcard envelope shapes

pub mod channel;
pub mod connection;
pub mod events;
pub mod packet;
pub mod registry;
pub mod room;
pub mod state;

pub use channel::EventChannel;
pub use events::Envelope;
pub use registry::{listener, wildcard_listener, Listener, WildcardListener};
pub use room::{Room, RoomPolicy};
pub use state::{ChannelStatus, ConnectionState, DisconnectReason};
