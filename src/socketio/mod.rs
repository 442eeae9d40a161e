//! Socket.IO channel
//!
//! Minimal Socket.IO v5 client (Engine.IO v4, websocket transport only):
//! namespace connect, events, acknowledgements, heartbeat and reconnection.

pub mod client;
pub mod packet;

pub use client::{Ack, ChannelError, ChannelEvent, ClientOptions, Emitter, Outbound, SocketClient};
pub use packet::{EnginePacket, Packet, PacketError, PacketKind, DEFAULT_NAMESPACE};
