//! Core meshrelay primitives shared across crates.
//!
//! Includes node/packet identifiers, the in-memory mesh packet, routing
//! error codes, and the packet id generator.

pub mod error;
pub mod ids;
pub mod packet;
pub mod types;

pub use error::{RoutingError, SendError};
pub use packet::{MeshPacket, Payload};
pub use types::{
    GlobalPacketId, NodeNum, PacketId, RelayId, HOP_LIMIT_DEFAULT, HOP_LIMIT_MAX,
};
