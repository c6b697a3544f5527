//! Collaborator contracts for the meshrelay routing stack.
//!
//! The routing layers only depend on the radio, node database and packet
//! history traits defined in this crate. In-memory implementations back the
//! unit tests and the simulator.

pub mod adapter;
pub mod history;
pub mod nodedb;

pub use adapter::{InMemoryRadio, RadioHealthSnapshot, RadioTransport};
pub use history::{InMemoryPacketHistory, PacketHistory};
pub use nodedb::{InMemoryNodeDb, NodeDatabase};
