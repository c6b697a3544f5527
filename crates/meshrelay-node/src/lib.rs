//! meshrelay routing stack.
//!
//! Layers flood-based broadcast, learned next-hop unicast forwarding and
//! end-to-end reliable delivery on top of a lossy radio. Inbound packets run
//! through a fixed stage pipeline; outbound packets go down the send chain
//! `reliable → next_hop → flooding → radio`.

pub mod config;
pub mod flooding;
pub mod next_hop;
pub mod pending;
pub mod reliable;
pub mod retransmit;
pub mod router;
pub mod seen;
pub mod stage;
pub mod state;

#[cfg(test)]
mod test_support;

pub use config::{
    ConfigError, DedupScope, DeviceRole, NextHopLearningPolicy, RouterConfig,
    INTERMEDIATE_RETRIES, RELIABLE_RETRIES,
};
pub use router::Router;
pub use stage::{DropReason, InboundOutcome};
pub use state::{RouterEvent, RouterStats};
