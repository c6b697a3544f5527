//! Deterministic multi-node simulator for the meshrelay routing stack.
//!
//! Nodes exchange CBOR-encoded frames over configurable lossy links. Runs
//! are driven by TOML scenarios and summarised in a serialisable report.

pub mod air;
pub mod error;
pub mod mesh;
pub mod scenarios;

pub use error::SimError;
pub use mesh::{run_scenario, AirRecord, MessageOutcome, NodeReport, SimMesh, SimNode, SimReport};
pub use scenarios::Scenario;
