use meshrelay_node::ConfigError;
use thiserror::Error;

/// Errors raised while loading or running a simulation.
#[derive(Debug, Error)]
pub enum SimError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("scenario parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("invalid router config: {0}")]
    Config(#[from] ConfigError),
    #[error("node {0} declared twice")]
    DuplicateNode(u32),
    #[error("unknown node {0}")]
    UnknownNode(u32),
    #[error("invalid scenario: {0}")]
    InvalidScenario(&'static str),
}
