use std::collections::HashSet;
use std::path::Path;

use meshrelay_node::{DeviceRole, RouterConfig};
use serde::{Deserialize, Serialize};

use crate::error::SimError;

pub const DEFAULT_DURATION_MS: u32 = 60_000;
pub const DEFAULT_STEP_MS: u32 = 100;
pub const DEFAULT_BACKOFF_MS: u32 = 1_000;

fn default_duration() -> u32 {
    DEFAULT_DURATION_MS
}

fn default_step() -> u32 {
    DEFAULT_STEP_MS
}

fn default_backoff() -> u32 {
    DEFAULT_BACKOFF_MS
}

/// A simulated node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeSpec {
    pub num: u32,
    /// Overrides the shared router role.
    #[serde(default)]
    pub role: Option<DeviceRole>,
}

/// A radio link between two nodes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkSpec {
    pub a: u32,
    pub b: u32,
    /// Chance in percent that a frame on this link is lost.
    #[serde(default)]
    pub loss_percent: u8,
    /// Only `a` can be heard by `b`.
    #[serde(default)]
    pub one_way: bool,
}

/// A message injected at a given time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageSpec {
    pub at_ms: u32,
    pub from: u32,
    /// Destination node; broadcast when absent.
    #[serde(default)]
    pub to: Option<u32>,
    #[serde(default)]
    pub want_ack: bool,
    #[serde(default)]
    pub text: String,
}

/// Simulation scenario as read from TOML.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Scenario {
    #[serde(default)]
    pub seed: u64,
    #[serde(default = "default_duration")]
    pub duration_ms: u32,
    #[serde(default = "default_step")]
    pub step_ms: u32,
    /// Retransmission backoff reported by every simulated radio.
    #[serde(default = "default_backoff")]
    pub backoff_ms: u32,
    #[serde(default)]
    pub router: RouterConfig,
    pub nodes: Vec<NodeSpec>,
    #[serde(default)]
    pub links: Vec<LinkSpec>,
    #[serde(default)]
    pub messages: Vec<MessageSpec>,
}

impl Scenario {
    pub fn from_toml_str(input: &str) -> Result<Self, SimError> {
        let scenario: Scenario = toml::from_str(input)?;
        scenario.validate()?;
        Ok(scenario)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, SimError> {
        let input = std::fs::read_to_string(path)?;
        Self::from_toml_str(&input)
    }

    pub fn validate(&self) -> Result<(), SimError> {
        self.router.validate()?;
        if self.step_ms == 0 {
            return Err(SimError::InvalidScenario("step_ms must be non-zero"));
        }
        if self.nodes.is_empty() {
            return Err(SimError::InvalidScenario("no nodes"));
        }

        let mut nums = HashSet::new();
        for node in &self.nodes {
            if node.num == 0 || node.num == u32::MAX {
                return Err(SimError::InvalidScenario("reserved node number"));
            }
            if !nums.insert(node.num) {
                return Err(SimError::DuplicateNode(node.num));
            }
        }
        let known = |num: u32| {
            if nums.contains(&num) {
                Ok(())
            } else {
                Err(SimError::UnknownNode(num))
            }
        };

        for link in &self.links {
            known(link.a)?;
            known(link.b)?;
            if link.a == link.b {
                return Err(SimError::InvalidScenario("link to self"));
            }
            if link.loss_percent > 100 {
                return Err(SimError::InvalidScenario("loss_percent above 100"));
            }
        }
        for message in &self.messages {
            known(message.from)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use meshrelay_node::DeviceRole;

    use super::{Scenario, DEFAULT_STEP_MS};
    use crate::error::SimError;

    const LINE: &str = r#"
        seed = 7
        duration_ms = 5000

        [router]
        hop_limit = 3

        [[nodes]]
        num = 10

        [[nodes]]
        num = 20
        role = "router"

        [[links]]
        a = 10
        b = 20
        loss_percent = 10

        [[messages]]
        at_ms = 0
        from = 10
        to = 20
        want_ack = true
        text = "hello"
    "#;

    #[test]
    fn parses_line_scenario_with_defaults() {
        let scenario = Scenario::from_toml_str(LINE).expect("scenario should parse");
        assert_eq!(scenario.seed, 7);
        assert_eq!(scenario.step_ms, DEFAULT_STEP_MS);
        assert_eq!(scenario.nodes[1].role, Some(DeviceRole::Router));
        assert_eq!(scenario.links[0].loss_percent, 10);
        assert!(!scenario.links[0].one_way);
        assert_eq!(scenario.messages[0].to, Some(20));
    }

    #[test]
    fn rejects_links_to_unknown_nodes() {
        let input = LINE.replace("b = 20", "b = 30");
        assert!(matches!(
            Scenario::from_toml_str(&input),
            Err(SimError::UnknownNode(30))
        ));
    }

    #[test]
    fn rejects_duplicate_nodes_and_bad_router_config() {
        let input = LINE.replace("num = 20", "num = 10");
        assert!(matches!(
            Scenario::from_toml_str(&input),
            Err(SimError::DuplicateNode(10))
        ));

        let input = LINE.replace("hop_limit = 3", "hop_limit = 9");
        assert!(matches!(
            Scenario::from_toml_str(&input),
            Err(SimError::Config(_))
        ));
    }
}
