use std::collections::{BTreeMap, HashMap};

use meshrelay_core::{MeshPacket, NodeNum, PacketId, RelayId, RoutingError, SendError};
use meshrelay_node::{DeviceRole, Router, RouterConfig, RouterEvent, RouterStats};
use meshrelay_transport::{InMemoryNodeDb, InMemoryPacketHistory, InMemoryRadio, NodeDatabase};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::air::{decode_frame, encode_frame};
use crate::error::SimError;
use crate::scenarios::{MessageSpec, Scenario, DEFAULT_BACKOFF_MS, DEFAULT_STEP_MS};

pub type SimRouter = Router<InMemoryRadio, InMemoryNodeDb, InMemoryPacketHistory>;

const HISTORY_CAPACITY: usize = 100;

/// One simulated node and everything it reported.
pub struct SimNode {
    pub num: NodeNum,
    pub router: SimRouter,
    pub events: Vec<RouterEvent>,
    inbox: Vec<Vec<u8>>,
}

impl SimNode {
    /// Packets handed up to the application, in arrival order.
    pub fn received(&self) -> impl Iterator<Item = &MeshPacket> {
        self.events.iter().filter_map(|event| match event {
            RouterEvent::Received(packet) => Some(packet),
            _ => None,
        })
    }

    pub fn learned_next_hop(&self, node: NodeNum) -> Option<RelayId> {
        self.router.node_db().learned_next_hop(node)
    }
}

/// A frame put on the air by a node.
#[derive(Debug, Clone, Serialize)]
pub struct AirRecord {
    pub at_ms: u32,
    pub sender: u32,
    pub packet: MeshPacket,
}

#[derive(Debug, Clone, Serialize)]
pub struct MessageOutcome {
    pub from: u32,
    pub to: Option<u32>,
    pub id: PacketId,
    pub want_ack: bool,
    pub sent_at_ms: u32,
    pub send_error: Option<String>,
    /// Nodes whose application received the message.
    pub delivered_to: Vec<u32>,
    /// `Some(true)` once acknowledged, `Some(false)` once failed.
    pub acked: Option<bool>,
    pub failure: Option<RoutingError>,
}

#[derive(Debug, Clone, Serialize)]
pub struct NodeReport {
    pub num: u32,
    pub stats: RouterStats,
    pub pending: usize,
    pub learned_routes: Vec<(u32, u8)>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SimReport {
    pub seed: u64,
    pub elapsed_ms: u32,
    pub frames_sent: u64,
    pub frames_lost: u64,
    pub frames_malformed: u64,
    pub messages: Vec<MessageOutcome>,
    pub nodes: Vec<NodeReport>,
}

#[derive(Debug, Clone)]
struct SentMessage {
    spec: MessageSpec,
    id: PacketId,
    sent_at_ms: u32,
    send_error: Option<SendError>,
}

/// Multi-node mesh over shared in-memory air.
///
/// Each step fires due retransmissions, moves every queued frame to the
/// nodes in range (subject to link loss) and lets receivers process them.
pub struct SimMesh {
    config: RouterConfig,
    backoff_ms: u32,
    step_ms: u32,
    seed: u64,
    rng: StdRng,
    now_ms: u32,
    nodes: BTreeMap<NodeNum, SimNode>,
    /// Receiver lists per sender with link loss in percent.
    links: HashMap<NodeNum, Vec<(NodeNum, u8)>>,
    schedule: Vec<MessageSpec>,
    sent: Vec<SentMessage>,
    air_log: Vec<AirRecord>,
    frames_sent: u64,
    frames_lost: u64,
    frames_malformed: u64,
}

impl SimMesh {
    pub fn new(config: RouterConfig, seed: u64) -> Result<Self, SimError> {
        config.validate()?;
        Ok(Self {
            config,
            backoff_ms: DEFAULT_BACKOFF_MS,
            step_ms: DEFAULT_STEP_MS,
            seed,
            rng: StdRng::seed_from_u64(seed),
            now_ms: 0,
            nodes: BTreeMap::new(),
            links: HashMap::new(),
            schedule: Vec::new(),
            sent: Vec::new(),
            air_log: Vec::new(),
            frames_sent: 0,
            frames_lost: 0,
            frames_malformed: 0,
        })
    }

    /// Builds a mesh from `scenario`; `seed` overrides the scenario seed.
    pub fn from_scenario(scenario: &Scenario, seed: Option<u64>) -> Result<Self, SimError> {
        scenario.validate()?;
        let mut mesh = Self::new(scenario.router.clone(), seed.unwrap_or(scenario.seed))?;
        mesh.backoff_ms = scenario.backoff_ms;
        mesh.step_ms = scenario.step_ms;
        for node in &scenario.nodes {
            mesh.add_node(NodeNum(node.num), node.role)?;
        }
        for link in &scenario.links {
            let (a, b) = (NodeNum(link.a), NodeNum(link.b));
            if link.one_way {
                mesh.link_one_way(a, b, link.loss_percent)?;
            } else {
                mesh.link(a, b, link.loss_percent)?;
            }
        }
        mesh.schedule = scenario.messages.clone();
        mesh.schedule.sort_by_key(|m| m.at_ms);
        Ok(mesh)
    }

    pub fn add_node(&mut self, num: NodeNum, role: Option<DeviceRole>) -> Result<(), SimError> {
        if self.nodes.contains_key(&num) {
            return Err(SimError::DuplicateNode(num.0));
        }
        let mut config = self.config.clone();
        if let Some(role) = role {
            config.role = role;
        }
        let router = Router::with_seed(
            config,
            InMemoryRadio::with_backoff(self.backoff_ms),
            InMemoryNodeDb::new(num),
            InMemoryPacketHistory::new(num, HISTORY_CAPACITY),
            self.seed ^ u64::from(num.0),
        )?;
        self.nodes.insert(
            num,
            SimNode {
                num,
                router,
                events: Vec::new(),
                inbox: Vec::new(),
            },
        );
        Ok(())
    }

    /// Links `a` and `b` in both directions.
    pub fn link(&mut self, a: NodeNum, b: NodeNum, loss_percent: u8) -> Result<(), SimError> {
        self.link_one_way(a, b, loss_percent)?;
        self.link_one_way(b, a, loss_percent)
    }

    /// Lets `b` hear `a`.
    pub fn link_one_way(&mut self, a: NodeNum, b: NodeNum, loss_percent: u8) -> Result<(), SimError> {
        for num in [a, b] {
            if !self.nodes.contains_key(&num) {
                return Err(SimError::UnknownNode(num.0));
            }
        }
        let receivers = self.links.entry(a).or_default();
        receivers.retain(|(to, _)| *to != b);
        receivers.push((b, loss_percent.min(100)));
        Ok(())
    }

    pub fn now_ms(&self) -> u32 {
        self.now_ms
    }

    pub fn node(&self, num: NodeNum) -> Option<&SimNode> {
        self.nodes.get(&num)
    }

    pub fn node_mut(&mut self, num: NodeNum) -> Option<&mut SimNode> {
        self.nodes.get_mut(&num)
    }

    pub fn air_log(&self) -> &[AirRecord] {
        &self.air_log
    }

    /// Originates a message from `from` at the current time.
    pub fn send_message(
        &mut self,
        from: NodeNum,
        to: Option<NodeNum>,
        want_ack: bool,
        text: &str,
    ) -> Result<PacketId, SimError> {
        let now = self.now_ms;
        let node = self
            .nodes
            .get_mut(&from)
            .ok_or(SimError::UnknownNode(from.0))?;
        let packet = node
            .router
            .alloc_for_sending(to.unwrap_or(NodeNum::BROADCAST), text.as_bytes())
            .with_want_ack(want_ack);
        let id = packet.id;
        let send_error = node.router.send(packet, now).err();
        if let Some(err) = send_error {
            warn!(node = %from, id, error = %err, "message not sent");
        }
        self.sent.push(SentMessage {
            spec: MessageSpec {
                at_ms: now,
                from: from.0,
                to: to.map(|n| n.0),
                want_ack,
                text: text.to_string(),
            },
            id,
            sent_at_ms: now,
            send_error,
        });
        Ok(id)
    }

    /// Hands a prepared packet to `from`'s router.
    pub fn send_packet(&mut self, from: NodeNum, packet: MeshPacket) -> Result<Result<(), SendError>, SimError> {
        let now = self.now_ms;
        let node = self
            .nodes
            .get_mut(&from)
            .ok_or(SimError::UnknownNode(from.0))?;
        Ok(node.router.send(packet, now))
    }

    /// Puts raw bytes on the air as if `sender` had transmitted them.
    pub fn inject_frame(&mut self, sender: NodeNum, bytes: Vec<u8>) {
        self.broadcast_frame(sender, bytes);
    }

    fn broadcast_frame(&mut self, sender: NodeNum, bytes: Vec<u8>) {
        self.frames_sent += 1;
        let Some(receivers) = self.links.get(&sender) else {
            return;
        };
        for (receiver, loss_percent) in receivers {
            if *loss_percent > 0 && self.rng.gen_range(0..100) < *loss_percent {
                self.frames_lost += 1;
                continue;
            }
            if let Some(node) = self.nodes.get_mut(receiver) {
                node.inbox.push(bytes.clone());
            }
        }
    }

    fn fire_scheduled(&mut self) {
        let now = self.now_ms;
        let due = self.schedule.iter().take_while(|m| m.at_ms <= now).count();
        let messages: Vec<MessageSpec> = self.schedule.drain(..due).collect();
        for message in messages {
            let to = message.to.map(NodeNum);
            if let Err(err) = self.send_message(NodeNum(message.from), to, message.want_ack, &message.text) {
                warn!(error = %err, "scheduled message skipped");
            }
        }
    }

    /// Advances the mesh by one step.
    pub fn step(&mut self) {
        let now = self.now_ms;
        self.fire_scheduled();

        for node in self.nodes.values_mut() {
            node.router.tick(now);
        }

        let mut transmissions = Vec::new();
        for node in self.nodes.values_mut() {
            let radio = node.router.radio_mut();
            radio.advance_clock(now);
            for packet in radio.take_due() {
                transmissions.push((node.num, packet));
            }
        }
        for (sender, packet) in transmissions {
            match encode_frame(&packet) {
                Ok(bytes) => {
                    self.air_log.push(AirRecord {
                        at_ms: now,
                        sender: sender.0,
                        packet,
                    });
                    self.broadcast_frame(sender, bytes);
                }
                Err(err) => warn!(node = %sender, error = %err, "frame not encodable"),
            }
        }

        for node in self.nodes.values_mut() {
            for bytes in std::mem::take(&mut node.inbox) {
                let packet = match decode_frame(&bytes) {
                    Ok(packet) => packet,
                    Err(err) => {
                        debug!(node = %node.num, error = %err, "dropping malformed frame");
                        self.frames_malformed += 1;
                        continue;
                    }
                };
                if packet.from != node.num && !packet.from.is_broadcast() {
                    node.router.node_db_mut().insert_node(packet.from);
                }
                node.router.handle_received(packet, now);
            }
            node.events.extend(node.router.drain_events());
        }

        self.now_ms = now.wrapping_add(self.step_ms);
    }

    /// Steps until the clock reaches `end_ms`.
    pub fn run_until(&mut self, end_ms: u32) {
        while self.now_ms < end_ms {
            self.step();
        }
    }

    /// Whether any node still has frames queued or retransmissions pending.
    pub fn is_idle(&self) -> bool {
        self.schedule.is_empty()
            && self
                .nodes
                .values()
                .all(|n| n.router.pending_count() == 0 && n.router.radio().queued_len() == 0)
    }

    pub fn report(&self) -> SimReport {
        let messages = self
            .sent
            .iter()
            .map(|sent| self.outcome(sent))
            .collect();
        let nodes = self
            .nodes
            .values()
            .map(|node| NodeReport {
                num: node.num.0,
                stats: node.router.stats(),
                pending: node.router.pending_count(),
                learned_routes: node
                    .router
                    .node_db()
                    .learned_routes()
                    .into_iter()
                    .map(|(dest, relay)| (dest.0, relay.0))
                    .collect(),
            })
            .collect();
        SimReport {
            seed: self.seed,
            elapsed_ms: self.now_ms,
            frames_sent: self.frames_sent,
            frames_lost: self.frames_lost,
            frames_malformed: self.frames_malformed,
            messages,
            nodes,
        }
    }

    fn outcome(&self, sent: &SentMessage) -> MessageOutcome {
        let origin = NodeNum(sent.spec.from);
        let delivered_to: Vec<u32> = self
            .nodes
            .values()
            .filter(|node| {
                node.received()
                    .any(|p| p.from == origin && p.id == sent.id)
            })
            .map(|node| node.num.0)
            .collect();

        let mut acked = None;
        let mut failure = None;
        if let Some(node) = self.nodes.get(&origin) {
            for event in &node.events {
                match event {
                    RouterEvent::Delivered { id } if *id == sent.id => acked = Some(true),
                    RouterEvent::Failed { id, reason } if *id == sent.id => {
                        acked = Some(false);
                        failure = Some(*reason);
                    }
                    _ => {}
                }
            }
        }

        MessageOutcome {
            from: sent.spec.from,
            to: sent.spec.to,
            id: sent.id,
            want_ack: sent.spec.want_ack,
            sent_at_ms: sent.sent_at_ms,
            send_error: sent.send_error.map(|e| e.to_string()),
            delivered_to,
            acked,
            failure,
        }
    }
}

/// Loads and runs `scenario` to completion.
pub fn run_scenario(scenario: &Scenario, seed: Option<u64>) -> Result<SimReport, SimError> {
    let mut mesh = SimMesh::from_scenario(scenario, seed)?;
    mesh.run_until(scenario.duration_ms);
    let report = mesh.report();
    info!(
        frames = report.frames_sent,
        lost = report.frames_lost,
        messages = report.messages.len(),
        "simulation finished"
    );
    Ok(report)
}
