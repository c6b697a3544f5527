use std::collections::VecDeque;

use meshrelay_core::{MeshPacket, NodeNum, PacketId, SendError};

/// Firmware default transmit queue depth.
pub const DEFAULT_TX_QUEUE_LEN: usize = 16;
/// Backoff used by [`InMemoryRadio`] unless overridden.
pub const DEFAULT_BACKOFF_MS: u32 = 1_000;

/// Coarse per-radio counters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RadioHealthSnapshot {
    pub queued: u64,
    pub send_ok: u64,
    pub send_err: u64,
    pub cancelled: u64,
}

/// Packet-level radio contract used by the routing stack.
pub trait RadioTransport {
    /// Enqueues a packet for transmission. Errors are returned unchanged to
    /// the caller of the routing stack.
    fn send(&mut self, packet: MeshPacket) -> Result<(), SendError>;

    /// Drops a queued, not yet transmitted copy of `(from, id)`.
    fn cancel_outgoing(&mut self, from: NodeNum, id: PacketId) -> bool;

    /// Delay before the next retransmission of `packet`, in milliseconds.
    fn retransmission_backoff(&self, packet: &MeshPacket) -> u32;

    /// Expected time on air of `packet` in milliseconds.
    ///
    /// `received` is set when the packet was heard rather than sent.
    fn packet_airtime(&self, _packet: &MeshPacket, _received: bool) -> u32 {
        0
    }

    fn health_snapshot(&self) -> RadioHealthSnapshot {
        RadioHealthSnapshot::default()
    }
}

#[derive(Debug, Clone)]
struct QueuedFrame {
    packet: MeshPacket,
    queued_at_ms: u32,
}

/// In-memory radio for tests and simulations.
///
/// Sent packets wait in a bounded queue until the owner drains them, either
/// all at once ([`InMemoryRadio::take_outbound`]) or once their transmit delay
/// has elapsed on the radio clock ([`InMemoryRadio::take_due`]).
#[derive(Debug, Clone)]
pub struct InMemoryRadio {
    queue: VecDeque<QueuedFrame>,
    clock_ms: u32,
    tx_delay_ms: u32,
    backoff_ms: u32,
    airtime_ms: u32,
    max_queue: usize,
    attached: bool,
    send_ok: u64,
    send_err: u64,
    cancelled: u64,
}

impl Default for InMemoryRadio {
    fn default() -> Self {
        Self {
            queue: VecDeque::new(),
            clock_ms: 0,
            tx_delay_ms: 0,
            backoff_ms: DEFAULT_BACKOFF_MS,
            airtime_ms: 0,
            max_queue: DEFAULT_TX_QUEUE_LEN,
            attached: true,
            send_ok: 0,
            send_err: 0,
            cancelled: 0,
        }
    }
}

impl InMemoryRadio {
    /// Creates a radio reporting a fixed retransmission backoff.
    pub fn with_backoff(backoff_ms: u32) -> Self {
        Self {
            backoff_ms,
            ..Self::default()
        }
    }

    /// Sets the airtime reported for every packet.
    pub fn set_airtime(&mut self, airtime_ms: u32) {
        self.airtime_ms = airtime_ms;
    }

    /// Sets how long a frame waits in the queue before [`Self::take_due`]
    /// releases it.
    pub fn set_tx_delay(&mut self, tx_delay_ms: u32) {
        self.tx_delay_ms = tx_delay_ms;
    }

    pub fn set_max_queue(&mut self, max_queue: usize) {
        self.max_queue = max_queue;
    }

    /// Detaching the radio makes every send fail with `NoInterface`.
    pub fn set_attached(&mut self, attached: bool) {
        self.attached = attached;
    }

    /// Moves the radio clock used to stamp and release queued frames.
    pub fn advance_clock(&mut self, now_ms: u32) {
        self.clock_ms = now_ms;
    }

    pub fn queued_len(&self) -> usize {
        self.queue.len()
    }

    /// Queued packets in transmit order.
    pub fn queued(&self) -> impl Iterator<Item = &MeshPacket> {
        self.queue.iter().map(|frame| &frame.packet)
    }

    /// Drains every queued packet regardless of transmit delay.
    pub fn take_outbound(&mut self) -> Vec<MeshPacket> {
        self.queue.drain(..).map(|frame| frame.packet).collect()
    }

    /// Drains queued packets whose transmit delay has elapsed.
    pub fn take_due(&mut self) -> Vec<MeshPacket> {
        let now = self.clock_ms;
        let delay = self.tx_delay_ms;
        let mut due = Vec::new();
        self.queue.retain(|frame| {
            if now.wrapping_sub(frame.queued_at_ms) >= delay {
                due.push(frame.packet.clone());
                false
            } else {
                true
            }
        });
        due
    }
}

impl RadioTransport for InMemoryRadio {
    fn send(&mut self, packet: MeshPacket) -> Result<(), SendError> {
        if !self.attached {
            self.send_err += 1;
            return Err(SendError::NoInterface);
        }
        if self.queue.len() >= self.max_queue {
            self.send_err += 1;
            return Err(SendError::QueueFull);
        }
        self.queue.push_back(QueuedFrame {
            packet,
            queued_at_ms: self.clock_ms,
        });
        self.send_ok += 1;
        Ok(())
    }

    fn cancel_outgoing(&mut self, from: NodeNum, id: PacketId) -> bool {
        let before = self.queue.len();
        self.queue
            .retain(|frame| !(frame.packet.from == from && frame.packet.id == id));
        let removed = before - self.queue.len();
        self.cancelled += removed as u64;
        removed > 0
    }

    fn retransmission_backoff(&self, _packet: &MeshPacket) -> u32 {
        self.backoff_ms
    }

    fn packet_airtime(&self, _packet: &MeshPacket, _received: bool) -> u32 {
        self.airtime_ms
    }

    fn health_snapshot(&self) -> RadioHealthSnapshot {
        RadioHealthSnapshot {
            queued: self.queue.len() as u64,
            send_ok: self.send_ok,
            send_err: self.send_err,
            cancelled: self.cancelled,
        }
    }
}
