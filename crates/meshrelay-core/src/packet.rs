use serde::{Deserialize, Serialize};

use crate::error::RoutingError;
use crate::types::{GlobalPacketId, NodeNum, PacketId, RelayId};

/// Decoded packet body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Payload {
    /// Opaque application bytes.
    Data(Vec<u8>),
    /// Routing control message: an ACK when the code is `None`, otherwise a NAK.
    Routing(RoutingError),
}

impl Default for Payload {
    fn default() -> Self {
        Payload::Data(Vec::new())
    }
}

/// One logical message as seen by the routing stack.
///
/// Owned by whichever layer currently holds it. Clones are explicit and
/// dropping a clone releases it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MeshPacket {
    /// Originating node.
    pub from: NodeNum,
    /// Destination node or [`NodeNum::BROADCAST`].
    pub to: NodeNum,
    /// Sender-scoped id; `0` is never flooded.
    pub id: PacketId,
    /// Remaining hop budget. Never increases while the packet travels.
    pub hop_limit: u8,
    /// Hop limit the originator started with (`0` if unknown).
    pub hop_start: u8,
    /// Last byte of whoever is currently relaying the packet.
    pub relay_node: RelayId,
    /// Last byte of the relay's preferred next forwarder.
    pub next_hop: RelayId,
    /// Whether the originator asked for an end-to-end acknowledgement.
    pub want_ack: bool,
    /// Channel index.
    pub channel: u8,
    /// Id of the message this packet answers (ACK, NAK or reply); `0` if none.
    pub request_id: PacketId,
    pub payload: Payload,
}

impl MeshPacket {
    /// Builds a data packet with no relay annotations.
    pub fn new(from: NodeNum, to: NodeNum, id: PacketId, hop_limit: u8) -> Self {
        Self {
            from,
            to,
            id,
            hop_limit,
            hop_start: 0,
            relay_node: RelayId::NO_PREFERENCE,
            next_hop: RelayId::NO_PREFERENCE,
            want_ack: false,
            channel: 0,
            request_id: 0,
            payload: Payload::default(),
        }
    }

    /// Builds an ACK (`reason == None`) or NAK travelling from `from` back to
    /// `to` for the message `request_id`.
    pub fn ack_nak(
        from: NodeNum,
        to: NodeNum,
        id: PacketId,
        request_id: PacketId,
        reason: RoutingError,
        hop_limit: u8,
        channel: u8,
    ) -> Self {
        Self {
            request_id,
            channel,
            payload: Payload::Routing(reason),
            ..Self::new(from, to, id, hop_limit)
        }
    }

    pub fn with_want_ack(mut self, want_ack: bool) -> Self {
        self.want_ack = want_ack;
        self
    }

    pub fn with_payload(mut self, bytes: impl Into<Vec<u8>>) -> Self {
        self.payload = Payload::Data(bytes.into());
        self
    }

    pub fn global_id(&self) -> GlobalPacketId {
        GlobalPacketId::new(self.from, self.id)
    }

    pub fn is_broadcast(&self) -> bool {
        self.to.is_broadcast()
    }

    /// Whether this packet answers an earlier message.
    pub fn is_ack_or_reply(&self) -> bool {
        self.request_id != 0
    }

    /// Id acknowledged by this packet: a successful routing payload or any
    /// non-routing reply carrying a request id.
    pub fn ack_id(&self) -> Option<PacketId> {
        match self.payload {
            _ if self.request_id == 0 => None,
            Payload::Routing(reason) if !reason.is_ack() => None,
            _ => Some(self.request_id),
        }
    }

    /// Id and reason rejected by this packet, if it is a NAK.
    pub fn nak(&self) -> Option<(PacketId, RoutingError)> {
        match self.payload {
            Payload::Routing(reason) if self.request_id != 0 && !reason.is_ack() => {
                Some((self.request_id, reason))
            }
            _ => None,
        }
    }

    /// Number of hops this packet has already travelled, when known.
    pub fn hops_away(&self) -> Option<u8> {
        (self.hop_start != 0 && self.hop_start >= self.hop_limit)
            .then(|| self.hop_start - self.hop_limit)
    }

    /// Whether the packet arrived straight from its originator.
    pub fn came_direct(&self) -> bool {
        self.hops_away() == Some(0)
    }
}

#[cfg(test)]
mod tests {
    use super::{MeshPacket, Payload};
    use crate::error::RoutingError;
    use crate::types::{NodeNum, RelayId};

    #[test]
    fn new_packet_has_no_relay_annotations() {
        let p = MeshPacket::new(NodeNum(1), NodeNum::BROADCAST, 9, 3);
        assert_eq!(p.relay_node, RelayId::NO_PREFERENCE);
        assert_eq!(p.next_hop, RelayId::NO_PREFERENCE);
        assert!(p.is_broadcast());
        assert!(!p.is_ack_or_reply());
        assert_eq!(p.payload, Payload::Data(Vec::new()));
    }

    #[test]
    fn routing_ack_is_classified_as_ack() {
        let ack = MeshPacket::ack_nak(NodeNum(2), NodeNum(1), 77, 9, RoutingError::None, 3, 0);
        assert_eq!(ack.ack_id(), Some(9));
        assert_eq!(ack.nak(), None);
    }

    #[test]
    fn routing_error_is_classified_as_nak() {
        let nak = MeshPacket::ack_nak(
            NodeNum(2),
            NodeNum(1),
            77,
            9,
            RoutingError::NoChannel,
            3,
            0,
        );
        assert_eq!(nak.ack_id(), None);
        assert_eq!(nak.nak(), Some((9, RoutingError::NoChannel)));
    }

    #[test]
    fn data_reply_counts_as_ack() {
        let mut reply = MeshPacket::new(NodeNum(2), NodeNum(1), 78, 3).with_payload(b"pong".to_vec());
        reply.request_id = 9;
        assert_eq!(reply.ack_id(), Some(9));
        assert_eq!(reply.nak(), None);
    }

    #[test]
    fn hops_away_requires_hop_start() {
        let mut p = MeshPacket::new(NodeNum(1), NodeNum(2), 5, 3);
        assert_eq!(p.hops_away(), None);
        assert!(!p.came_direct());

        p.hop_start = 3;
        assert!(p.came_direct());

        p.hop_limit = 1;
        assert_eq!(p.hops_away(), Some(2));
    }
}
