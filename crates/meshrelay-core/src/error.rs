use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Failure to hand a packet to the radio. Propagated unchanged to callers;
/// the routing stack never retries a failed enqueue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SendError {
    /// Transmit queue is full.
    #[error("transmit queue full")]
    QueueFull,
    /// No radio interface is attached.
    #[error("no radio interface")]
    NoInterface,
    /// Regional duty-cycle budget is exhausted.
    #[error("duty cycle limit exceeded")]
    DutyCycleLimit,
    /// Encoded packet does not fit in one radio frame.
    #[error("packet too large")]
    TooLarge,
}

/// Reason code carried by routing ACK/NAK payloads and failure events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Error)]
pub enum RoutingError {
    /// Success; a routing payload with this code is an ACK.
    #[error("none")]
    None,
    /// Retransmissions were exhausted without an ACK.
    #[error("max retransmit")]
    MaxRetransmit,
    /// No route to the destination.
    #[error("no route")]
    NoRoute,
    /// The destination could not decode the packet on any channel.
    #[error("no channel")]
    NoChannel,
    /// The packet was too large to send.
    #[error("too large")]
    TooLarge,
    /// No radio interface was available.
    #[error("no interface")]
    NoInterface,
    /// Sending would violate the duty cycle.
    #[error("duty cycle limit")]
    DutyCycleLimit,
    /// Malformed request.
    #[error("bad request")]
    BadRequest,
}

impl RoutingError {
    pub fn is_ack(self) -> bool {
        self == RoutingError::None
    }
}

#[cfg(test)]
mod tests {
    use super::{RoutingError, SendError};

    #[test]
    fn error_messages_are_stable() {
        assert_eq!(SendError::QueueFull.to_string(), "transmit queue full");
        assert_eq!(
            SendError::DutyCycleLimit.to_string(),
            "duty cycle limit exceeded"
        );
        assert_eq!(RoutingError::MaxRetransmit.to_string(), "max retransmit");
    }

    #[test]
    fn only_none_is_an_ack() {
        assert!(RoutingError::None.is_ack());
        assert!(!RoutingError::MaxRetransmit.is_ack());
        assert!(!RoutingError::NoChannel.is_ack());
    }
}
