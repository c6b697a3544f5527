//! Over-the-air frame codec used between simulated radios.

use meshrelay_core::{MeshPacket, Payload, HOP_LIMIT_MAX};
use thiserror::Error;

/// Largest application payload a single LoRa frame carries.
pub const MAX_PAYLOAD_LEN: usize = 233;

#[derive(Debug, Error)]
pub enum FrameError {
    #[error("encode error: {0}")]
    Encode(String),
    #[error("decode error: {0}")]
    Decode(String),
    #[error("invalid frame: {0}")]
    Invalid(&'static str),
}

fn validate(packet: &MeshPacket) -> Result<(), FrameError> {
    if packet.hop_limit > HOP_LIMIT_MAX || packet.hop_start > HOP_LIMIT_MAX {
        return Err(FrameError::Invalid("hop limit above maximum"));
    }
    if let Payload::Data(bytes) = &packet.payload {
        if bytes.len() > MAX_PAYLOAD_LEN {
            return Err(FrameError::Invalid("payload too large"));
        }
    }
    Ok(())
}

/// Encodes `packet` as a CBOR frame.
pub fn encode_frame(packet: &MeshPacket) -> Result<Vec<u8>, FrameError> {
    validate(packet)?;
    let mut bytes = Vec::new();
    ciborium::ser::into_writer(packet, &mut bytes)
        .map_err(|e| FrameError::Encode(e.to_string()))?;
    Ok(bytes)
}

/// Decodes and validates a CBOR frame.
pub fn decode_frame(bytes: &[u8]) -> Result<MeshPacket, FrameError> {
    let packet: MeshPacket =
        ciborium::de::from_reader(bytes).map_err(|e| FrameError::Decode(e.to_string()))?;
    validate(&packet)?;
    Ok(packet)
}
