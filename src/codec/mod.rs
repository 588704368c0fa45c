mod context;
mod decoder;
mod encoder;
mod kinds;
mod printable;
mod schema;
pub mod topic;
mod types;
pub mod varint;

pub use context::PacketContext;
pub use printable::PrintOptions;
pub use schema::{Field, FieldDefault, FieldDescriptor, FieldKind, FieldValue};
pub use topic::{TopicFilter, TopicParseError};
pub use types::*;

use crate::packets;
use bytes::BytesMut;
use log::{trace, warn};
use tokio_util::codec::{Decoder, Encoder};
use varint::DecodeStatus;

/// Largest frame MQTT can express: a 4-byte remaining length at its maximum
/// plus the first header byte and the length itself.
pub const MAX_PACKET_SIZE: usize = varint::MAX as usize + 5;

/// Splits a byte stream into MQTT5 packets and packs outgoing ones.
pub struct MqttCodec {
    max_packet_size: usize,
}

impl Default for MqttCodec {
    fn default() -> Self {
        MqttCodec::new()
    }
}

impl MqttCodec {
    pub fn new() -> Self {
        MqttCodec {
            max_packet_size: MAX_PACKET_SIZE,
        }
    }

    /// Frames larger than `max_packet_size` bytes, fixed header included,
    /// are refused in both directions.
    pub fn with_max_packet_size(max_packet_size: usize) -> Self {
        MqttCodec { max_packet_size }
    }

    pub fn max_packet_size(&self) -> usize {
        self.max_packet_size
    }

    fn check_size(&self, size: usize) -> Result<(), Error> {
        if size > self.max_packet_size {
            warn!("packet of {} bytes over the {} byte limit", size, self.max_packet_size);
            return Err(Error::PacketTooLarge {
                size,
                limit: self.max_packet_size,
            });
        }
        Ok(())
    }
}

impl Decoder for MqttCodec {
    type Error = Error;
    type Item = PacketContext;

    fn decode(&mut self, buf: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if buf.len() < 2 {
            return Ok(None);
        }
        let mut header = &buf[1..];
        let remaining_length = match varint::decode(&mut header) {
            Ok(len) => len as usize,
            Err(DecodeStatus::Incomplete) => return Ok(None),
            Err(DecodeStatus::TooLong) => {
                return Err(Error::InvalidVariableInt {
                    field: "remaining_length",
                })
            }
        };
        let size = buf.len() - header.len() + remaining_length;
        self.check_size(size)?;
        if buf.len() < size {
            buf.reserve(size - buf.len());
            return Ok(None);
        }

        let frame = buf.split_to(size);
        trace!("framed {} bytes", size);
        packets::decode(&frame).map(Some)
    }
}

impl Encoder<PacketContext> for MqttCodec {
    type Error = Error;

    fn encode(&mut self, mut packet: PacketContext, bytes: &mut BytesMut) -> Result<(), Self::Error> {
        let packed = packet.pack()?;
        self.check_size(packed.len())?;
        bytes.extend_from_slice(&packed);
        Ok(())
    }
}
