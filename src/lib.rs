//! Schema-driven MQTT5 packet codec.
//!
//! Each control packet is a static table of field descriptors (see
//! [`packets`]). A [`PacketContext`] holds one packet's values and packs or
//! unpacks them by walking that table; [`codec::MqttCodec`] frames contexts
//! on a byte stream.

pub mod codec;
pub mod packets;

pub use codec::{Error, FieldValue, MqttCodec, PacketContext, PacketType, PrintOptions};
