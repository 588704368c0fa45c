//! Field tables and cross-field rules for the fifteen MQTT5 control packets.
//!
//! Every table starts with the fixed-header byte at index 0 and its 4-bit
//! packet type at index 1. All packets but PUBLISH keep the low nibble in a
//! `header_flags` field at index 2.

mod ack;
pub mod auth;
pub mod connack;
pub mod connect;
pub mod disconnect;
mod ping;
pub mod publish;
pub mod suback;
pub mod subscribe;
pub mod unsuback;
pub mod unsubscribe;

pub use ack::{puback, pubcomp, pubrec, pubrel};
pub use ping::{pingreq, pingresp};

#[cfg(test)]
mod tests;

use crate::codec::{
    topic, Error, Field, FieldDescriptor, FieldValue, PacketContext, PacketType,
    PublishAckReason, PublishReleaseReason,
};
use log::warn;
use num_enum::TryFromPrimitive;

pub const FIXED_HEADER: usize = 0;
pub const PACKET_TYPE: usize = 1;
pub const HEADER_FLAGS: usize = 2;

/// Pack-time hook: validates and may normalize the context before encoding.
pub type Prepare = fn(&mut PacketContext) -> Result<(), Error>;
/// Post-unpack hook.
pub type Check = fn(&PacketContext) -> Result<(), Error>;

pub struct PacketSpec {
    pub packet_type: PacketType,
    pub name: &'static str,
    pub template: &'static [FieldDescriptor],
    pub prepare: Option<Prepare>,
    pub check: Option<Check>,
}

static SPECS: [PacketSpec; 15] = [
    PacketSpec {
        packet_type: PacketType::Connect,
        name: "CONNECT",
        template: &connect::TEMPLATE,
        prepare: Some(connect::prepare),
        check: Some(connect::check),
    },
    PacketSpec {
        packet_type: PacketType::ConnectAck,
        name: "CONNACK",
        template: &connack::TEMPLATE,
        prepare: Some(connack::prepare),
        check: Some(connack::check),
    },
    PacketSpec {
        packet_type: PacketType::Publish,
        name: "PUBLISH",
        template: &publish::TEMPLATE,
        prepare: Some(publish::prepare),
        check: Some(publish::check),
    },
    PacketSpec {
        packet_type: PacketType::PublishAck,
        name: "PUBACK",
        template: &puback::TEMPLATE,
        prepare: Some(ack::prepare::<PublishAckReason>),
        check: Some(ack::check::<PublishAckReason>),
    },
    PacketSpec {
        packet_type: PacketType::PublishReceived,
        name: "PUBREC",
        template: &pubrec::TEMPLATE,
        prepare: Some(ack::prepare::<PublishAckReason>),
        check: Some(ack::check::<PublishAckReason>),
    },
    PacketSpec {
        packet_type: PacketType::PublishRelease,
        name: "PUBREL",
        template: &pubrel::TEMPLATE,
        prepare: Some(ack::prepare::<PublishReleaseReason>),
        check: Some(ack::check::<PublishReleaseReason>),
    },
    PacketSpec {
        packet_type: PacketType::PublishComplete,
        name: "PUBCOMP",
        template: &pubcomp::TEMPLATE,
        prepare: Some(ack::prepare::<PublishReleaseReason>),
        check: Some(ack::check::<PublishReleaseReason>),
    },
    PacketSpec {
        packet_type: PacketType::Subscribe,
        name: "SUBSCRIBE",
        template: &subscribe::TEMPLATE,
        prepare: Some(subscribe::prepare),
        check: Some(subscribe::check),
    },
    PacketSpec {
        packet_type: PacketType::SubscribeAck,
        name: "SUBACK",
        template: &suback::TEMPLATE,
        prepare: Some(suback::prepare),
        check: Some(suback::check),
    },
    PacketSpec {
        packet_type: PacketType::Unsubscribe,
        name: "UNSUBSCRIBE",
        template: &unsubscribe::TEMPLATE,
        prepare: Some(unsubscribe::prepare),
        check: Some(unsubscribe::check),
    },
    PacketSpec {
        packet_type: PacketType::UnsubscribeAck,
        name: "UNSUBACK",
        template: &unsuback::TEMPLATE,
        prepare: Some(unsuback::prepare),
        check: Some(unsuback::check),
    },
    PacketSpec {
        packet_type: PacketType::PingRequest,
        name: "PINGREQ",
        template: &pingreq::TEMPLATE,
        prepare: Some(prepare_fixed_header),
        check: Some(check_fixed_header),
    },
    PacketSpec {
        packet_type: PacketType::PingResponse,
        name: "PINGRESP",
        template: &pingresp::TEMPLATE,
        prepare: Some(prepare_fixed_header),
        check: Some(check_fixed_header),
    },
    PacketSpec {
        packet_type: PacketType::Disconnect,
        name: "DISCONNECT",
        template: &disconnect::TEMPLATE,
        prepare: Some(disconnect::prepare),
        check: Some(disconnect::check),
    },
    PacketSpec {
        packet_type: PacketType::Authenticate,
        name: "AUTH",
        template: &auth::TEMPLATE,
        prepare: Some(auth::prepare),
        check: Some(auth::check),
    },
];

pub fn spec(packet_type: PacketType) -> &'static PacketSpec {
    &SPECS[packet_type as usize - 1]
}

/// Encode context for `packet_type` with every field at its default.
pub fn new(packet_type: PacketType) -> Result<PacketContext, Error> {
    PacketContext::new(spec(packet_type).template)
}

/// Decodes one complete packet, picking the schema from the first byte.
pub fn decode(bytes: &[u8]) -> Result<PacketContext, Error> {
    let first = *bytes.first().ok_or(Error::Truncated {
        field: "fixed_header",
    })?;
    let packet_type = PacketType::try_from(first >> 4).map_err(|_| {
        warn!("invalid packet type {}", first >> 4);
        Error::InvalidPacketType(first >> 4)
    })?;
    PacketContext::from_bytes(spec(packet_type).template, bytes)
}

pub(crate) fn violation(ctx: &PacketContext, reason: &'static str) -> Error {
    warn!("{}: {}", ctx.name(), reason);
    Error::Protocol {
        packet: ctx.name(),
        reason,
    }
}

pub(crate) fn ensure(ctx: &PacketContext, cond: bool, reason: &'static str) -> Result<(), Error> {
    if cond {
        Ok(())
    } else {
        Err(violation(ctx, reason))
    }
}

/// The type nibble must agree with the schema and the low nibble must hold
/// the value MQTT reserves for this packet type.
pub(crate) fn check_fixed_header(ctx: &PacketContext) -> Result<(), Error> {
    let packet_type = ctx.packet_type();
    ensure(
        ctx,
        ctx.int(PACKET_TYPE) == Some(packet_type as u32),
        "packet_type does not match the packet",
    )?;
    if packet_type == PacketType::Publish {
        return Ok(());
    }
    let reserved = match packet_type {
        PacketType::PublishRelease | PacketType::Subscribe | PacketType::Unsubscribe => 0b0010,
        _ => 0,
    };
    ensure(
        ctx,
        ctx.int(HEADER_FLAGS) == Some(reserved),
        "header_flags must hold the reserved value",
    )
}

fn prepare_fixed_header(ctx: &mut PacketContext) -> Result<(), Error> {
    check_fixed_header(ctx)
}

/// An absent reason code passes; a present one must be a code `R` knows.
pub(crate) fn check_reason<R: TryFromPrimitive<Primitive = u8>>(
    ctx: &PacketContext,
    idx: usize,
) -> Result<(), Error> {
    let Some(code) = ctx.int(idx) else {
        return Ok(());
    };
    let known = u8::try_from(code)
        .ok()
        .is_some_and(|code| R::try_from_primitive(code).is_ok());
    ensure(ctx, known, "reason_code is not valid for this packet")
}

pub(crate) fn check_boolean(
    ctx: &PacketContext,
    idx: usize,
    reason: &'static str,
) -> Result<(), Error> {
    ensure(ctx, ctx.int(idx).map_or(true, |value| value <= 1), reason)
}

pub(crate) fn check_present(
    ctx: &PacketContext,
    idx: usize,
    reason: &'static str,
) -> Result<(), Error> {
    ensure(ctx, ctx.exists(idx), reason)
}

pub(crate) fn check_non_zero(
    ctx: &PacketContext,
    idx: usize,
    reason: &'static str,
) -> Result<(), Error> {
    ensure(ctx, ctx.int(idx) != Some(0), reason)
}

pub(crate) fn check_topic_name(ctx: &PacketContext, idx: usize) -> Result<(), Error> {
    if let Some(name) = ctx.str(idx) {
        topic::validate_topic_name(name).map_err(|err| {
            warn!("{}: bad topic name {:?}: {}", ctx.name(), name, err);
            Error::from(err)
        })?;
    }
    Ok(())
}

pub(crate) fn check_topic_filter(ctx: &PacketContext, filter: &str) -> Result<(), Error> {
    topic::validate_topic_filter(filter).map_err(|err| {
        warn!("{}: bad topic filter {:?}: {}", ctx.name(), filter, err);
        Error::from(err)
    })?;
    Ok(())
}

/// MQTT lets a trailing reason code be left out when it is 0 and nothing
/// follows it, and a property length when the block is empty. Any property
/// brings both back.
pub(crate) fn normalize_reason(
    ctx: &mut PacketContext,
    reason_code: usize,
    property_length: usize,
) -> Result<(), Error> {
    let last = ctx
        .field(property_length)?
        .descriptor()
        .link
        .unwrap_or(property_length);
    // the block marker sits between the length and the first property
    let has_properties = ctx
        .fields()
        .get(property_length + 2..=last)
        .unwrap_or(&[])
        .iter()
        .any(Field::exists);

    if has_properties {
        ctx.materialize(reason_code, FieldValue::Int(0));
        ctx.materialize(property_length, FieldValue::Int(0));
    } else {
        ctx.drop_value(property_length)?;
        if ctx.int(reason_code).unwrap_or(0) == 0 {
            ctx.reset(reason_code)?;
        }
    }
    Ok(())
}
