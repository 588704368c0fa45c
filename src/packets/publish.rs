use super::{check_boolean, check_fixed_header, check_present, check_topic_name, ensure};
use crate::codec::{
    Error, FieldDescriptor as F, FieldKind as K, PacketContext, PacketType, PropertyId as P, QoS,
};
use bytes::Bytes;

pub use super::{FIXED_HEADER, PACKET_TYPE};
pub const RETAIN: usize = 2;
pub const QOS: usize = 3;
pub const DUP: usize = 4;
pub const REMAINING_LENGTH: usize = 5;
pub const TOPIC_NAME: usize = 6;
pub const PACKET_IDENTIFIER: usize = 7;
pub const PROPERTY_LENGTH: usize = 8;
pub const PROPERTIES: usize = 9;
pub const PAYLOAD_FORMAT_INDICATOR: usize = 10;
pub const MESSAGE_EXPIRY_INTERVAL: usize = 11;
pub const TOPIC_ALIAS: usize = 12;
pub const RESPONSE_TOPIC: usize = 13;
pub const CORRELATION_DATA: usize = 14;
pub const USER_PROPERTIES: usize = 15;
pub const SUBSCRIPTION_IDENTIFIERS: usize = 16;
pub const CONTENT_TYPE: usize = 17;
pub const PAYLOAD: usize = 18;

const TAGS: [P; 8] = [
    P::PayloadFormatIndicator,
    P::MessageExpiryInterval,
    P::TopicAlias,
    P::ResponseTopic,
    P::CorrelationData,
    P::UserProperty,
    P::SubscriptionIdentifier,
    P::ContentType,
];

pub static TEMPLATE: [F; 19] = [
    F::flags("fixed_header", 0x30),
    F::bits("packet_type", FIXED_HEADER, 4, 4),
    F::bits("retain", FIXED_HEADER, 0, 1),
    F::bits("qos", FIXED_HEADER, 1, 2),
    F::bits("dup", FIXED_HEADER, 3, 1),
    F::length("remaining_length", PAYLOAD),
    F::new("topic_name", K::Utf8).empty(),
    F::new("packet_identifier", K::U16).flag(QOS),
    F::length("property_length", CONTENT_TYPE),
    F::properties(PROPERTY_LENGTH, &TAGS),
    F::property("payload_format_indicator", K::U8, P::PayloadFormatIndicator),
    F::property("message_expiry_interval", K::U32, P::MessageExpiryInterval),
    F::property("topic_alias", K::U16, P::TopicAlias),
    F::property("response_topic", K::Utf8, P::ResponseTopic),
    F::property("correlation_data", K::Binary, P::CorrelationData),
    F::property("user_properties", K::StringPairs, P::UserProperty),
    F::property("subscription_identifiers", K::VbiVec, P::SubscriptionIdentifier),
    F::property("content_type", K::Utf8, P::ContentType),
    F::new("payload", K::Payload).empty(),
];

pub(crate) fn check(ctx: &PacketContext) -> Result<(), Error> {
    check_fixed_header(ctx)?;
    let qos = ctx.int(QOS).unwrap_or(0);
    ensure(ctx, qos <= 2, "qos must be 0, 1 or 2")?;
    if qos > 0 {
        ensure(
            ctx,
            ctx.int(PACKET_IDENTIFIER).is_some_and(|id| id != 0),
            "packet_identifier is required for qos > 0",
        )?;
    } else {
        ensure(ctx, ctx.int(DUP) == Some(0), "dup must be 0 for qos 0")?;
    }

    check_present(ctx, TOPIC_NAME, "topic_name is required")?;
    check_topic_name(ctx, TOPIC_NAME)?;
    if ctx.str(TOPIC_NAME).is_some_and(str::is_empty) {
        ensure(
            ctx,
            ctx.exists(TOPIC_ALIAS),
            "an empty topic_name requires a topic_alias",
        )?;
    }
    ensure(
        ctx,
        ctx.int(TOPIC_ALIAS) != Some(0),
        "topic_alias must not be 0",
    )?;
    check_boolean(
        ctx,
        PAYLOAD_FORMAT_INDICATOR,
        "payload_format_indicator must be 0 or 1",
    )?;
    ensure(
        ctx,
        ctx.ints(SUBSCRIPTION_IDENTIFIERS)
            .map_or(true, |ids| ids.iter().all(|id| *id != 0)),
        "subscription identifiers must not be 0",
    )?;
    if let Some(topic) = ctx.str(RESPONSE_TOPIC) {
        ensure(ctx, !topic.is_empty(), "response_topic must not be empty")?;
        check_topic_name(ctx, RESPONSE_TOPIC)?;
    }
    Ok(())
}

pub(crate) fn prepare(ctx: &mut PacketContext) -> Result<(), Error> {
    check(ctx)
}

pub fn set_topic(ctx: &mut PacketContext, topic: &str) -> Result<(), Error> {
    ctx.expect_type(PacketType::Publish)?;
    ctx.set_str(TOPIC_NAME, topic)
}

pub fn topic(ctx: &PacketContext) -> Result<&str, Error> {
    ctx.expect_type(PacketType::Publish)?;
    Ok(ctx.str(TOPIC_NAME).unwrap_or_default())
}

/// Lowering the qos to 0 drops the packet identifier.
pub fn set_qos(ctx: &mut PacketContext, qos: QoS) -> Result<(), Error> {
    ctx.expect_type(PacketType::Publish)?;
    ctx.set_int(QOS, qos as u32)
}

pub fn qos(ctx: &PacketContext) -> Result<QoS, Error> {
    ctx.expect_type(PacketType::Publish)?;
    let qos = ctx.int(QOS).unwrap_or(0);
    u8::try_from(qos)
        .ok()
        .and_then(|qos| QoS::try_from(qos).ok())
        .ok_or(Error::ValueOutOfRange {
            field: "qos",
            value: qos.into(),
        })
}

pub fn set_packet_identifier(ctx: &mut PacketContext, id: u16) -> Result<(), Error> {
    ctx.expect_type(PacketType::Publish)?;
    ctx.set_int(PACKET_IDENTIFIER, id.into())
}

pub fn set_retain(ctx: &mut PacketContext, retain: bool) -> Result<(), Error> {
    ctx.expect_type(PacketType::Publish)?;
    ctx.set_int(RETAIN, retain.into())
}

pub fn set_payload(ctx: &mut PacketContext, payload: impl Into<Bytes>) -> Result<(), Error> {
    ctx.expect_type(PacketType::Publish)?;
    ctx.set_bytes(PAYLOAD, payload)
}

pub fn payload(ctx: &PacketContext) -> Result<Bytes, Error> {
    ctx.expect_type(PacketType::Publish)?;
    Ok(ctx.bytes(PAYLOAD).cloned().unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> PacketContext {
        let mut ctx = PacketContext::new(&TEMPLATE).unwrap();
        set_topic(&mut ctx, "sensors/1").unwrap();
        ctx
    }

    #[test]
    fn test_lowering_qos_drops_packet_identifier() {
        let mut ctx = base();
        set_qos(&mut ctx, QoS::ExactlyOnce).unwrap();
        set_packet_identifier(&mut ctx, 9).unwrap();
        assert_eq!(ctx.int(FIXED_HEADER), Some(0x34));

        set_qos(&mut ctx, QoS::AtMostOnce).unwrap();
        assert!(!ctx.exists(PACKET_IDENTIFIER));
        assert!(matches!(
            set_packet_identifier(&mut ctx, 9),
            Err(Error::DependencyUnset { .. })
        ));
    }

    #[test]
    fn test_qos_three_rejected() {
        let mut ctx = base();
        ctx.set_int(QOS, 3).unwrap();
        ctx.set_int(PACKET_IDENTIFIER, 1).unwrap();
        assert!(matches!(ctx.pack(), Err(Error::Protocol { .. })));
        assert!(matches!(
            PacketContext::from_bytes(&TEMPLATE, &[0x36, 0x06, 0x00, 0x01, b't', 0x00, 0x01, 0x00]),
            Err(Error::Protocol { .. })
        ));
    }

    #[test]
    fn test_topic_rules() {
        let mut ctx = base();
        set_topic(&mut ctx, "a/+").unwrap();
        assert!(matches!(ctx.pack(), Err(Error::InvalidTopic(_))));

        set_topic(&mut ctx, "").unwrap();
        assert!(ctx.pack().is_err());
        ctx.set_int(TOPIC_ALIAS, 4).unwrap();
        let bytes = ctx.pack().unwrap();
        assert_eq!(&bytes[..], [0x30, 0x06, 0x00, 0x00, 0x03, 0x23, 0x00, 0x04]);

        ctx.set_int(TOPIC_ALIAS, 0).unwrap();
        assert!(ctx.pack().is_err());
    }

    #[test]
    fn test_missing_topic_is_not_an_empty_topic() {
        let mut ctx = PacketContext::new(&TEMPLATE).unwrap();
        ctx.clear();
        ctx.set_int(FIXED_HEADER, 0x30).unwrap();
        ctx.set_int(TOPIC_ALIAS, 4).unwrap();
        assert!(matches!(
            ctx.pack(),
            Err(Error::Protocol {
                reason: "topic_name is required",
                ..
            })
        ));

        set_topic(&mut ctx, "").unwrap();
        set_payload(&mut ctx, Bytes::new()).unwrap();
        let bytes = ctx.pack().unwrap();
        assert_eq!(&bytes[..4], [0x30, 0x06, 0x00, 0x00]);
    }

    #[test]
    fn test_dup_needs_qos() {
        let mut ctx = base();
        ctx.set_int(DUP, 1).unwrap();
        assert!(ctx.pack().is_err());
        set_qos(&mut ctx, QoS::AtLeastOnce).unwrap();
        set_packet_identifier(&mut ctx, 3).unwrap();
        assert!(ctx.pack().is_ok());
    }

    #[test]
    fn test_subscription_identifiers_repeat() {
        let mut ctx = base();
        ctx.set_ints(SUBSCRIPTION_IDENTIFIERS, vec![1, 200]).unwrap();
        let bytes = ctx.pack().unwrap();
        let decoded = PacketContext::from_bytes(&TEMPLATE, &bytes).unwrap();
        assert_eq!(decoded.ints(SUBSCRIPTION_IDENTIFIERS), Some(&[1, 200][..]));
        assert_eq!(decoded.int(PROPERTY_LENGTH), Some(2 + 3));

        ctx.set_ints(SUBSCRIPTION_IDENTIFIERS, vec![0]).unwrap();
        assert!(ctx.pack().is_err());
    }
}
