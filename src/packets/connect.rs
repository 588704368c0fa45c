use super::{
    check_boolean, check_fixed_header, check_non_zero, check_present, check_topic_name, ensure,
};
use crate::codec::{
    Error, FieldDescriptor as F, FieldKind as K, PacketContext, PacketType, PropertyId as P, QoS,
};
use bytes::Bytes;

pub use super::{FIXED_HEADER, HEADER_FLAGS, PACKET_TYPE};
pub const REMAINING_LENGTH: usize = 3;
pub const PROTOCOL_NAME: usize = 4;
pub const PROTOCOL_VERSION: usize = 5;
pub const CONNECT_FLAGS: usize = 6;
pub const RESERVED: usize = 7;
pub const CLEAN_START: usize = 8;
pub const WILL_FLAG: usize = 9;
pub const WILL_QOS: usize = 10;
pub const WILL_RETAIN: usize = 11;
pub const PASSWORD_FLAG: usize = 12;
pub const USERNAME_FLAG: usize = 13;
pub const KEEP_ALIVE: usize = 14;
pub const PROPERTY_LENGTH: usize = 15;
pub const PROPERTIES: usize = 16;
pub const SESSION_EXPIRY_INTERVAL: usize = 17;
pub const RECEIVE_MAXIMUM: usize = 18;
pub const MAXIMUM_PACKET_SIZE: usize = 19;
pub const TOPIC_ALIAS_MAXIMUM: usize = 20;
pub const REQUEST_RESPONSE_INFORMATION: usize = 21;
pub const REQUEST_PROBLEM_INFORMATION: usize = 22;
pub const USER_PROPERTIES: usize = 23;
pub const AUTHENTICATION_METHOD: usize = 24;
pub const AUTHENTICATION_DATA: usize = 25;
pub const CLIENT_IDENTIFIER: usize = 26;
pub const WILL_PROPERTY_LENGTH: usize = 27;
pub const WILL_PROPERTIES: usize = 28;
pub const WILL_DELAY_INTERVAL: usize = 29;
pub const PAYLOAD_FORMAT_INDICATOR: usize = 30;
pub const MESSAGE_EXPIRY_INTERVAL: usize = 31;
pub const CONTENT_TYPE: usize = 32;
pub const RESPONSE_TOPIC: usize = 33;
pub const CORRELATION_DATA: usize = 34;
pub const WILL_USER_PROPERTIES: usize = 35;
pub const WILL_TOPIC: usize = 36;
pub const WILL_PAYLOAD: usize = 37;
pub const USERNAME: usize = 38;
pub const PASSWORD: usize = 39;

const TAGS: [P; 9] = [
    P::SessionExpiryInterval,
    P::ReceiveMaximum,
    P::MaximumPacketSize,
    P::TopicAliasMaximum,
    P::RequestResponseInformation,
    P::RequestProblemInformation,
    P::UserProperty,
    P::AuthenticationMethod,
    P::AuthenticationData,
];

const WILL_TAGS: [P; 7] = [
    P::WillDelayInterval,
    P::PayloadFormatIndicator,
    P::MessageExpiryInterval,
    P::ContentType,
    P::ResponseTopic,
    P::CorrelationData,
    P::UserProperty,
];

pub static TEMPLATE: [F; 40] = [
    F::flags("fixed_header", 0x10),
    F::bits("packet_type", FIXED_HEADER, 4, 4),
    F::bits("header_flags", FIXED_HEADER, 0, 4),
    F::length("remaining_length", PASSWORD),
    F::new("protocol_name", K::Utf8).text("MQTT"),
    F::new("protocol_version", K::U8).int(5),
    F::flags("connect_flags", 0),
    F::bits("reserved", CONNECT_FLAGS, 0, 1),
    F::bits("clean_start", CONNECT_FLAGS, 1, 1),
    F::bits("will_flag", CONNECT_FLAGS, 2, 1),
    F::bits("will_qos", CONNECT_FLAGS, 3, 2),
    F::bits("will_retain", CONNECT_FLAGS, 5, 1),
    F::bits("password_flag", CONNECT_FLAGS, 6, 1),
    F::bits("username_flag", CONNECT_FLAGS, 7, 1),
    F::new("keep_alive", K::U16).int(0),
    F::length("property_length", AUTHENTICATION_DATA),
    F::properties(PROPERTY_LENGTH, &TAGS),
    F::property("session_expiry_interval", K::U32, P::SessionExpiryInterval),
    F::property("receive_maximum", K::U16, P::ReceiveMaximum),
    F::property("maximum_packet_size", K::U32, P::MaximumPacketSize),
    F::property("topic_alias_maximum", K::U16, P::TopicAliasMaximum),
    F::property("request_response_information", K::U8, P::RequestResponseInformation),
    F::property("request_problem_information", K::U8, P::RequestProblemInformation),
    F::property("user_properties", K::StringPairs, P::UserProperty),
    F::property("authentication_method", K::Utf8, P::AuthenticationMethod),
    F::property("authentication_data", K::Binary, P::AuthenticationData),
    F::new("client_identifier", K::Utf8).empty(),
    // will block, present only with will_flag
    F::length("will_property_length", WILL_USER_PROPERTIES).flag(WILL_FLAG),
    F::properties(WILL_PROPERTY_LENGTH, &WILL_TAGS)
        .named("will_properties")
        .flag(WILL_FLAG),
    F::property("will_delay_interval", K::U32, P::WillDelayInterval).flag(WILL_FLAG),
    F::property("payload_format_indicator", K::U8, P::PayloadFormatIndicator).flag(WILL_FLAG),
    F::property("message_expiry_interval", K::U32, P::MessageExpiryInterval).flag(WILL_FLAG),
    F::property("content_type", K::Utf8, P::ContentType).flag(WILL_FLAG),
    F::property("response_topic", K::Utf8, P::ResponseTopic).flag(WILL_FLAG),
    F::property("correlation_data", K::Binary, P::CorrelationData).flag(WILL_FLAG),
    F::property("will_user_properties", K::StringPairs, P::UserProperty).flag(WILL_FLAG),
    F::new("will_topic", K::Utf8).flag(WILL_FLAG),
    F::new("will_payload", K::Binary).flag(WILL_FLAG),
    F::new("username", K::Utf8).flag(USERNAME_FLAG),
    F::new("password", K::Binary).flag(PASSWORD_FLAG),
];

pub(crate) fn check(ctx: &PacketContext) -> Result<(), Error> {
    check_fixed_header(ctx)?;
    ensure(
        ctx,
        ctx.str(PROTOCOL_NAME) == Some("MQTT"),
        "protocol_name must be MQTT",
    )?;
    ensure(
        ctx,
        ctx.int(PROTOCOL_VERSION) == Some(5),
        "protocol_version must be 5",
    )?;
    ensure(ctx, ctx.int(RESERVED) == Some(0), "reserved flag must be 0")?;
    check_present(ctx, KEEP_ALIVE, "keep_alive is required")?;
    check_present(ctx, CLIENT_IDENTIFIER, "client_identifier is required")?;

    let will_qos = ctx.int(WILL_QOS).unwrap_or(0);
    ensure(ctx, will_qos <= 2, "will_qos must be 0, 1 or 2")?;
    if ctx.int(WILL_FLAG) == Some(1) {
        ensure(
            ctx,
            ctx.exists(WILL_TOPIC) && ctx.exists(WILL_PAYLOAD),
            "will_flag requires will_topic and will_payload",
        )?;
        ensure(
            ctx,
            ctx.str(WILL_TOPIC).is_some_and(|topic| !topic.is_empty()),
            "will_topic must not be empty",
        )?;
        check_topic_name(ctx, WILL_TOPIC)?;
        check_boolean(
            ctx,
            PAYLOAD_FORMAT_INDICATOR,
            "payload_format_indicator must be 0 or 1",
        )?;
    } else {
        ensure(
            ctx,
            will_qos == 0 && ctx.int(WILL_RETAIN) == Some(0),
            "will_qos and will_retain must be 0 without will_flag",
        )?;
    }

    ensure(
        ctx,
        ctx.int(USERNAME_FLAG) != Some(1) || ctx.exists(USERNAME),
        "username_flag set without username",
    )?;
    ensure(
        ctx,
        ctx.int(PASSWORD_FLAG) != Some(1) || ctx.exists(PASSWORD),
        "password_flag set without password",
    )?;

    check_boolean(
        ctx,
        REQUEST_RESPONSE_INFORMATION,
        "request_response_information must be 0 or 1",
    )?;
    check_boolean(
        ctx,
        REQUEST_PROBLEM_INFORMATION,
        "request_problem_information must be 0 or 1",
    )?;
    check_non_zero(ctx, RECEIVE_MAXIMUM, "receive_maximum must not be 0")?;
    check_non_zero(ctx, MAXIMUM_PACKET_SIZE, "maximum_packet_size must not be 0")?;
    ensure(
        ctx,
        !ctx.exists(AUTHENTICATION_DATA) || ctx.exists(AUTHENTICATION_METHOD),
        "authentication_data requires authentication_method",
    )
}

pub(crate) fn prepare(ctx: &mut PacketContext) -> Result<(), Error> {
    check(ctx)
}

pub fn set_client_identifier(ctx: &mut PacketContext, id: &str) -> Result<(), Error> {
    ctx.expect_type(PacketType::Connect)?;
    ctx.set_str(CLIENT_IDENTIFIER, id)
}

pub fn client_identifier(ctx: &PacketContext) -> Result<&str, Error> {
    ctx.expect_type(PacketType::Connect)?;
    Ok(ctx.str(CLIENT_IDENTIFIER).unwrap_or_default())
}

pub fn set_keep_alive(ctx: &mut PacketContext, seconds: u16) -> Result<(), Error> {
    ctx.expect_type(PacketType::Connect)?;
    ctx.set_int(KEEP_ALIVE, seconds.into())
}

pub fn set_clean_start(ctx: &mut PacketContext, clean_start: bool) -> Result<(), Error> {
    ctx.expect_type(PacketType::Connect)?;
    ctx.set_int(CLEAN_START, clean_start.into())
}

fn enable_will(ctx: &mut PacketContext) -> Result<(), Error> {
    ctx.expect_type(PacketType::Connect)?;
    if ctx.int(WILL_FLAG) != Some(1) {
        ctx.set_int(WILL_FLAG, 1)?;
    }
    Ok(())
}

/// Setting any part of the will turns the will flag on.
pub fn set_will_topic(ctx: &mut PacketContext, topic: &str) -> Result<(), Error> {
    enable_will(ctx)?;
    ctx.set_str(WILL_TOPIC, topic)
}

pub fn set_will_payload(ctx: &mut PacketContext, payload: impl Into<Bytes>) -> Result<(), Error> {
    enable_will(ctx)?;
    ctx.set_bytes(WILL_PAYLOAD, payload)
}

pub fn set_will_qos(ctx: &mut PacketContext, qos: QoS) -> Result<(), Error> {
    enable_will(ctx)?;
    ctx.set_int(WILL_QOS, qos as u32)
}

pub fn set_will_retain(ctx: &mut PacketContext, retain: bool) -> Result<(), Error> {
    enable_will(ctx)?;
    ctx.set_int(WILL_RETAIN, retain.into())
}

/// Drops the will message along with its qos and retain bits.
pub fn clear_will(ctx: &mut PacketContext) -> Result<(), Error> {
    ctx.expect_type(PacketType::Connect)?;
    ctx.set_int(WILL_QOS, 0)?;
    ctx.set_int(WILL_RETAIN, 0)?;
    ctx.set_int(WILL_FLAG, 0)
}

pub fn set_username(ctx: &mut PacketContext, username: &str) -> Result<(), Error> {
    ctx.expect_type(PacketType::Connect)?;
    ctx.set_int(USERNAME_FLAG, 1)?;
    ctx.set_str(USERNAME, username)
}

pub fn set_password(ctx: &mut PacketContext, password: impl Into<Bytes>) -> Result<(), Error> {
    ctx.expect_type(PacketType::Connect)?;
    ctx.set_int(PASSWORD_FLAG, 1)?;
    ctx.set_bytes(PASSWORD, password)
}

pub fn username(ctx: &PacketContext) -> Result<Option<&str>, Error> {
    ctx.expect_type(PacketType::Connect)?;
    Ok(ctx.str(USERNAME))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packets::publish;

    #[test]
    fn test_keep_alive_and_client_identifier_are_required() {
        let mut ctx = PacketContext::new(&TEMPLATE).unwrap();
        ctx.clear();
        ctx.set_int(FIXED_HEADER, 0x10).unwrap();
        ctx.set_str(PROTOCOL_NAME, "MQTT").unwrap();
        ctx.set_int(PROTOCOL_VERSION, 5).unwrap();
        ctx.set_int(CONNECT_FLAGS, 0).unwrap();
        assert!(matches!(
            ctx.pack(),
            Err(Error::Protocol {
                reason: "keep_alive is required",
                ..
            })
        ));

        set_keep_alive(&mut ctx, 10).unwrap();
        assert!(matches!(
            ctx.pack(),
            Err(Error::Protocol {
                reason: "client_identifier is required",
                ..
            })
        ));

        set_client_identifier(&mut ctx, "c").unwrap();
        let bytes = ctx.pack().unwrap();
        assert_eq!(bytes[1], 0x0E);
    }

    #[test]
    fn test_will_setters_raise_the_flag() {
        let mut ctx = PacketContext::new(&TEMPLATE).unwrap();
        set_will_topic(&mut ctx, "last/will").unwrap();
        assert_eq!(ctx.int(WILL_FLAG), Some(1));
        assert_eq!(ctx.int(WILL_PROPERTY_LENGTH), Some(0));
        set_will_payload(&mut ctx, &b"bye"[..]).unwrap();
        set_will_qos(&mut ctx, QoS::AtLeastOnce).unwrap();
        assert_eq!(ctx.int(CONNECT_FLAGS), Some(0b0000_1100));
        ctx.pack().unwrap();

        clear_will(&mut ctx).unwrap();
        assert!(!ctx.exists(WILL_TOPIC));
        assert!(!ctx.exists(WILL_PAYLOAD));
        assert_eq!(ctx.int(CONNECT_FLAGS), Some(0));
    }

    #[test]
    fn test_credentials_raise_their_flags() {
        let mut ctx = PacketContext::new(&TEMPLATE).unwrap();
        set_username(&mut ctx, "user").unwrap();
        set_password(&mut ctx, &b"secret"[..]).unwrap();
        assert_eq!(ctx.int(CONNECT_FLAGS), Some(0b1100_0000));
        assert_eq!(username(&ctx).unwrap(), Some("user"));
    }

    #[test]
    fn test_will_rules() {
        let mut ctx = PacketContext::new(&TEMPLATE).unwrap();
        ctx.set_int(WILL_QOS, 1).unwrap();
        assert!(matches!(ctx.pack(), Err(Error::Protocol { .. })));

        let mut ctx = PacketContext::new(&TEMPLATE).unwrap();
        set_will_topic(&mut ctx, "no/payload").unwrap();
        assert!(matches!(ctx.pack(), Err(Error::Protocol { .. })));

        let mut ctx = PacketContext::new(&TEMPLATE).unwrap();
        set_will_topic(&mut ctx, "bad/#").unwrap();
        set_will_payload(&mut ctx, &b"x"[..]).unwrap();
        assert!(matches!(ctx.pack(), Err(Error::InvalidTopic(_))));
    }

    #[test]
    fn test_protocol_header_rules() {
        let mut ctx = PacketContext::new(&TEMPLATE).unwrap();
        ctx.set_int(PROTOCOL_VERSION, 4).unwrap();
        assert!(matches!(
            ctx.pack(),
            Err(Error::Protocol {
                reason: "protocol_version must be 5",
                ..
            })
        ));

        let mut ctx = PacketContext::new(&TEMPLATE).unwrap();
        ctx.set_int(RESERVED, 1).unwrap();
        assert!(ctx.pack().is_err());

        let mut ctx = PacketContext::new(&TEMPLATE).unwrap();
        ctx.set_int(RECEIVE_MAXIMUM, 0).unwrap();
        assert!(ctx.pack().is_err());
    }

    #[test]
    fn test_accessors_check_packet_type() {
        let mut ctx = PacketContext::new(&publish::TEMPLATE).unwrap();
        assert!(matches!(
            set_username(&mut ctx, "user"),
            Err(Error::WrongPacketType {
                expected: "CONNECT",
                actual: "PUBLISH"
            })
        ));
        assert!(client_identifier(&ctx).is_err());
    }
}
