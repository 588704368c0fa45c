use super::{check_boolean, check_fixed_header, check_non_zero, check_reason, ensure};
use crate::codec::{
    ConnectReason, Error, FieldDescriptor as F, FieldKind as K, PacketContext, PacketType,
    PropertyId as P,
};

pub use super::{FIXED_HEADER, HEADER_FLAGS, PACKET_TYPE};
pub const REMAINING_LENGTH: usize = 3;
pub const ACKNOWLEDGE_FLAGS: usize = 4;
pub const SESSION_PRESENT: usize = 5;
pub const ACK_RESERVED: usize = 6;
pub const REASON_CODE: usize = 7;
pub const PROPERTY_LENGTH: usize = 8;
pub const PROPERTIES: usize = 9;
pub const SESSION_EXPIRY_INTERVAL: usize = 10;
pub const RECEIVE_MAXIMUM: usize = 11;
pub const MAXIMUM_QOS: usize = 12;
pub const RETAIN_AVAILABLE: usize = 13;
pub const MAXIMUM_PACKET_SIZE: usize = 14;
pub const ASSIGNED_CLIENT_IDENTIFIER: usize = 15;
pub const TOPIC_ALIAS_MAXIMUM: usize = 16;
pub const REASON_STRING: usize = 17;
pub const USER_PROPERTIES: usize = 18;
pub const WILDCARD_SUBSCRIPTION_AVAILABLE: usize = 19;
pub const SUBSCRIPTION_IDENTIFIERS_AVAILABLE: usize = 20;
pub const SHARED_SUBSCRIPTION_AVAILABLE: usize = 21;
pub const SERVER_KEEP_ALIVE: usize = 22;
pub const RESPONSE_INFORMATION: usize = 23;
pub const SERVER_REFERENCE: usize = 24;
pub const AUTHENTICATION_METHOD: usize = 25;
pub const AUTHENTICATION_DATA: usize = 26;

const TAGS: [P; 17] = [
    P::SessionExpiryInterval,
    P::ReceiveMaximum,
    P::MaximumQos,
    P::RetainAvailable,
    P::MaximumPacketSize,
    P::AssignedClientIdentifier,
    P::TopicAliasMaximum,
    P::ReasonString,
    P::UserProperty,
    P::WildcardSubscriptionAvailable,
    P::SubscriptionIdentifierAvailable,
    P::SharedSubscriptionAvailable,
    P::ServerKeepAlive,
    P::ResponseInformation,
    P::ServerReference,
    P::AuthenticationMethod,
    P::AuthenticationData,
];

pub static TEMPLATE: [F; 27] = [
    F::flags("fixed_header", 0x20),
    F::bits("packet_type", FIXED_HEADER, 4, 4),
    F::bits("header_flags", FIXED_HEADER, 0, 4),
    F::length("remaining_length", AUTHENTICATION_DATA),
    F::flags("acknowledge_flags", 0),
    F::bits("session_present", ACKNOWLEDGE_FLAGS, 0, 1),
    F::bits("ack_reserved", ACKNOWLEDGE_FLAGS, 1, 7),
    F::new("reason_code", K::U8).int(0),
    F::length("property_length", AUTHENTICATION_DATA),
    F::properties(PROPERTY_LENGTH, &TAGS),
    F::property("session_expiry_interval", K::U32, P::SessionExpiryInterval),
    F::property("receive_maximum", K::U16, P::ReceiveMaximum),
    F::property("maximum_qos", K::U8, P::MaximumQos),
    F::property("retain_available", K::U8, P::RetainAvailable),
    F::property("maximum_packet_size", K::U32, P::MaximumPacketSize),
    F::property("assigned_client_identifier", K::Utf8, P::AssignedClientIdentifier),
    F::property("topic_alias_maximum", K::U16, P::TopicAliasMaximum),
    F::property("reason_string", K::Utf8, P::ReasonString),
    F::property("user_properties", K::StringPairs, P::UserProperty),
    F::property(
        "wildcard_subscription_available",
        K::U8,
        P::WildcardSubscriptionAvailable,
    ),
    F::property(
        "subscription_identifiers_available",
        K::U8,
        P::SubscriptionIdentifierAvailable,
    ),
    F::property(
        "shared_subscription_available",
        K::U8,
        P::SharedSubscriptionAvailable,
    ),
    F::property("server_keep_alive", K::U16, P::ServerKeepAlive),
    F::property("response_information", K::Utf8, P::ResponseInformation),
    F::property("server_reference", K::Utf8, P::ServerReference),
    F::property("authentication_method", K::Utf8, P::AuthenticationMethod),
    F::property("authentication_data", K::Binary, P::AuthenticationData),
];

pub(crate) fn check(ctx: &PacketContext) -> Result<(), Error> {
    check_fixed_header(ctx)?;
    ensure(
        ctx,
        ctx.int(ACK_RESERVED) == Some(0),
        "acknowledge flags bits 1-7 are reserved",
    )?;
    check_reason::<ConnectReason>(ctx, REASON_CODE)?;
    if ctx.int(REASON_CODE).unwrap_or(0) >= 0x80 {
        ensure(
            ctx,
            ctx.int(SESSION_PRESENT) == Some(0),
            "session_present must be 0 on a failed connect",
        )?;
    }
    check_boolean(ctx, MAXIMUM_QOS, "maximum_qos must be 0 or 1")?;
    for (idx, reason) in [
        (RETAIN_AVAILABLE, "retain_available must be 0 or 1"),
        (
            WILDCARD_SUBSCRIPTION_AVAILABLE,
            "wildcard_subscription_available must be 0 or 1",
        ),
        (
            SUBSCRIPTION_IDENTIFIERS_AVAILABLE,
            "subscription_identifiers_available must be 0 or 1",
        ),
        (
            SHARED_SUBSCRIPTION_AVAILABLE,
            "shared_subscription_available must be 0 or 1",
        ),
    ] {
        check_boolean(ctx, idx, reason)?;
    }
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

pub fn set_reason(ctx: &mut PacketContext, reason: ConnectReason) -> Result<(), Error> {
    ctx.expect_type(PacketType::ConnectAck)?;
    ctx.set_int(REASON_CODE, reason as u32)
}

pub fn reason(ctx: &PacketContext) -> Result<ConnectReason, Error> {
    ctx.expect_type(PacketType::ConnectAck)?;
    let code = ctx.int(REASON_CODE).unwrap_or(0);
    u8::try_from(code)
        .ok()
        .and_then(|code| ConnectReason::try_from(code).ok())
        .ok_or(Error::ValueOutOfRange {
            field: "reason_code",
            value: code.into(),
        })
}

pub fn set_session_present(ctx: &mut PacketContext, present: bool) -> Result<(), Error> {
    ctx.expect_type(PacketType::ConnectAck)?;
    ctx.set_int(SESSION_PRESENT, present.into())
}

pub fn session_present(ctx: &PacketContext) -> Result<bool, Error> {
    ctx.expect_type(PacketType::ConnectAck)?;
    Ok(ctx.int(SESSION_PRESENT) == Some(1))
}
