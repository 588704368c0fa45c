use super::{check_fixed_header, ensure};
use crate::codec::{
    Error, FieldDescriptor as F, FieldKind as K, PacketContext, PacketType, PropertyId as P,
    UnsubscribeAckReason,
};

pub use super::{FIXED_HEADER, HEADER_FLAGS, PACKET_TYPE};
pub const REMAINING_LENGTH: usize = 3;
pub const PACKET_IDENTIFIER: usize = 4;
pub const PROPERTY_LENGTH: usize = 5;
pub const PROPERTIES: usize = 6;
pub const REASON_STRING: usize = 7;
pub const USER_PROPERTIES: usize = 8;
pub const REASON_CODES: usize = 9;

const TAGS: [P; 2] = [P::ReasonString, P::UserProperty];

pub static TEMPLATE: [F; 10] = [
    F::flags("fixed_header", 0xB0),
    F::bits("packet_type", FIXED_HEADER, 4, 4),
    F::bits("header_flags", FIXED_HEADER, 0, 4),
    F::length("remaining_length", REASON_CODES),
    F::new("packet_identifier", K::U16).int(0),
    F::length("property_length", USER_PROPERTIES),
    F::properties(PROPERTY_LENGTH, &TAGS),
    F::property("reason_string", K::Utf8, P::ReasonString),
    F::property("user_properties", K::StringPairs, P::UserProperty),
    F::new("reason_codes", K::Payload).empty(),
];

pub(crate) fn check(ctx: &PacketContext) -> Result<(), Error> {
    check_fixed_header(ctx)?;
    let codes = ctx.bytes(REASON_CODES).map(|codes| &codes[..]).unwrap_or_default();
    ensure(ctx, !codes.is_empty(), "at least one reason code is required")?;
    ensure(
        ctx,
        codes
            .iter()
            .all(|code| UnsubscribeAckReason::try_from(*code).is_ok()),
        "reason code is not valid for UNSUBACK",
    )
}

pub(crate) fn prepare(ctx: &mut PacketContext) -> Result<(), Error> {
    check(ctx)
}

pub fn set_reasons(
    ctx: &mut PacketContext,
    reasons: &[UnsubscribeAckReason],
) -> Result<(), Error> {
    ctx.expect_type(PacketType::UnsubscribeAck)?;
    let codes: Vec<u8> = reasons.iter().map(|reason| *reason as u8).collect();
    ctx.set_bytes(REASON_CODES, codes)
}
