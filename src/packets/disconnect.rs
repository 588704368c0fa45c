use super::{check_fixed_header, check_reason, normalize_reason};
use crate::codec::{
    DisconnectReason, Error, FieldDescriptor as F, FieldKind as K, PacketContext, PacketType,
    PropertyId as P,
};

pub use super::{FIXED_HEADER, HEADER_FLAGS, PACKET_TYPE};
pub const REMAINING_LENGTH: usize = 3;
pub const REASON_CODE: usize = 4;
pub const PROPERTY_LENGTH: usize = 5;
pub const PROPERTIES: usize = 6;
pub const SESSION_EXPIRY_INTERVAL: usize = 7;
pub const REASON_STRING: usize = 8;
pub const USER_PROPERTIES: usize = 9;
pub const SERVER_REFERENCE: usize = 10;

const TAGS: [P; 4] = [
    P::SessionExpiryInterval,
    P::ReasonString,
    P::UserProperty,
    P::ServerReference,
];

pub static TEMPLATE: [F; 11] = [
    F::flags("fixed_header", 0xE0),
    F::bits("packet_type", FIXED_HEADER, 4, 4),
    F::bits("header_flags", FIXED_HEADER, 0, 4),
    F::length("remaining_length", SERVER_REFERENCE),
    F::new("reason_code", K::U8).flag(REMAINING_LENGTH),
    F::length("property_length", SERVER_REFERENCE)
        .optional()
        .flag(REMAINING_LENGTH),
    F::properties(PROPERTY_LENGTH, &TAGS).flag(REMAINING_LENGTH),
    F::property("session_expiry_interval", K::U32, P::SessionExpiryInterval),
    F::property("reason_string", K::Utf8, P::ReasonString),
    F::property("user_properties", K::StringPairs, P::UserProperty),
    F::property("server_reference", K::Utf8, P::ServerReference),
];

pub(crate) fn check(ctx: &PacketContext) -> Result<(), Error> {
    check_fixed_header(ctx)?;
    check_reason::<DisconnectReason>(ctx, REASON_CODE)
}

pub(crate) fn prepare(ctx: &mut PacketContext) -> Result<(), Error> {
    normalize_reason(ctx, REASON_CODE, PROPERTY_LENGTH)?;
    check(ctx)
}

pub fn set_reason(ctx: &mut PacketContext, reason: DisconnectReason) -> Result<(), Error> {
    ctx.expect_type(PacketType::Disconnect)?;
    ctx.set_int(REASON_CODE, reason as u32)
}

/// An omitted reason code is a normal disconnection.
pub fn reason(ctx: &PacketContext) -> Result<DisconnectReason, Error> {
    ctx.expect_type(PacketType::Disconnect)?;
    let code = ctx.int(REASON_CODE).unwrap_or(0);
    u8::try_from(code)
        .ok()
        .and_then(|code| DisconnectReason::try_from(code).ok())
        .ok_or(Error::ValueOutOfRange {
            field: "reason_code",
            value: code.into(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normal_disconnect_is_two_bytes() {
        let mut ctx = PacketContext::new(&TEMPLATE).unwrap();
        assert_eq!(&ctx.pack().unwrap()[..], [0xE0, 0x00]);

        let decoded = PacketContext::from_bytes(&TEMPLATE, &[0xE0, 0x00]).unwrap();
        assert_eq!(
            reason(&decoded).unwrap(),
            DisconnectReason::NormalDisconnection
        );
    }

    #[test]
    fn test_disconnect_with_properties() {
        let mut ctx = PacketContext::new(&TEMPLATE).unwrap();
        set_reason(&mut ctx, DisconnectReason::ServerShuttingDown).unwrap();
        ctx.set_int(SESSION_EXPIRY_INTERVAL, 60).unwrap();
        let bytes = ctx.pack().unwrap();
        assert_eq!(
            &bytes[..],
            [0xE0, 0x07, 0x8B, 0x05, 0x11, 0x00, 0x00, 0x00, 0x3C]
        );

        let decoded = PacketContext::from_bytes(&TEMPLATE, &bytes).unwrap();
        assert_eq!(reason(&decoded).unwrap(), DisconnectReason::ServerShuttingDown);
        assert_eq!(decoded.int(SESSION_EXPIRY_INTERVAL), Some(60));
    }

    #[test]
    fn test_unknown_disconnect_reason() {
        let result = PacketContext::from_bytes(&TEMPLATE, &[0xE0, 0x01, 0x01]);
        assert!(matches!(result, Err(Error::Protocol { .. })));
    }
}
