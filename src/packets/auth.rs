use super::{check_fixed_header, check_reason, ensure, normalize_reason};
use crate::codec::{
    AuthenticateReason, Error, FieldDescriptor as F, FieldKind as K, PacketContext, PacketType,
    PropertyId as P,
};
use bytes::Bytes;

pub use super::{FIXED_HEADER, HEADER_FLAGS, PACKET_TYPE};
pub const REMAINING_LENGTH: usize = 3;
pub const REASON_CODE: usize = 4;
pub const PROPERTY_LENGTH: usize = 5;
pub const PROPERTIES: usize = 6;
pub const AUTHENTICATION_METHOD: usize = 7;
pub const AUTHENTICATION_DATA: usize = 8;
pub const REASON_STRING: usize = 9;
pub const USER_PROPERTIES: usize = 10;

const TAGS: [P; 4] = [
    P::AuthenticationMethod,
    P::AuthenticationData,
    P::ReasonString,
    P::UserProperty,
];

pub static TEMPLATE: [F; 11] = [
    F::flags("fixed_header", 0xF0),
    F::bits("packet_type", FIXED_HEADER, 4, 4),
    F::bits("header_flags", FIXED_HEADER, 0, 4),
    F::length("remaining_length", USER_PROPERTIES),
    F::new("reason_code", K::U8).flag(REMAINING_LENGTH),
    F::length("property_length", USER_PROPERTIES)
        .optional()
        .flag(REMAINING_LENGTH),
    F::properties(PROPERTY_LENGTH, &TAGS).flag(REMAINING_LENGTH),
    F::property("authentication_method", K::Utf8, P::AuthenticationMethod),
    F::property("authentication_data", K::Binary, P::AuthenticationData),
    F::property("reason_string", K::Utf8, P::ReasonString),
    F::property("user_properties", K::StringPairs, P::UserProperty),
];

pub(crate) fn check(ctx: &PacketContext) -> Result<(), Error> {
    check_fixed_header(ctx)?;
    check_reason::<AuthenticateReason>(ctx, REASON_CODE)?;
    ensure(
        ctx,
        !ctx.exists(AUTHENTICATION_DATA) || ctx.exists(AUTHENTICATION_METHOD),
        "authentication_data requires authentication_method",
    )
}

pub(crate) fn prepare(ctx: &mut PacketContext) -> Result<(), Error> {
    normalize_reason(ctx, REASON_CODE, PROPERTY_LENGTH)?;
    check(ctx)
}

/// Sets the reason with the method and data of the exchange step.
pub fn set_exchange(
    ctx: &mut PacketContext,
    reason: AuthenticateReason,
    method: &str,
    data: impl Into<Bytes>,
) -> Result<(), Error> {
    ctx.expect_type(PacketType::Authenticate)?;
    ctx.set_int(REASON_CODE, reason as u32)?;
    ctx.set_str(AUTHENTICATION_METHOD, method)?;
    ctx.set_bytes(AUTHENTICATION_DATA, data)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_auth_exchange() {
        let mut ctx = PacketContext::new(&TEMPLATE).unwrap();
        set_exchange(
            &mut ctx,
            AuthenticateReason::ContinueAuthentication,
            "SCRAM",
            &b"\x01\x02"[..],
        )
        .unwrap();
        let bytes = ctx.pack().unwrap();
        assert_eq!(
            &bytes[..],
            [
                0xF0, 0x0F, 0x18, 0x0D, 0x15, 0x00, 0x05, b'S', b'C', b'R', b'A', b'M', 0x16,
                0x00, 0x02, 0x01, 0x02
            ]
        );
        let decoded = PacketContext::from_bytes(&TEMPLATE, &bytes).unwrap();
        assert_eq!(decoded.str(AUTHENTICATION_METHOD), Some("SCRAM"));
    }

    #[test]
    fn test_auth_rules() {
        let mut ctx = PacketContext::new(&TEMPLATE).unwrap();
        ctx.set_bytes(AUTHENTICATION_DATA, &b"x"[..]).unwrap();
        assert!(matches!(ctx.pack(), Err(Error::Protocol { .. })));

        // 0x04 is a DISCONNECT reason
        let result = PacketContext::from_bytes(&TEMPLATE, &[0xF0, 0x01, 0x04]);
        assert!(matches!(result, Err(Error::Protocol { .. })));
    }
}
