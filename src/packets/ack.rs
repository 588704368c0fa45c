//! PUBACK, PUBREC, PUBREL and PUBCOMP share one layout and differ only in
//! the fixed header and the reason codes they accept.

use super::{check_fixed_header, check_reason, normalize_reason, FIXED_HEADER};
use crate::codec::{Error, FieldDescriptor as F, FieldKind as K, PacketContext, PropertyId as P};
use num_enum::TryFromPrimitive;

pub const REMAINING_LENGTH: usize = 3;
pub const PACKET_IDENTIFIER: usize = 4;
pub const REASON_CODE: usize = 5;
pub const PROPERTY_LENGTH: usize = 6;
pub const PROPERTIES: usize = 7;
pub const REASON_STRING: usize = 8;
pub const USER_PROPERTIES: usize = 9;

const TAGS: &[P] = &[P::ReasonString, P::UserProperty];

/// Everything after the packet identifier may be cut off by the remaining
/// length, so it hangs off that length rather than a flag bit.
const fn template(fixed_header: u8) -> [F; 10] {
    [
        F::flags("fixed_header", fixed_header),
        F::bits("packet_type", FIXED_HEADER, 4, 4),
        F::bits("header_flags", FIXED_HEADER, 0, 4),
        F::length("remaining_length", USER_PROPERTIES),
        F::new("packet_identifier", K::U16).int(0),
        F::new("reason_code", K::U8).flag(REMAINING_LENGTH),
        F::length("property_length", USER_PROPERTIES)
            .optional()
            .flag(REMAINING_LENGTH),
        F::properties(PROPERTY_LENGTH, TAGS).flag(REMAINING_LENGTH),
        F::property("reason_string", K::Utf8, P::ReasonString),
        F::property("user_properties", K::StringPairs, P::UserProperty),
    ]
}

pub(crate) fn check<R: TryFromPrimitive<Primitive = u8>>(
    ctx: &PacketContext,
) -> Result<(), Error> {
    check_fixed_header(ctx)?;
    check_reason::<R>(ctx, REASON_CODE)
}

pub(crate) fn prepare<R: TryFromPrimitive<Primitive = u8>>(
    ctx: &mut PacketContext,
) -> Result<(), Error> {
    normalize_reason(ctx, REASON_CODE, PROPERTY_LENGTH)?;
    check::<R>(ctx)
}

macro_rules! ack_module {
    ($name:ident, $header:expr, $packet_type:ident, $reason:ident) => {
        pub mod $name {
            use crate::codec::{Error, FieldDescriptor, PacketContext, PacketType, $reason};

            pub use super::super::{FIXED_HEADER, HEADER_FLAGS, PACKET_TYPE};
            pub use super::{
                PACKET_IDENTIFIER, PROPERTIES, PROPERTY_LENGTH, REASON_CODE, REASON_STRING,
                REMAINING_LENGTH, USER_PROPERTIES,
            };

            pub static TEMPLATE: [FieldDescriptor; 10] = super::template($header);

            /// Context acknowledging `packet_identifier`.
            pub fn new(packet_identifier: u16) -> Result<PacketContext, Error> {
                let mut ctx = PacketContext::new(&TEMPLATE)?;
                ctx.set_int(PACKET_IDENTIFIER, packet_identifier.into())?;
                Ok(ctx)
            }

            pub fn set_reason(ctx: &mut PacketContext, reason: $reason) -> Result<(), Error> {
                ctx.expect_type(PacketType::$packet_type)?;
                ctx.set_int(REASON_CODE, reason as u32)
            }

            /// An omitted reason code means success.
            pub fn reason(ctx: &PacketContext) -> Result<$reason, Error> {
                ctx.expect_type(PacketType::$packet_type)?;
                let code = ctx.int(REASON_CODE).unwrap_or(0);
                u8::try_from(code)
                    .ok()
                    .and_then(|code| $reason::try_from(code).ok())
                    .ok_or(Error::ValueOutOfRange {
                        field: "reason_code",
                        value: code.into(),
                    })
            }
        }
    };
}

ack_module!(puback, 0x40, PublishAck, PublishAckReason);
ack_module!(pubrec, 0x50, PublishReceived, PublishAckReason);
ack_module!(pubrel, 0x62, PublishRelease, PublishReleaseReason);
ack_module!(pubcomp, 0x70, PublishComplete, PublishReleaseReason);
