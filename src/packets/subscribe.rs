use super::{check_fixed_header, check_non_zero, check_present, check_topic_filter, ensure, violation};
use crate::codec::{
    Error, FieldDescriptor as F, FieldKind as K, PacketContext, PacketType, PropertyId as P, QoS,
    RetainHandling,
};

pub use super::{FIXED_HEADER, HEADER_FLAGS, PACKET_TYPE};
pub const REMAINING_LENGTH: usize = 3;
pub const PACKET_IDENTIFIER: usize = 4;
pub const PROPERTY_LENGTH: usize = 5;
pub const PROPERTIES: usize = 6;
pub const SUBSCRIPTION_IDENTIFIER: usize = 7;
pub const USER_PROPERTIES: usize = 8;
pub const TOPIC_FILTERS: usize = 9;

const TAGS: [P; 2] = [P::SubscriptionIdentifier, P::UserProperty];

pub static TEMPLATE: [F; 10] = [
    F::flags("fixed_header", 0x82),
    F::bits("packet_type", FIXED_HEADER, 4, 4),
    F::bits("header_flags", FIXED_HEADER, 0, 4),
    F::length("remaining_length", TOPIC_FILTERS),
    F::new("packet_identifier", K::U16).int(0),
    F::length("property_length", USER_PROPERTIES),
    F::properties(PROPERTY_LENGTH, &TAGS),
    F::property("subscription_identifier", K::Vbi, P::SubscriptionIdentifier),
    F::property("user_properties", K::StringPairs, P::UserProperty),
    F::new("topic_filters", K::TopicFilters).empty(),
];

const RESERVED_OPTION_BITS: u8 = 0b1100_0000;

/// Packs the subscription options byte that follows every topic filter.
pub fn options(
    qos: QoS,
    no_local: bool,
    retain_as_published: bool,
    retain_handling: RetainHandling,
) -> u8 {
    qos as u8
        | (u8::from(no_local) << 2)
        | (u8::from(retain_as_published) << 3)
        | ((retain_handling as u8) << 4)
}

pub(crate) fn check(ctx: &PacketContext) -> Result<(), Error> {
    check_fixed_header(ctx)?;
    check_present(ctx, PACKET_IDENTIFIER, "packet_identifier is required")?;
    check_non_zero(ctx, PACKET_IDENTIFIER, "packet_identifier must not be 0")?;
    check_non_zero(
        ctx,
        SUBSCRIPTION_IDENTIFIER,
        "subscription_identifier must not be 0",
    )?;

    let filters = ctx.topic_filters(TOPIC_FILTERS).unwrap_or_default();
    ensure(ctx, !filters.is_empty(), "at least one topic filter is required")?;
    for (filter, options) in filters {
        check_topic_filter(ctx, filter)?;
        if options & RESERVED_OPTION_BITS != 0 {
            return Err(violation(ctx, "subscription options bits 6-7 are reserved"));
        }
        if QoS::try_from(options & 0b11).is_err() {
            return Err(violation(ctx, "subscription qos must be 0, 1 or 2"));
        }
        if RetainHandling::try_from((options >> 4) & 0b11).is_err() {
            return Err(violation(ctx, "retain handling must be 0, 1 or 2"));
        }
    }
    Ok(())
}

pub(crate) fn prepare(ctx: &mut PacketContext) -> Result<(), Error> {
    check(ctx)
}

pub fn set_packet_identifier(ctx: &mut PacketContext, id: u16) -> Result<(), Error> {
    ctx.expect_type(PacketType::Subscribe)?;
    ctx.set_int(PACKET_IDENTIFIER, id.into())
}

/// Appends one filter with its options byte. The filter is validated here
/// rather than at pack time.
pub fn add_topic_filter(ctx: &mut PacketContext, filter: &str, options: u8) -> Result<(), Error> {
    ctx.expect_type(PacketType::Subscribe)?;
    check_topic_filter(ctx, filter)?;
    let mut filters = ctx
        .topic_filters(TOPIC_FILTERS)
        .map(<[_]>::to_vec)
        .unwrap_or_default();
    filters.push((filter.to_owned(), options));
    ctx.set_topic_filters(TOPIC_FILTERS, filters)
}
