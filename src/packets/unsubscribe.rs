use super::{check_fixed_header, check_non_zero, check_present, check_topic_filter, ensure};
use crate::codec::{
    Error, FieldDescriptor as F, FieldKind as K, PacketContext, PacketType, PropertyId as P,
};

pub use super::{FIXED_HEADER, HEADER_FLAGS, PACKET_TYPE};
pub const REMAINING_LENGTH: usize = 3;
pub const PACKET_IDENTIFIER: usize = 4;
pub const PROPERTY_LENGTH: usize = 5;
pub const PROPERTIES: usize = 6;
pub const USER_PROPERTIES: usize = 7;
pub const TOPIC_FILTERS: usize = 8;

const TAGS: [P; 1] = [P::UserProperty];

pub static TEMPLATE: [F; 9] = [
    F::flags("fixed_header", 0xA2),
    F::bits("packet_type", FIXED_HEADER, 4, 4),
    F::bits("header_flags", FIXED_HEADER, 0, 4),
    F::length("remaining_length", TOPIC_FILTERS),
    F::new("packet_identifier", K::U16).int(0),
    F::length("property_length", USER_PROPERTIES),
    F::properties(PROPERTY_LENGTH, &TAGS),
    F::property("user_properties", K::StringPairs, P::UserProperty),
    F::new("topic_filters", K::Utf8Vec).empty(),
];

pub(crate) fn check(ctx: &PacketContext) -> Result<(), Error> {
    check_fixed_header(ctx)?;
    check_present(ctx, PACKET_IDENTIFIER, "packet_identifier is required")?;
    check_non_zero(ctx, PACKET_IDENTIFIER, "packet_identifier must not be 0")?;
    let filters = ctx.strings(TOPIC_FILTERS).unwrap_or_default();
    ensure(ctx, !filters.is_empty(), "at least one topic filter is required")?;
    for filter in filters {
        check_topic_filter(ctx, filter)?;
    }
    Ok(())
}

pub(crate) fn prepare(ctx: &mut PacketContext) -> Result<(), Error> {
    check(ctx)
}

pub fn set_packet_identifier(ctx: &mut PacketContext, id: u16) -> Result<(), Error> {
    ctx.expect_type(PacketType::Unsubscribe)?;
    ctx.set_int(PACKET_IDENTIFIER, id.into())
}

pub fn add_topic_filter(ctx: &mut PacketContext, filter: &str) -> Result<(), Error> {
    ctx.expect_type(PacketType::Unsubscribe)?;
    check_topic_filter(ctx, filter)?;
    let mut filters = ctx
        .strings(TOPIC_FILTERS)
        .map(<[_]>::to_vec)
        .unwrap_or_default();
    filters.push(filter.to_owned());
    ctx.set_strings(TOPIC_FILTERS, filters)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unsubscribe_requires_packet_identifier() {
        let mut ctx = PacketContext::new(&TEMPLATE).unwrap();
        ctx.clear();
        ctx.set_int(FIXED_HEADER, 0xA2).unwrap();
        add_topic_filter(&mut ctx, "a/b").unwrap();
        assert!(matches!(
            ctx.pack(),
            Err(Error::Protocol {
                reason: "packet_identifier is required",
                ..
            })
        ));
    }

    #[test]
    fn test_unsubscribe_wire_format() {
        let mut ctx = PacketContext::new(&TEMPLATE).unwrap();
        set_packet_identifier(&mut ctx, 2).unwrap();
        add_topic_filter(&mut ctx, "a/#").unwrap();
        add_topic_filter(&mut ctx, "b").unwrap();
        let bytes = ctx.pack().unwrap();
        assert_eq!(
            &bytes[..],
            [0xA2, 0x0B, 0x00, 0x02, 0x00, 0x00, 0x03, b'a', b'/', b'#', 0x00, 0x01, b'b']
        );

        let decoded = PacketContext::from_bytes(&TEMPLATE, &bytes).unwrap();
        assert_eq!(
            decoded.strings(TOPIC_FILTERS),
            Some(&["a/#".to_owned(), "b".to_owned()][..])
        );
    }

    #[test]
    fn test_unsubscribe_rules() {
        let mut ctx = PacketContext::new(&TEMPLATE).unwrap();
        set_packet_identifier(&mut ctx, 2).unwrap();
        assert!(ctx.pack().is_err());
        assert!(add_topic_filter(&mut ctx, "+x").is_err());

        // a filter with a misplaced wildcard on the wire
        let result = PacketContext::from_bytes(
            &TEMPLATE,
            &[0xA2, 0x07, 0x00, 0x02, 0x00, 0x00, 0x02, b'#', b'a'],
        );
        assert!(matches!(result, Err(Error::InvalidTopic(_))));
    }
}
