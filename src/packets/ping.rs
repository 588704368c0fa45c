//! PINGREQ and PINGRESP: a fixed header and a zero remaining length.

use super::FIXED_HEADER;
use crate::codec::FieldDescriptor as F;

pub const REMAINING_LENGTH: usize = 3;

const fn template(fixed_header: u8) -> [F; 4] {
    [
        F::flags("fixed_header", fixed_header),
        F::bits("packet_type", FIXED_HEADER, 4, 4),
        F::bits("header_flags", FIXED_HEADER, 0, 4),
        F::length("remaining_length", REMAINING_LENGTH),
    ]
}

pub mod pingreq {
    pub use super::super::{FIXED_HEADER, HEADER_FLAGS, PACKET_TYPE};
    pub use super::REMAINING_LENGTH;

    pub static TEMPLATE: [crate::codec::FieldDescriptor; 4] = super::template(0xC0);
}

pub mod pingresp {
    pub use super::super::{FIXED_HEADER, HEADER_FLAGS, PACKET_TYPE};
    pub use super::REMAINING_LENGTH;

    pub static TEMPLATE: [crate::codec::FieldDescriptor; 4] = super::template(0xD0);
}
