//! Variable Byte Integer encoding.
//!
//! Seven value bits per byte, the high bit set while more bytes follow:
//! - 0-127: 1 byte
//! - 128-16383: 2 bytes
//! - 16384-2097151: 3 bytes
//! - 2097152-268435455: 4 bytes

use bytes::{Buf, BufMut, BytesMut};

/// Largest value that fits in four bytes.
pub const MAX: u32 = 268_435_455;

/// Number of bytes `value` takes on the wire. Values above [`MAX`] report 4,
/// [`encode`] rejects them.
pub fn encoded_len(value: u32) -> usize {
    match value {
        0..=127 => 1,
        128..=16_383 => 2,
        16_384..=2_097_151 => 3,
        _ => 4,
    }
}

/// Returns the number of bytes written, or `None` when `value` exceeds [`MAX`].
pub fn encode(value: u32, bytes: &mut BytesMut) -> Option<usize> {
    if value > MAX {
        return None;
    }

    let len = encoded_len(value);
    for shift in 0..len {
        let digit = (value >> (7 * shift)) as u8 & 0x7F;
        let more = if shift + 1 < len { 0x80 } else { 0 };
        bytes.put_u8(digit | more);
    }
    Some(len)
}

#[derive(Debug, PartialEq, Eq)]
pub enum DecodeStatus {
    /// The buffer ran out before the last byte.
    Incomplete,
    /// A fifth continuation byte was found.
    TooLong,
}

pub fn decode<B: Buf>(bytes: &mut B) -> Result<u32, DecodeStatus> {
    let mut multiplier: u32 = 1;
    let mut value: u32 = 0;

    for _ in 0..4 {
        if !bytes.has_remaining() {
            return Err(DecodeStatus::Incomplete);
        }
        let encoded_byte = bytes.get_u8();

        value += ((encoded_byte & 0b0111_1111) as u32) * multiplier;

        if encoded_byte & 0b1000_0000 == 0b0000_0000 {
            return Ok(value);
        }

        multiplier *= 128;
    }

    Err(DecodeStatus::TooLong)
}
