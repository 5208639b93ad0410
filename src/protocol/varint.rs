//! Remaining-length encoding
//!
//! The remaining length is a base-128 varint, least-significant group first.
//! Each byte carries 7 bits of value; the high bit says another byte follows.
//!
//! ```text
//!      0 ..=        127  -> 1 byte
//!    128 ..=     16_383  -> 2 bytes
//! 16_384 ..=  2_097_151  -> 3 bytes
//! 2_097_152 ..= 268_435_455 -> 4 bytes
//! ```

use bytes::BufMut;

use crate::error::ProtocolError;
use crate::protocol::constants::{
    CONTINUATION_BIT, MAX_REMAINING_LENGTH, MAX_REMAINING_LENGTH_BYTES,
};

/// Decode a remaining-length field from the start of `buf`
///
/// Returns `Ok(Some((value, bytes_used)))` once a byte without the
/// continuation bit is seen, `Ok(None)` if `buf` ends while the field is still
/// open, and an error if the field runs past four bytes.
pub fn decode(buf: &[u8]) -> Result<Option<(usize, usize)>, ProtocolError> {
    let mut value = 0usize;

    for (i, &byte) in buf.iter().enumerate() {
        if i >= MAX_REMAINING_LENGTH_BYTES {
            return Err(ProtocolError::MalformedRemainingLength);
        }
        value |= ((byte & !CONTINUATION_BIT) as usize) << (7 * i);
        if byte & CONTINUATION_BIT == 0 {
            return Ok(Some((value, i + 1)));
        }
    }

    if buf.len() >= MAX_REMAINING_LENGTH_BYTES {
        return Err(ProtocolError::MalformedRemainingLength);
    }
    Ok(None)
}

/// Number of bytes needed to encode `value`
pub const fn encoded_len(value: usize) -> usize {
    if value < 128 {
        1
    } else if value < 16_384 {
        2
    } else if value < 2_097_152 {
        3
    } else {
        4
    }
}

/// Append the encoding of `value` to `buf`
///
/// Callers check `value <= MAX_REMAINING_LENGTH` first.
pub fn encode<B: BufMut>(mut value: usize, buf: &mut B) {
    debug_assert!(value <= MAX_REMAINING_LENGTH);

    loop {
        let mut byte = (value & 0x7F) as u8;
        value >>= 7;
        if value > 0 {
            byte |= CONTINUATION_BIT;
        }
        buf.put_u8(byte);
        if value == 0 {
            break;
        }
    }
}
