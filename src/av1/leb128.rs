//! Unsigned little-endian base-128 variable-length integers, bounded to 8
//! bytes as AV1 OBU sizes require.
//!
//! Based on `rtp::codecs::av1::leb128`, reworked to return tagged errors
//! instead of silently returning `(0, 0)` on malformed input.

use bytes::{BufMut, BytesMut};

use crate::error::{Error, Result};

/// Largest number of bytes a conforming LEB128 value may span.
pub const MAX_LEB128_BYTES: usize = 8;

/// Encodes `val` as LEB128 and appends it to `out`.
pub fn encode(mut val: u64, out: &mut BytesMut) {
    loop {
        let mut byte = (val & 0x7f) as u8;
        val >>= 7;
        if val != 0 {
            byte |= 0x80;
            out.put_u8(byte);
        } else {
            out.put_u8(byte);
            return;
        }
    }
}

/// Returns the number of bytes `encode` would emit for `val`.
pub fn encoded_len(mut val: u64) -> usize {
    let mut len = 1;
    while val >= 0x80 {
        len += 1;
        val >>= 7;
    }
    len
}

/// Decodes a LEB128 value from the front of `buf`, returning the value and
/// the number of bytes consumed.
///
/// Fails with [`Error::Leb128Truncated`] if `buf` ends before a
/// terminating byte (high bit clear) is seen, and with
/// [`Error::Leb128TooManyBytes`] if no terminator appears within
/// [`MAX_LEB128_BYTES`] bytes.
pub fn decode(buf: &[u8]) -> Result<(u64, usize)> {
    let mut value: u64 = 0;
    for (i, &byte) in buf.iter().take(MAX_LEB128_BYTES).enumerate() {
        value |= ((byte & 0x7f) as u64) << (7 * i);
        if byte & 0x80 == 0 {
            return Ok((value, i + 1));
        }
    }
    if buf.len() < MAX_LEB128_BYTES {
        Err(Error::Leb128Truncated(buf.len()))
    } else {
        Err(Error::Leb128TooManyBytes)
    }
}

#[cfg(test)]
#[path = "leb128_test.rs"]
mod leb128_test;
