//! QUIC variable-length integer codec
//!
//! Implements the encoding from [RFC 9000 Section 16](https://www.rfc-editor.org/rfc/rfc9000.html#section-16).
//! HTTP/3 uses it for frame types, frame lengths, stream types, setting identifiers
//! and values, and GOAWAY identifiers.
//!
//! The two most significant bits of the first byte select one of four forms:
//!
//! | tag | length | usable bits | range               |
//! |-----|--------|-------------|---------------------|
//! | 00  | 1      | 6           | 0..=63              |
//! | 01  | 2      | 14          | 0..=16383           |
//! | 10  | 4      | 30          | 0..=1073741823      |
//! | 11  | 8      | 62          | 0..=4611686018427387903 |
//!
//! All functions are pure and may be called from any task without synchronization.

use bytes::BufMut;

use crate::ensure;
use crate::protocol::DecodeError;

/// Largest value representable as a varint (2^62 - 1).
pub const MAX_VALUE: u64 = (1 << 62) - 1;

/// Longest encoded form in bytes.
pub const MAX_LEN: usize = 8;

/// Returns the encoded byte length for `value` (1, 2, 4, or 8).
///
/// Values above [`MAX_VALUE`] report 8; [`encode`] rejects them.
#[inline]
pub const fn encoded_len(value: u64) -> usize {
    if value < (1 << 6) {
        1
    } else if value < (1 << 14) {
        2
    } else if value < (1 << 30) {
        4
    } else {
        8
    }
}

/// Returns the total length declared by the tag bits of `first`.
#[inline]
pub const fn declared_len(first: u8) -> usize {
    1 << (first >> 6)
}

/// Encodes `value` into `dst`, returning the number of bytes written.
///
/// # Errors
///
/// Returns [`DecodeError::VarIntOverflow`] when `value` exceeds [`MAX_VALUE`].
pub fn encode<B: BufMut>(value: u64, dst: &mut B) -> Result<usize, DecodeError> {
    ensure!(value <= MAX_VALUE, DecodeError::VarIntOverflow { value });

    let len = encoded_len(value);
    match len {
        1 => dst.put_u8(value as u8),
        2 => dst.put_u16(0x4000 | value as u16),
        4 => dst.put_u32(0x8000_0000 | value as u32),
        _ => dst.put_u64(0xC000_0000_0000_0000 | value),
    }
    Ok(len)
}

/// Encodes `value` into a fixed array, returning the array and the used length.
///
/// Convenient for callers that want to stage a frame header on the stack.
pub fn encode_array(value: u64) -> Result<([u8; MAX_LEN], usize), DecodeError> {
    let mut out = [0u8; MAX_LEN];
    let len = encode(value, &mut &mut out[..])?;
    Ok((out, len))
}

/// Decodes a varint starting at `offset` in `src`.
///
/// # Returns
///
/// - `Ok(Some((value, consumed)))` when a complete varint is present
/// - `Ok(None)` when `src` ends before the declared form is complete
/// - `Err(DecodeError)` when the decoded value breaks the 62-bit ceiling
pub fn decode(src: &[u8], offset: usize) -> Result<Option<(u64, usize)>, DecodeError> {
    let Some(&first) = src.get(offset) else {
        return Ok(None);
    };

    let len = declared_len(first);
    ensure!(len <= MAX_LEN, DecodeError::invalid_frame(format!("varint length {len} exceeds {MAX_LEN}")));

    let Some(bytes) = src.get(offset..offset + len) else {
        return Ok(None);
    };

    let value = bytes[1..].iter().fold(u64::from(first & 0x3f), |acc, b| (acc << 8) | u64::from(*b));
    ensure!(value <= MAX_VALUE, DecodeError::VarIntOverflow { value });

    Ok(Some((value, len)))
}
