//! QPACK prefixed integer codec
//!
//! Implements the integer representation of
//! [RFC 9204 Section 4.1.1](https://www.rfc-editor.org/rfc/rfc9204.html#section-4.1.1),
//! shared with HPACK ([RFC 7541 Section 5.1](https://www.rfc-editor.org/rfc/rfc7541.html#section-5.1)).
//!
//! An integer starts in the low `N` bits of a byte whose high bits belong to the
//! caller (instruction pattern, flags). Values smaller than `2^N - 1` fit in the
//! prefix; larger values set the prefix to all ones and continue with
//! little-endian base-128 groups, the MSB of each group flagging continuation.
//!
//! Two entry points exist:
//!
//! - [`IntegerDecoder`]: byte-at-a-time, resumable between reads
//! - [`IntegerCodec`]: slice based, implemented by [`Scalar`] and by the vectorized
//!   [`Simd`](super::Simd) path so the two can be swapped and compared

use crate::ensure;
use crate::protocol::DecodeError;

/// Continuation bytes accepted before an integer is considered malicious.
pub const MAX_CONTINUATION_BYTES: usize = 10;

/// Maximum encoded length: one prefix byte plus the continuation cap.
pub const MAX_ENCODED_LEN: usize = 1 + MAX_CONTINUATION_BYTES;

/// Result width a decode is bounded to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Width {
    U32,
    U62,
}

impl Width {
    #[inline]
    pub const fn max(self) -> u64 {
        match self {
            Width::U32 => u32::MAX as u64,
            Width::U62 => (1 << 62) - 1,
        }
    }

    #[inline]
    pub const fn bits(self) -> u32 {
        match self {
            Width::U32 => 32,
            Width::U62 => 62,
        }
    }

    #[inline]
    pub(crate) fn overflow(self) -> DecodeError {
        DecodeError::IntegerOverflow { width: self.bits() }
    }
}

/// All-ones value of an `prefix_bits` wide prefix.
#[inline]
pub(crate) const fn prefix_max(prefix_bits: u8) -> u64 {
    (1u64 << prefix_bits) - 1
}

#[inline]
pub(crate) fn check_prefix(prefix_bits: u8) -> Result<(), DecodeError> {
    ensure!((1..=8).contains(&prefix_bits), DecodeError::InvalidPrefix { prefix_bits });
    Ok(())
}

/// Number of bytes [`encode`] needs for `value` with an `prefix_bits` prefix.
pub fn encoded_len(value: u64, prefix_bits: u8) -> usize {
    let max = prefix_max(prefix_bits);
    if value < max {
        return 1;
    }

    let mut remaining = value - max;
    let mut len = 2;
    while remaining >= 0x80 {
        remaining >>= 7;
        len += 1;
    }
    len
}

/// Encodes `value` into `dst`, OR-ing `flags` into the first byte.
///
/// Returns the number of bytes written, or `None` when `dst` is too small, in which
/// case nothing is written. `flags` must not overlap the prefix bits.
pub fn encode(value: u64, prefix_bits: u8, flags: u8, dst: &mut [u8]) -> Option<usize> {
    debug_assert!((1..=8).contains(&prefix_bits), "prefix_bits must be 1..=8");
    debug_assert_eq!(u64::from(flags) & prefix_max(prefix_bits), 0, "flags overlap prefix");

    let len = encoded_len(value, prefix_bits);
    let dst = dst.get_mut(..len)?;

    let max = prefix_max(prefix_bits);
    if value < max {
        dst[0] = flags | value as u8;
        return Some(1);
    }

    dst[0] = flags | max as u8;
    let mut remaining = value - max;
    for byte in &mut dst[1..len - 1] {
        *byte = 0x80 | (remaining & 0x7f) as u8;
        remaining >>= 7;
    }
    dst[len - 1] = remaining as u8;
    Some(len)
}

/// Resumable decoder state for one prefixed integer.
///
/// Feed the first byte to [`begin`](Self::begin), then every following byte to
/// [`next`](Self::next) until either returns `Some(value)`. The state survives
/// between calls, so a caller can stop at the end of a read and continue with the
/// next one.
#[derive(Debug, Clone)]
pub struct IntegerDecoder {
    width: Width,
    value: u64,
    shift: u32,
    continuation_bytes: usize,
}

impl IntegerDecoder {
    pub fn new(width: Width) -> Self {
        Self { width, value: 0, shift: 0, continuation_bytes: 0 }
    }

    /// Starts decoding from the first byte of a representation.
    ///
    /// Returns `Some(value)` when the value fits in the prefix, `None` when
    /// continuation bytes must follow.
    pub fn begin(&mut self, first: u8, prefix_bits: u8) -> Result<Option<u64>, DecodeError> {
        check_prefix(prefix_bits)?;

        let max = prefix_max(prefix_bits);
        let value = u64::from(first) & max;
        self.value = value;
        self.shift = 0;
        self.continuation_bytes = 0;

        if value < max {
            ensure!(value <= self.width.max(), self.width.overflow());
            return Ok(Some(value));
        }
        Ok(None)
    }

    /// Consumes one continuation byte.
    ///
    /// # Errors
    ///
    /// - [`DecodeError::IntegerTooLong`] after [`MAX_CONTINUATION_BYTES`] bytes without termination
    /// - [`DecodeError::IntegerOverflow`] when the value leaves the decoder's [`Width`]
    pub fn next(&mut self, byte: u8) -> Result<Option<u64>, DecodeError> {
        self.continuation_bytes += 1;
        ensure!(
            self.continuation_bytes <= MAX_CONTINUATION_BYTES,
            DecodeError::IntegerTooLong { max_continuation_bytes: MAX_CONTINUATION_BYTES }
        );

        let group = u128::from(byte & 0x7f) << self.shift;
        let total = u128::from(self.value) + group;
        ensure!(total <= u128::from(self.width.max()), self.width.overflow());

        self.value = total as u64;
        self.shift += 7;

        if byte & 0x80 == 0 { Ok(Some(self.value)) } else { Ok(None) }
    }
}

/// Decodes one integer from the start of `src`.
///
/// # Returns
///
/// - `Ok(Some((value, consumed)))` on success
/// - `Ok(None)` when `src` ends inside the representation
/// - `Err(DecodeError)` on overflow or too many continuation bytes
pub fn decode(src: &[u8], prefix_bits: u8, width: Width) -> Result<Option<(u64, usize)>, DecodeError> {
    let Some((&first, rest)) = src.split_first() else {
        return Ok(None);
    };

    let mut decoder = IntegerDecoder::new(width);
    if let Some(value) = decoder.begin(first, prefix_bits)? {
        return Ok(Some((value, 1)));
    }

    for (i, &byte) in rest.iter().enumerate() {
        if let Some(value) = decoder.next(byte)? {
            return Ok(Some((value, i + 2)));
        }
    }
    Ok(None)
}

/// Slice based integer codec, implemented by the scalar and the vectorized paths.
///
/// Both implementations must produce identical bytes and identical results,
/// errors included.
pub trait IntegerCodec {
    fn decode(&self, src: &[u8], prefix_bits: u8, width: Width) -> Result<Option<(u64, usize)>, DecodeError>;

    fn encode(&self, value: u64, prefix_bits: u8, flags: u8, dst: &mut [u8]) -> Option<usize>;

    /// Decodes an integer bounded to 32 bits.
    fn decode_u32(&self, src: &[u8], prefix_bits: u8) -> Result<Option<(u32, usize)>, DecodeError> {
        Ok(self.decode(src, prefix_bits, Width::U32)?.map(|(value, consumed)| (value as u32, consumed)))
    }

    /// Decodes an integer bounded to 62 bits.
    fn decode_u62(&self, src: &[u8], prefix_bits: u8) -> Result<Option<(u64, usize)>, DecodeError> {
        self.decode(src, prefix_bits, Width::U62)
    }
}

/// The reference, byte-at-a-time implementation.
#[derive(Debug, Clone, Copy, Default)]
pub struct Scalar;

impl IntegerCodec for Scalar {
    #[inline]
    fn decode(&self, src: &[u8], prefix_bits: u8, width: Width) -> Result<Option<(u64, usize)>, DecodeError> {
        decode(src, prefix_bits, width)
    }

    #[inline]
    fn encode(&self, value: u64, prefix_bits: u8, flags: u8, dst: &mut [u8]) -> Option<usize> {
        encode(value, prefix_bits, flags, dst)
    }
}
