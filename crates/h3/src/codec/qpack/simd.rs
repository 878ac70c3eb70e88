//! Vectorized QPACK integer codec
//!
//! Decoding locates the terminating byte (first byte with the MSB clear) of the
//! continuation run in one step instead of testing bytes one by one: an SSE2
//! `movemask` over a 16 byte window on x86_64, two 64-bit SWAR words elsewhere.
//! The 7-bit groups are then compacted with shift-and-mask rounds.
//!
//! Anything outside the fast path falls back to [`Scalar`]: windows shorter than
//! 16 bytes (end of buffer), a run longer than the continuation cap, and values
//! that overflow the requested width. Errors are therefore always the scalar ones.

use crate::codec::qpack::integer::{self, IntegerCodec, MAX_CONTINUATION_BYTES, Scalar, Width, check_prefix, prefix_max};
use crate::protocol::DecodeError;

const LANES: usize = 16;
const MSB_MASK: u64 = 0x8080_8080_8080_8080;

/// The vectorized implementation of [`IntegerCodec`].
#[derive(Debug, Clone, Copy, Default)]
pub struct Simd;

impl IntegerCodec for Simd {
    fn decode(&self, src: &[u8], prefix_bits: u8, width: Width) -> Result<Option<(u64, usize)>, DecodeError> {
        check_prefix(prefix_bits)?;

        let Some((&first, tail)) = src.split_first() else {
            return Ok(None);
        };

        let max = prefix_max(prefix_bits);
        let prefix = u64::from(first) & max;
        if prefix < max {
            return Scalar.decode(src, prefix_bits, width);
        }

        let Some(window) = tail.first_chunk::<LANES>() else {
            return Scalar.decode(src, prefix_bits, width);
        };

        let terminator = match find_terminator(window) {
            Some(index) if index < MAX_CONTINUATION_BYTES => index,
            _ => return Scalar.decode(src, prefix_bits, width),
        };

        let value = u128::from(max) + gather_groups(window, terminator);
        if value > u128::from(width.max()) {
            return Scalar.decode(src, prefix_bits, width);
        }

        Ok(Some((value as u64, terminator + 2)))
    }

    fn encode(&self, value: u64, prefix_bits: u8, flags: u8, dst: &mut [u8]) -> Option<usize> {
        let max = prefix_max(prefix_bits);
        if value < max {
            return integer::encode(value, prefix_bits, flags, dst);
        }

        let remaining = value - max;
        let groups = group_count(remaining);
        if groups > 8 {
            return integer::encode(value, prefix_bits, flags, dst);
        }

        let len = groups + 1;
        let dst = dst.get_mut(..len)?;

        let mut word = scatter_groups(remaining);
        word |= MSB_MASK & low_bytes_mask(groups - 1);

        dst[0] = flags | max as u8;
        dst[1..].copy_from_slice(&word.to_le_bytes()[..groups]);
        Some(len)
    }
}

/// Index of the first byte in `window` with its MSB clear.
#[inline]
pub(crate) fn find_terminator(window: &[u8; LANES]) -> Option<usize> {
    #[cfg(all(target_arch = "x86_64", target_feature = "sse2"))]
    {
        find_terminator_sse2(window)
    }

    #[cfg(not(all(target_arch = "x86_64", target_feature = "sse2")))]
    {
        find_terminator_swar(window)
    }
}

#[cfg(all(target_arch = "x86_64", target_feature = "sse2"))]
#[inline]
fn find_terminator_sse2(window: &[u8; LANES]) -> Option<usize> {
    use std::arch::x86_64::{__m128i, _mm_loadu_si128, _mm_movemask_epi8};

    // SAFETY: sse2 is enabled for this target and `window` is exactly 16 readable
    // bytes; `_mm_loadu_si128` has no alignment requirement.
    let continuation = unsafe {
        let lanes = _mm_loadu_si128(window.as_ptr().cast::<__m128i>());
        _mm_movemask_epi8(lanes)
    } as u32;

    // bit i of the mask is the MSB of byte i
    let terminators = !continuation & 0xFFFF;
    (terminators != 0).then(|| terminators.trailing_zeros() as usize)
}

#[inline]
pub(crate) fn find_terminator_swar(window: &[u8; LANES]) -> Option<usize> {
    let (low, high) = window.split_at(8);
    for (word_index, chunk) in [low, high].into_iter().enumerate() {
        let mut bytes = [0u8; 8];
        bytes.copy_from_slice(chunk);
        let terminators = !u64::from_le_bytes(bytes) & MSB_MASK;
        if terminators != 0 {
            return Some(word_index * 8 + (terminators.trailing_zeros() / 8) as usize);
        }
    }
    None
}

/// Sums the 7-bit groups of `window[..=terminator]`, little-endian.
#[inline]
fn gather_groups(window: &[u8; LANES], terminator: usize) -> u128 {
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&window[..8]);
    let word = u64::from_le_bytes(bytes) & low_bytes_mask(terminator + 1) & !MSB_MASK;

    // 8 x 7 bits -> 4 x 14 -> 2 x 28 -> 56 contiguous bits
    let word = ((word & 0x7f00_7f00_7f00_7f00) >> 1) | (word & 0x007f_007f_007f_007f);
    let word = ((word & 0x3fff_0000_3fff_0000) >> 2) | (word & 0x0000_3fff_0000_3fff);
    let word = ((word & 0x0fff_ffff_0000_0000) >> 4) | (word & 0x0000_0000_0fff_ffff);

    let mut value = u128::from(word);
    for (k, &byte) in window.iter().enumerate().take(terminator + 1).skip(8) {
        value |= u128::from(byte & 0x7f) << (7 * k);
    }
    value
}

/// Spreads the low 56 bits of `value` into eight 7-bit groups, one per byte.
#[inline]
fn scatter_groups(value: u64) -> u64 {
    let word = ((value & 0x00ff_ffff_f000_0000) << 4) | (value & 0x0000_0000_0fff_ffff);
    let word = ((word & 0x0fff_c000_0fff_c000) << 2) | (word & 0x0000_3fff_0000_3fff);
    ((word & 0x3f80_3f80_3f80_3f80) << 1) | (word & 0x007f_007f_007f_007f)
}

#[inline]
fn group_count(value: u64) -> usize {
    let bits = 64 - value.leading_zeros() as usize;
    bits.div_ceil(7).max(1)
}

#[inline]
fn low_bytes_mask(bytes: usize) -> u64 {
    if bytes >= 8 { u64::MAX } else { (1u64 << (8 * bytes)) - 1 }
}
