//! QPACK field section encoder, static table only
//!
//! Every function writes into a caller supplied slice and returns the number of
//! bytes written, or `None` without touching the slice when it is too small.
//! [`put_with`] wraps that contract for growable buffers by doubling the scratch
//! space until the representation fits.

use bytes::BytesMut;

use crate::codec::qpack::integer::{encode, encoded_len};
use crate::codec::qpack::static_table::{self, StaticMatch};

const INDEXED_STATIC: u8 = 0b1100_0000;
const LITERAL_STATIC_NAME: u8 = 0b0101_0000;
const LITERAL_NAME: u8 = 0b0010_0000;

const MIN_SCRATCH: usize = 64;

/// Writes the block prefix: Required Insert Count 0, Delta Base 0.
pub fn encode_prefix(dst: &mut [u8]) -> Option<usize> {
    let dst = dst.get_mut(..2)?;
    dst.fill(0);
    Some(2)
}

/// Indexed field line referencing static entry `index`.
pub fn encode_static_indexed(index: usize, dst: &mut [u8]) -> Option<usize> {
    encode(index as u64, 6, INDEXED_STATIC, dst)
}

/// Literal value with a name taken from static entry `index`.
pub fn encode_literal_with_static_name(index: usize, value: &[u8], dst: &mut [u8]) -> Option<usize> {
    let index_len = encoded_len(index as u64, 4);
    let total = index_len + string_len(value, 7);
    let dst = dst.get_mut(..total)?;

    encode(index as u64, 4, LITERAL_STATIC_NAME, dst)?;
    encode_string(value, 7, 0, &mut dst[index_len..])?;
    Some(total)
}

/// Literal name and literal value.
pub fn encode_literal_without_name(name: &[u8], value: &[u8], dst: &mut [u8]) -> Option<usize> {
    let name_len = string_len(name, 3);
    let total = name_len + string_len(value, 7);
    let dst = dst.get_mut(..total)?;

    encode_string(name, 3, LITERAL_NAME, dst)?;
    encode_string(value, 7, 0, &mut dst[name_len..])?;
    Some(total)
}

/// Encodes a field with the tightest static representation available.
pub fn encode_field(name: &[u8], value: &[u8], dst: &mut [u8]) -> Option<usize> {
    match static_table::find(name, value) {
        StaticMatch::Exact(index) => encode_static_indexed(index, dst),
        StaticMatch::Name(index) => encode_literal_with_static_name(index, value, dst),
        StaticMatch::None => encode_literal_without_name(name, value, dst),
    }
}

#[inline]
fn string_len(bytes: &[u8], prefix_bits: u8) -> usize {
    encoded_len(bytes.len() as u64, prefix_bits) + bytes.len()
}

/// Raw octets; the H flag above the prefix stays clear.
fn encode_string(bytes: &[u8], prefix_bits: u8, flags: u8, dst: &mut [u8]) -> Option<usize> {
    let n = encode(bytes.len() as u64, prefix_bits, flags, dst)?;
    let end = n + bytes.len();
    dst.get_mut(n..end)?.copy_from_slice(bytes);
    Some(end)
}

/// Appends the output of `encode_fn` to `dst`, doubling the scratch space each
/// time the encoder reports that it did not fit.
pub fn put_with<F>(dst: &mut BytesMut, mut encode_fn: F)
where
    F: FnMut(&mut [u8]) -> Option<usize>,
{
    let start = dst.len();
    let mut scratch = (dst.capacity() - start).max(MIN_SCRATCH);
    loop {
        dst.resize(start + scratch, 0);
        if let Some(n) = encode_fn(&mut dst[start..]) {
            dst.truncate(start + n);
            return;
        }
        dst.truncate(start);
        scratch *= 2;
    }
}

/// Encodes a whole field section, block prefix included, into `dst`.
///
/// Returns the section size as counted against SETTINGS_MAX_FIELD_SECTION_SIZE:
/// every field contributes its name and value lengths plus 32.
pub fn encode_field_section<'a, I>(fields: I, dst: &mut BytesMut) -> u64
where
    I: IntoIterator<Item = (&'a [u8], &'a [u8])>,
{
    put_with(dst, encode_prefix);
    let mut size = 0u64;
    for (name, value) in fields {
        put_with(dst, |buf| encode_field(name, value, buf));
        size += (name.len() + value.len() + 32) as u64;
    }
    size
}
