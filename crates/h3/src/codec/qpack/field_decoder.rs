//! QPACK field section decoder, static table only
//!
//! A field section starts with the encoded Required Insert Count and the signed
//! Delta Base. Without a dynamic table both must be zero. The field lines that
//! follow are reported one by one to a [`FieldLineHandler`], in wire order.
//!
//! The decoder is resumable: [`FieldLineDecoder::decode`] reports how many bytes
//! it consumed, always ending on a field line boundary. The caller drops those
//! bytes, keeps the rest and calls again once more input arrived.

use crate::codec::qpack::integer::IntegerCodec;
use crate::codec::qpack::simd::Simd;
use crate::codec::qpack::static_table;
use crate::ensure;
use crate::protocol::{DecodeError, HeaderField};
use bytes::Bytes;
use tracing::trace;

/// One decoded field line. Slices borrow from the decoder input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldLine<'a> {
    /// Indexed field line referencing the static table
    Static(usize),
    /// Literal value with a static table name reference
    StaticName { index: usize, value: &'a [u8] },
    /// Literal name and literal value
    Literal { name: &'a [u8], value: &'a [u8] },
}

impl FieldLine<'_> {
    pub fn name(&self) -> &[u8] {
        match self {
            FieldLine::Static(index) | FieldLine::StaticName { index, .. } => {
                static_table::STATIC_TABLE[*index].name.as_bytes()
            }
            FieldLine::Literal { name, .. } => name,
        }
    }

    pub fn value(&self) -> &[u8] {
        match self {
            FieldLine::Static(index) => static_table::STATIC_TABLE[*index].value.as_bytes(),
            FieldLine::StaticName { value, .. } | FieldLine::Literal { value, .. } => value,
        }
    }

    /// Copies the line into an owned field; static rows are not copied.
    pub fn to_header_field(&self) -> HeaderField {
        match self {
            FieldLine::Static(index) => {
                let entry = &static_table::STATIC_TABLE[*index];
                HeaderField::new(Bytes::from_static(entry.name.as_bytes()), Bytes::from_static(entry.value.as_bytes()))
            }
            FieldLine::StaticName { index, value } => HeaderField::new(
                Bytes::from_static(static_table::STATIC_TABLE[*index].name.as_bytes()),
                Bytes::copy_from_slice(value),
            ),
            FieldLine::Literal { name, value } => {
                HeaderField::new(Bytes::copy_from_slice(name), Bytes::copy_from_slice(value))
            }
        }
    }
}

/// Receives decoded field lines.
pub trait FieldLineHandler {
    fn on_field_line(&mut self, line: FieldLine<'_>) -> Result<(), DecodeError>;
}

impl FieldLineHandler for Vec<HeaderField> {
    fn on_field_line(&mut self, line: FieldLine<'_>) -> Result<(), DecodeError> {
        self.push(line.to_header_field());
        Ok(())
    }
}

/// Outcome of decoding one piece of a field line.
enum Step<T> {
    Done(T, usize),
    /// At least this many bytes, counted from the start of the piece, are needed.
    Need(usize),
}

/// Resumable decoder for one field section.
#[derive(Debug, Clone)]
pub struct FieldLineDecoder<C = Simd> {
    codec: C,
    prefix_consumed: bool,
    // bytes the pending field line needs before it is worth parsing again
    pending: usize,
}

impl FieldLineDecoder<Simd> {
    pub fn new() -> Self {
        Self::with_codec(Simd)
    }
}

impl Default for FieldLineDecoder<Simd> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: IntegerCodec> FieldLineDecoder<C> {
    pub fn with_codec(codec: C) -> Self {
        Self { codec, prefix_consumed: false, pending: 0 }
    }

    /// Forgets the consumed block prefix so a new field section can be decoded.
    pub fn reset(&mut self) {
        self.prefix_consumed = false;
        self.pending = 0;
    }

    pub fn is_prefix_consumed(&self) -> bool {
        self.prefix_consumed
    }

    /// Decodes as many complete field lines from `src` as possible.
    ///
    /// Returns the number of bytes consumed, which never splits a field line.
    /// Once the length of a partial line is known, calls that cannot complete it
    /// return without parsing it again.
    ///
    /// # Errors
    ///
    /// - [`DecodeError::DynamicTable`] for a non-zero block prefix, a dynamic or post-base reference
    /// - [`DecodeError::HuffmanUnsupported`] for a Huffman encoded string
    /// - [`DecodeError::InvalidStaticIndex`] for a static index outside the table
    /// - integer errors from the prefixed integer codec
    pub fn decode<H>(&mut self, src: &[u8], handler: &mut H) -> Result<usize, DecodeError>
    where
        H: FieldLineHandler + ?Sized,
    {
        let mut consumed = 0;

        if !self.prefix_consumed {
            match self.decode_prefix(src)? {
                Some(n) => {
                    consumed = n;
                    self.prefix_consumed = true;
                }
                None => return Ok(0),
            }
        }

        loop {
            let rest = &src[consumed..];
            if rest.is_empty() || rest.len() < self.pending {
                return Ok(consumed);
            }
            match self.decode_line(rest)? {
                Step::Done(line, n) => {
                    trace!(name = ?String::from_utf8_lossy(line.name()), "decoded field line");
                    handler.on_field_line(line)?;
                    consumed += n;
                    self.pending = 0;
                }
                Step::Need(n) => {
                    self.pending = n;
                    return Ok(consumed);
                }
            }
        }
    }

    fn decode_prefix(&self, src: &[u8]) -> Result<Option<usize>, DecodeError> {
        let Some((required_insert_count, n)) = self.codec.decode_u62(src, 8)? else {
            return Ok(None);
        };
        ensure!(required_insert_count == 0, DecodeError::dynamic_table("required insert count is not zero"));

        let rest = &src[n..];
        let Some((delta_base, m)) = self.codec.decode_u62(rest, 7)? else {
            return Ok(None);
        };
        ensure!(rest[0] & 0x80 == 0 && delta_base == 0, DecodeError::dynamic_table("delta base is not zero"));

        Ok(Some(n + m))
    }

    fn decode_line<'a>(&self, src: &'a [u8]) -> Result<Step<FieldLine<'a>>, DecodeError> {
        let Some(&first) = src.first() else {
            return Ok(Step::Need(1));
        };

        // 1Txxxxxx: indexed field line
        if first & 0x80 != 0 {
            ensure!(first & 0x40 != 0, DecodeError::dynamic_table("indexed field line"));
            let Some((index, n)) = self.codec.decode_u62(src, 6)? else {
                return Ok(Step::Need(src.len() + 1));
            };
            let index = static_index(index)?;
            return Ok(Step::Done(FieldLine::Static(index), n));
        }

        // 01NTxxxx: literal field line with name reference
        if first & 0xC0 == 0x40 {
            ensure!(first & 0x10 != 0, DecodeError::dynamic_table("literal field line with name reference"));
            let Some((index, n)) = self.codec.decode_u62(src, 4)? else {
                return Ok(Step::Need(src.len() + 1));
            };
            let index = static_index(index)?;
            return Ok(match self.decode_string(&src[n..], 7)? {
                Step::Done(value, m) => Step::Done(FieldLine::StaticName { index, value }, n + m),
                Step::Need(m) => Step::Need(n + m),
            });
        }

        // 001NHxxx: literal field line with literal name
        if first & 0xE0 == 0x20 {
            let (name, n) = match self.decode_string(src, 3)? {
                Step::Done(name, n) => (name, n),
                Step::Need(n) => return Ok(Step::Need(n)),
            };
            return Ok(match self.decode_string(&src[n..], 7)? {
                Step::Done(value, m) => Step::Done(FieldLine::Literal { name, value }, n + m),
                Step::Need(m) => Step::Need(n + m),
            });
        }

        // 0001xxxx and 0000Nxxx
        if first & 0xF0 == 0x10 {
            Err(DecodeError::dynamic_table("indexed field line with post-base index"))
        } else {
            Err(DecodeError::dynamic_table("literal field line with post-base name reference"))
        }
    }

    /// Decodes a string literal whose H flag sits right above `prefix_bits`.
    fn decode_string<'a>(&self, src: &'a [u8], prefix_bits: u8) -> Result<Step<&'a [u8]>, DecodeError> {
        let Some(&first) = src.first() else {
            return Ok(Step::Need(1));
        };
        ensure!(first & (1 << prefix_bits) == 0, DecodeError::HuffmanUnsupported);

        let Some((len, n)) = self.codec.decode_u32(src, prefix_bits)? else {
            return Ok(Step::Need(src.len() + 1));
        };

        let end = n + len as usize;
        Ok(match src.get(n..end) {
            Some(bytes) => Step::Done(bytes, end),
            None => Step::Need(end),
        })
    }
}

#[inline]
fn static_index(index: u64) -> Result<usize, DecodeError> {
    static_table::get(index)?;
    Ok(index as usize)
}

/// Decodes a complete field section, failing if it ends inside a field line.
pub fn decode_field_section(src: &[u8]) -> Result<Vec<HeaderField>, DecodeError> {
    let mut fields = Vec::new();
    let consumed = FieldLineDecoder::new().decode(src, &mut fields)?;
    ensure!(consumed == src.len(), DecodeError::truncated("field section ends inside a field line"));
    Ok(fields)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::qpack::integer::{Scalar, Width};
    use std::cell::Cell;

    const PATH_FIXTURE: [u8; 15] =
        [0x00, 0x00, 0x51, 0x0b, 0x2f, 0x69, 0x6e, 0x64, 0x65, 0x78, 0x2e, 0x68, 0x74, 0x6d, 0x6c];

    #[derive(Default)]
    struct Recorder(Vec<String>);

    impl FieldLineHandler for Recorder {
        fn on_field_line(&mut self, line: FieldLine<'_>) -> Result<(), DecodeError> {
            let kind = match line {
                FieldLine::Static(_) => "static",
                FieldLine::StaticName { .. } => "static-name",
                FieldLine::Literal { .. } => "literal",
            };
            self.0.push(format!(
                "{kind} {}={}",
                String::from_utf8_lossy(line.name()),
                String::from_utf8_lossy(line.value())
            ));
            Ok(())
        }
    }

    #[test]
    fn path_fixture() {
        let mut recorder = Recorder::default();
        let consumed = FieldLineDecoder::new().decode(&PATH_FIXTURE, &mut recorder).unwrap();
        assert_eq!(consumed, 15);
        assert_eq!(recorder.0, vec!["static-name :path=/index.html"]);
    }

    #[test]
    fn all_three_representations() {
        let mut src = vec![0x00, 0x00];
        src.push(0xC0 | 17); // :method GET
        src.extend([0x50 | 1, 0x02]); // :path with value
        src.extend(b"/a");
        src.extend([0x20 | 3]); // literal name
        src.extend(b"foo");
        src.extend([0x03]);
        src.extend(b"bar");

        let mut recorder = Recorder::default();
        let consumed = FieldLineDecoder::with_codec(Scalar).decode(&src, &mut recorder).unwrap();
        assert_eq!(consumed, src.len());
        assert_eq!(recorder.0, vec!["static :method=GET", "static-name :path=/a", "literal foo=bar"]);
    }

    #[test]
    fn resumes_on_field_line_boundary() {
        let mut decoder = FieldLineDecoder::new();
        let mut fields = Vec::new();

        // only the prefix and half of the field line
        assert_eq!(decoder.decode(&PATH_FIXTURE[..6], &mut fields).unwrap(), 2);
        assert!(decoder.is_prefix_consumed());
        assert!(fields.is_empty());

        let consumed = decoder.decode(&PATH_FIXTURE[2..], &mut fields).unwrap();
        assert_eq!(consumed, 13);
        assert_eq!(fields, vec![HeaderField::new(":path", "/index.html")]);
    }

    #[test]
    fn byte_by_byte_delivery() {
        let mut decoder = FieldLineDecoder::new();
        let mut fields = Vec::new();
        let mut pending = Vec::new();

        for &byte in &PATH_FIXTURE {
            pending.push(byte);
            let consumed = decoder.decode(&pending, &mut fields).unwrap();
            pending.drain(..consumed);
        }

        assert!(pending.is_empty());
        assert_eq!(fields, vec![HeaderField::new(":path", "/index.html")]);
    }

    /// Counts integer decodes to observe how often a partial line is parsed.
    #[derive(Debug, Default)]
    struct Counting(Cell<usize>);

    impl IntegerCodec for Counting {
        fn decode(&self, src: &[u8], prefix_bits: u8, width: Width) -> Result<Option<(u64, usize)>, DecodeError> {
            self.0.set(self.0.get() + 1);
            Scalar.decode(src, prefix_bits, width)
        }

        fn encode(&self, value: u64, prefix_bits: u8, flags: u8, dst: &mut [u8]) -> Option<usize> {
            Scalar.encode(value, prefix_bits, flags, dst)
        }
    }

    #[test]
    fn long_literal_is_not_reparsed_per_byte() {
        let value = vec![b'v'; 4096];
        let mut src = vec![0x00, 0x00, 0x20 | 3];
        src.extend(b"big");
        // 4096 = 127 + 3969: 0x7F, then 0x81 0x1F
        src.extend([0x7F, 0x81, 0x1F]);
        src.extend(&value);

        let mut decoder = FieldLineDecoder::with_codec(Counting::default());
        let mut fields = Vec::new();
        let mut pending = Vec::new();
        for &byte in &src {
            pending.push(byte);
            let consumed = decoder.decode(&pending, &mut fields).unwrap();
            pending.drain(..consumed);
        }

        assert!(pending.is_empty());
        assert_eq!(fields, vec![HeaderField::new("big", value)]);
        assert!(decoder.codec.0.get() < 64, "{} integer decodes", decoder.codec.0.get());
    }

    #[test]
    fn reset_forgets_partial_line() {
        let mut decoder = FieldLineDecoder::new();
        let mut fields = Vec::new();
        assert_eq!(decoder.decode(&PATH_FIXTURE[..6], &mut fields).unwrap(), 2);

        decoder.reset();
        assert_eq!(decoder.decode(&PATH_FIXTURE, &mut fields).unwrap(), 15);
        assert_eq!(fields, vec![HeaderField::new(":path", "/index.html")]);
    }

    #[test]
    fn incomplete_prefix_consumes_nothing() {
        let mut decoder = FieldLineDecoder::new();
        assert_eq!(decoder.decode(&[0x00], &mut Vec::new()).unwrap(), 0);
        assert!(!decoder.is_prefix_consumed());
    }

    #[test]
    fn dynamic_table_is_rejected() {
        let err = decode_field_section(&[0x01, 0x00]).unwrap_err();
        assert!(matches!(err, DecodeError::DynamicTable { .. }));

        let err = decode_field_section(&[0x00, 0x81]).unwrap_err();
        assert!(matches!(err, DecodeError::DynamicTable { .. }));

        // indexed, dynamic
        let err = decode_field_section(&[0x00, 0x00, 0x80]).unwrap_err();
        assert!(matches!(err, DecodeError::DynamicTable { .. }));

        // post-base index
        let err = decode_field_section(&[0x00, 0x00, 0x10]).unwrap_err();
        assert!(matches!(err, DecodeError::DynamicTable { .. }));
    }

    #[test]
    fn huffman_is_rejected() {
        let err = decode_field_section(&[0x00, 0x00, 0x51, 0x81, 0x00]).unwrap_err();
        assert_eq!(err, DecodeError::HuffmanUnsupported);

        let err = decode_field_section(&[0x00, 0x00, 0x28, 0x00]).unwrap_err();
        assert_eq!(err, DecodeError::HuffmanUnsupported);
    }

    #[test]
    fn static_index_out_of_range() {
        // 0xFF 0x24: 63 + 36 = 99
        let err = decode_field_section(&[0x00, 0x00, 0xFF, 0x24]).unwrap_err();
        assert_eq!(err, DecodeError::InvalidStaticIndex { index: 99 });
    }

    #[test]
    fn truncated_section() {
        let err = decode_field_section(&PATH_FIXTURE[..10]).unwrap_err();
        assert!(matches!(err, DecodeError::Truncated { .. }));
    }
}
