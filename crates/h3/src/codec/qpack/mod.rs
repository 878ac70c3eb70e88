//! QPACK without the dynamic table
//!
//! - [`integer`]: prefixed integers, scalar and resumable
//! - [`simd`]: the vectorized integer path, interchangeable through [`IntegerCodec`]
//! - [`static_table`]: the 99 predefined fields
//! - [`FieldLineDecoder`] / [`field_encoder`]: field sections made of static
//!   references and raw literals
//!
//! Huffman coded literals and dynamic table references are rejected as decoding
//! errors.

pub mod field_encoder;
pub mod integer;
pub mod simd;
pub mod static_table;

mod field_decoder;

pub use field_decoder::{FieldLine, FieldLineDecoder, FieldLineHandler, decode_field_section};
pub use field_encoder::encode_field_section;
pub use integer::{IntegerCodec, IntegerDecoder, Scalar, Width};
pub use simd::Simd;
