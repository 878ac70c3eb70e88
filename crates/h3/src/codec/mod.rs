//! Wire codecs for HTTP/3
//!
//! The module is organized from the leaves up:
//!
//! - [`varint`]: QUIC variable-length integers, used by every frame
//! - [`qpack`]: prefixed integers and static-table field sections
//! - [`frame`]: frame decoding and encoding on top of both
//!
//! # Example
//!
//! ```
//! use bytes::BytesMut;
//! use micro_h3::codec::FrameDecoder;
//! use micro_h3::protocol::Frame;
//! use tokio_util::codec::Decoder;
//!
//! let mut decoder = FrameDecoder::new();
//! let mut buf = BytesMut::from(&[0x07, 0x02, 0x40, 0x40][..]);
//! assert_eq!(decoder.decode(&mut buf).unwrap(), Some(Frame::GoAway(64)));
//! ```

pub mod frame;
pub mod qpack;
pub mod varint;

pub use frame::{FrameDecoder, FrameEncoder, UniStreamDecoder, UniStreamItem};
