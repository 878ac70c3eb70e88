//! HTTP/3 frame layer
//!
//! - [`FrameDecoder`]: resumable frame parsing for control and request streams
//! - [`UniStreamDecoder`]: stream type prefix followed by frames
//! - [`frame_encoder`]: frame headers, SETTINGS and GOAWAY builders, [`FrameEncoder`]

pub mod frame_encoder;

mod frame_decoder;
mod uni_stream_decoder;

pub use frame_decoder::{DEFAULT_MAX_CONTROL_FRAME_SIZE, DEFAULT_MAX_HEADERS_FRAME_SIZE, FrameDecoder};
pub use frame_encoder::{FrameEncoder, frame_header_len, goaway, settings, write_frame_header};
pub use uni_stream_decoder::{UniStreamDecoder, UniStreamItem};
