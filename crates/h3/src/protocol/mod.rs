//! Core HTTP/3 protocol types.
//!
//! This module holds the values the codecs produce and the connection consumes.
//! The wire formats themselves live in [`crate::codec`].
//!
//! # Components
//!
//! - **Frames** ([`Frame`], [`FrameType`]): decoded frames and frame type codes
//! - **Settings** ([`settings`]): ordered, unique SETTINGS identifiers and values
//! - **Streams** ([`StreamId`], [`StreamType`], [`StreamRole`], [`StreamDirection`])
//! - **Messages**: [`HeaderField`], [`RequestHeader`] and [`ResponseHead`] map field
//!   sections onto the `http` crate types, [`RecvBody`] streams DATA frames as an
//!   `http_body::Body`
//! - **Errors**: [`H3Error`] at the top, [`DecodeError`] for malformed input,
//!   [`WriterError`] for the buffered frame writer, and the application
//!   [`ErrorCode`] sent to the peer
//!
//! Pseudo-header validation follows RFC 9114 Section 4.3; a malformed message is an
//! [`H3Error::Message`], which resets only the stream that carried it.

mod error;
pub use error::DecodeError;
pub use error::H3Error;
pub use error::WriterError;

mod error_code;
pub use error_code::ErrorCode;

mod frame;
pub use frame::Frame;
pub use frame::FrameType;

pub mod settings;
pub use settings::Settings;

mod stream;
pub use stream::StreamDirection;
pub use stream::StreamId;
pub use stream::StreamRole;
pub use stream::StreamType;

mod header;
pub use header::HeaderField;
pub use header::encode_trailers;
pub use header::field_section_size;
pub use header::trailers_from_fields;

mod request;
pub use request::RequestHeader;

mod response;
pub use response::ResponseHead;
pub use response::encode_response_head;
pub use response::response_head_from_fields;

mod body;
pub use body::RecvBody;
