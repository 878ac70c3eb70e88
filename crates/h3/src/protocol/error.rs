use std::error::Error;
use std::io;
use thiserror::Error;

use crate::protocol::ErrorCode;

/// Top-level error type of the HTTP/3 engine.
#[derive(Debug, Error)]
pub enum H3Error {
    #[error("decode error: {source}")]
    Decode {
        #[from]
        source: DecodeError,
    },

    #[error("protocol error {code}: {reason}")]
    Protocol { code: ErrorCode, reason: String },

    #[error("malformed message: {reason}")]
    Message { reason: String },

    #[error("writer error: {source}")]
    Writer {
        #[from]
        source: WriterError,
    },

    #[error("stream reset by peer with {code}")]
    StreamReset { code: ErrorCode },

    #[error("handler error: {source}")]
    Handler { source: Box<dyn Error + Send + Sync> },

    #[error("transport error: {source}")]
    Transport {
        #[from]
        source: io::Error,
    },
}

impl H3Error {
    pub fn protocol<S: ToString>(code: ErrorCode, reason: S) -> Self {
        Self::Protocol { code, reason: reason.to_string() }
    }

    pub fn message<S: ToString>(str: S) -> Self {
        Self::Message { reason: str.to_string() }
    }

    pub fn handler<E: Into<Box<dyn Error + Send + Sync>>>(e: E) -> Self {
        Self::Handler { source: e.into() }
    }

    pub fn transport<E: Into<io::Error>>(e: E) -> Self {
        Self::Transport { source: e.into() }
    }

    /// The application error code a peer should observe for this error.
    pub fn code(&self) -> ErrorCode {
        match self {
            H3Error::Decode { source } => source.code(),
            H3Error::Protocol { code, .. } => *code,
            H3Error::Message { .. } => ErrorCode::H3_MESSAGE_ERROR,
            H3Error::StreamReset { code } => *code,
            H3Error::Writer { .. } | H3Error::Handler { .. } | H3Error::Transport { .. } => ErrorCode::H3_INTERNAL_ERROR,
        }
    }
}

/// Errors raised while decoding varints, QPACK integers, field sections and frames.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("qpack integer overflows {width} bits")]
    IntegerOverflow { width: u32 },

    #[error("qpack integer longer than {max_continuation_bytes} continuation bytes")]
    IntegerTooLong { max_continuation_bytes: usize },

    #[error("invalid qpack integer prefix: {prefix_bits} bits")]
    InvalidPrefix { prefix_bits: u8 },

    #[error("varint value {value} exceeds 2^62 - 1")]
    VarIntOverflow { value: u64 },

    #[error("static table index {index} out of range")]
    InvalidStaticIndex { index: u64 },

    #[error("dynamic table reference not supported: {reason}")]
    DynamicTable { reason: &'static str },

    #[error("huffman encoded string literals are not supported")]
    HuffmanUnsupported,

    #[error("field section truncated: {reason}")]
    Truncated { reason: &'static str },

    #[error("invalid frame: {reason}")]
    InvalidFrame { reason: String },

    #[error("invalid settings: {reason}")]
    InvalidSettings { reason: String },
}

impl DecodeError {
    pub fn dynamic_table(reason: &'static str) -> Self {
        Self::DynamicTable { reason }
    }

    pub fn truncated(reason: &'static str) -> Self {
        Self::Truncated { reason }
    }

    pub fn invalid_frame<S: ToString>(str: S) -> Self {
        Self::InvalidFrame { reason: str.to_string() }
    }

    pub fn invalid_settings<S: ToString>(str: S) -> Self {
        Self::InvalidSettings { reason: str.to_string() }
    }

    pub fn code(&self) -> ErrorCode {
        match self {
            DecodeError::InvalidFrame { .. } | DecodeError::VarIntOverflow { .. } => ErrorCode::H3_FRAME_ERROR,
            DecodeError::InvalidSettings { .. } => ErrorCode::H3_SETTINGS_ERROR,
            _ => ErrorCode::QPACK_DECOMPRESSION_FAILED,
        }
    }
}

/// Errors raised by the buffered frame writer.
#[derive(Error, Debug)]
pub enum WriterError {
    #[error("frame writer already completed")]
    Completed,

    #[error("advance {requested} bytes out of range, only {available} available")]
    OutOfRange { requested: usize, available: usize },

    #[error("flush cancelled before write started")]
    Cancelled,

    #[error("frame header error: {source}")]
    Encode {
        #[from]
        source: DecodeError,
    },

    #[error("io error: {source}")]
    Io {
        #[from]
        source: io::Error,
    },
}

impl WriterError {
    pub fn out_of_range(requested: usize, available: usize) -> Self {
        Self::OutOfRange { requested, available }
    }

    pub fn io<E: Into<io::Error>>(e: E) -> Self {
        Self::Io { source: e.into() }
    }
}
