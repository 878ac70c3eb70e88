use std::fmt;

/// An HTTP/3 application error code, carried by stream resets and connection closes.
///
/// See [RFC 9114 Section 8.1](https://www.rfc-editor.org/rfc/rfc9114.html#section-8.1)
/// and [RFC 9204 Section 6](https://www.rfc-editor.org/rfc/rfc9204.html#section-6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ErrorCode(u64);

impl ErrorCode {
    pub const H3_NO_ERROR: ErrorCode = ErrorCode(0x100);
    pub const H3_GENERAL_PROTOCOL_ERROR: ErrorCode = ErrorCode(0x101);
    pub const H3_INTERNAL_ERROR: ErrorCode = ErrorCode(0x102);
    pub const H3_STREAM_CREATION_ERROR: ErrorCode = ErrorCode(0x103);
    pub const H3_CLOSED_CRITICAL_STREAM: ErrorCode = ErrorCode(0x104);
    pub const H3_FRAME_UNEXPECTED: ErrorCode = ErrorCode(0x105);
    pub const H3_FRAME_ERROR: ErrorCode = ErrorCode(0x106);
    pub const H3_EXCESSIVE_LOAD: ErrorCode = ErrorCode(0x107);
    pub const H3_ID_ERROR: ErrorCode = ErrorCode(0x108);
    pub const H3_SETTINGS_ERROR: ErrorCode = ErrorCode(0x109);
    pub const H3_MISSING_SETTINGS: ErrorCode = ErrorCode(0x10a);
    pub const H3_REQUEST_REJECTED: ErrorCode = ErrorCode(0x10b);
    pub const H3_REQUEST_CANCELLED: ErrorCode = ErrorCode(0x10c);
    pub const H3_REQUEST_INCOMPLETE: ErrorCode = ErrorCode(0x10d);
    pub const H3_MESSAGE_ERROR: ErrorCode = ErrorCode(0x10e);
    pub const H3_CONNECT_ERROR: ErrorCode = ErrorCode(0x10f);
    pub const H3_VERSION_FALLBACK: ErrorCode = ErrorCode(0x110);
    pub const QPACK_DECOMPRESSION_FAILED: ErrorCode = ErrorCode(0x200);

    #[inline]
    pub const fn from_u64(code: u64) -> Self {
        Self(code)
    }

    #[inline]
    pub const fn as_u64(self) -> u64 {
        self.0
    }

    /// The registered name of this code, if it is one we know.
    pub fn name(self) -> Option<&'static str> {
        let name = match self {
            Self::H3_NO_ERROR => "H3_NO_ERROR",
            Self::H3_GENERAL_PROTOCOL_ERROR => "H3_GENERAL_PROTOCOL_ERROR",
            Self::H3_INTERNAL_ERROR => "H3_INTERNAL_ERROR",
            Self::H3_STREAM_CREATION_ERROR => "H3_STREAM_CREATION_ERROR",
            Self::H3_CLOSED_CRITICAL_STREAM => "H3_CLOSED_CRITICAL_STREAM",
            Self::H3_FRAME_UNEXPECTED => "H3_FRAME_UNEXPECTED",
            Self::H3_FRAME_ERROR => "H3_FRAME_ERROR",
            Self::H3_EXCESSIVE_LOAD => "H3_EXCESSIVE_LOAD",
            Self::H3_ID_ERROR => "H3_ID_ERROR",
            Self::H3_SETTINGS_ERROR => "H3_SETTINGS_ERROR",
            Self::H3_MISSING_SETTINGS => "H3_MISSING_SETTINGS",
            Self::H3_REQUEST_REJECTED => "H3_REQUEST_REJECTED",
            Self::H3_REQUEST_CANCELLED => "H3_REQUEST_CANCELLED",
            Self::H3_REQUEST_INCOMPLETE => "H3_REQUEST_INCOMPLETE",
            Self::H3_MESSAGE_ERROR => "H3_MESSAGE_ERROR",
            Self::H3_CONNECT_ERROR => "H3_CONNECT_ERROR",
            Self::H3_VERSION_FALLBACK => "H3_VERSION_FALLBACK",
            Self::QPACK_DECOMPRESSION_FAILED => "QPACK_DECOMPRESSION_FAILED",
            _ => return None,
        };
        Some(name)
    }
}

impl From<ErrorCode> for u64 {
    fn from(code: ErrorCode) -> Self {
        code.0
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            Some(name) => write!(f, "{name}(0x{:x})", self.0),
            None => write!(f, "0x{:x}", self.0),
        }
    }
}
