use std::fmt;

use bytes::Bytes;

use crate::protocol::Settings;

/// An HTTP/3 frame type, [RFC 9114 Section 7.2](https://www.rfc-editor.org/rfc/rfc9114.html#section-7.2).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FrameType(u64);

impl FrameType {
    pub const DATA: FrameType = FrameType(0x0);
    pub const HEADERS: FrameType = FrameType(0x1);
    pub const CANCEL_PUSH: FrameType = FrameType(0x3);
    pub const SETTINGS: FrameType = FrameType(0x4);
    pub const PUSH_PROMISE: FrameType = FrameType(0x5);
    pub const GOAWAY: FrameType = FrameType(0x7);
    pub const MAX_PUSH_ID: FrameType = FrameType(0xd);

    #[inline]
    pub const fn from_u64(ty: u64) -> Self {
        Self(ty)
    }

    #[inline]
    pub const fn as_u64(self) -> u64 {
        self.0
    }

    /// Frame types defined by HTTP/2 without an HTTP/3 counterpart (PRIORITY,
    /// PING, WINDOW_UPDATE, CONTINUATION). Receiving one is a connection error.
    #[inline]
    pub const fn is_reserved_http2(self) -> bool {
        matches!(self.0, 0x2 | 0x6 | 0x8 | 0x9)
    }

    /// Reserved `0x1f * N + 0x21` types that exercise unknown frame handling.
    #[inline]
    pub const fn is_grease(self) -> bool {
        self.0 >= 0x21 && (self.0 - 0x21) % 0x1f == 0
    }
}

impl fmt::Display for FrameType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            FrameType::DATA => f.write_str("DATA"),
            FrameType::HEADERS => f.write_str("HEADERS"),
            FrameType::CANCEL_PUSH => f.write_str("CANCEL_PUSH"),
            FrameType::SETTINGS => f.write_str("SETTINGS"),
            FrameType::PUSH_PROMISE => f.write_str("PUSH_PROMISE"),
            FrameType::GOAWAY => f.write_str("GOAWAY"),
            FrameType::MAX_PUSH_ID => f.write_str("MAX_PUSH_ID"),
            FrameType(ty) => write!(f, "0x{ty:x}"),
        }
    }
}

/// A decoded frame.
///
/// DATA payloads are delivered in chunks as they arrive, so one DATA frame on the
/// wire can surface as several [`Frame::Data`] items. Every other known frame is
/// only produced once its whole payload is buffered. Unknown frame payloads are
/// skipped, only the type is reported.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Data(Bytes),
    Headers(Bytes),
    Settings(Settings),
    GoAway(u64),
    Unknown(FrameType),
}

impl Frame {
    pub fn frame_type(&self) -> FrameType {
        match self {
            Frame::Data(_) => FrameType::DATA,
            Frame::Headers(_) => FrameType::HEADERS,
            Frame::Settings(_) => FrameType::SETTINGS,
            Frame::GoAway(_) => FrameType::GOAWAY,
            Frame::Unknown(ty) => *ty,
        }
    }
}
