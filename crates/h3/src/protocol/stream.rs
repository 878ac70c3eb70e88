use std::fmt;

/// A QUIC stream identifier. The two low bits encode initiator and direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct StreamId(u64);

impl StreamId {
    #[inline]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    #[inline]
    pub const fn as_u64(self) -> u64 {
        self.0
    }

    #[inline]
    pub const fn is_client_initiated(self) -> bool {
        self.0 & 0x1 == 0
    }

    #[inline]
    pub const fn direction(self) -> StreamDirection {
        if self.0 & 0x2 == 0 { StreamDirection::Bidirectional } else { StreamDirection::Unidirectional }
    }

    /// The `index`-th stream of the given initiator and direction.
    #[inline]
    pub const fn from_parts(index: u64, client_initiated: bool, direction: StreamDirection) -> Self {
        let initiator = if client_initiated { 0 } else { 1 };
        let dir = match direction {
            StreamDirection::Bidirectional => 0,
            StreamDirection::Unidirectional => 2,
        };
        Self((index << 2) | dir | initiator)
    }
}

impl From<StreamId> for u64 {
    fn from(id: StreamId) -> Self {
        id.0
    }
}

impl fmt::Display for StreamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamDirection {
    Unidirectional,
    Bidirectional,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamRole {
    Control,
    Request,
}

/// Unidirectional stream type, [RFC 9114 Section 6.2](https://www.rfc-editor.org/rfc/rfc9114.html#section-6.2).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StreamType(u64);

impl StreamType {
    pub const CONTROL: StreamType = StreamType(0x00);
    pub const PUSH: StreamType = StreamType(0x01);
    pub const QPACK_ENCODER: StreamType = StreamType(0x02);
    pub const QPACK_DECODER: StreamType = StreamType(0x03);

    #[inline]
    pub const fn from_u64(ty: u64) -> Self {
        Self(ty)
    }

    #[inline]
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for StreamType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            StreamType::CONTROL => f.write_str("control"),
            StreamType::PUSH => f.write_str("push"),
            StreamType::QPACK_ENCODER => f.write_str("qpack encoder"),
            StreamType::QPACK_DECODER => f.write_str("qpack decoder"),
            StreamType(ty) => write!(f, "0x{ty:x}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stream_id_bits() {
        assert!(StreamId::new(0).is_client_initiated());
        assert_eq!(StreamId::new(0).direction(), StreamDirection::Bidirectional);
        assert_eq!(StreamId::new(2).direction(), StreamDirection::Unidirectional);
        assert!(!StreamId::new(3).is_client_initiated());

        assert_eq!(StreamId::from_parts(1, true, StreamDirection::Bidirectional), StreamId::new(4));
        assert_eq!(StreamId::from_parts(0, false, StreamDirection::Unidirectional), StreamId::new(3));
    }
}
