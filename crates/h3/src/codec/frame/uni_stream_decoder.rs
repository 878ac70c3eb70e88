use bytes::{Buf, BytesMut};
use tokio_util::codec::Decoder;

use crate::codec::FrameDecoder;
use crate::codec::varint;
use crate::protocol::{Frame, H3Error, StreamType};

/// Items of a unidirectional stream: its type once, then frames.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UniStreamItem {
    StreamType(StreamType),
    Frame(Frame),
}

/// Decodes the leading stream type varint, then delegates to [`FrameDecoder`].
///
/// Both steps are resumable, so the type may arrive split over several reads.
#[derive(Debug, Clone, Default)]
pub struct UniStreamDecoder {
    stream_type: Option<StreamType>,
    frames: FrameDecoder,
}

impl UniStreamDecoder {
    pub fn new(frames: FrameDecoder) -> Self {
        Self { stream_type: None, frames }
    }

    pub fn stream_type(&self) -> Option<StreamType> {
        self.stream_type
    }
}

impl Decoder for UniStreamDecoder {
    type Item = UniStreamItem;
    type Error = H3Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if self.stream_type.is_some() {
            return Ok(self.frames.decode(src)?.map(UniStreamItem::Frame));
        }

        let Some((ty, n)) = varint::decode(src, 0)? else {
            return Ok(None);
        };
        src.advance(n);

        let ty = StreamType::from_u64(ty);
        self.stream_type = Some(ty);
        Ok(Some(UniStreamItem::StreamType(ty)))
    }

    fn decode_eof(&mut self, buf: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if self.stream_type.is_some() {
            return Ok(self.frames.decode_eof(buf)?.map(UniStreamItem::Frame));
        }
        self.decode(buf)
    }
}
