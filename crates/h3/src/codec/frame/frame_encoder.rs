//! HTTP/3 frame encoding
//!
//! Every frame is `type (varint) || length (varint) || payload`. The pure
//! builders [`settings`] and [`goaway`] return complete frames; [`FrameEncoder`]
//! plugs the same layout into `FramedWrite`.

use bytes::{BufMut, Bytes, BytesMut};
use tokio_util::codec::Encoder;

use crate::codec::varint;
use crate::protocol::{DecodeError, Frame, FrameType, H3Error, Settings};

/// Writes a frame header, returning its length.
pub fn write_frame_header<B: BufMut>(ty: FrameType, payload_len: u64, dst: &mut B) -> Result<usize, DecodeError> {
    let n = varint::encode(ty.as_u64(), dst)?;
    Ok(n + varint::encode(payload_len, dst)?)
}

/// Length of the header [`write_frame_header`] produces.
#[inline]
pub fn frame_header_len(ty: FrameType, payload_len: u64) -> usize {
    varint::encoded_len(ty.as_u64()) + varint::encoded_len(payload_len)
}

/// A complete SETTINGS frame.
pub fn settings(settings: &Settings) -> Result<Bytes, DecodeError> {
    let payload_len = settings.payload_len();
    let mut buf = BytesMut::with_capacity(frame_header_len(FrameType::SETTINGS, payload_len as u64) + payload_len);
    write_frame_header(FrameType::SETTINGS, payload_len as u64, &mut buf)?;
    settings.encode_payload(&mut buf)?;
    Ok(buf.freeze())
}

/// A complete GOAWAY frame carrying `id`.
pub fn goaway(id: u64) -> Result<Bytes, DecodeError> {
    let payload_len = varint::encoded_len(id) as u64;
    let mut buf = BytesMut::with_capacity(varint::MAX_LEN * 3);
    write_frame_header(FrameType::GOAWAY, payload_len, &mut buf)?;
    varint::encode(id, &mut buf)?;
    Ok(buf.freeze())
}

#[derive(Debug, Clone, Copy, Default)]
pub struct FrameEncoder;

impl Encoder<Frame> for FrameEncoder {
    type Error = H3Error;

    /// Unknown frame types are written with an empty payload, which is how GREASE
    /// frames are sent.
    fn encode(&mut self, frame: Frame, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let ty = frame.frame_type();
        match frame {
            Frame::Data(payload) | Frame::Headers(payload) => {
                dst.reserve(frame_header_len(ty, payload.len() as u64) + payload.len());
                write_frame_header(ty, payload.len() as u64, dst)?;
                dst.extend_from_slice(&payload);
            }
            Frame::Settings(ref s) => dst.extend_from_slice(&settings(s)?),
            Frame::GoAway(id) => dst.extend_from_slice(&goaway(id)?),
            Frame::Unknown(_) => {
                write_frame_header(ty, 0, dst)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::settings::SETTINGS_MAX_FIELD_SECTION_SIZE;

    #[test]
    fn goaway_fixtures() {
        assert_eq!(&goaway(63).unwrap()[..], &[0x07, 0x01, 0x3F]);
        assert_eq!(&goaway(64).unwrap()[..], &[0x07, 0x02, 0x40, 0x40]);
    }

    #[test]
    fn settings_fixture() {
        let mut s = Settings::new();
        s.insert(SETTINGS_MAX_FIELD_SECTION_SIZE, 63);
        assert_eq!(&settings(&s).unwrap()[..], &[0x04, 0x02, 0x06, 0x3F]);
        assert_eq!(&settings(&Settings::new()).unwrap()[..], &[0x04, 0x00]);
    }

    #[test]
    fn goaway_rejects_out_of_range_id() {
        assert!(goaway(varint::MAX_VALUE + 1).is_err());
    }

    #[test]
    fn encoder_matches_builders() {
        let mut encoder = FrameEncoder;
        let mut buf = BytesMut::new();

        encoder.encode(Frame::GoAway(64), &mut buf).unwrap();
        encoder.encode(Frame::Headers(Bytes::from_static(&[0x00, 0x00, 0xD1])), &mut buf).unwrap();
        encoder.encode(Frame::Data(Bytes::from_static(b"hi")), &mut buf).unwrap();
        encoder.encode(Frame::Unknown(FrameType::from_u64(0x21)), &mut buf).unwrap();

        assert_eq!(
            &buf[..],
            &[0x07, 0x02, 0x40, 0x40, 0x01, 0x03, 0x00, 0x00, 0xD1, 0x00, 0x02, b'h', b'i', 0x21, 0x00]
        );
    }
}
