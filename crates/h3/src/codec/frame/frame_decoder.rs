//! HTTP/3 frame decoder
//!
//! A [`tokio_util::codec::Decoder`] that turns the bytes of a control or request
//! stream into [`Frame`]s. It is resumable: a partially received frame header or
//! payload stays in the read buffer, and the parsed header is kept in the decoder
//! state, until enough bytes arrive.
//!
//! # State Machine
//!
//! - `Header`: waiting for the type and length varints
//! - `Payload`: buffering a complete HEADERS, SETTINGS or GOAWAY payload
//! - `Data`: passing DATA payload through in chunks as it arrives
//! - `Skip`: discarding the payload of an unknown frame type

use bytes::{Buf, BytesMut};
use tokio_util::codec::Decoder;
use tracing::trace;

use crate::codec::varint;
use crate::ensure;
use crate::protocol::{DecodeError, ErrorCode, Frame, FrameType, H3Error, Settings};

/// Default upper bound for SETTINGS and GOAWAY payloads.
pub const DEFAULT_MAX_CONTROL_FRAME_SIZE: usize = 16 * 1024;

/// Default upper bound for HEADERS payloads when no limit is configured.
pub const DEFAULT_MAX_HEADERS_FRAME_SIZE: usize = 64 * 1024;

/// Most a single decode call reserves for a pending payload; the buffer grows
/// with the bytes that actually arrive.
const RESERVE_CHUNK: usize = 8 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Header,
    Payload { ty: FrameType, len: usize },
    Data { remaining: u64 },
    Skip { remaining: u64 },
}

#[derive(Debug, Clone)]
pub struct FrameDecoder {
    state: State,
    max_headers_frame_size: usize,
    max_control_frame_size: usize,
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self {
            state: State::Header,
            max_headers_frame_size: DEFAULT_MAX_HEADERS_FRAME_SIZE,
            max_control_frame_size: DEFAULT_MAX_CONTROL_FRAME_SIZE,
        }
    }

    /// Limits HEADERS payloads; a larger frame is refused with H3_EXCESSIVE_LOAD.
    ///
    /// Without a dynamic table an encoded field line is never longer than its
    /// SETTINGS_MAX_FIELD_SECTION_SIZE contribution, so that limit also bounds the
    /// frame. `None` keeps [`DEFAULT_MAX_HEADERS_FRAME_SIZE`].
    pub fn with_max_headers_frame_size(mut self, limit: Option<usize>) -> Self {
        self.max_headers_frame_size = limit.unwrap_or(DEFAULT_MAX_HEADERS_FRAME_SIZE);
        self
    }

    /// Decoder for a control stream: every buffered frame, HEADERS included, is
    /// bounded by `limit`.
    pub fn for_control_stream(mut self, limit: usize) -> Self {
        self.max_control_frame_size = limit;
        self.max_headers_frame_size = self.max_headers_frame_size.min(limit);
        self
    }

    /// `true` between frames, when no partial frame is pending.
    pub fn is_idle(&self) -> bool {
        self.state == State::Header
    }

    fn decode_header(&mut self, src: &mut BytesMut) -> Result<bool, H3Error> {
        let Some((ty, n)) = varint::decode(src, 0)? else {
            return Ok(false);
        };
        let Some((len, m)) = varint::decode(src, n)? else {
            return Ok(false);
        };

        let ty = FrameType::from_u64(ty);
        ensure!(
            !ty.is_reserved_http2(),
            H3Error::protocol(ErrorCode::H3_FRAME_UNEXPECTED, format!("reserved HTTP/2 frame type {ty}"))
        );
        src.advance(n + m);
        trace!(frame_type = %ty, len, "decoded frame header");

        self.state = match ty {
            FrameType::DATA => State::Data { remaining: len },
            FrameType::HEADERS => {
                let len = self.bounded(ty, len, self.max_headers_frame_size)?;
                State::Payload { ty, len }
            }
            FrameType::SETTINGS | FrameType::GOAWAY => {
                let len = self.bounded(ty, len, self.max_control_frame_size)?;
                State::Payload { ty, len }
            }
            _ => State::Skip { remaining: len },
        };
        Ok(true)
    }

    fn bounded(&self, ty: FrameType, len: u64, limit: usize) -> Result<usize, H3Error> {
        let len = usize::try_from(len).unwrap_or(usize::MAX);
        ensure!(
            len <= limit,
            H3Error::protocol(ErrorCode::H3_EXCESSIVE_LOAD, format!("{ty} frame of {len} bytes exceeds {limit}"))
        );
        Ok(len)
    }
}

fn parse_payload(ty: FrameType, payload: BytesMut) -> Result<Frame, DecodeError> {
    match ty {
        FrameType::HEADERS => Ok(Frame::Headers(payload.freeze())),
        FrameType::SETTINGS => Ok(Frame::Settings(Settings::decode(&payload)?)),
        FrameType::GOAWAY => {
            let (id, n) =
                varint::decode(&payload, 0)?.ok_or_else(|| DecodeError::invalid_frame("GOAWAY payload too short"))?;
            ensure!(n == payload.len(), DecodeError::invalid_frame("GOAWAY payload has trailing bytes"));
            Ok(Frame::GoAway(id))
        }
        _ => Err(DecodeError::invalid_frame(format!("no payload parser for {ty}"))),
    }
}

impl Decoder for FrameDecoder {
    type Item = Frame;
    type Error = H3Error;

    /// # Returns
    ///
    /// - `Ok(Some(frame))`: a frame, or a chunk of a DATA frame
    /// - `Ok(None)`: more bytes are needed
    /// - `Err(_)`: a malformed frame or a frame over its size limit
    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        loop {
            match self.state {
                State::Header => {
                    if !self.decode_header(src)? {
                        return Ok(None);
                    }
                }

                State::Payload { ty, len } => {
                    if src.len() < len {
                        src.reserve((len - src.len()).min(RESERVE_CHUNK));
                        return Ok(None);
                    }
                    let payload = src.split_to(len);
                    self.state = State::Header;
                    return Ok(Some(parse_payload(ty, payload)?));
                }

                State::Data { remaining } => {
                    if remaining == 0 {
                        self.state = State::Header;
                        continue;
                    }
                    if src.is_empty() {
                        return Ok(None);
                    }
                    let n = src.len().min(usize::try_from(remaining).unwrap_or(usize::MAX));
                    let chunk = src.split_to(n).freeze();
                    let remaining = remaining - n as u64;
                    self.state = if remaining == 0 { State::Header } else { State::Data { remaining } };
                    return Ok(Some(Frame::Data(chunk)));
                }

                State::Skip { remaining } => {
                    let n = src.len().min(usize::try_from(remaining).unwrap_or(usize::MAX));
                    src.advance(n);
                    let remaining = remaining - n as u64;
                    if remaining > 0 {
                        self.state = State::Skip { remaining };
                        return Ok(None);
                    }
                    self.state = State::Header;
                }
            }
        }
    }

    fn decode_eof(&mut self, buf: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if let Some(frame) = self.decode(buf)? {
            return Ok(Some(frame));
        }
        ensure!(
            buf.is_empty() && self.is_idle(),
            H3Error::from(DecodeError::invalid_frame("stream ended inside a frame"))
        );
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    fn decode_all(decoder: &mut FrameDecoder, bytes: &[u8]) -> Result<Vec<Frame>, H3Error> {
        let mut buf = BytesMut::from(bytes);
        let mut frames = Vec::new();
        while let Some(frame) = decoder.decode(&mut buf)? {
            frames.push(frame);
        }
        Ok(frames)
    }

    #[test]
    fn settings_and_goaway() {
        let mut decoder = FrameDecoder::new();
        let frames = decode_all(&mut decoder, &[0x04, 0x02, 0x06, 0x3F, 0x07, 0x02, 0x40, 0x40]).unwrap();
        assert_eq!(
            frames,
            vec![Frame::Settings([(0x6, 63)].into_iter().collect()), Frame::GoAway(64)]
        );
        assert!(decoder.is_idle());
    }

    #[test]
    fn one_byte_at_a_time() {
        let wire = [0x04, 0x04, 0x06, 0x3F, 0x21, 0x00, 0x01, 0x03, 0x00, 0x00, 0xD1];
        let mut decoder = FrameDecoder::new();
        let mut buf = BytesMut::new();
        let mut frames = Vec::new();

        for &byte in &wire {
            buf.extend_from_slice(&[byte]);
            while let Some(frame) = decoder.decode(&mut buf).unwrap() {
                frames.push(frame);
            }
        }

        assert_eq!(
            frames,
            vec![
                Frame::Settings([(0x6, 63), (0x21, 0)].into_iter().collect()),
                Frame::Headers(Bytes::from_static(&[0x00, 0x00, 0xD1])),
            ]
        );
    }

    #[test]
    fn data_is_streamed_in_chunks() {
        let mut decoder = FrameDecoder::new();
        let mut buf = BytesMut::from(&[0x00, 0x05, b'h', b'e'][..]);
        assert_eq!(decoder.decode(&mut buf).unwrap(), Some(Frame::Data(Bytes::from_static(b"he"))));
        assert_eq!(decoder.decode(&mut buf).unwrap(), None);
        assert!(!decoder.is_idle());

        buf.extend_from_slice(b"llo\x00\x00");
        assert_eq!(decoder.decode(&mut buf).unwrap(), Some(Frame::Data(Bytes::from_static(b"llo"))));
        // the empty DATA frame produces nothing
        assert_eq!(decoder.decode(&mut buf).unwrap(), None);
        assert!(decoder.is_idle());
    }

    #[test]
    fn unknown_frames_are_skipped() {
        let mut decoder = FrameDecoder::new();
        let frames = decode_all(&mut decoder, &[0x21, 0x03, 1, 2, 3, 0x07, 0x01, 0x00]).unwrap();
        assert_eq!(frames, vec![Frame::GoAway(0)]);
    }

    #[test]
    fn reserved_http2_frames_are_rejected() {
        for ty in [0x02, 0x06, 0x08, 0x09] {
            let err = decode_all(&mut FrameDecoder::new(), &[ty, 0x00]).unwrap_err();
            assert_eq!(err.code(), ErrorCode::H3_FRAME_UNEXPECTED);
        }
    }

    #[test]
    fn oversized_headers_are_refused() {
        let mut decoder = FrameDecoder::new().with_max_headers_frame_size(Some(4));
        let err = decode_all(&mut decoder, &[0x01, 0x05, 0, 0, 0, 0, 0]).unwrap_err();
        assert_eq!(err.code(), ErrorCode::H3_EXCESSIVE_LOAD);

        let mut decoder = FrameDecoder::new().for_control_stream(1);
        let err = decode_all(&mut decoder, &[0x04, 0x02, 0x06, 0x3F]).unwrap_err();
        assert_eq!(err.code(), ErrorCode::H3_EXCESSIVE_LOAD);
    }

    /// HEADERS declaring 2^62 - 1 bytes.
    const HUGE_HEADERS: [u8; 9] = [0x01, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF];

    #[test]
    fn huge_declared_length_is_refused_without_a_limit() {
        let mut buf = BytesMut::from(&HUGE_HEADERS[..]);
        let err = FrameDecoder::new().decode(&mut buf).unwrap_err();
        assert_eq!(err.code(), ErrorCode::H3_EXCESSIVE_LOAD);
        assert!(buf.capacity() < 1024);
    }

    #[test]
    fn control_stream_bounds_every_buffered_frame() {
        let mut decoder = FrameDecoder::new().for_control_stream(DEFAULT_MAX_CONTROL_FRAME_SIZE);
        let err = decode_all(&mut decoder, &HUGE_HEADERS).unwrap_err();
        assert_eq!(err.code(), ErrorCode::H3_EXCESSIVE_LOAD);

        // one byte over the control limit is already refused for HEADERS
        let mut decoder = FrameDecoder::new().for_control_stream(8);
        let err = decode_all(&mut decoder, &[0x01, 0x09]).unwrap_err();
        assert_eq!(err.code(), ErrorCode::H3_EXCESSIVE_LOAD);
    }

    #[test]
    fn pending_payload_reserves_in_chunks() {
        let len = DEFAULT_MAX_HEADERS_FRAME_SIZE;
        let mut decoder = FrameDecoder::new();
        // HEADERS with a 4-byte varint length of 64 KiB and no payload yet
        let mut buf = BytesMut::from(&[0x01, 0x80, 0x01, 0x00, 0x00][..]);
        assert_eq!(decoder.decode(&mut buf).unwrap(), None);
        assert!(buf.capacity() < 2 * RESERVE_CHUNK);

        buf.extend_from_slice(&vec![0u8; len]);
        let frame = decoder.decode(&mut buf).unwrap().unwrap();
        assert_eq!(frame, Frame::Headers(Bytes::from(vec![0u8; len])));
    }

    #[test]
    fn malformed_goaway() {
        let err = decode_all(&mut FrameDecoder::new(), &[0x07, 0x02, 0x00, 0x00]).unwrap_err();
        assert_eq!(err.code(), ErrorCode::H3_FRAME_ERROR);
    }

    #[test]
    fn eof_inside_frame() {
        let mut decoder = FrameDecoder::new();
        let mut buf = BytesMut::from(&[0x04, 0x02, 0x06][..]);
        assert!(decoder.decode_eof(&mut buf).is_err());

        let mut decoder = FrameDecoder::new();
        let mut buf = BytesMut::new();
        assert_eq!(decoder.decode_eof(&mut buf).unwrap(), None);
    }
}
