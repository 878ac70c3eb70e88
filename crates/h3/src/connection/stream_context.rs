//! Per-stream state owned by the connection
//!
//! A [`StreamContext`] is created when a peer stream is classified: every
//! bidirectional stream becomes a [`RequestContext`], a unidirectional stream
//! whose type is control becomes the [`ControlContext`]. Each context keeps the
//! resumable frame decoder of its stream, so a partially received frame survives
//! between reads.

use std::future;

use futures::StreamExt;
use tokio_util::codec::FramedRead;
use tracing::{debug, warn};

use crate::codec::qpack::FieldLineDecoder;
use crate::codec::{FrameDecoder, UniStreamDecoder, UniStreamItem};
use crate::ensure;
use crate::protocol::{
    DecodeError, ErrorCode, Frame, H3Error, HeaderField, RecvBody, RequestHeader, Settings, StreamDirection, StreamId,
    StreamRole, StreamType,
};
use crate::transport::{BoxRecvStream, BoxSendStream};

pub(crate) enum StreamContext {
    Control(ControlContext),
    Request(RequestContext),
}

impl StreamContext {
    pub(crate) fn id(&self) -> StreamId {
        match self {
            StreamContext::Control(control) => control.id,
            StreamContext::Request(request) => request.id,
        }
    }

    pub(crate) fn role(&self) -> StreamRole {
        match self {
            StreamContext::Control(_) => StreamRole::Control,
            StreamContext::Request(_) => StreamRole::Request,
        }
    }

    pub(crate) fn direction(&self) -> StreamDirection {
        self.id().direction()
    }
}

/// What a control frame means for the connection.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum ControlEvent {
    Settings(Settings),
    GoAway(u64),
    Ignored,
}

/// The peer's control stream, after its stream type.
pub(crate) struct ControlContext {
    id: StreamId,
    frames: FramedRead<BoxRecvStream, UniStreamDecoder>,
    settings_received: bool,
}

impl ControlContext {
    pub(crate) fn id(&self) -> StreamId {
        self.id
    }

    pub(crate) fn settings_received(&self) -> bool {
        self.settings_received
    }

    /// The next frame; `None` once the peer finished the stream.
    pub(crate) async fn next_frame(&mut self) -> Option<Result<Frame, H3Error>> {
        loop {
            match self.frames.next().await? {
                Ok(UniStreamItem::Frame(frame)) => return Some(Ok(frame)),
                Ok(UniStreamItem::StreamType(_)) => {}
                Err(e) => return Some(Err(e)),
            }
        }
    }

    /// Applies the control stream ordering rules to `frame`.
    ///
    /// # Errors
    ///
    /// - H3_MISSING_SETTINGS when the first frame is not SETTINGS
    /// - H3_FRAME_UNEXPECTED for a second SETTINGS, or DATA and HEADERS
    pub(crate) fn on_frame(&mut self, frame: Frame) -> Result<ControlEvent, H3Error> {
        let ty = frame.frame_type();
        if !self.settings_received {
            let Frame::Settings(settings) = frame else {
                return Err(H3Error::protocol(
                    ErrorCode::H3_MISSING_SETTINGS,
                    format!("control stream opened with {ty} instead of SETTINGS"),
                ));
            };
            self.settings_received = true;
            return Ok(ControlEvent::Settings(settings));
        }

        match frame {
            Frame::GoAway(id) => Ok(ControlEvent::GoAway(id)),
            Frame::Unknown(_) => Ok(ControlEvent::Ignored),
            Frame::Settings(_) | Frame::Data(_) | Frame::Headers(_) => {
                Err(H3Error::protocol(ErrorCode::H3_FRAME_UNEXPECTED, format!("{ty} frame on control stream")))
            }
        }
    }
}

/// Waits for the next control frame, or forever while there is no control stream.
pub(crate) async fn next_control_frame(control: &mut Option<ControlContext>) -> Option<Result<Frame, H3Error>> {
    match control {
        Some(control) => control.next_frame().await,
        None => future::pending().await,
    }
}

/// Reads the type of a peer unidirectional stream.
///
/// Only the control stream is kept. Every other type is refused with
/// H3_STREAM_CREATION_ERROR and `Ok(None)` is returned, as it is for a stream
/// finished before its type arrived.
pub(crate) async fn accept_uni(recv: BoxRecvStream, frames: FrameDecoder) -> Result<Option<StreamContext>, H3Error> {
    let id = recv.id();
    let mut frames = FramedRead::new(recv, UniStreamDecoder::new(frames));

    let ty = match frames.next().await {
        Some(Ok(UniStreamItem::StreamType(ty))) => ty,
        Some(Ok(UniStreamItem::Frame(frame))) => {
            return Err(DecodeError::invalid_frame(format!("{} frame before stream type", frame.frame_type())).into());
        }
        Some(Err(e)) => return Err(e),
        None => {
            debug!(stream_id = %id, "unidirectional stream finished before its type");
            return Ok(None);
        }
    };

    if ty != StreamType::CONTROL {
        warn!(stream_id = %id, stream_type = %ty, "refuse unidirectional stream");
        frames.get_mut().stop(ErrorCode::H3_STREAM_CREATION_ERROR);
        return Ok(None);
    }

    debug!(stream_id = %id, "peer control stream opened");
    Ok(Some(StreamContext::Control(ControlContext { id, frames, settings_received: false })))
}

/// A request stream until its HEADERS frame is decoded.
pub(crate) struct RequestContext {
    id: StreamId,
    send: BoxSendStream,
    frames: FramedRead<BoxRecvStream, FrameDecoder>,
    field_decoder: FieldLineDecoder,
    max_field_section_size: Option<usize>,
    headers_received: bool,
}

impl RequestContext {
    pub(crate) fn new(send: BoxSendStream, recv: BoxRecvStream, max_field_section_size: Option<usize>) -> Self {
        let id = recv.id();
        let decoder = FrameDecoder::new().with_max_headers_frame_size(max_field_section_size);
        Self {
            id,
            send,
            frames: FramedRead::new(recv, decoder),
            field_decoder: FieldLineDecoder::new(),
            max_field_section_size,
            headers_received: false,
        }
    }

    pub(crate) fn id(&self) -> StreamId {
        self.id
    }

    pub(crate) fn headers_received(&self) -> bool {
        self.headers_received
    }

    /// Reads and decodes the HEADERS frame that opens the request.
    ///
    /// # Errors
    ///
    /// - H3_FRAME_UNEXPECTED when another known frame comes first
    /// - H3_REQUEST_INCOMPLETE when the stream ends first
    /// - H3_EXCESSIVE_LOAD when the frame, or the decoded section as counted by
    ///   SETTINGS_MAX_FIELD_SECTION_SIZE, is over the configured limit
    /// - decoding and malformed message errors for the field section
    pub(crate) async fn read_request_head(&mut self) -> Result<(Vec<HeaderField>, RequestHeader), H3Error> {
        let frame = match self.frames.next().await {
            Some(frame) => frame?,
            None => {
                return Err(H3Error::protocol(ErrorCode::H3_REQUEST_INCOMPLETE, "request stream ended before HEADERS"));
            }
        };

        let ty = frame.frame_type();
        let Frame::Headers(payload) = frame else {
            return Err(H3Error::protocol(ErrorCode::H3_FRAME_UNEXPECTED, format!("{ty} frame before HEADERS")));
        };
        self.headers_received = true;

        let mut fields = Vec::new();
        let consumed = self.field_decoder.decode(&payload, &mut fields)?;
        ensure!(consumed == payload.len(), H3Error::from(DecodeError::truncated("request field section")));

        if let Some(limit) = self.max_field_section_size {
            let size = fields.iter().map(HeaderField::section_size).sum::<u64>();
            ensure!(
                size <= limit as u64,
                H3Error::protocol(
                    ErrorCode::H3_EXCESSIVE_LOAD,
                    format!("request field section of {size} bytes exceeds {limit}")
                )
            );
        }

        let header = RequestHeader::try_from(&fields[..])?;
        Ok((fields, header))
    }

    /// Resets the sending side and stops the receiving side with `code`.
    pub(crate) fn abort(&mut self, code: ErrorCode) {
        self.send.reset(code);
        self.frames.get_mut().stop(code);
    }

    /// Hands the stream over once the request head is decoded; the body keeps
    /// the bytes already read past the HEADERS frame.
    pub(crate) fn into_parts(self) -> (BoxSendStream, RecvBody) {
        (self.send, RecvBody::new(self.frames))
    }
}
