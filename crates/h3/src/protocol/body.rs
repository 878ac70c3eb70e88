//! Streaming message bodies
//!
//! [`RecvBody`] reads the frames that follow a HEADERS frame on a request stream
//! and exposes them as an [`http_body::Body`]:
//!
//! - DATA payloads are yielded in arrival order, as they arrive
//! - a trailing HEADERS frame becomes the trailers
//! - unknown frame types were already skipped by the frame decoder
//! - SETTINGS and GOAWAY, or any frame after the trailers, are H3_FRAME_UNEXPECTED
//!
//! The same type carries response bodies on the client side.

use std::pin::Pin;
use std::task::{Context, Poll, ready};

use bytes::Bytes;
use futures::StreamExt;
use http::HeaderMap;
use http_body::{Body, Frame as BodyFrame};
use tokio_util::codec::FramedRead;
use tracing::{debug, trace};

use crate::codec::FrameDecoder;
use crate::codec::qpack::decode_field_section;
use crate::protocol::{ErrorCode, Frame, H3Error, StreamId, trailers_from_fields};
use crate::transport::BoxRecvStream;

/// The receiving side of a message body.
///
/// Dropping a body before its end asks the peer to stop sending with
/// H3_NO_ERROR, so unread request data does not pile up in the transport.
pub struct RecvBody {
    frames: FramedRead<BoxRecvStream, FrameDecoder>,
    trailers_received: bool,
    eof: bool,
}

impl std::fmt::Debug for RecvBody {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecvBody")
            .field("stream_id", &self.stream_id())
            .field("trailers_received", &self.trailers_received)
            .field("eof", &self.eof)
            .finish()
    }
}

impl RecvBody {
    /// Continues reading `frames` where the HEADERS frame left off; bytes already
    /// buffered by the `FramedRead` are kept.
    pub(crate) fn new(frames: FramedRead<BoxRecvStream, FrameDecoder>) -> Self {
        Self { frames, trailers_received: false, eof: false }
    }

    pub fn stream_id(&self) -> StreamId {
        self.frames.get_ref().id()
    }

    fn finish(&mut self, result: Option<Result<BodyFrame<Bytes>, H3Error>>) -> Poll<Option<Result<BodyFrame<Bytes>, H3Error>>> {
        if !matches!(result, Some(Ok(_))) {
            self.eof = true;
        }
        Poll::Ready(result)
    }
}

fn decode_trailers(payload: &[u8]) -> Result<HeaderMap, H3Error> {
    let fields = decode_field_section(payload)?;
    trailers_from_fields(&fields)
}

impl Body for RecvBody {
    type Data = Bytes;
    type Error = H3Error;

    fn poll_frame(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Result<BodyFrame<Self::Data>, Self::Error>>> {
        let this = &mut *self;
        loop {
            if this.eof {
                return Poll::Ready(None);
            }

            let frame = match ready!(this.frames.poll_next_unpin(cx)) {
                Some(Ok(frame)) => frame,
                Some(Err(e)) => return this.finish(Some(Err(e))),
                None => return this.finish(None),
            };

            if this.trailers_received {
                let e = H3Error::protocol(ErrorCode::H3_FRAME_UNEXPECTED, format!("{} frame after trailers", frame.frame_type()));
                return this.finish(Some(Err(e)));
            }

            match frame {
                Frame::Data(data) => {
                    trace!(stream_id = %this.stream_id(), len = data.len(), "received body chunk");
                    return this.finish(Some(Ok(BodyFrame::data(data))));
                }
                Frame::Headers(payload) => {
                    this.trailers_received = true;
                    return this.finish(Some(decode_trailers(&payload).map(BodyFrame::trailers)));
                }
                Frame::Unknown(ty) => {
                    trace!(stream_id = %this.stream_id(), frame_type = %ty, "skip unknown frame in body");
                }
                Frame::Settings(_) | Frame::GoAway(_) => {
                    let e = H3Error::protocol(
                        ErrorCode::H3_FRAME_UNEXPECTED,
                        format!("{} frame on request stream", frame.frame_type()),
                    );
                    return this.finish(Some(Err(e)));
                }
            }
        }
    }

    fn is_end_stream(&self) -> bool {
        self.eof
    }
}

impl Drop for RecvBody {
    fn drop(&mut self) {
        if !self.eof {
            debug!(stream_id = %self.stream_id(), "body dropped before end, stop receiving");
            self.frames.get_mut().stop(ErrorCode::H3_NO_ERROR);
        }
    }
}
