use std::error::Error;
use std::fmt;

use bytes::{Bytes, BytesMut};
use http::{HeaderMap, Response, StatusCode};
use http_body::Body;
use http_body_util::BodyExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::connection::{DataFrameWriter, RemoteSettings};
use crate::ensure;
use crate::pool::BufferPool;
use crate::protocol::{ErrorCode, FrameType, H3Error, StreamId, encode_response_head, encode_trailers};
use crate::transport::BoxSendStream;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SendState {
    Head,
    Body,
    Trailers,
    Finished,
}

/// Sends one HTTP message on a stream: a header section, DATA, optional trailers.
///
/// Frames are produced in that order only. A sender dropped before
/// [`finish`](Self::finish) resets its stream, with H3_REQUEST_CANCELLED when the
/// connection is shutting down and H3_INTERNAL_ERROR otherwise.
pub(crate) struct MessageSender {
    id: StreamId,
    writer: DataFrameWriter<BoxSendStream>,
    peer_settings: RemoteSettings,
    cancel: CancellationToken,
    flush_threshold: usize,
    state: SendState,
}

impl fmt::Debug for MessageSender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MessageSender")
            .field("id", &self.id)
            .field("state", &self.state)
            .field("buffered", &self.writer.buffered())
            .finish_non_exhaustive()
    }
}

impl MessageSender {
    pub(crate) fn new(send: BoxSendStream, pool: BufferPool, peer_settings: RemoteSettings, cancel: CancellationToken) -> Self {
        let id = send.id();
        let flush_threshold = pool.segment_size();
        Self { id, writer: DataFrameWriter::new(send, pool), peer_settings, cancel, flush_threshold, state: SendState::Head }
    }

    pub(crate) fn id(&self) -> StreamId {
        self.id
    }

    async fn send_section(&mut self, section: &[u8], size: u64) -> Result<(), H3Error> {
        if let Some(limit) = self.peer_settings.max_field_section_size() {
            ensure!(
                size <= limit,
                H3Error::message(format!("field section of {size} bytes exceeds the peer limit of {limit}"))
            );
        }
        self.flush().await?;
        self.writer.write_frame(FrameType::HEADERS, section).await?;
        Ok(())
    }

    /// Sends an encoded header section. Interim sections keep the sender
    /// waiting for the final one.
    pub(crate) async fn send_head(&mut self, section: &[u8], size: u64, interim: bool) -> Result<(), H3Error> {
        ensure!(self.state == SendState::Head, H3Error::message("header section already sent"));
        self.send_section(section, size).await?;
        if !interim {
            self.state = SendState::Body;
        }
        trace!(stream_id = %self.id, size, interim, "sent header section");
        Ok(())
    }

    fn ensure_body(&self) -> Result<(), H3Error> {
        match self.state {
            SendState::Body => Ok(()),
            SendState::Head => Err(H3Error::message("body before header section")),
            SendState::Trailers | SendState::Finished => Err(H3Error::message("body after end of message")),
        }
    }

    /// Buffers `data`, flushing a DATA frame once a segment worth is pending.
    pub(crate) async fn send_data(&mut self, data: &[u8]) -> Result<(), H3Error> {
        self.ensure_body()?;
        self.writer.write(data)?;
        if self.writer.buffered() >= self.flush_threshold {
            self.flush().await?;
        }
        Ok(())
    }

    pub(crate) fn data_writer(&mut self) -> Result<&mut DataFrameWriter<BoxSendStream>, H3Error> {
        self.ensure_body()?;
        Ok(&mut self.writer)
    }

    pub(crate) async fn flush(&mut self) -> Result<(), H3Error> {
        self.writer.flush_cancellable(&self.cancel).await?;
        Ok(())
    }

    pub(crate) async fn send_trailers(&mut self, trailers: &HeaderMap) -> Result<(), H3Error> {
        self.ensure_body()?;
        let mut section = BytesMut::new();
        let size = encode_trailers(trailers, &mut section);
        self.send_section(&section, size).await?;
        self.state = SendState::Trailers;
        Ok(())
    }

    /// Streams every frame of `body`: data as DATA frames, trailers as a
    /// trailing HEADERS frame.
    pub(crate) async fn send_body<B>(&mut self, mut body: B) -> Result<(), H3Error>
    where
        B: Body<Data = Bytes> + Unpin,
        B::Error: Into<Box<dyn Error + Send + Sync>>,
    {
        while let Some(frame) = body.frame().await {
            let frame = frame.map_err(H3Error::handler)?;
            match frame.into_data() {
                Ok(data) => self.send_data(&data).await?,
                Err(frame) => {
                    if let Ok(trailers) = frame.into_trailers() {
                        self.send_trailers(&trailers).await?;
                    }
                }
            }
        }
        Ok(())
    }

    /// Flushes pending DATA and finishes the stream. Calling it again is a no-op.
    pub(crate) async fn finish(&mut self) -> Result<(), H3Error> {
        match self.state {
            SendState::Finished => return Ok(()),
            SendState::Head => return Err(H3Error::message("finish before header section")),
            SendState::Body | SendState::Trailers => {}
        }

        self.flush().await?;
        self.writer.complete().await?;
        self.state = SendState::Finished;
        debug!(stream_id = %self.id, "message sent");
        Ok(())
    }

    pub(crate) fn reset(&mut self, code: ErrorCode) {
        if self.state != SendState::Finished {
            debug!(stream_id = %self.id, %code, "reset stream");
            self.writer.writer_mut().reset(code);
            self.state = SendState::Finished;
        }
    }
}

impl Drop for MessageSender {
    fn drop(&mut self) {
        let code = if self.cancel.is_cancelled() { ErrorCode::H3_REQUEST_CANCELLED } else { ErrorCode::H3_INTERNAL_ERROR };
        self.reset(code);
    }
}

/// The response side of a request stream.
///
/// Either hand a whole `http::Response` to [`send_response`](Self::send_response),
/// or drive the parts yourself: [`send_head`](Self::send_head), then any number of
/// [`send_data`](Self::send_data), optionally [`send_trailers`](Self::send_trailers),
/// and [`finish`](Self::finish).
#[derive(Debug)]
pub struct ResponseSender {
    inner: MessageSender,
}

impl ResponseSender {
    pub(crate) fn new(inner: MessageSender) -> Self {
        Self { inner }
    }

    pub fn stream_id(&self) -> StreamId {
        self.inner.id()
    }

    /// Sends head, body and trailers of `response`, then finishes the stream.
    pub async fn send_response<B>(&mut self, response: Response<B>) -> Result<(), H3Error>
    where
        B: Body<Data = Bytes> + Unpin,
        B::Error: Into<Box<dyn Error + Send + Sync>>,
    {
        let (parts, body) = response.into_parts();
        self.send_head(parts.status, &parts.headers).await?;
        self.inner.send_body(body).await?;
        self.finish().await
    }

    /// Sends a response header section. Informational (1xx) statuses may be sent
    /// any number of times before the final one.
    pub async fn send_head(&mut self, status: StatusCode, headers: &HeaderMap) -> Result<(), H3Error> {
        let mut section = BytesMut::new();
        let size = encode_response_head(status, headers, &mut section);
        self.inner.send_head(&section, size, status.is_informational()).await
    }

    pub async fn send_data(&mut self, data: &[u8]) -> Result<(), H3Error> {
        self.inner.send_data(data).await
    }

    /// The DATA writer, for producing body bytes in place with
    /// [`DataFrameWriter::get_mut`] and [`DataFrameWriter::advance`].
    pub fn data_writer(&mut self) -> Result<&mut DataFrameWriter<BoxSendStream>, H3Error> {
        self.inner.data_writer()
    }

    pub async fn flush(&mut self) -> Result<(), H3Error> {
        self.inner.flush().await
    }

    pub async fn send_trailers(&mut self, trailers: &HeaderMap) -> Result<(), H3Error> {
        self.inner.send_trailers(trailers).await
    }

    pub async fn finish(&mut self) -> Result<(), H3Error> {
        self.inner.finish().await
    }

    /// Abandons the response, resetting the stream with `code`.
    pub fn reset(&mut self, code: ErrorCode) {
        self.inner.reset(code);
    }
}
