//! A minimal HTTP/3 client
//!
//! [`H3Client`] opens the client control stream, tracks the server's SETTINGS and
//! GOAWAY, and sends requests on new bidirectional streams. It exists to drive a
//! server over any [`QuicConnection`], mostly in tests and tools.

use std::error::Error;
use std::fmt;
use std::sync::Arc;

use bytes::{Bytes, BytesMut};
use futures::{SinkExt, StreamExt};
use http::{Request, Response};
use http_body::Body;
use tokio::select;
use tokio::sync::{Mutex, watch};
use tokio::task::{JoinHandle, JoinSet};
use tokio_util::codec::{FramedRead, FramedWrite};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use crate::codec::qpack::decode_field_section;
use crate::codec::{FrameDecoder, FrameEncoder};
use crate::config::H3Config;
use crate::connection::{
    ControlContext, ControlEvent, MessageSender, RemoteSettings, StreamContext, accept_uni, next_control_frame,
    open_control_stream,
};
use crate::ensure;
use crate::pool::BufferPool;
use crate::protocol::{
    ErrorCode, Frame, H3Error, RecvBody, RequestHeader, Settings, response_head_from_fields,
};
use crate::transport::{BoxRecvStream, BoxSendStream, InboundStream, QuicConnection};

pub struct H3Client<C> {
    conn: Arc<C>,
    config: H3Config,
    pool: BufferPool,
    remote_settings: RemoteSettings,
    goaway: watch::Receiver<Option<u64>>,
    control: Mutex<FramedWrite<BoxSendStream, FrameEncoder>>,
    cancel: CancellationToken,
    inbound: JoinHandle<()>,
}

impl<C> fmt::Debug for H3Client<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("H3Client")
            .field("remote_settings", &self.remote_settings.get())
            .field("goaway", &*self.goaway.borrow())
            .field("cancelled", &self.cancel.is_cancelled())
            .finish_non_exhaustive()
    }
}

impl<C> H3Client<C>
where
    C: QuicConnection,
{
    /// Opens the control stream and starts reading the server's streams.
    pub async fn connect(conn: Arc<C>, config: H3Config) -> Result<Self, H3Error> {
        let control = open_control_stream(conn.as_ref(), &config).await?;

        let cancel = CancellationToken::new();
        let (settings_tx, remote_settings) = RemoteSettings::channel();
        let (goaway_tx, goaway) = watch::channel(None);
        let inbound = Inbound {
            conn: Arc::clone(&conn),
            settings: settings_tx,
            goaway: goaway_tx,
            max_control_frame_size: config.max_control_frame_size,
            cancel: cancel.clone(),
        };

        Ok(Self {
            pool: BufferPool::new(config.writer_segment_size),
            inbound: tokio::spawn(inbound.run()),
            conn,
            config,
            remote_settings,
            goaway,
            control: Mutex::new(control),
            cancel,
        })
    }

    pub fn remote_settings(&self) -> RemoteSettings {
        self.remote_settings.clone()
    }

    /// The stream id limit from the server's last GOAWAY, if any.
    pub fn goaway(&self) -> Option<u64> {
        *self.goaway.borrow()
    }

    /// Sends `request` on a new stream and waits for the final response head.
    ///
    /// The request body is streamed while the response is awaited; interim
    /// responses are skipped.
    pub async fn send_request<B>(&self, request: Request<B>) -> Result<Response<RecvBody>, H3Error>
    where
        B: Body<Data = Bytes> + Unpin,
        B::Error: Into<Box<dyn Error + Send + Sync>>,
    {
        ensure!(
            self.goaway().is_none(),
            H3Error::protocol(ErrorCode::H3_REQUEST_REJECTED, "server is going away")
        );

        let (parts, body) = request.into_parts();
        let header = RequestHeader::from(parts);
        let mut section = BytesMut::new();
        let size = header.encode(&mut section);

        let (send, recv) = self.conn.open_bidi().await?;
        debug!(stream_id = %send.id(), method = %header.method(), uri = %header.uri(), "send request");

        let mut sender = MessageSender::new(send, self.pool.clone(), self.remote_settings.clone(), self.cancel.clone());
        let send_request = async move {
            sender.send_head(&section, size, false).await?;
            sender.send_body(body).await?;
            sender.finish().await
        };

        let ((), response) = tokio::try_join!(send_request, read_response(recv, self.config.max_field_section_size()))?;
        Ok(response)
    }

    /// Sends GOAWAY and closes the connection with H3_NO_ERROR.
    pub async fn close(&self) -> Result<(), H3Error> {
        {
            let mut control = self.control.lock().await;
            control.send(Frame::GoAway(0)).await?;
        }
        info!("close h3 client");
        self.cancel.cancel();
        self.conn.close(ErrorCode::H3_NO_ERROR, b"");
        Ok(())
    }
}

impl<C> Drop for H3Client<C> {
    fn drop(&mut self) {
        self.cancel.cancel();
        self.inbound.abort();
    }
}

async fn read_response(recv: BoxRecvStream, max_field_section_size: Option<usize>) -> Result<Response<RecvBody>, H3Error> {
    let decoder = FrameDecoder::new().with_max_headers_frame_size(max_field_section_size);
    let mut frames = FramedRead::new(recv, decoder);

    loop {
        let frame = match frames.next().await {
            Some(frame) => frame?,
            None => {
                return Err(H3Error::protocol(ErrorCode::H3_REQUEST_INCOMPLETE, "response stream ended before HEADERS"));
            }
        };

        let ty = frame.frame_type();
        let Frame::Headers(payload) = frame else {
            return Err(H3Error::protocol(ErrorCode::H3_FRAME_UNEXPECTED, format!("{ty} frame before response HEADERS")));
        };

        let head = response_head_from_fields(&decode_field_section(&payload)?)?;
        if head.status().is_informational() {
            trace!(status = %head.status(), "skip interim response");
            continue;
        }
        return Ok(head.map(|()| RecvBody::new(frames)));
    }
}

/// Reads the server's unidirectional streams for the client's lifetime.
struct Inbound<C> {
    conn: Arc<C>,
    settings: watch::Sender<Option<Settings>>,
    goaway: watch::Sender<Option<u64>>,
    max_control_frame_size: usize,
    cancel: CancellationToken,
}

impl<C> Inbound<C>
where
    C: QuicConnection,
{
    async fn run(self) {
        match self.drive().await {
            Ok(()) => debug!("client inbound streams done"),
            Err(H3Error::Transport { source }) => warn!(cause = %source, "client transport failed"),
            Err(e) => {
                error!(code = %e.code(), cause = %e, "server violated the protocol, close connection");
                self.conn.close(e.code(), e.to_string().as_bytes());
            }
        }
    }

    async fn drive(&self) -> Result<(), H3Error> {
        let mut uni_streams = JoinSet::new();
        let mut control: Option<ControlContext> = None;

        loop {
            select! {
                biased;
                _ = self.cancel.cancelled() => return Ok(()),

                frame = next_control_frame(&mut control) => {
                    let frame = match frame {
                        Some(frame) => frame?,
                        None => {
                            return Err(H3Error::protocol(ErrorCode::H3_CLOSED_CRITICAL_STREAM, "server finished its control stream"));
                        }
                    };
                    if let Some(control) = control.as_mut() {
                        self.on_control(control.on_frame(frame)?)?;
                    }
                }

                Some(joined) = uni_streams.join_next() => match joined {
                    Ok(Ok(Some(StreamContext::Control(ctx)))) => {
                        ensure!(
                            control.is_none(),
                            H3Error::protocol(ErrorCode::H3_STREAM_CREATION_ERROR, format!("second control stream {}", ctx.id()))
                        );
                        control = Some(ctx);
                    }
                    Ok(Ok(_)) => {}
                    Ok(Err(e)) => warn!(cause = %e, "failed to read unidirectional stream type"),
                    Err(e) => warn!(cause = %e, "unidirectional stream task failed"),
                },

                accepted = self.conn.accept() => match accepted? {
                    Some(InboundStream::Uni(recv)) => {
                        let frames = FrameDecoder::new().for_control_stream(self.max_control_frame_size);
                        uni_streams.spawn(accept_uni(recv, frames));
                    }
                    Some(InboundStream::Bidi(_, recv)) => {
                        return Err(H3Error::protocol(
                            ErrorCode::H3_STREAM_CREATION_ERROR,
                            format!("server opened bidirectional stream {}", recv.id()),
                        ));
                    }
                    None => return Ok(()),
                },
            }
        }
    }

    fn on_control(&self, event: ControlEvent) -> Result<(), H3Error> {
        match event {
            ControlEvent::Settings(settings) => {
                info!(?settings, "received server settings");
                self.settings.send_replace(Some(settings));
            }
            ControlEvent::GoAway(id) => {
                if let Some(previous) = *self.goaway.borrow() {
                    ensure!(
                        id <= previous,
                        H3Error::protocol(ErrorCode::H3_ID_ERROR, format!("GOAWAY id {id} above previous {previous}"))
                    );
                }
                info!(id, "server is going away");
                self.goaway.send_replace(Some(id));
            }
            ControlEvent::Ignored => {}
        }
        Ok(())
    }
}
