use std::io;
use std::sync::Arc;

use futures::SinkExt;
use tokio::io::AsyncWriteExt;
use tokio::select;
use tokio::sync::watch;
use tokio::task::{JoinError, JoinSet};
use tokio_util::codec::FramedWrite;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::codec::{FrameDecoder, FrameEncoder, varint};
use crate::config::H3Config;
use crate::connection::request_stream::{RequestEnv, serve_request};
use crate::connection::stream_context::{
    ControlContext, ControlEvent, RequestContext, StreamContext, accept_uni, next_control_frame,
};
use crate::ensure;
use crate::handler::Handler;
use crate::pool::BufferPool;
use crate::protocol::{ErrorCode, Frame, FrameType, H3Error, Settings, StreamId, StreamType};
use crate::transport::{BoxSendStream, InboundStream, QuicConnection};

/// Reserved frame type sent after SETTINGS when greasing is on.
const GREASE_FRAME_TYPE: u64 = 0x21;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Opening the local control stream.
    Initializing,
    /// Local SETTINGS sent, waiting for the peer's.
    ControlStreamNegotiating,
    Operational,
    /// GOAWAY sent or received; no new requests are accepted.
    Closing,
    Closed,
}

/// Why [`H3Connection::process`] returned normally.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    /// The cancellation token passed to `process` fired.
    Cancelled,
    /// The peer closed the connection or aborted its control stream.
    PeerClosed,
    /// The peer sent GOAWAY and the last request in flight completed.
    GoAway,
}

/// The peer's SETTINGS, once they arrive on its control stream.
#[derive(Debug, Clone)]
pub struct RemoteSettings {
    rx: watch::Receiver<Option<Settings>>,
}

impl RemoteSettings {
    pub(crate) fn channel() -> (watch::Sender<Option<Settings>>, RemoteSettings) {
        let (tx, rx) = watch::channel(None);
        (tx, RemoteSettings { rx })
    }

    pub fn get(&self) -> Option<Settings> {
        self.rx.borrow().clone()
    }

    /// The peer's SETTINGS_MAX_FIELD_SECTION_SIZE; `None` means unlimited or not received yet.
    pub fn max_field_section_size(&self) -> Option<u64> {
        self.rx.borrow().as_ref().and_then(Settings::max_field_section_size)
    }

    /// Waits for the peer's SETTINGS; `None` if the connection ended first.
    pub async fn received(&mut self) -> Option<Settings> {
        self.rx.wait_for(Option::is_some).await.ok().and_then(|settings| (*settings).clone())
    }
}

/// The server side of an HTTP/3 connection.
///
/// `H3Connection` owns the control streams of both endpoints and dispatches every
/// peer stream by role:
///
/// - the local control stream is opened first and carries SETTINGS, later GOAWAY
/// - the peer control stream must start with SETTINGS; its frames are processed
///   in arrival order for the lifetime of the connection
/// - every other peer unidirectional stream is refused with H3_STREAM_CREATION_ERROR
/// - every peer bidirectional stream is a request, served on its own task by the
///   [`Handler`]
///
/// A control stream violation is fatal: GOAWAY is sent with the first request
/// stream id not processed, and the connection is closed with the error's code.
/// Errors on a request stream only reset that stream.
#[derive(Debug)]
pub struct H3Connection<C> {
    conn: Arc<C>,
    config: H3Config,
    pool: BufferPool,
    state: watch::Sender<ConnectionState>,
    remote_settings_tx: watch::Sender<Option<Settings>>,
    remote_settings: RemoteSettings,
}

impl<C> H3Connection<C>
where
    C: QuicConnection,
{
    pub fn new(conn: Arc<C>, config: H3Config) -> Self {
        let pool = BufferPool::new(config.writer_segment_size);
        let (state, _) = watch::channel(ConnectionState::Initializing);
        let (remote_settings_tx, remote_settings) = RemoteSettings::channel();
        Self { conn, config, pool, state, remote_settings_tx, remote_settings }
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// Follows state changes, also after `process` consumed the connection.
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }

    pub fn remote_settings(&self) -> RemoteSettings {
        self.remote_settings.clone()
    }

    pub fn peer_max_field_section_size(&self) -> Option<u64> {
        self.remote_settings.max_field_section_size()
    }

    /// The pool behind response DATA writers.
    pub fn pool(&self) -> &BufferPool {
        &self.pool
    }

    /// Runs the connection until it closes.
    ///
    /// Local cancellation, a peer close, a peer control stream abort and a
    /// completed GOAWAY end normally with a [`CloseReason`]. A protocol violation
    /// returns the error after GOAWAY and close; transport errors that are not
    /// part of a shutdown are returned as they are.
    pub async fn process<H>(self, handler: Arc<H>, cancel: CancellationToken) -> Result<CloseReason, H3Error>
    where
        H: Handler + 'static,
    {
        let token = cancel.child_token();
        let mut driver = Driver::new(&self, handler, token.clone());
        let result = driver.run().await;

        // request tasks observe the token before their JoinSet aborts them
        token.cancel();
        drop(driver);
        self.set_state(ConnectionState::Closed);

        match &result {
            Ok(reason) => info!(?reason, "h3 connection closed"),
            Err(e) => error!(cause = %e, "h3 connection failed"),
        }
        result
    }

    fn set_state(&self, state: ConnectionState) {
        let previous = self.state.send_replace(state);
        if previous != state {
            debug!(?previous, ?state, "connection state changed");
        }
    }
}

/// Opens the local control stream: stream type, SETTINGS and, when greasing, a
/// reserved frame.
pub(crate) async fn open_control_stream<C>(conn: &C, config: &H3Config) -> Result<FramedWrite<BoxSendStream, FrameEncoder>, H3Error>
where
    C: QuicConnection,
{
    let mut send = conn.open_uni().await?;
    let (ty, n) = varint::encode_array(StreamType::CONTROL.as_u64())?;
    send.write_all(&ty[..n]).await?;

    let settings = config.local_settings();
    debug!(stream_id = %send.id(), ?settings, "open control stream");

    let mut control = FramedWrite::new(send, FrameEncoder);
    control.feed(Frame::Settings(settings)).await?;
    if config.grease_settings {
        control.feed(Frame::Unknown(FrameType::from_u64(GREASE_FRAME_TYPE))).await?;
    }
    control.flush().await?;
    Ok(control)
}

enum Event {
    Cancelled,
    Accepted(io::Result<Option<InboundStream>>),
    UniStream(Result<Result<Option<StreamContext>, H3Error>, JoinError>),
    Control(Option<Result<Frame, H3Error>>),
    RequestDone(Result<(StreamId, Result<(), H3Error>), JoinError>),
}

struct Driver<'a, C, H> {
    conn: &'a H3Connection<C>,
    handler: Arc<H>,
    cancel: CancellationToken,
    env: RequestEnv,
    control_out: Option<FramedWrite<BoxSendStream, FrameEncoder>>,
    control_in: Option<ControlContext>,
    uni_streams: JoinSet<Result<Option<StreamContext>, H3Error>>,
    requests: JoinSet<(StreamId, Result<(), H3Error>)>,
    next_request_id: u64,
    peer_goaway: Option<u64>,
}

impl<'a, C, H> Driver<'a, C, H>
where
    C: QuicConnection,
    H: Handler + 'static,
{
    fn new(conn: &'a H3Connection<C>, handler: Arc<H>, cancel: CancellationToken) -> Self {
        let env = RequestEnv { pool: conn.pool.clone(), peer_settings: conn.remote_settings.clone() };
        Self {
            conn,
            handler,
            cancel,
            env,
            control_out: None,
            control_in: None,
            uni_streams: JoinSet::new(),
            requests: JoinSet::new(),
            next_request_id: 0,
            peer_goaway: None,
        }
    }

    async fn run(&mut self) -> Result<CloseReason, H3Error> {
        info!("h3 connection start");
        self.conn.set_state(ConnectionState::Initializing);

        let control_out = select! {
            biased;
            _ = self.cancel.cancelled() => return Ok(self.close(ErrorCode::H3_NO_ERROR, CloseReason::Cancelled)),
            opened = open_control_stream(self.conn.conn.as_ref(), &self.conn.config) => opened?,
        };
        self.control_out = Some(control_out);
        self.conn.set_state(ConnectionState::ControlStreamNegotiating);

        loop {
            let event = select! {
                biased;
                _ = self.cancel.cancelled() => Event::Cancelled,
                frame = next_control_frame(&mut self.control_in) => Event::Control(frame),
                Some(joined) = self.uni_streams.join_next() => Event::UniStream(joined),
                Some(joined) = self.requests.join_next() => Event::RequestDone(joined),
                accepted = self.conn.conn.accept() => Event::Accepted(accepted),
            };

            match self.on_event(event) {
                Ok(Some(reason)) => return Ok(reason),
                Ok(None) => {}
                Err(e) => return Err(self.fail(e).await),
            }
        }
    }

    fn on_event(&mut self, event: Event) -> Result<Option<CloseReason>, H3Error> {
        match event {
            Event::Cancelled => {
                info!("h3 connection cancelled");
                Ok(Some(self.close(ErrorCode::H3_NO_ERROR, CloseReason::Cancelled)))
            }
            Event::Accepted(Ok(Some(stream))) => {
                self.on_inbound(stream)?;
                Ok(None)
            }
            Event::Accepted(Ok(None)) => {
                info!("peer closed the connection");
                Ok(Some(CloseReason::PeerClosed))
            }
            Event::Accepted(Err(e)) => Err(H3Error::transport(e)),
            Event::UniStream(Ok(Ok(Some(ctx)))) => {
                self.on_stream(ctx)?;
                Ok(None)
            }
            Event::UniStream(Ok(Ok(None))) => Ok(None),
            Event::UniStream(Ok(Err(e))) => {
                warn!(cause = %e, "failed to read unidirectional stream type");
                Ok(None)
            }
            Event::UniStream(Err(e)) => {
                warn!(cause = %e, "unidirectional stream task failed");
                Ok(None)
            }
            Event::Control(frame) => self.on_control(frame),
            Event::RequestDone(joined) => {
                on_request_done(joined);
                Ok(self.try_finish_closing())
            }
        }
    }

    fn on_inbound(&mut self, stream: InboundStream) -> Result<(), H3Error> {
        match stream {
            InboundStream::Uni(recv) => {
                let frames = FrameDecoder::new().for_control_stream(self.conn.config.max_control_frame_size);
                self.uni_streams.spawn(accept_uni(recv, frames));
                Ok(())
            }

            InboundStream::Bidi(mut send, mut recv) => {
                let id = recv.id();
                ensure!(
                    id.is_client_initiated(),
                    H3Error::protocol(ErrorCode::H3_STREAM_CREATION_ERROR, format!("server initiated request stream {id}"))
                );

                if self.conn.state() == ConnectionState::Closing {
                    debug!(stream_id = %id, "reject request while closing");
                    send.reset(ErrorCode::H3_REQUEST_REJECTED);
                    recv.stop(ErrorCode::H3_REQUEST_REJECTED);
                    return Ok(());
                }

                self.next_request_id = self.next_request_id.max(id.as_u64() + 4);
                let request = RequestContext::new(send, recv, self.conn.config.max_field_section_size());
                self.on_stream(StreamContext::Request(request))
            }
        }
    }

    fn on_stream(&mut self, ctx: StreamContext) -> Result<(), H3Error> {
        debug!(stream_id = %ctx.id(), role = ?ctx.role(), direction = ?ctx.direction(), "stream accepted");
        match ctx {
            StreamContext::Control(control) => {
                ensure!(
                    self.control_in.is_none(),
                    H3Error::protocol(ErrorCode::H3_STREAM_CREATION_ERROR, format!("second control stream {}", control.id()))
                );
                self.control_in = Some(control);
            }
            StreamContext::Request(request) => {
                let task = serve_request(request, self.handler.clone(), self.env.clone(), self.cancel.clone());
                self.requests.spawn(task);
            }
        }
        Ok(())
    }

    fn on_control(&mut self, frame: Option<Result<Frame, H3Error>>) -> Result<Option<CloseReason>, H3Error> {
        let frame = match frame {
            Some(Ok(frame)) => frame,
            Some(Err(H3Error::Transport { source })) if source.kind() == io::ErrorKind::ConnectionReset => {
                info!(cause = %source, "peer aborted its control stream");
                return Ok(Some(self.close(ErrorCode::H3_NO_ERROR, CloseReason::PeerClosed)));
            }
            Some(Err(e)) => return Err(e),
            None => {
                let settings_received = self.control_in.as_ref().is_some_and(ControlContext::settings_received);
                warn!(settings_received, "peer finished its control stream");
                return Err(H3Error::protocol(ErrorCode::H3_CLOSED_CRITICAL_STREAM, "peer finished its control stream"));
            }
        };

        let Some(control) = self.control_in.as_mut() else {
            return Ok(None);
        };

        match control.on_frame(frame)? {
            ControlEvent::Settings(settings) => {
                info!(?settings, "received peer settings");
                self.conn.remote_settings_tx.send_replace(Some(settings));
                if self.conn.state() == ConnectionState::ControlStreamNegotiating {
                    self.conn.set_state(ConnectionState::Operational);
                }
                Ok(None)
            }
            ControlEvent::GoAway(id) => {
                if let Some(previous) = self.peer_goaway {
                    ensure!(
                        id <= previous,
                        H3Error::protocol(ErrorCode::H3_ID_ERROR, format!("GOAWAY id {id} above previous {previous}"))
                    );
                }
                info!(id, "peer is going away");
                self.peer_goaway = Some(id);
                self.conn.set_state(ConnectionState::Closing);
                Ok(self.try_finish_closing())
            }
            ControlEvent::Ignored => Ok(None),
        }
    }

    fn try_finish_closing(&self) -> Option<CloseReason> {
        (self.peer_goaway.is_some() && self.requests.is_empty())
            .then(|| self.close(ErrorCode::H3_NO_ERROR, CloseReason::GoAway))
    }

    fn close(&self, code: ErrorCode, reason: CloseReason) -> CloseReason {
        self.conn.set_state(ConnectionState::Closing);
        self.conn.conn.close(code, b"");
        reason
    }

    /// Sends GOAWAY and closes the connection with the code of `e`.
    async fn fail(&mut self, e: H3Error) -> H3Error {
        if matches!(e, H3Error::Transport { .. }) {
            return e;
        }

        let code = e.code();
        error!(%code, cause = %e, "h3 connection error, going away");
        self.conn.set_state(ConnectionState::Closing);

        if let Some(control) = self.control_out.as_mut() {
            let goaway = Frame::GoAway(self.next_request_id);
            select! {
                biased;
                _ = self.cancel.cancelled() => {}
                sent = control.send(goaway) => {
                    if let Err(send_err) = sent {
                        warn!(cause = %send_err, "failed to send GOAWAY");
                    }
                }
            }
        }

        self.conn.conn.close(code, e.to_string().as_bytes());
        e
    }
}

fn on_request_done(joined: Result<(StreamId, Result<(), H3Error>), JoinError>) {
    match joined {
        Ok((id, Ok(()))) => debug!(stream_id = %id, "request stream done"),
        Ok((id, Err(e))) => warn!(stream_id = %id, code = %e.code(), cause = %e, "request stream failed"),
        Err(e) => error!(cause = %e, "request task failed"),
    }
}
