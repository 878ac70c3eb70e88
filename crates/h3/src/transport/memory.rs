//! In-memory transport
//!
//! [`MemoryConnection::pair`] returns a connected client and server. Every stream
//! is a [`tokio::io::duplex`] pipe; one end is handed to the opener, the other
//! is queued for the peer's [`QuicConnection::accept`].
//!
//! - `reset` drops the writing end after recording the code, so the peer's next
//!   read fails with `ConnectionReset`
//! - `stop` drops the reading end, so the peer's writes fail with `BrokenPipe`
//! - `close` is shared by both ends and makes every `accept` return `Ok(None)`

use std::io;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};
use std::task::{Context, Poll, ready};

use async_trait::async_trait;
use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncWrite, DuplexStream, ReadBuf};
use tokio::sync::{Mutex, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::protocol::{ErrorCode, StreamDirection, StreamId};
use crate::transport::{BoxRecvStream, BoxSendStream, InboundStream, QuicConnection, RecvStream, SendStream};

const DEFAULT_STREAM_BUFFER: usize = 64 * 1024;

#[derive(Debug, Default)]
struct Shared {
    closed: CancellationToken,
    close: OnceLock<(ErrorCode, Bytes)>,
}

/// One endpoint of an in-memory connection.
#[derive(Debug)]
pub struct MemoryConnection {
    is_client: bool,
    shared: Arc<Shared>,
    incoming: Mutex<mpsc::UnboundedReceiver<InboundStream>>,
    outgoing: mpsc::UnboundedSender<InboundStream>,
    next_uni: AtomicU64,
    next_bidi: AtomicU64,
    stream_buffer: usize,
}

impl MemoryConnection {
    /// Creates a connected `(client, server)` pair.
    pub fn pair() -> (MemoryConnection, MemoryConnection) {
        Self::pair_with_buffer(DEFAULT_STREAM_BUFFER)
    }

    /// Like [`pair`](Self::pair), with `stream_buffer` bytes of buffering per stream.
    pub fn pair_with_buffer(stream_buffer: usize) -> (MemoryConnection, MemoryConnection) {
        let shared = Arc::new(Shared::default());
        let (to_server, server_incoming) = mpsc::unbounded_channel();
        let (to_client, client_incoming) = mpsc::unbounded_channel();

        let endpoint = |is_client, incoming, outgoing| MemoryConnection {
            is_client,
            shared: shared.clone(),
            incoming: Mutex::new(incoming),
            outgoing,
            next_uni: AtomicU64::new(0),
            next_bidi: AtomicU64::new(0),
            stream_buffer,
        };

        (endpoint(true, client_incoming, to_server), endpoint(false, server_incoming, to_client))
    }

    /// The code the connection was closed with, by either endpoint.
    pub fn close_code(&self) -> Option<ErrorCode> {
        self.shared.close.get().map(|(code, _)| *code)
    }

    pub fn close_reason(&self) -> Option<Bytes> {
        self.shared.close.get().map(|(_, reason)| reason.clone())
    }

    pub fn is_closed(&self) -> bool {
        self.shared.closed.is_cancelled()
    }

    /// Resolves once either endpoint closed the connection.
    pub async fn closed(&self) {
        self.shared.closed.cancelled().await
    }

    fn next_id(&self, direction: StreamDirection) -> StreamId {
        let counter = match direction {
            StreamDirection::Unidirectional => &self.next_uni,
            StreamDirection::Bidirectional => &self.next_bidi,
        };
        StreamId::from_parts(counter.fetch_add(1, Ordering::Relaxed), self.is_client, direction)
    }

    fn ensure_open(&self) -> io::Result<()> {
        if self.is_closed() {
            return Err(io::Error::new(io::ErrorKind::NotConnected, "connection closed"));
        }
        Ok(())
    }

    fn pipe(&self, id: StreamId) -> (MemorySendStream, MemoryRecvStream) {
        let (writer, reader) = tokio::io::duplex(self.stream_buffer);
        let signals = Arc::new(StreamSignals::default());
        (
            MemorySendStream { id, inner: Some(writer), signals: signals.clone() },
            MemoryRecvStream { id, inner: Some(reader), signals },
        )
    }

    fn deliver(&self, stream: InboundStream) -> io::Result<()> {
        self.outgoing.send(stream).map_err(|_| io::Error::new(io::ErrorKind::NotConnected, "peer endpoint dropped"))
    }
}

#[async_trait]
impl QuicConnection for MemoryConnection {
    async fn accept(&self) -> io::Result<Option<InboundStream>> {
        let mut incoming = self.incoming.lock().await;
        tokio::select! {
            biased;
            _ = self.shared.closed.cancelled() => Ok(None),
            stream = incoming.recv() => Ok(stream),
        }
    }

    async fn open_uni(&self) -> io::Result<BoxSendStream> {
        self.ensure_open()?;
        let id = self.next_id(StreamDirection::Unidirectional);
        let (send, recv) = self.pipe(id);
        self.deliver(InboundStream::Uni(Box::new(recv)))?;
        Ok(Box::new(send))
    }

    async fn open_bidi(&self) -> io::Result<(BoxSendStream, BoxRecvStream)> {
        self.ensure_open()?;
        let id = self.next_id(StreamDirection::Bidirectional);
        let (local_send, peer_recv) = self.pipe(id);
        let (peer_send, local_recv) = self.pipe(id);
        self.deliver(InboundStream::Bidi(Box::new(peer_send), Box::new(peer_recv)))?;
        Ok((Box::new(local_send), Box::new(local_recv)))
    }

    fn close(&self, code: ErrorCode, reason: &[u8]) {
        if self.shared.close.set((code, Bytes::copy_from_slice(reason))).is_ok() {
            debug!(%code, client = self.is_client, "memory connection closed");
        }
        self.shared.closed.cancel();
    }
}

#[derive(Debug, Default)]
struct StreamSignals {
    reset: OnceLock<ErrorCode>,
    stopped: OnceLock<ErrorCode>,
}

#[derive(Debug)]
pub struct MemorySendStream {
    id: StreamId,
    inner: Option<DuplexStream>,
    signals: Arc<StreamSignals>,
}

#[derive(Debug)]
pub struct MemoryRecvStream {
    id: StreamId,
    inner: Option<DuplexStream>,
    signals: Arc<StreamSignals>,
}

fn stopped_error(code: ErrorCode) -> io::Error {
    io::Error::new(io::ErrorKind::BrokenPipe, format!("stream stopped by peer with {code}"))
}

fn reset_error(code: ErrorCode) -> io::Error {
    io::Error::new(io::ErrorKind::ConnectionReset, format!("stream reset by peer with {code}"))
}

impl SendStream for MemorySendStream {
    fn id(&self) -> StreamId {
        self.id
    }

    fn reset(&mut self, code: ErrorCode) {
        let _ = self.signals.reset.set(code);
        self.inner.take();
    }
}

impl AsyncWrite for MemorySendStream {
    fn poll_write(mut self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &[u8]) -> Poll<io::Result<usize>> {
        if let Some(code) = self.signals.stopped.get() {
            return Poll::Ready(Err(stopped_error(*code)));
        }
        match self.inner.as_mut() {
            Some(inner) => Pin::new(inner).poll_write(cx, buf),
            None => Poll::Ready(Err(io::Error::new(io::ErrorKind::BrokenPipe, "stream already reset"))),
        }
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.inner.as_mut() {
            Some(inner) => Pin::new(inner).poll_flush(cx),
            None => Poll::Ready(Ok(())),
        }
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.inner.as_mut() {
            Some(inner) => Pin::new(inner).poll_shutdown(cx),
            None => Poll::Ready(Ok(())),
        }
    }
}

impl RecvStream for MemoryRecvStream {
    fn id(&self) -> StreamId {
        self.id
    }

    fn stop(&mut self, code: ErrorCode) {
        let _ = self.signals.stopped.set(code);
        self.inner.take();
    }
}

impl AsyncRead for MemoryRecvStream {
    fn poll_read(mut self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &mut ReadBuf<'_>) -> Poll<io::Result<()>> {
        if let Some(code) = self.signals.reset.get() {
            return Poll::Ready(Err(reset_error(*code)));
        }

        let this = &mut *self;
        let Some(inner) = this.inner.as_mut() else {
            return Poll::Ready(Ok(()));
        };

        let before = buf.filled().len();
        ready!(Pin::new(inner).poll_read(cx, buf))?;

        // a reset drops the writer, which first surfaces as end of stream
        if buf.filled().len() == before
            && let Some(code) = this.signals.reset.get()
        {
            return Poll::Ready(Err(reset_error(*code)));
        }
        Poll::Ready(Ok(()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    #[tokio::test]
    async fn uni_stream_reaches_peer() {
        let (client, server) = MemoryConnection::pair();
        let mut send = client.open_uni().await.unwrap();
        assert_eq!(send.id(), StreamId::new(2));

        send.write_all(b"hello").await.unwrap();
        send.shutdown().await.unwrap();

        let Some(InboundStream::Uni(mut recv)) = server.accept().await.unwrap() else {
            panic!("expected uni stream");
        };
        assert_eq!(recv.id(), StreamId::new(2));
        let mut out = Vec::new();
        recv.read_to_end(&mut out).await.unwrap();
        assert_eq!(out, b"hello");
    }

    #[tokio::test]
    async fn bidi_stream_ids_and_echo() {
        let (client, server) = MemoryConnection::pair();
        let (mut send, mut recv) = client.open_bidi().await.unwrap();
        assert_eq!(send.id(), StreamId::new(0));

        let Some(InboundStream::Bidi(mut peer_send, mut peer_recv)) = server.accept().await.unwrap() else {
            panic!("expected bidi stream");
        };

        send.write_all(b"ping").await.unwrap();
        let mut buf = [0u8; 4];
        peer_recv.read_exact(&mut buf).await.unwrap();
        peer_send.write_all(&buf).await.unwrap();
        recv.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"ping");

        let (server_send, _) = server.open_bidi().await.unwrap();
        assert_eq!(server_send.id(), StreamId::new(1));
    }

    #[tokio::test]
    async fn stop_fails_peer_writes() {
        let (client, server) = MemoryConnection::pair();
        let mut send = client.open_uni().await.unwrap();
        let Some(InboundStream::Uni(mut recv)) = server.accept().await.unwrap() else {
            panic!("expected uni stream");
        };

        recv.stop(ErrorCode::H3_STREAM_CREATION_ERROR);
        let err = send.write_all(b"x").await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::BrokenPipe);
    }

    #[tokio::test]
    async fn reset_fails_peer_reads() {
        let (client, server) = MemoryConnection::pair();
        let mut send = client.open_uni().await.unwrap();
        let Some(InboundStream::Uni(mut recv)) = server.accept().await.unwrap() else {
            panic!("expected uni stream");
        };

        send.reset(ErrorCode::H3_REQUEST_CANCELLED);
        let mut buf = [0u8; 1];
        let err = recv.read(&mut buf).await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::ConnectionReset);
    }

    #[tokio::test]
    async fn close_ends_accept_on_both_sides() {
        let (client, server) = MemoryConnection::pair();
        server.close(ErrorCode::H3_NO_ERROR, b"bye");

        assert!(client.accept().await.unwrap().is_none());
        assert!(server.accept().await.unwrap().is_none());
        assert_eq!(client.close_code(), Some(ErrorCode::H3_NO_ERROR));
        assert_eq!(client.close_reason().as_deref(), Some(&b"bye"[..]));
        assert!(client.open_uni().await.is_err());
    }
}
