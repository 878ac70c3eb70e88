//! The QUIC transport boundary
//!
//! HTTP/3 only needs a handful of primitives from QUIC: accepting peer streams,
//! opening streams, reading and writing stream bytes, aborting one direction of a
//! stream with an application error code and closing the connection with one.
//! [`QuicConnection`], [`SendStream`] and [`RecvStream`] capture exactly that, so
//! any QUIC library can be adapted. [`memory`] provides an in-process
//! implementation for tests and demos.

use std::fmt;
use std::io;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWrite};

use crate::protocol::{ErrorCode, StreamId};

pub mod memory;

/// The sending half of a stream.
pub trait SendStream: AsyncWrite + Send + Unpin {
    fn id(&self) -> StreamId;

    /// Abruptly terminates the sending side (RESET_STREAM).
    fn reset(&mut self, code: ErrorCode);
}

/// The receiving half of a stream.
pub trait RecvStream: AsyncRead + Send + Unpin {
    fn id(&self) -> StreamId;

    /// Asks the peer to stop sending (STOP_SENDING) and discards further data.
    fn stop(&mut self, code: ErrorCode);
}

pub type BoxSendStream = Box<dyn SendStream>;
pub type BoxRecvStream = Box<dyn RecvStream>;

/// A stream opened by the peer.
pub enum InboundStream {
    Uni(BoxRecvStream),
    Bidi(BoxSendStream, BoxRecvStream),
}

impl fmt::Debug for InboundStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InboundStream::Uni(recv) => f.debug_tuple("Uni").field(&recv.id()).finish(),
            InboundStream::Bidi(_, recv) => f.debug_tuple("Bidi").field(&recv.id()).finish(),
        }
    }
}

impl InboundStream {
    pub fn id(&self) -> StreamId {
        match self {
            InboundStream::Uni(recv) => recv.id(),
            InboundStream::Bidi(_, recv) => recv.id(),
        }
    }
}

#[async_trait]
pub trait QuicConnection: Send + Sync + 'static {
    /// Waits for the next peer-initiated stream.
    ///
    /// Returns `Ok(None)` once the connection is closed, by either side.
    async fn accept(&self) -> io::Result<Option<InboundStream>>;

    async fn open_uni(&self) -> io::Result<BoxSendStream>;

    async fn open_bidi(&self) -> io::Result<(BoxSendStream, BoxRecvStream)>;

    /// Closes the connection with an application error code.
    fn close(&self, code: ErrorCode, reason: &[u8]);
}
