use std::sync::Arc;

use http::Request;
use tokio::select;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::connection::message_sender::{MessageSender, ResponseSender};
use crate::connection::stream_context::RequestContext;
use crate::connection::RemoteSettings;
use crate::handler::Handler;
use crate::pool::BufferPool;
use crate::protocol::{ErrorCode, H3Error, HeaderField, RecvBody, RequestHeader, StreamId};

/// A request whose header section has been received, handed to a [`Handler`].
///
/// The body is still streaming in; the response goes out through the paired
/// [`ResponseSender`].
#[derive(Debug)]
pub struct RequestStream {
    id: StreamId,
    fields: Vec<HeaderField>,
    header: RequestHeader,
    body: RecvBody,
    response: ResponseSender,
}

impl RequestStream {
    pub fn id(&self) -> StreamId {
        self.id
    }

    /// The decoded field lines, in wire order, pseudo-headers included.
    pub fn fields(&self) -> &[HeaderField] {
        &self.fields
    }

    pub fn header(&self) -> &RequestHeader {
        &self.header
    }

    pub fn body_mut(&mut self) -> &mut RecvBody {
        &mut self.body
    }

    pub fn response_mut(&mut self) -> &mut ResponseSender {
        &mut self.response
    }

    pub fn into_parts(self) -> (RequestHeader, RecvBody, ResponseSender) {
        (self.header, self.body, self.response)
    }

    pub fn into_request(self) -> (Request<RecvBody>, ResponseSender) {
        (self.header.body(self.body), self.response)
    }
}

/// What every request task shares with its connection.
#[derive(Debug, Clone)]
pub(crate) struct RequestEnv {
    pub(crate) pool: BufferPool,
    pub(crate) peer_settings: RemoteSettings,
}

/// Reads the request head from `ctx` and runs `handler` on it.
///
/// Errors stay on this stream: a malformed head resets it with the error's code,
/// cancellation resets it with H3_REQUEST_CANCELLED.
pub(crate) async fn serve_request<H>(
    mut ctx: RequestContext,
    handler: Arc<H>,
    env: RequestEnv,
    cancel: CancellationToken,
) -> (StreamId, Result<(), H3Error>)
where
    H: Handler,
{
    let id = ctx.id();

    let head = select! {
        biased;
        _ = cancel.cancelled() => {
            debug!(stream_id = %id, headers_received = ctx.headers_received(), "connection closing, cancel request");
            ctx.abort(ErrorCode::H3_REQUEST_CANCELLED);
            return (id, Ok(()));
        }
        head = ctx.read_request_head() => head,
    };

    let (fields, header) = match head {
        Ok(head) => head,
        Err(e) => {
            warn!(stream_id = %id, code = %e.code(), cause = %e, "reject request");
            ctx.abort(e.code());
            return (id, Err(e));
        }
    };
    debug!(stream_id = %id, method = %header.method(), uri = %header.uri(), "received request");

    let (send, body) = ctx.into_parts();
    let sender = MessageSender::new(send, env.pool, env.peer_settings, cancel.clone());
    let stream = RequestStream { id, fields, header, body, response: ResponseSender::new(sender) };

    let result = select! {
        biased;
        _ = cancel.cancelled() => Ok(()),
        called = handler.call(stream) => called.map_err(H3Error::handler),
    };
    (id, result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{FrameDecoder, FrameEncoder};
    use crate::handler::MockHandler;
    use crate::pool::DEFAULT_SEGMENT_SIZE;
    use crate::protocol::Frame;
    use crate::transport::memory::MemoryConnection;
    use crate::transport::{BoxRecvStream, BoxSendStream, InboundStream, QuicConnection};
    use bytes::{Bytes, BytesMut};
    use futures::{SinkExt, StreamExt};
    use http::Method;
    use tokio::io::AsyncWriteExt;
    use tokio_util::codec::{FramedRead, FramedWrite};

    fn env() -> RequestEnv {
        let (_tx, peer_settings) = RemoteSettings::channel();
        RequestEnv { pool: BufferPool::new(DEFAULT_SEGMENT_SIZE), peer_settings }
    }

    async fn request_pair() -> (FramedWrite<BoxSendStream, FrameEncoder>, BoxRecvStream, RequestContext) {
        let (client, server) = MemoryConnection::pair();
        let (send, recv) = client.open_bidi().await.unwrap();
        let Some(InboundStream::Bidi(server_send, server_recv)) = server.accept().await.unwrap() else {
            panic!("expected bidi stream");
        };
        (FramedWrite::new(send, FrameEncoder), recv, RequestContext::new(server_send, server_recv, None))
    }

    #[tokio::test]
    async fn handler_sees_request() {
        let (mut client_send, client_recv, ctx) = request_pair().await;

        let request = Request::builder().method(Method::POST).uri("https://example.com/upload").body(()).unwrap();
        let mut section = BytesMut::new();
        RequestHeader::from(request).encode(&mut section);
        client_send.send(Frame::Headers(section.freeze())).await.unwrap();
        client_send.get_mut().shutdown().await.unwrap();

        let mut handler = MockHandler::new();
        handler.expect_call().times(1).returning(|stream| {
            assert_eq!(stream.header().method(), &Method::POST);
            assert_eq!(stream.header().uri().path(), "/upload");
            assert_eq!(stream.fields()[0].name(), b":method");
            Ok(())
        });

        let (_, result) = serve_request(ctx, Arc::new(handler), env(), CancellationToken::new()).await;
        assert!(result.is_ok());

        // the sender was dropped unfinished, so the response side is reset
        let mut frames = FramedRead::new(client_recv, FrameDecoder::new());
        assert!(frames.next().await.unwrap().is_err());
    }

    #[tokio::test]
    async fn malformed_head_resets_stream() {
        let (mut client_send, client_recv, ctx) = request_pair().await;
        client_send.send(Frame::Data(Bytes::from_static(b"early"))).await.unwrap();

        let mut handler = MockHandler::new();
        handler.expect_call().never();

        let (_, result) = serve_request(ctx, Arc::new(handler), env(), CancellationToken::new()).await;
        assert_eq!(result.unwrap_err().code(), ErrorCode::H3_FRAME_UNEXPECTED);

        let mut frames = FramedRead::new(client_recv, FrameDecoder::new());
        assert!(frames.next().await.unwrap().is_err());
    }

    #[tokio::test]
    async fn cancelled_before_head() {
        let (_client_send, _client_recv, ctx) = request_pair().await;
        let cancel = CancellationToken::new();
        cancel.cancel();

        let mut handler = MockHandler::new();
        handler.expect_call().never();

        let (_, result) = serve_request(ctx, Arc::new(handler), env(), cancel).await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn handler_error_is_reported() {
        let (mut client_send, _client_recv, ctx) = request_pair().await;
        let request = Request::get("https://example.com/").body(()).unwrap();
        let mut section = BytesMut::new();
        RequestHeader::from(request).encode(&mut section);
        client_send.send(Frame::Headers(section.freeze())).await.unwrap();

        let mut handler = MockHandler::new();
        handler.expect_call().returning(|_| Err(H3Error::message("boom")));

        let (_, result) = serve_request(ctx, Arc::new(handler), env(), CancellationToken::new()).await;
        assert!(matches!(result, Err(H3Error::Handler { .. })));
    }
}
