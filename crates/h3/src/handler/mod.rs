//! Request handlers
//!
//! A [`Handler`] receives each [`RequestStream`] once its header section is
//! decoded, and owns the stream from then on. Handlers that map a request to a
//! response are easiest to write as async functions wrapped by [`make_handler`]:
//!
//! ```
//! use bytes::Bytes;
//! use http::{Request, Response};
//! use http_body_util::{BodyExt, Full};
//! use micro_h3::handler::make_handler;
//! use micro_h3::protocol::RecvBody;
//! use std::error::Error;
//!
//! async fn echo(request: Request<RecvBody>) -> Result<Response<Full<Bytes>>, Box<dyn Error + Send + Sync>> {
//!     let body = request.into_body().collect().await?.to_bytes();
//!     Ok(Response::new(Full::new(body)))
//! }
//!
//! let handler = make_handler(echo);
//! # let _ = handler;
//! ```

use std::error::Error;

use async_trait::async_trait;
use bytes::Bytes;
use http::{Request, Response, StatusCode};
use http_body::Body;
use http_body_util::Empty;
use tracing::error;

use crate::connection::RequestStream;
use crate::protocol::{H3Error, RecvBody};

#[cfg_attr(test, mockall::automock(type Error = H3Error;))]
#[async_trait]
pub trait Handler: Send + Sync {
    type Error: Into<Box<dyn Error + Send + Sync>>;

    /// Serves one request stream. Returning without finishing the response
    /// resets the stream.
    async fn call(&self, stream: RequestStream) -> Result<(), Self::Error>;
}

#[derive(Debug)]
pub struct HandlerFn<F> {
    f: F,
}

#[async_trait]
impl<F, Fut, RespBody, Err> Handler for HandlerFn<F>
where
    F: Fn(Request<RecvBody>) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Response<RespBody>, Err>> + Send + 'static,
    RespBody: Body<Data = Bytes> + Send + Unpin + 'static,
    RespBody::Error: Into<Box<dyn Error + Send + Sync>> + Send,
    Err: Into<Box<dyn Error + Send + Sync>> + Send + 'static,
{
    type Error = H3Error;

    async fn call(&self, stream: RequestStream) -> Result<(), Self::Error> {
        let (request, mut sender) = stream.into_request();
        match (self.f)(request).await {
            Ok(response) => sender.send_response(response).await,
            Err(e) => {
                let e: Box<dyn Error + Send + Sync> = e.into();
                error!(stream_id = %sender.stream_id(), cause = %e, "handler failed, respond with 500");
                sender.send_response(internal_server_error()).await
            }
        }
    }
}

fn internal_server_error() -> Response<Empty<Bytes>> {
    let mut response = Response::new(Empty::new());
    *response.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
    response
}

pub fn make_handler<F, RespBody, Err, Ret>(f: F) -> HandlerFn<F>
where
    RespBody: Body<Data = Bytes> + Send + Unpin + 'static,
    RespBody::Error: Into<Box<dyn Error + Send + Sync>> + Send,
    Err: Into<Box<dyn Error + Send + Sync>> + Send + 'static,
    Ret: Future<Output = Result<Response<RespBody>, Err>> + Send + 'static,
    F: Fn(Request<RecvBody>) -> Ret + Send + Sync,
{
    HandlerFn { f }
}
