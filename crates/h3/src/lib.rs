//! An asynchronous micro HTTP/3 protocol engine
//!
//! This crate implements the HTTP/3 layer that sits between a QUIC transport and
//! request handlers. It takes care of stream roles, frame parsing and emission,
//! SETTINGS negotiation, static-table QPACK header blocks and connection
//! shutdown, and leaves QUIC itself to whatever library implements the
//! [`transport`] traits.
//!
//! # Features
//!
//! - Resumable frame decoding: DATA payloads stream in chunks, unknown frames
//!   are skipped without buffering
//! - QPACK field sections against the static table, with a SIMD fast path for
//!   prefixed integers
//! - Control stream validation, SETTINGS exchange and GOAWAY handling
//! - Per-request tasks with stream-scoped errors
//! - Pooled, cancellable DATA frame writers
//! - An in-memory transport for tests and demos
//!
//! # Example
//!
//! ```no_run
//! use bytes::Bytes;
//! use http::{Request, Response, StatusCode};
//! use http_body_util::{BodyExt, Full};
//! use micro_h3::config::H3Config;
//! use micro_h3::connection::H3Connection;
//! use micro_h3::handler::make_handler;
//! use micro_h3::protocol::RecvBody;
//! use micro_h3::transport::memory::MemoryConnection;
//! use std::error::Error;
//! use std::sync::Arc;
//! use tokio_util::sync::CancellationToken;
//! use tracing::{error, info, Level};
//! use tracing_subscriber::FmtSubscriber;
//!
//! #[tokio::main]
//! async fn main() {
//!     let subscriber = FmtSubscriber::builder()
//!         .with_max_level(Level::INFO)
//!         .finish();
//!     tracing::subscriber::set_global_default(subscriber)
//!         .expect("setting default subscriber failed");
//!
//!     // any QuicConnection works here, e.g. an adapter over a QUIC library
//!     let (_client, server) = MemoryConnection::pair();
//!
//!     let handler = Arc::new(make_handler(hello_world));
//!     let connection = H3Connection::new(Arc::new(server), H3Config::default());
//!     match connection.process(handler, CancellationToken::new()).await {
//!         Ok(reason) => info!(?reason, "connection closed"),
//!         Err(e) => error!(cause = %e, "connection failed"),
//!     }
//! }
//!
//! async fn hello_world(request: Request<RecvBody>) -> Result<Response<Full<Bytes>>, Box<dyn Error + Send + Sync>> {
//!     info!(path = request.uri().path(), "request");
//!     let body = request.into_body().collect().await?.to_bytes();
//!     info!(len = body.len(), "receiving request body");
//!
//!     let response = Response::builder()
//!         .status(StatusCode::OK)
//!         .body(Full::new(Bytes::from_static(b"Hello World!\r\n")))?;
//!     Ok(response)
//! }
//! ```
//!
//! # Architecture
//!
//! - [`transport`]: the QUIC boundary and the in-memory transport
//! - [`codec`]: varints, QPACK and frame codecs
//! - [`protocol`]: frames, settings, error codes, headers and bodies
//! - [`connection`]: the connection driver, request streams and writers
//! - [`handler`]: request handler traits and utilities
//! - [`client`]: a minimal client over the same machinery
//! - [`config`]: serde-friendly connection configuration
//! - [`pool`]: the segment pool behind DATA writers
//!
//! # Error Handling
//!
//! - [`protocol::H3Error`]: top-level error type, mapped to an HTTP/3 error code
//! - [`protocol::DecodeError`]: varint, QPACK and frame decoding errors
//! - [`protocol::WriterError`]: DATA writer errors
//!
//! Errors on a request stream reset only that stream; errors on the control
//! stream close the whole connection after a GOAWAY.
//!
//! # Limitations
//!
//! - The QPACK dynamic table and Huffman-coded strings are not supported
//! - Server push and extended CONNECT are not supported

pub mod client;
pub mod codec;
pub mod config;
pub mod connection;
pub mod handler;
pub mod pool;
pub mod protocol;
pub mod transport;

mod utils;
pub(crate) use utils::ensure;
