//! HTTP/3 connection handling module
//!
//! This module drives one HTTP/3 connection on top of a [`QuicConnection`](crate::transport::QuicConnection):
//! it owns both control streams, classifies every peer stream, and runs one task
//! per request stream.
//!
//! # Components
//!
//! - [`H3Connection`]: the server-side connection driver that:
//!   - Opens the local control stream and sends SETTINGS
//!   - Validates the peer control stream and publishes the peer's SETTINGS
//!   - Refuses unsupported unidirectional streams
//!   - Serves request streams concurrently and isolates their errors
//!   - Sends GOAWAY on connection errors and honors a peer GOAWAY
//! - [`RequestStream`]: a received request head with its streaming body
//! - [`ResponseSender`]: frames a response onto its request stream
//! - [`DataFrameWriter`]: pooled DATA frame buffering with cancellable flush
//!
//! # State
//!
//! [`ConnectionState`] moves from `Initializing` through `ControlStreamNegotiating`
//! to `Operational`, then `Closing` and `Closed`; [`H3Connection::watch_state`]
//! observes the transitions.

mod frame_writer;
mod h3_connection;
mod message_sender;
mod request_stream;
mod stream_context;

pub use frame_writer::DataFrameWriter;
pub use h3_connection::{CloseReason, ConnectionState, H3Connection, RemoteSettings};
pub use message_sender::ResponseSender;
pub use request_stream::RequestStream;

pub(crate) use h3_connection::open_control_stream;
pub(crate) use message_sender::MessageSender;
pub(crate) use stream_context::{ControlContext, ControlEvent, StreamContext, accept_uni, next_control_frame};
