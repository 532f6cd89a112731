//! # jsonrpc-mux
//!
//! Asynchronous JSON-RPC client multiplexer over a single ordered duplex
//! byte stream, such as a TCP socket.
//!
//! A [`Connection`] lets any number of tasks issue concurrent calls over
//! one stream and correlates each out-of-order response back to the caller
//! that issued it. The JSON-RPC 2.0 wire shape is the default; vendor
//! dialects plug in through the [`Dialect`] trait.
//!
//! ## Architecture
//!
//! - **Writer task**: drains a bounded queue of outgoing envelopes and
//!   encodes them onto the stream in submission order.
//! - **Reader task**: decodes one incoming record at a time and delivers it
//!   through the pending table to the caller holding the matching call id.
//! - **Sticky error**: the first transport or decode failure is latched for
//!   the connection's lifetime; every later call fails fast with it.
//!
//! ## Example
//!
//! ```ignore
//! use jsonrpc_mux::{Connection, StandardDialect};
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let stream = tokio::net::TcpStream::connect("server:1234").await?;
//!     let conn = Connection::new(stream, StandardDialect);
//!
//!     let login = conn.request("system.login");
//!     let reply = login.call(vec![json!("admin"), json!("test")]).await?;
//!     let response = reply.await?;
//!     println!("{:?}", response.result);
//!     Ok(())
//! }
//! ```
//!
//! ## Error handling
//!
//! There are two stages where errors surface:
//!
//! - Calling a [`Request`] or [`Notification`] handle; these fail when the
//!   connection is already known bad (a previous read or write error).
//! - Awaiting the [`PendingReply`]; it resolves with the connection error
//!   if the stream fails while the call is in flight.
//!
//! A successful call submission does not imply the request was delivered -
//! only receipt of a [`Response`] confirms the server processed it. A
//! `Response` may itself carry an application-level [`ErrorObject`]; that
//! is normal data, not a connection failure.

pub mod dialect;
pub mod error;
pub mod response;

mod connection;
mod writer;

pub use connection::{
    Connection, ConnectionConfig, Notification, PendingReply, Request, DEFAULT_OUTBOX_CAPACITY,
};
pub use dialect::{Dialect, StandardDialect, TaggedDialect};
pub use error::{MuxError, Result};
pub use response::{Envelope, ErrorObject, Response};
