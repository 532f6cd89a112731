//! The connection: call-id allocation, correlation, and the reader task.
//!
//! A [`Connection`] owns an ordered duplex byte stream and multiplexes any
//! number of concurrent calls over it. Outgoing envelopes funnel through the
//! writer task's queue; the reader task decodes one incoming record at a
//! time and routes it to the caller that allocated the matching id.
//!
//! ```text
//!            Request::call ──► pending table ◄── reader task ◄── stream
//!                  │            (id -> slot)
//!                  └──────────► outbox queue ──► writer task ──► stream
//! ```
//!
//! Everything that must stay consistent across concurrent callers - the id
//! counter, the pending table, and the sticky error - lives behind a single
//! mutex. The reader and writer tasks share no other state.

use std::collections::HashMap;
use std::future::Future;
use std::mem;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use parking_lot::Mutex;
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, BufReader};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::dialect::Dialect;
use crate::error::{MuxError, Result};
use crate::response::{Envelope, Response};
use crate::writer::spawn_writer_task;

/// Default capacity of the outgoing envelope queue.
pub const DEFAULT_OUTBOX_CAPACITY: usize = 1024;

/// Configuration for a connection.
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// Capacity of the outgoing envelope queue. Submitting a call while the
    /// queue is full waits until the writer task drains it, so a stalled
    /// stream applies backpressure to every caller.
    pub outbox_capacity: usize,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            outbox_capacity: DEFAULT_OUTBOX_CAPACITY,
        }
    }
}

/// Per-connection state shared between callers and the background tasks.
#[derive(Debug)]
pub(crate) struct Shared {
    state: Mutex<State>,
}

#[derive(Debug)]
struct State {
    next_id: u64,
    pending: HashMap<u64, oneshot::Sender<Response>>,
    err: Option<MuxError>,
}

impl Shared {
    pub(crate) fn new() -> Self {
        Self {
            state: Mutex::new(State {
                next_id: 0,
                pending: HashMap::new(),
                err: None,
            }),
        }
    }

    /// Latch `err` as the sticky error and resolve every outstanding call.
    ///
    /// Only the first failure sticks. The pending table is drained either
    /// way: dropping the senders wakes the waiting callers, which then
    /// observe the sticky error.
    pub(crate) fn latch(&self, err: MuxError) {
        let drained = {
            let mut state = self.state.lock();
            if state.err.is_none() {
                state.err = Some(err);
            }
            mem::take(&mut state.pending)
        };
        drop(drained);
    }

    /// Clone out the sticky error, if set.
    pub(crate) fn error(&self) -> Option<MuxError> {
        self.state.lock().err.clone()
    }
}

/// An asynchronous RPC client connection over an ordered duplex byte
/// stream.
///
/// The connection spawns two background tasks at construction: one drains
/// the outgoing envelope queue, one decodes incoming records and correlates
/// them back to callers. Handles created by [`request`](Connection::request)
/// and [`notification`](Connection::notification) may be used concurrently
/// from any number of tasks.
///
/// The first transport or decode failure latches as the connection's sticky
/// error; from then on every call fails fast with it and outstanding calls
/// are resolved with it. There is no recovery: construct a new connection
/// over a new stream.
///
/// Dropping the connection aborts both tasks and resolves outstanding calls
/// with [`MuxError::Closed`].
pub struct Connection {
    shared: Arc<Shared>,
    dialect: Arc<dyn Dialect>,
    outbox: mpsc::Sender<Envelope>,
    reader_task: JoinHandle<()>,
    writer_task: JoinHandle<()>,
}

impl Connection {
    /// Create a connection over `stream` using the given dialect.
    pub fn new<S, D>(stream: S, dialect: D) -> Self
    where
        S: AsyncRead + AsyncWrite + Send + Unpin + 'static,
        D: Dialect + 'static,
    {
        Self::with_config(stream, dialect, ConnectionConfig::default())
    }

    /// Create a connection with explicit configuration.
    pub fn with_config<S, D>(stream: S, dialect: D, config: ConnectionConfig) -> Self
    where
        S: AsyncRead + AsyncWrite + Send + Unpin + 'static,
        D: Dialect + 'static,
    {
        let (read_half, write_half) = tokio::io::split(stream);
        let shared = Arc::new(Shared::new());

        let (outbox, writer_task) =
            spawn_writer_task(write_half, shared.clone(), config.outbox_capacity);

        let reader_shared = shared.clone();
        let reader_task = tokio::spawn(read_loop(read_half, reader_shared));

        Self {
            shared,
            dialect: Arc::new(dialect),
            outbox,
            reader_task,
            writer_task,
        }
    }

    /// Create a request function bound to `method`.
    pub fn request(&self, method: &str) -> Request {
        Request {
            shared: self.shared.clone(),
            dialect: self.dialect.clone(),
            outbox: self.outbox.clone(),
            method: method.to_string(),
        }
    }

    /// Create a notification function bound to `method`.
    pub fn notification(&self, method: &str) -> Notification {
        Notification {
            shared: self.shared.clone(),
            dialect: self.dialect.clone(),
            outbox: self.outbox.clone(),
            method: method.to_string(),
        }
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.reader_task.abort();
        self.writer_task.abort();
        self.shared.latch(MuxError::Closed);
    }
}

/// A request function bound to a connection and a method.
///
/// Created by [`Connection::request`]. Cheap to clone; clones share the
/// connection and its id space.
#[derive(Clone)]
pub struct Request {
    shared: Arc<Shared>,
    dialect: Arc<dyn Dialect>,
    outbox: mpsc::Sender<Envelope>,
    method: String,
}

impl Request {
    /// Perform the request with the given parameters.
    ///
    /// Allocates the next call id, registers a delivery slot for it, and
    /// submits a request envelope built by the dialect. Waits for outbox
    /// space while the stream is applying backpressure. The meaning of
    /// `params` is defined by the dialect; the standard dialect sends them
    /// verbatim as the method arguments.
    ///
    /// The returned [`PendingReply`] resolves with the matching
    /// [`Response`] whenever it arrives, independent of the order responses
    /// take on the stream.
    ///
    /// # Errors
    ///
    /// Fails fast with the sticky error if the connection has already
    /// failed. A successfully returned `PendingReply` does not imply the
    /// request reached the server - only a delivered `Response` does.
    pub async fn call(&self, params: Vec<Value>) -> Result<PendingReply> {
        let (tx, rx) = oneshot::channel();

        // Id allocation and slot registration form one critical section so
        // two concurrent calls can never claim the same id.
        let id = {
            let mut state = self.shared.state.lock();
            if let Some(err) = &state.err {
                return Err(err.clone());
            }
            let id = state.next_id;
            state.next_id += 1;
            state.pending.insert(id, tx);
            id
        };

        let envelope = self.dialect.request(id, &self.method, params);
        if self.outbox.send(envelope).await.is_err() {
            // Writer task is gone; withdraw the slot we just registered.
            self.shared.state.lock().pending.remove(&id);
            return Err(self.shared.error().unwrap_or(MuxError::Closed));
        }

        Ok(PendingReply {
            rx,
            shared: self.shared.clone(),
        })
    }
}

/// A notification function bound to a connection and a method.
///
/// Created by [`Connection::notification`]. Cheap to clone.
#[derive(Clone)]
pub struct Notification {
    shared: Arc<Shared>,
    dialect: Arc<dyn Dialect>,
    outbox: mpsc::Sender<Envelope>,
    method: String,
}

impl Notification {
    /// Perform the notification with the given parameters.
    ///
    /// No call id is allocated, no delivery slot is registered, and no
    /// response is ever expected. `Ok` means the envelope was queued for
    /// writing, not that it was delivered.
    pub async fn send(&self, params: Vec<Value>) -> Result<()> {
        if let Some(err) = self.shared.error() {
            return Err(err);
        }

        let envelope = self.dialect.notification(&self.method, params);
        if self.outbox.send(envelope).await.is_err() {
            return Err(self.shared.error().unwrap_or(MuxError::Closed));
        }
        Ok(())
    }
}

/// Future resolving to the response for one request.
///
/// Yields exactly one [`Response`]. If the connection fails while the call
/// is outstanding, resolves with the connection's sticky error instead.
#[derive(Debug)]
pub struct PendingReply {
    rx: oneshot::Receiver<Response>,
    shared: Arc<Shared>,
}

impl Future for PendingReply {
    type Output = Result<Response>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        match Pin::new(&mut this.rx).poll(cx) {
            Poll::Ready(Ok(response)) => Poll::Ready(Ok(response)),
            // Sender dropped: the slot was revoked when the sticky error
            // latched or the connection was dropped.
            Poll::Ready(Err(_)) => {
                Poll::Ready(Err(this.shared.error().unwrap_or(MuxError::Closed)))
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

/// Reader task: decode one envelope per line and route it by id.
///
/// Exits on the first read or decode failure, latching it as the sticky
/// error. An id with no pending entry (duplicate delivery, stale id, or a
/// peer bug) is dropped with a diagnostic and processing continues.
async fn read_loop<R>(read_half: R, shared: Arc<Shared>)
where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(read_half);
    let mut line = String::new();

    loop {
        line.clear();
        match reader.read_line(&mut line).await {
            Ok(0) => {
                tracing::debug!("reader task: stream closed");
                shared.latch(MuxError::Closed);
                return;
            }
            Ok(_) => {}
            Err(e) => {
                shared.latch(MuxError::Read(Arc::new(e)));
                return;
            }
        }

        let record = line.trim();
        if record.is_empty() {
            // Inter-record whitespace is not an envelope.
            continue;
        }

        let response: Response = match serde_json::from_str(record) {
            Ok(response) => response,
            Err(e) => {
                shared.latch(MuxError::Decode(Arc::new(e)));
                return;
            }
        };

        let slot = shared.state.lock().pending.remove(&response.id);
        match slot {
            // A send failure means the caller stopped waiting; the entry is
            // gone either way.
            Some(tx) => {
                let _ = tx.send(response);
            }
            None => {
                tracing::warn!("dropping response for unknown id {}", response.id);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialect::StandardDialect;
    use serde_json::json;
    use tokio::io::AsyncWriteExt;

    fn pending_len(conn: &Connection) -> usize {
        conn.shared.state.lock().pending.len()
    }

    fn next_id(conn: &Connection) -> u64 {
        conn.shared.state.lock().next_id
    }

    #[tokio::test]
    async fn test_request_allocates_sequential_ids() {
        let (client, _server) = tokio::io::duplex(4096);
        let conn = Connection::new(client, StandardDialect);
        let login = conn.request("system.login");

        for _ in 0..3 {
            let _reply = login.call(vec![json!("admin")]).await.unwrap();
        }

        assert_eq!(next_id(&conn), 3);
        assert_eq!(pending_len(&conn), 3);
    }

    #[tokio::test]
    async fn test_notification_registers_nothing() {
        let (client, _server) = tokio::io::duplex(4096);
        let conn = Connection::new(client, StandardDialect);
        let ping = conn.notification("ping");

        ping.send(vec![]).await.unwrap();

        assert_eq!(next_id(&conn), 0);
        assert_eq!(pending_len(&conn), 0);
    }

    #[tokio::test]
    async fn test_latch_resolves_outstanding_calls() {
        let (client, _server) = tokio::io::duplex(4096);
        let conn = Connection::new(client, StandardDialect);
        let login = conn.request("system.login");

        let reply = login.call(vec![]).await.unwrap();
        conn.shared.latch(MuxError::Closed);

        assert!(matches!(reply.await, Err(MuxError::Closed)));
        assert_eq!(pending_len(&conn), 0);
    }

    #[test]
    fn test_latch_keeps_first_error() {
        let shared = Shared::new();
        shared.latch(MuxError::Closed);
        shared.latch(MuxError::Write(Arc::new(std::io::Error::other("late"))));

        assert!(matches!(shared.error(), Some(MuxError::Closed)));
    }

    #[tokio::test]
    async fn test_unknown_id_leaves_pending_calls_alone() {
        let (client, server) = tokio::io::duplex(4096);
        let conn = Connection::new(client, StandardDialect);
        let (_server_read, mut server_write) = tokio::io::split(server);

        let login = conn.request("system.login");
        let reply = login.call(vec![]).await.unwrap();

        server_write
            .write_all(b"{\"id\":9,\"result\":\"stale\"}\n{\"id\":0,\"result\":\"mine\"}\n")
            .await
            .unwrap();

        let response = reply.await.unwrap();
        assert_eq!(response.result, Some(json!("mine")));
        assert!(conn.shared.error().is_none());
    }
}
