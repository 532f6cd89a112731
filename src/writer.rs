//! Dedicated writer task for outgoing envelopes.
//!
//! Envelopes are submitted through a bounded mpsc channel and written to the
//! stream strictly in submission order, one newline-terminated JSON record
//! per envelope. The bounded channel is the connection's backpressure point:
//! while the stream is stalled, every caller submitting a new call waits for
//! queue space.
//!
//! ```text
//! Request 1 ─┐
//! Request 2 ─┼─► mpsc::Sender<Envelope> ─► writer task ─► stream
//! Notify  N ─┘
//! ```
//!
//! On the first encode or write failure the task latches that failure as the
//! connection's sticky error and exits, abandoning whatever is left in the
//! queue.

use std::sync::Arc;

use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::connection::Shared;
use crate::error::MuxError;
use crate::response::Envelope;

/// Spawn the writer task.
///
/// Returns the submission side of the outbox queue and the task handle. The
/// task exits when the queue closes or on the first failure.
pub(crate) fn spawn_writer_task<W>(
    writer: W,
    shared: Arc<Shared>,
    capacity: usize,
) -> (mpsc::Sender<Envelope>, JoinHandle<()>)
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (tx, rx) = mpsc::channel(capacity);
    let task = tokio::spawn(writer_loop(rx, writer, shared));
    (tx, task)
}

/// Main writer loop - receives envelopes and encodes them onto the stream.
async fn writer_loop<W>(mut rx: mpsc::Receiver<Envelope>, mut writer: W, shared: Arc<Shared>)
where
    W: AsyncWrite + Unpin,
{
    while let Some(envelope) = rx.recv().await {
        let mut record = match serde_json::to_vec(&envelope) {
            Ok(record) => record,
            Err(e) => {
                shared.latch(MuxError::Encode(Arc::new(e)));
                return;
            }
        };
        record.push(b'\n');

        if let Err(e) = write_record(&mut writer, &record).await {
            shared.latch(MuxError::Write(Arc::new(e)));
            return;
        }
    }

    tracing::debug!("writer task: outbox closed, exiting");
}

async fn write_record<W>(writer: &mut W, record: &[u8]) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    writer.write_all(record).await?;
    writer.flush().await
}
