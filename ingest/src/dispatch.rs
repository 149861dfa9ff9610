use std::sync::Arc;

use thiserror::Error;
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;

use crate::event::EventRecord;

#[derive(Error, Debug)]
#[error("dispatch queue is shut down")]
pub struct QueueClosed;

/// Bounded hand-off between the HTTP handler and the writer pool.
///
/// Many producers enqueue concurrently via cloned senders; the writers
/// share the receiving end, so each record is delivered to exactly one of
/// them. FIFO holds per producer. A full queue makes `enqueue` wait, which
/// is the backpressure that keeps memory bounded under load.
#[derive(Clone)]
pub struct DispatchQueue {
    sender: mpsc::Sender<EventRecord>,
    receiver: Arc<Mutex<mpsc::Receiver<EventRecord>>>,
    shutdown: CancellationToken,
}

impl DispatchQueue {
    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, receiver) = mpsc::channel(capacity);

        Self {
            sender,
            receiver: Arc::new(Mutex::new(receiver)),
            shutdown: CancellationToken::new(),
        }
    }

    /// Enqueue one record, waiting for capacity when the buffer is full.
    /// Records are never silently dropped; once the shutdown signal has
    /// fired the caller gets `QueueClosed` instead.
    pub async fn enqueue(&self, record: EventRecord) -> Result<(), QueueClosed> {
        if self.shutdown.is_cancelled() {
            return Err(QueueClosed);
        }

        tokio::select! {
            _ = self.shutdown.cancelled() => Err(QueueClosed),
            sent = self.sender.send(record) => sent.map_err(|_| QueueClosed),
        }
    }

    /// Wait for the next record. Returns `None` once the shutdown signal
    /// fires, for every blocked and every future caller.
    pub async fn dequeue(&self) -> Option<EventRecord> {
        tokio::select! {
            _ = self.shutdown.cancelled() => None,
            record = async {
                let mut receiver = self.receiver.lock().await;
                receiver.recv().await
            } => record,
        }
    }

    /// Fire the shutdown signal. Best-effort drain: records still queued
    /// may be abandoned, workers finish only their in-flight record.
    /// Calling this more than once is a no-op.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutdown.is_cancelled()
    }
}
