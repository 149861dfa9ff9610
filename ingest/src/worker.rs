use std::sync::Arc;

use chrono::Utc;
use metrics::counter;
use tokio::task::JoinHandle;
use tracing::{debug, error};

use crate::dispatch::DispatchQueue;
use crate::event::{truncate_url, EventRecord, EventType};
use crate::prometheus::report_dropped_events;
use crate::storage::{StorageError, StorageGateway};

/// A fixed-size pool of writer tasks draining the dispatch queue into the
/// storage gateway.
pub struct WriterPool {
    queue: DispatchQueue,
    storage: Arc<dyn StorageGateway + Send + Sync>,
    count: usize,
}

impl WriterPool {
    pub fn new(
        queue: DispatchQueue,
        storage: Arc<dyn StorageGateway + Send + Sync>,
        count: usize,
    ) -> Self {
        Self {
            queue,
            storage,
            count,
        }
    }

    /// Start every writer. The pool size is fixed for the life of the
    /// process; the caller joins the returned handles during shutdown.
    pub fn spawn(&self) -> Vec<JoinHandle<()>> {
        (0..self.count)
            .map(|writer_id| {
                let queue = self.queue.clone();
                let storage = self.storage.clone();

                tokio::spawn(async move {
                    debug!(writer_id, "writer started");
                    while let Some(record) = queue.dequeue().await {
                        process_record(storage.as_ref(), &record).await;
                    }
                    debug!(writer_id, "writer stopped");
                })
            })
            .collect()
    }
}

/// Apply one record to storage. A failure abandons this record only: it is
/// logged with context and counted, and the writer moves on to the next
/// one.
pub(crate) async fn process_record(
    storage: &(dyn StorageGateway + Send + Sync),
    record: &EventRecord,
) {
    if !record.is_valid() {
        debug!(event = %record.event, "dropping invalid event");
        report_dropped_events("invalid", 1);
        return;
    }

    // is_valid guarantees a nonzero timestamp, but a far out-of-range one
    // can still fail to convert.
    let Some(occurred_at) = record.occurred_at() else {
        debug!(timestamp = record.timestamp, "dropping event with unrepresentable timestamp");
        report_dropped_events("invalid", 1);
        return;
    };

    let applied = match record.event_type() {
        EventType::Open => storage.mark_opened(&record.email, occurred_at).await,
        EventType::Click => {
            storage
                .mark_clicked(&record.email, occurred_at, truncate_url(&record.url))
                .await
        }
        EventType::Other => Ok(()),
    };

    if let Err(error) = applied {
        report_failure(record, &error);
        return;
    }

    if let Err(error) = storage.append_audit(record, occurred_at, Utc::now()).await {
        report_failure(record, &error);
        return;
    }

    counter!("ingest_events_written_total").increment(1);
}

fn report_failure(record: &EventRecord, error: &StorageError) {
    error!(event = %record.event, email = %record.email, %error, "failed to persist event");
    counter!("ingest_storage_failures_total").increment(1);
}
