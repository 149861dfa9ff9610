use axum::extract::State;
use axum::Json;
use bytes::Bytes;
use metrics::{counter, histogram};
use tracing::instrument;

use crate::api::{IngestError, IngestResponse, IngestResponseCode};
use crate::event::EventRecord;
use crate::router;

/// `POST /api/sendgrid_event`
///
/// Decodes a SendGrid notification batch and hands every element to the
/// dispatch queue. The response acknowledges receipt only: persistence
/// happens later in the writer pool and is invisible to the caller.
#[instrument(skip_all, fields(batch_size))]
pub async fn event(
    state: State<router::State>,
    body: Bytes,
) -> Result<Json<IngestResponse>, IngestError> {
    // Decode the whole batch up front so a parse error deep in the array
    // leaves no partial side effects.
    let events: Vec<EventRecord> = serde_json::from_slice(&body).map_err(|err| {
        tracing::warn!("rejected malformed batch: {}", err);
        err
    })?;

    tracing::Span::current().record("batch_size", events.len());
    counter!("ingest_events_received_total").increment(events.len() as u64);
    histogram!("ingest_event_batch_size").record(events.len() as f64);

    // Validation is deferred to the writers; invalid elements are enqueued
    // too. A full queue makes this await, coupling request latency to
    // persistence throughput instead of dropping events.
    for event in events {
        state.queue.enqueue(event).await?;
    }

    Ok(Json(IngestResponse {
        status: IngestResponseCode::Ok,
    }))
}
