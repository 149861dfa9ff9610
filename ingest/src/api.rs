use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::dispatch::QueueClosed;

#[derive(Debug, PartialEq, Eq, Deserialize, Serialize)]
pub enum IngestResponseCode {
    Ok = 1,
}

#[derive(Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct IngestResponse {
    pub status: IngestResponseCode,
}

#[derive(Error, Debug)]
pub enum IngestError {
    #[error("failed to parse request: {0}")]
    RequestParsingError(#[from] serde_json::Error),

    #[error("ingestion pipeline is shutting down")]
    QueueClosed(#[from] QueueClosed),
}

impl IntoResponse for IngestError {
    fn into_response(self) -> Response {
        match self {
            IngestError::RequestParsingError(_) => (StatusCode::BAD_REQUEST, self.to_string()),
            IngestError::QueueClosed(_) => (StatusCode::SERVICE_UNAVAILABLE, self.to_string()),
        }
        .into_response()
    }
}
