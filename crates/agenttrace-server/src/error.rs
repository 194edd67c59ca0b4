//! Application error types and Axum response conversion.

use agenttrace_monitor::{IngestError, StoreError};
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use tracing::{error, warn};

/// Application-level errors with HTTP status code mapping.
///
/// Messages are client-facing; internal detail is logged where the error is
/// created.
#[derive(Debug)]
pub enum AppError {
    BadRequest(String),
    NotFound(String),
    Conflict(String),
    Unprocessable(String),
    Cancelled(String),
    Timeout(String),
    Internal(String),
}

impl AppError {
    /// Maps an ingestion failure.
    pub fn from_ingest(e: IngestError) -> Self {
        match e {
            IngestError::Validation(reason) => {
                warn!(%reason, "Rejected trace payload");
                AppError::BadRequest("invalid trace payload".into())
            }
            IngestError::UnsupportedModel(e) => {
                warn!(error = %e, "Rejected trace for unpriced model");
                AppError::Unprocessable("failed to analyze tokens".into())
            }
            IngestError::Store(StoreError::DuplicateKey(trace_id)) => {
                warn!(%trace_id, "Rejected duplicate trace");
                AppError::Conflict("trace already exists".into())
            }
            IngestError::Store(e) => Self::from_store(e, "failed to save trace"),
        }
    }

    /// Maps a store failure, using `message` for otherwise-internal errors.
    pub fn from_store(e: StoreError, message: &str) -> Self {
        match e {
            StoreError::InvalidId(_) => AppError::BadRequest("invalid trace id".into()),
            StoreError::NotFound(_) => AppError::NotFound("trace not found".into()),
            StoreError::DuplicateKey(_) => AppError::Conflict("trace already exists".into()),
            StoreError::Cancelled => AppError::Cancelled("request cancelled".into()),
            StoreError::DeadlineExceeded => {
                warn!("Store call exceeded request deadline");
                AppError::Timeout("request timed out".into())
            }
            e @ (StoreError::Unavailable(_) | StoreError::Serialization(_)) => {
                error!(error = %e, "{}", message);
                AppError::Internal(message.into())
            }
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::Unprocessable(_) => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::Cancelled(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match self {
            AppError::BadRequest(m)
            | AppError::NotFound(m)
            | AppError::Conflict(m)
            | AppError::Unprocessable(m)
            | AppError::Cancelled(m)
            | AppError::Timeout(m)
            | AppError::Internal(m) => m,
        };
        (status, Json(ErrorResponse { error: message })).into_response()
    }
}
