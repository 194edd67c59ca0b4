//! Trace ingestion and query API handlers.

use std::sync::Arc;

use agenttrace_core::{RecordId, TraceRecord};
use agenttrace_monitor::ListParams;
use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::ServerState;

/// Response for a stored trace.
#[derive(Debug, Serialize, Deserialize)]
pub struct CreateTraceResponse {
    pub message: String,
    pub id: RecordId,
}

/// Response for listing traces.
#[derive(Debug, Serialize, Deserialize)]
pub struct TracesListResponse {
    pub traces: Vec<TraceRecord>,
}

/// POST /api/traces - Ingest a trace.
pub async fn create(
    State(state): State<Arc<ServerState>>,
    body: Bytes,
) -> Result<(StatusCode, Json<CreateTraceResponse>), AppError> {
    let ctx = state.call_context();
    let record = state
        .ingest
        .ingest_json(&ctx, &body)
        .await
        .map_err(AppError::from_ingest)?;

    Ok((
        StatusCode::CREATED,
        Json(CreateTraceResponse {
            message: "trace saved".into(),
            id: record.id,
        }),
    ))
}

/// GET /api/traces - List traces with optional filtering.
///
/// Query pairs are taken raw so repeated or malformed keys degrade instead of
/// failing extraction.
pub async fn list(
    State(state): State<Arc<ServerState>>,
    Query(pairs): Query<Vec<(String, String)>>,
) -> Result<Json<TracesListResponse>, AppError> {
    let params = ListParams::from_pairs(pairs);
    let ctx = state.call_context();
    let traces = state
        .query
        .list(&ctx, &params)
        .await
        .map_err(|e| AppError::from_store(e, "failed to fetch traces"))?;

    Ok(Json(TracesListResponse { traces }))
}

/// GET /api/traces/{id} - Get a single trace by its storage id.
pub async fn get(
    State(state): State<Arc<ServerState>>,
    Path(id): Path<String>,
) -> Result<Json<TraceRecord>, AppError> {
    let ctx = state.call_context();
    let trace = state
        .query
        .get_by_id(&ctx, &id)
        .await
        .map_err(|e| AppError::from_store(e, "failed to fetch trace"))?;

    Ok(Json(trace))
}
