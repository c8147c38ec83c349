//! GET /object/{id}, /state/{id}, /status/{id}: result retrieval.

use axum::extract::{Path, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};

use remora_core::codec;
use remora_core::Value;
use remora_services::Snapshot;

use super::{engine_error, parse_id, ApiState};

fn blob_response(bytes: Vec<u8>) -> Response {
    (
        [(header::CONTENT_TYPE, "application/octet-stream")],
        bytes,
    )
        .into_response()
}

fn encode(value: &Value) -> Result<Vec<u8>, (StatusCode, String)> {
    codec::encode_blob(value).map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))
}

/// GET /object/{id}: blocks until the result is ready.
pub async fn handle_object(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> Result<Response, (StatusCode, String)> {
    let id = parse_id(&id)?;
    let value = state.engine.fetch(&id).await.map_err(engine_error)?;
    Ok(blob_response(encode(&value)?))
}

/// GET /state/{id}: result if ready, else the latest checkpoint, else 204.
pub async fn handle_state(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> Result<Response, (StatusCode, String)> {
    let id = parse_id(&id)?;
    match state.engine.state(&id).map_err(engine_error)? {
        Snapshot::Result(value) => Ok(blob_response(encode(&value)?)),
        Snapshot::Checkpoint(blob) => Ok(blob_response(blob.to_vec())),
        Snapshot::Empty => Ok(StatusCode::NO_CONTENT.into_response()),
    }
}

/// GET /status/{id}: "ready" or "not ready".
pub async fn handle_status(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> Result<&'static str, (StatusCode, String)> {
    let id = parse_id(&id)?;
    match state.engine.status(&id) {
        Some(true) => Ok("ready"),
        Some(false) => Ok("not ready"),
        None => Err((StatusCode::NOT_FOUND, format!("unknown result {}", id))),
    }
}
