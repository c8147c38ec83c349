//! POST /, /create, /call, /get, /abort: command submission.
//!
//! A JSON body is a command; an `application/octet-stream` body is a value
//! blob stored as-is. Either way the response is the new result id as plain
//! text. Everything that can be rejected is rejected here, before queueing.

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::{header, HeaderMap, StatusCode};

use remora_core::codec;
use remora_core::CommandKind;

use super::{engine_error, ApiState};

enum Body {
    Json,
    Blob,
}

fn body_kind(headers: &HeaderMap) -> Result<Body, (StatusCode, String)> {
    let Some(raw) = headers.get(header::CONTENT_TYPE) else {
        return Ok(Body::Json);
    };
    let raw = raw
        .to_str()
        .map_err(|_| (StatusCode::BAD_REQUEST, "invalid content type".to_string()))?;
    let mime = raw.split(';').next().unwrap_or("").trim();
    match mime {
        "application/json" => Ok(Body::Json),
        "application/octet-stream" => Ok(Body::Blob),
        other => Err((
            StatusCode::BAD_REQUEST,
            format!("unsupported content type '{}'", other),
        )),
    }
}

fn submit(
    state: &ApiState,
    expected: Option<CommandKind>,
    headers: &HeaderMap,
    body: &[u8],
) -> Result<String, (StatusCode, String)> {
    match body_kind(headers)? {
        Body::Blob => {
            let value = codec::decode_blob(body)
                .map_err(|e| (StatusCode::BAD_REQUEST, e.to_string()))?;
            let id = state.engine.store(value).map_err(engine_error)?;
            Ok(id.to_string())
        }
        Body::Json => {
            let command = codec::decode_command(body).map_err(|e| {
                tracing::debug!(error = %e, "rejected command");
                (StatusCode::BAD_REQUEST, e.to_string())
            })?;
            if let Some(expected) = expected {
                if command.kind() != expected {
                    return Err((
                        StatusCode::BAD_REQUEST,
                        format!("POST /{} received a {} command", expected, command.kind()),
                    ));
                }
            }
            let kind = command.kind();
            let id = state.engine.submit(command).map_err(engine_error)?;
            tracing::info!(id = id.short(), %kind, "command submitted");
            Ok(id.to_string())
        }
    }
}

/// POST /: dispatch on the body's top-level key.
pub async fn handle_submit(
    State(state): State<ApiState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<String, (StatusCode, String)> {
    submit(&state, None, &headers, &body)
}

/// POST /{kind}: the body must carry a command of that kind.
pub async fn handle_submit_kind(
    State(state): State<ApiState>,
    Path(kind): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<String, (StatusCode, String)> {
    let kind = CommandKind::parse(&kind)
        .ok_or_else(|| (StatusCode::NOT_FOUND, format!("no such endpoint /{}", kind)))?;
    submit(&state, Some(kind), &headers, &body)
}
