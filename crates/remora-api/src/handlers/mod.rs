//! HTTP API handlers: commands in, results out.

pub mod commands;
pub mod contract;
pub mod results;

use axum::http::StatusCode;

use remora_core::ResultId;
use remora_services::{Engine, EngineError};

#[derive(Clone)]
pub struct ApiState {
    pub engine: Engine,
}

impl ApiState {
    pub fn new(engine: Engine) -> Self {
        Self { engine }
    }
}

// ── Shared helpers ────────────────────────────────────────────────────────────

/// Parse a result id from a URL path. Ids that cannot be valid were never
/// issued, so they are reported as not found.
fn parse_id(raw: &str) -> Result<ResultId, (StatusCode, String)> {
    ResultId::parse(raw).map_err(|_| (StatusCode::NOT_FOUND, format!("unknown result {}", raw)))
}

fn engine_error(e: EngineError) -> (StatusCode, String) {
    let status = match &e {
        EngineError::UnknownPromise(_) => StatusCode::BAD_REQUEST,
        EngineError::UnknownResult(_) => StatusCode::NOT_FOUND,
        EngineError::ShuttingDown => StatusCode::SERVICE_UNAVAILABLE,
        EngineError::Store(_) | EngineError::Checkpoint(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, e.to_string())
}
