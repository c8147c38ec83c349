//! GET /contract: descriptors of every class the server can operate on.

use axum::extract::State;
use axum::Json;

use remora_core::Contract;

use super::ApiState;

pub async fn handle_contract(State(state): State<ApiState>) -> Json<Contract> {
    Json(state.engine.contract())
}
