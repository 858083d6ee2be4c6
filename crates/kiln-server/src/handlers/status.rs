//! Status query handler

use crate::server::ServerState;
use axum::{extract::State, Json};
use kiln_core::engine::EngineInfo;
use serde::Serialize;

/// Body of `GET /`
#[derive(Debug, Serialize)]
pub struct StatusResponse {
    #[serde(flatten)]
    pub engine: EngineInfo,
    pub version: &'static str,
}

/// Report the loaded model and its precision. Never touches the executor.
pub async fn status(State(state): State<ServerState>) -> Json<StatusResponse> {
    Json(StatusResponse {
        engine: state.engine.info(),
        version: crate::VERSION,
    })
}
