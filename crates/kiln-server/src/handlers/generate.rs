//! Generate handler

use crate::{
    error::{ServerError, ServerResult},
    server::ServerState,
};
use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    Json,
};
use kiln_core::{GenerationRequest, GenerationResult};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Run one request to completion.
///
/// The decode loop is blocking, so it runs on the blocking pool. When the
/// deadline passes the request's token is cancelled; the loop notices before
/// its next executor call and the caller gets a 504 without waiting for it.
pub async fn generate(
    State(state): State<ServerState>,
    payload: Result<Json<GenerationRequest>, JsonRejection>,
) -> ServerResult<Json<GenerationResult>> {
    let Json(request) = payload.map_err(|e| {
        if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
            ServerError::PayloadTooLarge(e.body_text())
        } else {
            ServerError::InvalidRequest(e.body_text())
        }
    })?;
    debug!(prompt_chars = request.prompt.len(), "Received generate request");

    let cancel = CancellationToken::new();
    let engine = Arc::clone(&state.engine);
    let task_cancel = cancel.clone();
    let task = tokio::task::spawn_blocking(move || engine.generate_with_cancel(&request, &task_cancel));

    let timeout = state.config.limits.request_timeout();
    match tokio::time::timeout(timeout, task).await {
        Ok(joined) => {
            let result = joined
                .map_err(|e| ServerError::Internal(format!("Generation task failed: {}", e)))??;
            Ok(Json(result))
        }
        Err(_) => {
            cancel.cancel();
            warn!(timeout_secs = timeout.as_secs_f64(), "Generate request hit its deadline");
            Err(ServerError::Timeout(timeout.as_secs_f64()))
        }
    }
}
