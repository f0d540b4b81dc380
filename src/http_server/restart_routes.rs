//! # Restart Routes
//!
//! Immediate and scheduled restarts of the local PostgreSQL.

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::State,
    response::Response,
    routing::post,
    Router,
};
use chrono::Utc;
use tracing::{error, info};

use crate::restart::{RestartError, RestartRequest};

use super::errors::{parse_json_body, text_response, ApiError};
use super::state::ApiState;

/// Build the restart router
pub fn restart_routes(state: Arc<ApiState>) -> Router {
    Router::new()
        .route("/restart", post(restart).delete(delete_restart))
        .with_state(state)
}

/// POST /restart
async fn restart(State(state): State<Arc<ApiState>>, body: Bytes) -> Result<Response, ApiError> {
    let body = parse_json_body(&body)?;
    let body = body
        .as_object()
        .ok_or_else(|| RestartError::InvalidBody("Request body must be a JSON object".into()))?;
    let paused = state.snapshot.settings().paused;
    let request = RestartRequest::from_json(body, paused, Utc::now())?;

    if request.is_scheduled() {
        return Ok(if state.ha.schedule_future_restart(&request) {
            info!(schedule = ?request.schedule, "restart scheduled");
            text_response(202, "Restart scheduled")
        } else {
            text_response(409, "Another restart is already scheduled")
        });
    }

    let ha = Arc::clone(&state.ha);
    let result = tokio::task::spawn_blocking(move || ha.restart(&request)).await?;
    Ok(match result {
        Ok((true, message)) => text_response(200, message),
        Ok((false, message)) => text_response(503, message),
        Err(err) => {
            error!(error = %err, "restart failed");
            text_response(500, "restart failed")
        }
    })
}

/// DELETE /restart
async fn delete_restart(State(state): State<Arc<ApiState>>) -> Response {
    if state.ha.delete_future_restart() {
        text_response(200, "scheduled restart deleted")
    } else {
        text_response(404, "no restarts are scheduled")
    }
}
