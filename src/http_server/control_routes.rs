//! # Node Control Routes
//!
//! Requests handed straight to the HA loop: reinitialize, reload,
//! shutdown, failsafe heartbeats and MPP events.

use std::sync::Arc;

use axum::{body::Bytes, extract::State, response::Response, routing::post, Router};
use serde_json::Value;
use tracing::{debug, info, warn};

use super::errors::{parse_json_body, text_response, ApiError};
use super::state::ApiState;

/// Build the node control router
pub fn control_routes(state: Arc<ApiState>) -> Router {
    Router::new()
        .route("/reinitialize", post(reinitialize))
        .route("/reload", post(reload))
        .route("/sigterm", post(sigterm))
        .route("/failsafe", post(failsafe_heartbeat))
        .route("/mpp", post(mpp_event))
        .route("/citus", post(mpp_event))
        .with_state(state)
}

/// POST /reinitialize
async fn reinitialize(State(state): State<Arc<ApiState>>, body: Bytes) -> Result<Response, ApiError> {
    let body = parse_json_body(&body)?;
    let Some(body) = body.as_object() else {
        return Err(ApiError::status(400, "Request body must be a JSON object"));
    };
    let force = body.get("force").and_then(Value::as_bool).unwrap_or(false);

    Ok(match state.ha.reinitialize(force) {
        None => {
            info!(force, "reinitialize started");
            text_response(200, "reinitialize started")
        }
        Some(reason) => {
            warn!(reason = %reason, "reinitialize refused");
            text_response(503, reason)
        }
    })
}

/// POST /reload
async fn reload(State(state): State<Arc<ApiState>>) -> Response {
    state.ha.reload();
    text_response(200, "reload scheduled")
}

/// POST /sigterm
async fn sigterm(State(state): State<Arc<ApiState>>) -> Response {
    info!("shutdown requested through the REST API");
    state.ha.shutdown();
    text_response(200, "shutdown scheduled")
}

/// POST /failsafe
async fn failsafe_heartbeat(
    State(state): State<Arc<ApiState>>,
    body: Bytes,
) -> Result<Response, ApiError> {
    if !state.ha.is_failsafe_mode() {
        return Ok(text_response(502, "Failsafe mode is not enabled"));
    }
    let body = parse_json_body(&body)?;
    Ok(match state.ha.update_failsafe(&body) {
        None => text_response(200, "Accepted"),
        Some(reason) => text_response(500, reason),
    })
}

/// POST /mpp, POST /citus
async fn mpp_event(State(state): State<Arc<ApiState>>, body: Bytes) -> Result<Response, ApiError> {
    let event = parse_json_body(&body)?;
    if state.ha.is_mpp_coordinator() && state.ha.is_leader() {
        state.ha.handle_mpp_event(&event);
    } else {
        debug!("mpp event ignored on a node that is not the coordinator leader");
    }
    Ok(text_response(200, "OK"))
}
