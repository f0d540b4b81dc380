//! # Switchover Routes
//!
//! `POST /switchover`, `POST /failover` and `DELETE /switchover`. The
//! orchestrator blocks while it polls for the result, so it runs on the
//! blocking pool.

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::State,
    response::{IntoResponse, Response},
    routing::post,
    Router,
};
use chrono::Utc;
use tracing::info;

use crate::switchover::{SwitchoverAction, SwitchoverOutcome, SwitchoverRequest};

use super::errors::parse_json_body;
use super::state::ApiState;

/// Build the switchover router
pub fn switchover_routes(state: Arc<ApiState>) -> Router {
    Router::new()
        .route("/switchover", post(switchover).delete(cancel_switchover))
        .route("/failover", post(failover))
        .with_state(state)
}

async fn switchover(State(state): State<Arc<ApiState>>, body: Bytes) -> Response {
    run(state, SwitchoverAction::Switchover, body).await
}

async fn failover(State(state): State<Arc<ApiState>>, body: Bytes) -> Response {
    run(state, SwitchoverAction::Failover, body).await
}

async fn run(state: Arc<ApiState>, action: SwitchoverAction, body: Bytes) -> Response {
    let body = match parse_json_body(&body) {
        Ok(body) => body,
        Err(err) => return err.into_response(),
    };
    let request = match SwitchoverRequest::from_json(action, &body) {
        Ok(request) => request,
        Err(err) => {
            state.metrics.record_switchover(err.status_code());
            return SwitchoverOutcome::from(err).into_response();
        }
    };

    info!(
        action = request.action.as_str(),
        leader = ?request.leader,
        candidate = ?request.candidate,
        scheduled_at = ?request.scheduled_at,
        "switchover requested"
    );

    let orchestrator = state.orchestrator();
    let outcome = match tokio::task::spawn_blocking(move || orchestrator.execute(&request, Utc::now())).await {
        Ok(outcome) => outcome,
        Err(err) => SwitchoverOutcome::new(503, format!("Switchover status unknown: {}", err)),
    };
    state.metrics.record_switchover(outcome.status);
    info!(status = outcome.status, message = %outcome.message, "switchover finished");
    outcome.into_response()
}

/// DELETE /switchover
async fn cancel_switchover(State(state): State<Arc<ApiState>>) -> Response {
    let orchestrator = state.orchestrator();
    match tokio::task::spawn_blocking(move || orchestrator.cancel_scheduled()).await {
        Ok(outcome) => outcome.into_response(),
        Err(err) => SwitchoverOutcome::new(503, err.to_string()).into_response(),
    }
}
