//! # Dynamic Configuration Routes
//!
//! `PATCH /config` merges, `PUT /config` replaces. Both answer with the
//! resulting document.

use std::sync::Arc;

use axum::{body::Bytes, extract::State, routing::patch, Json, Router};
use serde_json::Value;

use crate::dynconfig::ConfigService;

use super::errors::{parse_json_object_body, ApiError};
use super::state::ApiState;

/// Build the configuration router
pub fn config_routes(state: Arc<ApiState>) -> Router {
    Router::new()
        .route("/config", patch(patch_config).put(replace_config))
        .with_state(state)
}

fn service(state: &ApiState) -> ConfigService {
    ConfigService::new(Arc::clone(&state.dcs), Arc::clone(&state.ha))
}

/// PATCH /config
async fn patch_config(
    State(state): State<Arc<ApiState>>,
    body: Bytes,
) -> Result<Json<Value>, ApiError> {
    let body = parse_json_object_body(&body)?;
    let service = service(&state);
    let merged = tokio::task::spawn_blocking(move || service.patch(&body)).await??;
    state.metrics.increment_config_writes();
    Ok(Json(merged))
}

/// PUT /config
async fn replace_config(
    State(state): State<Arc<ApiState>>,
    body: Bytes,
) -> Result<Json<Value>, ApiError> {
    let body = parse_json_object_body(&body)?;
    let service = service(&state);
    let replaced = tokio::task::spawn_blocking(move || service.replace(&body)).await??;
    state.metrics.increment_config_writes();
    Ok(Json(replaced))
}
