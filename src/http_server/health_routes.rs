//! # Health and Role Routes
//!
//! Load balancer checks, `/liveness`, `/readiness` and the node status
//! document at `/patroni` (alias `/node`).

use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use chrono::Utc;
use serde_json::Value;

use crate::dcs::SyncRole;
use crate::health::{liveness, HealthRoute, NodeView, RouteQuery, HEALTH_PATHS};
use crate::postgres::PostgresqlStatus;

use super::state::ApiState;

fn status_code(code: u16) -> StatusCode {
    StatusCode::from_u16(code).unwrap_or(StatusCode::SERVICE_UNAVAILABLE)
}

fn json_response(code: u16, body: Value) -> Response {
    (status_code(code), Json(body)).into_response()
}

/// Build the health router
pub fn health_routes(state: Arc<ApiState>) -> Router {
    let mut router = Router::new();
    for (path, route) in HEALTH_PATHS {
        let route = *route;
        router = router.route(
            path,
            get(
                move |State(state): State<Arc<ApiState>>,
                      Query(params): Query<HashMap<String, String>>| async move {
                    health_check(state, route, params).await
                },
            ),
        );
    }
    router
        .route("/patroni", get(node_status))
        .route("/node", get(node_status))
        .with_state(state)
}

async fn health_check(
    state: Arc<ApiState>,
    route: HealthRoute,
    params: HashMap<String, String>,
) -> Response {
    let query = RouteQuery::from_params(&params);
    let settings = state.snapshot.settings();

    if route == HealthRoute::Liveness {
        let status = PostgresqlStatus::new(state.ha.postgres_state(), state.ha.postgres_role());
        let code = liveness(&status, &settings, state.ha.next_run(), Utc::now());
        state.metrics.record_health_check(code);
        return status_code(code).into_response();
    }

    let status = match state.local_status().await {
        Ok(status) => status,
        Err(_) if route.is_probe() => {
            state.metrics.record_health_check(503);
            return StatusCode::SERVICE_UNAVAILABLE.into_response();
        }
        Err(failed) => {
            state.metrics.record_health_check(500);
            return json_response(500, failed.document());
        }
    };

    let cluster = state.snapshot.current();
    let view = NodeView {
        status: &status,
        is_leader: state.ha.is_leader(),
        cluster_available: cluster.is_some(),
        sync_role: cluster
            .as_ref()
            .map(|cluster| cluster.sync_role_of(&state.identity.name))
            .unwrap_or(SyncRole::None),
        settings: &settings,
        tags: &state.tags,
        leader_optime: cluster.as_ref().map(|cluster| cluster.status.last_lsn).unwrap_or(0),
    };

    if route == HealthRoute::Readiness {
        let code = view.readiness(&query, state.ha.failsafe_is_active());
        state.metrics.record_health_check(code);
        return status_code(code).into_response();
    }

    let code = view.classify(route, &query);
    state.metrics.record_health_check(code);
    json_response(code, state.document(&status, cluster.as_deref(), &settings))
}

/// GET /patroni
async fn node_status(State(state): State<Arc<ApiState>>) -> Response {
    match state.local_status().await {
        Ok(status) => {
            let cluster = state.snapshot.current();
            let settings = state.snapshot.settings();
            json_response(200, state.document(&status, cluster.as_deref(), &settings))
        }
        Err(failed) => json_response(500, failed.document()),
    }
}
