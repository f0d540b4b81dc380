//! Cluster HTTP Routes
//!
//! Read-only views of the DCS state: topology, timeline history, dynamic
//! configuration, failsafe membership and Prometheus metrics.

use std::sync::Arc;

use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde_json::{json, Map, Value};

use crate::dcs::{Cluster, SyncRole};
use crate::observability::render_metrics;

use super::state::ApiState;

const METRICS_CONTENT_TYPE: &str = "text/plain; version=0.0.4; charset=utf-8";

/// Build the cluster router
pub fn cluster_routes(state: Arc<ApiState>) -> Router {
    Router::new()
        .route("/cluster", get(cluster_topology))
        .route("/history", get(timeline_history))
        .route("/config", get(dynamic_config))
        .route("/failsafe", get(failsafe_members))
        .route("/metrics", get(metrics))
        .with_state(state)
}

// ==================
// Topology
// ==================

fn member_role(cluster: &Cluster, name: &str) -> &'static str {
    if cluster.leader_name() == Some(name) {
        return if cluster.is_standby_cluster() {
            "standby_leader"
        } else {
            "leader"
        };
    }
    match cluster.sync_role_of(name) {
        SyncRole::Synchronous => "sync_standby",
        SyncRole::Quorum => "quorum_standby",
        SyncRole::None | SyncRole::Asynchronous => "replica",
    }
}

/// Members, roles and lag as seen in one snapshot.
pub fn cluster_document(cluster: &Cluster) -> Value {
    let leader_lsn = cluster
        .leader_member()
        .and_then(|leader| leader.lsn())
        .unwrap_or(cluster.status.last_lsn)
        .max(cluster.status.last_lsn);

    let mut members: Vec<_> = cluster.members.iter().collect();
    members.sort_by(|a, b| a.name.cmp(&b.name));

    let members: Vec<Value> = members
        .into_iter()
        .map(|member| {
            let mut entry = Map::new();
            let role = member_role(cluster, &member.name);
            entry.insert("name".into(), json!(member.name));
            entry.insert("role".into(), json!(role));
            entry.insert("state".into(), json!(member.state().unwrap_or("unknown")));
            if let Some(api_url) = member.api_url() {
                entry.insert("api_url".into(), json!(api_url));
            }
            if let Some((host, port)) = member.conn_host_port() {
                entry.insert("host".into(), json!(host));
                entry.insert("port".into(), json!(port.unwrap_or(5432)));
            }
            if let Some(timeline) = member.timeline() {
                entry.insert("timeline".into(), json!(timeline));
            }
            if role != "leader" && role != "standby_leader" {
                let lag = match member.lsn() {
                    Some(lsn) => json!(leader_lsn.saturating_sub(lsn)),
                    None => json!("unknown"),
                };
                entry.insert("lag".into(), lag);
            }
            let tags = member.tags();
            if !tags.is_empty() {
                entry.insert("tags".into(), json!(tags));
            }
            for key in ["pending_restart", "scheduled_restart"] {
                if let Some(value) = member.data.get(key) {
                    entry.insert(key.into(), value.clone());
                }
            }
            Value::Object(entry)
        })
        .collect();

    let mut doc = Map::new();
    doc.insert("members".into(), Value::Array(members));
    if cluster.is_paused() {
        doc.insert("pause".into(), json!(true));
    }
    if let Some(intent) = cluster.failover.as_ref() {
        if let Some(at) = intent.scheduled_at {
            let mut scheduled = Map::new();
            scheduled.insert("at".into(), json!(at.to_rfc3339()));
            if let Some(leader) = &intent.leader {
                scheduled.insert("from".into(), json!(leader));
            }
            if let Some(candidate) = &intent.candidate {
                scheduled.insert("to".into(), json!(candidate));
            }
            doc.insert("scheduled_switchover".into(), Value::Object(scheduled));
        }
    }
    Value::Object(doc)
}

/// GET /cluster
async fn cluster_topology(State(state): State<Arc<ApiState>>) -> Response {
    match state.fresh_cluster().await {
        Some(cluster) => Json(cluster_document(&cluster)).into_response(),
        None => (StatusCode::SERVICE_UNAVAILABLE, "DCS is not accessible").into_response(),
    }
}

/// GET /history
async fn timeline_history(State(state): State<Arc<ApiState>>) -> Response {
    match state.fresh_cluster().await {
        Some(cluster) => Json(json!(cluster.history)).into_response(),
        None => (StatusCode::SERVICE_UNAVAILABLE, "DCS is not accessible").into_response(),
    }
}

/// GET /config
async fn dynamic_config(State(state): State<Arc<ApiState>>) -> Response {
    let config = state
        .fresh_cluster()
        .await
        .and_then(|cluster| cluster.config.clone());
    match config {
        Some(config) => Json(Value::Object(config.data)).into_response(),
        None => (StatusCode::BAD_GATEWAY, Json(json!({}))).into_response(),
    }
}

/// GET /failsafe
async fn failsafe_members(State(state): State<Arc<ApiState>>) -> Response {
    let failsafe = state
        .snapshot
        .current()
        .and_then(|cluster| cluster.failsafe.clone());
    match failsafe {
        Some(members) => Json(json!(members)).into_response(),
        None => (StatusCode::BAD_GATEWAY, Json(json!({}))).into_response(),
    }
}

/// GET /metrics
async fn metrics(State(state): State<Arc<ApiState>>) -> Response {
    let settings = state.snapshot.settings();
    let mut doc = match state.local_status().await {
        Ok(status) => {
            let cluster = state.snapshot.current();
            state.document(&status, cluster.as_deref(), &settings)
        }
        Err(failed) => failed.document(),
    };
    if doc.get("patroni").is_none() {
        doc["patroni"] = json!({
            "version": state.identity.version,
            "scope": state.identity.scope,
            "name": state.identity.name,
        });
    }
    let body = render_metrics(&doc, &state.metrics.snapshot());
    ([(header::CONTENT_TYPE, METRICS_CONTENT_TYPE)], body).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dcs::{ClusterConfig, ClusterStatus, FailoverIntent, Member, SyncState};
    use chrono::DateTime;

    fn cluster() -> Cluster {
        Cluster {
            config: Some(ClusterConfig::new(1, json!({"synchronous_mode": true}))),
            leader: Some("node1".into()),
            status: ClusterStatus { last_lsn: 500 },
            members: vec![
                Member::new(
                    "node2",
                    json!({
                        "state": "running",
                        "xlog_location": 400,
                        "conn_url": "postgres://10.0.0.2:5433/postgres",
                        "api_url": "http://10.0.0.2:8008/patroni",
                        "timeline": 3,
                        "tags": {"zone": "b"}
                    }),
                ),
                Member::new("node1", json!({"state": "running", "xlog_location": 500})),
                Member::new("node3", json!({"state": "streaming"})),
            ],
            sync: SyncState {
                leader: Some("node1".into()),
                sync_standby: vec!["node2".into()],
                ..Default::default()
            },
            ..Default::default()
        }
    }

    #[test]
    fn test_roles_and_lag() {
        let doc = cluster_document(&cluster());
        let members = doc["members"].as_array().unwrap();
        assert_eq!(members[0]["name"], "node1");
        assert_eq!(members[0]["role"], "leader");
        assert!(members[0].get("lag").is_none());

        assert_eq!(members[1]["role"], "sync_standby");
        assert_eq!(members[1]["lag"], 100);
        assert_eq!(members[1]["host"], "10.0.0.2");
        assert_eq!(members[1]["port"], 5433);
        assert_eq!(members[1]["timeline"], 3);
        assert_eq!(members[1]["tags"]["zone"], "b");

        assert_eq!(members[2]["role"], "replica");
        assert_eq!(members[2]["lag"], "unknown");
        assert!(doc.get("pause").is_none());
    }

    #[test]
    fn test_scheduled_switchover_and_pause() {
        let mut cluster = cluster();
        cluster.config = Some(ClusterConfig::new(2, json!({"pause": true})));
        cluster.failover = Some(FailoverIntent::new(
            Some("node1".into()),
            Some("node2".into()),
            Some(DateTime::parse_from_rfc3339("2030-01-01T10:00:00+02:00").unwrap()),
        ));
        let doc = cluster_document(&cluster);
        assert_eq!(doc["pause"], true);
        assert_eq!(doc["scheduled_switchover"]["from"], "node1");
        assert_eq!(doc["scheduled_switchover"]["to"], "node2");
        assert_eq!(
            doc["scheduled_switchover"]["at"],
            "2030-01-01T10:00:00+02:00"
        );
    }

    #[test]
    fn test_standby_leader_role() {
        let mut cluster = cluster();
        cluster.config = Some(ClusterConfig::new(
            3,
            json!({"standby_cluster": {"host": "remote"}}),
        ));
        let doc = cluster_document(&cluster);
        assert_eq!(doc["members"][0]["role"], "standby_leader");
    }
}
