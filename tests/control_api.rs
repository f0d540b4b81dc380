//! Control API Tests
//!
//! Operator endpoints end to end through the router:
//! - dynamic configuration reads and writes
//! - immediate and scheduled restarts
//! - reinitialize, reload, failsafe and MPP hand-off to the HA loop
//! - cluster introspection and metrics
//! - access control on mutating requests

mod common;

use std::collections::BTreeMap;
use std::net::SocketAddr;

use axum::http::StatusCode;
use serde_json::json;

use pgha::config::{AuthConfig, RestApiConfig};
use pgha::dcs::ClusterConfig;
use pgha::ha::HaAction;
use pgha::http_server::AccessPolicy;

use common::{cluster, json_body, primary_row, replica_row, send, send_from, Node};

fn primary() -> Node {
    Node::new("node1", cluster(json!({"ttl": 30, "loop_wait": 10})), primary_row())
}

fn replica() -> Node {
    Node::new("node2", cluster(json!({"ttl": 30, "loop_wait": 10})), replica_row(990))
}

fn client(addr: &str) -> SocketAddr {
    format!("{}:51000", addr).parse().unwrap()
}

// =============================================================================
// Dynamic Configuration
// =============================================================================

/// GET /config returns the stored document.
#[tokio::test]
async fn test_get_config() {
    let node = primary();
    let (status, body) = node.get("/config").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json_body(&body), json!({"ttl": 30, "loop_wait": 10}));

    let mut empty = cluster(json!({}));
    empty.config = None;
    let node = Node::new("node1", empty, primary_row());
    let (status, body) = node.get("/config").await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(json_body(&body), json!({}));
}

/// PATCH merges, `null` deletes.
#[tokio::test]
async fn test_patch_config() {
    let node = primary();
    let (status, body) = send(
        node.router(),
        "PATCH",
        "/config",
        Some(r#"{"ttl": 20, "loop_wait": null, "postgresql": {"parameters": {"max_connections": 200}}}"#),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let expected = json!({"ttl": 20, "postgresql": {"parameters": {"max_connections": 200}}});
    assert_eq!(json_body(&body), expected);
    assert_eq!(node.dcs.cluster().config.unwrap().data, expected);
    assert_eq!(node.state.metrics.snapshot().config_writes, 1);
}

/// A concurrent writer wins the compare-and-set.
#[tokio::test]
async fn test_patch_config_conflict() {
    let node = primary();
    node.dcs.reject_writes(true);
    let (status, _) = send(node.router(), "PATCH", "/config", Some(r#"{"ttl": 20}"#)).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
}

/// The document moved on between the read and the write.
#[tokio::test]
async fn test_patch_config_stale_version() {
    let node = primary();
    node.dcs.push_read(cluster(json!({"ttl": 30, "loop_wait": 10})));
    let mut newer = cluster(json!({}));
    newer.config = Some(ClusterConfig::new(9, json!({"ttl": 45})));
    node.dcs.replace(newer);

    let (status, body) = send(node.router(), "PATCH", "/config", Some(r#"{"ttl": 20}"#)).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body, "configuration was modified concurrently");
    let stored = node.dcs.cluster().config.unwrap();
    assert_eq!(stored.version, 9);
    assert_eq!(stored.data, json!({"ttl": 45}));
    assert_eq!(node.state.metrics.snapshot().config_writes, 0);
}

/// PATCH needs an existing document.
#[tokio::test]
async fn test_patch_without_config() {
    let mut empty = cluster(json!({}));
    empty.config = None;
    let node = Node::new("node1", empty, primary_row());
    let (status, _) = send(node.router(), "PATCH", "/config", Some(r#"{"ttl": 20}"#)).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
}

/// PUT replaces the whole document.
#[tokio::test]
async fn test_put_config() {
    let node = primary();
    let (status, body) = send(node.router(), "PUT", "/config", Some(r#"{"pause": true}"#)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json_body(&body), json!({"pause": true}));
    assert_eq!(node.dcs.cluster().config.unwrap().data, json!({"pause": true}));

    node.dcs.fail_writes(true);
    let (status, _) = send(node.router(), "PUT", "/config", Some(r#"{"ttl": 40}"#)).await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
}

/// Bodies must be JSON objects.
#[tokio::test]
async fn test_config_rejects_bad_bodies() {
    let node = primary();
    let (status, _) = send(node.router(), "PATCH", "/config", Some("{broken")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let (status, body) = send(node.router(), "PUT", "/config", Some("[1]")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body, "Configuration must be a JSON object");
}

/// An empty body is not an empty patch.
#[tokio::test]
async fn test_config_rejects_empty_body() {
    let node = primary();
    for method in ["PATCH", "PUT"] {
        let (status, body) = send(node.router(), method, "/config", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body, "Configuration must be a JSON object");
    }
    assert_eq!(
        node.dcs.cluster().config.unwrap().data,
        json!({"ttl": 30, "loop_wait": 10})
    );
}

// =============================================================================
// Restart
// =============================================================================

/// An immediate restart is queued for the HA loop.
#[tokio::test]
async fn test_immediate_restart() {
    let node = primary();
    let (status, body) = node.post("/restart", "").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "restart requested");
    assert!(matches!(node.ha.take_actions().as_slice(), [HaAction::Restart(_)]));
}

/// Filters that do not match the node refuse the restart.
#[tokio::test]
async fn test_restart_filters() {
    let node = primary();
    let (status, body) = node.post("/restart", r#"{"role": "replica"}"#).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body, "restart conditions are not satisfied");
    assert!(node.ha.take_actions().is_empty());

    let (status, body) = node.post("/restart", r#"{"role": "leader"}"#).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(
        body,
        "PostgreSQL role should be either primary, standby_leader, or replica"
    );

    let (status, body) = node.post("/restart", r#"{"when": "now"}"#).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body, "Unknown filter for the scheduled restart: when");

    let (status, _) = node.post("/restart", r#"{"timeout": -1}"#).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = node.post("/restart", r#"{"timeout": 1e300}"#).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body, "Timeout should be a positive number of seconds");

    let (status, body) = node
        .post("/restart", r#"{"role": "primary", "postgres_version": "9.5.3.1"}"#)
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body.starts_with("Invalid PostgreSQL"));
    assert!(node.ha.take_actions().is_empty());
}

/// One scheduled restart at a time; it shows up in the status document.
#[tokio::test]
async fn test_scheduled_restart() {
    let node = replica();
    let body = r#"{"schedule": "2099-01-01T00:00:00+00:00", "role": "replica"}"#;
    let (status, text) = node.post("/restart", body).await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(text, "Restart scheduled");

    let (status, text) = node.post("/restart", body).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(text, "Another restart is already scheduled");

    let (_, doc) = node.get("/patroni").await;
    let doc = json_body(&doc);
    assert!(doc["scheduled_restart"]["schedule"]
        .as_str()
        .unwrap()
        .starts_with("2099-01-01T00:00:00"));
    assert_eq!(doc["scheduled_restart"]["role"], "replica");

    let (status, text) = send(node.router(), "DELETE", "/restart", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(text, "scheduled restart deleted");
    let (status, text) = send(node.router(), "DELETE", "/restart", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(text, "no restarts are scheduled");
}

/// Paused clusters do not take restart schedules.
#[tokio::test]
async fn test_restart_schedule_when_paused() {
    let node = Node::new("node2", cluster(json!({"pause": true})), replica_row(990));
    let (status, body) = node
        .post("/restart", r#"{"schedule": "2099-01-01T00:00:00+00:00"}"#)
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body, "Can't schedule restart in the paused state");
}

// =============================================================================
// Node Control
// =============================================================================

/// Replicas can be rebuilt, the leader cannot.
#[tokio::test]
async fn test_reinitialize() {
    let node = replica();
    let (status, body) = node.post("/reinitialize", r#"{"force": true}"#).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "reinitialize started");
    assert_eq!(
        node.ha.take_actions(),
        vec![HaAction::Reinitialize { force: true }]
    );

    let (status, body) = primary().post("/reinitialize", "").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body, "I am the leader, can not reinitialize");

    let (status, _) = node.post("/reinitialize", "[]").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

/// Reload is queued, sigterm stops the node.
#[tokio::test]
async fn test_reload_and_sigterm() {
    let node = replica();
    let (status, body) = node.post("/reload", "").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "reload scheduled");
    assert_eq!(node.ha.next_actions().await, vec![HaAction::Reload]);

    assert!(!node.shutdown.is_triggered());
    let (status, body) = node.post("/sigterm", "").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "shutdown scheduled");
    assert!(node.shutdown.is_triggered());
}

/// Failsafe heartbeats are only taken in failsafe mode and not by the leader.
#[tokio::test]
async fn test_failsafe_heartbeat() {
    let (status, body) = replica().post("/failsafe", r#"{"name": "node1"}"#).await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(body, "Failsafe mode is not enabled");

    let config = json!({"failsafe_mode": true});
    let node = Node::new("node2", cluster(config.clone()), replica_row(990));
    let (status, body) = node.post("/failsafe", r#"{"name": "node1"}"#).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "Accepted");

    let node = Node::new("node1", cluster(config), primary_row());
    let (status, body) = node.post("/failsafe", r#"{"name": "node2"}"#).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body, "Running as a leader");
}

/// MPP events reach the HA loop only on the coordinator leader.
#[tokio::test]
async fn test_mpp_events() {
    let event = r#"{"type": "before_demote", "group": 1}"#;
    let node = primary();
    let (status, body) = node.post("/citus", event).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "OK");
    assert!(node.ha.take_actions().is_empty());

    node.ha.set_mpp_coordinator(true);
    let (status, _) = node.post("/mpp", event).await;
    assert_eq!(status, StatusCode::OK);
    assert!(matches!(node.ha.take_actions().as_slice(), [HaAction::MppEvent(_)]));

    let (status, _) = node.post("/mpp", "{oops").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

// =============================================================================
// Introspection
// =============================================================================

/// Topology sorted by name with roles and lag.
#[tokio::test]
async fn test_cluster_topology() {
    let node = replica();
    let (status, body) = node.get("/cluster").await;
    assert_eq!(status, StatusCode::OK);
    let doc = json_body(&body);
    let members = doc["members"].as_array().unwrap();
    assert_eq!(members.len(), 3);
    assert_eq!(members[0]["name"], "node1");
    assert_eq!(members[0]["role"], "leader");
    assert!(members[0].get("lag").is_none());
    assert_eq!(members[1]["role"], "replica");
    assert_eq!(members[1]["lag"], 10);
    assert_eq!(members[1]["host"], "10.0.0.2");
    assert_eq!(members[1]["port"], 5432);
    assert_eq!(members[2]["lag"], 100);
}

/// The last snapshot stands in for an unreachable store.
#[tokio::test]
async fn test_cluster_falls_back_to_snapshot() {
    let node = replica();
    node.dcs.fail_reads_after_script(true);
    let (status, _) = node.get("/cluster").await;
    assert_eq!(status, StatusCode::OK);

    node.snapshot.invalidate();
    let (status, body) = node.get("/cluster").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body, "DCS is not accessible");
    let (status, _) = node.get("/history").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
}

/// Failsafe membership comes from the snapshot.
#[tokio::test]
async fn test_failsafe_members() {
    let (status, body) = replica().get("/failsafe").await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(json_body(&body), json!({}));

    let mut members = cluster(json!({"failsafe_mode": true}));
    let mut failsafe = BTreeMap::new();
    failsafe.insert("node1".to_string(), "http://10.0.0.1:8008/patroni".to_string());
    members.failsafe = Some(failsafe);
    let node = Node::new("node2", members, replica_row(990));
    let (status, body) = node.get("/failsafe").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json_body(&body), json!({"node1": "http://10.0.0.1:8008/patroni"}));
}

/// Prometheus exposition of the local status.
#[tokio::test]
async fn test_metrics_exposition() {
    let node = primary();
    let (status, body) = node.get("/metrics").await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.contains("pgha_postgres_running{scope=\"demo\",name=\"node1\"} 1"));
    assert!(body.contains("pgha_primary{scope=\"demo\",name=\"node1\"} 1"));
    assert!(body.contains("pgha_xlog_location{scope=\"demo\",name=\"node1\"} 1000"));
}

// =============================================================================
// Access Control
// =============================================================================

fn restricted(node: &Node, config: RestApiConfig) {
    node.state.policy.store(AccessPolicy::from_config(&config));
}

/// Only allow-listed clients may change anything; reads stay open.
#[tokio::test]
async fn test_allowlist() {
    let node = replica();
    restricted(
        &node,
        RestApiConfig {
            allowlist: vec!["192.168.1.0/24".into()],
            ..Default::default()
        },
    );

    let (status, body) = send_from(node.router(), "POST", "/reload", None, client("127.0.0.1")).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body, "Access is denied");

    let (status, _) = send_from(node.router(), "POST", "/reload", None, client("192.168.1.20")).await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = send_from(node.router(), "GET", "/patroni", None, client("127.0.0.1")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(node.state.metrics.snapshot().access_denied, 1);
}

/// Cluster members are let in by their API address.
#[tokio::test]
async fn test_allowlist_includes_members() {
    let node = replica();
    restricted(
        &node,
        RestApiConfig {
            allowlist_include_members: true,
            ..Default::default()
        },
    );

    let (status, _) = send_from(node.router(), "POST", "/reload", None, client("10.0.0.3")).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = send_from(node.router(), "POST", "/reload", None, client("10.0.0.9")).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

/// Basic authentication on mutating requests.
#[tokio::test]
async fn test_basic_auth() {
    let node = replica();
    restricted(
        &node,
        RestApiConfig {
            authentication: Some(AuthConfig {
                username: "admin".into(),
                password: "secret".into(),
            }),
            ..Default::default()
        },
    );

    let (status, body) = node.post("/reload", "").await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body, "no auth header received");

    let request = axum::http::Request::builder()
        .method("POST")
        .uri("/reload")
        // admin:wrong
        .header("Authorization", "Basic YWRtaW46d3Jvbmc=")
        .body(axum::body::Body::empty())
        .unwrap();
    let response = tower::ServiceExt::oneshot(node.router(), request).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let request = axum::http::Request::builder()
        .method("POST")
        .uri("/reload")
        // admin:secret
        .header("Authorization", "Basic YWRtaW46c2VjcmV0")
        .body(axum::body::Body::empty())
        .unwrap();
    let response = tower::ServiceExt::oneshot(node.router(), request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}
