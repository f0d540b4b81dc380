//! Shared fixtures for the REST API integration tests
//!
//! A node is the real router wired to an in-memory DCS, the standalone HA
//! handle and a static status row.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::body::{to_bytes, Body};
use axum::extract::ConnectInfo;
use axum::http::{Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use tower::ServiceExt;

use pgha::dcs::{Cluster, ClusterConfig, ClusterStatus, Member, MemoryDcs, SnapshotHandle, Tags};
use pgha::ha::StandaloneHa;
use pgha::health::NodeIdentity;
use pgha::http_server::{build_router, ApiState};
use pgha::postgres::{Retry, State, StaticConnector, StatusProbe, StatusRow};
use pgha::shutdown::ShutdownSignal;

pub struct Node {
    pub dcs: Arc<MemoryDcs>,
    pub snapshot: Arc<SnapshotHandle>,
    pub ha: Arc<StandaloneHa>,
    pub connector: StaticConnector,
    pub shutdown: Arc<ShutdownSignal>,
    pub state: Arc<ApiState>,
}

impl Node {
    /// `name` running PostgreSQL with `row`, the snapshot published from
    /// `cluster`.
    pub fn new(name: &str, cluster: Cluster, row: StatusRow) -> Self {
        Self::with_tags(name, cluster, row, Tags::new())
    }

    pub fn with_tags(name: &str, cluster: Cluster, row: StatusRow, tags: Tags) -> Self {
        let dcs = Arc::new(MemoryDcs::new(cluster.clone()));
        let snapshot = Arc::new(SnapshotHandle::new());
        snapshot.publish(cluster);
        let shutdown = Arc::new(ShutdownSignal::new());
        let ha = Arc::new(StandaloneHa::new(name, Arc::clone(&snapshot), Arc::clone(&shutdown)));
        ha.set_state(State::Running);
        ha.set_server_version(160002);

        let connector = StaticConnector::new(row);
        let probe = Arc::new(StatusProbe::new(
            Arc::new(connector.clone()),
            Retry::with_deadline(Duration::from_millis(10)),
        ));
        let state = ApiState::new(
            NodeIdentity::new(name, "demo"),
            tags,
            dcs.clone(),
            Arc::clone(&snapshot),
            ha.clone(),
            probe,
            Arc::clone(&shutdown),
        )
        .with_poll_interval(Duration::from_millis(1));

        Self {
            dcs,
            snapshot,
            ha,
            connector,
            shutdown,
            state: Arc::new(state),
        }
    }

    pub fn router(&self) -> Router {
        build_router(Arc::clone(&self.state))
    }

    pub async fn get(&self, uri: &str) -> (StatusCode, String) {
        send(self.router(), "GET", uri, None).await
    }

    pub async fn post(&self, uri: &str, body: &str) -> (StatusCode, String) {
        send(self.router(), "POST", uri, Some(body)).await
    }
}

pub async fn send(router: Router, method: &str, uri: &str, body: Option<&str>) -> (StatusCode, String) {
    send_from(router, method, uri, body, "127.0.0.1:40000".parse().unwrap()).await
}

pub async fn send_from(
    router: Router,
    method: &str,
    uri: &str,
    body: Option<&str>,
    client: SocketAddr,
) -> (StatusCode, String) {
    let mut request = Request::builder()
        .method(method)
        .uri(uri)
        .body(body.map(|b| Body::from(b.to_string())).unwrap_or_else(Body::empty))
        .unwrap();
    request.extensions_mut().insert(ConnectInfo(client));
    let response = router.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, String::from_utf8(bytes.to_vec()).unwrap())
}

pub fn json_body(body: &str) -> Value {
    serde_json::from_str(body).unwrap()
}

pub fn member(name: &str, role: &str, lsn: u64) -> Member {
    Member::new(
        name,
        json!({
            "api_url": format!("http://10.0.0.{}:8008/patroni", name.trim_start_matches("node")),
            "conn_url": format!("postgres://10.0.0.{}:5432/postgres", name.trim_start_matches("node")),
            "state": "running",
            "role": role,
            "xlog_location": lsn,
            "timeline": 2
        }),
    )
}

/// node1 leads, node2 and node3 replicate.
pub fn cluster(config: Value) -> Cluster {
    Cluster {
        initialize: Some("7234567890123456789".into()),
        config: Some(ClusterConfig::new(1, config)),
        leader: Some("node1".into()),
        status: ClusterStatus { last_lsn: 1000 },
        members: vec![
            member("node1", "primary", 1000),
            member("node2", "replica", 990),
            member("node3", "replica", 900),
        ],
        ..Default::default()
    }
}

pub fn led_by(mut cluster: Cluster, leader: &str) -> Cluster {
    cluster.leader = Some(leader.into());
    cluster.failover = None;
    cluster
}

pub fn primary_row() -> StatusRow {
    StatusRow {
        postmaster_start_time: Some("2024-01-01 10:00:00.000+00:00".into()),
        timeline: 2,
        wal_location: Some(1000),
        ..Default::default()
    }
}

/// Replica row replayed up to `replayed`.
pub fn replica_row(replayed: u64) -> StatusRow {
    StatusRow {
        postmaster_start_time: Some("2024-01-01 10:00:00.000+00:00".into()),
        timeline: 2,
        replayed_location: Some(replayed),
        received_location: Some(replayed + 5),
        latest_end_lsn: Some(1000),
        receiver_state: Some("streaming".into()),
        ..Default::default()
    }
}
