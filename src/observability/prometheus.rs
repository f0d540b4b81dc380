//! Prometheus text exposition
//!
//! Node gauges are read from the same status document `/patroni` returns,
//! so both endpoints always agree.

use std::fmt::Write;

use chrono::DateTime;
use serde_json::Value;

use super::metrics::MetricsSnapshot;

const PREFIX: &str = "pgha";

struct Exposition {
    out: String,
    labels: String,
}

impl Exposition {
    fn new(scope: &str, name: &str) -> Self {
        Self {
            out: String::new(),
            labels: format!("scope=\"{}\",name=\"{}\"", escape(scope), escape(name)),
        }
    }

    fn sample(&mut self, metric: &str, kind: &str, help: &str, value: impl std::fmt::Display) {
        let _ = writeln!(self.out, "# HELP {}_{} {}", PREFIX, metric, help);
        let _ = writeln!(self.out, "# TYPE {}_{} {}", PREFIX, metric, kind);
        let _ = writeln!(self.out, "{}_{}{{{}}} {}", PREFIX, metric, self.labels, value);
    }

    fn gauge(&mut self, metric: &str, help: &str, value: impl std::fmt::Display) {
        self.sample(metric, "gauge", help, value);
    }

    fn flag(&mut self, metric: &str, help: &str, on: bool) {
        self.gauge(metric, help, u8::from(on));
    }
}

fn escape(raw: &str) -> String {
    raw.replace('\\', "\\\\").replace('"', "\\\"").replace('\n', "\\n")
}

/// `3.2.1` → `30201`
fn version_number(raw: &str) -> u64 {
    raw.split('.')
        .take(3)
        .map(|part| {
            part.chars()
                .take_while(|c| c.is_ascii_digit())
                .collect::<String>()
                .parse::<u64>()
                .unwrap_or(0)
        })
        .chain(std::iter::repeat(0))
        .take(3)
        .fold(0, |acc, part| acc * 100 + part)
}

fn epoch_seconds(raw: Option<&str>) -> f64 {
    raw.and_then(|ts| {
        DateTime::parse_from_rfc3339(ts)
            .or_else(|_| DateTime::parse_from_str(ts, "%Y-%m-%d %H:%M:%S%.f%#z"))
            .ok()
    })
    .map(|ts| ts.timestamp_millis() as f64 / 1000.0)
    .unwrap_or(0.0)
}

/// Render node gauges from a status document plus the request counters.
pub fn render_metrics(doc: &Value, counters: &MetricsSnapshot) -> String {
    let scope = doc["patroni"]["scope"].as_str().unwrap_or_default();
    let name = doc["patroni"]["name"].as_str().unwrap_or_default();
    let mut exp = Exposition::new(scope, name);

    let role = doc["role"].as_str().unwrap_or_default();
    let running = doc["state"].as_str() == Some("running");
    let flag = |key: &str| doc[key].as_bool().unwrap_or(false);
    let number = |value: &Value| value.as_u64().unwrap_or(0);

    exp.gauge(
        "version",
        "Version of the control API.",
        version_number(doc["patroni"]["version"].as_str().unwrap_or_default()),
    );
    exp.flag("postgres_running", "Value is 1 if PostgreSQL is running, 0 otherwise.", running);
    exp.gauge(
        "postmaster_start_time",
        "Epoch seconds since PostgreSQL started.",
        epoch_seconds(doc["postmaster_start_time"].as_str()),
    );
    exp.flag(
        "primary",
        "Value is 1 if this node is the leader, 0 otherwise.",
        role == "primary",
    );
    exp.gauge(
        "xlog_location",
        "Current WAL location on the primary, 0 elsewhere.",
        number(&doc["xlog"]["location"]),
    );
    exp.flag(
        "standby_leader",
        "Value is 1 if this node is the standby leader, 0 otherwise.",
        role == "standby_leader",
    );
    exp.flag(
        "replica",
        "Value is 1 if this node is a replica, 0 otherwise.",
        role == "replica",
    );
    exp.flag(
        "sync_standby",
        "Value is 1 if this node is a sync standby, 0 otherwise.",
        flag("sync_standby"),
    );
    exp.flag(
        "quorum_standby",
        "Value is 1 if this node is a quorum standby, 0 otherwise.",
        flag("quorum_standby"),
    );
    exp.gauge(
        "xlog_received_location",
        "Current WAL received location on a replica, 0 elsewhere.",
        number(&doc["xlog"]["received_location"]),
    );
    exp.gauge(
        "xlog_replayed_location",
        "Current WAL replayed location on a replica, 0 elsewhere.",
        number(&doc["xlog"]["replayed_location"]),
    );
    exp.gauge(
        "xlog_replayed_timestamp",
        "Epoch seconds of the latest replayed transaction.",
        epoch_seconds(doc["xlog"]["replayed_timestamp"].as_str()),
    );
    exp.flag(
        "xlog_paused",
        "Value is 1 if WAL replay is paused, 0 otherwise.",
        doc["xlog"]["paused"].as_bool().unwrap_or(false),
    );
    exp.gauge(
        "postgres_server_version",
        "Version of PostgreSQL as server_version_num.",
        number(&doc["server_version"]),
    );
    exp.flag(
        "cluster_unlocked",
        "Value is 1 if the cluster has no leader lock, 0 otherwise.",
        flag("cluster_unlocked"),
    );
    exp.flag(
        "failsafe_mode_is_active",
        "Value is 1 if failsafe mode is active, 0 otherwise.",
        flag("failsafe_mode_is_active"),
    );
    exp.gauge(
        "postgres_timeline",
        "PostgreSQL timeline of this node, 0 if unknown.",
        number(&doc["timeline"]),
    );
    exp.gauge(
        "dcs_last_seen",
        "Epoch seconds of the last successful DCS read.",
        number(&doc["dcs_last_seen"]),
    );
    exp.flag(
        "pending_restart",
        "Value is 1 if the node needs a restart, 0 otherwise.",
        flag("pending_restart"),
    );
    exp.flag(
        "is_paused",
        "Value is 1 if automatic failover is paused, 0 otherwise.",
        flag("pause"),
    );

    for (metric, help, value) in counters.counters() {
        exp.sample(metric, "counter", help, value);
    }

    exp.out
}
