//! Node status document
//!
//! The JSON body shared by `/patroni` and every role route. Keys that do
//! not apply to the node are omitted rather than set to `null`.

use serde_json::{json, Map, Value};

use crate::dcs::{Cluster, GlobalSettings, SyncRole, Tags};
use crate::ha::ScheduledRestart;
use crate::postgres::{PostgresqlStatus, Role};

/// Who this node is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeIdentity {
    pub name: String,
    pub scope: String,
    pub version: String,
}

impl NodeIdentity {
    pub fn new(name: impl Into<String>, scope: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            scope: scope.into(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

/// Inputs for one status document.
pub struct StatusContext<'a> {
    pub identity: &'a NodeIdentity,
    pub status: &'a PostgresqlStatus,
    pub cluster: Option<&'a Cluster>,
    pub settings: &'a GlobalSettings,
    pub tags: &'a Tags,
    pub scheduled_restart: Option<&'a ScheduledRestart>,
    pub watchdog_failed: bool,
    pub failsafe_active: bool,
    pub dcs_last_seen: Option<i64>,
}

/// Build the status document.
pub fn status_document(ctx: &StatusContext<'_>) -> Value {
    let status = ctx.status;
    let mut doc = Map::new();

    doc.insert("state".into(), json!(status.state.as_str()));
    doc.insert("role".into(), json!(status.role.as_str()));
    if status.server_version > 0 {
        doc.insert("server_version".into(), json!(status.server_version));
    }

    if let Some(row) = &status.row {
        if let Some(started) = &row.postmaster_start_time {
            doc.insert("postmaster_start_time".into(), json!(started));
        }
        if let Some(timeline) = status.timeline() {
            doc.insert("timeline".into(), json!(timeline));
        }

        let xlog = if status.role == Role::Primary {
            json!({ "location": row.wal_location.unwrap_or(0) })
        } else {
            let mut xlog = Map::new();
            xlog.insert("received_location".into(), json!(row.received_location.unwrap_or(0)));
            xlog.insert("replayed_location".into(), json!(row.replayed_location.unwrap_or(0)));
            xlog.insert("replayed_timestamp".into(), json!(row.replayed_timestamp));
            xlog.insert("paused".into(), json!(row.replay_paused));
            Value::Object(xlog)
        };
        doc.insert("xlog".into(), xlog);

        if !row.replication.is_empty() {
            doc.insert("replication".into(), json!(row.replication));
        }
        if let Some(state) = status.replication_state() {
            doc.insert("replication_state".into(), json!(state));
        }
    }

    match ctx.cluster {
        Some(cluster) => {
            match cluster.sync_role_of(&ctx.identity.name) {
                SyncRole::Synchronous => {
                    doc.insert("sync_standby".into(), json!(true));
                }
                SyncRole::Quorum => {
                    doc.insert("quorum_standby".into(), json!(true));
                }
                SyncRole::None | SyncRole::Asynchronous => {}
            }
            if cluster.is_unlocked() {
                doc.insert("cluster_unlocked".into(), json!(true));
            }
            if let Some(sysid) = &cluster.initialize {
                doc.insert("database_system_identifier".into(), json!(sysid));
            }
        }
        None => {
            doc.insert("cluster_unlocked".into(), json!(true));
            if ctx.failsafe_active {
                doc.insert("failsafe_mode_is_active".into(), json!(true));
            }
        }
    }
    if let Some(last_seen) = ctx.dcs_last_seen {
        doc.insert("dcs_last_seen".into(), json!(last_seen));
    }

    if !ctx.tags.is_empty() {
        doc.insert("tags".into(), json!(ctx.tags));
    }
    if !status.pending_restart_reason.is_empty() {
        doc.insert("pending_restart".into(), json!(true));
        doc.insert(
            "pending_restart_reason".into(),
            json!(status.pending_restart_reason),
        );
    }
    if let Some(restart) = ctx.scheduled_restart {
        doc.insert("scheduled_restart".into(), json!(restart));
    }
    if ctx.watchdog_failed {
        doc.insert("watchdog_failed".into(), json!(true));
    }
    if ctx.settings.paused {
        doc.insert("pause".into(), json!(true));
    }

    doc.insert(
        "patroni".into(),
        json!({
            "version": ctx.identity.version,
            "scope": ctx.identity.scope,
            "name": ctx.identity.name,
        }),
    );

    Value::Object(doc)
}

/// Minimal body returned when the local probe fails.
pub fn unknown_document(role: Role) -> Value {
    json!({ "state": "unknown", "role": role.as_str() })
}
