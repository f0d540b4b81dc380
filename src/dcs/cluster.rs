//! Cluster snapshot
//!
//! A [`Cluster`] is an immutable view of everything the DCS holds for one
//! scope: the leader lock, member records, the dynamic configuration, the
//! pending failover intent and the replication bookkeeping. Snapshots are
//! replaced wholesale, never edited in place by readers.

use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::tags::{TagValue, Tags};

// ==================
// Member
// ==================

/// One node registered in the DCS.
///
/// The member payload is whatever the node last published; accessors read
/// the well-known keys and tolerate missing or mistyped values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Member {
    pub name: String,
    #[serde(default)]
    pub data: Map<String, Value>,
}

impl Member {
    pub fn new(name: impl Into<String>, data: Value) -> Self {
        let data = match data {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        Self {
            name: name.into(),
            data,
        }
    }

    /// REST API URL published by the member, if it is a string.
    pub fn api_url(&self) -> Option<&str> {
        self.data.get("api_url").and_then(Value::as_str)
    }

    pub fn conn_url(&self) -> Option<&str> {
        self.data.get("conn_url").and_then(Value::as_str)
    }

    pub fn state(&self) -> Option<&str> {
        self.data.get("state").and_then(Value::as_str)
    }

    pub fn role(&self) -> Option<&str> {
        self.data.get("role").and_then(Value::as_str)
    }

    /// Last WAL position reported by the member.
    pub fn lsn(&self) -> Option<u64> {
        self.data.get("xlog_location").and_then(Value::as_u64)
    }

    pub fn timeline(&self) -> Option<u64> {
        self.data.get("timeline").and_then(Value::as_u64)
    }

    /// Tags published with the member record.
    pub fn tags(&self) -> Tags {
        self.data
            .get("tags")
            .and_then(Value::as_object)
            .map(|tags| {
                tags.iter()
                    .filter_map(|(key, value)| {
                        serde_json::from_value::<TagValue>(value.clone())
                            .ok()
                            .map(|tag| (key.clone(), tag))
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn nofailover(&self) -> bool {
        super::tags::tag_flag(&self.tags(), "nofailover")
    }

    /// Host of the REST API URL.
    pub fn api_host(&self) -> Option<&str> {
        self.api_url().and_then(url_authority).map(|(host, _)| host)
    }

    /// PostgreSQL host and port from the connection URL.
    pub fn conn_host_port(&self) -> Option<(&str, Option<u16>)> {
        self.conn_url().and_then(url_authority)
    }
}

/// `scheme://[user@]host[:port][/path]` → `(host, port)`.
pub fn url_authority(url: &str) -> Option<(&str, Option<u16>)> {
    let rest = url.split_once("://").map(|(_, rest)| rest).unwrap_or(url);
    let authority = rest.split(['/', '?']).next().unwrap_or(rest);
    let authority = authority.rsplit_once('@').map(|(_, host)| host).unwrap_or(authority);

    let (host, port) = if let Some(bracketed) = authority.strip_prefix('[') {
        let (host, tail) = bracketed.split_once(']')?;
        (host, tail.strip_prefix(':'))
    } else {
        match authority.rsplit_once(':') {
            Some((host, port)) => (host, Some(port)),
            None => (authority, None),
        }
    };
    if host.is_empty() {
        return None;
    }
    let port = match port {
        Some(port) => Some(port.parse().ok()?),
        None => None,
    };
    Some((host, port))
}

// ==================
// Synchronous replication
// ==================

/// The `/sync` key: which standbys currently satisfy synchronous commit.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SyncState {
    /// Leader that wrote the record
    #[serde(default)]
    pub leader: Option<String>,
    /// Synchronous (or quorum) standby names
    #[serde(default)]
    pub sync_standby: Vec<String>,
    /// Required number of acknowledgements in quorum mode
    #[serde(default)]
    pub quorum: u32,
}

impl SyncState {
    /// True when `name` is one of the designated standbys.
    pub fn matches(&self, name: &str) -> bool {
        self.sync_standby.iter().any(|member| member == name)
    }

    pub fn is_empty(&self) -> bool {
        self.sync_standby.is_empty()
    }
}

/// How the local node participates in synchronous replication.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncRole {
    /// Node is not a standby (or no sync state is known)
    None,
    /// Designated synchronous standby
    Synchronous,
    /// Member of the quorum commit set
    Quorum,
    /// Plain asynchronous standby
    Asynchronous,
}

// ==================
// Dynamic configuration
// ==================

/// The cluster-wide dynamic configuration document with its store version.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterConfig {
    /// Version used for compare-and-set writes
    pub version: u64,
    /// Configuration document (always a JSON object)
    pub data: Map<String, Value>,
}

impl ClusterConfig {
    pub fn new(version: u64, data: Value) -> Self {
        let data = match data {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        Self { version, data }
    }

    fn flag(&self, key: &str) -> bool {
        match self.data.get(key) {
            Some(Value::Bool(value)) => *value,
            Some(Value::String(value)) => {
                matches!(value.to_ascii_lowercase().as_str(), "on" | "true" | "yes")
            }
            _ => false,
        }
    }

    fn integer(&self, key: &str) -> Option<u64> {
        match self.data.get(key) {
            Some(Value::Number(number)) => number.as_u64(),
            Some(Value::String(value)) => value.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn is_paused(&self) -> bool {
        self.flag("pause")
    }

    pub fn is_standby_cluster(&self) -> bool {
        self.data
            .get("standby_cluster")
            .and_then(Value::as_object)
            .map(|section| !section.is_empty())
            .unwrap_or(false)
    }

    /// Synchronous replication is on (`true`, `on` or `quorum`).
    pub fn is_synchronous_mode(&self) -> bool {
        !self.is_standby_cluster() && (self.flag("synchronous_mode") || self.is_quorum_commit_mode())
    }

    pub fn is_quorum_commit_mode(&self) -> bool {
        !self.is_standby_cluster()
            && self
                .data
                .get("synchronous_mode")
                .and_then(Value::as_str)
                .map(|mode| mode.eq_ignore_ascii_case("quorum"))
                .unwrap_or(false)
    }

    pub fn is_failsafe_mode(&self) -> bool {
        self.flag("failsafe_mode")
    }

    pub fn loop_wait(&self) -> Option<u64> {
        self.integer("loop_wait")
    }

    pub fn ttl(&self) -> Option<u64> {
        self.integer("ttl")
    }
}

// ==================
// Failover intent
// ==================

/// A pending manual failover or switchover stored under the `/failover` key.
///
/// A leader alone means "move away from this leader", a leader plus a
/// candidate is a constrained switchover, a candidate alone is a failover.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailoverIntent {
    #[serde(default)]
    pub leader: Option<String>,
    #[serde(default)]
    pub candidate: Option<String>,
    #[serde(default)]
    pub scheduled_at: Option<DateTime<FixedOffset>>,
    /// Store version of the record
    #[serde(default)]
    pub version: u64,
}

impl FailoverIntent {
    pub fn new(
        leader: Option<String>,
        candidate: Option<String>,
        scheduled_at: Option<DateTime<FixedOffset>>,
    ) -> Self {
        Self {
            leader,
            candidate,
            scheduled_at,
            version: 0,
        }
    }

    pub fn is_scheduled(&self) -> bool {
        self.scheduled_at.is_some()
    }
}

// ==================
// History and status
// ==================

/// One row of the timeline history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub timeline: u64,
    pub lsn: u64,
    pub reason: String,
    #[serde(default)]
    pub timestamp: Option<String>,
    #[serde(default)]
    pub new_leader: Option<String>,
}

/// Leader progress as recorded in the `/status` key.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClusterStatus {
    /// Last known WAL position of the leader
    #[serde(default)]
    pub last_lsn: u64,
}

// ==================
// Cluster
// ==================

/// Immutable snapshot of the cluster state.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Cluster {
    /// System identifier written at bootstrap
    #[serde(default)]
    pub initialize: Option<String>,
    #[serde(default)]
    pub config: Option<ClusterConfig>,
    /// Holder of the leader lock
    #[serde(default)]
    pub leader: Option<String>,
    #[serde(default)]
    pub status: ClusterStatus,
    #[serde(default)]
    pub members: Vec<Member>,
    #[serde(default)]
    pub failover: Option<FailoverIntent>,
    #[serde(default)]
    pub sync: SyncState,
    #[serde(default)]
    pub history: Vec<HistoryEntry>,
    #[serde(default)]
    pub failsafe: Option<std::collections::BTreeMap<String, String>>,
}

impl Cluster {
    /// True when nobody holds the leader lock.
    pub fn is_unlocked(&self) -> bool {
        self.leader.is_none()
    }

    pub fn leader_name(&self) -> Option<&str> {
        self.leader.as_deref()
    }

    pub fn member(&self, name: &str) -> Option<&Member> {
        self.members.iter().find(|member| member.name == name)
    }

    pub fn has_member(&self, name: &str) -> bool {
        self.member(name).is_some()
    }

    pub fn leader_member(&self) -> Option<&Member> {
        self.leader.as_deref().and_then(|name| self.member(name))
    }

    pub fn is_paused(&self) -> bool {
        self.config.as_ref().map(ClusterConfig::is_paused).unwrap_or(false)
    }

    pub fn is_synchronous_mode(&self) -> bool {
        self.config
            .as_ref()
            .map(ClusterConfig::is_synchronous_mode)
            .unwrap_or(false)
    }

    pub fn is_quorum_commit_mode(&self) -> bool {
        self.config
            .as_ref()
            .map(ClusterConfig::is_quorum_commit_mode)
            .unwrap_or(false)
    }

    pub fn is_standby_cluster(&self) -> bool {
        self.config
            .as_ref()
            .map(ClusterConfig::is_standby_cluster)
            .unwrap_or(false)
    }

    /// Classify `name` against the current sync state.
    pub fn sync_role_of(&self, name: &str) -> SyncRole {
        if self.leader_name() == Some(name) {
            return SyncRole::None;
        }
        if !self.is_synchronous_mode() {
            return SyncRole::Asynchronous;
        }
        match (self.sync.matches(name), self.is_quorum_commit_mode()) {
            (true, true) => SyncRole::Quorum,
            (true, false) => SyncRole::Synchronous,
            (false, _) => SyncRole::Asynchronous,
        }
    }

    /// Members other than the leader that publish a REST API URL.
    pub fn failover_candidates(&self) -> Vec<&Member> {
        self.members
            .iter()
            .filter(|member| Some(member.name.as_str()) != self.leader_name())
            .filter(|member| member.api_url().is_some())
            .collect()
    }

    /// Designated sync standbys that are still registered members.
    pub fn sync_candidates(&self) -> Vec<&Member> {
        self.members
            .iter()
            .filter(|member| Some(member.name.as_str()) != self.leader_name())
            .filter(|member| self.sync.matches(&member.name))
            .collect()
    }
}
