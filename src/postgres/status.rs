//! PostgreSQL status model
//!
//! [`Role`] and [`State`] are owned by the process manager; [`StatusRow`] is
//! the result of the single diagnostic query; [`PostgresqlStatus`] combines
//! both for one request.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Role of the local PostgreSQL instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Primary,
    Replica,
    StandbyLeader,
    Uninitialized,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Primary => "primary",
            Role::Replica => "replica",
            Role::StandbyLeader => "standby_leader",
            Role::Uninitialized => "uninitialized",
        }
    }

    /// Primary or standby leader.
    pub fn is_leader_role(&self) -> bool {
        matches!(self, Role::Primary | Role::StandbyLeader)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "primary" => Ok(Role::Primary),
            "replica" => Ok(Role::Replica),
            "standby_leader" => Ok(Role::StandbyLeader),
            "uninitialized" => Ok(Role::Uninitialized),
            other => Err(format!("unknown role: {}", other)),
        }
    }
}

/// Lifecycle state of the local PostgreSQL process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum State {
    Running,
    Starting,
    Stopped,
    Restarting,
    Stopping,
    Crashed,
    Unknown,
}

impl State {
    pub fn as_str(&self) -> &'static str {
        match self {
            State::Running => "running",
            State::Starting => "starting",
            State::Stopped => "stopped",
            State::Restarting => "restarting",
            State::Stopping => "stopping",
            State::Crashed => "crashed",
            State::Unknown => "unknown",
        }
    }
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A downstream replication connection as seen from `pg_stat_replication`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplicationClient {
    pub application_name: String,
    #[serde(default)]
    pub client_addr: Option<String>,
    pub state: String,
    pub sync_state: String,
    #[serde(default)]
    pub sync_priority: u32,
}

/// A parameter waiting for a restart to take effect.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParamDiff {
    pub old_value: String,
    pub new_value: String,
}

impl ParamDiff {
    pub fn new(old_value: impl Into<String>, new_value: impl Into<String>) -> Self {
        Self {
            old_value: old_value.into(),
            new_value: new_value.into(),
        }
    }
}

/// One row of the diagnostic query.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StatusRow {
    #[serde(default)]
    pub postmaster_start_time: Option<String>,
    /// Current timeline, 0 when it cannot be read (standby)
    #[serde(default)]
    pub timeline: u64,
    /// Current write position on a primary
    #[serde(default)]
    pub wal_location: Option<u64>,
    #[serde(default)]
    pub replayed_location: Option<u64>,
    #[serde(default)]
    pub replayed_timestamp: Option<String>,
    #[serde(default)]
    pub replay_paused: bool,
    #[serde(default)]
    pub received_location: Option<u64>,
    /// Latest position the upstream reported to the WAL receiver
    #[serde(default)]
    pub latest_end_lsn: Option<u64>,
    /// WAL receiver state, e.g. `streaming`
    #[serde(default)]
    pub receiver_state: Option<String>,
    #[serde(default)]
    pub replication: Vec<ReplicationClient>,
}

/// Status of the local node for one request.
#[derive(Debug, Clone, PartialEq)]
pub struct PostgresqlStatus {
    pub state: State,
    pub role: Role,
    pub server_version: u32,
    /// Diagnostic row, absent when PostgreSQL is not running
    pub row: Option<StatusRow>,
    pub pending_restart_reason: BTreeMap<String, ParamDiff>,
}

impl PostgresqlStatus {
    pub fn new(state: State, role: Role) -> Self {
        Self {
            state,
            role,
            server_version: 0,
            row: None,
            pending_restart_reason: BTreeMap::new(),
        }
    }

    pub fn with_row(mut self, row: StatusRow) -> Self {
        self.row = Some(row);
        self
    }

    pub fn is_running(&self) -> bool {
        self.state == State::Running
    }

    pub fn replayed_location(&self) -> Option<u64> {
        self.row.as_ref().and_then(|row| row.replayed_location)
    }

    pub fn received_location(&self) -> Option<u64> {
        self.row.as_ref().and_then(|row| row.received_location)
    }

    pub fn latest_end_lsn(&self) -> Option<u64> {
        self.row.as_ref().and_then(|row| row.latest_end_lsn)
    }

    /// Replication state of a standby: the receiver state, if any.
    pub fn replication_state(&self) -> Option<&str> {
        if self.role == Role::Primary {
            return None;
        }
        self.row.as_ref().and_then(|row| row.receiver_state.as_deref())
    }

    /// Position used to compare a node against the leader.
    pub fn wal_position(&self) -> Option<u64> {
        let row = self.row.as_ref()?;
        match self.role {
            Role::Primary => row.wal_location,
            _ => match (row.received_location, row.replayed_location) {
                (Some(received), Some(replayed)) => Some(received.max(replayed)),
                (received, replayed) => received.or(replayed),
            },
        }
    }

    pub fn timeline(&self) -> Option<u64> {
        self.row
            .as_ref()
            .map(|row| row.timeline)
            .filter(|timeline| *timeline > 0)
    }
}
