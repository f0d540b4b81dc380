//! Health classification
//!
//! Pure functions from a node view to an HTTP status code. Nothing here
//! touches shared state; callers assemble a [`NodeView`] per request.

use chrono::{DateTime, Utc};

use crate::dcs::{tag_flag, tags_match, GlobalSettings, SyncRole, Tags};
use crate::postgres::{PostgresqlStatus, Role, State};

use super::route::{HealthRoute, ReadinessMode, RouteQuery};

pub const OK: u16 = 200;
pub const UNAVAILABLE: u16 = 503;

/// Everything the classifier needs to know about the local node.
#[derive(Debug, Clone)]
pub struct NodeView<'a> {
    pub status: &'a PostgresqlStatus,
    /// Node holds the leader lock
    pub is_leader: bool,
    /// A cluster snapshot is available
    pub cluster_available: bool,
    pub sync_role: SyncRole,
    pub settings: &'a GlobalSettings,
    pub tags: &'a Tags,
    /// Leader WAL position from the cluster status
    pub leader_optime: u64,
}

fn code(ok: bool) -> u16 {
    if ok {
        OK
    } else {
        UNAVAILABLE
    }
}

impl<'a> NodeView<'a> {
    /// Status for the leader family of routes.
    ///
    /// Without a snapshot a paused node cannot trust the lock, so the
    /// PostgreSQL role decides.
    pub fn leader_code(&self, route: HealthRoute) -> u16 {
        if !self.cluster_available && self.settings.paused {
            let role = self.status.role;
            return code(match route {
                HealthRoute::StandbyLeader => role == Role::StandbyLeader,
                HealthRoute::Primary => role == Role::Primary,
                _ => role.is_leader_role(),
            });
        }
        code(self.is_leader)
    }

    /// The replayed position trails the leader by more than `max_lag`.
    pub fn is_lagging(&self, max_lag: Option<u64>) -> bool {
        match max_lag {
            None => false,
            Some(max_lag) => {
                let replayed = self.status.replayed_location().unwrap_or(0);
                self.leader_optime > replayed.saturating_add(max_lag)
            }
        }
    }

    /// Status for a replica eligible for read traffic.
    pub fn replica_code(&self, max_lag: Option<u64>) -> u16 {
        code(
            !tag_flag(self.tags, "noloadbalance")
                && !self.is_lagging(max_lag)
                && self.status.role == Role::Replica
                && self.status.state == State::Running,
        )
    }

    /// Classify a role or health route (not liveness/readiness).
    pub fn classify(&self, route: HealthRoute, query: &RouteQuery) -> u16 {
        let standby_cluster = self.settings.standby_cluster;
        let replica = || self.replica_code(query.lag);
        let leader = self.leader_code(route);

        let status = match route {
            HealthRoute::Primary if standby_cluster => UNAVAILABLE,
            HealthRoute::Primary | HealthRoute::Leader => leader,
            HealthRoute::StandbyLeader if standby_cluster => leader,
            HealthRoute::StandbyLeader => UNAVAILABLE,
            HealthRoute::Replica => replica(),
            HealthRoute::ReadOnly => code(leader == OK || replica() == OK),
            HealthRoute::Health => code(self.status.is_running()),
            _ if !self.cluster_available => UNAVAILABLE,
            HealthRoute::Synchronous if self.sync_role == SyncRole::Synchronous => replica(),
            HealthRoute::Quorum if self.sync_role == SyncRole::Quorum => replica(),
            HealthRoute::Asynchronous
                if !matches!(self.sync_role, SyncRole::Synchronous | SyncRole::Quorum) =>
            {
                replica()
            }
            HealthRoute::ReadOnlySync => code(
                leader == OK || (self.sync_role == SyncRole::Synchronous && replica() == OK),
            ),
            HealthRoute::ReadOnlyQuorum => {
                code(leader == OK || (self.sync_role == SyncRole::Quorum && replica() == OK))
            }
            _ => UNAVAILABLE,
        };

        if status == OK
            && !route.is_leader_family()
            && route != HealthRoute::Health
            && !tags_match(self.tags, &query.tags)
        {
            return UNAVAILABLE;
        }
        status
    }

    /// Readiness: can this node take traffic for its role right now.
    pub fn readiness(&self, query: &RouteQuery, failsafe_active: bool) -> u16 {
        if self.is_leader {
            return OK;
        }
        if !self.status.is_running() {
            return UNAVAILABLE;
        }
        if !self.cluster_available {
            return code(failsafe_active);
        }
        if !matches!(self.status.replication_state(), Some("streaming" | "connected")) {
            return UNAVAILABLE;
        }
        let location = match query.mode {
            ReadinessMode::Write => self.status.received_location(),
            ReadinessMode::Apply => self.status.replayed_location(),
        }
        .unwrap_or(0);
        match query.lag {
            None => OK,
            Some(lag) => {
                let latest = self.status.latest_end_lsn().unwrap_or(0);
                code(latest <= location.saturating_add(lag))
            }
        }
    }
}

/// Liveness: the HA loop is still iterating on schedule.
///
/// A running primary gets one TTL of slack, everything else two.
pub fn liveness(
    status: &PostgresqlStatus,
    settings: &GlobalSettings,
    next_run: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> u16 {
    if settings.paused {
        return OK;
    }
    let is_primary = status.role == Role::Primary && status.is_running();
    let threshold = settings.ttl as i64 * if is_primary { 1 } else { 2 };
    match next_run {
        Some(next_run) => code(next_run + chrono::Duration::seconds(threshold) > now),
        None => UNAVAILABLE,
    }
}
