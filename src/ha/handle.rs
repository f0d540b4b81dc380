//! HA loop seam
//!
//! The promote/demote decision loop runs outside the control API. The API
//! only asks it questions (is this node the leader, what is PostgreSQL
//! doing) and hands it requests (restart, reinitialize, reload).

use std::collections::BTreeMap;

use chrono::{DateTime, FixedOffset, Utc};
use serde::Serialize;
use serde_json::Value;

use crate::dcs::Member;
use crate::postgres::{ParamDiff, Role, State};
use crate::restart::RestartRequest;

/// Health of a potential failover candidate as seen by the HA loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemberStatus {
    pub name: String,
    pub reachable: bool,
    pub in_recovery: Option<bool>,
    pub wal_position: u64,
    pub nofailover: bool,
    pub watchdog_failed: bool,
}

impl MemberStatus {
    pub fn unreachable(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            reachable: false,
            in_recovery: None,
            wal_position: 0,
            nofailover: false,
            watchdog_failed: false,
        }
    }

    /// Why this member may not be promoted, `None` when it may.
    pub fn failover_limitation(&self) -> Option<&'static str> {
        if !self.reachable {
            Some("not reachable")
        } else if self.nofailover {
            Some("not allowed to promote")
        } else if self.watchdog_failed {
            Some("not watchdog capable")
        } else {
            None
        }
    }
}

/// A restart waiting for its time.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScheduledRestart {
    pub schedule: DateTime<FixedOffset>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub postmaster_start_time: Option<String>,
    /// Remaining filters; `filters.schedule` is always `None`
    #[serde(flatten)]
    pub filters: RestartRequest,
}

impl ScheduledRestart {
    /// Build from a scheduled request, `None` if it carries no schedule.
    pub fn from_request(request: &RestartRequest, postmaster_start_time: Option<String>) -> Option<Self> {
        let schedule = request.schedule?;
        let mut filters = request.clone();
        filters.schedule = None;
        Some(Self {
            schedule,
            postmaster_start_time,
            filters,
        })
    }
}

/// Questions and requests the control API sends to the HA loop.
pub trait HaHandle: Send + Sync {
    /// True while this node holds the leader lock.
    fn is_leader(&self) -> bool;

    fn postgres_state(&self) -> State;

    fn postgres_role(&self) -> Role;

    /// `server_version_num` of the running binary.
    fn server_version(&self) -> u32;

    /// Parameters waiting for a restart.
    fn pending_restart_reason(&self) -> BTreeMap<String, ParamDiff>;

    fn watchdog_failed(&self) -> bool;

    /// When the loop plans its next iteration; drives liveness.
    fn next_run(&self) -> Option<DateTime<Utc>>;

    /// Interrupt the loop sleep so it notices a DCS change sooner.
    fn wakeup(&self);

    /// Candidates' health for failover decisions.
    fn fetch_nodes_statuses(&self, members: &[Member]) -> Vec<MemberStatus>;

    /// Restart now. `Ok((done, message))`; `Err` when the restart blew up.
    fn restart(&self, request: &RestartRequest) -> Result<(bool, String), String>;

    fn scheduled_restart(&self) -> Option<ScheduledRestart>;

    /// Record a future restart. `false` if one is already scheduled.
    fn schedule_future_restart(&self, request: &RestartRequest) -> bool;

    /// Drop the future restart. `false` if there was none.
    fn delete_future_restart(&self) -> bool;

    /// Start re-seeding from the leader. `None` once started, otherwise the
    /// reason it cannot start.
    fn reinitialize(&self, force: bool) -> Option<String>;

    /// Reload local configuration.
    fn reload(&self);

    /// Stop the node gracefully.
    fn shutdown(&self);

    /// Failsafe mode is configured for the cluster.
    fn is_failsafe_mode(&self) -> bool;

    /// The leader is running on failsafe grants while the DCS is down.
    fn failsafe_is_active(&self) -> bool;

    /// Apply a failsafe heartbeat from the leader. `None` when accepted.
    fn update_failsafe(&self, data: &Value) -> Option<String>;

    /// This node coordinates an MPP (Citus) group.
    fn is_mpp_coordinator(&self) -> bool;

    fn handle_mpp_event(&self, event: &Value);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failover_limitations() {
        let mut status = MemberStatus {
            name: "n".into(),
            reachable: true,
            in_recovery: Some(true),
            wal_position: 10,
            nofailover: false,
            watchdog_failed: false,
        };
        assert_eq!(status.failover_limitation(), None);
        status.watchdog_failed = true;
        assert_eq!(status.failover_limitation(), Some("not watchdog capable"));
        status.nofailover = true;
        assert_eq!(status.failover_limitation(), Some("not allowed to promote"));
        assert_eq!(
            MemberStatus::unreachable("x").failover_limitation(),
            Some("not reachable")
        );
    }
}
