//! Switchover validation
//!
//! Three stages. [`validate_request`] checks the body against itself and
//! the clock before the DCS is touched. [`validate_pause`] applies the pause
//! flag from the fresh snapshot. [`CandidateResolver`] checks the request
//! against the cluster and, for immediate requests, asks the HA loop whether
//! any eligible member is healthy enough to be promoted.

use chrono::{DateTime, FixedOffset, Utc};

use crate::dcs::{Cluster, GlobalSettings, Member};
use crate::ha::HaHandle;
use crate::schedule::parse_schedule;

use super::errors::{SwitchoverError, SwitchoverResult};
use super::request::{SwitchoverAction, SwitchoverRequest};

/// Checks on the request body alone, run before the DCS is read. Returns
/// the parsed schedule, if any.
pub fn validate_request(
    request: &SwitchoverRequest,
    now: DateTime<Utc>,
) -> SwitchoverResult<Option<DateTime<FixedOffset>>> {
    match request.action {
        SwitchoverAction::Failover if request.candidate.is_none() => {
            return Err(SwitchoverError::validation(
                "Failover could be performed only to a specific candidate",
            ));
        }
        SwitchoverAction::Switchover if request.leader.is_none() => {
            return Err(SwitchoverError::validation(
                "Switchover could be performed only from a specific leader",
            ));
        }
        _ => {}
    }

    if request.leader.is_some() && request.leader == request.candidate {
        return Err(SwitchoverError::validation(
            "Switchover target and source are the same",
        ));
    }

    match &request.scheduled_at {
        Some(_) if request.action == SwitchoverAction::Failover => {
            Err(SwitchoverError::validation("Failover can't be scheduled"))
        }
        Some(raw) => Ok(Some(parse_schedule(raw, request.action.as_str(), now)?)),
        None => Ok(None),
    }
}

/// Checks that depend on the cluster-wide pause flag.
pub fn validate_pause(
    request: &SwitchoverRequest,
    scheduled: bool,
    settings: &GlobalSettings,
) -> SwitchoverResult<()> {
    if !settings.paused {
        return Ok(());
    }
    if scheduled {
        return Err(SwitchoverError::validation(
            "Can't schedule switchover in the paused state",
        ));
    }
    if request.candidate.is_none() {
        return Err(SwitchoverError::validation(
            "Switchover is possible only to a specific candidate in a paused state",
        ));
    }
    Ok(())
}

/// Checks a request against a cluster snapshot.
pub struct CandidateResolver<'a> {
    cluster: &'a Cluster,
    ha: &'a dyn HaHandle,
    synchronous_mode: bool,
}

impl<'a> CandidateResolver<'a> {
    pub fn new(cluster: &'a Cluster, settings: &GlobalSettings, ha: &'a dyn HaHandle) -> Self {
        Self {
            cluster,
            ha,
            synchronous_mode: settings.synchronous_mode,
        }
    }

    /// Members that could take over, before health is considered.
    fn eligible(&self, request: &SwitchoverRequest) -> SwitchoverResult<Vec<Member>> {
        let action = request.action;
        if let Some(candidate) = &request.candidate {
            if action == SwitchoverAction::Switchover
                && self.synchronous_mode
                && !self.cluster.sync.matches(candidate)
            {
                return Err(SwitchoverError::precondition(
                    "candidate name does not match with sync_standby",
                ));
            }
            return match self.cluster.member(candidate) {
                Some(member) => Ok(vec![member.clone()]),
                None => Err(SwitchoverError::precondition("candidate does not exists")),
            };
        }

        if self.synchronous_mode {
            let members: Vec<Member> = self.cluster.sync_candidates().into_iter().cloned().collect();
            if members.is_empty() {
                return Err(SwitchoverError::precondition(format!(
                    "{} is not possible: can not find sync_standby",
                    action
                )));
            }
            return Ok(members);
        }

        let members: Vec<Member> = self
            .cluster
            .failover_candidates()
            .into_iter()
            .cloned()
            .collect();
        if members.is_empty() {
            return Err(SwitchoverError::precondition(format!(
                "{} is not possible: cluster does not have members except leader",
                action
            )));
        }
        Ok(members)
    }

    /// Leader and candidate checks without asking about health. This is all
    /// a scheduled request gets, since health at execution time is unknown.
    pub fn check_members(&self, request: &SwitchoverRequest) -> SwitchoverResult<Vec<Member>> {
        if let Some(leader) = &request.leader {
            if self.cluster.leader_name() != Some(leader.as_str()) {
                return Err(SwitchoverError::precondition("leader name does not match"));
            }
        }
        self.eligible(request)
    }

    /// Resolve a healthy candidate. Returns the first one found.
    pub fn resolve(&self, request: &SwitchoverRequest) -> SwitchoverResult<String> {
        let members = self.check_members(request)?;
        self.ha
            .fetch_nodes_statuses(&members)
            .into_iter()
            .find(|status| status.failover_limitation().is_none())
            .map(|status| status.name)
            .ok_or_else(|| {
                SwitchoverError::precondition(format!(
                    "{} is not possible: no good candidates have been found",
                    request.action
                ))
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dcs::{ClusterConfig, SnapshotHandle, SyncState};
    use crate::ha::StandaloneHa;
    use crate::shutdown::ShutdownSignal;
    use serde_json::json;
    use std::sync::Arc;

    fn now() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2024-06-01T12:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    fn request(action: SwitchoverAction, leader: Option<&str>, candidate: Option<&str>) -> SwitchoverRequest {
        SwitchoverRequest {
            action,
            leader: leader.map(String::from),
            candidate: candidate.map(String::from),
            scheduled_at: None,
        }
    }

    fn running(name: &str) -> Member {
        Member::new(
            name,
            json!({"api_url": format!("http://{}:8008/patroni", name), "state": "running"}),
        )
    }

    fn cluster(config: serde_json::Value, members: Vec<Member>) -> Cluster {
        Cluster {
            config: Some(ClusterConfig::new(1, config)),
            leader: Some("node1".into()),
            members,
            sync: SyncState {
                leader: Some("node1".into()),
                sync_standby: vec!["node2".into()],
                quorum: 0,
            },
            ..Default::default()
        }
    }

    fn ha() -> StandaloneHa {
        StandaloneHa::new(
            "node1",
            Arc::new(SnapshotHandle::new()),
            Arc::new(ShutdownSignal::new()),
        )
    }

    fn resolve(cluster: &Cluster, request: &SwitchoverRequest) -> SwitchoverResult<String> {
        let settings = GlobalSettings::from_cluster(cluster, &GlobalSettings::default());
        let ha = ha();
        CandidateResolver::new(cluster, &settings, &ha).resolve(request)
    }

    #[test]
    fn test_missing_endpoints() {
        let err = validate_request(&request(SwitchoverAction::Failover, None, None), now())
            .unwrap_err();
        assert_eq!(err.message, "Failover could be performed only to a specific candidate");
        let err = validate_request(&request(SwitchoverAction::Switchover, None, Some("n")), now())
            .unwrap_err();
        assert_eq!(err.message, "Switchover could be performed only from a specific leader");
    }

    #[test]
    fn test_schedule_rules() {
        let mut failover = request(SwitchoverAction::Failover, None, Some("node2"));
        failover.scheduled_at = Some("2024-06-02T00:00:00+00:00".into());
        assert_eq!(
            validate_request(&failover, now()).unwrap_err().message,
            "Failover can't be scheduled"
        );

        let mut switchover = request(SwitchoverAction::Switchover, Some("node1"), None);
        switchover.scheduled_at = Some("2024-06-02T00:00:00".into());
        let err = validate_request(&switchover, now()).unwrap_err();
        assert_eq!(err.status_code(), 400);

        switchover.scheduled_at = Some("2024-05-01T00:00:00+00:00".into());
        let err = validate_request(&switchover, now()).unwrap_err();
        assert_eq!(err.status_code(), 422);
        assert_eq!(err.message, "Cannot schedule switchover in the past");

        switchover.scheduled_at = Some("2024-06-02T00:00:00+02:00".into());
        assert!(validate_request(&switchover, now()).unwrap().is_some());
    }

    #[test]
    fn test_pause_rules() {
        let paused = GlobalSettings {
            paused: true,
            ..Default::default()
        };
        let to_any = request(SwitchoverAction::Switchover, Some("node1"), None);
        assert_eq!(
            validate_pause(&to_any, true, &paused).unwrap_err().message,
            "Can't schedule switchover in the paused state"
        );
        assert_eq!(
            validate_pause(&to_any, false, &paused).unwrap_err().message,
            "Switchover is possible only to a specific candidate in a paused state"
        );

        let to_node2 = request(SwitchoverAction::Switchover, Some("node1"), Some("node2"));
        assert!(validate_pause(&to_node2, false, &paused).is_ok());
        assert!(validate_pause(&to_any, false, &GlobalSettings::default()).is_ok());
    }

    #[test]
    fn test_same_source_and_target() {
        let mut same = request(SwitchoverAction::Switchover, Some("node1"), Some("node1"));
        let err = validate_request(&same, now()).unwrap_err();
        assert_eq!(err.message, "Switchover target and source are the same");

        // Reported ahead of any schedule problem.
        same.scheduled_at = Some("not a date".into());
        let err = validate_request(&same, now()).unwrap_err();
        assert_eq!(err.message, "Switchover target and source are the same");
    }

    #[test]
    fn test_leader_mismatch() {
        let cluster = cluster(json!({}), vec![running("node1"), running("node2")]);
        let err = resolve(&cluster, &request(SwitchoverAction::Switchover, Some("node9"), None))
            .unwrap_err();
        assert_eq!(err.status_code(), 412);
        assert_eq!(err.message, "leader name does not match");
    }

    #[test]
    fn test_candidate_checks() {
        let sync = cluster(
            json!({"synchronous_mode": true}),
            vec![running("node1"), running("node2"), running("node3")],
        );
        let err = resolve(
            &sync,
            &request(SwitchoverAction::Switchover, Some("node1"), Some("node3")),
        )
        .unwrap_err();
        assert_eq!(err.message, "candidate name does not match with sync_standby");

        let plain = cluster(json!({}), vec![running("node1"), running("node2")]);
        let err = resolve(
            &plain,
            &request(SwitchoverAction::Switchover, Some("node1"), Some("node7")),
        )
        .unwrap_err();
        assert_eq!(err.message, "candidate does not exists");

        assert_eq!(
            resolve(&plain, &request(SwitchoverAction::Switchover, Some("node1"), Some("node2")))
                .unwrap(),
            "node2"
        );
    }

    #[test]
    fn test_member_checks_skip_health() {
        let cluster = cluster(
            json!({}),
            vec![
                running("node1"),
                Member::new("node2", json!({"api_url": "http://node2:8008/patroni", "state": "stopped"})),
            ],
        );
        let settings = GlobalSettings::from_cluster(&cluster, &GlobalSettings::default());
        let ha = ha();
        let resolver = CandidateResolver::new(&cluster, &settings, &ha);

        let stopped = request(SwitchoverAction::Switchover, Some("node1"), Some("node2"));
        assert_eq!(resolver.check_members(&stopped).unwrap().len(), 1);
        assert!(resolver.resolve(&stopped).is_err());

        let wrong_leader = request(SwitchoverAction::Switchover, Some("nodeX"), None);
        assert_eq!(
            resolver.check_members(&wrong_leader).unwrap_err().message,
            "leader name does not match"
        );
    }

    #[test]
    fn test_no_members_except_leader() {
        let lonely = cluster(json!({}), vec![running("node1")]);
        let err = resolve(&lonely, &request(SwitchoverAction::Switchover, Some("node1"), None))
            .unwrap_err();
        assert_eq!(
            err.message,
            "switchover is not possible: cluster does not have members except leader"
        );

        let sync = cluster(json!({"synchronous_mode": true}), vec![running("node1")]);
        let err = resolve(&sync, &request(SwitchoverAction::Switchover, Some("node1"), None))
            .unwrap_err();
        assert_eq!(err.message, "switchover is not possible: can not find sync_standby");
    }

    #[test]
    fn test_no_good_candidates() {
        let unhealthy = cluster(
            json!({}),
            vec![
                running("node1"),
                Member::new("node2", json!({"api_url": "http://node2:8008/patroni", "state": "stopped"})),
                Member::new(
                    "node3",
                    json!({"api_url": "http://node3:8008/patroni", "state": "running", "tags": {"nofailover": true}}),
                ),
            ],
        );
        let err = resolve(&unhealthy, &request(SwitchoverAction::Switchover, Some("node1"), None))
            .unwrap_err();
        assert_eq!(
            err.message,
            "switchover is not possible: no good candidates have been found"
        );
    }
}
