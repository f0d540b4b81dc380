//! Switchover Orchestrator
//!
//! Drives one request through
//! `Validate → ResolveCandidate → WriteIntent → PollResult → Classify`.
//!
//! The orchestrator never promotes anything itself. It writes the failover
//! key, wakes the HA loop and watches the leader lock until it moves, the
//! intent disappears, or the poll budget runs out. Polling blocks the
//! calling thread; run it on the blocking pool.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::dcs::{Cluster, Dcs, Expected, FailoverIntent, GlobalSettings, SnapshotHandle};
use crate::ha::HaHandle;
use crate::shutdown::ShutdownSignal;

use super::errors::{SwitchoverError, SwitchoverResult};
use super::request::SwitchoverRequest;
use super::validator::{validate_pause, validate_request, CandidateResolver};

/// Default pause between result polls
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Stage of a single orchestration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwitchoverStage {
    Validate,
    ResolveCandidate,
    WriteIntent,
    PollResult,
    Classify,
}

impl SwitchoverStage {
    pub fn name(&self) -> &'static str {
        match self {
            SwitchoverStage::Validate => "validate",
            SwitchoverStage::ResolveCandidate => "resolve_candidate",
            SwitchoverStage::WriteIntent => "write_intent",
            SwitchoverStage::PollResult => "poll_result",
            SwitchoverStage::Classify => "classify",
        }
    }
}

/// Final answer for the operator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SwitchoverOutcome {
    pub status: u16,
    pub message: String,
}

impl SwitchoverOutcome {
    pub fn new(status: u16, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }
}

impl From<SwitchoverError> for SwitchoverOutcome {
    fn from(err: SwitchoverError) -> Self {
        Self::new(err.status_code(), err.message)
    }
}

/// What polling observed.
#[derive(Debug, Clone, PartialEq, Eq)]
enum PollResult {
    /// Leader lock moved to this member
    LeaderChanged(String),
    /// Intent consumed without a leader change
    IntentGone,
    /// Budget spent; at least one snapshot was read
    Exhausted,
    /// Budget spent without a single successful read
    Unknown,
}

pub struct Orchestrator {
    dcs: Arc<dyn Dcs>,
    ha: Arc<dyn HaHandle>,
    snapshot: Arc<SnapshotHandle>,
    shutdown: Arc<ShutdownSignal>,
    poll_interval: Duration,
}

impl Orchestrator {
    pub fn new(
        dcs: Arc<dyn Dcs>,
        ha: Arc<dyn HaHandle>,
        snapshot: Arc<SnapshotHandle>,
        shutdown: Arc<ShutdownSignal>,
    ) -> Self {
        Self {
            dcs,
            ha,
            snapshot,
            shutdown,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    fn enter(&self, stage: SwitchoverStage, request: &SwitchoverRequest) {
        debug!(
            stage = stage.name(),
            action = request.action.as_str(),
            leader = ?request.leader,
            candidate = ?request.candidate,
            "switchover stage"
        );
    }

    fn fresh_cluster(&self) -> SwitchoverResult<Cluster> {
        self.dcs.get_cluster().map_err(|err| {
            warn!(error = %err, "cannot read cluster for switchover");
            SwitchoverError::unavailable("DCS is not accessible")
        })
    }

    /// Run a request to completion.
    pub fn execute(&self, request: &SwitchoverRequest, now: DateTime<Utc>) -> SwitchoverOutcome {
        match self.try_execute(request, now) {
            Ok(outcome) => outcome,
            Err(err) => {
                info!(
                    action = request.action.as_str(),
                    status = err.status_code(),
                    reason = %err.message,
                    "switchover rejected"
                );
                err.into()
            }
        }
    }

    fn try_execute(
        &self,
        request: &SwitchoverRequest,
        now: DateTime<Utc>,
    ) -> SwitchoverResult<SwitchoverOutcome> {
        self.enter(SwitchoverStage::Validate, request);
        let scheduled_at = validate_request(request, now)?;
        let cluster = self.fresh_cluster()?;
        let settings = GlobalSettings::from_cluster(&cluster, &self.snapshot.settings());
        validate_pause(request, scheduled_at.is_some(), &settings)?;

        self.enter(SwitchoverStage::ResolveCandidate, request);
        let resolver = CandidateResolver::new(&cluster, &settings, self.ha.as_ref());
        if scheduled_at.is_some() {
            resolver.check_members(request)?;
        } else {
            let found = resolver.resolve(request)?;
            debug!(candidate = %found, "healthy candidate found");
        }

        self.enter(SwitchoverStage::WriteIntent, request);
        let intent = FailoverIntent::new(request.leader.clone(), request.candidate.clone(), scheduled_at);
        // Only replace the failover key this read saw.
        let expected = Expected::observed(cluster.failover.as_ref().map(|f| f.version));
        match self.dcs.write_failover(Some(&intent), expected) {
            Ok(true) => {}
            Ok(false) => {
                warn!(expected = ?expected, "failover key changed concurrently");
                return Err(SwitchoverError::write_rejected());
            }
            Err(err) => {
                warn!(error = %err, "failover key write failed");
                return Err(SwitchoverError::write_rejected());
            }
        }
        self.ha.wakeup();

        if scheduled_at.is_some() {
            info!(action = request.action.as_str(), scheduled_at = ?scheduled_at, "switchover scheduled");
            return Ok(SwitchoverOutcome::new(202, "Switchover scheduled"));
        }

        self.enter(SwitchoverStage::PollResult, request);
        let previous_leader = cluster.leader_name().map(String::from);
        let result = self.poll(previous_leader.as_deref(), settings.loop_wait);

        self.enter(SwitchoverStage::Classify, request);
        Ok(Self::classify(request, result))
    }

    fn poll(&self, previous_leader: Option<&str>, loop_wait: u64) -> PollResult {
        let attempts = 2 * loop_wait.max(10);
        let mut seen_snapshot = false;
        for attempt in 0..attempts {
            if self.shutdown.wait_timeout(self.poll_interval) {
                debug!(attempt, "switchover polling interrupted by shutdown");
                break;
            }
            let cluster = match self.dcs.get_cluster() {
                Ok(cluster) => cluster,
                Err(err) => {
                    debug!(attempt, error = %err, "switchover poll read failed");
                    continue;
                }
            };
            seen_snapshot = true;
            match cluster.leader_name() {
                Some(leader) if Some(leader) != previous_leader => {
                    return PollResult::LeaderChanged(leader.to_string());
                }
                _ => {}
            }
            if cluster.failover.is_none() {
                return PollResult::IntentGone;
            }
        }
        if seen_snapshot {
            PollResult::Exhausted
        } else {
            PollResult::Unknown
        }
    }

    fn classify(request: &SwitchoverRequest, result: PollResult) -> SwitchoverOutcome {
        let action = request.action;
        let outcome = match result {
            PollResult::LeaderChanged(leader) => match &request.candidate {
                Some(candidate) if *candidate != leader => SwitchoverOutcome::new(
                    200,
                    format!(
                        "{} over to \"{}\" instead of \"{}\"",
                        action.past_tense_title(),
                        leader,
                        candidate
                    ),
                ),
                _ => SwitchoverOutcome::new(
                    200,
                    format!("Successfully {} over to \"{}\"", action.past_tense(), leader),
                ),
            },
            PollResult::IntentGone | PollResult::Exhausted => {
                SwitchoverOutcome::new(503, format!("{} failed", action.title()))
            }
            PollResult::Unknown => {
                SwitchoverOutcome::new(503, format!("{} status unknown", action.title()))
            }
        };
        info!(
            action = action.as_str(),
            status = outcome.status,
            result = %outcome.message,
            "switchover finished"
        );
        outcome
    }

    /// Clear a scheduled intent (`DELETE /switchover`).
    pub fn cancel_scheduled(&self) -> SwitchoverOutcome {
        let cluster = match self.fresh_cluster() {
            Ok(cluster) => cluster,
            Err(err) => return err.into(),
        };
        let intent = match cluster.failover {
            Some(intent) if intent.is_scheduled() => intent,
            _ => return SwitchoverError::not_found("no switchover is scheduled").into(),
        };
        match self.dcs.write_failover(None, Expected::Version(intent.version)) {
            Ok(true) => {
                info!("scheduled switchover deleted");
                SwitchoverOutcome::new(200, "scheduled switchover deleted")
            }
            Ok(false) => SwitchoverError::conflict(
                "Failed to delete scheduled switchover: the failover key changed concurrently",
            )
            .into(),
            Err(err) => {
                warn!(error = %err, "failover key delete failed");
                SwitchoverError::unavailable("failed to delete failover key from DCS").into()
            }
        }
    }
}
