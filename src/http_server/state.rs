//! # Shared Handler State
//!
//! One [`ApiState`] is shared by every route. It holds handles only; the
//! local PostgreSQL status is probed fresh for each request.

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tracing::warn;

use crate::dcs::{Cluster, Dcs, GlobalSettings, SnapshotHandle, Tags};
use crate::ha::HaHandle;
use crate::health::{status_document, unknown_document, NodeIdentity, StatusContext};
use crate::observability::MetricsRegistry;
use crate::postgres::{PostgresqlStatus, Role, State, StatusProbe};
use crate::shutdown::ShutdownSignal;
use crate::switchover::{Orchestrator, DEFAULT_POLL_INTERVAL};

use super::access::PolicyCell;

/// Collaborators shared by all handlers.
pub struct ApiState {
    pub identity: NodeIdentity,
    pub tags: Tags,
    pub dcs: Arc<dyn Dcs>,
    pub snapshot: Arc<SnapshotHandle>,
    pub ha: Arc<dyn HaHandle>,
    pub probe: Arc<StatusProbe>,
    pub shutdown: Arc<ShutdownSignal>,
    pub metrics: MetricsRegistry,
    pub policy: PolicyCell,
    /// Sleep between switchover result polls
    pub poll_interval: Duration,
}

/// The local probe failed; carries the role to report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProbeFailed(pub Role);

impl ProbeFailed {
    pub fn document(&self) -> Value {
        unknown_document(self.0)
    }
}

impl ApiState {
    pub fn new(
        identity: NodeIdentity,
        tags: Tags,
        dcs: Arc<dyn Dcs>,
        snapshot: Arc<SnapshotHandle>,
        ha: Arc<dyn HaHandle>,
        probe: Arc<StatusProbe>,
        shutdown: Arc<ShutdownSignal>,
    ) -> Self {
        Self {
            identity,
            tags,
            dcs,
            snapshot,
            ha,
            probe,
            shutdown,
            metrics: MetricsRegistry::new(),
            policy: PolicyCell::default(),
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    pub fn with_policy(mut self, policy: PolicyCell) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn orchestrator(&self) -> Orchestrator {
        Orchestrator::new(
            Arc::clone(&self.dcs),
            Arc::clone(&self.ha),
            Arc::clone(&self.snapshot),
            Arc::clone(&self.shutdown),
        )
        .with_poll_interval(self.poll_interval)
    }

    /// Probe the local node. The query only runs while PostgreSQL is
    /// running; otherwise the HA handle's view is reported as is.
    pub async fn local_status(&self) -> Result<PostgresqlStatus, ProbeFailed> {
        let role = self.ha.postgres_role();
        let mut status = PostgresqlStatus::new(self.ha.postgres_state(), role);
        status.server_version = self.ha.server_version();
        status.pending_restart_reason = self.ha.pending_restart_reason();

        if status.state != State::Running {
            return Ok(status);
        }

        let probe = Arc::clone(&self.probe);
        match tokio::task::spawn_blocking(move || probe.query()).await {
            Ok(Ok(row)) => Ok(status.with_row(row)),
            Ok(Err(err)) => {
                warn!(error = %err, "local status probe failed");
                self.metrics.increment_probe_failures();
                Err(ProbeFailed(role))
            }
            Err(err) => {
                warn!(error = %err, "local status probe task failed");
                self.metrics.increment_probe_failures();
                Err(ProbeFailed(role))
            }
        }
    }

    /// Read the cluster bypassing the snapshot; falls back to the last
    /// published snapshot when the store cannot be read.
    pub async fn fresh_cluster(&self) -> Option<Arc<Cluster>> {
        let dcs = Arc::clone(&self.dcs);
        match tokio::task::spawn_blocking(move || dcs.get_cluster()).await {
            Ok(Ok(cluster)) => Some(Arc::new(cluster)),
            Ok(Err(err)) => {
                warn!(error = %err, "cannot read cluster, using last snapshot");
                self.snapshot.current()
            }
            Err(err) => {
                warn!(error = %err, "cluster read task failed");
                self.snapshot.current()
            }
        }
    }

    /// Status document for `status`, read against the current snapshot.
    pub fn document(
        &self,
        status: &PostgresqlStatus,
        cluster: Option<&Cluster>,
        settings: &GlobalSettings,
    ) -> Value {
        let scheduled_restart = self.ha.scheduled_restart();
        status_document(&StatusContext {
            identity: &self.identity,
            status,
            cluster,
            settings,
            tags: &self.tags,
            scheduled_restart: scheduled_restart.as_ref(),
            watchdog_failed: self.ha.watchdog_failed(),
            failsafe_active: self.ha.failsafe_is_active(),
            dcs_last_seen: self.snapshot.last_seen(),
        })
    }
}
