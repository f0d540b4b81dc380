//! Snapshot handle
//!
//! The HA loop publishes each freshly read [`Cluster`] here and request
//! handlers read it without blocking the publisher. Publishing swaps an
//! `Arc`; readers clone the `Arc` and drop the lock immediately.
//!
//! The handle also remembers the cluster-wide settings derived from the
//! last snapshot that carried a configuration, so a node keeps its notion
//! of "paused" or "synchronous mode" while the DCS is unreachable.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, RwLock};

use chrono::Utc;

use super::cluster::Cluster;

/// Cluster-wide settings derived from the dynamic configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GlobalSettings {
    pub paused: bool,
    pub synchronous_mode: bool,
    pub quorum_commit_mode: bool,
    pub standby_cluster: bool,
    pub failsafe_mode: bool,
    /// Seconds between HA loop iterations
    pub loop_wait: u64,
    /// Leader lock TTL in seconds
    pub ttl: u64,
}

impl Default for GlobalSettings {
    fn default() -> Self {
        Self {
            paused: false,
            synchronous_mode: false,
            quorum_commit_mode: false,
            standby_cluster: false,
            failsafe_mode: false,
            loop_wait: 10,
            ttl: 30,
        }
    }
}

impl GlobalSettings {
    /// Derive settings from a snapshot, falling back to `previous` when the
    /// snapshot carries no configuration.
    pub fn from_cluster(cluster: &Cluster, previous: &GlobalSettings) -> Self {
        match &cluster.config {
            Some(config) => Self {
                paused: config.is_paused(),
                synchronous_mode: config.is_synchronous_mode(),
                quorum_commit_mode: config.is_quorum_commit_mode(),
                standby_cluster: config.is_standby_cluster(),
                failsafe_mode: config.is_failsafe_mode(),
                loop_wait: config.loop_wait().unwrap_or(previous.loop_wait),
                ttl: config.ttl().unwrap_or(previous.ttl),
            },
            None => previous.clone(),
        }
    }
}

/// Thread-safe accessor for the latest cluster snapshot.
#[derive(Debug, Default)]
pub struct SnapshotHandle {
    cluster: RwLock<Option<Arc<Cluster>>>,
    settings: RwLock<GlobalSettings>,
    /// Unix timestamp of the last successful publish, 0 if never
    last_seen: AtomicI64,
}

impl SnapshotHandle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from node-level defaults for `loop_wait` and `ttl`.
    pub fn with_settings(settings: GlobalSettings) -> Self {
        Self {
            settings: RwLock::new(settings),
            ..Default::default()
        }
    }

    /// Publish a freshly read snapshot.
    pub fn publish(&self, cluster: Cluster) {
        {
            let mut settings = match self.settings.write() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            let derived = GlobalSettings::from_cluster(&cluster, &settings);
            *settings = derived;
        }
        let mut slot = match self.cluster.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        *slot = Some(Arc::new(cluster));
        self.last_seen.store(Utc::now().timestamp(), Ordering::Relaxed);
    }

    /// Forget the snapshot after the DCS became unreachable.
    pub fn invalidate(&self) {
        let mut slot = match self.cluster.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        *slot = None;
    }

    /// Latest snapshot, `None` while the DCS is unavailable.
    pub fn current(&self) -> Option<Arc<Cluster>> {
        match self.cluster.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Last known cluster-wide settings.
    pub fn settings(&self) -> GlobalSettings {
        match self.settings.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Unix timestamp of the last publish.
    pub fn last_seen(&self) -> Option<i64> {
        match self.last_seen.load(Ordering::Relaxed) {
            0 => None,
            ts => Some(ts),
        }
    }
}
