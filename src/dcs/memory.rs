//! In-memory DCS
//!
//! Single-process store with the same compare-and-set contract as a real
//! backend. Used by the standalone `serve` mode and by tests, which can
//! script failures and a queue of snapshots for successive reads.

use std::collections::VecDeque;
use std::sync::Mutex;

use serde_json::Value;

use super::cluster::{Cluster, ClusterConfig, FailoverIntent};
use super::errors::{DcsError, DcsResult};
use super::store::{Dcs, Expected};

#[derive(Debug, Default)]
struct MemoryState {
    cluster: Cluster,
    /// Snapshots returned by the next reads before falling back to `cluster`
    scripted: VecDeque<DcsResult<Cluster>>,
    /// Once the script is drained, every further read fails
    fail_after_script: bool,
    reject_writes: bool,
    fail_writes: bool,
    next_version: u64,
}

/// In-memory [`Dcs`] implementation.
#[derive(Debug, Default)]
pub struct MemoryDcs {
    state: Mutex<MemoryState>,
}

impl MemoryDcs {
    pub fn new(cluster: Cluster) -> Self {
        let next_version = cluster
            .config
            .as_ref()
            .map(|c| c.version + 1)
            .unwrap_or(1)
            .max(cluster.failover.as_ref().map(|f| f.version + 1).unwrap_or(1));
        Self {
            state: Mutex::new(MemoryState {
                cluster,
                next_version,
                ..Default::default()
            }),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MemoryState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Current stored state.
    pub fn cluster(&self) -> Cluster {
        self.lock().cluster.clone()
    }

    /// Replace the stored state, as another node would.
    pub fn replace(&self, cluster: Cluster) {
        self.lock().cluster = cluster;
    }

    /// Queue a snapshot to be returned by the next read.
    pub fn push_read(&self, cluster: Cluster) {
        self.lock().scripted.push_back(Ok(cluster));
    }

    /// Queue a failed read.
    pub fn push_read_error(&self, reason: &str) {
        self.lock()
            .scripted
            .push_back(Err(DcsError::unavailable(reason)));
    }

    /// Make every read after the scripted ones fail.
    pub fn fail_reads_after_script(&self, fail: bool) {
        self.lock().fail_after_script = fail;
    }

    /// Make writes lose the compare-and-set.
    pub fn reject_writes(&self, reject: bool) {
        self.lock().reject_writes = reject;
    }

    /// Make writes fail with an unavailable error.
    pub fn fail_writes(&self, fail: bool) {
        self.lock().fail_writes = fail;
    }

    fn check_write(state: &MemoryState) -> DcsResult<bool> {
        if state.fail_writes {
            return Err(DcsError::unavailable("store is not reachable"));
        }
        Ok(!state.reject_writes)
    }
}

impl Dcs for MemoryDcs {
    fn get_cluster(&self) -> DcsResult<Cluster> {
        let mut state = self.lock();
        if let Some(scripted) = state.scripted.pop_front() {
            return scripted;
        }
        if state.fail_after_script {
            return Err(DcsError::unavailable("store is not reachable"));
        }
        Ok(state.cluster.clone())
    }

    fn write_failover(
        &self,
        intent: Option<&FailoverIntent>,
        expected: Expected,
    ) -> DcsResult<bool> {
        let mut state = self.lock();
        if !Self::check_write(&state)? {
            return Ok(false);
        }
        if !expected.matches(state.cluster.failover.as_ref().map(|f| f.version)) {
            return Ok(false);
        }
        state.cluster.failover = match intent {
            Some(intent) => {
                let mut stored = intent.clone();
                stored.version = state.next_version;
                state.next_version += 1;
                Some(stored)
            }
            None => None,
        };
        Ok(true)
    }

    fn set_config_value(&self, config: &Value, expected: Expected) -> DcsResult<bool> {
        if !config.is_object() {
            return Err(DcsError::invalid_value("configuration must be a JSON object"));
        }
        let mut state = self.lock();
        if !Self::check_write(&state)? {
            return Ok(false);
        }
        if !expected.matches(state.cluster.config.as_ref().map(|c| c.version)) {
            return Ok(false);
        }
        let version = state.next_version;
        state.next_version += 1;
        state.cluster.config = Some(ClusterConfig::new(version, config.clone()));
        Ok(true)
    }
}
