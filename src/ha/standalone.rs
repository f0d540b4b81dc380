//! Standalone HA handle
//!
//! Used when the control API runs without an embedded decision loop: role
//! follows the leader lock in the snapshot, requests that need a process
//! manager are queued as [`HaAction`]s for whoever drives the node.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde_json::Value;
use tokio::sync::Notify;
use tracing::{info, warn};

use crate::dcs::{Dcs, Member, SnapshotHandle};
use crate::postgres::{ParamDiff, Role, State};
use crate::restart::RestartRequest;
use crate::shutdown::ShutdownSignal;

use super::handle::{HaHandle, MemberStatus, ScheduledRestart};

/// Work queued for the process manager.
#[derive(Debug, Clone, PartialEq)]
pub enum HaAction {
    Restart(RestartRequest),
    Reinitialize { force: bool },
    Reload,
    MppEvent(Value),
}

#[derive(Debug)]
struct StandaloneState {
    state: State,
    server_version: u32,
    pending_restart: BTreeMap<String, ParamDiff>,
    scheduled_restart: Option<ScheduledRestart>,
    next_run: Option<DateTime<Utc>>,
    failsafe: Option<Value>,
    watchdog_failed: bool,
    mpp_coordinator: bool,
    actions: Vec<HaAction>,
}

pub struct StandaloneHa {
    name: String,
    snapshot: Arc<SnapshotHandle>,
    shutdown: Arc<ShutdownSignal>,
    inner: Mutex<StandaloneState>,
    queued: Notify,
    /// Cuts the refresh loop's sleep short
    woken: Notify,
}

impl StandaloneHa {
    pub fn new(name: impl Into<String>, snapshot: Arc<SnapshotHandle>, shutdown: Arc<ShutdownSignal>) -> Self {
        Self {
            name: name.into(),
            snapshot,
            shutdown,
            inner: Mutex::new(StandaloneState {
                state: State::Unknown,
                server_version: 0,
                pending_restart: BTreeMap::new(),
                scheduled_restart: None,
                next_run: None,
                failsafe: None,
                watchdog_failed: false,
                mpp_coordinator: false,
                actions: Vec::new(),
            }),
            queued: Notify::new(),
            woken: Notify::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, StandaloneState> {
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    pub fn set_state(&self, state: State) {
        self.lock().state = state;
    }

    pub fn set_server_version(&self, version: u32) {
        self.lock().server_version = version;
    }

    pub fn set_pending_restart(&self, reason: BTreeMap<String, ParamDiff>) {
        self.lock().pending_restart = reason;
    }

    pub fn set_mpp_coordinator(&self, coordinator: bool) {
        self.lock().mpp_coordinator = coordinator;
    }

    /// Record a loop iteration; the next one is due after `loop_wait`.
    pub fn heartbeat(&self, loop_wait: Duration) {
        let next = chrono::Duration::from_std(loop_wait)
            .map(|wait| Utc::now() + wait)
            .unwrap_or_else(|_| Utc::now());
        self.lock().next_run = Some(next);
    }

    fn push_action(&self, action: HaAction) {
        self.lock().actions.push(action);
        self.queued.notify_one();
    }

    /// Drain queued requests.
    pub fn take_actions(&self) -> Vec<HaAction> {
        std::mem::take(&mut self.lock().actions)
    }

    /// Wait until at least one request is queued, then drain.
    pub async fn next_actions(&self) -> Vec<HaAction> {
        loop {
            let actions = self.take_actions();
            if !actions.is_empty() {
                return actions;
            }
            self.queued.notified().await;
        }
    }

    /// Resolves once [`HaHandle::wakeup`] was called. A wakeup with nobody
    /// waiting is kept for the next wait.
    pub async fn woken(&self) {
        self.woken.notified().await;
    }

    fn status_of(member: &Member) -> MemberStatus {
        MemberStatus {
            name: member.name.clone(),
            reachable: member.api_url().is_some() && member.state() == Some("running"),
            in_recovery: member.role().map(|role| role != "primary" && role != "master"),
            wal_position: member.lsn().unwrap_or(0),
            nofailover: member.nofailover(),
            watchdog_failed: false,
        }
    }
}

impl HaHandle for StandaloneHa {
    fn is_leader(&self) -> bool {
        self.snapshot
            .current()
            .map(|cluster| cluster.leader_name() == Some(self.name.as_str()))
            .unwrap_or(false)
    }

    fn postgres_state(&self) -> State {
        self.lock().state
    }

    fn postgres_role(&self) -> Role {
        match (self.is_leader(), self.snapshot.settings().standby_cluster) {
            (true, true) => Role::StandbyLeader,
            (true, false) => Role::Primary,
            (false, _) => Role::Replica,
        }
    }

    fn server_version(&self) -> u32 {
        self.lock().server_version
    }

    fn pending_restart_reason(&self) -> BTreeMap<String, ParamDiff> {
        self.lock().pending_restart.clone()
    }

    fn watchdog_failed(&self) -> bool {
        self.lock().watchdog_failed
    }

    fn next_run(&self) -> Option<DateTime<Utc>> {
        self.lock().next_run
    }

    fn wakeup(&self) {
        self.woken.notify_one();
    }

    fn fetch_nodes_statuses(&self, members: &[Member]) -> Vec<MemberStatus> {
        members.iter().map(Self::status_of).collect()
    }

    fn restart(&self, request: &RestartRequest) -> Result<(bool, String), String> {
        let role = self.postgres_role();
        let mut inner = self.lock();
        if !request.matches(role, inner.server_version, !inner.pending_restart.is_empty()) {
            return Ok((false, "restart conditions are not satisfied".to_string()));
        }
        inner.actions.push(HaAction::Restart(request.clone()));
        drop(inner);
        self.queued.notify_one();
        info!(node = %self.name, "restart requested");
        Ok((true, "restart requested".to_string()))
    }

    fn scheduled_restart(&self) -> Option<ScheduledRestart> {
        self.lock().scheduled_restart.clone()
    }

    fn schedule_future_restart(&self, request: &RestartRequest) -> bool {
        let mut inner = self.lock();
        if inner.scheduled_restart.is_some() {
            return false;
        }
        inner.scheduled_restart = ScheduledRestart::from_request(request, None);
        inner.scheduled_restart.is_some()
    }

    fn delete_future_restart(&self) -> bool {
        self.lock().scheduled_restart.take().is_some()
    }

    fn reinitialize(&self, force: bool) -> Option<String> {
        let cluster = self.snapshot.current();
        match cluster {
            Some(cluster) if cluster.is_unlocked() => {
                Some("Cluster has no leader, can not reinitialize".to_string())
            }
            Some(cluster) if cluster.leader_name() == Some(self.name.as_str()) => {
                Some("I am the leader, can not reinitialize".to_string())
            }
            Some(_) => {
                self.push_action(HaAction::Reinitialize { force });
                None
            }
            None => Some("DCS is not accessible".to_string()),
        }
    }

    fn reload(&self) {
        self.push_action(HaAction::Reload);
    }

    fn shutdown(&self) {
        self.shutdown.trigger();
    }

    fn is_failsafe_mode(&self) -> bool {
        self.snapshot.settings().failsafe_mode
    }

    fn failsafe_is_active(&self) -> bool {
        self.is_failsafe_mode() && self.snapshot.current().is_none() && self.lock().failsafe.is_some()
    }

    fn update_failsafe(&self, data: &Value) -> Option<String> {
        if self.is_leader() {
            return Some("Running as a leader".to_string());
        }
        self.lock().failsafe = Some(data.clone());
        None
    }

    fn is_mpp_coordinator(&self) -> bool {
        self.lock().mpp_coordinator
    }

    fn handle_mpp_event(&self, event: &Value) {
        self.push_action(HaAction::MppEvent(event.clone()));
    }
}

/// Keep the snapshot fresh and the liveness heartbeat ticking until
/// shutdown. A wakeup starts the next refresh without waiting out
/// `loop_wait`.
pub async fn run_refresh_loop(
    dcs: Arc<dyn Dcs>,
    snapshot: Arc<SnapshotHandle>,
    ha: Arc<StandaloneHa>,
    shutdown: Arc<ShutdownSignal>,
) {
    loop {
        let reader = Arc::clone(&dcs);
        match tokio::task::spawn_blocking(move || reader.get_cluster()).await {
            Ok(Ok(cluster)) => snapshot.publish(cluster),
            Ok(Err(err)) => {
                warn!(error = %err, "failed to read cluster state");
                snapshot.invalidate();
            }
            Err(err) => warn!(error = %err, "cluster refresh task failed"),
        }

        let loop_wait = Duration::from_secs(snapshot.settings().loop_wait.max(1));
        ha.heartbeat(loop_wait);

        tokio::select! {
            _ = tokio::time::sleep(loop_wait) => {}
            _ = ha.woken() => {}
            _ = shutdown.wait() => break,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dcs::{Cluster, ClusterConfig, MemoryDcs};
    use serde_json::json;

    fn handle_with(cluster: Option<Cluster>) -> StandaloneHa {
        let snapshot = Arc::new(SnapshotHandle::new());
        if let Some(cluster) = cluster {
            snapshot.publish(cluster);
        }
        StandaloneHa::new("node1", snapshot, Arc::new(ShutdownSignal::new()))
    }

    fn led_by(leader: &str) -> Cluster {
        Cluster {
            leader: Some(leader.into()),
            ..Default::default()
        }
    }

    #[test]
    fn test_role_follows_leader_lock() {
        assert!(handle_with(Some(led_by("node1"))).is_leader());
        assert_eq!(handle_with(Some(led_by("node1"))).postgres_role(), Role::Primary);
        assert_eq!(handle_with(Some(led_by("node2"))).postgres_role(), Role::Replica);
        assert!(!handle_with(None).is_leader());
    }

    #[test]
    fn test_reinitialize_rules() {
        assert_eq!(
            handle_with(Some(led_by("node1"))).reinitialize(true).as_deref(),
            Some("I am the leader, can not reinitialize")
        );
        assert_eq!(
            handle_with(Some(Cluster::default())).reinitialize(false).as_deref(),
            Some("Cluster has no leader, can not reinitialize")
        );
        let ha = handle_with(Some(led_by("node2")));
        assert_eq!(ha.reinitialize(true), None);
        assert_eq!(ha.take_actions(), vec![HaAction::Reinitialize { force: true }]);
    }

    #[test]
    fn test_future_restart_lifecycle() {
        let ha = handle_with(None);
        let request = RestartRequest {
            schedule: Some(chrono::DateTime::parse_from_rfc3339("6016-01-01T00:00:00+00:00").unwrap()),
            ..Default::default()
        };
        assert!(ha.schedule_future_restart(&request));
        assert!(!ha.schedule_future_restart(&request));
        assert!(ha.scheduled_restart().is_some());
        assert!(ha.delete_future_restart());
        assert!(!ha.delete_future_restart());
    }

    #[test]
    fn test_member_statuses_from_dcs_records() {
        let ha = handle_with(None);
        let members = vec![
            Member::new("a", json!({"api_url": "http://a/patroni", "state": "running", "role": "replica"})),
            Member::new("b", json!({"api_url": "http://b/patroni", "state": "stopped"})),
            Member::new(
                "c",
                json!({"api_url": "http://c/patroni", "state": "running", "tags": {"nofailover": true}}),
            ),
        ];
        let statuses = ha.fetch_nodes_statuses(&members);
        assert_eq!(statuses[0].failover_limitation(), None);
        assert_eq!(statuses[1].failover_limitation(), Some("not reachable"));
        assert_eq!(statuses[2].failover_limitation(), Some("not allowed to promote"));
    }

    #[test]
    fn test_failsafe() {
        let cluster = Cluster {
            config: Some(ClusterConfig::new(1, json!({"failsafe_mode": true}))),
            leader: Some("node2".into()),
            ..Default::default()
        };
        let ha = handle_with(Some(cluster));
        assert!(ha.is_failsafe_mode());
        assert_eq!(ha.update_failsafe(&json!({"node2": "http://b"})), None);
        assert!(!ha.failsafe_is_active());
        ha.snapshot.invalidate();
        assert!(ha.failsafe_is_active());
    }

    #[tokio::test]
    async fn test_next_actions_waits_for_work() {
        let ha = Arc::new(handle_with(None));
        let waiter = {
            let ha = Arc::clone(&ha);
            tokio::spawn(async move { ha.next_actions().await })
        };
        ha.reload();
        let actions = tokio::time::timeout(Duration::from_secs(5), waiter)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(actions, vec![HaAction::Reload]);
    }

    async fn wait_for_leader(snapshot: &SnapshotHandle, leader: &str) {
        tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                let current = snapshot.current();
                if current.as_ref().and_then(|c| c.leader_name()) == Some(leader) {
                    return;
                }
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn test_wakeup_cuts_refresh_wait_short() {
        let configured = |leader: &str| Cluster {
            config: Some(ClusterConfig::new(1, json!({"loop_wait": 30}))),
            leader: Some(leader.into()),
            ..Default::default()
        };
        let dcs = Arc::new(MemoryDcs::new(configured("node1")));
        let snapshot = Arc::new(SnapshotHandle::new());
        let shutdown = Arc::new(ShutdownSignal::new());
        let ha = Arc::new(StandaloneHa::new("node1", Arc::clone(&snapshot), Arc::clone(&shutdown)));
        let refresh = tokio::spawn(run_refresh_loop(
            dcs.clone(),
            Arc::clone(&snapshot),
            Arc::clone(&ha),
            Arc::clone(&shutdown),
        ));

        wait_for_leader(&snapshot, "node1").await;
        dcs.replace(configured("node2"));
        // Without the wakeup the next read is 30 seconds away.
        ha.wakeup();
        wait_for_leader(&snapshot, "node2").await;

        shutdown.trigger();
        tokio::time::timeout(Duration::from_secs(5), refresh)
            .await
            .unwrap()
            .unwrap();
    }

    #[test]
    fn test_shutdown_triggers_signal() {
        let ha = handle_with(None);
        ha.shutdown();
        assert!(ha.shutdown.is_triggered());
    }
}
