// src/core/ha/mod.rs

//! The decision core: one `run_cycle` call per control-loop tick, folding
//! one DCS read and the local database's observed state into exactly one
//! action. Every branch returns a human-readable status string describing
//! what it did — these strings are the primary thing tests assert on, the
//! same way an operator reads them from a log line.
//!
//! The rules are tried in order and the first match wins:
//! DCS reachability, system identifier, bootstrap, local recovery, executor
//! busy, manual failover, leader race (unlocked cluster), leader present
//! (locked cluster).

use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{error, info, warn};

use crate::config::TagsConfig;
use crate::core::cluster::{ClusterSnapshot, Member};
use crate::core::dcs::Dcs;
use crate::core::database::{DatabaseAdapter, Role};
use crate::core::executor::{ActionKind, AsyncExecutor};
use crate::core::metrics;
use crate::core::peer::PeerProbe;

/// Why a node did or did not win the healthiest-node check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Healthiness {
    Healthiest,
    NotAllowedToPromote,
    NotHealthiest,
}

/// One node's supervision loop: wires together the DCS, the local database
/// adapter, the peer probe, and the async executor into the decision
/// function described above.
pub struct Ha {
    name: String,
    ttl_secs: u64,
    api_url: Option<String>,
    tags: TagsConfig,
    dcs: Arc<dyn Dcs>,
    database: Arc<dyn DatabaseAdapter>,
    executor: Arc<AsyncExecutor>,
    peer_probe: Arc<dyn PeerProbe>,
    cluster: Mutex<Option<ClusterSnapshot>>,
    last_acted_failover_index: Mutex<u64>,
    exit_on_sysid_mismatch: bool,
}

impl Ha {
    pub fn new(
        name: impl Into<String>,
        ttl_secs: u64,
        api_url: Option<String>,
        tags: TagsConfig,
        dcs: Arc<dyn Dcs>,
        database: Arc<dyn DatabaseAdapter>,
        executor: Arc<AsyncExecutor>,
        peer_probe: Arc<dyn PeerProbe>,
    ) -> Self {
        Self {
            name: name.into(),
            ttl_secs,
            api_url,
            tags,
            dcs,
            database,
            executor,
            peer_probe,
            cluster: Mutex::new(None),
            last_acted_failover_index: Mutex::new(0),
            exit_on_sysid_mismatch: true,
        }
    }

    /// Disables the `process::exit` on a system identifier mismatch,
    /// returning a status string instead. Used by tests that exercise the
    /// mismatch branch without killing the test process.
    pub fn with_exit_on_sysid_mismatch(mut self, exit: bool) -> Self {
        self.exit_on_sysid_mismatch = exit;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn has_lock(&self, cluster: &ClusterSnapshot) -> bool {
        cluster.leader_name() == Some(self.name.as_str())
    }

    /// Upserts this node's own member record ahead of every decision.
    pub async fn touch_member(&self) {
        let xlog = self.database.xlog_position().await;
        let mut member = Member::new(0, self.name.clone(), self.ttl_secs, self.database.connection_string())
            .with_xlog_position(xlog);
        if let Some(api_url) = &self.api_url {
            member = member.with_api_url(api_url.clone());
        }
        if self.tags.nofailover {
            member = member.with_tag("nofailover", "true");
        }
        if let Some(replicatefrom) = &self.tags.replicatefrom {
            member = member.with_tag("replicatefrom", replicatefrom.clone());
        }
        if self.tags.clonefrom {
            member = member.with_tag("clonefrom", "true");
        }

        if !self.dcs.touch_member(&member).await {
            warn!(member = %self.name, "failed to refresh member lease");
        }
    }

    /// Runs one full decision cycle and returns the status string
    /// describing the action taken.
    pub async fn run_cycle(&self) -> String {
        metrics::CYCLES_TOTAL.inc();
        self.touch_member().await;

        let cluster = match self.dcs.get_cluster().await {
            Ok(cluster) => {
                *self.cluster.lock() = Some(cluster.clone());
                cluster
            }
            Err(e) => {
                metrics::DCS_ERRORS_TOTAL.inc();
                warn!(error = %e, "DCS read failed");
                if self.database.role().await == Role::Primary {
                    let _ = self.database.demote().await;
                    metrics::DEMOTIONS_TOTAL.inc();
                    return "demoted self because DCS is not accessible and i was a leader".to_string();
                }
                return format!("DCS is not accessible: {e}");
            }
        };

        if let Some(status) = self.check_system_identifier(&cluster).await {
            return status;
        }

        if self.database.data_directory_empty().await {
            return self.bootstrap(&cluster).await;
        }

        if !self.database.is_running().await || !self.database.is_healthy().await {
            return self.recover(&cluster).await;
        }

        if self.executor.busy_noncancellable() {
            return self.handle_busy(&cluster).await;
        }

        if let Some(status) = self.handle_manual_failover(&cluster).await {
            return status;
        }

        metrics::IS_PRIMARY.set(if self.database.role().await == Role::Primary { 1.0 } else { 0.0 });

        if cluster.is_unlocked() {
            self.leader_race(&cluster).await
        } else {
            self.leader_present(&cluster).await
        }
    }

    async fn check_system_identifier(&self, cluster: &ClusterSnapshot) -> Option<String> {
        let marker = cluster.initialize.as_ref()?;
        let Ok(sysid) = self.database.sysid().await else {
            return None;
        };
        if &sysid == marker {
            return None;
        }

        error!(local = %sysid, marker = %marker, "system identifier mismatch");
        if self.exit_on_sysid_mismatch {
            std::process::exit(1);
        }
        Some("halting: local system identifier does not match the cluster initialize marker".to_string())
    }

    async fn bootstrap(&self, cluster: &ClusterSnapshot) -> String {
        if cluster.leader.is_some() {
            return self.bootstrap_from_leader(cluster);
        }

        if cluster.initialize.is_none() {
            return self.bootstrap_new_cluster(cluster).await;
        }

        if self.database.can_create_replica_without_leader().await {
            return self.bootstrap_without_leader(cluster);
        }

        "waiting for leader to bootstrap".to_string()
    }

    fn bootstrap_from_leader(&self, cluster: &ClusterSnapshot) -> String {
        let database = self.database.clone();
        let cluster = cluster.clone();
        let scheduled = self.executor.run_async(ActionKind::Bootstrap, false, move |_token| async move {
            if let Err(e) = database.bootstrap(&cluster).await {
                warn!(error = %e, "bootstrap from leader failed");
            }
        });
        if scheduled {
            "trying to bootstrap from leader".to_string()
        } else {
            format!("{} already in progress", self.executor.scheduled_action().unwrap())
        }
    }

    fn bootstrap_without_leader(&self, cluster: &ClusterSnapshot) -> String {
        let database = self.database.clone();
        let cluster = cluster.clone();
        let scheduled = self.executor.run_async(ActionKind::Bootstrap, false, move |_token| async move {
            if let Err(e) = database.bootstrap(&cluster).await {
                warn!(error = %e, "bootstrap without leader failed");
            }
        });
        if scheduled {
            "trying to bootstrap without leader".to_string()
        } else {
            format!("{} already in progress", self.executor.scheduled_action().unwrap())
        }
    }

    async fn bootstrap_new_cluster(&self, cluster: &ClusterSnapshot) -> String {
        let sysid = self.database.sysid().await.unwrap_or_else(|_| "unknown".to_string());
        if !self.dcs.initialize(&sysid).await {
            return "failed to acquire initialize lock".to_string();
        }

        let database = self.database.clone();
        let dcs = self.dcs.clone();
        let cluster = cluster.clone();
        let scheduled = self.executor.run_async(ActionKind::Bootstrap, false, move |_token| async move {
            if let Err(e) = database.bootstrap(&cluster).await {
                warn!(error = %e, "cluster initialization failed, unwinding initialize lock");
                dcs.cancel_initialization().await;
            }
        });
        if scheduled {
            "initialized a new cluster".to_string()
        } else {
            "bootstrap already in progress".to_string()
        }
    }

    async fn recover(&self, cluster: &ClusterSnapshot) -> String {
        let has_lock = self.has_lock(cluster);
        let _ = self.database.start().await;
        match self.post_recover(has_lock).await {
            Some(status) => status,
            None if has_lock => "started as readonly because i had the session lock".to_string(),
            None => "started as a secondary".to_string(),
        }
    }

    /// Re-checks the outcome of a start attempt. Returns `None` when the
    /// database is up; `Some(status)` otherwise, tearing down a held lease
    /// so some other node can take over.
    async fn post_recover(&self, has_lock: bool) -> Option<String> {
        if self.database.is_running().await {
            return None;
        }
        if has_lock {
            self.dcs.delete_leader(&self.name).await;
            Some("removed leader key after trying and failing to start postgres".to_string())
        } else {
            Some("failed to start postgres".to_string())
        }
    }

    async fn handle_busy(&self, cluster: &ClusterSnapshot) -> String {
        if cluster.is_unlocked() {
            return "not healthy enough for leader race".to_string();
        }

        let action = self.executor.scheduled_action().expect("busy_noncancellable implies a scheduled action");
        if self.has_lock(cluster) {
            if self.dcs.update_leader(&self.name, self.ttl_secs).await {
                format!("updated leader lock during {action}")
            } else {
                format!("failed to update leader lock during {action}")
            }
        } else {
            format!("{action} in progress")
        }
    }

    /// Consumes a pending failover request directed away from this node
    /// while it holds the lock. Returns `None` when the request doesn't
    /// concern this node as leader, leaving normal leader-present handling
    /// to run. `last_acted_failover_index` guards against re-demoting on a
    /// failover key that lingers in the store after it already fired once.
    async fn handle_manual_failover(&self, cluster: &ClusterSnapshot) -> Option<String> {
        let failover = cluster.failover.as_ref()?;
        if failover.index != 0 && failover.index <= *self.last_acted_failover_index.lock() {
            return None;
        }
        if !self.has_lock(cluster) {
            return None;
        }

        let directed_away = failover.from_member.as_deref() == Some(self.name.as_str())
            || (failover.to_member.is_some() && failover.to_member.as_deref() != Some(self.name.as_str()));
        if !directed_away {
            return None;
        }

        if let Some(target_name) = failover.to_member.as_deref() {
            let target = cluster.get_member(target_name)?;
            let status = self.peer_probe.probe(target).await;
            if !status.reachable || status.nofailover() {
                info!(target = %target_name, "manual failover target is not ready, staying leader");
                return None;
            }
        }

        let _ = self.database.demote().await;
        self.dcs.delete_leader(&self.name).await;
        self.dcs.manual_failover(None, None).await;
        *self.last_acted_failover_index.lock() = failover.index;
        metrics::DEMOTIONS_TOTAL.inc();
        Some("manual failover: demoting myself".to_string())
    }

    /// Clears a failover request naming this node as the promotion target
    /// once it has actually won the race it asked for, so the request
    /// doesn't linger in the DCS and re-fire on a later cycle (spec.md §3:
    /// "consumed (deleted) by the winner upon completion").
    async fn clear_consumed_failover(&self, cluster: &ClusterSnapshot) {
        let Some(failover) = cluster.failover.as_ref() else {
            return;
        };
        if failover.to_member.as_deref() != Some(self.name.as_str()) {
            return;
        }
        self.dcs.manual_failover(None, None).await;
        *self.last_acted_failover_index.lock() = failover.index;
    }

    /// Whether this node is the right one to win an empty leader key: no
    /// `nofailover` tag, acceptable replication lag, and caught up with (or
    /// ahead of) every reachable peer that's also in recovery. Ties break
    /// in favor of the lexicographically smaller member name, so exactly
    /// one node wins a simultaneous tie across any interleaving.
    async fn healthiness(&self, cluster: &ClusterSnapshot) -> Healthiness {
        if self.tags.nofailover {
            return Healthiness::NotAllowedToPromote;
        }
        if !self.database.check_replication_lag(cluster.last_xlog).await {
            return Healthiness::NotHealthiest;
        }

        let local_xlog = self.database.xlog_position().await;
        for peer in cluster.members.iter().filter(|m| m.name != self.name) {
            if peer.api_url.is_none() {
                continue;
            }
            let status = self.peer_probe.probe(peer).await;
            if !status.reachable || status.nofailover() || !status.in_recovery {
                continue;
            }
            if local_xlog < status.xlog_location {
                return Healthiness::NotHealthiest;
            }
            if local_xlog == status.xlog_location && peer.name < self.name {
                return Healthiness::NotHealthiest;
            }
        }
        Healthiness::Healthiest
    }

    async fn leader_race(&self, cluster: &ClusterSnapshot) -> String {
        let was_primary = self.database.role().await == Role::Primary;

        match self.healthiness(cluster).await {
            Healthiness::Healthiest => {
                if self.dcs.attempt_to_acquire_leader(&self.name, self.ttl_secs).await {
                    self.clear_consumed_failover(cluster).await;
                    if was_primary {
                        "acquired session lock as a leader".to_string()
                    } else {
                        let _ = self.database.promote().await;
                        metrics::FAILOVERS_INITIATED_TOTAL.inc();
                        "promoted self to leader by acquiring session lock".to_string()
                    }
                } else {
                    if was_primary {
                        let _ = self.database.demote().await;
                        metrics::DEMOTIONS_TOTAL.inc();
                    }
                    self.follow_current_leader(cluster).await;
                    "following new leader after trying and failing to obtain lock".to_string()
                }
            }
            Healthiness::NotAllowedToPromote => {
                "following a different leader because I am not allowed to promote".to_string()
            }
            Healthiness::NotHealthiest if was_primary => {
                let _ = self.database.demote().await;
                metrics::DEMOTIONS_TOTAL.inc();
                "demoting self because i am not the healthiest node".to_string()
            }
            Healthiness::NotHealthiest => "following a different leader because i am not the healthiest node".to_string(),
        }
    }

    async fn leader_present(&self, cluster: &ClusterSnapshot) -> String {
        let role = self.database.role().await;

        if self.has_lock(cluster) {
            if self.dcs.update_leader(&self.name, self.ttl_secs).await {
                if role == Role::Primary {
                    "no action.  i am the leader with the lock".to_string()
                } else {
                    let _ = self.database.promote().await;
                    "promoted self to leader because i had the session lock".to_string()
                }
            } else {
                let _ = self.database.demote().await;
                metrics::DEMOTIONS_TOTAL.inc();
                "demoting self because i do not have the lock and i was a leader".to_string()
            }
        } else if role == Role::Primary {
            let _ = self.database.demote().await;
            metrics::DEMOTIONS_TOTAL.inc();
            "demoting self because i do not have the lock and i was a leader".to_string()
        } else {
            self.follow_current_leader(cluster).await;
            "no action.  i am a secondary and i am following a leader".to_string()
        }
    }

    /// Picks the connection to follow: the cluster leader, unless this
    /// node's `replicatefrom` tag names a reachable peer to cascade from
    /// instead. Only reconfigures replication when `check_recovery_conf`
    /// says the target actually changed, so a steady-state follower
    /// doesn't rewrite its recovery configuration every single cycle.
    async fn follow_current_leader(&self, cluster: &ClusterSnapshot) {
        let Some(leader) = &cluster.leader else {
            return;
        };
        let target = match self.tags.replicatefrom.as_deref().and_then(|name| cluster.get_member(name)) {
            Some(preferred) if self.peer_probe.probe(preferred).await.reachable => preferred.connection_url.as_str(),
            _ => leader.member.connection_url.as_str(),
        };
        if self.database.check_recovery_conf(target).await {
            return;
        }
        if let Err(e) = self.database.follow_the_leader(target).await {
            warn!(error = %e, "failed to reconfigure replication target");
        }
    }

    /// Accepted only when this node is a replica without the lock. Stops
    /// the database and wipes its data directory so the next cycle
    /// re-enters the bootstrap path.
    pub async fn schedule_reinitialize(&self) -> bool {
        if self.database.role().await != Role::Replica {
            return false;
        }
        let has_lock = self
            .cluster
            .lock()
            .as_ref()
            .map(|c| self.has_lock(c))
            .unwrap_or(false);
        if has_lock {
            return false;
        }

        let database = self.database.clone();
        self.executor.run_async(ActionKind::Reinitialize, true, move |token| async move {
            if token.is_cancelled() {
                return;
            }
            if let Err(e) = database.reinitialize().await {
                warn!(error = %e, "reinitialize failed");
            }
        })
    }

    /// Restarts the database synchronously, refusing if a reinitialize is
    /// already in flight or the executor is otherwise busy. Mirrors the
    /// `(accepted, status)` shape an admin API restart handler would need.
    pub async fn restart(&self) -> (bool, &'static str) {
        if self.executor.scheduled_action() == Some(ActionKind::Reinitialize) {
            return (false, "reinitialize already in progress");
        }
        if self.executor.schedule(ActionKind::Restart, false).is_some() {
            return (false, "restart conflicts with already running action");
        }

        let result = self.database.restart().await;
        self.executor.clear(ActionKind::Restart);
        match result {
            Ok(()) => (true, "restarted successfully"),
            Err(_) => (false, "restart failed"),
        }
    }
}
