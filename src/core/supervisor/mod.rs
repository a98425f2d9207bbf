// src/core/supervisor/mod.rs

//! The process-level control loop wrapping the HA core: paces `run_cycle`
//! calls, reaps zombie children left behind by the database's forked
//! helpers, wakes early on a DCS change, and handles termination signals
//! with a best-effort graceful shutdown (release the lease if held, stop
//! the database without a checkpoint).

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::signal::unix::{SignalKind, signal};
use tokio::sync::broadcast;
use tracing::info;

use crate::core::database::{DatabaseAdapter, Role};
use crate::core::dcs::Dcs;
use crate::core::ha::Ha;

/// Reaps any zombie children left behind by the database forking helper
/// processes (spec.md §4.6). `waitpid` with `WNOHANG` never blocks, so this
/// drains every child that has already exited without waiting on any that
/// haven't; `pid < 0` means no children exist at all, `pid == 0` means none
/// have exited yet, and either ends the drain.
fn reap_zombie_children() {
    loop {
        let mut status: libc::c_int = 0;
        // SAFETY: WNOHANG makes this non-blocking; -1 reaps any child of
        // this process, not just ones we spawned ourselves.
        let pid = unsafe { libc::waitpid(-1, &mut status, libc::WNOHANG) };
        if pid <= 0 {
            break;
        }
    }
}

/// Waits for SIGTERM or SIGINT. Mirrors the teacher's connection-loop
/// shutdown wait, minus the Windows Ctrl-C branch this crate doesn't need.
async fn await_shutdown_signal() {
    let mut sigterm = signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");
    let mut sigint = signal(SignalKind::interrupt()).expect("failed to install SIGINT handler");
    tokio::select! {
        _ = sigterm.recv() => info!("SIGTERM received, shutting down"),
        _ = sigint.recv() => info!("SIGINT received, shutting down"),
    }
}

/// Runs one node's HA cycle on a timer until asked to stop.
pub struct Supervisor {
    name: String,
    ha: Arc<Ha>,
    dcs: Arc<dyn Dcs>,
    database: Arc<dyn DatabaseAdapter>,
    loop_wait: Duration,
    shutdown_tx: broadcast::Sender<()>,
}

impl Supervisor {
    pub fn new(
        name: impl Into<String>,
        ha: Arc<Ha>,
        dcs: Arc<dyn Dcs>,
        database: Arc<dyn DatabaseAdapter>,
        loop_wait: Duration,
    ) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        Self {
            name: name.into(),
            ha,
            dcs,
            database,
            loop_wait,
            shutdown_tx,
        }
    }

    /// A handle callers can use to trigger shutdown programmatically
    /// (tests, an admin API's `/shutdown` handler) instead of a signal.
    pub fn shutdown_handle(&self) -> broadcast::Sender<()> {
        self.shutdown_tx.clone()
    }

    /// Runs cycles until a termination signal arrives or the shutdown
    /// handle fires. Never returns `Err` on its own account; a cycle's
    /// fatal conditions (system identifier mismatch) exit the process
    /// directly from the HA core.
    pub async fn run(&self) {
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        loop {
            let cycle_start = Instant::now();
            let status = self.ha.run_cycle().await;
            info!(node = %self.name, status = %status, "cycle complete");
            reap_zombie_children();

            let sleep_for = self.loop_wait.saturating_sub(cycle_start.elapsed());

            tokio::select! {
                biased;
                _ = shutdown_rx.recv() => {
                    self.graceful_shutdown().await;
                    return;
                }
                _ = await_shutdown_signal() => {
                    self.graceful_shutdown().await;
                    return;
                }
                _ = self.wait_for_next_cycle(sleep_for) => {}
            }
        }
    }

    /// Sleeps up to `sleep_for`, waking early if the DCS reports a change.
    /// No catch-up: a cycle that overran `loop_wait` already consumed the
    /// whole budget, so the next one starts immediately rather than trying
    /// to make up lost time.
    async fn wait_for_next_cycle(&self, sleep_for: Duration) {
        if sleep_for.is_zero() {
            return;
        }
        self.dcs.watch(sleep_for.as_secs().max(1)).await;
    }

    async fn graceful_shutdown(&self) {
        info!(node = %self.name, "shutting down");
        if self.database.role().await == Role::Primary {
            self.dcs.delete_leader(&self.name).await;
        }
        if let Err(e) = self.database.stop(false).await {
            tracing::warn!(error = %e, "failed to stop database cleanly during shutdown");
        }
        info!(node = %self.name, "shutdown complete");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::cluster::Member;
    use crate::core::database::mock::MockAdapter;
    use crate::core::dcs::memory::MemoryDcs;
    use crate::core::executor::AsyncExecutor;
    use crate::core::peer::PeerProbe;
    use crate::core::peer::PeerStatus;

    #[test]
    fn reap_zombie_children_collects_an_exited_child() {
        let child = std::process::Command::new("true").spawn().expect("failed to spawn test child process");
        let pid = child.id() as libc::pid_t;

        // Give the child a moment to actually exit and become a zombie
        // before we try to reap it.
        std::thread::sleep(Duration::from_millis(50));
        reap_zombie_children();

        // A reaped zombie's pid is gone from the process table, so
        // signalling it with signal 0 now fails with ESRCH.
        let probe = unsafe { libc::kill(pid, 0) };
        assert_eq!(probe, -1);
        assert_eq!(std::io::Error::last_os_error().raw_os_error(), Some(libc::ESRCH));
    }

    struct UnreachableProbe;

    #[async_trait::async_trait]
    impl PeerProbe for UnreachableProbe {
        async fn probe(&self, _member: &Member) -> PeerStatus {
            PeerStatus::unreachable()
        }
    }

    #[tokio::test]
    async fn shutdown_handle_stops_the_loop_and_releases_the_lease() {
        let database = Arc::new(MockAdapter::named("node1", "postgres://node1"));
        database.configure(|s| s.role = Role::Primary);
        let dcs: Arc<dyn Dcs> = Arc::new(MemoryDcs::new());
        assert!(dcs.initialize("sysid-0").await);
        assert!(dcs.attempt_to_acquire_leader("node1", 30).await);

        let ha = Arc::new(Ha::new(
            "node1",
            30,
            Some("http://node1/".to_string()),
            crate::config::TagsConfig::default(),
            dcs.clone(),
            database.clone(),
            Arc::new(AsyncExecutor::new()),
            Arc::new(UnreachableProbe),
        ));

        let supervisor = Supervisor::new("node1", ha, dcs.clone(), database.clone(), Duration::from_millis(20));
        let shutdown = supervisor.shutdown_handle();

        let run = tokio::spawn(async move { supervisor.run().await });
        tokio::time::sleep(Duration::from_millis(5)).await;
        shutdown.send(()).unwrap();

        tokio::time::timeout(Duration::from_secs(1), run)
            .await
            .expect("supervisor did not stop promptly")
            .unwrap();

        assert!(database.calls().iter().any(|c| c == "stop"));
        let snap = dcs.get_cluster().await.unwrap();
        assert!(snap.is_unlocked());
    }
}
