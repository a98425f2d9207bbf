// src/core/executor/mod.rs

//! A single-slot async action serializer. Holds at most one scheduled
//! action at a time; the control loop never blocks on it. A small
//! `{idle, running(name, cancellable)}` state machine with `schedule` as
//! the compare-and-set primitive.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use tracing::warn;

/// The named kinds of long-running action the executor can hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionKind {
    Bootstrap,
    Restart,
    Reinitialize,
    Recover,
    Follow,
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ActionKind::Bootstrap => "bootstrap",
            ActionKind::Restart => "restart",
            ActionKind::Reinitialize => "reinitialize",
            ActionKind::Recover => "recover",
            ActionKind::Follow => "follow",
        };
        f.write_str(s)
    }
}

/// A cooperative cancellation flag handed to a scheduled action's closure.
/// Only actions that opted in as `cancellable` are expected to check it.
#[derive(Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }

    fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }
}

struct Slot {
    kind: ActionKind,
    cancellable: bool,
    token: CancelToken,
}

/// Holds at most one scheduled action of a named kind.
#[derive(Default)]
pub struct AsyncExecutor {
    slot: Mutex<Option<Slot>>,
}

impl AsyncExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Atomically sets the slot if empty. Returns the prior action's kind
    /// if the executor was already busy (the caller did not get the slot).
    pub fn schedule(&self, kind: ActionKind, cancellable: bool) -> Option<ActionKind> {
        let mut slot = self.slot.lock();
        if let Some(existing) = slot.as_ref() {
            return Some(existing.kind);
        }
        *slot = Some(Slot {
            kind,
            cancellable,
            token: CancelToken::default(),
        });
        None
    }

    /// Schedules `kind` and, if the slot was free, spawns `func` on a
    /// worker task. The slot is cleared unconditionally when `func`
    /// completes, regardless of whether it succeeded. Returns `true` if
    /// the action was actually scheduled and spawned.
    pub fn run_async<F, Fut>(self: &Arc<Self>, kind: ActionKind, cancellable: bool, func: F) -> bool
    where
        F: FnOnce(CancelToken) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let token = {
            let mut slot = self.slot.lock();
            if slot.is_some() {
                return false;
            }
            let token = CancelToken::default();
            *slot = Some(Slot {
                kind,
                cancellable,
                token: token.clone(),
            });
            token
        };

        let executor = Arc::clone(self);
        tokio::spawn(async move {
            func(token).await;
            let mut slot = executor.slot.lock();
            if matches!(slot.as_ref(), Some(s) if s.kind == kind) {
                *slot = None;
            }
        });
        true
    }

    /// Whether any action is currently scheduled.
    pub fn busy(&self) -> bool {
        self.slot.lock().is_some()
    }

    /// Whether a non-cancellable action is currently scheduled. The HA
    /// core's busy-path check only short-circuits on this, not on any
    /// busy slot, so a cancellable action still lets leader-race proceed.
    pub fn busy_noncancellable(&self) -> bool {
        matches!(self.slot.lock().as_ref(), Some(s) if !s.cancellable)
    }

    /// The currently scheduled action's kind, if any.
    pub fn scheduled_action(&self) -> Option<ActionKind> {
        self.slot.lock().as_ref().map(|s| s.kind)
    }

    /// Clears the slot if it still holds `kind`. Used by callers that run
    /// an action to completion synchronously rather than through
    /// `run_async`.
    pub fn clear(&self, kind: ActionKind) {
        let mut slot = self.slot.lock();
        if matches!(slot.as_ref(), Some(s) if s.kind == kind) {
            *slot = None;
        }
    }

    /// Best-effort cancellation: only honored if the scheduled action
    /// declared itself cancellable. Returns `true` if a cancel signal was
    /// actually delivered.
    pub fn cancel(&self) -> bool {
        let slot = self.slot.lock();
        match slot.as_ref() {
            Some(s) if s.cancellable => {
                s.token.cancel();
                true
            }
            Some(s) => {
                warn!(
                    "refusing to cancel non-cancellable action '{}'",
                    s.kind
                );
                false
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn schedule_is_exclusive() {
        let exec = AsyncExecutor::new();
        assert_eq!(exec.schedule(ActionKind::Bootstrap, false), None);
        assert_eq!(
            exec.schedule(ActionKind::Restart, false),
            Some(ActionKind::Bootstrap)
        );
        assert!(exec.busy());
    }

    #[tokio::test]
    async fn run_async_clears_slot_on_completion() {
        let exec = Arc::new(AsyncExecutor::new());
        let scheduled = exec.run_async(ActionKind::Restart, false, |_token| async {
            tokio::time::sleep(Duration::from_millis(5)).await;
        });
        assert!(scheduled);
        assert!(exec.busy());

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!exec.busy());
    }

    #[tokio::test]
    async fn run_async_refuses_when_busy() {
        let exec = Arc::new(AsyncExecutor::new());
        exec.schedule(ActionKind::Bootstrap, false);
        let scheduled = exec.run_async(ActionKind::Restart, false, |_token| async {});
        assert!(!scheduled);
    }

    #[test]
    fn cancel_only_honored_for_cancellable_actions() {
        let exec = AsyncExecutor::new();
        exec.schedule(ActionKind::Bootstrap, false);
        assert!(!exec.cancel());

        let exec2 = AsyncExecutor::new();
        exec2.schedule(ActionKind::Follow, true);
        assert!(exec2.cancel());
    }

    #[test]
    fn busy_noncancellable_distinguishes_cancellable_actions() {
        let exec = AsyncExecutor::new();
        exec.schedule(ActionKind::Recover, true);
        assert!(exec.busy());
        assert!(!exec.busy_noncancellable());
    }
}
