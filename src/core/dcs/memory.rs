// src/core/dcs/memory.rs

//! A deterministic, in-process `Dcs` implementation. Not a production
//! driver — it exists so the HA core and the supervisor loop can be tested
//! without a real etcd/ZooKeeper cluster, the way the teacher exercises its
//! replication logic against an in-process client rather than a live peer.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::Notify;

use super::Dcs;
use crate::core::cluster::{ClusterSnapshot, Failover, Leader, Member};
use crate::core::errors::WardenError;

struct LeaseEntry {
    value: String,
    expires_at: Instant,
}

impl LeaseEntry {
    fn is_expired(&self) -> bool {
        Instant::now() >= self.expires_at
    }
}

struct Inner {
    leader: Option<LeaseEntry>,
    initialize: Option<String>,
    members: HashMap<String, Member>,
    failover: Option<Failover>,
    next_index: u64,
    last_xlog: u64,
    /// When set, `get_cluster` returns this error instead of a snapshot —
    /// lets tests simulate a DCS outage (spec.md §4.5 item 1 / S6).
    unreachable: bool,
}

/// An in-memory reference `Dcs`. Cheap to clone (wraps an `Arc` internally
/// via `Mutex` + `Notify` held by value, so share it behind an `Arc` to
/// simulate multiple nodes observing the same store).
pub struct MemoryDcs {
    inner: Mutex<Inner>,
    notify: Notify,
}

impl Default for MemoryDcs {
    fn default() -> Self {
        Self {
            inner: Mutex::new(Inner {
                leader: None,
                initialize: None,
                members: HashMap::new(),
                failover: None,
                next_index: 1,
                last_xlog: 0,
                unreachable: false,
            }),
            notify: Notify::new(),
        }
    }
}

impl MemoryDcs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Test hook: force subsequent `get_cluster` calls to fail, simulating
    /// an unreachable store.
    pub fn set_unreachable(&self, unreachable: bool) {
        self.inner.lock().unreachable = unreachable;
    }

    /// Test hook: set the cluster's last known leader xlog position.
    pub fn set_last_xlog(&self, xlog: u64) {
        self.inner.lock().last_xlog = xlog;
    }

    fn next_index(inner: &mut Inner) -> u64 {
        let idx = inner.next_index;
        inner.next_index += 1;
        idx
    }

    fn notify_change(&self) {
        self.notify.notify_waiters();
    }
}

#[async_trait]
impl Dcs for MemoryDcs {
    async fn get_cluster(&self) -> Result<ClusterSnapshot, WardenError> {
        let inner = self.inner.lock();
        if inner.unreachable {
            return Err(WardenError::Dcs("store unreachable".to_string()));
        }

        let mut members: Vec<Member> = inner.members.values().cloned().collect();
        members.sort_by(|a, b| a.name.cmp(&b.name));

        let leader = inner.leader.as_ref().and_then(|entry| {
            if entry.is_expired() {
                return None;
            }
            inner.members.get(&entry.value).map(|m| Leader {
                index: 0,
                ttl: entry.expires_at.saturating_duration_since(Instant::now()).as_secs(),
                member: m.clone(),
            })
        });

        Ok(ClusterSnapshot::new(
            inner.initialize.clone(),
            leader,
            inner.last_xlog,
            members,
            inner.failover.clone(),
        ))
    }

    async fn touch_member(&self, member: &Member) -> bool {
        let mut inner = self.inner.lock();
        inner.members.insert(member.name.clone(), member.clone());
        drop(inner);
        self.notify_change();
        true
    }

    async fn attempt_to_acquire_leader(&self, name: &str, ttl: u64) -> bool {
        let mut inner = self.inner.lock();
        let vacant = match &inner.leader {
            None => true,
            Some(entry) => entry.is_expired(),
        };
        if !vacant {
            return false;
        }
        inner.leader = Some(LeaseEntry {
            value: name.to_string(),
            expires_at: Instant::now() + Duration::from_secs(ttl),
        });
        drop(inner);
        self.notify_change();
        true
    }

    async fn update_leader(&self, name: &str, ttl: u64) -> bool {
        let mut inner = self.inner.lock();
        match &inner.leader {
            Some(entry) if !entry.is_expired() && entry.value == name => {
                inner.leader = Some(LeaseEntry {
                    value: name.to_string(),
                    expires_at: Instant::now() + Duration::from_secs(ttl),
                });
                true
            }
            _ => false,
        }
    }

    async fn take_leader(&self, name: &str, ttl: u64) -> bool {
        let mut inner = self.inner.lock();
        inner.leader = Some(LeaseEntry {
            value: name.to_string(),
            expires_at: Instant::now() + Duration::from_secs(ttl),
        });
        drop(inner);
        self.notify_change();
        true
    }

    async fn initialize(&self, sysid: &str) -> bool {
        let mut inner = self.inner.lock();
        if inner.initialize.is_some() {
            return false;
        }
        inner.initialize = Some(sysid.to_string());
        drop(inner);
        self.notify_change();
        true
    }

    async fn cancel_initialization(&self) -> bool {
        let mut inner = self.inner.lock();
        inner.initialize = None;
        drop(inner);
        self.notify_change();
        true
    }

    async fn set_failover_value(&self, from: Option<&str>, to: Option<&str>) -> bool {
        let mut inner = self.inner.lock();
        let index = Self::next_index(&mut inner);
        inner.failover = Some(Failover::new(
            index,
            from.map(str::to_string),
            to.map(str::to_string),
        ));
        drop(inner);
        self.notify_change();
        true
    }

    async fn manual_failover(&self, from: Option<&str>, to: Option<&str>) -> bool {
        if from.is_none() && to.is_none() {
            let mut inner = self.inner.lock();
            inner.failover = None;
            drop(inner);
            self.notify_change();
            return true;
        }
        self.set_failover_value(from, to).await
    }

    async fn delete_leader(&self, name: &str) -> bool {
        let mut inner = self.inner.lock();
        let owned_by_self = matches!(&inner.leader, Some(entry) if entry.value == name);
        if owned_by_self {
            inner.leader = None;
            drop(inner);
            self.notify_change();
            true
        } else {
            false
        }
    }

    async fn watch(&self, timeout_secs: u64) -> bool {
        let notified = self.notify.notified();
        tokio::select! {
            _ = notified => true,
            _ = tokio::time::sleep(Duration::from_secs(timeout_secs)) => false,
        }
    }
}
