// src/core/dcs/mod.rs

//! The abstract contract of the distributed configuration store. This is a
//! capability set, not a concrete protocol — an etcd/ZooKeeper wire driver
//! implementing it is an external collaborator; only the `MemoryDcs`
//! reference implementation lives here, for tests.

pub mod memory;

use crate::core::cluster::{ClusterSnapshot, Member};
use crate::core::errors::WardenError;
use async_trait::async_trait;

/// Capability set exposed by a distributed configuration store: atomic
/// key operations, TTL leases, and change notification.
///
/// All write operations are idempotent under retry in the sense that a
/// repeated write with the same semantic intent yields the same end state
/// or a benign failure. Callers treat any `false` result as "did not
/// happen" and re-derive their intent next cycle rather than retrying
/// inline.
#[async_trait]
pub trait Dcs: Send + Sync {
    /// One atomic read returning the full cluster snapshot.
    async fn get_cluster(&self) -> Result<ClusterSnapshot, WardenError>;

    /// Upserts this node's own member record with a TTL. Returns `false`
    /// only on store failure.
    async fn touch_member(&self, member: &Member) -> bool;

    /// Create-if-absent on the `leader` key with the given TTL (seconds).
    async fn attempt_to_acquire_leader(&self, name: &str, ttl: u64) -> bool;

    /// Refresh the lease. Fails if the key does not exist or is owned by
    /// someone else.
    async fn update_leader(&self, name: &str, ttl: u64) -> bool;

    /// Unconditional set, used immediately after winning the initialize
    /// race so the bootstrapping node is visible as leader right away.
    async fn take_leader(&self, name: &str, ttl: u64) -> bool;

    /// Create-if-absent on the `initialize` key.
    async fn initialize(&self, sysid: &str) -> bool;

    /// Deletes the `initialize` key (used to unwind a failed bootstrap).
    async fn cancel_initialization(&self) -> bool;

    /// Writes the failover request key.
    async fn set_failover_value(&self, from: Option<&str>, to: Option<&str>) -> bool;

    /// Performs (or clears, when both are empty) a manual failover request.
    async fn manual_failover(&self, from: Option<&str>, to: Option<&str>) -> bool;

    /// Compare-and-delete the `leader` key, owned by the calling node.
    async fn delete_leader(&self, name: &str) -> bool;

    /// Blocks up to `timeout_secs` seconds; returns `true` iff the store
    /// signaled a change to any watched key during that window.
    async fn watch(&self, timeout_secs: u64) -> bool;
}
