// src/core/database/mod.rs

//! The database control adapter: the interface the HA core depends on to
//! introspect and drive the local database instance. The concrete adapter
//! (process start/stop, role introspection, replication configuration,
//! bootstrap) is an external collaborator; only the trait and a test
//! double live here.

pub mod mock;

use crate::core::cluster::ClusterSnapshot;
use crate::core::errors::WardenError;
use async_trait::async_trait;
use std::collections::HashMap;

/// The local database's current role.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Primary,
    Replica,
    Uninitialized,
}

/// Operations the HA core depends on. Transitions may be long-running and
/// are invoked through the async executor rather than awaited inline on
/// the control loop.
#[async_trait]
pub trait DatabaseAdapter: Send + Sync {
    fn name(&self) -> &str;
    fn connection_string(&self) -> &str;

    async fn sysid(&self) -> Result<String, WardenError>;

    async fn is_running(&self) -> bool;
    async fn is_healthy(&self) -> bool;
    async fn is_leader(&self) -> bool;
    async fn role(&self) -> Role;

    async fn xlog_position(&self) -> u64;
    async fn last_operation(&self) -> u64;
    async fn check_replication_lag(&self, leader_position: u64) -> bool;

    async fn bootstrap(&self, cluster: &ClusterSnapshot) -> Result<(), WardenError>;
    async fn follow_the_leader(&self, leader_connection_url: &str) -> Result<(), WardenError>;
    async fn promote(&self) -> Result<(), WardenError>;
    async fn demote(&self) -> Result<(), WardenError>;
    async fn restart(&self) -> Result<(), WardenError>;
    async fn start(&self) -> Result<(), WardenError>;
    async fn stop(&self, checkpoint: bool) -> Result<(), WardenError>;

    /// Stops the database and wipes the data directory, so the next cycle
    /// re-enters the bootstrap path from a clean slate.
    async fn reinitialize(&self) -> Result<(), WardenError>;

    async fn controldata(&self) -> HashMap<String, String>;
    async fn data_directory_empty(&self) -> bool;
    async fn can_create_replica_without_leader(&self) -> bool;
    async fn check_recovery_conf(&self, leader_connection_url: &str) -> bool;
}
