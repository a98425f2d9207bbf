// src/core/database/mock.rs

//! A configurable test double for `DatabaseAdapter`: every observable
//! behavior is a field the test can override before calling `run_cycle`.

use super::{DatabaseAdapter, Role};
use crate::core::cluster::ClusterSnapshot;
use crate::core::errors::WardenError;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;

#[derive(Debug, Clone)]
pub struct MockState {
    pub sysid: String,
    pub role: Role,
    pub is_running: bool,
    pub is_healthy: bool,
    pub is_leader: bool,
    pub xlog_position: u64,
    pub last_operation: u64,
    pub check_replication_lag: bool,
    pub data_directory_empty: bool,
    pub can_create_replica_without_leader: bool,
    pub check_recovery_conf: bool,
    pub bootstrap_succeeds: bool,
    pub follow_succeeds: bool,
    pub promote_succeeds: bool,
    pub demote_succeeds: bool,
    pub restart_succeeds: bool,
    pub start_succeeds: bool,
    pub controldata: HashMap<String, String>,
    pub calls: Vec<String>,
}

impl Default for MockState {
    fn default() -> Self {
        Self {
            sysid: "sysid-0".to_string(),
            role: Role::Replica,
            is_running: true,
            is_healthy: true,
            is_leader: true,
            xlog_position: 0,
            last_operation: 0,
            check_replication_lag: true,
            data_directory_empty: false,
            can_create_replica_without_leader: false,
            check_recovery_conf: false,
            bootstrap_succeeds: true,
            follow_succeeds: true,
            promote_succeeds: true,
            demote_succeeds: true,
            restart_succeeds: true,
            start_succeeds: true,
            controldata: HashMap::new(),
            calls: Vec::new(),
        }
    }
}

/// A `DatabaseAdapter` driven entirely by test-configured state.
pub struct MockAdapter {
    pub name: String,
    pub connection_string: String,
    pub state: Mutex<MockState>,
}

impl MockAdapter {
    pub fn new() -> Self {
        Self::named("postgresql0", "postgres://foo@bar/postgres")
    }

    pub fn named(name: impl Into<String>, connection_string: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            connection_string: connection_string.into(),
            state: Mutex::new(MockState::default()),
        }
    }

    pub fn with_state(name: impl Into<String>, connection_string: impl Into<String>, state: MockState) -> Self {
        Self {
            name: name.into(),
            connection_string: connection_string.into(),
            state: Mutex::new(state),
        }
    }

    /// Mutates the mock's configuration in place, returning the new state.
    pub fn configure(&self, f: impl FnOnce(&mut MockState)) {
        f(&mut self.state.lock());
    }

    pub fn calls(&self) -> Vec<String> {
        self.state.lock().calls.clone()
    }

    fn record(&self, call: &str) {
        self.state.lock().calls.push(call.to_string());
    }
}

impl Default for MockAdapter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DatabaseAdapter for MockAdapter {
    fn name(&self) -> &str {
        &self.name
    }

    fn connection_string(&self) -> &str {
        &self.connection_string
    }

    async fn sysid(&self) -> Result<String, WardenError> {
        Ok(self.state.lock().sysid.clone())
    }

    async fn is_running(&self) -> bool {
        self.state.lock().is_running
    }

    async fn is_healthy(&self) -> bool {
        self.state.lock().is_healthy
    }

    async fn is_leader(&self) -> bool {
        self.state.lock().is_leader
    }

    async fn role(&self) -> Role {
        self.state.lock().role
    }

    async fn xlog_position(&self) -> u64 {
        self.state.lock().xlog_position
    }

    async fn last_operation(&self) -> u64 {
        self.state.lock().last_operation
    }

    async fn check_replication_lag(&self, _leader_position: u64) -> bool {
        self.state.lock().check_replication_lag
    }

    async fn bootstrap(&self, _cluster: &ClusterSnapshot) -> Result<(), WardenError> {
        self.record("bootstrap");
        if self.state.lock().bootstrap_succeeds {
            let mut state = self.state.lock();
            state.role = Role::Primary;
            state.data_directory_empty = false;
            Ok(())
        } else {
            Err(WardenError::Database("bootstrap failed".to_string()))
        }
    }

    async fn follow_the_leader(&self, leader_connection_url: &str) -> Result<(), WardenError> {
        self.record(&format!("follow:{leader_connection_url}"));
        if self.state.lock().follow_succeeds {
            self.state.lock().role = Role::Replica;
            Ok(())
        } else {
            Err(WardenError::Database("follow failed".to_string()))
        }
    }

    async fn promote(&self) -> Result<(), WardenError> {
        self.record("promote");
        if self.state.lock().promote_succeeds {
            self.state.lock().role = Role::Primary;
            Ok(())
        } else {
            Err(WardenError::Database("promote failed".to_string()))
        }
    }

    async fn demote(&self) -> Result<(), WardenError> {
        self.record("demote");
        if self.state.lock().demote_succeeds {
            self.state.lock().role = Role::Replica;
            Ok(())
        } else {
            Err(WardenError::Database("demote failed".to_string()))
        }
    }

    async fn restart(&self) -> Result<(), WardenError> {
        self.record("restart");
        if self.state.lock().restart_succeeds {
            Ok(())
        } else {
            Err(WardenError::Database("restart failed".to_string()))
        }
    }

    async fn start(&self) -> Result<(), WardenError> {
        self.record("start");
        let succeeds = self.state.lock().start_succeeds;
        if succeeds {
            self.state.lock().is_running = true;
            self.state.lock().is_healthy = true;
            Ok(())
        } else {
            Err(WardenError::Database("failed to start database".to_string()))
        }
    }

    async fn stop(&self, _checkpoint: bool) -> Result<(), WardenError> {
        self.record("stop");
        self.state.lock().is_running = false;
        Ok(())
    }

    async fn reinitialize(&self) -> Result<(), WardenError> {
        self.record("reinitialize");
        let mut state = self.state.lock();
        state.is_running = false;
        state.data_directory_empty = true;
        state.role = Role::Uninitialized;
        Ok(())
    }

    async fn controldata(&self) -> HashMap<String, String> {
        self.state.lock().controldata.clone()
    }

    async fn data_directory_empty(&self) -> bool {
        self.state.lock().data_directory_empty
    }

    async fn can_create_replica_without_leader(&self) -> bool {
        self.state.lock().can_create_replica_without_leader
    }

    async fn check_recovery_conf(&self, _leader_connection_url: &str) -> bool {
        self.state.lock().check_recovery_conf
    }
}
