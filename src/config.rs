// src/config.rs

//! Loads and validates the supervisor's configuration as a
//! `serde`-deserializable TOML document: node identity, HA timing,
//! promotion tags, the DCS backend, the admin API listen address, and
//! adapter-specific settings passed through opaquely.

use std::time::Duration;

use serde::Deserialize;
use tokio::fs;

use crate::core::errors::WardenError;

const CONFIGURATION_ENV_VAR: &str = "WARDEN_CONFIGURATION";

#[derive(Debug, Clone, Deserialize, Default)]
pub struct TagsConfig {
    #[serde(default)]
    pub nofailover: bool,
    pub replicatefrom: Option<String>,
    #[serde(default)]
    pub clonefrom: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DcsConfig {
    Etcd {
        host: String,
        port: u16,
        #[serde(with = "humantime_serde")]
        ttl: Duration,
        scope: String,
    },
    Zookeeper {
        hosts: Vec<String>,
        scope: String,
    },
}

#[derive(Debug, Clone, Deserialize)]
pub struct RestApiConfig {
    pub listen: String,
    pub connect_address: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SupervisorConfig {
    /// This node's member name, advertised under `members/<name>`.
    pub name: String,

    /// Seconds between HA cycles.
    #[serde(with = "humantime_serde", default = "default_loop_wait")]
    pub loop_wait: Duration,

    /// Leader-lease TTL in seconds. Must be at least `2 * loop_wait`.
    #[serde(with = "humantime_serde", default = "default_ttl")]
    pub ttl: Duration,

    #[serde(default)]
    pub tags: TagsConfig,

    pub dcs: DcsConfig,

    pub restapi: RestApiConfig,

    /// Adapter-specific configuration, opaque to this core.
    #[serde(default)]
    pub postgresql: Option<toml::Value>,

    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_loop_wait() -> Duration {
    Duration::from_secs(10)
}

fn default_ttl() -> Duration {
    Duration::from_secs(30)
}

fn default_log_level() -> String {
    "info".to_string()
}

impl SupervisorConfig {
    /// Loads configuration from a TOML file on disk.
    pub async fn from_file(path: &str) -> Result<Self, WardenError> {
        let content = fs::read_to_string(path)
            .await
            .map_err(|e| WardenError::Config(format!("reading {path}: {e}")))?;
        Self::from_toml_str(&content)
    }

    /// Loads configuration from the `WARDEN_CONFIGURATION` environment
    /// variable, if set.
    pub fn from_env() -> Option<Result<Self, WardenError>> {
        std::env::var(CONFIGURATION_ENV_VAR)
            .ok()
            .map(|content| Self::from_toml_str(&content))
    }

    fn from_toml_str(content: &str) -> Result<Self, WardenError> {
        let config: SupervisorConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), WardenError> {
        if self.ttl < self.loop_wait * 2 {
            return Err(WardenError::Config(format!(
                "ttl ({:?}) must be at least 2x loop_wait ({:?})",
                self.ttl, self.loop_wait
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_ttl_shorter_than_twice_loop_wait() {
        let toml = r#"
            name = "node1"
            loop_wait = "10s"
            ttl = "15s"

            [dcs.etcd]
            host = "127.0.0.1"
            port = 2379
            ttl = "30s"
            scope = "mycluster"

            [restapi]
            listen = "0.0.0.0:8008"
            connect_address = "127.0.0.1:8008"
        "#;
        let err = SupervisorConfig::from_toml_str(toml).unwrap_err();
        assert!(matches!(err, WardenError::Config(_)));
    }

    #[test]
    fn accepts_valid_etcd_config() {
        let toml = r#"
            name = "node1"
            loop_wait = "10s"
            ttl = "30s"

            [tags]
            nofailover = true

            [dcs.etcd]
            host = "127.0.0.1"
            port = 2379
            ttl = "30s"
            scope = "mycluster"

            [restapi]
            listen = "0.0.0.0:8008"
            connect_address = "127.0.0.1:8008"
        "#;
        let config = SupervisorConfig::from_toml_str(toml).unwrap();
        assert_eq!(config.name, "node1");
        assert!(config.tags.nofailover);
    }
}
