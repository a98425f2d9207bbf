// src/core/errors.rs

//! Defines the primary error type for the supervisor core.

use std::sync::Arc;
use thiserror::Error;

/// The main error enum, representing all possible failures within the core.
/// Using `thiserror` allows for clean error definitions and automatic `From`
/// trait implementations.
#[derive(Error, Debug)]
pub enum WardenError {
    /// The distributed configuration store is unreachable or returned an
    /// unparseable response. Never fatal: the caller preserves the prior
    /// snapshot and re-derives intent next cycle.
    #[error("DCS error: {0}")]
    Dcs(String),

    /// A database control operation failed.
    #[error("database error: {0}")]
    Database(String),

    /// A peer REST probe failed. The peer is treated as unreachable for
    /// this cycle only.
    #[error("peer probe error: {0}")]
    PeerProbe(String),

    /// The local system identifier disagrees with the `initialize` marker.
    /// Fatal: the process must exit with a nonzero status.
    #[error("system identifier mismatch: local={local} initialize_marker={marker}")]
    SystemIdMismatch { local: String, marker: String },

    #[error("IO error: {0}")]
    Io(Arc<std::io::Error>),

    #[error("JSON error: {0}")]
    Json(Arc<serde_json::Error>),

    #[error("TOML error: {0}")]
    Toml(String),

    #[error("configuration error: {0}")]
    Config(String),
}

impl Clone for WardenError {
    fn clone(&self) -> Self {
        match self {
            WardenError::Dcs(s) => WardenError::Dcs(s.clone()),
            WardenError::Database(s) => WardenError::Database(s.clone()),
            WardenError::PeerProbe(s) => WardenError::PeerProbe(s.clone()),
            WardenError::SystemIdMismatch { local, marker } => WardenError::SystemIdMismatch {
                local: local.clone(),
                marker: marker.clone(),
            },
            WardenError::Io(e) => WardenError::Io(Arc::clone(e)),
            WardenError::Json(e) => WardenError::Json(Arc::clone(e)),
            WardenError::Toml(s) => WardenError::Toml(s.clone()),
            WardenError::Config(s) => WardenError::Config(s.clone()),
        }
    }
}

impl From<std::io::Error> for WardenError {
    fn from(e: std::io::Error) -> Self {
        WardenError::Io(Arc::new(e))
    }
}

impl From<serde_json::Error> for WardenError {
    fn from(e: serde_json::Error) -> Self {
        WardenError::Json(Arc::new(e))
    }
}

impl From<toml::de::Error> for WardenError {
    fn from(e: toml::de::Error) -> Self {
        WardenError::Toml(e.to_string())
    }
}

impl From<reqwest::Error> for WardenError {
    fn from(e: reqwest::Error) -> Self {
        WardenError::PeerProbe(e.to_string())
    }
}
