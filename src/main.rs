// src/main.rs

//! The entry point for the `warden` supervisor process. One instance runs
//! next to each database node, reads its own configuration, and drives the
//! HA control loop against whatever DCS backend the configuration names.

use std::env;

use tracing::error;
use tracing_subscriber::{filter::EnvFilter, prelude::*};
use warden::config::{DcsConfig, SupervisorConfig};

#[tokio::main]
async fn main() {
    const VERSION: &str = env!("CARGO_PKG_VERSION");

    let args: Vec<String> = env::args().collect();

    if args.contains(&"--version".to_string()) {
        println!("warden {VERSION}");
        return;
    }

    let config_path = args
        .iter()
        .position(|arg| arg == "--config")
        .and_then(|i| args.get(i + 1))
        .map(|s| s.as_str())
        .unwrap_or("warden.toml");

    let config = match SupervisorConfig::from_env() {
        Some(result) => result,
        None => SupervisorConfig::from_file(config_path).await,
    };
    let config = match config {
        Ok(config) => config,
        Err(e) => {
            eprintln!("failed to load configuration from \"{config_path}\": {e}");
            std::process::exit(1);
        }
    };

    let log_level = env::var("RUST_LOG").unwrap_or_else(|_| format!("{},warden::core::ha=debug", config.log_level));
    tracing_subscriber::registry()
        .with(EnvFilter::new(log_level))
        .with(tracing_subscriber::fmt::layer().compact().with_ansi(true))
        .init();

    if let Err(e) = run(config).await {
        error!("supervisor exited with an error: {e}");
        std::process::exit(1);
    }
}

/// Wires the configured DCS backend and the supervisor loop together. The
/// etcd and ZooKeeper wire drivers are external collaborators this crate
/// specifies only by the `Dcs` trait contract; embedding this crate as a
/// library with a concrete `Dcs`/`DatabaseAdapter` pair is how a real
/// deployment runs the loop end to end.
async fn run(config: SupervisorConfig) -> anyhow::Result<()> {
    match &config.dcs {
        DcsConfig::Etcd { host, port, .. } => {
            anyhow::bail!(
                "no etcd driver is bundled with this build (configured at {host}:{port}); \
                 embed `warden` as a library and supply a `Dcs` implementation"
            )
        }
        DcsConfig::Zookeeper { hosts, .. } => {
            anyhow::bail!(
                "no ZooKeeper driver is bundled with this build (configured hosts: {hosts:?}); \
                 embed `warden` as a library and supply a `Dcs` implementation"
            )
        }
    }
}
