// src/core/metrics.rs

//! Defines and registers Prometheus metrics for supervisor monitoring.
//!
//! Uses `lazy_static` so metrics are registered only once globally for the
//! process lifetime. Exposing these over HTTP is left to the caller (the
//! served REST surface is out of scope for this core); `prometheus::gather`
//! can be used by an embedding binary to scrape the default registry.

use lazy_static::lazy_static;
use prometheus::{Counter, Gauge, register_counter, register_gauge};

lazy_static! {
    /// 1 if this node currently believes it is the primary, 0 otherwise.
    pub static ref IS_PRIMARY: Gauge =
        register_gauge!("warden_is_primary", "Whether this node is currently the primary (1) or not (0).").unwrap();

    /// Total number of HA decision cycles run by this node.
    pub static ref CYCLES_TOTAL: Counter =
        register_counter!("warden_cycles_total", "Total number of run_cycle invocations.").unwrap();

    /// Total number of failovers this node has initiated (won a leader race).
    pub static ref FAILOVERS_INITIATED_TOTAL: Counter =
        register_counter!("warden_failovers_initiated_total", "Total number of times this node promoted itself to leader.").unwrap();

    /// Total number of times this node demoted itself.
    pub static ref DEMOTIONS_TOTAL: Counter =
        register_counter!("warden_demotions_total", "Total number of self-demotions.").unwrap();

    /// Total number of DCS read/write failures observed.
    pub static ref DCS_ERRORS_TOTAL: Counter =
        register_counter!("warden_dcs_errors_total", "Total number of DCS operation failures.").unwrap();
}
