// src/core/peer/mod.rs

//! The peer REST probe: `GET <api_url>` against another member's admin API
//! surface. The admin API server side is an external collaborator — this
//! is only the client side the HA core uses to ask a peer "are you up, and
//! how far along is your WAL?"

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;

use crate::core::cluster::Member;

/// The short timeout used for peer probes: a few seconds, so one
/// unreachable peer never stalls a decision cycle.
pub const PROBE_TIMEOUT: Duration = Duration::from_secs(3);

/// The result of probing a peer's admin API.
#[derive(Debug, Clone, PartialEq)]
pub struct PeerStatus {
    pub reachable: bool,
    pub in_recovery: bool,
    pub xlog_location: u64,
    pub tags: HashMap<String, String>,
}

impl PeerStatus {
    pub fn unreachable() -> Self {
        Self {
            reachable: false,
            in_recovery: false,
            xlog_location: 0,
            tags: HashMap::new(),
        }
    }

    pub fn nofailover(&self) -> bool {
        self.tags
            .get("nofailover")
            .map(|v| v.eq_ignore_ascii_case("true"))
            .unwrap_or(false)
    }
}

#[derive(Debug, Deserialize)]
struct ApiXlog {
    location: u64,
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    state: String,
    role: String,
    xlog: ApiXlog,
    #[serde(default)]
    tags: HashMap<String, String>,
}

/// Abstraction over the peer probe so the HA core's decision tests don't
/// need a real network.
#[async_trait]
pub trait PeerProbe: Send + Sync {
    async fn probe(&self, member: &Member) -> PeerStatus;
}

/// The real, `reqwest`-backed peer probe.
pub struct HttpPeerProbe {
    client: reqwest::Client,
}

impl HttpPeerProbe {
    pub fn new() -> Self {
        let client = reqwest::Client::builder()
            .timeout(PROBE_TIMEOUT)
            .build()
            .expect("failed to build peer probe HTTP client");
        Self { client }
    }
}

impl Default for HttpPeerProbe {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PeerProbe for HttpPeerProbe {
    async fn probe(&self, member: &Member) -> PeerStatus {
        let Some(api_url) = member.api_url.as_deref() else {
            return PeerStatus::unreachable();
        };

        let response = match self.client.get(api_url).send().await {
            Ok(resp) if resp.status().is_success() => resp,
            _ => return PeerStatus::unreachable(),
        };

        match response.json::<ApiResponse>().await {
            Ok(body) => PeerStatus {
                reachable: true,
                in_recovery: body.role != "master" && body.role != "primary",
                xlog_location: body.xlog.location,
                tags: body.tags,
            },
            Err(_) => PeerStatus::unreachable(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unreachable_has_no_tags_and_is_not_in_recovery() {
        let status = PeerStatus::unreachable();
        assert!(!status.reachable);
        assert!(!status.in_recovery);
        assert!(!status.nofailover());
    }

    #[test]
    fn nofailover_tag_is_case_insensitive() {
        let mut status = PeerStatus::unreachable();
        status.tags.insert("nofailover".to_string(), "TRUE".to_string());
        assert!(status.nofailover());
    }
}
