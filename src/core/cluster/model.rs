// src/core/cluster/model.rs

//! Plain value types produced by one atomic DCS read (`Dcs::get_cluster`)
//! and treated as immutable by everything downstream. No in-place mutation:
//! tests that need a different snapshot call one of the `with_*` builder
//! methods, which return a new `ClusterSnapshot`.

use std::collections::HashMap;

/// A member advertises itself under `members/<name>` with a TTL lease.
#[derive(Debug, Clone, PartialEq)]
pub struct Member {
    pub index: u64,
    pub name: String,
    pub ttl: u64,
    pub connection_url: String,
    pub api_url: Option<String>,
    pub xlog_position: Option<u64>,
    pub tags: HashMap<String, String>,
}

impl Member {
    pub fn new(index: u64, name: impl Into<String>, ttl: u64, connection_url: impl Into<String>) -> Self {
        Self {
            index,
            name: name.into(),
            ttl,
            connection_url: connection_url.into(),
            api_url: None,
            xlog_position: None,
            tags: HashMap::new(),
        }
    }

    pub fn with_api_url(mut self, api_url: impl Into<String>) -> Self {
        self.api_url = Some(api_url.into());
        self
    }

    pub fn with_xlog_position(mut self, xlog: u64) -> Self {
        self.xlog_position = Some(xlog);
        self
    }

    pub fn with_tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.insert(key.into(), value.into());
        self
    }

    /// A member never promotes itself while this tag is set.
    pub fn nofailover(&self) -> bool {
        self.tags
            .get("nofailover")
            .map(|v| v.eq_ignore_ascii_case("true"))
            .unwrap_or(false)
    }

    /// Cascading replication preference: the member name this node would
    /// rather follow, if healthy, instead of the cluster leader directly.
    pub fn replicatefrom(&self) -> Option<&str> {
        self.tags.get("replicatefrom").map(String::as_str)
    }

    /// Whether this member is an eligible source for base backups.
    pub fn clonefrom(&self) -> bool {
        self.tags
            .get("clonefrom")
            .map(|v| v.eq_ignore_ascii_case("true"))
            .unwrap_or(false)
    }
}

/// Ownership of the `leader` DCS key names the cluster's primary.
#[derive(Debug, Clone, PartialEq)]
pub struct Leader {
    pub index: u64,
    pub ttl: u64,
    pub member: Member,
}

impl Leader {
    pub fn name(&self) -> &str {
        &self.member.name
    }
}

/// A failover request. Either field may be empty: `to` alone means
/// "promote this member"; `from` alone means "if the current leader is
/// this member, step down"; both mean a directed handoff.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Failover {
    pub index: u64,
    pub from_member: Option<String>,
    pub to_member: Option<String>,
}

impl Failover {
    pub fn new(index: u64, from_member: Option<String>, to_member: Option<String>) -> Self {
        Self {
            index,
            from_member,
            to_member,
        }
    }
}

/// One atomic read of the entire cluster state, produced by `Dcs::get_cluster`.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ClusterSnapshot {
    /// System identifier recorded by the `initialize` marker, if the
    /// cluster has ever been bootstrapped.
    pub initialize: Option<String>,
    pub leader: Option<Leader>,
    pub last_xlog: u64,
    pub members: Vec<Member>,
    pub failover: Option<Failover>,
}

impl ClusterSnapshot {
    pub fn new(
        initialize: Option<String>,
        leader: Option<Leader>,
        last_xlog: u64,
        members: Vec<Member>,
        failover: Option<Failover>,
    ) -> Self {
        Self {
            initialize,
            leader,
            last_xlog,
            members,
            failover,
        }
    }

    /// Returns a copy of this snapshot with a different leader.
    pub fn with_leader(&self, leader: Option<Leader>) -> Self {
        Self {
            leader,
            ..self.clone()
        }
    }

    /// Returns a copy of this snapshot with a different failover request.
    pub fn with_failover(&self, failover: Option<Failover>) -> Self {
        Self {
            failover,
            ..self.clone()
        }
    }

    /// Returns a copy of this snapshot with the `initialize` marker set.
    pub fn with_initialize(&self, initialize: Option<String>) -> Self {
        Self {
            initialize,
            ..self.clone()
        }
    }

    /// True when no member currently holds the `leader` key.
    pub fn is_unlocked(&self) -> bool {
        self.leader.is_none()
    }

    /// Whether a member with the given name is present in this snapshot.
    pub fn has_member(&self, name: &str) -> bool {
        self.members.iter().any(|m| m.name == name)
    }

    /// Looks up a member by name.
    pub fn get_member(&self, name: &str) -> Option<&Member> {
        self.members.iter().find(|m| m.name == name)
    }

    /// The name of the current leader, if locked.
    pub fn leader_name(&self) -> Option<&str> {
        self.leader.as_ref().map(|l| l.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn member(name: &str) -> Member {
        Member::new(0, name, 30, format!("postgres://{name}"))
    }

    #[test]
    fn is_unlocked_reflects_leader_field() {
        let snap = ClusterSnapshot::new(None, None, 0, vec![], None);
        assert!(snap.is_unlocked());

        let leader = Leader {
            index: 1,
            ttl: 30,
            member: member("a"),
        };
        let locked = snap.with_leader(Some(leader));
        assert!(!locked.is_unlocked());
    }

    #[test]
    fn member_lookup() {
        let snap = ClusterSnapshot::new(None, None, 0, vec![member("a"), member("b")], None);
        assert!(snap.has_member("a"));
        assert!(!snap.has_member("z"));
        assert_eq!(snap.get_member("b").unwrap().name, "b");
    }

    #[test]
    fn tag_helpers() {
        let m = member("a").with_tag("nofailover", "True").with_tag("replicatefrom", "b");
        assert!(m.nofailover());
        assert_eq!(m.replicatefrom(), Some("b"));
        assert!(!m.clonefrom());
    }

    #[test]
    fn builder_does_not_mutate_original() {
        let snap = ClusterSnapshot::new(None, None, 0, vec![], None);
        let with_init = snap.with_initialize(Some("sysid-1".to_string()));
        assert!(snap.initialize.is_none());
        assert_eq!(with_init.initialize.as_deref(), Some("sysid-1"));
    }
}
