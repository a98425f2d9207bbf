//! Property-based tests for the universal guarantees in spec.md §8, run
//! against the in-memory reference `Dcs` and the configurable database
//! test double, the way the teacher's `tests/property/*.rs` suite drives
//! its own invariants through `proptest!` rather than example-by-example.

use std::sync::Arc;

use proptest::prelude::*;

use warden::config::TagsConfig;
use warden::core::cluster::Member;
use warden::core::database::Role;
use warden::core::database::mock::MockAdapter;
use warden::core::dcs::Dcs;
use warden::core::dcs::memory::MemoryDcs;
use warden::core::executor::AsyncExecutor;
use warden::core::peer::{PeerProbe, PeerStatus};
use warden::ha::Ha;

struct UnreachableProbe;

#[async_trait::async_trait]
impl PeerProbe for UnreachableProbe {
    async fn probe(&self, _member: &Member) -> PeerStatus {
        PeerStatus::unreachable()
    }
}

fn ha_for(name: &str, tags: TagsConfig, dcs: Arc<dyn Dcs>, database: Arc<MockAdapter>) -> Ha {
    Ha::new(
        name,
        30,
        Some(format!("http://{name}/")),
        tags,
        dcs,
        database,
        Arc::new(AsyncExecutor::new()),
        Arc::new(UnreachableProbe),
    )
    .with_exit_on_sysid_mismatch(false)
}

fn rt() -> tokio::runtime::Runtime {
    tokio::runtime::Runtime::new().unwrap()
}

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 64,
        ..ProptestConfig::default()
    })]

    // Property 1: across any interleaving of two nodes' run_cycle calls on
    // the same cluster, at most one ends a cycle believing itself primary
    // while the DCS lease names it as leader.
    #[test]
    fn uniqueness_of_leadership(turns in prop::collection::vec(any::<bool>(), 1..40)) {
        rt().block_on(async {
            let dcs: Arc<dyn Dcs> = Arc::new(MemoryDcs::new());
            assert!(dcs.initialize("sysid-0").await);

            let db_a = Arc::new(MockAdapter::named("node-a", "postgres://node-a"));
            let db_b = Arc::new(MockAdapter::named("node-b", "postgres://node-b"));
            let ha_a = ha_for("node-a", TagsConfig::default(), dcs.clone(), db_a.clone());
            let ha_b = ha_for("node-b", TagsConfig::default(), dcs.clone(), db_b.clone());

            for take_a in turns {
                if take_a {
                    ha_a.run_cycle().await;
                } else {
                    ha_b.run_cycle().await;
                }

                let both_primary = db_a.state_role().await == Role::Primary
                    && db_b.state_role().await == Role::Primary;
                prop_assert!(!both_primary, "both nodes believe they are primary simultaneously");

                let snap = dcs.get_cluster().await.unwrap();
                if let Some(name) = snap.leader_name() {
                    // Whichever node holds the lease, the other must not
                    // also consider itself primary at the same instant.
                    let other_is_primary = if name == "node-a" {
                        db_b.state_role().await == Role::Primary
                    } else {
                        db_a.state_role().await == Role::Primary
                    };
                    prop_assert!(!other_is_primary);
                }
            }
            Ok(())
        })?;
    }

    // Property 2: calling run_cycle twice on an unchanging steady-state
    // cluster (this node is primary and holds the lease, no other writers)
    // yields the same status string both times.
    #[test]
    fn idempotent_snapshot_decisions(ttl in 20u64..120) {
        rt().block_on(async {
            let dcs: Arc<dyn Dcs> = Arc::new(MemoryDcs::new());
            assert!(dcs.initialize("sysid-0").await);
            assert!(dcs.attempt_to_acquire_leader("node-a", ttl).await);

            let db = Arc::new(MockAdapter::named("node-a", "postgres://node-a"));
            db.configure(|s| s.role = Role::Primary);
            let ha = ha_for("node-a", TagsConfig::default(), dcs, db);

            let first = ha.run_cycle().await;
            let second = ha.run_cycle().await;
            prop_assert_eq!(first, second);
            prop_assert_eq!(ha.run_cycle().await, "no action.  i am the leader with the lock");
            Ok(())
        })?;
    }

    // Property 3: a primary that loses update_leader (someone else now
    // owns the lease) demotes within the very next cycle.
    #[test]
    fn lease_loss_demotes_within_one_cycle(other_name in "[a-z]{3,10}") {
        prop_assume!(other_name != "node-a");
        rt().block_on(async {
            let dcs: Arc<dyn Dcs> = Arc::new(MemoryDcs::new());
            assert!(dcs.initialize("sysid-0").await);
            // Someone else holds the lease while this node still believes
            // it is primary (e.g. after a stale restart).
            assert!(dcs.attempt_to_acquire_leader(&other_name, 30).await);

            let db = Arc::new(MockAdapter::named("node-a", "postgres://node-a"));
            db.configure(|s| s.role = Role::Primary);
            let ha = ha_for("node-a", TagsConfig::default(), dcs, db.clone());

            let status = ha.run_cycle().await;
            prop_assert_eq!(status, "demoting self because i do not have the lock and i was a leader");
            prop_assert_eq!(db.state_role().await, Role::Replica);
            Ok(())
        })?;
    }

    // Property 5: when `replicatefrom` names a healthy member, the
    // follower's recovery target is that member; otherwise it falls back
    // to the current leader.
    #[test]
    fn replicatefrom_preference_prefers_healthy_named_peer(use_cascade_peer in any::<bool>()) {
        rt().block_on(async {
            let dcs: Arc<dyn Dcs> = Arc::new(MemoryDcs::new());
            assert!(dcs.initialize("sysid-0").await);
            assert!(dcs.attempt_to_acquire_leader("leader1", 30).await);
            dcs.touch_member(&Member::new(0, "leader1", 30, "postgres://leader1")).await;
            dcs.touch_member(&Member::new(0, "cascade1", 30, "postgres://cascade1").with_api_url("http://cascade1/")).await;

            let db = Arc::new(MockAdapter::named("follower1", "postgres://follower1"));
            let tags = if use_cascade_peer {
                TagsConfig { replicatefrom: Some("cascade1".to_string()), ..Default::default() }
            } else {
                TagsConfig::default()
            };

            struct ReachableCascade;
            #[async_trait::async_trait]
            impl PeerProbe for ReachableCascade {
                async fn probe(&self, member: &Member) -> PeerStatus {
                    if member.name == "cascade1" {
                        PeerStatus { reachable: true, in_recovery: true, xlog_location: 0, tags: Default::default() }
                    } else {
                        PeerStatus::unreachable()
                    }
                }
            }

            let ha = Ha::new(
                "follower1",
                30,
                Some("http://follower1/".to_string()),
                tags,
                dcs,
                db.clone(),
                Arc::new(AsyncExecutor::new()),
                Arc::new(ReachableCascade),
            )
            .with_exit_on_sysid_mismatch(false);

            ha.run_cycle().await;
            let calls = db.calls();
            let last_follow = calls.iter().rev().find(|c| c.starts_with("follow:"));
            let expected = if use_cascade_peer {
                "follow:postgres://cascade1"
            } else {
                "follow:postgres://leader1"
            };
            prop_assert_eq!(last_follow.map(String::as_str), Some(expected));
            Ok(())
        })?;
    }
}

trait RoleExt {
    async fn state_role(&self) -> Role;
}

impl RoleExt for MockAdapter {
    async fn state_role(&self) -> Role {
        use warden::core::database::DatabaseAdapter;
        self.role().await
    }
}
