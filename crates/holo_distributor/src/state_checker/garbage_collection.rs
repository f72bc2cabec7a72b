//! Periodic removal of expired documents.

use crate::cluster::NodeState;
use crate::maintenance::MaintenancePriority;
use crate::operation::OperationKind;
use crate::state_checker::{OperationPlan, Reason, StateCheckerContext, StateCheckerResult};

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct GarbageCollectionStateChecker;

impl GarbageCollectionStateChecker {
    pub const NAME: &'static str = "GarbageCollection";

    pub fn check(&self, c: &mut StateCheckerContext<'_>) -> StateCheckerResult {
        let interval = c.config.garbage_collection_interval_secs;
        let max_mutations = c.config.garbage_collection_max_mutations;
        if interval == 0 && max_mutations == 0 {
            return StateCheckerResult::no_maintenance_needed();
        }

        let secs_since_last = c.now_unix_secs.saturating_sub(c.entry.last_gc_unix_secs);
        let mutations = c.entry.mutations_since_gc;
        let overdue = interval > 0 && secs_since_last > interval;
        let too_many_mutations = max_mutations > 0 && mutations > max_mutations;
        if !overdue && !too_many_mutations {
            return StateCheckerResult::no_maintenance_needed();
        }

        let nodes = c
            .entry
            .nodes()
            .filter(|node| c.node_state(*node) == NodeState::Up)
            .collect::<Vec<_>>();
        if nodes.is_empty() {
            return StateCheckerResult::no_maintenance_needed();
        }

        StateCheckerResult::new(
            MaintenancePriority::VeryLow,
            OperationPlan {
                bucket: c.bucket,
                nodes,
                kind: OperationKind::GarbageCollection,
                priority: c.priorities().garbage_collection,
                reason: Reason::GarbageCollection {
                    secs_since_last,
                    mutations,
                },
            },
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bucket::BucketId;
    use crate::cluster::NodeType;
    use crate::state_checker::test_support::{copy, entry, Fixture};
    use crate::state_checker::StateChecker;

    const CHECKER: StateChecker = StateChecker::GarbageCollection(GarbageCollectionStateChecker);

    fn fixture(last_gc: u64, mutations: u64) -> Fixture {
        let bucket = BucketId::new(16, 8);
        let mut f = Fixture::new(bucket, vec![]);
        let mut e = entry(bucket, vec![copy(0, 1, 1, 1), copy(1, 1, 1, 1)]);
        e.last_gc_unix_secs = last_gc;
        e.mutations_since_gc = mutations;
        f.entries = vec![e];
        f
    }

    #[test]
    fn disabled_by_default() {
        let mut f = fixture(0, 1_000);
        assert!(!f.run(CHECKER).requires_maintenance());
    }

    #[test]
    fn overdue_bucket_is_collected_on_up_nodes() {
        let mut f = fixture(1_000_000 - 7_200, 0);
        f.config.garbage_collection_interval_secs = 3_600;
        f.cluster_state
            .set_node_state(NodeType::Storage, 1, NodeState::Retired);

        let result = f.run(CHECKER);
        assert_eq!(result.priority(), MaintenancePriority::VeryLow);
        let op = result.create_operation().expect("gc operation");
        assert_eq!(op.nodes(), &[0]);
        assert_eq!(op.priority(), 200);
        assert!(op.detailed_reason().contains("7200 seconds ago"));
    }

    #[test]
    fn recently_collected_bucket_is_left_alone() {
        let mut f = fixture(1_000_000 - 60, 0);
        f.config.garbage_collection_interval_secs = 3_600;
        assert!(!f.run(CHECKER).requires_maintenance());
    }

    #[test]
    fn mutation_budget_triggers_collection() {
        let mut f = fixture(1_000_000, 51);
        f.config.garbage_collection_max_mutations = 50;
        assert!(f.run(CHECKER).requires_maintenance());

        f.entries[0].mutations_since_gc = 50;
        assert!(!f.run(CHECKER).requires_maintenance());
    }
}
