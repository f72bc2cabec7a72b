//! Bring replica content in sync and replicas onto their ideal nodes.
//!
//! Both problems are fixed with a single merge across the ideal nodes and
//! every node currently holding a replica. Replicas on non-ideal nodes take
//! part as sources only, so the merge also acts as a move.

use crate::bucket_db::copies_in_sync;
use crate::cluster::NodeState;
use crate::maintenance::MaintenancePriority;
use crate::operation::{MergeNode, OperationKind};
use crate::state_checker::{
    merge_node_indexes, OperationPlan, Reason, StateCheckerContext, StateCheckerResult,
};

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SynchronizeAndMoveStateChecker;

impl SynchronizeAndMoveStateChecker {
    pub const NAME: &'static str = "SynchronizeAndMove";

    pub fn check(&self, c: &mut StateCheckerContext<'_>) -> StateCheckerResult {
        if c.is_inconsistently_split() {
            return StateCheckerResult::no_maintenance_needed();
        }

        let copy_count = c.entry.copies.len();
        // Only replicas that can take part in the merge count for sync.
        let live_copies = c
            .entry
            .copies
            .iter()
            .filter(|copy| c.node_state(copy.node).may_hold_replicas())
            .collect::<Vec<_>>();
        let out_of_sync = live_copies.len() > 1 && !copies_in_sync(live_copies.iter().copied());
        let missing_on = c
            .ideal_state
            .iter()
            .copied()
            .filter(|node| !c.entry.has_copy_on(*node))
            .collect::<Vec<_>>();
        if !out_of_sync && missing_on.is_empty() {
            return StateCheckerResult::no_maintenance_needed();
        }

        let mut nodes = c
            .ideal_state
            .iter()
            .map(|index| MergeNode {
                index: *index,
                source_only: false,
            })
            .collect::<Vec<_>>();
        let mut moving_from = Vec::new();
        for copy in &c.entry.copies {
            if c.is_ideal(copy.node) || !c.node_state(copy.node).may_hold_replicas() {
                continue;
            }
            nodes.push(MergeNode {
                index: copy.node,
                source_only: true,
            });
            moving_from.push(copy.node);
        }

        let sources = nodes
            .iter()
            .map(|n| n.index)
            .filter(|node| c.entry.has_copy_on(*node))
            .collect::<Vec<_>>();
        let has_up_source = sources
            .iter()
            .any(|node| c.node_state(*node) == NodeState::Up);
        if !has_up_source || nodes.len() < 2 {
            tracing::trace!(
                bucket = %c.bucket,
                participants = nodes.len(),
                "bucket needs merge but has no usable source replica"
            );
            return StateCheckerResult::no_maintenance_needed();
        }

        let too_few_copies = copy_count < c.redundancy();
        let (priority, message_priority) = if too_few_copies && copy_count == 1 {
            (
                MaintenancePriority::VeryHigh,
                c.priorities().merge_too_few_copies,
            )
        } else if too_few_copies {
            (MaintenancePriority::High, c.priorities().merge_too_few_copies)
        } else if out_of_sync {
            (
                MaintenancePriority::High,
                c.priorities().merge_out_of_sync_copies,
            )
        } else {
            (
                MaintenancePriority::Low,
                c.priorities().merge_move_to_ideal_node,
            )
        };

        for node in &missing_on {
            c.stats.inc_copying_in(*node);
        }
        if !missing_on.is_empty() {
            for node in &sources {
                c.stats.inc_copying_out(*node);
            }
        }
        if out_of_sync {
            for copy in &live_copies {
                c.stats.inc_syncing(copy.node);
            }
        }
        for node in &moving_from {
            c.stats.inc_moving_out(*node);
        }

        StateCheckerResult::new(
            priority,
            OperationPlan {
                bucket: c.bucket,
                nodes: merge_node_indexes(&nodes),
                kind: OperationKind::Merge { nodes },
                priority: message_priority,
                reason: Reason::Synchronize {
                    out_of_sync,
                    too_few_copies,
                    missing_on,
                    moving_from,
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

    const CHECKER: StateChecker = StateChecker::SynchronizeAndMove(SynchronizeAndMoveStateChecker);

    fn bucket() -> BucketId {
        BucketId::new(16, 0x42)
    }

    fn merge_nodes(result: StateCheckerResult) -> Vec<MergeNode> {
        let op = result.create_operation().expect("merge operation");
        match op.kind() {
            OperationKind::Merge { nodes } => nodes.clone(),
            other => panic!("unexpected kind: {other:?}"),
        }
    }

    #[test]
    fn in_sync_replicas_on_ideal_nodes_need_nothing() {
        let mut f = Fixture::new(bucket(), vec![]);
        let ideal = f.ideal();
        f.entries = vec![entry(
            bucket(),
            ideal.iter().map(|n| copy(*n, 7, 10, 100)).collect(),
        )];
        assert!(!f.run(CHECKER).requires_maintenance());
        assert!(f.stats.is_empty());
    }

    #[test]
    fn single_replica_is_copied_with_very_high_priority() {
        let mut f = Fixture::new(bucket(), vec![]);
        let ideal = f.ideal();
        f.entries = vec![entry(bucket(), vec![copy(ideal[0], 7, 10, 100)])];

        let result = f.run(CHECKER);
        assert_eq!(result.priority(), MaintenancePriority::VeryHigh);
        let nodes = merge_nodes(result);
        assert_eq!(
            nodes.iter().map(|n| n.index).collect::<Vec<_>>(),
            ideal
        );
        assert!(nodes.iter().all(|n| !n.source_only));
        assert_eq!(f.stats.node_stats(ideal[1]).copying_in, 1);
        assert_eq!(f.stats.node_stats(ideal[0]).copying_out, 1);
    }

    #[test]
    fn diverging_checksums_are_synchronized() {
        let mut f = Fixture::new(bucket(), vec![]);
        let ideal = f.ideal();
        f.entries = vec![entry(
            bucket(),
            vec![copy(ideal[0], 1, 10, 100), copy(ideal[1], 2, 11, 110)],
        )];

        let result = f.run(CHECKER);
        assert_eq!(result.priority(), MaintenancePriority::High);
        let op = result.create_operation().expect("merge operation");
        assert_eq!(op.priority(), 120);
        assert!(op
            .detailed_reason()
            .starts_with("[Synchronizing buckets with different checksums"));
        assert_eq!(f.stats.node_stats(ideal[0]).syncing, 1);
        assert_eq!(f.stats.node_stats(ideal[1]).syncing, 1);
    }

    #[test]
    fn replica_on_non_ideal_node_is_moved_as_source_only() {
        let mut f = Fixture::new(bucket(), vec![]);
        let ideal = f.ideal();
        let stray = f.non_ideal()[0];
        f.entries = vec![entry(
            bucket(),
            vec![copy(ideal[0], 7, 10, 100), copy(stray, 7, 10, 100)],
        )];

        let result = f.run(CHECKER);
        assert_eq!(result.priority(), MaintenancePriority::Low);
        let nodes = merge_nodes(result);
        assert_eq!(nodes.len(), 3);
        assert_eq!(
            nodes.last(),
            Some(&MergeNode {
                index: stray,
                source_only: true
            })
        );
        assert_eq!(f.stats.node_stats(stray).moving_out, 1);
    }

    #[test]
    fn diverging_replica_on_down_node_is_ignored() {
        let mut f = Fixture::new(bucket(), vec![]);
        let ideal = f.ideal();
        let stray = f.non_ideal()[0];
        f.cluster_state
            .set_node_state(NodeType::Storage, stray, NodeState::Down);
        f.entries = vec![entry(
            bucket(),
            vec![
                copy(ideal[0], 7, 10, 100),
                copy(ideal[1], 7, 10, 100),
                copy(stray, 9, 12, 120),
            ],
        )];
        assert!(!f.run(CHECKER).requires_maintenance());
        assert!(f.stats.is_empty());
    }

    #[test]
    fn no_merge_without_a_replica_on_an_up_node() {
        let mut f = Fixture::new(bucket(), vec![]);
        let lost = f.ideal()[0];
        f.cluster_state
            .set_node_state(NodeType::Storage, lost, NodeState::Down);
        f.entries = vec![entry(bucket(), vec![copy(lost, 7, 10, 100)])];
        assert!(!f.run(CHECKER).requires_maintenance());
        assert!(f.stats.is_empty());
    }

    #[test]
    fn inconsistently_split_buckets_are_skipped() {
        let mut f = Fixture::new(bucket(), vec![copy(0, 1, 1, 1)]);
        f.entries
            .push(entry(bucket().child(false), vec![copy(1, 2, 1, 1)]));
        assert!(!f.run(CHECKER).requires_maintenance());
    }
}
