//! State checkers: independent diagnostic rules over one bucket.
//!
//! Each checker inspects a `StateCheckerContext` and returns a
//! `StateCheckerResult`. A result that needs maintenance carries an
//! `OperationPlan` (a small tagged payload); the concrete
//! `IdealStateOperation`, reason text included, is only built when the caller
//! asks for it, so ranking many buckets does not allocate operations.
//!
//! The checker set is closed and dispatched through `StateChecker`. The
//! order of `StateChecker::default_chain` is also the tie-break order used by
//! arbitration.

mod bucket_state;
mod context;
mod delete_extra_copies;
mod garbage_collection;
mod join;
mod split;
mod split_inconsistent;
mod synchronize_and_move;

use std::fmt;

use crate::bucket::{Bucket, BucketId};
use crate::maintenance::{MaintenanceOperationType, MaintenancePriority};
use crate::operation::{IdealStateOperation, MergeNode, OperationKind};

pub use bucket_state::BucketStateStateChecker;
pub use context::{BucketFamily, EvaluationSnapshot, StateCheckerContext};
pub use delete_extra_copies::DeleteExtraCopiesStateChecker;
pub use garbage_collection::GarbageCollectionStateChecker;
pub use join::JoinBucketsStateChecker;
pub use split::SplitBucketStateChecker;
pub use split_inconsistent::SplitInconsistentStateChecker;
pub use synchronize_and_move::SynchronizeAndMoveStateChecker;

/// Why a checker asked for maintenance. Rendered into the operation's
/// detailed reason on materialization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reason {
    SplitToMinimumBits {
        used_bits: u8,
        minimum_bits: u8,
    },
    SplitLargeBucket {
        doc_count: u32,
        total_size: u32,
        meta_count: u32,
        split_count: u32,
        split_size: u32,
    },
    SplitInconsistent {
        split_buckets: Vec<BucketId>,
        target_bits: u8,
    },
    Synchronize {
        out_of_sync: bool,
        too_few_copies: bool,
        missing_on: Vec<u16>,
        moving_from: Vec<u16>,
    },
    Join {
        sibling: Option<BucketId>,
        doc_count: u64,
        total_size: u64,
    },
    DeleteExtraCopies {
        removing: Vec<u16>,
        empty_only: bool,
    },
    GarbageCollection {
        secs_since_last: u64,
        mutations: u64,
    },
    Activate {
        node: u16,
        had_active: bool,
        deactivating: Vec<u16>,
    },
}

fn write_nodes(f: &mut fmt::Formatter<'_>, nodes: &[u16]) -> fmt::Result {
    for (i, node) in nodes.iter().enumerate() {
        if i > 0 {
            f.write_str(",")?;
        }
        write!(f, "{node}")?;
    }
    Ok(())
}

impl fmt::Display for Reason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reason::SplitToMinimumBits {
                used_bits,
                minimum_bits,
            } => write!(
                f,
                "[Bucket is using {used_bits} bits, fewer than the minimum split bits {minimum_bits}]"
            ),
            Reason::SplitLargeBucket {
                doc_count,
                total_size,
                meta_count,
                split_count,
                split_size,
            } => write!(
                f,
                "[Splitting bucket because its maximum size ({total_size} b, {doc_count} docs, {meta_count} meta) \
                 is higher than the configured limit of ({split_size}, {split_count})]"
            ),
            Reason::SplitInconsistent {
                split_buckets,
                target_bits,
            } => {
                f.write_str("[Bucket is inconsistently split (list includes ")?;
                for (i, id) in split_buckets.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{id}")?;
                }
                write!(f, ") Splitting it to {target_bits} bits to improve the situation]")
            }
            Reason::Synchronize {
                out_of_sync,
                too_few_copies,
                missing_on,
                moving_from,
            } => {
                if *out_of_sync {
                    f.write_str("[Synchronizing buckets with different checksums")?;
                } else if *too_few_copies || !missing_on.is_empty() {
                    f.write_str("[Adding missing bucket copies")?;
                } else {
                    f.write_str("[Moving bucket to ideal nodes")?;
                }
                if *too_few_copies {
                    f.write_str(", too few copies")?;
                }
                if !missing_on.is_empty() {
                    f.write_str(", copying in to nodes ")?;
                    write_nodes(f, missing_on)?;
                }
                if !moving_from.is_empty() {
                    f.write_str(", moving out from nodes ")?;
                    write_nodes(f, moving_from)?;
                }
                f.write_str("]")
            }
            Reason::Join {
                sibling,
                doc_count,
                total_size,
            } => {
                match sibling {
                    Some(sibling) => write!(f, "[Joining buckets with {sibling}")?,
                    None => f.write_str("[Joining bucket without sibling into its parent")?,
                }
                write!(f, " because their size ({total_size} bytes, {doc_count} docs) is less than the configured limit]")
            }
            Reason::DeleteExtraCopies {
                removing,
                empty_only,
            } => {
                if *empty_only {
                    f.write_str("[Removing empty copies from nodes ")?;
                } else {
                    f.write_str("[Removing redundant in-sync copies from nodes ")?;
                }
                write_nodes(f, removing)?;
                f.write_str("]")
            }
            Reason::GarbageCollection {
                secs_since_last,
                mutations,
            } => write!(
                f,
                "[Needs garbage collection: last collected {secs_since_last} seconds ago, {mutations} mutations since]"
            ),
            Reason::Activate {
                node,
                had_active,
                deactivating,
            } => {
                write!(f, "[Setting node {node} as active")?;
                if !*had_active {
                    f.write_str(": no active copy")?;
                }
                if !deactivating.is_empty() {
                    f.write_str(", deactivating nodes ")?;
                    write_nodes(f, deactivating)?;
                }
                f.write_str("]")
            }
        }
    }
}

/// Everything needed to build an operation, captured by a checker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperationPlan {
    pub bucket: Bucket,
    pub nodes: Vec<u16>,
    pub kind: OperationKind,
    pub priority: u8,
    pub reason: Reason,
}

impl OperationPlan {
    pub fn into_operation(self) -> IdealStateOperation {
        IdealStateOperation::new(
            self.bucket,
            self.nodes,
            self.kind,
            self.priority,
            self.reason.to_string(),
        )
    }
}

/// Verdict of one checker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateCheckerResult {
    priority: MaintenancePriority,
    op_type: MaintenanceOperationType,
    plan: Option<OperationPlan>,
}

impl StateCheckerResult {
    pub fn no_maintenance_needed() -> Self {
        Self {
            priority: MaintenancePriority::NoMaintenanceNeeded,
            op_type: MaintenanceOperationType::OperationCount,
            plan: None,
        }
    }

    pub fn new(priority: MaintenancePriority, plan: OperationPlan) -> Self {
        Self {
            priority,
            op_type: plan.kind.op_type(),
            plan: Some(plan),
        }
    }

    pub fn priority(&self) -> MaintenancePriority {
        self.priority
    }

    pub fn op_type(&self) -> MaintenanceOperationType {
        self.op_type
    }

    pub fn requires_maintenance(&self) -> bool {
        self.priority.requires_maintenance()
    }

    /// Materialize the planned operation, if any.
    pub fn create_operation(self) -> Option<IdealStateOperation> {
        self.plan.map(OperationPlan::into_operation)
    }
}

/// Closed set of diagnostic rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateChecker {
    BucketState(BucketStateStateChecker),
    Split(SplitBucketStateChecker),
    SplitInconsistent(SplitInconsistentStateChecker),
    SynchronizeAndMove(SynchronizeAndMoveStateChecker),
    Join(JoinBucketsStateChecker),
    DeleteExtraCopies(DeleteExtraCopiesStateChecker),
    GarbageCollection(GarbageCollectionStateChecker),
}

impl StateChecker {
    /// Checkers in evaluation (and tie-break) order. The activation checker is
    /// only installed when active replicas are managed.
    pub fn default_chain(manage_active_bucket_copies: bool) -> Vec<StateChecker> {
        let mut chain = Vec::with_capacity(7);
        if manage_active_bucket_copies {
            tracing::debug!("adding bucket state checker to state checkers");
            chain.push(StateChecker::BucketState(BucketStateStateChecker));
        }
        chain.extend([
            StateChecker::Split(SplitBucketStateChecker),
            StateChecker::SplitInconsistent(SplitInconsistentStateChecker),
            StateChecker::SynchronizeAndMove(SynchronizeAndMoveStateChecker),
            StateChecker::Join(JoinBucketsStateChecker),
            StateChecker::DeleteExtraCopies(DeleteExtraCopiesStateChecker),
            StateChecker::GarbageCollection(GarbageCollectionStateChecker),
        ]);
        chain
    }

    pub fn name(&self) -> &'static str {
        match self {
            StateChecker::BucketState(_) => BucketStateStateChecker::NAME,
            StateChecker::Split(_) => SplitBucketStateChecker::NAME,
            StateChecker::SplitInconsistent(_) => SplitInconsistentStateChecker::NAME,
            StateChecker::SynchronizeAndMove(_) => SynchronizeAndMoveStateChecker::NAME,
            StateChecker::Join(_) => JoinBucketsStateChecker::NAME,
            StateChecker::DeleteExtraCopies(_) => DeleteExtraCopiesStateChecker::NAME,
            StateChecker::GarbageCollection(_) => GarbageCollectionStateChecker::NAME,
        }
    }

    pub fn check(&self, c: &mut StateCheckerContext<'_>) -> StateCheckerResult {
        match self {
            StateChecker::BucketState(checker) => checker.check(c),
            StateChecker::Split(checker) => checker.check(c),
            StateChecker::SplitInconsistent(checker) => checker.check(c),
            StateChecker::SynchronizeAndMove(checker) => checker.check(c),
            StateChecker::Join(checker) => checker.check(c),
            StateChecker::DeleteExtraCopies(checker) => checker.check(c),
            StateChecker::GarbageCollection(checker) => checker.check(c),
        }
    }
}

/// Merge participants rendered as plain node indexes for the operation.
pub(crate) fn merge_node_indexes(nodes: &[MergeNode]) -> Vec<u16> {
    nodes.iter().map(|n| n.index).collect()
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::bucket::BucketSpace;

    #[test]
    fn chain_order_is_fixed() {
        let names = StateChecker::default_chain(true)
            .iter()
            .map(StateChecker::name)
            .collect::<Vec<_>>();
        assert_eq!(
            names,
            vec![
                "SetBucketState",
                "SplitBucket",
                "SplitInconsistentBuckets",
                "SynchronizeAndMove",
                "JoinBuckets",
                "DeleteExtraCopies",
                "GarbageCollection",
            ]
        );
        assert_eq!(StateChecker::default_chain(false).len(), 6);
    }

    #[test]
    fn result_materializes_only_with_plan() {
        assert!(StateCheckerResult::no_maintenance_needed()
            .create_operation()
            .is_none());

        let bucket = Bucket::new(BucketSpace::DEFAULT, BucketId::new(16, 3));
        let result = StateCheckerResult::new(
            MaintenancePriority::Low,
            OperationPlan {
                bucket,
                nodes: vec![1],
                kind: OperationKind::Remove,
                priority: 100,
                reason: Reason::DeleteExtraCopies {
                    removing: vec![1],
                    empty_only: true,
                },
            },
        );
        assert_eq!(result.op_type(), MaintenanceOperationType::DeleteBucket);
        let op = result.create_operation().expect("operation");
        assert_eq!(op.detailed_reason(), "[Removing empty copies from nodes 1]");
        assert_eq!(op.bucket(), bucket);
    }
}
