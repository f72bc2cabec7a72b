//! Repair buckets whose replicas exist at more than one split level.
//!
//! Only the least split bucket of an inconsistent family acts: it is split
//! down to the deepest level present, after which the family is consistent
//! and joins can reconsider it.

use crate::maintenance::MaintenancePriority;
use crate::operation::OperationKind;
use crate::state_checker::{OperationPlan, Reason, StateCheckerContext, StateCheckerResult};

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SplitInconsistentStateChecker;

impl SplitInconsistentStateChecker {
    pub const NAME: &'static str = "SplitInconsistentBuckets";

    pub fn check(&self, c: &mut StateCheckerContext<'_>) -> StateCheckerResult {
        if !c.is_inconsistently_split() {
            return StateCheckerResult::no_maintenance_needed();
        }

        let split_buckets = c
            .entries
            .iter()
            .filter(|e| e.has_copies())
            .map(|e| e.bucket_id)
            .collect::<Vec<_>>();
        let least_bits = split_buckets
            .iter()
            .map(|id| id.used_bits())
            .min()
            .unwrap_or(0);
        let target_bits = split_buckets
            .iter()
            .map(|id| id.used_bits())
            .max()
            .unwrap_or(0);
        let used_bits = c.bucket_id().used_bits();
        if used_bits != least_bits || target_bits <= used_bits {
            return StateCheckerResult::no_maintenance_needed();
        }

        StateCheckerResult::new(
            MaintenancePriority::High,
            OperationPlan {
                bucket: c.bucket,
                nodes: c.entry.nodes().collect(),
                kind: OperationKind::Split {
                    max_bits: target_bits,
                    split_count: 0,
                    split_size: 0,
                },
                priority: c.priorities().split_inconsistent_bucket,
                reason: Reason::SplitInconsistent {
                    split_buckets,
                    target_bits,
                },
            },
        )
    }
}
