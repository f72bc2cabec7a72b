//! Split buckets that are below the minimum split level or have grown too large.

use crate::bucket::MAX_USED_BITS;
use crate::maintenance::MaintenancePriority;
use crate::operation::OperationKind;
use crate::state_checker::{OperationPlan, Reason, StateCheckerContext, StateCheckerResult};

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SplitBucketStateChecker;

impl SplitBucketStateChecker {
    pub const NAME: &'static str = "SplitBucket";

    pub fn check(&self, c: &mut StateCheckerContext<'_>) -> StateCheckerResult {
        // Sizes from replicas that have not reported yet would be meaningless.
        if !c.entry.all_info_valid() {
            return StateCheckerResult::no_maintenance_needed();
        }

        let used_bits = c.bucket_id().used_bits();
        let minimum_bits = c.config.minimum_split_bits;
        if used_bits < minimum_bits {
            return self.split(
                c,
                OperationKind::Split {
                    max_bits: minimum_bits,
                    split_count: 0,
                    split_size: 0,
                },
                MaintenancePriority::Medium,
                c.priorities().split_distribution_bits,
                Reason::SplitToMinimumBits {
                    used_bits,
                    minimum_bits,
                },
            );
        }
        if used_bits >= MAX_USED_BITS {
            return StateCheckerResult::no_maintenance_needed();
        }

        let split_count = c.config.split_count;
        let split_size = c.config.split_size;
        let doc_count = c.entry.highest_doc_count();
        let meta_count = c.entry.highest_meta_count();
        let total_size = c.entry.highest_total_doc_size();
        let too_many_docs =
            split_count > 0 && (doc_count > split_count || meta_count > split_count);
        let too_large = split_size > 0 && total_size > split_size;
        if !too_many_docs && !too_large {
            return StateCheckerResult::no_maintenance_needed();
        }

        self.split(
            c,
            OperationKind::Split {
                max_bits: MAX_USED_BITS,
                split_count,
                split_size,
            },
            MaintenancePriority::High,
            c.priorities().split_large_bucket,
            Reason::SplitLargeBucket {
                doc_count,
                total_size,
                meta_count,
                split_count,
                split_size,
            },
        )
    }

    fn split(
        &self,
        c: &StateCheckerContext<'_>,
        kind: OperationKind,
        priority: MaintenancePriority,
        message_priority: u8,
        reason: Reason,
    ) -> StateCheckerResult {
        StateCheckerResult::new(
            priority,
            OperationPlan {
                bucket: c.bucket,
                nodes: c.entry.nodes().collect(),
                kind,
                priority: message_priority,
                reason,
            },
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bucket::BucketId;
    use crate::maintenance::MaintenanceOperationType;
    use crate::state_checker::test_support::{copy, Fixture};
    use crate::state_checker::StateChecker;

    const CHECKER: StateChecker = StateChecker::Split(SplitBucketStateChecker);

    #[test]
    fn small_bucket_needs_no_split() {
        let mut f = Fixture::new(BucketId::new(16, 1), vec![copy(0, 1, 10, 100), copy(1, 1, 10, 100)]);
        assert!(!f.run(CHECKER).requires_maintenance());
    }

    #[test]
    fn bucket_below_minimum_bits_is_split_to_minimum() {
        let mut f = Fixture::new(BucketId::new(8, 1), vec![copy(0, 1, 1, 1)]);
        let result = f.run(CHECKER);
        assert_eq!(result.priority(), MaintenancePriority::Medium);
        assert_eq!(result.op_type(), MaintenanceOperationType::SplitBucket);
        let op = result.create_operation().expect("split operation");
        match op.kind() {
            OperationKind::Split { max_bits, .. } => assert_eq!(*max_bits, 16),
            other => panic!("unexpected kind: {other:?}"),
        }
        assert_eq!(op.priority(), 200);
    }

    #[test]
    fn too_many_documents_splits_with_high_priority() {
        let mut f = Fixture::new(BucketId::new(16, 1), vec![copy(0, 1, 2000, 100), copy(1, 1, 2000, 100)]);
        f.config.split_count = 1000;
        let result = f.run(CHECKER);
        assert_eq!(result.priority(), MaintenancePriority::High);
        let op = result.create_operation().expect("split operation");
        assert_eq!(op.nodes(), &[0, 1]);
        assert!(op.detailed_reason().contains("2000 docs"));
    }

    #[test]
    fn too_large_splits_and_disabled_limits_do_not() {
        let mut f = Fixture::new(BucketId::new(16, 1), vec![copy(0, 1, 10, 5_000)]);
        f.config.split_size = 4_000;
        assert!(f.run(CHECKER).requires_maintenance());

        f.config.split_size = 0;
        f.config.split_count = 0;
        assert!(!f.run(CHECKER).requires_maintenance());
    }

    #[test]
    fn invalid_info_or_max_bits_blocks_split() {
        let mut big = copy(0, 1, 5000, 100);
        big.info.valid = false;
        let mut f = Fixture::new(BucketId::new(16, 1), vec![big]);
        assert!(!f.run(CHECKER).requires_maintenance());

        let mut f = Fixture::new(BucketId::new(MAX_USED_BITS, 1), vec![copy(0, 1, 5000, 100)]);
        assert!(!f.run(CHECKER).requires_maintenance());
    }
}
