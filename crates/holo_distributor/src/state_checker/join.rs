//! Join small sibling buckets back into their parent.

use crate::bucket::Bucket;
use crate::bucket_db::BucketDbEntry;
use crate::maintenance::MaintenancePriority;
use crate::operation::OperationKind;
use crate::state_checker::{OperationPlan, Reason, StateCheckerContext, StateCheckerResult};

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct JoinBucketsStateChecker;

impl JoinBucketsStateChecker {
    pub const NAME: &'static str = "JoinBuckets";

    pub fn check(&self, c: &mut StateCheckerContext<'_>) -> StateCheckerResult {
        let config = &c.config;
        let id = c.bucket_id();
        let used_bits = id.used_bits();
        if !config.join_enabled()
            || used_bits <= config.minimum_split_bits
            || c.is_inconsistently_split()
        {
            return StateCheckerResult::no_maintenance_needed();
        }

        let sibling = c.sibling_entry.as_ref().filter(|e| e.has_copies());
        match sibling {
            // With both siblings present only the lower one acts, so a pair
            // yields one join.
            Some(_) if (id.location() >> (used_bits - 1)) & 1 == 1 => {
                return StateCheckerResult::no_maintenance_needed();
            }
            None if !config.enable_join_for_sibling_less_buckets => {
                return StateCheckerResult::no_maintenance_needed();
            }
            _ => {}
        }
        if !self.placed_and_in_sync(c, &c.entry)
            || !sibling.map_or(true, |s| self.placed_and_in_sync(c, s))
        {
            return StateCheckerResult::no_maintenance_needed();
        }

        let doc_count = u64::from(c.entry.highest_doc_count())
            + sibling.map_or(0, |s| u64::from(s.highest_doc_count()));
        let total_size = u64::from(c.entry.highest_total_doc_size())
            + sibling.map_or(0, |s| u64::from(s.highest_total_doc_size()));
        let join_count = u64::from(config.join_count);
        let join_size = u64::from(config.join_size);
        if (join_count > 0 && doc_count > join_count) || (join_size > 0 && total_size > join_size) {
            return StateCheckerResult::no_maintenance_needed();
        }

        let sibling_id = sibling.map(|s| s.bucket_id);
        StateCheckerResult::new(
            MaintenancePriority::VeryLow,
            OperationPlan {
                bucket: Bucket::new(c.bucket.space, id.parent()),
                nodes: c.ideal_state.clone(),
                kind: OperationKind::Join {
                    sources: [id, sibling_id.unwrap_or(id)],
                },
                priority: c.priorities().join_buckets,
                reason: Reason::Join {
                    sibling: sibling_id,
                    doc_count,
                    total_size,
                },
            },
        )
    }

    /// Replicas agree on content and sit exactly on the ideal nodes.
    fn placed_and_in_sync(&self, c: &StateCheckerContext<'_>, entry: &BucketDbEntry) -> bool {
        if !entry.all_info_valid() || !entry.copies_in_sync() {
            return false;
        }
        entry.copies.len() == c.unordered_ideal_state.len()
            && entry.nodes().all(|node| c.is_ideal(node))
    }
}
