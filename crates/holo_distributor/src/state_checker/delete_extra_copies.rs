//! Remove replicas that are no longer needed.
//!
//! While replicas disagree only empty copies off the ideal nodes are
//! removed, since anything else might still hold data the merge needs. Once
//! they agree and every ideal node has a replica, all copies off the ideal
//! nodes go.

use crate::cluster::NodeState;
use crate::maintenance::MaintenancePriority;
use crate::operation::OperationKind;
use crate::state_checker::{OperationPlan, Reason, StateCheckerContext, StateCheckerResult};

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DeleteExtraCopiesStateChecker;

impl DeleteExtraCopiesStateChecker {
    pub const NAME: &'static str = "DeleteExtraCopies";

    pub fn check(&self, c: &mut StateCheckerContext<'_>) -> StateCheckerResult {
        if c.is_inconsistently_split() {
            return StateCheckerResult::no_maintenance_needed();
        }

        let removable = c
            .entry
            .copies
            .iter()
            .filter(|copy| !c.is_ideal(copy.node))
            .filter(|copy| {
                matches!(
                    c.node_state(copy.node),
                    NodeState::Up | NodeState::Retired
                )
            });

        let in_sync = c.entry.copies_in_sync();
        let (removing, empty_only) = if in_sync {
            let ideal_covered = c
                .ideal_state
                .iter()
                .all(|node| c.entry.has_copy_on(*node));
            if !ideal_covered {
                return StateCheckerResult::no_maintenance_needed();
            }
            (removable.map(|copy| copy.node).collect::<Vec<_>>(), false)
        } else {
            let empty = removable
                .filter(|copy| copy.info.valid && copy.info.is_empty())
                .map(|copy| copy.node)
                .collect::<Vec<_>>();
            (empty, true)
        };

        // Never remove the last replica.
        if removing.is_empty() || removing.len() >= c.entry.copies.len() {
            return StateCheckerResult::no_maintenance_needed();
        }

        StateCheckerResult::new(
            MaintenancePriority::High,
            OperationPlan {
                bucket: c.bucket,
                nodes: removing.clone(),
                kind: OperationKind::Remove,
                priority: c.priorities().delete_bucket_copy,
                reason: Reason::DeleteExtraCopies {
                    removing,
                    empty_only,
                },
            },
        )
    }
}
