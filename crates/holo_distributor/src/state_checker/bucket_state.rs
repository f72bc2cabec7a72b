//! Keep exactly one replica of each bucket active.
//!
//! The active replica serves reads. The preferred candidate is a ready,
//! trusted copy on an Up node, ideally the first ideal node.

use std::cmp::Reverse;

use crate::cluster::NodeState;
use crate::maintenance::MaintenancePriority;
use crate::operation::OperationKind;
use crate::state_checker::{OperationPlan, Reason, StateCheckerContext, StateCheckerResult};

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct BucketStateStateChecker;

impl BucketStateStateChecker {
    pub const NAME: &'static str = "SetBucketState";

    pub fn check(&self, c: &mut StateCheckerContext<'_>) -> StateCheckerResult {
        if c.is_inconsistently_split() {
            return StateCheckerResult::no_maintenance_needed();
        }

        let Some(best) = c
            .entry
            .copies
            .iter()
            .filter(|copy| c.node_state(copy.node) == NodeState::Up)
            .max_by_key(|copy| {
                (
                    copy.info.ready,
                    copy.trusted,
                    Reverse(c.ideal_position(copy.node).unwrap_or(usize::MAX)),
                    Reverse(copy.node),
                )
            })
            .map(|copy| copy.node)
        else {
            return StateCheckerResult::no_maintenance_needed();
        };

        let active = c.entry.active_nodes();
        if active == [best] {
            return StateCheckerResult::no_maintenance_needed();
        }

        let had_active = !active.is_empty();
        let deactivating = active
            .into_iter()
            .filter(|node| *node != best)
            .collect::<Vec<_>>();
        let (priority, message_priority) = if had_active {
            (
                MaintenancePriority::Medium,
                c.priorities().activate_with_existing_active,
            )
        } else {
            (
                MaintenancePriority::VeryHigh,
                c.priorities().activate_no_existing_active,
            )
        };

        StateCheckerResult::new(
            priority,
            OperationPlan {
                bucket: c.bucket,
                nodes: c.entry.nodes().collect(),
                kind: OperationKind::SetBucketState {
                    active_nodes: vec![best],
                },
                priority: message_priority,
                reason: Reason::Activate {
                    node: best,
                    had_active,
                    deactivating,
                },
            },
        )
    }
}
