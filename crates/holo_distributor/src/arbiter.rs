//! Folding the verdicts of the checker chain into one decision.
//!
//! Precedence is positional: the first checker, in chain order, that needs
//! maintenance wins even if a later checker reports a more urgent priority.

use crate::maintenance::MaintenancePriorityAndType;
use crate::state_checker::StateCheckerResult;

/// Whether `candidate` may replace the running best `existing`.
pub fn can_overwrite_result(existing: &StateCheckerResult, candidate: &StateCheckerResult) -> bool {
    !existing.requires_maintenance() && candidate.requires_maintenance()
}

/// Running best over a sequence of checker results.
#[derive(Debug)]
pub struct PriorityArbiter {
    best: StateCheckerResult,
    winner: Option<&'static str>,
}

impl Default for PriorityArbiter {
    fn default() -> Self {
        Self::new()
    }
}

impl PriorityArbiter {
    pub fn new() -> Self {
        Self {
            best: StateCheckerResult::no_maintenance_needed(),
            winner: None,
        }
    }

    /// Offer the result of checker `name`. Returns true if it became the best.
    pub fn offer(&mut self, name: &'static str, candidate: StateCheckerResult) -> bool {
        if !can_overwrite_result(&self.best, &candidate) {
            return false;
        }
        self.best = candidate;
        self.winner = Some(name);
        true
    }

    /// Name of the checker whose result currently wins.
    pub fn winner(&self) -> Option<&'static str> {
        self.winner
    }

    pub fn priority_and_type(&self) -> MaintenancePriorityAndType {
        if self.best.requires_maintenance() {
            MaintenancePriorityAndType::new(self.best.priority(), self.best.op_type())
        } else {
            MaintenancePriorityAndType::no_maintenance()
        }
    }

    pub fn into_result(self) -> StateCheckerResult {
        self.best
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bucket::{Bucket, BucketId, BucketSpace};
    use crate::maintenance::{MaintenanceOperationType, MaintenancePriority};
    use crate::operation::OperationKind;
    use crate::state_checker::{OperationPlan, Reason};

    fn result(priority: MaintenancePriority, kind: OperationKind) -> StateCheckerResult {
        StateCheckerResult::new(
            priority,
            OperationPlan {
                bucket: Bucket::new(BucketSpace::DEFAULT, BucketId::new(16, 1)),
                nodes: vec![0],
                kind,
                priority: 100,
                reason: Reason::GarbageCollection {
                    secs_since_last: 0,
                    mutations: 0,
                },
            },
        )
    }

    #[test]
    fn empty_fold_yields_sentinel() {
        let arbiter = PriorityArbiter::new();
        assert_eq!(arbiter.winner(), None);
        let decision = arbiter.priority_and_type();
        assert_eq!(decision.priority, MaintenancePriority::NoMaintenanceNeeded);
        assert_eq!(decision.op_type, MaintenanceOperationType::OperationCount);
    }

    #[test]
    fn first_result_needing_maintenance_wins_over_higher_priority() {
        let mut arbiter = PriorityArbiter::new();
        assert!(!arbiter.offer("A", StateCheckerResult::no_maintenance_needed()));
        assert!(arbiter.offer("B", result(MaintenancePriority::Low, OperationKind::GarbageCollection)));
        assert!(!arbiter.offer(
            "C",
            result(MaintenancePriority::Highest, OperationKind::Merge { nodes: vec![] })
        ));

        assert_eq!(arbiter.winner(), Some("B"));
        let decision = arbiter.priority_and_type();
        assert_eq!(decision.priority, MaintenancePriority::Low);
        assert_eq!(decision.op_type, MaintenanceOperationType::GarbageCollection);
    }

    #[test]
    fn sentinel_never_overwrites() {
        let existing = result(MaintenancePriority::VeryLow, OperationKind::Remove);
        let none = StateCheckerResult::no_maintenance_needed();
        assert!(!can_overwrite_result(&existing, &none));
        assert!(can_overwrite_result(&none, &existing));
        assert!(!can_overwrite_result(&none, &none));
    }
}
