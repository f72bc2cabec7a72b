//! Maintenance priorities, operation types and per-node statistics.

use std::collections::BTreeMap;
use std::fmt;

/// How urgently a bucket needs maintenance.
///
/// Ordered from "nothing to do" up to the most urgent level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum MaintenancePriority {
    NoMaintenanceNeeded,
    VeryLow,
    Low,
    Medium,
    High,
    VeryHigh,
    Highest,
}

impl MaintenancePriority {
    pub fn requires_maintenance(&self) -> bool {
        *self != MaintenancePriority::NoMaintenanceNeeded
    }

    pub fn name(&self) -> &'static str {
        match self {
            MaintenancePriority::NoMaintenanceNeeded => "NO_MAINTENANCE_NEEDED",
            MaintenancePriority::VeryLow => "VERY_LOW",
            MaintenancePriority::Low => "LOW",
            MaintenancePriority::Medium => "MEDIUM",
            MaintenancePriority::High => "HIGH",
            MaintenancePriority::VeryHigh => "VERY_HIGH",
            MaintenancePriority::Highest => "HIGHEST",
        }
    }
}

impl fmt::Display for MaintenancePriority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Kind of repair a checker asks for.
///
/// `OperationCount` doubles as the "no operation" sentinel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum MaintenanceOperationType {
    DeleteBucket,
    MergeBucket,
    SplitBucket,
    JoinBucket,
    SetBucketState,
    GarbageCollection,
    OperationCount,
}

impl MaintenanceOperationType {
    pub fn name(&self) -> &'static str {
        match self {
            MaintenanceOperationType::DeleteBucket => "delete_bucket",
            MaintenanceOperationType::MergeBucket => "merge_bucket",
            MaintenanceOperationType::SplitBucket => "split_bucket",
            MaintenanceOperationType::JoinBucket => "join_bucket",
            MaintenanceOperationType::SetBucketState => "set_bucket_state",
            MaintenanceOperationType::GarbageCollection => "garbage_collection",
            MaintenanceOperationType::OperationCount => "none",
        }
    }
}

impl fmt::Display for MaintenanceOperationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Arbitrated decision for one bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MaintenancePriorityAndType {
    pub priority: MaintenancePriority,
    pub op_type: MaintenanceOperationType,
}

impl MaintenancePriorityAndType {
    pub fn new(priority: MaintenancePriority, op_type: MaintenanceOperationType) -> Self {
        Self { priority, op_type }
    }

    pub fn no_maintenance() -> Self {
        Self::new(
            MaintenancePriority::NoMaintenanceNeeded,
            MaintenanceOperationType::OperationCount,
        )
    }

    pub fn requires_maintenance(&self) -> bool {
        self.priority.requires_maintenance()
    }
}

/// Per-node counts of buckets that need some kind of repair involving the node.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct NodeMaintenanceStats {
    pub moving_out: u64,
    pub syncing: u64,
    pub copying_in: u64,
    pub copying_out: u64,
    pub total: u64,
}

impl NodeMaintenanceStats {
    pub fn is_empty(&self) -> bool {
        *self == NodeMaintenanceStats::default()
    }
}

/// Accumulates maintenance statistics across bucket evaluations.
///
/// Used for cluster-wide reporting only; decisions never read it.
#[derive(Debug, Default, Clone)]
pub struct NodeMaintenanceStatsTracker {
    per_node: BTreeMap<u16, NodeMaintenanceStats>,
    pending: BTreeMap<MaintenanceOperationType, u64>,
}

impl NodeMaintenanceStatsTracker {
    pub fn new() -> Self {
        Self::default()
    }

    fn node_mut(&mut self, node: u16) -> &mut NodeMaintenanceStats {
        self.per_node.entry(node).or_default()
    }

    pub fn inc_moving_out(&mut self, node: u16) {
        let stats = self.node_mut(node);
        stats.moving_out += 1;
        stats.total += 1;
    }

    pub fn inc_syncing(&mut self, node: u16) {
        let stats = self.node_mut(node);
        stats.syncing += 1;
        stats.total += 1;
    }

    pub fn inc_copying_in(&mut self, node: u16) {
        let stats = self.node_mut(node);
        stats.copying_in += 1;
        stats.total += 1;
    }

    pub fn inc_copying_out(&mut self, node: u16) {
        let stats = self.node_mut(node);
        stats.copying_out += 1;
        stats.total += 1;
    }

    /// Count one evaluated checker verdict that asked for `op_type`.
    pub fn record_pending(&mut self, op_type: MaintenanceOperationType) {
        *self.pending.entry(op_type).or_insert(0) += 1;
    }

    pub fn node_stats(&self, node: u16) -> NodeMaintenanceStats {
        self.per_node.get(&node).copied().unwrap_or_default()
    }

    pub fn pending(&self, op_type: MaintenanceOperationType) -> u64 {
        self.pending.get(&op_type).copied().unwrap_or(0)
    }

    pub fn total_pending(&self) -> u64 {
        self.pending.values().sum()
    }

    pub fn nodes(&self) -> impl Iterator<Item = (u16, &NodeMaintenanceStats)> {
        self.per_node.iter().map(|(node, stats)| (*node, stats))
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty() && self.per_node.values().all(NodeMaintenanceStats::is_empty)
    }
}
