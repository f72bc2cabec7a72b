//! Concrete maintenance operations produced by the ideal state manager.
//!
//! An operation is a description of work, not the work itself: executing it
//! (sending split/merge/remove messages to storage nodes) is the scheduler's
//! job. The operation keeps a weak handle to the manager that produced it so
//! completion callbacks can find their way back without keeping it alive.

use std::fmt;
use std::sync::{Arc, Weak};

use crate::bucket::{Bucket, BucketId};
use crate::ideal_state_manager::IdealStateManager;
use crate::maintenance::MaintenanceOperationType;

/// A node taking part in a merge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MergeNode {
    pub index: u16,
    /// Node contributes data but should not end up holding a replica.
    pub source_only: bool,
}

impl fmt::Display for MergeNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.source_only {
            write!(f, "{}(source only)", self.index)
        } else {
            write!(f, "{}", self.index)
        }
    }
}

/// What the operation does.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperationKind {
    /// Split the bucket until children reach `max_bits` used bits or fall
    /// below the count/size limits (0 means unlimited).
    Split {
        max_bits: u8,
        split_count: u32,
        split_size: u32,
    },
    /// Join `sources` into the operation's bucket (their parent). Both
    /// sources are equal for a sibling-less join.
    Join { sources: [BucketId; 2] },
    /// Synchronize replica content across `nodes`.
    Merge { nodes: Vec<MergeNode> },
    /// Delete the replicas on the operation's nodes.
    Remove,
    /// Remove expired documents on the operation's nodes.
    GarbageCollection,
    /// Mark exactly `active_nodes` active among the operation's nodes.
    SetBucketState { active_nodes: Vec<u16> },
}

impl OperationKind {
    pub fn op_type(&self) -> MaintenanceOperationType {
        match self {
            OperationKind::Split { .. } => MaintenanceOperationType::SplitBucket,
            OperationKind::Join { .. } => MaintenanceOperationType::JoinBucket,
            OperationKind::Merge { .. } => MaintenanceOperationType::MergeBucket,
            OperationKind::Remove => MaintenanceOperationType::DeleteBucket,
            OperationKind::GarbageCollection => MaintenanceOperationType::GarbageCollection,
            OperationKind::SetBucketState { .. } => MaintenanceOperationType::SetBucketState,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            OperationKind::Split { .. } => "split",
            OperationKind::Join { .. } => "join",
            OperationKind::Merge { .. } => "merge",
            OperationKind::Remove => "remove",
            OperationKind::GarbageCollection => "garbagecollection",
            OperationKind::SetBucketState { .. } => "setbucketstate",
        }
    }
}

/// A maintenance operation ready to be scheduled.
#[derive(Debug, Clone)]
pub struct IdealStateOperation {
    bucket: Bucket,
    nodes: Vec<u16>,
    kind: OperationKind,
    priority: u8,
    detailed_reason: String,
    manager: Weak<IdealStateManager>,
}

impl IdealStateOperation {
    pub fn new(
        bucket: Bucket,
        nodes: Vec<u16>,
        kind: OperationKind,
        priority: u8,
        detailed_reason: String,
    ) -> Self {
        Self {
            bucket,
            nodes,
            kind,
            priority,
            detailed_reason,
            manager: Weak::new(),
        }
    }

    pub fn bucket(&self) -> Bucket {
        self.bucket
    }

    pub fn bucket_id(&self) -> BucketId {
        self.bucket.id
    }

    pub fn nodes(&self) -> &[u16] {
        &self.nodes
    }

    pub fn kind(&self) -> &OperationKind {
        &self.kind
    }

    pub fn op_type(&self) -> MaintenanceOperationType {
        self.kind.op_type()
    }

    pub fn name(&self) -> &'static str {
        self.kind.name()
    }

    /// Storage message priority; lower is more urgent.
    pub fn priority(&self) -> u8 {
        self.priority
    }

    pub fn set_priority(&mut self, priority: u8) {
        self.priority = priority;
    }

    pub fn detailed_reason(&self) -> &str {
        &self.detailed_reason
    }

    pub fn set_ideal_state_manager(&mut self, manager: Weak<IdealStateManager>) {
        self.manager = manager;
    }

    /// The manager that generated this operation, if it is still alive.
    pub fn ideal_state_manager(&self) -> Option<Arc<IdealStateManager>> {
        self.manager.upgrade()
    }
}

impl fmt::Display for IdealStateOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} on nodes [", self.name(), self.bucket.id)?;
        for (i, node) in self.nodes.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            write!(f, "{node}")?;
        }
        write!(f, "] pri {}: {}", self.priority, self.detailed_reason)
    }
}
