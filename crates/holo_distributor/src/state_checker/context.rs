//! Per-bucket evaluation context shared by every state checker.
//!
//! Building a context is two-phase. `BucketFamily::gather` collects whatever
//! the database knows about the bucket and its relatives; only when a primary
//! entry with replicas is found can a `StateCheckerContext` exist, so a
//! checker can never observe a bucket without nodes.

use std::collections::BTreeSet;
use std::sync::Arc;

use crate::bucket::{Bucket, BucketId};
use crate::bucket_db::{BucketDatabase, BucketDbEntry};
use crate::cluster::{ClusterState, Distribution, NodeState};
use crate::config::{DistributorConfig, MaintenancePriorities};
use crate::maintenance::NodeMaintenanceStatsTracker;

/// Database entries related to one bucket.
#[derive(Debug, Clone)]
pub struct BucketFamily {
    pub bucket: Bucket,
    pub sibling_bucket: BucketId,
    /// The bucket itself plus any ancestors/descendants present.
    pub entries: Vec<BucketDbEntry>,
    pub sibling_entry: Option<BucketDbEntry>,
}

impl BucketFamily {
    pub fn new(bucket: Bucket) -> Self {
        Self {
            bucket,
            sibling_bucket: bucket.id.sibling(),
            entries: Vec::new(),
            sibling_entry: None,
        }
    }

    pub fn gather(db: &dyn BucketDatabase, bucket: Bucket) -> Self {
        let mut family = Self::new(bucket);
        family.fill_parent_and_child_buckets(db);
        family.fill_sibling_bucket(db);
        family
    }

    pub fn fill_parent_and_child_buckets(&mut self, db: &dyn BucketDatabase) {
        self.entries = db.get_all(self.bucket.id);
        if self.entries.is_empty() {
            tracing::trace!(bucket = %self.bucket, "did not find bucket in bucket database");
        }
    }

    pub fn fill_sibling_bucket(&mut self, db: &dyn BucketDatabase) {
        self.sibling_entry = db.get(self.sibling_bucket);
    }

    /// The entry for exactly this bucket, provided it has replicas.
    pub fn primary_entry(&self) -> Option<&BucketDbEntry> {
        self.entries
            .iter()
            .find(|e| e.bucket_id == self.bucket.id && e.has_copies())
    }
}

/// Snapshots an evaluation reads, cloned once from the manager.
#[derive(Clone)]
pub struct EvaluationSnapshot {
    pub cluster_state: Arc<ClusterState>,
    pub distribution: Arc<Distribution>,
    pub config: Arc<DistributorConfig>,
    pub now_unix_secs: u64,
}

pub struct StateCheckerContext<'a> {
    pub bucket: Bucket,
    pub sibling_bucket: BucketId,
    pub entries: Vec<BucketDbEntry>,
    pub sibling_entry: Option<BucketDbEntry>,
    /// Primary entry; always has at least one replica.
    pub entry: BucketDbEntry,
    pub cluster_state: Arc<ClusterState>,
    pub distribution: Arc<Distribution>,
    pub config: Arc<DistributorConfig>,
    /// Ideal nodes, best first.
    pub ideal_state: Vec<u16>,
    pub unordered_ideal_state: BTreeSet<u16>,
    pub now_unix_secs: u64,
    pub stats: &'a mut NodeMaintenanceStatsTracker,
}

impl<'a> StateCheckerContext<'a> {
    /// Context over a resolved family. Returns `None` when the family has no
    /// primary entry with replicas.
    pub fn from_family(
        family: BucketFamily,
        snapshot: EvaluationSnapshot,
        stats: &'a mut NodeMaintenanceStatsTracker,
    ) -> Option<Self> {
        let entry = family.primary_entry()?.clone();
        let mut ctx = Self::for_entry(family.bucket, entry, snapshot, stats);
        ctx.sibling_bucket = family.sibling_bucket;
        ctx.entries = family.entries;
        ctx.sibling_entry = family.sibling_entry;
        Some(ctx)
    }

    /// Context over a caller-supplied entry with no family information.
    pub fn for_entry(
        bucket: Bucket,
        entry: BucketDbEntry,
        snapshot: EvaluationSnapshot,
        stats: &'a mut NodeMaintenanceStatsTracker,
    ) -> Self {
        let ideal_state = snapshot
            .distribution
            .ideal_storage_nodes(&snapshot.cluster_state, bucket.id);
        let unordered_ideal_state = ideal_state.iter().copied().collect();
        Self {
            bucket,
            sibling_bucket: bucket.id.sibling(),
            entries: Vec::new(),
            sibling_entry: None,
            entry,
            cluster_state: snapshot.cluster_state,
            distribution: snapshot.distribution,
            config: snapshot.config,
            ideal_state,
            unordered_ideal_state,
            now_unix_secs: snapshot.now_unix_secs,
            stats,
        }
    }

    pub fn bucket_id(&self) -> BucketId {
        self.bucket.id
    }

    pub fn priorities(&self) -> &MaintenancePriorities {
        &self.config.priorities
    }

    pub fn node_state(&self, node: u16) -> NodeState {
        self.cluster_state.storage_node_state(node)
    }

    pub fn is_ideal(&self, node: u16) -> bool {
        self.unordered_ideal_state.contains(&node)
    }

    pub fn ideal_position(&self, node: u16) -> Option<usize> {
        self.ideal_state.iter().position(|n| *n == node)
    }

    pub fn redundancy(&self) -> usize {
        usize::from(self.distribution.redundancy)
    }

    /// More than one split level of this bucket holds replicas.
    pub fn is_inconsistently_split(&self) -> bool {
        self.entries.iter().filter(|e| e.has_copies()).count() > 1
    }
}
