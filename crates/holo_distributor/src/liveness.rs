//! Detection of replicas the database places on nodes that cannot hold them.
//!
//! Such "phantom" replicas mean the bucket database and the cluster state
//! disagree. That is worth an operator's attention but must never stop
//! maintenance, and logging it for every bucket would flood the log, so the
//! guard reports it once for its lifetime.

use std::sync::atomic::{AtomicBool, Ordering};

use crate::bucket::Bucket;
use crate::bucket_db::BucketDbEntry;
use crate::cluster::ClusterState;

#[derive(Debug, Default)]
pub struct PhantomReplicaGuard {
    logged: AtomicBool,
}

impl PhantomReplicaGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Check every replica node of `entry` against `cluster_state`. Returns
    /// the number of anomalies logged by this call (0 or 1).
    pub fn check(&self, bucket: &Bucket, entry: &BucketDbEntry, cluster_state: &ClusterState) -> usize {
        let mut logged = 0;
        for copy in &entry.copies {
            let node_state = cluster_state.storage_node_state(copy.node);
            if node_state.may_hold_replicas() {
                continue;
            }
            if self.logged.swap(true, Ordering::AcqRel) {
                continue;
            }
            tracing::error!(
                bucket = %bucket,
                node = copy.node,
                node_state = %node_state,
                cluster_state = %cluster_state,
                "bucket database has replica on node not in a state that may hold replicas; \
                 further occurrences will not be logged"
            );
            logged += 1;
        }
        logged
    }

    pub fn has_logged(&self) -> bool {
        self.logged.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bucket::{BucketId, BucketSpace};
    use crate::bucket_db::{BucketCopy, BucketInfo};
    use crate::cluster::{NodeState, NodeType};

    fn entry(nodes: &[u16]) -> BucketDbEntry {
        BucketDbEntry::new(
            BucketId::new(16, 4),
            nodes
                .iter()
                .map(|n| BucketCopy::new(*n, BucketInfo::new(1, 1, 1), true))
                .collect(),
        )
    }

    #[test]
    fn live_replicas_are_not_reported() {
        let mut state = ClusterState::with_storage_nodes(2, 0..3);
        state.set_node_state(NodeType::Storage, 1, NodeState::Retired);
        state.set_node_state(NodeType::Storage, 2, NodeState::Initializing);
        let guard = PhantomReplicaGuard::new();
        let bucket = Bucket::new(BucketSpace::DEFAULT, BucketId::new(16, 4));
        assert_eq!(guard.check(&bucket, &entry(&[0, 1, 2]), &state), 0);
        assert!(!guard.has_logged());
    }

    #[test]
    fn phantom_replicas_are_reported_once() {
        let mut state = ClusterState::with_storage_nodes(2, 0..3);
        state.set_node_state(NodeType::Storage, 1, NodeState::Down);
        state.set_node_state(NodeType::Storage, 2, NodeState::Maintenance);
        let guard = PhantomReplicaGuard::new();
        let bucket = Bucket::new(BucketSpace::DEFAULT, BucketId::new(16, 4));

        assert_eq!(guard.check(&bucket, &entry(&[0, 1, 2]), &state), 1);
        assert!(guard.has_logged());
        assert_eq!(guard.check(&bucket, &entry(&[1]), &state), 0);
    }
}
