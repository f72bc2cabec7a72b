//! Shared helpers for integration tests.

#![allow(dead_code)]

use std::sync::Arc;

use holo_distributor::{
    Bucket, BucketCopy, BucketDbEntry, BucketId, BucketInfo, BucketSpace, BucketSpaceRepo,
    ClusterState, Distribution, DistributorBucketSpace, DistributorConfig, IdealStateManager,
    ManualClock, MapBucketDatabase, NodeState, NodeType,
};

/// Wall clock the test clusters start at.
pub const NOW_UNIX_SECS: u64 = 1_000_000;

/// Default-space cluster under test: storage nodes `0..nodes` and distributor
/// 0 all Up, redundancy 2.
pub struct TestCluster {
    pub db: Arc<MapBucketDatabase>,
    pub state: ClusterState,
    pub distribution: Distribution,
    pub config: DistributorConfig,
    pub clock: Arc<ManualClock>,
}

impl TestCluster {
    pub fn new(nodes: u16) -> Self {
        let mut state = ClusterState::with_storage_nodes(1, 0..nodes);
        state.set_node_state(NodeType::Distributor, 0, NodeState::Up);
        Self {
            db: Arc::new(MapBucketDatabase::new()),
            state,
            distribution: Distribution::with_redundancy(2),
            config: DistributorConfig::default(),
            clock: Arc::new(ManualClock::new(NOW_UNIX_SECS)),
        }
    }

    pub fn ideal(&self, id: BucketId) -> Vec<u16> {
        self.distribution.ideal_storage_nodes(&self.state, id)
    }

    pub fn non_ideal(&self, id: BucketId) -> Vec<u16> {
        let ideal = self.ideal(id);
        self.state
            .storage
            .keys()
            .copied()
            .filter(|node| !ideal.contains(node))
            .collect()
    }

    pub fn insert(&self, id: BucketId, copies: Vec<BucketCopy>) {
        self.db.update(BucketDbEntry::new(id, copies));
    }

    /// Manager over the cluster's current state and config. The database is
    /// shared, so later `insert` calls are visible to it.
    pub fn manager(&self) -> Arc<IdealStateManager> {
        let mut repo = BucketSpaceRepo::new();
        repo.add(
            BucketSpace::DEFAULT,
            DistributorBucketSpace::new(
                self.db.clone(),
                self.state.clone(),
                self.distribution.clone(),
            ),
        );
        IdealStateManager::new(0, self.config.clone(), repo, self.clock.clone())
    }
}

pub fn bucket(id: BucketId) -> Bucket {
    Bucket::new(BucketSpace::DEFAULT, id)
}

/// Trusted replica with valid info.
pub fn copy(node: u16, checksum: u32, docs: u32, bytes: u32) -> BucketCopy {
    BucketCopy::new(node, BucketInfo::new(checksum, docs, bytes), true)
}

/// Trusted replica that is ready and optionally active.
pub fn ready_copy(node: u16, checksum: u32, docs: u32, bytes: u32, active: bool) -> BucketCopy {
    let mut copy = copy(node, checksum, docs, bytes);
    copy.info.ready = true;
    copy.info.active = active;
    copy
}
