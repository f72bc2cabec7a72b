//! Per-bucket-space view: database plus the cluster state and distribution
//! that apply to it.
//!
//! The cluster state is replaced wholesale when a new version is published.
//! Readers clone the `Arc` once per evaluation, so an evaluation never sees a
//! mix of two versions. The distribution is fixed per space.

use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

use crate::bucket::BucketSpace;
use crate::bucket_db::BucketDatabase;
use crate::cluster::{ClusterState, Distribution};

pub struct DistributorBucketSpace {
    database: Arc<dyn BucketDatabase>,
    cluster_state: RwLock<Arc<ClusterState>>,
    distribution: Arc<Distribution>,
}

impl DistributorBucketSpace {
    pub fn new(
        database: Arc<dyn BucketDatabase>,
        cluster_state: ClusterState,
        distribution: Distribution,
    ) -> Self {
        Self {
            database,
            cluster_state: RwLock::new(Arc::new(cluster_state)),
            distribution: Arc::new(distribution),
        }
    }

    pub fn database(&self) -> &dyn BucketDatabase {
        self.database.as_ref()
    }

    pub fn cluster_state(&self) -> Arc<ClusterState> {
        self.cluster_state
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn set_cluster_state(&self, state: ClusterState) {
        let mut guard = self.cluster_state.write().unwrap_or_else(|e| e.into_inner());
        *guard = Arc::new(state);
    }

    pub fn distribution(&self) -> Arc<Distribution> {
        self.distribution.clone()
    }
}

/// All bucket spaces this distributor manages.
#[derive(Default)]
pub struct BucketSpaceRepo {
    spaces: BTreeMap<BucketSpace, DistributorBucketSpace>,
}

impl BucketSpaceRepo {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, space: BucketSpace, bucket_space: DistributorBucketSpace) {
        self.spaces.insert(space, bucket_space);
    }

    pub fn get(&self, space: BucketSpace) -> Option<&DistributorBucketSpace> {
        self.spaces.get(&space)
    }

    pub fn iter(&self) -> impl Iterator<Item = (BucketSpace, &DistributorBucketSpace)> {
        self.spaces.iter().map(|(space, bucket_space)| (*space, bucket_space))
    }

    /// Publish a new cluster state to every space.
    pub fn set_cluster_state(&self, state: &ClusterState) {
        for bucket_space in self.spaces.values() {
            bucket_space.set_cluster_state(state.clone());
        }
    }
}
