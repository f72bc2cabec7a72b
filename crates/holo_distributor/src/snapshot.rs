//! JSON snapshots of a distributor's view, for offline inspection.
//!
//! A snapshot carries one cluster state, an optional config and, per bucket
//! space, its distribution and bucket database contents:
//!
//! ```json
//! {
//!   "cluster_state": { "version": 7, "storage": { "0": "up", "1": "down" } },
//!   "spaces": [
//!     { "space": 1, "distribution": { "redundancy": 2 }, "buckets": [] }
//!   ]
//! }
//! ```

use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::bucket::BucketSpace;
use crate::bucket_db::{BucketDbEntry, MapBucketDatabase};
use crate::bucket_space::{BucketSpaceRepo, DistributorBucketSpace};
use crate::cluster::{ClusterState, Distribution};
use crate::config::DistributorConfig;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpaceSnapshot {
    pub space: BucketSpace,
    #[serde(default)]
    pub distribution: Distribution,
    #[serde(default)]
    pub buckets: Vec<BucketDbEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    pub cluster_state: ClusterState,
    #[serde(default)]
    pub config: Option<DistributorConfig>,
    pub spaces: Vec<SpaceSnapshot>,
}

impl Snapshot {
    pub fn from_json_str(raw: &str) -> anyhow::Result<Self> {
        let snapshot: Self = serde_json::from_str(raw).context("parse snapshot json")?;
        snapshot.validate()?;
        Ok(snapshot)
    }

    pub fn from_json_file(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("read snapshot {}", path.display()))?;
        Self::from_json_str(&raw).with_context(|| format!("load snapshot {}", path.display()))
    }

    fn validate(&self) -> anyhow::Result<()> {
        let mut seen = BTreeSet::new();
        for space in &self.spaces {
            if !seen.insert(space.space) {
                anyhow::bail!("bucket space {} listed more than once", space.space);
            }
            if space.distribution.redundancy == 0 {
                anyhow::bail!("bucket space {} has zero redundancy", space.space);
            }
            if let Some(entry) = space.buckets.iter().find(|e| e.bucket_id.used_bits() == 0) {
                anyhow::bail!(
                    "bucket space {} has entry {} without used bits",
                    space.space,
                    entry.bucket_id
                );
            }
        }
        if let Some(config) = &self.config {
            config.validate().context("snapshot config")?;
        }
        Ok(())
    }

    /// Build in-memory bucket spaces. Every space gets the snapshot's
    /// cluster state.
    pub fn into_repo(self) -> (BucketSpaceRepo, Option<DistributorConfig>) {
        let mut repo = BucketSpaceRepo::new();
        for space in self.spaces {
            let bucket_count = space.buckets.len();
            let database = MapBucketDatabase::from_entries(space.buckets);
            repo.add(
                space.space,
                DistributorBucketSpace::new(
                    Arc::new(database),
                    self.cluster_state.clone(),
                    space.distribution,
                ),
            );
            tracing::debug!(space = %space.space, buckets = bucket_count, "loaded bucket space");
        }
        (repo, self.config)
    }
}
