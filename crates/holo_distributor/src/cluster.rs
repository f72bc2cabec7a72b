//! Cluster state snapshot and ideal replica placement.
//!
//! The cluster state is produced and versioned by the cluster controller;
//! the distributor only reads it. `Distribution` turns a state plus a bucket
//! into the ordered list of storage nodes that should hold the bucket.

use std::collections::hash_map::DefaultHasher;
use std::collections::BTreeMap;
use std::fmt;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};

use crate::bucket::BucketId;

/// Which node population an index refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeType {
    Storage,
    Distributor,
}

/// Node (or cluster) lifecycle state.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum NodeState {
    Up,
    Initializing,
    Retired,
    Maintenance,
    Down,
    Stopping,
}

impl NodeState {
    /// One-letter form used in cluster state strings.
    pub fn short(&self) -> char {
        match self {
            NodeState::Up => 'u',
            NodeState::Initializing => 'i',
            NodeState::Retired => 'r',
            NodeState::Maintenance => 'm',
            NodeState::Down => 'd',
            NodeState::Stopping => 's',
        }
    }

    /// States in which a node may legitimately hold bucket replicas.
    pub fn may_hold_replicas(&self) -> bool {
        matches!(
            self,
            NodeState::Up | NodeState::Initializing | NodeState::Retired
        )
    }

    /// States in which a node is a placement target for new replicas.
    pub fn is_ideal_candidate(&self) -> bool {
        matches!(self, NodeState::Up | NodeState::Initializing)
    }
}

impl fmt::Display for NodeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            NodeState::Up => "Up",
            NodeState::Initializing => "Initializing",
            NodeState::Retired => "Retired",
            NodeState::Maintenance => "Maintenance",
            NodeState::Down => "Down",
            NodeState::Stopping => "Stopping",
        };
        f.write_str(name)
    }
}

fn cluster_up() -> NodeState {
    NodeState::Up
}

/// Versioned snapshot of node and cluster states.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ClusterState {
    pub version: u32,
    #[serde(default = "cluster_up")]
    pub cluster: NodeState,
    /// Storage node states; absent nodes are Down.
    #[serde(default)]
    pub storage: BTreeMap<u16, NodeState>,
    /// Distributor node states; absent nodes are Down.
    #[serde(default)]
    pub distributors: BTreeMap<u16, NodeState>,
}

impl ClusterState {
    pub fn new(version: u32) -> Self {
        Self {
            version,
            cluster: NodeState::Up,
            storage: BTreeMap::new(),
            distributors: BTreeMap::new(),
        }
    }

    /// Convenience for tests and tooling: every listed storage node Up.
    pub fn with_storage_nodes(version: u32, nodes: impl IntoIterator<Item = u16>) -> Self {
        let mut state = Self::new(version);
        for node in nodes {
            state.storage.insert(node, NodeState::Up);
        }
        state
    }

    pub fn set_node_state(&mut self, node_type: NodeType, index: u16, node_state: NodeState) {
        match node_type {
            NodeType::Storage => self.storage.insert(index, node_state),
            NodeType::Distributor => self.distributors.insert(index, node_state),
        };
    }

    pub fn node_state(&self, node_type: NodeType, index: u16) -> NodeState {
        let nodes = match node_type {
            NodeType::Storage => &self.storage,
            NodeType::Distributor => &self.distributors,
        };
        nodes.get(&index).copied().unwrap_or(NodeState::Down)
    }

    pub fn storage_node_state(&self, index: u16) -> NodeState {
        self.node_state(NodeType::Storage, index)
    }
}

impl fmt::Display for ClusterState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "version:{} cluster:{}", self.version, self.cluster.short())?;
        for (label, nodes) in [("distributor", &self.distributors), ("storage", &self.storage)] {
            write!(f, " {label}:")?;
            for (i, (index, node_state)) in nodes.iter().enumerate() {
                if i > 0 {
                    f.write_str(",")?;
                }
                write!(f, "{index}.{}", node_state.short())?;
            }
        }
        Ok(())
    }
}

fn default_redundancy() -> u16 {
    2
}

fn default_distribution_bits() -> u8 {
    16
}

/// Replica placement policy of one bucket space.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Distribution {
    /// Desired number of replicas per bucket.
    #[serde(default = "default_redundancy")]
    pub redundancy: u16,
    /// Location bits that seed placement. Buckets split beyond this level
    /// share the ideal nodes of their ancestor at this level, so split and
    /// join never move data.
    #[serde(default = "default_distribution_bits")]
    pub distribution_bits: u8,
}

impl Default for Distribution {
    fn default() -> Self {
        Self {
            redundancy: default_redundancy(),
            distribution_bits: default_distribution_bits(),
        }
    }
}

impl Distribution {
    pub fn with_redundancy(redundancy: u16) -> Self {
        Self {
            redundancy,
            ..Self::default()
        }
    }

    /// Ideal storage nodes for `bucket`, best first.
    ///
    /// Uses rendezvous hashing over nodes in Up or Initializing state, so a
    /// node entering or leaving only moves the buckets it ranks for.
    pub fn ideal_storage_nodes(&self, state: &ClusterState, bucket: BucketId) -> Vec<u16> {
        let seed_bits = bucket.used_bits().min(self.distribution_bits);
        let seed = BucketId::new(seed_bits, bucket.location()).raw();
        let mut scored = state
            .storage
            .iter()
            .filter(|(_, node_state)| node_state.is_ideal_candidate())
            .map(|(index, _)| (placement_score(seed, *index), *index))
            .collect::<Vec<_>>();
        scored.sort_by(|a, b| b.0.cmp(&a.0).then(a.1.cmp(&b.1)));
        scored
            .into_iter()
            .take(usize::from(self.redundancy))
            .map(|(_, index)| index)
            .collect()
    }
}

fn placement_score(seed: u64, node: u16) -> u64 {
    let mut hasher = DefaultHasher::new();
    seed.hash(&mut hasher);
    node.hash(&mut hasher);
    hasher.finish()
}
