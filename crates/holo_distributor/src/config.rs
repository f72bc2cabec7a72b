//! Distributor maintenance configuration.
//!
//! Thresholds here are opaque to the ideal state manager itself; individual
//! state checkers read the knobs they care about from the snapshot carried
//! in their context.

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::Context;
use serde::{Deserialize, Serialize};

/// Message priorities assigned to generated operations (lower is more urgent).
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct MaintenancePriorities {
    pub merge_move_to_ideal_node: u8,
    pub merge_out_of_sync_copies: u8,
    pub merge_too_few_copies: u8,
    pub activate_no_existing_active: u8,
    pub activate_with_existing_active: u8,
    pub delete_bucket_copy: u8,
    pub join_buckets: u8,
    pub split_distribution_bits: u8,
    pub split_large_bucket: u8,
    pub split_inconsistent_bucket: u8,
    pub garbage_collection: u8,
}

impl Default for MaintenancePriorities {
    fn default() -> Self {
        Self {
            merge_move_to_ideal_node: 165,
            merge_out_of_sync_copies: 120,
            merge_too_few_copies: 120,
            activate_no_existing_active: 100,
            activate_with_existing_active: 100,
            delete_bucket_copy: 100,
            join_buckets: 155,
            split_distribution_bits: 200,
            split_large_bucket: 175,
            split_inconsistent_bucket: 110,
            garbage_collection: 200,
        }
    }
}

/// Configuration consumed by the state checker chain.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct DistributorConfig {
    /// Split a bucket holding more documents than this. 0 disables.
    pub split_count: u32,
    /// Split a bucket larger than this many bytes. 0 disables.
    pub split_size: u32,
    /// Join siblings whose combined document count is at most this. 0 disables.
    pub join_count: u32,
    /// Join siblings whose combined size is at most this many bytes. 0 disables.
    pub join_size: u32,
    /// Buckets are split to at least this many used bits and never joined below it.
    pub minimum_split_bits: u8,
    /// Allow joining a bucket into its parent when no sibling exists.
    pub enable_join_for_sibling_less_buckets: bool,
    /// Garbage collect a bucket at least this often. 0 disables.
    pub garbage_collection_interval_secs: u64,
    /// Garbage collect after this many mutations. 0 disables.
    pub garbage_collection_max_mutations: u64,
    /// Track which replica is active and install the activation checker.
    pub manage_active_bucket_copies: bool,
    /// Per-checker activation by checker name; missing names are active.
    pub state_checkers: BTreeMap<String, bool>,
    pub priorities: MaintenancePriorities,
}

impl Default for DistributorConfig {
    fn default() -> Self {
        Self {
            split_count: 1024,
            split_size: 32 * 1024 * 1024,
            join_count: 512,
            join_size: 16 * 1024 * 1024,
            minimum_split_bits: 16,
            enable_join_for_sibling_less_buckets: false,
            garbage_collection_interval_secs: 0,
            garbage_collection_max_mutations: 0,
            manage_active_bucket_copies: false,
            state_checkers: BTreeMap::new(),
            priorities: MaintenancePriorities::default(),
        }
    }
}

impl DistributorConfig {
    pub fn state_checker_is_active(&self, name: &str) -> bool {
        self.state_checkers.get(name).copied().unwrap_or(true)
    }

    pub fn set_state_checker_active(&mut self, name: &str, active: bool) {
        self.state_checkers.insert(name.to_string(), active);
    }

    pub fn join_enabled(&self) -> bool {
        self.join_count > 0 || self.join_size > 0
    }

    /// Reject threshold combinations that would split and join the same bucket
    /// back and forth.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.split_count > 0 && self.join_count > self.split_count {
            anyhow::bail!(
                "join_count ({}) must not exceed split_count ({})",
                self.join_count,
                self.split_count
            );
        }
        if self.split_size > 0 && self.join_size > self.split_size {
            anyhow::bail!(
                "join_size ({}) must not exceed split_size ({})",
                self.join_size,
                self.split_size
            );
        }
        if self.minimum_split_bits == 0 || self.minimum_split_bits > crate::bucket::MAX_USED_BITS {
            anyhow::bail!(
                "minimum_split_bits must be within 1..={}, got {}",
                crate::bucket::MAX_USED_BITS,
                self.minimum_split_bits
            );
        }
        Ok(())
    }

    pub fn from_json_str(raw: &str) -> anyhow::Result<Self> {
        let config: Self = serde_json::from_str(raw).context("parse distributor config json")?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("read distributor config {}", path.display()))?;
        Self::from_json_str(&raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn missing_checker_names_default_to_active() {
        let mut config = DistributorConfig::default();
        assert!(config.state_checker_is_active("SplitBucket"));
        config.set_state_checker_active("SplitBucket", false);
        assert!(!config.state_checker_is_active("SplitBucket"));
        assert!(config.state_checker_is_active("JoinBuckets"));
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let config = DistributorConfig::from_json_str(
            r#"{"split_count": 2000, "state_checkers": {"GarbageCollection": false},
                "priorities": {"join_buckets": 10}}"#,
        )
        .expect("parse config");
        assert_eq!(config.split_count, 2000);
        assert_eq!(config.join_count, 512);
        assert_eq!(config.priorities.join_buckets, 10);
        assert_eq!(config.priorities.garbage_collection, 200);
        assert!(!config.state_checker_is_active("GarbageCollection"));
    }

    #[test]
    fn join_threshold_above_split_is_rejected() {
        let err = DistributorConfig::from_json_str(r#"{"split_count": 100, "join_count": 200}"#)
            .expect_err("config should be rejected");
        assert!(err.to_string().contains("join_count"));
    }

    #[test]
    fn loads_from_file() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        write!(file, r#"{{"manage_active_bucket_copies": true}}"#).expect("write config");
        let config = DistributorConfig::from_json_file(file.path()).expect("load config");
        assert!(config.manage_active_bucket_copies);

        let missing = DistributorConfig::from_json_file(Path::new("/nonexistent/holo.json"))
            .expect_err("missing file should fail");
        assert!(missing.to_string().contains("read distributor config"));
    }
}
