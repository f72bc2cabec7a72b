//! Ideal state manager.
//!
//! For a bucket, the manager builds a `StateCheckerContext` from the bucket
//! database and the current cluster state, runs the state checker chain over
//! it and turns the verdicts into a maintenance decision. It exposes three
//! modes:
//!
//! - `prioritize`: only the arbitrated priority and operation type, used to
//!   rank buckets in the maintenance queue.
//! - `generate`: the single operation that wins arbitration.
//! - `generate_all`: one operation per checker that asks for maintenance,
//!   used by status pages.
//!
//! `generate_intercepting_split` is separate: it lets the write path ask
//! whether a bucket it is about to grow must be split first.
//!
//! All methods take `&self`. The manager is shared as `Arc` between the
//! scheduler and status threads; every evaluation builds its own context from
//! snapshots taken when it starts.

use std::sync::{Arc, RwLock, Weak};

use crate::arbiter::PriorityArbiter;
use crate::bucket::{Bucket, BucketSpace};
use crate::bucket_db::BucketDbEntry;
use crate::bucket_space::{BucketSpaceRepo, DistributorBucketSpace};
use crate::clock::Clock;
use crate::cluster::{NodeState, NodeType};
use crate::config::DistributorConfig;
use crate::liveness::PhantomReplicaGuard;
use crate::maintenance::{MaintenancePriorityAndType, NodeMaintenanceStatsTracker};
use crate::operation::IdealStateOperation;
use crate::state_checker::{
    BucketFamily, EvaluationSnapshot, SplitBucketStateChecker, StateChecker, StateCheckerContext,
};

pub struct IdealStateManager {
    node_index: u16,
    bucket_spaces: BucketSpaceRepo,
    config: RwLock<Arc<DistributorConfig>>,
    /// Fixed at construction; the order is the arbitration order.
    state_checkers: Vec<StateChecker>,
    split_checker: StateChecker,
    phantom_replicas: PhantomReplicaGuard,
    clock: Arc<dyn Clock>,
    self_ref: Weak<IdealStateManager>,
}

impl IdealStateManager {
    /// Build a manager for distributor `node_index`.
    ///
    /// The activation checker is installed only if `config` manages active
    /// replicas; later config updates do not change the chain.
    pub fn new(
        node_index: u16,
        config: DistributorConfig,
        bucket_spaces: BucketSpaceRepo,
        clock: Arc<dyn Clock>,
    ) -> Arc<Self> {
        let state_checkers = StateChecker::default_chain(config.manage_active_bucket_copies);
        Arc::new_cyclic(|self_ref| Self {
            node_index,
            bucket_spaces,
            config: RwLock::new(Arc::new(config)),
            state_checkers,
            split_checker: StateChecker::Split(SplitBucketStateChecker),
            phantom_replicas: PhantomReplicaGuard::new(),
            clock,
            self_ref: self_ref.clone(),
        })
    }

    pub fn bucket_spaces(&self) -> &BucketSpaceRepo {
        &self.bucket_spaces
    }

    pub fn state_checkers(&self) -> &[StateChecker] {
        &self.state_checkers
    }

    pub fn config(&self) -> Arc<DistributorConfig> {
        self.config
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Publish a new configuration. Evaluations already running keep the
    /// snapshot they started with.
    pub fn set_config(&self, config: DistributorConfig) {
        let mut guard = self.config.write().unwrap_or_else(|e| e.into_inner());
        *guard = Arc::new(config);
    }

    pub fn has_logged_phantom_replica_warning(&self) -> bool {
        self.phantom_replicas.has_logged()
    }

    /// This distributor and the cluster are both Up in the default space's
    /// cluster state.
    pub fn i_am_up(&self) -> bool {
        let Some(space) = self.bucket_spaces.get(BucketSpace::DEFAULT) else {
            return false;
        };
        let state = space.cluster_state();
        state.node_state(NodeType::Distributor, self.node_index) == NodeState::Up
            && state.cluster == NodeState::Up
    }

    /// Arbitrated priority and type of the maintenance `bucket` needs.
    pub fn prioritize(
        &self,
        bucket: Bucket,
        stats: &mut NodeMaintenanceStatsTracker,
    ) -> MaintenancePriorityAndType {
        let Some(mut ctx) = self.build_context(bucket, stats) else {
            return MaintenancePriorityAndType::no_maintenance();
        };
        self.verify_only_live_nodes(&ctx);
        self.run_state_checkers(&mut ctx).priority_and_type()
    }

    /// The highest precedence operation for `bucket`, if any.
    pub fn generate(&self, bucket: Bucket) -> Option<IdealStateOperation> {
        let mut stats = NodeMaintenanceStatsTracker::new();
        let mut ctx = self.build_context(bucket, &mut stats)?;
        self.verify_only_live_nodes(&ctx);
        let result = self.run_state_checkers(&mut ctx).into_result();
        result.create_operation().map(|op| self.bind(op))
    }

    /// One operation per active checker that asks for maintenance, in chain
    /// order.
    pub fn generate_all(
        &self,
        bucket: Bucket,
        stats: &mut NodeMaintenanceStatsTracker,
    ) -> Vec<IdealStateOperation> {
        let Some(mut ctx) = self.build_context(bucket, stats) else {
            return Vec::new();
        };
        let mut operations = Vec::new();
        for checker in &self.state_checkers {
            if !self.is_active(&ctx, checker) {
                continue;
            }
            let result = checker.check(&mut ctx);
            if result.requires_maintenance() {
                ctx.stats.record_pending(result.op_type());
            }
            if let Some(op) = result.create_operation() {
                operations.push(self.bind(op));
            }
        }
        operations
    }

    /// Split check for a bucket the write path is about to grow.
    ///
    /// Only the split checker runs, against `entry` as given: no database
    /// lookups and no liveness check. The operation takes `priority` as its
    /// message priority. Entries that are invalid or have no replicas yield
    /// nothing.
    pub fn generate_intercepting_split(
        &self,
        space: BucketSpace,
        entry: &BucketDbEntry,
        priority: u8,
    ) -> Option<IdealStateOperation> {
        if !entry.valid() || !entry.has_copies() {
            return None;
        }
        let bucket_space = self.bucket_spaces.get(space)?;
        let bucket = Bucket::new(space, entry.bucket_id);
        let mut stats = NodeMaintenanceStatsTracker::new();
        let mut ctx = StateCheckerContext::for_entry(
            bucket,
            entry.clone(),
            self.snapshot(bucket_space),
            &mut stats,
        );
        let mut op = self.split_checker.check(&mut ctx).create_operation()?;
        op.set_priority(priority);
        Some(self.bind(op))
    }

    fn snapshot(&self, bucket_space: &DistributorBucketSpace) -> EvaluationSnapshot {
        EvaluationSnapshot {
            cluster_state: bucket_space.cluster_state(),
            distribution: bucket_space.distribution(),
            config: self.config(),
            now_unix_secs: self.clock.now_unix_secs(),
        }
    }

    fn build_context<'a>(
        &self,
        bucket: Bucket,
        stats: &'a mut NodeMaintenanceStatsTracker,
    ) -> Option<StateCheckerContext<'a>> {
        let Some(bucket_space) = self.bucket_spaces.get(bucket.space) else {
            tracing::debug!(bucket = %bucket, "no such bucket space");
            return None;
        };
        let family = BucketFamily::gather(bucket_space.database(), bucket);
        StateCheckerContext::from_family(family, self.snapshot(bucket_space), stats)
    }

    fn verify_only_live_nodes(&self, ctx: &StateCheckerContext<'_>) {
        self.phantom_replicas
            .check(&ctx.bucket, &ctx.entry, &ctx.cluster_state);
    }

    fn is_active(&self, ctx: &StateCheckerContext<'_>, checker: &StateChecker) -> bool {
        if ctx.config.state_checker_is_active(checker.name()) {
            return true;
        }
        tracing::trace!(
            bucket = %ctx.bucket,
            checker = checker.name(),
            "skipping state checker, it is not active"
        );
        false
    }

    fn run_state_checkers(&self, ctx: &mut StateCheckerContext<'_>) -> PriorityArbiter {
        let mut arbiter = PriorityArbiter::new();
        for checker in &self.state_checkers {
            if !self.is_active(ctx, checker) {
                continue;
            }
            let result = checker.check(ctx);
            if result.requires_maintenance() {
                ctx.stats.record_pending(result.op_type());
            }
            arbiter.offer(checker.name(), result);
        }
        if let Some(winner) = arbiter.winner() {
            tracing::trace!(bucket = %ctx.bucket, checker = winner, "state checker won arbitration");
        }
        arbiter
    }

    fn bind(&self, mut op: IdealStateOperation) -> IdealStateOperation {
        op.set_ideal_state_manager(self.self_ref.clone());
        op
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bucket::BucketId;
    use crate::bucket_db::{BucketCopy, BucketInfo, MapBucketDatabase};
    use crate::clock::ManualClock;
    use crate::cluster::{ClusterState, Distribution};
    use crate::maintenance::MaintenancePriority;

    fn manager(entries: Vec<BucketDbEntry>, state: ClusterState) -> Arc<IdealStateManager> {
        let mut repo = BucketSpaceRepo::new();
        repo.add(
            BucketSpace::DEFAULT,
            DistributorBucketSpace::new(
                Arc::new(MapBucketDatabase::from_entries(entries)),
                state,
                Distribution::with_redundancy(2),
            ),
        );
        IdealStateManager::new(
            0,
            DistributorConfig::default(),
            repo,
            Arc::new(ManualClock::new(1_000)),
        )
    }

    #[test]
    fn i_am_up_requires_node_and_cluster_up() {
        let mut state = ClusterState::with_storage_nodes(1, 0..2);
        assert!(!manager(vec![], state.clone()).i_am_up());

        state.set_node_state(NodeType::Distributor, 0, NodeState::Up);
        assert!(manager(vec![], state.clone()).i_am_up());

        state.set_node_state(NodeType::Distributor, 0, NodeState::Initializing);
        assert!(!manager(vec![], state.clone()).i_am_up());

        state.set_node_state(NodeType::Distributor, 0, NodeState::Up);
        state.cluster = NodeState::Down;
        assert!(!manager(vec![], state).i_am_up());
    }

    #[test]
    fn unknown_space_yields_nothing() {
        let manager = manager(vec![], ClusterState::with_storage_nodes(1, 0..2));
        let bucket = Bucket::new(BucketSpace::GLOBAL, BucketId::new(16, 1));
        let mut stats = NodeMaintenanceStatsTracker::new();
        assert!(!manager.prioritize(bucket, &mut stats).requires_maintenance());
        assert!(manager.generate(bucket).is_none());
        assert!(stats.is_empty());
    }

    #[test]
    fn set_config_is_seen_by_next_evaluation() {
        let id = BucketId::new(16, 1);
        let copy = BucketCopy::new(0, BucketInfo::new(1, 2_000, 10), true);
        let manager = manager(
            vec![BucketDbEntry::new(id, vec![copy])],
            ClusterState::with_storage_nodes(1, [0]),
        );
        let bucket = Bucket::new(BucketSpace::DEFAULT, id);
        let mut stats = NodeMaintenanceStatsTracker::new();
        assert_eq!(
            manager.prioritize(bucket, &mut stats).priority,
            MaintenancePriority::High
        );

        let mut config = DistributorConfig::default();
        config.split_count = 0;
        manager.set_config(config);
        assert!(!manager.prioritize(bucket, &mut stats).requires_maintenance());
    }
}
