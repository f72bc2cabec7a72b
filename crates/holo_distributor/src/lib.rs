//! Ideal-state maintenance scheduling for HoloStore bucket replicas.
//!
//! For every bucket the distributor owns, this crate decides whether its
//! replica placement and content deviate from the ideal state and which
//! maintenance operation (split, join, merge, remove, garbage collection or
//! activation) should run next. It only decides; executing operations is
//! left to the caller.
//!
//! The entry point is `IdealStateManager`. It reads bucket databases and
//! cluster state through `BucketSpaceRepo`, runs the `StateChecker` chain
//! and arbitrates their verdicts.

pub mod arbiter;
pub mod bucket;
pub mod bucket_db;
pub mod bucket_space;
pub mod clock;
pub mod cluster;
pub mod config;
pub mod ideal_state_manager;
pub mod liveness;
pub mod maintenance;
pub mod operation;
pub mod snapshot;
pub mod state_checker;
pub mod status;

pub use bucket::{Bucket, BucketId, BucketSpace};
pub use bucket_db::{BucketCopy, BucketDatabase, BucketDbEntry, BucketInfo, MapBucketDatabase};
pub use bucket_space::{BucketSpaceRepo, DistributorBucketSpace};
pub use clock::{Clock, ManualClock, SystemClock};
pub use cluster::{ClusterState, Distribution, NodeState, NodeType};
pub use config::DistributorConfig;
pub use ideal_state_manager::IdealStateManager;
pub use maintenance::{
    MaintenanceOperationType, MaintenancePriority, MaintenancePriorityAndType,
    NodeMaintenanceStatsTracker,
};
pub use operation::{IdealStateOperation, OperationKind};
pub use snapshot::Snapshot;
pub use state_checker::{StateChecker, StateCheckerResult};
