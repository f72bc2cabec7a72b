//! HTML status fragments listing what each bucket needs.
//!
//! One line per database entry: the bucket id, the reasons of every operation
//! `generate_all` produces (emphasized when there are any), then the entry
//! itself. The fragments are embedded in the distributor's status page.

use std::fmt;

use crate::bucket::{Bucket, BucketSpace};
use crate::bucket_db::BucketDbEntry;
use crate::ideal_state_manager::IdealStateManager;
use crate::maintenance::NodeMaintenanceStatsTracker;

impl IdealStateManager {
    /// Status line for one entry of `space`.
    pub fn write_bucket_status(
        &self,
        space: BucketSpace,
        entry: &BucketDbEntry,
        stats: &mut NodeMaintenanceStatsTracker,
        out: &mut impl fmt::Write,
    ) -> fmt::Result {
        let operations = self.generate_all(Bucket::new(space, entry.bucket_id), stats);
        if operations.is_empty() {
            write!(out, "{} : ", entry.bucket_id)?;
        } else {
            write!(out, "<b>{}:</b> <i> : ", entry.bucket_id)?;
        }
        for (i, op) in operations.iter().enumerate() {
            if i > 0 {
                out.write_str(", ")?;
            }
            write!(out, "{}: {}", op.name(), op.detailed_reason())?;
        }
        if !operations.is_empty() {
            out.write_str("</i> ")?;
        }
        writeln!(out, "[{entry}]<br>")
    }

    /// Header plus one status line per entry of `space`'s database.
    pub fn dump_bucket_space_db_status(
        &self,
        space: BucketSpace,
        out: &mut impl fmt::Write,
    ) -> fmt::Result {
        writeln!(out, "<h2>{} - {}</h2>", space, space.0)?;
        let Some(bucket_space) = self.bucket_spaces().get(space) else {
            return Ok(());
        };
        let mut stats = NodeMaintenanceStatsTracker::new();
        let mut result = Ok(());
        bucket_space.database().for_each(&mut |entry| {
            result = self.write_bucket_status(space, entry, &mut stats, out);
            result.is_ok()
        });
        result
    }

    /// Status of every bucket space.
    pub fn get_bucket_status(&self, out: &mut impl fmt::Write) -> fmt::Result {
        if let Some(default_space) = self.bucket_spaces().get(BucketSpace::DEFAULT) {
            tracing::debug!(
                version = default_space.cluster_state().version,
                "dumping bucket database valid at cluster state version"
            );
        }
        let spaces = self
            .bucket_spaces()
            .iter()
            .map(|(space, _)| space)
            .collect::<Vec<_>>();
        for space in spaces {
            self.dump_bucket_space_db_status(space, out)?;
        }
        Ok(())
    }
}
