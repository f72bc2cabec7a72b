//! Bucket database boundary: replica descriptors and lookup contract.
//!
//! The real database is owned elsewhere; the maintenance engine only needs
//! point lookups, family lookups (ancestors and descendants of a bucket) and
//! a full traversal for status pages. `MapBucketDatabase` is the in-memory
//! implementation used by the snapshot tool and tests.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::RwLock;

use serde::{Deserialize, Serialize};

use crate::bucket::BucketId;

/// Content summary one node reports for its replica.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BucketInfo {
    pub checksum: u32,
    pub doc_count: u32,
    pub total_doc_size: u32,
    pub meta_count: u32,
    pub ready: bool,
    pub active: bool,
    /// Info has been fetched from the node. Invalid info cannot be compared.
    pub valid: bool,
}

impl Default for BucketInfo {
    fn default() -> Self {
        Self {
            checksum: 0,
            doc_count: 0,
            total_doc_size: 0,
            meta_count: 0,
            ready: false,
            active: false,
            valid: true,
        }
    }
}

impl BucketInfo {
    pub fn new(checksum: u32, doc_count: u32, total_doc_size: u32) -> Self {
        Self {
            checksum,
            doc_count,
            total_doc_size,
            meta_count: doc_count,
            ready: false,
            active: false,
            valid: true,
        }
    }

    /// Empty replicas carry neither documents nor tombstones.
    pub fn is_empty(&self) -> bool {
        self.doc_count == 0 && self.meta_count == 0
    }

    pub fn equal_content(&self, other: &BucketInfo) -> bool {
        self.checksum == other.checksum
            && self.doc_count == other.doc_count
            && self.total_doc_size == other.total_doc_size
    }
}

/// One node's copy of a bucket.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BucketCopy {
    pub node: u16,
    #[serde(default)]
    pub info: BucketInfo,
    #[serde(default)]
    pub trusted: bool,
}

impl BucketCopy {
    pub fn new(node: u16, info: BucketInfo, trusted: bool) -> Self {
        Self {
            node,
            info,
            trusted,
        }
    }
}

impl fmt::Display for BucketCopy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "node(idx={},crc=0x{:x},docs={}/{},bytes={},trusted={},active={},ready={})",
            self.node,
            self.info.checksum,
            self.info.doc_count,
            self.info.meta_count,
            self.info.total_doc_size,
            self.trusted,
            self.info.active,
            self.info.ready,
        )
    }
}

/// Snapshot of a bucket's known replica set.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BucketDbEntry {
    pub bucket_id: BucketId,
    #[serde(default)]
    pub copies: Vec<BucketCopy>,
    /// Unix seconds of the last completed garbage collection.
    #[serde(default)]
    pub last_gc_unix_secs: u64,
    /// Mutating operations applied since the last garbage collection.
    #[serde(default)]
    pub mutations_since_gc: u64,
}

impl BucketDbEntry {
    pub fn new(bucket_id: BucketId, copies: Vec<BucketCopy>) -> Self {
        Self {
            bucket_id,
            copies,
            last_gc_unix_secs: 0,
            mutations_since_gc: 0,
        }
    }

    /// An entry with an unset id refers to a bucket that is already gone.
    pub fn valid(&self) -> bool {
        self.bucket_id.is_set()
    }

    pub fn has_copies(&self) -> bool {
        !self.copies.is_empty()
    }

    pub fn nodes(&self) -> impl Iterator<Item = u16> + '_ {
        self.copies.iter().map(|c| c.node)
    }

    pub fn copy_on(&self, node: u16) -> Option<&BucketCopy> {
        self.copies.iter().find(|c| c.node == node)
    }

    pub fn has_copy_on(&self, node: u16) -> bool {
        self.copy_on(node).is_some()
    }

    /// All replicas report identical content.
    pub fn copies_in_sync(&self) -> bool {
        copies_in_sync(&self.copies)
    }

    pub fn all_info_valid(&self) -> bool {
        self.copies.iter().all(|c| c.info.valid)
    }

    pub fn highest_doc_count(&self) -> u32 {
        self.copies.iter().map(|c| c.info.doc_count).max().unwrap_or(0)
    }

    pub fn highest_total_doc_size(&self) -> u32 {
        self.copies
            .iter()
            .map(|c| c.info.total_doc_size)
            .max()
            .unwrap_or(0)
    }

    pub fn highest_meta_count(&self) -> u32 {
        self.copies.iter().map(|c| c.info.meta_count).max().unwrap_or(0)
    }

    pub fn active_nodes(&self) -> Vec<u16> {
        self.copies
            .iter()
            .filter(|c| c.info.active)
            .map(|c| c.node)
            .collect()
    }
}

/// The given replicas report identical, valid content.
pub fn copies_in_sync<'a>(copies: impl IntoIterator<Item = &'a BucketCopy>) -> bool {
    let mut iter = copies.into_iter();
    let Some(first) = iter.next() else {
        return true;
    };
    first.info.valid && iter.all(|c| c.info.valid && c.info.equal_content(&first.info))
}

impl fmt::Display for BucketDbEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} : ", self.bucket_id)?;
        for (i, copy) in self.copies.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{copy}")?;
        }
        write!(f, " (last gc {})", self.last_gc_unix_secs)
    }
}

/// Read contract the maintenance engine needs from a bucket database.
pub trait BucketDatabase: Send + Sync + 'static {
    /// Exact lookup.
    fn get(&self, bucket: BucketId) -> Option<BucketDbEntry>;

    /// Every entry that contains `bucket` or is contained by it: ancestors
    /// from the root down, then `bucket` and its descendants.
    fn get_all(&self, bucket: BucketId) -> Vec<BucketDbEntry>;

    /// Visit every entry in split-tree order until `visit` returns `false`.
    fn for_each(&self, visit: &mut dyn FnMut(&BucketDbEntry) -> bool);
}

/// Sort key placing a bucket's subtree in one contiguous range: location
/// bits reversed into the high bits, used bits in the low 6.
fn db_key(bucket: BucketId) -> u64 {
    bucket.location().reverse_bits() | u64::from(bucket.used_bits())
}

/// Highest key inside `bucket`'s subtree.
fn db_subtree_end(bucket: BucketId) -> u64 {
    bucket.location().reverse_bits() | (u64::MAX >> u32::from(bucket.used_bits()))
}

/// `BTreeMap`-backed bucket database keyed in split-tree order.
#[derive(Debug, Default)]
pub struct MapBucketDatabase {
    entries: RwLock<BTreeMap<u64, BucketDbEntry>>,
}

impl MapBucketDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_entries(entries: impl IntoIterator<Item = BucketDbEntry>) -> Self {
        let db = Self::new();
        for entry in entries {
            db.update(entry);
        }
        db
    }

    /// Insert or replace the entry for its bucket id.
    pub fn update(&self, entry: BucketDbEntry) {
        let mut guard = self.entries.write().unwrap_or_else(|e| e.into_inner());
        guard.insert(db_key(entry.bucket_id), entry);
    }

    pub fn len(&self) -> usize {
        self.entries.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl BucketDatabase for MapBucketDatabase {
    fn get(&self, bucket: BucketId) -> Option<BucketDbEntry> {
        let guard = self.entries.read().unwrap_or_else(|e| e.into_inner());
        guard.get(&db_key(bucket)).cloned()
    }

    fn get_all(&self, bucket: BucketId) -> Vec<BucketDbEntry> {
        let guard = self.entries.read().unwrap_or_else(|e| e.into_inner());
        let mut family = Vec::new();
        let mut ancestor = bucket;
        while ancestor.used_bits() > 1 {
            ancestor = ancestor.parent();
            if let Some(entry) = guard.get(&db_key(ancestor)) {
                family.push(entry.clone());
            }
        }
        family.reverse();
        family.extend(
            guard
                .range(db_key(bucket)..=db_subtree_end(bucket))
                .map(|(_, entry)| entry.clone()),
        );
        family
    }

    fn for_each(&self, visit: &mut dyn FnMut(&BucketDbEntry) -> bool) {
        // Clone out so visitors can call back into the database.
        let snapshot = {
            let guard = self.entries.read().unwrap_or_else(|e| e.into_inner());
            guard.values().cloned().collect::<Vec<_>>()
        };
        for entry in &snapshot {
            if !visit(entry) {
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(id: BucketId, nodes: &[u16]) -> BucketDbEntry {
        BucketDbEntry::new(
            id,
            nodes
                .iter()
                .map(|n| BucketCopy::new(*n, BucketInfo::new(0x10, 5, 500), true))
                .collect(),
        )
    }

    #[test]
    fn get_all_returns_ancestors_and_descendants() {
        let target = BucketId::new(17, 0x1);
        let db = MapBucketDatabase::from_entries([
            entry(BucketId::new(16, 0x1), &[0]),
            entry(target, &[1]),
            entry(BucketId::new(18, 0x2_0001), &[2]),
            entry(target.sibling(), &[3]),
        ]);
        let family = db
            .get_all(target)
            .into_iter()
            .map(|e| e.bucket_id)
            .collect::<Vec<_>>();
        assert_eq!(family.len(), 3);
        assert!(family.contains(&target));
        assert!(!family.contains(&target.sibling()));
    }

    #[test]
    fn get_all_reads_only_the_bucket_family() {
        let target = BucketId::new(17, 0x1_0003);
        let mut entries = vec![
            entry(BucketId::new(1, 0x1), &[0]),
            entry(BucketId::new(16, 0x3), &[0]),
            entry(target, &[1]),
            entry(target.child(false), &[2]),
            entry(target.child(true).child(true), &[2]),
        ];
        // Relatives that are neither ancestors nor descendants.
        entries.push(entry(target.sibling(), &[3]));
        entries.push(entry(target.sibling().child(true), &[3]));
        entries.push(entry(BucketId::new(16, 0x2), &[3]));
        entries.push(entry(BucketId::new(18, 0x3), &[3]));
        for location in 0..1_000u64 {
            entries.push(entry(BucketId::new(20, location << 4), &[3]));
        }
        let db = MapBucketDatabase::from_entries(entries);
        assert_eq!(db.len(), 1_009);

        let family = db
            .get_all(target)
            .into_iter()
            .map(|e| e.bucket_id)
            .collect::<Vec<_>>();
        assert_eq!(
            family,
            vec![
                BucketId::new(1, 0x1),
                BucketId::new(16, 0x3),
                target,
                target.child(false),
                target.child(true).child(true),
            ]
        );
        assert!(family.iter().all(|id| id.overlaps(&target)));
    }

    #[test]
    fn subtree_keys_are_contiguous() {
        let bucket = BucketId::new(16, 0x1234);
        let mut descendant = bucket;
        for high in [true, false, true, true] {
            descendant = descendant.child(high);
            assert!(db_key(descendant) > db_key(bucket));
            assert!(db_key(descendant) <= db_subtree_end(bucket));
        }
        for outside in [bucket.parent(), bucket.sibling(), bucket.sibling().child(false)] {
            let key = db_key(outside);
            assert!(key < db_key(bucket) || key > db_subtree_end(bucket));
        }
    }

    #[test]
    fn poisoned_lock_still_serves_reads() {
        let id = BucketId::new(16, 0x1);
        let db = std::sync::Arc::new(MapBucketDatabase::from_entries([entry(id, &[0])]));
        let writer = db.clone();
        let joined = std::thread::spawn(move || {
            let _guard = writer.entries.write().expect("write lock");
            panic!("writer died holding the lock");
        })
        .join();
        assert!(joined.is_err());
        assert!(db.entries.is_poisoned());
        assert_eq!(db.len(), 1);
        assert!(!db.is_empty());
        assert!(db.get(id).is_some());
    }

    #[test]
    fn for_each_stops_when_visitor_declines() {
        let db = MapBucketDatabase::from_entries([
            entry(BucketId::new(16, 0x1), &[0]),
            entry(BucketId::new(16, 0x2), &[0]),
            entry(BucketId::new(16, 0x3), &[0]),
        ]);
        let mut seen = 0;
        db.for_each(&mut |_| {
            seen += 1;
            seen < 2
        });
        assert_eq!(seen, 2);
    }

    #[test]
    fn copies_in_sync_requires_equal_valid_content() {
        let mut e = entry(BucketId::new(16, 0x1), &[0, 1]);
        assert!(e.copies_in_sync());
        e.copies[1].info.checksum = 0x11;
        assert!(!e.copies_in_sync());
        e.copies[1].info.checksum = 0x10;
        e.copies[1].info.valid = false;
        assert!(!e.copies_in_sync());
    }
}
