//! Bucket identity and split-tree arithmetic.
//!
//! A `BucketId` packs the split level ("used bits") into the top 6 bits and
//! the location bits into the low 58 bits. Only the low `used_bits` location
//! bits are significant; everything above them is kept zeroed so two ids for
//! the same bucket always compare equal.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Number of bits reserved for the used-bits count.
const COUNT_BITS: u32 = 6;
/// Highest split level a bucket can reach.
pub const MAX_USED_BITS: u8 = 58;

/// Identifier of one bucket in the split tree.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BucketId(u64);

impl BucketId {
    /// Build a bucket id from a split level and raw location bits. Location
    /// bits above `used_bits` are dropped.
    pub fn new(used_bits: u8, location: u64) -> Self {
        let used_bits = used_bits.min(MAX_USED_BITS);
        let location = location & location_mask(used_bits);
        Self((u64::from(used_bits) << (64 - COUNT_BITS)) | location)
    }

    /// Reinterpret a raw 64-bit id, normalizing stray location bits.
    pub fn from_raw(raw: u64) -> Self {
        let used_bits = (raw >> (64 - COUNT_BITS)) as u8;
        Self::new(used_bits, raw)
    }

    pub fn raw(&self) -> u64 {
        self.0
    }

    pub fn used_bits(&self) -> u8 {
        (self.0 >> (64 - COUNT_BITS)) as u8
    }

    /// Significant location bits (without the used-bits header).
    pub fn location(&self) -> u64 {
        self.0 & location_mask(self.used_bits())
    }

    /// The zero id is used for "no bucket".
    pub fn is_set(&self) -> bool {
        self.0 != 0
    }

    /// Bucket one level up the split tree. The root is its own parent.
    pub fn parent(&self) -> Self {
        let used = self.used_bits();
        if used <= 1 {
            return *self;
        }
        Self::new(used - 1, self.location())
    }

    /// Bucket sharing the same parent, i.e. the join partner.
    pub fn sibling(&self) -> Self {
        let used = self.used_bits();
        if used == 0 {
            return *self;
        }
        Self::new(used, self.location() ^ (1u64 << (used - 1)))
    }

    /// One of the two buckets produced by splitting this one.
    pub fn child(&self, high_bit: bool) -> Self {
        let used = self.used_bits();
        if used >= MAX_USED_BITS {
            return *self;
        }
        let bit = if high_bit { 1u64 << used } else { 0 };
        Self::new(used + 1, self.location() | bit)
    }

    /// Whether `other` is this bucket or one of its descendants.
    pub fn contains(&self, other: &BucketId) -> bool {
        let used = self.used_bits();
        if other.used_bits() < used {
            return false;
        }
        (other.location() & location_mask(used)) == self.location()
    }

    /// Whether the two buckets overlap in the split tree.
    pub fn overlaps(&self, other: &BucketId) -> bool {
        self.contains(other) || other.contains(self)
    }
}

fn location_mask(used_bits: u8) -> u64 {
    if used_bits == 0 {
        0
    } else {
        u64::MAX >> (64 - u32::from(used_bits))
    }
}

impl fmt::Display for BucketId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BucketId(0x{:016x})", self.0)
    }
}

impl FromStr for BucketId {
    type Err = anyhow::Error;

    /// Accepts `0x`-prefixed hex, `BucketId(0x…)`, or decimal.
    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let trimmed = raw.trim();
        let inner = trimmed
            .strip_prefix("BucketId(")
            .and_then(|s| s.strip_suffix(')'))
            .unwrap_or(trimmed);
        let value = if let Some(hex) = inner
            .strip_prefix("0x")
            .or_else(|| inner.strip_prefix("0X"))
        {
            u64::from_str_radix(hex, 16)
                .map_err(|err| anyhow::anyhow!("invalid hex bucket id {raw:?}: {err}"))?
        } else {
            inner
                .parse::<u64>()
                .map_err(|err| anyhow::anyhow!("invalid bucket id {raw:?}: {err}"))?
        };
        Ok(Self::from_raw(value))
    }
}

/// Partition namespace for buckets.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BucketSpace(pub u64);

impl BucketSpace {
    pub const DEFAULT: BucketSpace = BucketSpace(1);
    pub const GLOBAL: BucketSpace = BucketSpace(2);

    /// Fixed name for well-known spaces.
    pub fn name(&self) -> Option<&'static str> {
        match *self {
            Self::DEFAULT => Some("default"),
            Self::GLOBAL => Some("global"),
            _ => None,
        }
    }
}

impl fmt::Display for BucketSpace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            Some(name) => f.write_str(name),
            None => write!(f, "BucketSpace({})", self.0),
        }
    }
}

impl FromStr for BucketSpace {
    type Err = anyhow::Error;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim() {
            "default" => Ok(Self::DEFAULT),
            "global" => Ok(Self::GLOBAL),
            other => other
                .parse::<u64>()
                .map(BucketSpace)
                .map_err(|_| anyhow::anyhow!("unknown bucket space {raw:?}")),
        }
    }
}

/// A bucket scoped to its space.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Bucket {
    pub space: BucketSpace,
    pub id: BucketId,
}

impl Bucket {
    pub fn new(space: BucketSpace, id: BucketId) -> Self {
        Self { space, id }
    }
}

impl fmt::Display for Bucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Bucket(space: {}, {})", self.space, self.id)
    }
}
