//! Persisted per-file indices: identifiers, partition ranges and positions.

pub mod builder;
pub(crate) mod codec;
pub mod identifier;
pub mod ranges;
pub mod spatial;

use std::path::Path;

use crate::error::Result;

pub use builder::{BuildOptions, BuildOutcome, IndexPaths, build_index, indices_exist};
pub use identifier::IdentifierIndex;
pub use ranges::{PartitionRange, PartitionRangeIndex};
pub use spatial::{FieldCalibration, Neighbor, SeamShift, SpatialIndex, SpatialPartition};

/// The three binary indices of one raw file, loaded together.
#[derive(Debug, Clone)]
pub struct IndexSet {
    pub identifiers: IdentifierIndex,
    pub ranges: PartitionRangeIndex,
    pub spatial: SpatialIndex,
}

impl IndexSet {
    /// Load every index next to `raw`. The catalog must exist too.
    pub fn load(raw: &Path) -> Result<Self> {
        let paths = IndexPaths::for_raw(raw);
        codec::open_artifact(&paths.catalog)?;
        Ok(IndexSet {
            identifiers: IdentifierIndex::load(&paths.identifiers)?,
            ranges: PartitionRangeIndex::load(&paths.ranges)?,
            spatial: SpatialIndex::load(&paths.spatial)?,
        })
    }
}
