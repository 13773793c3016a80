//! One-pass index build for a single raw file.

use std::io::Write;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::record::{CATALOG_COLUMNS, ObjectRecord};
use crate::scanner::scan_file;

use super::codec::write_atomic;
use super::identifier::IdentifierIndexBuilder;
use super::ranges::RangeRecorder;
use super::spatial::{FieldCalibration, SpatialIndexBuilder};

/// Locations of every artifact derived from one raw file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexPaths {
    pub raw: PathBuf,
    pub catalog: PathBuf,
    pub identifiers: PathBuf,
    pub ranges: PathBuf,
    pub spatial: PathBuf,
    pub siblings: PathBuf,
}

impl IndexPaths {
    pub fn for_raw(raw: &Path) -> Self {
        IndexPaths {
            raw: raw.to_path_buf(),
            catalog: raw.with_extension("objects"),
            identifiers: raw.with_extension("objects_map"),
            ranges: raw.with_extension("rcid_map"),
            spatial: raw.with_extension("radec_map"),
            siblings: raw.with_extension("siblings"),
        }
    }

    /// The four artifacts produced by a build, in write order.
    pub fn artifacts(&self) -> [&Path; 4] {
        [&self.catalog, &self.identifiers, &self.spatial, &self.ranges]
    }

    /// Whether every build artifact exists and is non-empty.
    pub fn all_built(&self) -> bool {
        self.artifacts().iter().all(|p| {
            std::fs::metadata(p)
                .map(|m| m.is_file() && m.len() > 0)
                .unwrap_or(false)
        })
    }
}

#[derive(Debug, Clone, Default)]
pub struct BuildOptions {
    /// Rebuild even if all artifacts are already present.
    pub overwrite: bool,
    /// Seam shifts for partitions that straddle RA 0/360. Partitions not
    /// listed are inferred from the points of all their bands together.
    pub calibration: FieldCalibration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildOutcome {
    Built { objects: usize, partitions: usize },
    Skipped,
}

/// Whether `raw` already has a complete index set next to it.
pub fn indices_exist(raw: &Path) -> bool {
    IndexPaths::for_raw(raw).all_built()
}

/// Scan `raw` once and write its catalog, identifier, spatial and range
/// indices.
///
/// Records are regrouped by (band, partition) with a stable sort before any
/// range is recorded, so files that are not naturally grouped still produce
/// contiguous spans. The range index is written last: its presence marks a
/// completed build.
pub fn build_index(raw: &Path, options: &BuildOptions) -> Result<BuildOutcome> {
    let paths = IndexPaths::for_raw(raw);
    if !options.overwrite && paths.all_built() {
        tracing::info!(file = %raw.display(), "indices present, skipping");
        return Ok(BuildOutcome::Skipped);
    }

    let mut records = scan_file(raw)?;
    records.sort_by_key(|r| (r.band, r.partition_id));

    let mut identifiers = IdentifierIndexBuilder::new(raw);
    for rec in &records {
        identifiers.insert(rec.id, rec.byte_offset)?;
    }
    let identifiers = identifiers.finish();

    let ranges = write_catalog(&paths.catalog, &records)?;

    let calibration = options.calibration.completed_from(&records);
    let mut spatial = SpatialIndexBuilder::new(&calibration);
    for rec in &records {
        spatial.push(rec);
    }
    let spatial = spatial.finish();

    identifiers.save(&paths.identifiers)?;
    spatial.save(&paths.spatial)?;
    ranges.save(&paths.ranges)?;

    tracing::info!(
        file = %raw.display(),
        objects = records.len(),
        partitions = ranges.len(),
        "indices built"
    );
    Ok(BuildOutcome::Built {
        objects: records.len(),
        partitions: ranges.len(),
    })
}

/// Write the catalog in the given (already grouped) order, recording each
/// group's byte span.
fn write_catalog(path: &Path, records: &[ObjectRecord]) -> Result<super::PartitionRangeIndex> {
    let mut recorder = RangeRecorder::new();
    let mut position = 0u64;
    write_atomic(path, |w| {
        let header = format!("{}\n", CATALOG_COLUMNS.join(","));
        w.write_all(header.as_bytes())?;
        position += header.len() as u64;
        for rec in records {
            recorder
                .observe(rec.band, rec.partition_id, position)
                .map_err(|msg| Error::invalid_index(path, msg))?;
            let row = format!("{}\n", rec.to_catalog_row());
            w.write_all(row.as_bytes())?;
            position += row.len() as u64;
        }
        Ok(())
    })?;
    Ok(recorder.finish(position))
}
