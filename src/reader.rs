//! Read sessions over one indexed raw file.

use std::collections::BTreeSet;
use std::fs::File;
use std::io::{BufRead, BufReader, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};

use crate::config::DataConfig;
use crate::error::{Error, Result};
use crate::filename::RawFileName;
use crate::geom::sphere::{arcsec_to_deg, deg_to_arcsec};
use crate::index::{IndexPaths, IndexSet, codec};
use crate::lightcurve::{Lightcurve, ReadOptions};
use crate::orchestrator::gather_raw_files;
use crate::record::{Band, ObjectRecord};
use crate::siblings::LockOptions;

/// One object: its header, read eagerly, and its lightcurve, parsed on first
/// access with the options the object was read with.
#[derive(Debug)]
pub struct LightcurveObject {
    pub record: ObjectRecord,
    raw: PathBuf,
    options: ReadOptions,
    lightcurve: OnceLock<Lightcurve>,
}

impl LightcurveObject {
    pub fn raw_path(&self) -> &Path {
        &self.raw
    }

    pub fn options(&self) -> &ReadOptions {
        &self.options
    }

    pub fn lightcurve(&self) -> Result<&Lightcurve> {
        if let Some(lc) = self.lightcurve.get() {
            return Ok(lc);
        }
        let (mut reader, _) = open_at(&self.raw, self.record.byte_offset)?;
        let lc = Lightcurve::read_block(
            &mut reader,
            &self.raw,
            self.record.byte_offset,
            &self.options,
        )?;
        Ok(self.lightcurve.get_or_init(|| lc))
    }
}

/// Seek to `offset` and read the header line there.
fn open_at(raw: &Path, offset: u64) -> Result<(BufReader<File>, ObjectRecord)> {
    let mut reader = BufReader::new(File::open(raw)?);
    reader.seek(SeekFrom::Start(offset))?;
    let mut line = String::new();
    reader.read_line(&mut line)?;
    let record = ObjectRecord::parse_header(&line, offset).map_err(|msg| {
        Error::corruption(raw, 0, format!("no object header at offset {offset}: {msg}"))
    })?;
    Ok((reader, record))
}

/// Read the object whose header starts at `offset`, without loading indices.
pub fn read_object(raw: &Path, offset: u64, options: &ReadOptions) -> Result<LightcurveObject> {
    let (_, record) = open_at(raw, offset)?;
    Ok(LightcurveObject {
        record,
        raw: raw.to_path_buf(),
        options: *options,
        lightcurve: OnceLock::new(),
    })
}

/// Which catalog rows to iterate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogSelection {
    bands: Option<BTreeSet<Band>>,
    partitions: Option<BTreeSet<u8>>,
    /// Keep row `i` (over the selected rows) when `i % size == rank`.
    /// `size` is never zero.
    rank: usize,
    size: usize,
}

impl Default for CatalogSelection {
    fn default() -> Self {
        CatalogSelection {
            bands: None,
            partitions: None,
            rank: 0,
            size: 1,
        }
    }
}

impl CatalogSelection {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn bands(mut self, bands: impl IntoIterator<Item = Band>) -> Self {
        self.bands = Some(bands.into_iter().collect());
        self
    }

    pub fn partitions(mut self, partitions: impl IntoIterator<Item = u8>) -> Self {
        self.partitions = Some(partitions.into_iter().collect());
        self
    }

    pub fn stride(mut self, rank: usize, size: usize) -> Self {
        self.rank = rank;
        self.size = size.max(1);
        self
    }

    fn wants(&self, band: Band, partition: u8) -> bool {
        self.bands.as_ref().is_none_or(|b| b.contains(&band))
            && self.partitions.as_ref().is_none_or(|p| p.contains(&partition))
    }
}

/// A record found by a positional lookup.
#[derive(Debug, Clone, PartialEq)]
pub struct LocatedObject {
    pub raw: PathBuf,
    pub record: ObjectRecord,
    pub separation_arcsec: f64,
}

/// Read-only view of one indexed raw file.
///
/// The indices are immutable after load and can be shared between readers of
/// the same file with [`Reader::with_indices`].
#[derive(Debug, Clone)]
pub struct Reader {
    paths: IndexPaths,
    indices: Arc<IndexSet>,
    pub(crate) lock: LockOptions,
}

impl Reader {
    /// Load every index of `raw`; fails with [`Error::MissingIndex`] if any is
    /// absent. Never builds.
    pub fn open(raw: &Path) -> Result<Self> {
        let indices = IndexSet::load(raw)?;
        tracing::debug!(
            file = %raw.display(),
            objects = indices.identifiers.len(),
            partitions = indices.ranges.len(),
            "opened reader"
        );
        Ok(Self::with_indices(raw, Arc::new(indices)))
    }

    pub fn with_indices(raw: &Path, indices: Arc<IndexSet>) -> Self {
        Reader {
            paths: IndexPaths::for_raw(raw),
            indices,
            lock: LockOptions::default(),
        }
    }

    /// Lock behaviour for sibling-file appends.
    pub fn with_lock_options(mut self, lock: LockOptions) -> Self {
        self.lock = lock;
        self
    }

    pub fn raw_path(&self) -> &Path {
        &self.paths.raw
    }

    pub fn paths(&self) -> &IndexPaths {
        &self.paths
    }

    pub fn indices(&self) -> &IndexSet {
        &self.indices
    }

    pub fn shared_indices(&self) -> Arc<IndexSet> {
        Arc::clone(&self.indices)
    }

    /// Header of the object at `offset`.
    pub fn header(&self, offset: u64) -> Result<ObjectRecord> {
        open_at(&self.paths.raw, offset).map(|(_, rec)| rec)
    }

    /// Header of the object with `id`.
    pub fn record(&self, id: u64) -> Result<ObjectRecord> {
        let offset = self
            .indices
            .identifiers
            .offset_of(id)
            .ok_or(Error::UnknownId(id))?;
        self.header(offset)
    }

    pub fn read(&self, offset: u64, options: &ReadOptions) -> Result<LightcurveObject> {
        read_object(&self.paths.raw, offset, options)
    }

    pub fn object(&self, id: u64, options: &ReadOptions) -> Result<LightcurveObject> {
        let offset = self
            .indices
            .identifiers
            .offset_of(id)
            .ok_or(Error::UnknownId(id))?;
        self.read(offset, options)
    }

    /// Catalog rows of the selected groups, read through the range index so
    /// that unselected groups are never scanned.
    pub fn catalog_rows(&self, selection: &CatalogSelection) -> Result<Vec<ObjectRecord>> {
        let catalog = &self.paths.catalog;
        let mut file = codec::open_artifact(catalog)?;

        let mut rows = Vec::new();
        let mut counter = 0usize;
        let mut buf = Vec::new();
        for range in self.indices.ranges.ranges() {
            if !selection.wants(range.band, range.partition) {
                continue;
            }
            file.seek(SeekFrom::Start(range.start))?;
            buf.resize((range.end - range.start) as usize, 0);
            file.read_exact(&mut buf)
                .map_err(|e| codec::truncated(catalog, e))?;
            let text = std::str::from_utf8(&buf)
                .map_err(|_| Error::invalid_index(catalog, "catalog is not valid UTF-8"))?;
            for line in text.lines().filter(|l| !l.is_empty()) {
                let take = counter % selection.size == selection.rank;
                counter += 1;
                if !take {
                    continue;
                }
                let rec = ObjectRecord::parse_catalog_row(line)
                    .map_err(|msg| Error::invalid_index(catalog, msg))?;
                if rec.band != range.band || rec.partition_id != range.partition {
                    return Err(Error::invalid_index(
                        catalog,
                        format!(
                            "object {} is outside its {} partition {} range",
                            rec.id, range.band, range.partition
                        ),
                    ));
                }
                rows.push(rec);
            }
        }
        Ok(rows)
    }

    /// Every object within `radius_arcsec` of (ra, dec), in any band or
    /// partition, nearest first.
    pub fn locate_objects(&self, ra: f64, dec: f64, radius_arcsec: f64) -> Result<Vec<LocatedObject>> {
        let radius = arcsec_to_deg(radius_arcsec);
        let mut found = Vec::new();
        for part in self.indices.spatial.partitions() {
            if !part.may_contain(ra, dec, radius) {
                continue;
            }
            for hit in part.within(ra, dec, radius) {
                found.push(LocatedObject {
                    raw: self.paths.raw.clone(),
                    record: self.record(hit.id)?,
                    separation_arcsec: deg_to_arcsec(hit.separation),
                });
            }
        }
        found.sort_by(|a, b| {
            a.separation_arcsec
                .total_cmp(&b.separation_arcsec)
                .then(a.record.id.cmp(&b.record.id))
        });
        Ok(found)
    }
}

/// Raw files under `config` whose name box can hold a point within
/// `radius_arcsec` of (ra, dec).
pub(crate) fn candidate_files(
    config: &DataConfig,
    ra: f64,
    dec: f64,
    radius_arcsec: f64,
) -> Result<Vec<PathBuf>> {
    let margin = arcsec_to_deg(radius_arcsec);
    let mut files = Vec::new();
    for path in gather_raw_files(config)? {
        match RawFileName::from_path(&path) {
            Ok(name) if name.contains_within(ra, dec, margin) => files.push(path),
            Ok(_) => {}
            Err(e) => tracing::warn!(file = %path.display(), error = %e, "skipping file"),
        }
    }
    Ok(files)
}

/// [`Reader::locate_objects`] over every raw file in the data root.
pub fn locate_objects_in_root(
    config: &DataConfig,
    ra: f64,
    dec: f64,
    radius_arcsec: f64,
) -> Result<Vec<LocatedObject>> {
    let mut found = Vec::new();
    for path in candidate_files(config, ra, dec, radius_arcsec)? {
        found.extend(Reader::open(&path)?.locate_objects(ra, dec, radius_arcsec)?);
    }
    Ok(found)
}
