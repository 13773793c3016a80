//! Append-only side file of resolved cross-matches, `offset_a,offset_b,tol`.
//!
//! Several processes may append to the same file, so each append holds an
//! exclusive advisory lock for the duration of the write only.

use std::fs::{File, OpenOptions, TryLockError};
use std::io::{BufRead, BufReader, ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

use crate::crossmatch::resolve_source;
use crate::error::{Error, Result};
use crate::geom::sphere::separation;
use crate::reader::Reader;
use crate::record::ObjectRecord;

/// How long an append waits for the lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockOptions {
    pub max_attempts: u32,
    pub retry_interval: Duration,
}

impl Default for LockOptions {
    fn default() -> Self {
        LockOptions {
            max_attempts: 60,
            retry_interval: Duration::from_secs(1),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SiblingEntry {
    pub offset: u64,
    pub sibling_offset: u64,
    pub tolerance_arcsec: f64,
}

impl SiblingEntry {
    fn parse(line: &str) -> std::result::Result<Self, String> {
        let mut cols = line.trim_end().split(',');
        let mut next = |name: &str| cols.next().ok_or_else(|| format!("missing {name}"));
        let offset = next("offset")?;
        let sibling = next("sibling offset")?;
        let tol = next("tolerance")?;
        Ok(SiblingEntry {
            offset: offset.parse().map_err(|_| format!("bad offset {offset:?}"))?,
            sibling_offset: sibling
                .parse()
                .map_err(|_| format!("bad sibling offset {sibling:?}"))?,
            tolerance_arcsec: tol.parse().map_err(|_| format!("bad tolerance {tol:?}"))?,
        })
    }
}

#[derive(Debug, Clone)]
pub struct SiblingFile {
    path: PathBuf,
    lock: LockOptions,
}

impl SiblingFile {
    pub fn new(path: impl Into<PathBuf>, lock: LockOptions) -> Self {
        SiblingFile {
            path: path.into(),
            lock,
        }
    }

    /// The side file next to `raw`.
    pub fn for_raw(raw: &Path, lock: LockOptions) -> Self {
        Self::new(raw.with_extension("siblings"), lock)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lock(&self, file: &File) -> Result<()> {
        for attempt in 1..=self.lock.max_attempts {
            match file.try_lock() {
                Ok(()) => return Ok(()),
                Err(TryLockError::WouldBlock) => {
                    tracing::debug!(file = %self.path.display(), attempt, "sibling file busy");
                    if attempt < self.lock.max_attempts {
                        thread::sleep(self.lock.retry_interval);
                    }
                }
                Err(TryLockError::Error(e)) => return Err(e.into()),
            }
        }
        Err(Error::LockTimeout {
            path: self.path.clone(),
            attempts: self.lock.max_attempts,
        })
    }

    /// Append one pair under an exclusive lock.
    pub fn append(&self, offset: u64, sibling_offset: u64, tolerance_arcsec: f64) -> Result<()> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        self.lock(&file)?;
        let line = format!("{offset},{sibling_offset},{tolerance_arcsec:.1}\n");
        let written = file.write_all(line.as_bytes()).and_then(|()| file.flush());
        file.unlock()?;
        written?;
        Ok(())
    }

    /// Every recorded pair; empty if the file does not exist yet.
    pub fn entries(&self) -> Result<Vec<SiblingEntry>> {
        let file = match File::open(&self.path) {
            Ok(f) => f,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        let mut entries = Vec::new();
        for (i, line) in BufReader::new(file).lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let entry = SiblingEntry::parse(&line)
                .map_err(|msg| Error::corruption(&self.path, i as u64 + 1, msg))?;
            entries.push(entry);
        }
        Ok(entries)
    }

    /// The first partner recorded for `offset`.
    pub fn lookup(&self, offset: u64) -> Result<Option<u64>> {
        Ok(self
            .entries()?
            .into_iter()
            .find(|e| e.offset == offset)
            .map(|e| e.sibling_offset))
    }
}

impl Reader {
    pub fn sibling_file(&self) -> SiblingFile {
        SiblingFile::new(&self.paths().siblings, self.lock)
    }

    /// The nearest other-band counterpart of `anchor`.
    ///
    /// With `attempt_to_load` the side file is consulted first. Otherwise, or
    /// when nothing is recorded, the source is resolved and a found sibling is
    /// appended to the side file.
    pub fn locate_sibling(
        &self,
        anchor: &ObjectRecord,
        radius_arcsec: f64,
        attempt_to_load: bool,
    ) -> Result<Option<ObjectRecord>> {
        let siblings = self.sibling_file();
        if attempt_to_load {
            if let Some(offset) = siblings.lookup(anchor.byte_offset)? {
                return self.header(offset).map(Some);
            }
        }

        let resolution = resolve_source(self, anchor, radius_arcsec)?;
        let nearest = resolution
            .source
            .members()
            .filter(|m| m.band != anchor.band)
            .min_by(|a, b| {
                let da = separation(anchor.ra, anchor.dec, a.ra, a.dec);
                let db = separation(anchor.ra, anchor.dec, b.ra, b.dec);
                da.total_cmp(&db)
            })
            .cloned();

        match &nearest {
            Some(sibling) => {
                siblings.append(anchor.byte_offset, sibling.byte_offset, radius_arcsec)?;
                tracing::info!(anchor = anchor.id, sibling = sibling.id, band = %sibling.band, "sibling saved");
            }
            None => tracing::info!(anchor = anchor.id, "no sibling found"),
        }
        Ok(nearest)
    }
}
