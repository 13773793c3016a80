//! Object id → raw-file byte offset.

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

use super::codec::{
    open_artifact, read_preamble, read_u64, truncated, write_atomic, write_preamble, write_u64,
};

const MAGIC: &[u8; 4] = b"LCID";

/// Loaded wholesale at read-session start; immutable afterwards.
#[derive(Debug, Clone, Default)]
pub struct IdentifierIndex {
    /// Catalog order, kept so that rewriting reproduces the same bytes.
    entries: Vec<(u64, u64)>,
    offsets: HashMap<u64, u64>,
}

impl IdentifierIndex {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn offset_of(&self, id: u64) -> Option<u64> {
        self.offsets.get(&id).copied()
    }

    /// `(id, offset)` pairs in catalog order.
    pub fn iter(&self) -> impl Iterator<Item = (u64, u64)> + '_ {
        self.entries.iter().copied()
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        write_atomic(path, |w| {
            write_preamble(w, MAGIC)?;
            write_u64(w, self.entries.len() as u64)?;
            for &(id, offset) in &self.entries {
                write_u64(w, id)?;
                write_u64(w, offset)?;
            }
            Ok(())
        })
    }

    pub fn load(path: &Path) -> Result<Self> {
        let mut r = open_artifact(path)?;
        read_preamble(&mut r, MAGIC, path)?;
        let count = read_u64(&mut r).map_err(|e| truncated(path, e))? as usize;

        let mut builder = IdentifierIndexBuilder::new(path);
        for _ in 0..count {
            let id = read_u64(&mut r).map_err(|e| truncated(path, e))?;
            let offset = read_u64(&mut r).map_err(|e| truncated(path, e))?;
            builder
                .insert(id, offset)
                .map_err(|_| Error::invalid_index(path, format!("duplicate id {id}")))?;
        }
        Ok(builder.finish())
    }
}

/// Fills an [`IdentifierIndex`] one record at a time.
pub struct IdentifierIndexBuilder {
    raw_path: PathBuf,
    index: IdentifierIndex,
}

impl IdentifierIndexBuilder {
    /// `raw_path` labels duplicate-id errors.
    pub fn new(raw_path: &Path) -> Self {
        IdentifierIndexBuilder {
            raw_path: raw_path.to_path_buf(),
            index: IdentifierIndex::default(),
        }
    }

    /// Fails on a repeated id; that means the raw file is corrupt.
    pub fn insert(&mut self, id: u64, offset: u64) -> Result<()> {
        match self.index.offsets.entry(id) {
            Entry::Occupied(existing) => Err(Error::DuplicateId {
                path: self.raw_path.clone(),
                id,
                first: *existing.get(),
                second: offset,
            }),
            Entry::Vacant(slot) => {
                slot.insert(offset);
                self.index.entries.push((id, offset));
                Ok(())
            }
        }
    }

    pub fn finish(self) -> IdentifierIndex {
        self.index
    }
}
