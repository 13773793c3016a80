//! Saved object lists: one `raw file,byte offset` line per object.

use std::fs::{self, File};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::lightcurve::ReadOptions;
use crate::reader::{LightcurveObject, read_object};

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct ObjectRef {
    pub raw: PathBuf,
    pub offset: u64,
}

impl ObjectRef {
    pub fn new(raw: impl Into<PathBuf>, offset: u64) -> Self {
        ObjectRef {
            raw: raw.into(),
            offset,
        }
    }

    pub fn read(&self, options: &ReadOptions) -> Result<LightcurveObject> {
        read_object(&self.raw, self.offset, options)
    }
}

impl From<&LightcurveObject> for ObjectRef {
    fn from(obj: &LightcurveObject) -> Self {
        ObjectRef::new(obj.raw_path(), obj.record.byte_offset)
    }
}

/// Write `objects` to `path`. Without `overwrite` an existing file is left
/// alone and an `AlreadyExists` I/O error is returned.
pub fn save_objects(path: &Path, objects: &[ObjectRef], overwrite: bool) -> Result<()> {
    let file = if overwrite {
        File::create(path)?
    } else {
        File::create_new(path)?
    };
    let mut w = BufWriter::new(file);
    for obj in objects {
        writeln!(w, "{},{}", obj.raw.display(), obj.offset)?;
    }
    w.flush()?;
    Ok(())
}

pub fn load_objects(path: &Path) -> Result<Vec<ObjectRef>> {
    let reader = BufReader::new(File::open(path)?);
    let mut objects = Vec::new();
    for (i, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let bad = |msg: &str| Error::corruption(path, i as u64 + 1, msg);
        let (raw, offset) = line
            .rsplit_once(',')
            .ok_or_else(|| bad("expected `raw file,offset`"))?;
        let offset = offset
            .trim()
            .parse::<u64>()
            .map_err(|_| bad("offset is not an integer"))?;
        objects.push(ObjectRef::new(raw, offset));
    }
    Ok(objects)
}

/// Remove a saved list; a missing file is not an error.
pub fn remove_objects(path: &Path) -> Result<()> {
    match fs::remove_file(path) {
        Err(e) if e.kind() != std::io::ErrorKind::NotFound => Err(e.into()),
        _ => Ok(()),
    }
}
