//! Binary framing shared by the persisted index maps.
//!
//! Every artifact starts with a 4-byte magic and a `u32` format version;
//! all scalars are little-endian.

use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

pub(crate) const VERSION: u32 = 1;

pub(crate) fn write_u8(w: &mut impl Write, v: u8) -> io::Result<()> {
    w.write_all(&[v])
}

pub(crate) fn write_u32(w: &mut impl Write, v: u32) -> io::Result<()> {
    w.write_all(&v.to_le_bytes())
}

pub(crate) fn write_u64(w: &mut impl Write, v: u64) -> io::Result<()> {
    w.write_all(&v.to_le_bytes())
}

pub(crate) fn write_f64(w: &mut impl Write, v: f64) -> io::Result<()> {
    w.write_all(&v.to_le_bytes())
}

pub(crate) fn read_u8(r: &mut impl Read) -> io::Result<u8> {
    let mut buf = [0u8; 1];
    r.read_exact(&mut buf)?;
    Ok(buf[0])
}

pub(crate) fn read_u32(r: &mut impl Read) -> io::Result<u32> {
    let mut buf = [0u8; 4];
    r.read_exact(&mut buf)?;
    Ok(u32::from_le_bytes(buf))
}

pub(crate) fn read_u64(r: &mut impl Read) -> io::Result<u64> {
    let mut buf = [0u8; 8];
    r.read_exact(&mut buf)?;
    Ok(u64::from_le_bytes(buf))
}

pub(crate) fn read_f64(r: &mut impl Read) -> io::Result<f64> {
    let mut buf = [0u8; 8];
    r.read_exact(&mut buf)?;
    Ok(f64::from_le_bytes(buf))
}

pub(crate) fn write_preamble(w: &mut impl Write, magic: &[u8; 4]) -> io::Result<()> {
    w.write_all(magic)?;
    write_u32(w, VERSION)
}

/// Validate magic and version at the start of an artifact.
pub(crate) fn read_preamble(r: &mut impl Read, magic: &[u8; 4], path: &Path) -> Result<()> {
    let mut found = [0u8; 4];
    r.read_exact(&mut found).map_err(|e| truncated(path, e))?;
    if &found != magic {
        return Err(Error::invalid_index(path, "invalid magic bytes"));
    }
    let version = read_u32(r).map_err(|e| truncated(path, e))?;
    if version != VERSION {
        return Err(Error::invalid_index(
            path,
            format!("unsupported version: {version}"),
        ));
    }
    Ok(())
}

/// Map an unexpected EOF to an [`Error::InvalidIndex`], other errors to I/O.
pub(crate) fn truncated(path: &Path, e: io::Error) -> Error {
    if e.kind() == io::ErrorKind::UnexpectedEof {
        Error::invalid_index(path, "truncated artifact")
    } else {
        Error::Io(e)
    }
}

/// Open an index artifact for reading, reporting absence as a missing index.
pub(crate) fn open_artifact(path: &Path) -> Result<BufReader<File>> {
    match File::open(path) {
        Ok(f) => Ok(BufReader::new(f)),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Err(Error::MissingIndex {
            artifact: path.to_path_buf(),
            remediation: remediation_for(path),
        }),
        Err(e) => Err(Error::Io(e)),
    }
}

/// The command that regenerates indices for the raw file next to `artifact`.
pub(crate) fn remediation_for(artifact: &Path) -> String {
    let root = artifact
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or(Path::new("."));
    format!("lcindex build {}", root.display())
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".tmp");
    path.with_file_name(name)
}

/// Write `path` atomically: the content goes to `<path>.tmp`, is synced, and
/// is then renamed over `path`. A crash leaves either the old file or none.
pub(crate) fn write_atomic<F>(path: &Path, body: F) -> Result<()>
where
    F: FnOnce(&mut BufWriter<File>) -> Result<()>,
{
    let tmp = temp_path(path);
    let result = (|| -> Result<()> {
        let mut w = BufWriter::new(File::create(&tmp)?);
        body(&mut w)?;
        let file = w.into_inner().map_err(|e| e.into_error())?;
        file.sync_all()?;
        Ok(())
    })();
    if let Err(e) = result {
        fs::remove_file(&tmp).ok();
        return Err(e);
    }
    fs::rename(&tmp, path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn preamble_round_trip() {
        let mut buf = Vec::new();
        write_preamble(&mut buf, b"TEST").unwrap();
        read_preamble(&mut Cursor::new(&buf), b"TEST", Path::new("x")).unwrap();
    }

    #[test]
    fn magic_validation() {
        let mut buf = Vec::new();
        write_preamble(&mut buf, b"BAAD").unwrap();
        let err = read_preamble(&mut Cursor::new(&buf), b"TEST", Path::new("x")).unwrap_err();
        assert!(matches!(err, Error::InvalidIndex { .. }));
    }

    #[test]
    fn version_validation() {
        let mut buf = Vec::new();
        buf.extend_from_slice(b"TEST");
        buf.extend_from_slice(&99u32.to_le_bytes());
        let err = read_preamble(&mut Cursor::new(&buf), b"TEST", Path::new("x")).unwrap_err();
        assert!(err.to_string().contains("unsupported version: 99"));
    }

    #[test]
    fn truncated_preamble() {
        let err = read_preamble(&mut Cursor::new(b"TE"), b"TEST", Path::new("x")).unwrap_err();
        assert!(matches!(err, Error::InvalidIndex { .. }));
    }

    #[test]
    fn missing_artifact_names_remediation() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("field000001_ra1to2_dec3to4.rcid_map");
        let err = open_artifact(&path).unwrap_err();
        match err {
            Error::MissingIndex {
                artifact,
                remediation,
            } => {
                assert_eq!(artifact, path);
                assert_eq!(remediation, format!("lcindex build {}", dir.path().display()));
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn atomic_write_replaces_and_cleans_up() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.bin");
        write_atomic(&path, |w| Ok(write_u64(w, 7)?)).unwrap();
        assert_eq!(fs::read(&path).unwrap(), 7u64.to_le_bytes());
        assert!(!temp_path(&path).exists());

        let err = write_atomic(&path, |w| {
            write_u64(w, 8)?;
            Err(Error::invalid_index("a.bin", "boom"))
        });
        assert!(err.is_err());
        assert_eq!(fs::read(&path).unwrap(), 7u64.to_le_bytes());
        assert!(!temp_path(&path).exists());
    }
}
