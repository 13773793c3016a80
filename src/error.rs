use std::io;
use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("corrupt file {path:?} at line {line}: {message}")]
    Corruption {
        path: PathBuf,
        line: u64,
        message: String,
    },

    #[error("duplicate object id {id} in {path:?} (offsets {first} and {second})")]
    DuplicateId {
        path: PathBuf,
        id: u64,
        first: u64,
        second: u64,
    },

    #[error(
        "object {id} in {path:?} declares {declared} epochs but {found} rows precede the next header"
    )]
    EpochCountMismatch {
        path: PathBuf,
        id: u64,
        declared: u32,
        found: u32,
    },

    #[error("index artifact {artifact:?} is missing or unreadable; run `{remediation}`")]
    MissingIndex {
        artifact: PathBuf,
        remediation: String,
    },

    #[error("invalid index artifact {artifact:?}: {message}")]
    InvalidIndex { artifact: PathBuf, message: String },

    #[error("timed out locking {path:?} after {attempts} attempts")]
    LockTimeout { path: PathBuf, attempts: u32 },

    #[error("file name {name:?} does not follow field<id>_ra<min>to<max>_dec<min>to<max>.txt")]
    InvalidFileName { name: String },

    #[error("no object with id {0} in this file")]
    UnknownId(u64),

    #[error("invalid file pattern: {0}")]
    Pattern(#[from] glob::PatternError),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl Error {
    pub fn corruption(path: impl Into<PathBuf>, line: u64, message: impl Into<String>) -> Self {
        Self::Corruption {
            path: path.into(),
            line,
            message: message.into(),
        }
    }

    pub fn invalid_index(artifact: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::InvalidIndex {
            artifact: artifact.into(),
            message: message.into(),
        }
    }

    /// Whether this error means the raw file itself is damaged, as opposed to
    /// an environmental failure.
    pub fn is_corruption(&self) -> bool {
        matches!(
            self,
            Self::Corruption { .. } | Self::DuplicateId { .. } | Self::EpochCountMismatch { .. }
        )
    }

    /// Transient failures are worth retrying later without touching the data.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::LockTimeout { .. })
    }
}
