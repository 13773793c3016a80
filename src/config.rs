use std::path::{Path, PathBuf};

/// Default glob for raw files under the data root.
pub const DEFAULT_PATTERN: &str = "field*.txt";

/// Where raw files live.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataConfig {
    pub root: PathBuf,
    /// Glob matched against file names directly under `root`.
    pub pattern: String,
}

impl Default for DataConfig {
    fn default() -> Self {
        DataConfig {
            root: PathBuf::from("."),
            pattern: DEFAULT_PATTERN.to_string(),
        }
    }
}

impl DataConfig {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        DataConfig {
            root: root.into(),
            ..Default::default()
        }
    }

    pub fn with_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.pattern = pattern.into();
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Full glob: the root, with glob metacharacters escaped, joined with the
    /// pattern.
    pub fn glob_pattern(&self) -> String {
        let root = glob::Pattern::escape(&self.root.to_string_lossy());
        Path::new(&root).join(&self.pattern).to_string_lossy().into_owned()
    }
}
