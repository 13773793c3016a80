//! Spreads raw files over workers and builds each file's indices.
//!
//! Files are assigned round-robin by rank over the sorted file list, so any
//! worker count covers every file exactly once. Files share nothing; the
//! only coordination is the static assignment.

use std::path::{Path, PathBuf};

use rayon::prelude::*;

use crate::config::DataConfig;
use crate::error::{Error, Result};
use crate::index::{BuildOptions, BuildOutcome, build_index};

/// Sorted raw files matching the configured pattern.
pub fn gather_raw_files(config: &DataConfig) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in glob::glob(&config.glob_pattern())? {
        let path = entry.map_err(|e| Error::Io(e.into_error()))?;
        if path.is_file() {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

/// The files rank `rank` of `size` is responsible for: every `i` with
/// `i % size == rank`.
pub fn assign(files: &[PathBuf], rank: usize, size: usize) -> Vec<PathBuf> {
    let size = size.max(1);
    files
        .iter()
        .enumerate()
        .filter(|(i, _)| i % size == rank)
        .map(|(_, f)| f.clone())
        .collect()
}

#[derive(Debug)]
pub struct FailedBuild {
    pub path: PathBuf,
    pub error: Error,
}

#[derive(Debug, Default)]
pub struct BuildReport {
    pub built: Vec<PathBuf>,
    pub skipped: Vec<PathBuf>,
    pub failed: Vec<FailedBuild>,
}

impl BuildReport {
    pub fn merge(&mut self, other: BuildReport) {
        self.built.extend(other.built);
        self.skipped.extend(other.skipped);
        self.failed.extend(other.failed);
    }

    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }

    pub fn total(&self) -> usize {
        self.built.len() + self.skipped.len() + self.failed.len()
    }

    fn record(&mut self, path: &Path, result: Result<BuildOutcome>) {
        match result {
            Ok(BuildOutcome::Built { .. }) => self.built.push(path.to_path_buf()),
            Ok(BuildOutcome::Skipped) => self.skipped.push(path.to_path_buf()),
            Err(error) => {
                tracing::warn!(
                    file = %path.display(),
                    corrupt = error.is_corruption(),
                    "build failed: {error}"
                );
                self.failed.push(FailedBuild {
                    path: path.to_path_buf(),
                    error,
                });
            }
        }
    }
}

/// Build every file assigned to `rank`, one after another. A failing file is
/// reported and does not stop the others.
pub fn run_worker(
    config: &DataConfig,
    rank: usize,
    size: usize,
    options: &BuildOptions,
) -> Result<BuildReport> {
    let files = gather_raw_files(config)?;
    Ok(build_assigned(&assign(&files, rank, size), rank, options))
}

fn build_assigned(files: &[PathBuf], rank: usize, options: &BuildOptions) -> BuildReport {
    tracing::info!(rank, files = files.len(), "worker starting");
    let mut report = BuildReport::default();
    for path in files {
        report.record(path, build_index(path, options));
    }
    tracing::info!(
        rank,
        built = report.built.len(),
        skipped = report.skipped.len(),
        failed = report.failed.len(),
        "worker finished"
    );
    report
}

/// Run `workers` ranks on a local thread pool and merge their reports.
pub fn run_local(config: &DataConfig, workers: usize, options: &BuildOptions) -> Result<BuildReport> {
    let workers = workers.max(1);
    let files = gather_raw_files(config)?;
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(workers)
        .build()
        .map_err(|e| Error::Io(std::io::Error::other(e)))?;
    let reports: Vec<BuildReport> = pool.install(|| {
        (0..workers)
            .into_par_iter()
            .map(|rank| build_assigned(&assign(&files, rank, workers), rank, options))
            .collect()
    });
    let mut merged = BuildReport::default();
    for report in reports {
        merged.merge(report);
    }
    merged.built.sort();
    merged.skipped.sort();
    Ok(merged)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::indices_exist;
    use std::fs;

    fn write(dir: &Path, field: u32, body: &str) -> PathBuf {
        let path = dir.join(format!("field{field:06}_ra10.0to11.0_dec0.0to1.0.txt"));
        fs::write(&path, body).unwrap();
        path
    }

    #[test]
    fn assignment_covers_every_file_once() {
        let files: Vec<PathBuf> = (0..7).map(|i| PathBuf::from(format!("f{i}"))).collect();
        for size in 1..5 {
            let mut all: Vec<PathBuf> = (0..size).flat_map(|r| assign(&files, r, size)).collect();
            all.sort();
            assert_eq!(all, files);
        }
        assert_eq!(assign(&files, 1, 3), vec![PathBuf::from("f1"), PathBuf::from("f4")]);
    }

    #[test]
    fn gather_uses_pattern_and_sorts() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), 2, "");
        write(dir.path(), 1, "");
        fs::write(dir.path().join("notes.txt"), "").unwrap();
        let files = gather_raw_files(&DataConfig::new(dir.path())).unwrap();
        assert_eq!(files.len(), 2);
        assert!(files[0] < files[1]);
    }

    #[test]
    fn corrupt_file_does_not_stop_the_run() {
        let dir = tempfile::tempdir().unwrap();
        let good = write(dir.path(), 1, "# 1 1 1 1 0 10.5 0.5\n58000.0 17.0 0.1 0.0 0\n");
        let bad = write(dir.path(), 2, "# 1 2 1 1 0 10.5 0.5\n58000.0 17.0 0.1 0.0 0\n");
        let config = DataConfig::new(dir.path());

        let report = run_worker(&config, 0, 1, &BuildOptions::default()).unwrap();
        assert_eq!(report.built, vec![good.clone()]);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].path, bad);
        assert!(report.failed[0].error.is_corruption());
        assert!(indices_exist(&good));
        assert!(!indices_exist(&bad));

        let again = run_worker(&config, 0, 1, &BuildOptions::default()).unwrap();
        assert_eq!(again.skipped, vec![good]);
        assert_eq!(again.failed.len(), 1);
    }

    #[test]
    fn local_pool_builds_everything() {
        let dir = tempfile::tempdir().unwrap();
        let files: Vec<PathBuf> = (0..5)
            .map(|i| write(dir.path(), i, &format!("# {i} 0 2 {i} 1 10.5 0.5\n")))
            .collect();
        let report = run_local(&DataConfig::new(dir.path()), 3, &BuildOptions::default()).unwrap();
        assert!(report.is_success());
        assert_eq!(report.built, files);
        assert!(files.iter().all(|f| indices_exist(f)));
    }
}
