//! Per-run working directories.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use uuid::Uuid;

/// Creates a fresh, uniquely named directory under `data_root`.
pub fn create_workdir(data_root: &Path) -> io::Result<PathBuf> {
    let path = data_root.join(Uuid::new_v4().to_string());
    fs::create_dir_all(&path)?;
    debug!(workdir = %path.display(), "Created workdir");
    Ok(path)
}

/// What a cleanup removes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CleanupScope {
    /// The whole directory tree.
    All,
    /// Only the listed files; the directory stays.
    Only(Vec<PathBuf>),
}

/// Outcome of a cleanup.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CleanupReport {
    /// Paths that were removed.
    pub removed: Vec<PathBuf>,
    /// Paths that could not be removed, with the reason.
    pub failures: Vec<(PathBuf, String)>,
}

impl CleanupReport {
    /// Returns true if nothing failed.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Removes a workdir or some of its files.
///
/// A path that is not a directory counts as already cleaned. Listed files
/// that no longer exist are ignored. Failures are collected, not raised.
pub fn clean_workdir(path: &Path, scope: &CleanupScope) -> CleanupReport {
    let mut report = CleanupReport::default();
    if !path.is_dir() {
        return report;
    }

    match scope {
        CleanupScope::All => match fs::remove_dir_all(path) {
            Ok(()) => report.removed.push(path.to_path_buf()),
            Err(err) => report.failures.push((path.to_path_buf(), err.to_string())),
        },
        CleanupScope::Only(files) => {
            for file in files.iter().filter(|f| f.exists()) {
                match fs::remove_file(file) {
                    Ok(()) => report.removed.push(file.clone()),
                    Err(err) => report.failures.push((file.clone(), err.to_string())),
                }
            }
        }
    }

    for (failed, reason) in &report.failures {
        warn!(path = %failed.display(), reason = %reason, "Could not remove");
    }
    report
}
