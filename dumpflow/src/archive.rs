//! Zip archive helpers used by the backup and restore stages.

use crate::errors::StageError;
use crate::progress::{ProgressReporter, ProgressSink};
use crate::stages::CancellationToken;
use std::collections::HashSet;
use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::{Component, Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::debug;
use walkdir::WalkDir;
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

/// Suffix of written archives.
pub const ZIP_SUFFIX: &str = "zip";

/// Extensions (or whole names, for dotfiles) never merged into an archive.
pub const DENYLIST: [&str; 4] = [".pyc", ".pyo", ".swp", ".DS_Store"];

fn file_options() -> FileOptions {
    FileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .large_file(true)
}

/// Appends `.zip` unless the path already ends with it.
#[must_use]
pub fn ensure_zip_suffix(path: &Path) -> PathBuf {
    if path.extension().is_some_and(|ext| ext == ZIP_SUFFIX) {
        return path.to_path_buf();
    }
    let mut name = path.as_os_str().to_os_string();
    name.push(".");
    name.push(ZIP_SUFFIX);
    PathBuf::from(name)
}

/// Returns true if a file name matches the denylist.
///
/// The extension is compared when there is one; dotfiles without an
/// extension are compared by their whole name.
#[must_use]
pub fn is_denied(file_name: &str) -> bool {
    let path = Path::new(file_name);
    match path.extension() {
        Some(ext) => DENYLIST.contains(&format!(".{}", ext.to_string_lossy()).as_str()),
        None => DENYLIST.contains(&file_name),
    }
}

/// A wall-clock limit checked between files.
///
/// A deadline carrying a cancellation token also expires as soon as the
/// token is raised.
#[derive(Debug, Clone)]
pub struct Deadline {
    at: Instant,
    limit: Duration,
    cancel: Option<CancellationToken>,
}

impl Deadline {
    /// Starts a deadline `limit` from now.
    #[must_use]
    pub fn after(limit: Duration) -> Self {
        Self {
            at: Instant::now() + limit,
            limit,
            cancel: None,
        }
    }

    /// Expires the deadline early when `token` is raised.
    #[must_use]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// Fails with a timeout once the deadline has passed or was cancelled.
    pub fn check(&self) -> Result<(), StageError> {
        let cancelled = self.cancel.as_ref().is_some_and(CancellationToken::is_cancelled);
        if cancelled || Instant::now() >= self.at {
            return Err(StageError::Timeout {
                limit_secs: self.limit.as_secs(),
            });
        }
        Ok(())
    }
}

/// Writes a new archive containing exactly `files`, flattened to basenames.
///
/// Fails before creating anything if a file is missing or two files share
/// a basename.
pub fn write_flat_archive(files: &[PathBuf], dest: &Path) -> Result<u64, StageError> {
    let mut names = HashSet::new();
    let mut entries = Vec::with_capacity(files.len());
    for path in files {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| StageError::failure(format!("'{}' has no file name", path.display())))?;
        if !path.is_file() {
            return Err(StageError::not_found(format!("File '{}' not found.", path.display())));
        }
        if !names.insert(name.clone()) {
            return Err(StageError::failure(format!("duplicate archive entry '{name}'")));
        }
        entries.push((path, name));
    }

    let mut zip = ZipWriter::new(File::create(dest)?);
    for (path, name) in entries {
        zip.start_file(name, file_options())?;
        io::copy(&mut File::open(path)?, &mut zip)?;
    }
    zip.finish()?;

    Ok(fs::metadata(dest)?.len())
}

/// Counts of a filestore merge.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeSummary {
    /// Files found under the source tree.
    pub total: u64,
    /// Files added to the archive.
    pub written: u64,
    /// Files skipped by the denylist.
    pub skipped: u64,
}

fn entry_name(path: &Path, prefix: &Path) -> Option<String> {
    let rel = path.strip_prefix(prefix).ok()?;
    let parts: Vec<String> = rel
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect();
    (!parts.is_empty()).then(|| parts.join("/"))
}

fn partial_path(archive: &Path) -> PathBuf {
    let mut name = archive.as_os_str().to_os_string();
    name.push(".partial");
    PathBuf::from(name)
}

/// Appends every file under `source` to `archive`.
///
/// Entry names are rooted one level above `source`, so `<root>/<db>/a/b`
/// is stored as `<db>/a/b`. Writes go to a `.partial` copy that replaces
/// the archive only once the whole tree is merged.
pub fn merge_tree<S: ProgressSink>(
    source: &Path,
    archive: &Path,
    deadline: Option<Deadline>,
    progress: S,
) -> Result<MergeSummary, StageError> {
    let prefix = source.parent().unwrap_or_else(|| Path::new(""));
    let partial = partial_path(archive);

    let result = merge_into(source, prefix, archive, &partial, deadline, progress);
    match result {
        Ok(summary) => {
            fs::rename(&partial, archive)?;
            Ok(summary)
        }
        Err(err) => {
            if let Err(cleanup) = fs::remove_file(&partial) {
                debug!(path = %partial.display(), error = %cleanup, "Could not remove partial archive");
            }
            Err(err)
        }
    }
}

fn merge_into<S: ProgressSink>(
    source: &Path,
    prefix: &Path,
    archive: &Path,
    partial: &Path,
    deadline: Option<Deadline>,
    progress: S,
) -> Result<MergeSummary, StageError> {
    fs::copy(archive, partial)?;
    let file = OpenOptions::new().read(true).write(true).open(partial)?;
    let mut zip = ZipWriter::new_append(file)?;

    let total = WalkDir::new(source)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|e| !e.file_type().is_dir())
        .count() as u64;

    let mut reporter = ProgressReporter::new(total, progress);
    let mut summary = MergeSummary {
        total,
        ..MergeSummary::default()
    };

    for entry in WalkDir::new(source).sort_by_file_name() {
        let entry = entry.map_err(|e| StageError::failure(e.to_string()))?;
        if entry.file_type().is_dir() {
            continue;
        }
        if let Some(deadline) = &deadline {
            deadline.check()?;
        }

        if is_denied(&entry.file_name().to_string_lossy()) {
            summary.skipped += 1;
            reporter.record_skipped();
            continue;
        }

        let path = entry.path();
        if path.is_file() {
            if let Some(name) = entry_name(path, prefix) {
                zip.start_file(name, file_options())?;
                io::copy(&mut File::open(path)?, &mut zip)?;
            }
        }
        summary.written += 1;
        reporter.record_written();
    }

    zip.finish()?;
    Ok(summary)
}

/// Counts of an extraction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExtractSummary {
    /// Files written.
    pub files: usize,
    /// Size of the source archive in bytes.
    pub archive_size: u64,
}

/// Extracts the members for which `select` returns a destination.
///
/// `select` receives the sanitized member path and returns the path
/// relative to `dest` to write it to. Members whose names escape the
/// archive root are ignored.
pub fn extract_members<F>(archive: &Path, dest: &Path, mut select: F) -> Result<ExtractSummary, StageError>
where
    F: FnMut(&Path) -> Option<PathBuf>,
{
    if !archive.is_file() {
        return Err(StageError::not_found(format!("Archive '{}' not found.", archive.display())));
    }
    let archive_size = fs::metadata(archive)?.len();
    let mut zip = ZipArchive::new(File::open(archive)?)?;
    fs::create_dir_all(dest)?;

    let mut files = 0;
    for index in 0..zip.len() {
        let mut member = zip.by_index(index)?;
        if member.is_dir() {
            continue;
        }
        let Some(name) = member.enclosed_name().map(Path::to_path_buf) else {
            debug!(member = member.name(), "Skipping member outside the archive root");
            continue;
        };
        let Some(rel) = select(&name) else {
            continue;
        };

        let target = dest.join(rel);
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
        }
        io::copy(&mut member, &mut File::create(&target)?)?;
        files += 1;
    }

    Ok(ExtractSummary { files, archive_size })
}

/// Selects top-level members, keeping their names.
pub fn top_level(name: &Path) -> Option<PathBuf> {
    let mut components = name.components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(first)), None) => Some(PathBuf::from(first)),
        _ => None,
    }
}

/// Selects members below a top-level directory, dropping that directory.
pub fn below_root(name: &Path) -> Option<PathBuf> {
    let mut components = name.components();
    components.next()?;
    let rest = components.as_path();
    (!rest.as_os_str().is_empty()).then(|| rest.to_path_buf())
}

/// Lists member names in archive order.
pub fn entry_names(archive: &Path) -> Result<Vec<String>, StageError> {
    let zip = ZipArchive::new(File::open(archive)?)?;
    Ok(zip.file_names().map(str::to_string).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn touch(path: &Path, content: &str) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    fn sorted(mut names: Vec<String>) -> Vec<String> {
        names.sort();
        names
    }

    #[test]
    fn test_zip_suffix_is_idempotent() {
        let once = ensure_zip_suffix(Path::new("/w/erp_20240101_1200"));
        assert_eq!(once, PathBuf::from("/w/erp_20240101_1200.zip"));
        assert_eq!(ensure_zip_suffix(&once), once);
    }

    #[test]
    fn test_denylist() {
        assert!(is_denied("module.pyc"));
        assert!(is_denied("x.pyo"));
        assert!(is_denied(".main.rs.swp"));
        assert!(is_denied(".DS_Store"));
        assert!(!is_denied("logo.png"));
        assert!(!is_denied("README"));
        assert!(!is_denied("pyc"));
    }

    #[test]
    fn test_flat_archive_contains_exact_basenames() {
        let dir = TempDir::new().unwrap();
        let a = dir.path().join("manifest.json");
        let b = dir.path().join("nested/dump.sql.gz");
        touch(&a, "{}");
        touch(&b, "dump");

        let dest = dir.path().join("out.zip");
        write_flat_archive(&[a, b], &dest).unwrap();

        assert_eq!(
            sorted(entry_names(&dest).unwrap()),
            vec!["dump.sql.gz".to_string(), "manifest.json".to_string()]
        );
    }

    #[test]
    fn test_flat_archive_rejects_missing_and_duplicates() {
        let dir = TempDir::new().unwrap();
        let a = dir.path().join("a/x.txt");
        let b = dir.path().join("b/x.txt");
        touch(&a, "1");
        touch(&b, "2");
        let dest = dir.path().join("out.zip");

        let missing = write_flat_archive(&[dir.path().join("nope")], &dest).unwrap_err();
        assert_eq!(missing.kind(), "NotFoundError");
        assert!(write_flat_archive(&[a, b], &dest).is_err());
        assert!(!dest.exists());
    }

    #[test]
    fn test_merge_tree_roots_entries_and_skips_denied() {
        let dir = TempDir::new().unwrap();
        let fs_root = dir.path().join("filestore/erp");
        touch(&fs_root.join("ab/file1"), "1");
        touch(&fs_root.join("cd/file2"), "2");
        touch(&fs_root.join("cd/cache.pyc"), "x");

        let a = dir.path().join("manifest.json");
        touch(&a, "{}");
        let archive = dir.path().join("backup.zip");
        write_flat_archive(&[a], &archive).unwrap();

        let mut seen = Vec::new();
        let summary = merge_tree(&fs_root, &archive, None, |p: u8| seen.push(p)).unwrap();

        assert_eq!(summary, MergeSummary { total: 3, written: 2, skipped: 1 });
        assert_eq!(
            sorted(entry_names(&archive).unwrap()),
            vec![
                "erp/ab/file1".to_string(),
                "erp/cd/file2".to_string(),
                "manifest.json".to_string()
            ]
        );
        assert!(!partial_path(&archive).exists());
    }

    #[test]
    fn test_merge_tree_timeout_leaves_archive_untouched() {
        let dir = TempDir::new().unwrap();
        let fs_root = dir.path().join("erp");
        touch(&fs_root.join("file1"), "1");
        let a = dir.path().join("manifest.json");
        touch(&a, "{}");
        let archive = dir.path().join("backup.zip");
        write_flat_archive(&[a], &archive).unwrap();

        let expired = Deadline::after(Duration::ZERO);
        let err = merge_tree(&fs_root, &archive, Some(expired), |_: u8| {}).unwrap_err();

        assert_eq!(err, StageError::Timeout { limit_secs: 0 });
        assert_eq!(entry_names(&archive).unwrap(), vec!["manifest.json".to_string()]);
        assert!(!partial_path(&archive).exists());
    }

    #[test]
    fn test_cancelled_merge_leaves_archive_untouched() {
        let dir = TempDir::new().unwrap();
        let fs_root = dir.path().join("erp");
        touch(&fs_root.join("file1"), "1");
        let a = dir.path().join("manifest.json");
        touch(&a, "{}");
        let archive = dir.path().join("backup.zip");
        write_flat_archive(&[a], &archive).unwrap();

        let token = CancellationToken::new();
        let deadline = Deadline::after(Duration::from_secs(3600)).with_cancellation(token.clone());
        deadline.check().unwrap();
        token.cancel();

        let err = merge_tree(&fs_root, &archive, Some(deadline), |_: u8| {}).unwrap_err();

        assert_eq!(err, StageError::Timeout { limit_secs: 3600 });
        assert_eq!(entry_names(&archive).unwrap(), vec!["manifest.json".to_string()]);
        assert!(!partial_path(&archive).exists());
    }

    #[test]
    fn test_extract_selectors() {
        let dir = TempDir::new().unwrap();
        let fs_root = dir.path().join("erp");
        touch(&fs_root.join("ab/file1"), "1");
        let a = dir.path().join("dump.sql.gz");
        touch(&a, "dump");
        let archive = dir.path().join("backup.zip");
        write_flat_archive(&[a], &archive).unwrap();
        merge_tree(&fs_root, &archive, None, |_: u8| {}).unwrap();

        let top = dir.path().join("top");
        let summary = extract_members(&archive, &top, top_level).unwrap();
        assert_eq!(summary.files, 1);
        assert!(top.join("dump.sql.gz").is_file());

        let nested = dir.path().join("nested");
        extract_members(&archive, &nested, below_root).unwrap();
        assert_eq!(fs::read_to_string(nested.join("ab/file1")).unwrap(), "1");
        assert!(!nested.join("dump.sql.gz").exists());
    }

    #[test]
    fn test_extract_missing_archive() {
        let dir = TempDir::new().unwrap();
        let err = extract_members(&dir.path().join("none.zip"), dir.path(), top_level).unwrap_err();
        assert_eq!(err.kind(), "NotFoundError");
    }
}
