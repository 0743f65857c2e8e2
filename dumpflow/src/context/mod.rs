//! The record threaded through a pipeline run.
//!
//! A [`Context`] is passed by value from stage to stage. Every slot is
//! write-once: a stage may fill an empty slot but writing a slot that is
//! already set fails with a [`DataConflictError`]. Two conventions are
//! exempt:
//!
//! - `files` is an [`ArtifactList`], which only supports appending.
//! - `archive_path` is replaced once by [`Context::finalize_archive`], which
//!   swaps the base name for the suffixed archive name and sets `download`.

mod artifacts;
mod manifest;
mod records;

pub use artifacts::ArtifactList;
pub use manifest::{guess_app_version, server_version_string, Manifest, MANIFEST_FILE_NAME, MANIFEST_SCHEMA_VERSION};
pub use records::{BackupOptions, DumpFormat, DumpRecord, ExtractRecord, UnknownDumpFormat};

use crate::errors::{DataConflictError, StageError};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

fn write_once<T>(slot: &mut Option<T>, key: &str, value: T) -> Result<(), DataConflictError> {
    if slot.is_some() {
        return Err(DataConflictError::new(key));
    }
    *slot = Some(value);
    Ok(())
}

/// Builds the error a stage returns when an input slot is empty.
#[must_use]
pub fn missing_key(key: &str) -> StageError {
    StageError::failure(format!("context is missing '{key}'"))
}

/// The evolving record of one pipeline run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct Context {
    db_name: String,
    #[serde(default)]
    options: BackupOptions,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    workdir: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    filename: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    archive_path: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "ArtifactList::is_empty")]
    files: ArtifactList,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    manifest: Option<Manifest>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    dump: Option<DumpRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    download: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    upload_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    restore_archive: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    extracted_dump: Option<DumpRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    created_database: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    restored_database: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    filestore_restore: Option<ExtractRecord>,
}

impl Context {
    /// Creates the initial context of a backup run with default options.
    #[must_use]
    pub fn backup(db_name: impl Into<String>) -> Self {
        Self::backup_with(db_name, BackupOptions::default())
    }

    /// Creates the initial context of a backup run.
    #[must_use]
    pub fn backup_with(db_name: impl Into<String>, options: BackupOptions) -> Self {
        Self {
            db_name: db_name.into(),
            options,
            workdir: None,
            filename: None,
            archive_path: None,
            files: ArtifactList::new(),
            manifest: None,
            dump: None,
            download: None,
            upload_name: None,
            restore_archive: None,
            extracted_dump: None,
            created_database: None,
            restored_database: None,
            filestore_restore: None,
        }
    }

    /// Creates the initial context of a restore run.
    #[must_use]
    pub fn restore(db_name: impl Into<String>, upload_name: impl Into<String>) -> Self {
        let mut ctx = Self::backup(db_name);
        ctx.upload_name = Some(upload_name.into());
        ctx
    }

    /// Database the run operates on.
    #[must_use]
    pub fn db_name(&self) -> &str {
        &self.db_name
    }

    /// Submission options.
    #[must_use]
    pub fn options(&self) -> BackupOptions {
        self.options
    }

    /// The run's exclusive working directory.
    #[must_use]
    pub fn workdir(&self) -> Option<&Path> {
        self.workdir.as_deref()
    }

    /// Archive base name, `<db_name>_<YYYYMMDD_HHMM>`.
    #[must_use]
    pub fn filename(&self) -> Option<&str> {
        self.filename.as_deref()
    }

    /// Archive path, without suffix until the archive is written.
    #[must_use]
    pub fn archive_path(&self) -> Option<&Path> {
        self.archive_path.as_deref()
    }

    /// Files produced so far, in order.
    #[must_use]
    pub fn files(&self) -> &ArtifactList {
        &self.files
    }

    /// The manifest written by the run.
    #[must_use]
    pub fn manifest(&self) -> Option<&Manifest> {
        self.manifest.as_ref()
    }

    /// The dump written by the run.
    #[must_use]
    pub fn dump(&self) -> Option<&DumpRecord> {
        self.dump.as_ref()
    }

    /// The downloadable archive of a backup.
    #[must_use]
    pub fn download(&self) -> Option<&Path> {
        self.download.as_deref()
    }

    /// Name of the uploaded archive a restore starts from.
    #[must_use]
    pub fn upload_name(&self) -> Option<&str> {
        self.upload_name.as_deref()
    }

    /// Located upload of a restore.
    #[must_use]
    pub fn restore_archive(&self) -> Option<&Path> {
        self.restore_archive.as_deref()
    }

    /// Dump extracted from the uploaded archive.
    #[must_use]
    pub fn extracted_dump(&self) -> Option<&DumpRecord> {
        self.extracted_dump.as_ref()
    }

    /// Database created by a restore.
    #[must_use]
    pub fn created_database(&self) -> Option<&str> {
        self.created_database.as_deref()
    }

    /// Database a dump was restored into.
    #[must_use]
    pub fn restored_database(&self) -> Option<&str> {
        self.restored_database.as_deref()
    }

    /// Result of extracting the filestore.
    #[must_use]
    pub fn filestore_restore(&self) -> Option<&ExtractRecord> {
        self.filestore_restore.as_ref()
    }

    /// The file a finished run exposes for download.
    ///
    /// A backup exposes its archive; a restore exposes the archive it
    /// restored from.
    #[must_use]
    pub fn output_path(&self) -> Option<&Path> {
        self.download().or_else(|| self.restore_archive())
    }

    /// Sets the working directory.
    ///
    /// # Errors
    ///
    /// Returns `DataConflictError` if it is already set.
    pub fn set_workdir(&mut self, path: impl Into<PathBuf>) -> Result<(), DataConflictError> {
        write_once(&mut self.workdir, "workdir", path.into())
    }

    /// Sets the archive base name.
    ///
    /// # Errors
    ///
    /// Returns `DataConflictError` if it is already set.
    pub fn set_filename(&mut self, filename: impl Into<String>) -> Result<(), DataConflictError> {
        write_once(&mut self.filename, "filename", filename.into())
    }

    /// Sets the unsuffixed archive path.
    ///
    /// # Errors
    ///
    /// Returns `DataConflictError` if it is already set.
    pub fn set_archive_path(&mut self, path: impl Into<PathBuf>) -> Result<(), DataConflictError> {
        write_once(&mut self.archive_path, "archive_path", path.into())
    }

    /// Appends a produced file.
    pub fn push_file(&mut self, path: impl Into<PathBuf>) {
        self.files.push(path);
    }

    /// Sets the manifest.
    ///
    /// # Errors
    ///
    /// Returns `DataConflictError` if it is already set.
    pub fn set_manifest(&mut self, manifest: Manifest) -> Result<(), DataConflictError> {
        write_once(&mut self.manifest, "manifest", manifest)
    }

    /// Sets the dump record.
    ///
    /// # Errors
    ///
    /// Returns `DataConflictError` if it is already set.
    pub fn set_dump(&mut self, dump: DumpRecord) -> Result<(), DataConflictError> {
        write_once(&mut self.dump, "dump", dump)
    }

    /// Replaces `archive_path` with the written archive and exposes it for
    /// download.
    ///
    /// # Errors
    ///
    /// Returns `DataConflictError` if the archive was already finalized.
    pub fn finalize_archive(&mut self, path: impl Into<PathBuf>) -> Result<(), DataConflictError> {
        let path = path.into();
        write_once(&mut self.download, "download", path.clone())?;
        self.archive_path = Some(path);
        Ok(())
    }

    /// Sets the located upload.
    ///
    /// # Errors
    ///
    /// Returns `DataConflictError` if it is already set.
    pub fn set_restore_archive(&mut self, path: impl Into<PathBuf>) -> Result<(), DataConflictError> {
        write_once(&mut self.restore_archive, "restore_archive", path.into())
    }

    /// Sets the extracted dump.
    ///
    /// # Errors
    ///
    /// Returns `DataConflictError` if it is already set.
    pub fn set_extracted_dump(&mut self, dump: DumpRecord) -> Result<(), DataConflictError> {
        write_once(&mut self.extracted_dump, "extracted_dump", dump)
    }

    /// Records the created database.
    ///
    /// # Errors
    ///
    /// Returns `DataConflictError` if it is already set.
    pub fn set_created_database(&mut self, name: impl Into<String>) -> Result<(), DataConflictError> {
        write_once(&mut self.created_database, "created_database", name.into())
    }

    /// Records the database a dump was restored into.
    ///
    /// # Errors
    ///
    /// Returns `DataConflictError` if it is already set.
    pub fn set_restored_database(&mut self, name: impl Into<String>) -> Result<(), DataConflictError> {
        write_once(&mut self.restored_database, "restored_database", name.into())
    }

    /// Records the filestore extraction.
    ///
    /// # Errors
    ///
    /// Returns `DataConflictError` if it is already set.
    pub fn set_filestore_restore(&mut self, record: ExtractRecord) -> Result<(), DataConflictError> {
        write_once(&mut self.filestore_restore, "filestore_restore", record)
    }
}
