//! Submission, status and download operations.
//!
//! [`ArchiveService`] is what an HTTP layer or the command line calls.
//! Submissions return as soon as the run's task records exist.

use crate::artifact::{ArtifactResolver, ArtifactStream};
use crate::context::{BackupOptions, Context, DumpFormat};
use crate::core::TaskId;
use crate::database::validate_database_name;
use crate::errors::{ArtifactError, DumpflowError, NotFoundKind};
use crate::pipeline::{backup_pipeline, restore_pipeline, Collaborators, PipelineExecutor, RestoreStep, Submission};
use crate::status::{StatusAggregator, StatusReport};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

/// Request to back up a database.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupRequest {
    /// Database name.
    pub name: String,
    /// Merge the filestore; defaults to `defaults.filestore`.
    #[serde(default)]
    pub filestore: Option<bool>,
    /// `sql` or `custom`; defaults to `defaults.dump_format`.
    #[serde(default)]
    pub dump_format: Option<String>,
}

/// Accepted backup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupSubmitted {
    /// Task of the last stage; query status and downloads with it.
    pub task_id: TaskId,
    /// Task of the first stage.
    pub parent_id: TaskId,
}

/// Request to restore an uploaded archive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RestoreRequest {
    /// Target database name.
    pub name: String,
    /// Name of the uploaded archive.
    pub filename: String,
}

/// Accepted restore.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RestoreSubmitted {
    /// Task of the last stage.
    pub task_id: TaskId,
}

/// Body of a failed download.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotFoundResponse {
    /// Whether the task or the file is missing.
    pub kind: NotFoundKind,
    /// Human readable detail.
    pub message: String,
}

impl From<&ArtifactError> for NotFoundResponse {
    fn from(err: &ArtifactError) -> Self {
        Self {
            kind: err.not_found_kind(),
            message: err.to_string(),
        }
    }
}

/// Outcome of a download request.
#[derive(Debug)]
pub enum Download {
    /// The artifact, ready to stream.
    Ready(ArtifactStream),
    /// Nothing to download.
    NotFound(NotFoundResponse),
}

/// Entry point for every external operation.
#[derive(Debug, Clone)]
pub struct ArchiveService {
    collab: Collaborators,
    executor: PipelineExecutor,
    status: StatusAggregator,
    artifacts: ArtifactResolver,
    restore_steps: Vec<RestoreStep>,
}

impl ArchiveService {
    /// Creates the service. Status and downloads read the executor's store.
    pub fn new(collab: Collaborators, executor: PipelineExecutor) -> Self {
        let store = executor.store();
        Self {
            collab,
            status: StatusAggregator::new(Arc::clone(&store)),
            artifacts: ArtifactResolver::new(store),
            executor,
            restore_steps: RestoreStep::ACTIVE.to_vec(),
        }
    }

    /// Replaces the steps restores run.
    #[must_use]
    pub fn with_restore_steps(mut self, steps: Vec<RestoreStep>) -> Self {
        self.restore_steps = steps;
        self
    }

    /// Starts a backup run.
    ///
    /// # Errors
    ///
    /// Returns [`DumpflowError::InvalidRequest`] for a bad name or dump
    /// format.
    pub async fn start_backup(&self, request: BackupRequest) -> Result<Submission, DumpflowError> {
        validate_database_name(&request.name).map_err(|e| DumpflowError::InvalidRequest(e.to_string()))?;

        let defaults = &self.collab.settings.defaults;
        let dump_format = match request.dump_format.as_deref() {
            Some(raw) => raw
                .parse::<DumpFormat>()
                .map_err(|e| DumpflowError::InvalidRequest(e.to_string()))?,
            None => defaults.dump_format,
        };
        let options = BackupOptions::default()
            .with_filestore(request.filestore.unwrap_or(defaults.filestore))
            .with_dump_format(dump_format);

        let pipeline = backup_pipeline(&self.collab, &options)?;
        let ctx = Context::backup_with(&request.name, options);
        let submission = self.executor.submit(Arc::new(pipeline), ctx).await?;
        info!(db_name = %request.name, task_id = %submission.task_id(), "Backup accepted");
        Ok(submission)
    }

    /// Submits a backup and returns without waiting for it.
    ///
    /// # Errors
    ///
    /// See [`Self::start_backup`].
    pub async fn submit_backup(&self, request: BackupRequest) -> Result<BackupSubmitted, DumpflowError> {
        let submission = self.start_backup(request).await?;
        Ok(BackupSubmitted {
            task_id: submission.task_id(),
            parent_id: submission.parent_id(),
        })
    }

    /// Starts a restore run.
    ///
    /// # Errors
    ///
    /// Returns [`DumpflowError::InvalidRequest`] for a bad name or an empty
    /// filename.
    pub async fn start_restore(&self, request: RestoreRequest) -> Result<Submission, DumpflowError> {
        validate_database_name(&request.name).map_err(|e| DumpflowError::InvalidRequest(e.to_string()))?;
        if request.filename.trim().is_empty() {
            return Err(DumpflowError::InvalidRequest("filename is empty".to_string()));
        }

        let pipeline = restore_pipeline(&self.collab, &self.restore_steps)?;
        let ctx = Context::restore(&request.name, &request.filename);
        let submission = self.executor.submit(Arc::new(pipeline), ctx).await?;
        info!(db_name = %request.name, filename = %request.filename, task_id = %submission.task_id(), "Restore accepted");
        Ok(submission)
    }

    /// Submits a restore and returns without waiting for it.
    ///
    /// # Errors
    ///
    /// See [`Self::start_restore`].
    pub async fn submit_restore(&self, request: RestoreRequest) -> Result<RestoreSubmitted, DumpflowError> {
        let submission = self.start_restore(request).await?;
        Ok(RestoreSubmitted {
            task_id: submission.task_id(),
        })
    }

    /// Reports the status of the run `task_id` belongs to.
    ///
    /// # Errors
    ///
    /// Returns an error if the task is unknown or the store fails.
    pub async fn status(&self, task_id: TaskId) -> Result<StatusReport, DumpflowError> {
        self.status.status_of(task_id).await
    }

    /// Opens the artifact of a finished run.
    ///
    /// Missing tasks and missing files are answered with
    /// [`Download::NotFound`]; only store failures are errors.
    ///
    /// # Errors
    ///
    /// Returns [`DumpflowError::Artifact`] if the task store fails.
    pub async fn download(&self, task_id: TaskId) -> Result<Download, DumpflowError> {
        let path = match self.artifacts.resolve(task_id).await {
            Ok(path) => path,
            Err(err @ ArtifactError::Store(_)) => return Err(err.into()),
            Err(err) => return Ok(Download::NotFound(NotFoundResponse::from(&err))),
        };

        match ArtifactStream::open(&path, self.collab.settings.download.chunk_size).await {
            Ok(stream) => Ok(Download::Ready(stream)),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                Ok(Download::NotFound(NotFoundResponse::from(&ArtifactError::FileMissing { task_id, path })))
            }
            Err(err) => Err(err.into()),
        }
    }
}
