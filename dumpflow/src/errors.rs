//! Error types for dumpflow.
//!
//! Stage failures are typed by [`StageError`], whose variants follow the
//! connectivity / not-found / external-tool / timeout / catch-all taxonomy.
//! Everything a caller can observe is wrapped by [`DumpflowError`].

use crate::context::Context;
use crate::core::{TaskId, TaskStatus};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

/// The main error type for dumpflow operations.
#[derive(Debug, Error)]
pub enum DumpflowError {
    /// A pipeline validation error occurred.
    #[error("{0}")]
    Validation(#[from] PipelineValidationError),

    /// A write-once context key was written twice.
    #[error("{0}")]
    DataConflict(#[from] DataConflictError),

    /// A stage failed outside of a pipeline run.
    #[error("{0}")]
    Stage(#[from] StageError),

    /// A pipeline run failed.
    #[error("{0}")]
    Pipeline(#[from] PipelineFailure),

    /// The task store could not be reached or returned inconsistent data.
    #[error("{0}")]
    Store(#[from] StoreError),

    /// An artifact could not be resolved.
    #[error("{0}")]
    Artifact(#[from] ArtifactError),

    /// A submission request was rejected.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Settings could not be loaded.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// A generic internal error.
    #[error("Internal error: {0}")]
    Internal(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<serde_json::Error> for DumpflowError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

/// Typed failure of a single stage.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StageError {
    /// The database or the broker could not be reached.
    #[error("Connectivity error: {message}")]
    Connectivity {
        /// What could not be reached.
        message: String,
    },

    /// A directory, archive or file the stage needs does not exist.
    #[error("Not found: {message}")]
    NotFound {
        /// What was missing.
        message: String,
    },

    /// An external executable exited unsuccessfully.
    #[error("External tool `{tool}` failed (exit code {code:?}): {stderr}")]
    ExternalTool {
        /// The executable name.
        tool: String,
        /// Exit code, `None` when killed by a signal or never started.
        code: Option<i32>,
        /// Captured standard error.
        stderr: String,
    },

    /// The stage exceeded its time limit.
    #[error("Stage exceeded its time limit of {limit_secs}s")]
    Timeout {
        /// The configured limit in seconds.
        limit_secs: u64,
    },

    /// Any other stage failure.
    #[error("Stage failure: {message}")]
    Failure {
        /// The failure detail.
        message: String,
    },
}

impl StageError {
    /// Creates a connectivity error.
    #[must_use]
    pub fn connectivity(message: impl Into<String>) -> Self {
        Self::Connectivity {
            message: message.into(),
        }
    }

    /// Creates a not-found error.
    #[must_use]
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound {
            message: message.into(),
        }
    }

    /// Creates an external tool error.
    #[must_use]
    pub fn external_tool(tool: impl Into<String>, code: Option<i32>, stderr: impl Into<String>) -> Self {
        Self::ExternalTool {
            tool: tool.into(),
            code,
            stderr: stderr.into(),
        }
    }

    /// Creates a catch-all failure.
    #[must_use]
    pub fn failure(message: impl Into<String>) -> Self {
        Self::Failure {
            message: message.into(),
        }
    }

    /// Stable code persisted with failed task records.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Connectivity { .. } => "ConnectivityError",
            Self::NotFound { .. } => "NotFoundError",
            Self::ExternalTool { .. } => "ExternalToolError",
            Self::Timeout { .. } => "TimeoutError",
            Self::Failure { .. } => "StageFailure",
        }
    }

    /// Returns true if a stage with a retry budget may run again after this error.
    ///
    /// Missing inputs and exceeded time limits are final.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Connectivity { .. } | Self::Failure { .. })
    }
}

impl From<std::io::Error> for StageError {
    fn from(err: std::io::Error) -> Self {
        if err.kind() == std::io::ErrorKind::NotFound {
            Self::not_found(err.to_string())
        } else {
            Self::failure(err.to_string())
        }
    }
}

impl From<DataConflictError> for StageError {
    fn from(err: DataConflictError) -> Self {
        Self::failure(err.to_string())
    }
}

impl From<StoreError> for StageError {
    fn from(err: StoreError) -> Self {
        Self::connectivity(err.to_string())
    }
}

impl From<zip::result::ZipError> for StageError {
    fn from(err: zip::result::ZipError) -> Self {
        match err {
            zip::result::ZipError::Io(io) => io.into(),
            zip::result::ZipError::FileNotFound => Self::not_found("archive member not found"),
            other => Self::failure(format!("archive error: {other}")),
        }
    }
}

/// Metadata about a contract error for better diagnostics.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct ContractErrorInfo {
    /// Error code (e.g., "CONTRACT-001-EMPTY").
    pub code: String,
    /// Short summary of the error.
    pub summary: String,
    /// Hint for fixing the error.
    pub fix_hint: Option<String>,
}

impl ContractErrorInfo {
    /// Creates a new contract error info.
    #[must_use]
    pub fn new(code: impl Into<String>, summary: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            summary: summary.into(),
            fix_hint: None,
        }
    }

    /// Sets the fix hint.
    #[must_use]
    pub fn with_fix_hint(mut self, hint: impl Into<String>) -> Self {
        self.fix_hint = Some(hint.into());
        self
    }
}

/// Error raised when a pipeline definition is invalid.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct PipelineValidationError {
    /// The error message.
    pub message: String,
    /// The stages involved in the error.
    pub stages: Vec<String>,
    /// Optional contract error info.
    pub error_info: Option<ContractErrorInfo>,
}

impl PipelineValidationError {
    /// Creates a new pipeline validation error.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            stages: Vec::new(),
            error_info: None,
        }
    }

    /// Sets the stages involved.
    #[must_use]
    pub fn with_stages(mut self, stages: Vec<String>) -> Self {
        self.stages = stages;
        self
    }

    /// Sets the contract error info.
    #[must_use]
    pub fn with_error_info(mut self, info: ContractErrorInfo) -> Self {
        self.error_info = Some(info);
        self
    }

    /// Returns the contract code, if any.
    #[must_use]
    pub fn code(&self) -> Option<&str> {
        self.error_info.as_ref().map(|info| info.code.as_str())
    }
}

/// Error raised when writing to a context key that is already set.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Data conflict: key '{key}' already exists")]
pub struct DataConflictError {
    /// The conflicting key.
    pub key: String,
}

impl DataConflictError {
    /// Creates a new data conflict error.
    #[must_use]
    pub fn new(key: impl Into<String>) -> Self {
        Self { key: key.into() }
    }
}

/// Errors raised by a task store.
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    /// The store could not be reached.
    #[error("Task store unavailable: {0}")]
    Unavailable(String),

    /// An update referenced a task the store does not know.
    #[error("Task {0} is not known to the store")]
    UnknownTask(TaskId),

    /// A record with this id already exists.
    #[error("Task {0} already exists")]
    Duplicate(TaskId),
}

/// A pipeline run that stopped at a failed stage.
#[derive(Debug, Clone, Error)]
#[error("Pipeline '{pipeline}' failed at stage '{stage}' (task {task_id}): {error}")]
pub struct PipelineFailure {
    /// The pipeline name.
    pub pipeline: String,
    /// The stage that failed.
    pub stage: String,
    /// The task the failed stage ran as.
    pub task_id: TaskId,
    /// The stage error.
    pub error: StageError,
    /// The context as it entered the failed stage.
    pub context: Box<Context>,
}

/// Which of the two not-found families an [`ArtifactError`] belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotFoundKind {
    /// The task is unknown, unfinished, or produced nothing downloadable.
    Task,
    /// The result names a file that is absent from disk.
    File,
}

/// Errors raised while resolving a task's downloadable artifact.
#[derive(Debug, Clone, Error)]
pub enum ArtifactError {
    /// No task with this id exists.
    #[error("Task {0} is not known")]
    UnknownTask(TaskId),

    /// The chain has not reached a successful terminal stage.
    #[error("Task {task_id} has not finished (status {status})")]
    NotFinished {
        /// The queried task.
        task_id: TaskId,
        /// Status of the chain's last stage.
        status: TaskStatus,
    },

    /// The terminal stage stored no downloadable output.
    #[error("Task {0} produced no downloadable result")]
    NoResult(TaskId),

    /// The stored result does not match the result schema.
    #[error("Task {task_id} stored an invalid result: {reason}")]
    InvalidResult {
        /// The task whose result was rejected.
        task_id: TaskId,
        /// Why it was rejected.
        reason: String,
    },

    /// The result names a path that does not exist on disk.
    #[error("Artifact {} for task {task_id} is missing from disk", path.display())]
    FileMissing {
        /// The queried task.
        task_id: TaskId,
        /// The path named by the result.
        path: PathBuf,
    },

    /// The task store could not be queried.
    #[error("{0}")]
    Store(#[from] StoreError),
}

impl ArtifactError {
    /// Classifies the error into the task or file not-found family.
    #[must_use]
    pub fn not_found_kind(&self) -> NotFoundKind {
        match self {
            Self::FileMissing { .. } => NotFoundKind::File,
            _ => NotFoundKind::Task,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_error_kinds() {
        assert_eq!(StageError::connectivity("db").kind(), "ConnectivityError");
        assert_eq!(StageError::not_found("x").kind(), "NotFoundError");
        assert_eq!(StageError::external_tool("pg_dump", Some(1), "").kind(), "ExternalToolError");
        assert_eq!(StageError::Timeout { limit_secs: 1 }.kind(), "TimeoutError");
        assert_eq!(StageError::failure("boom").kind(), "StageFailure");
    }

    #[test]
    fn test_not_found_and_timeout_are_final() {
        assert!(!StageError::not_found("filestore").is_retryable());
        assert!(!StageError::Timeout { limit_secs: 240 }.is_retryable());
        assert!(StageError::connectivity("db").is_retryable());
        assert!(StageError::failure("disk").is_retryable());
    }

    #[test]
    fn test_io_error_mapping() {
        let missing = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        assert!(matches!(StageError::from(missing), StageError::NotFound { .. }));

        let denied = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "nope");
        assert!(matches!(StageError::from(denied), StageError::Failure { .. }));
    }

    #[test]
    fn test_stage_error_serialization() {
        let err = StageError::external_tool("pg_dump", Some(2), "connection refused");
        let json = serde_json::to_value(&err).unwrap();
        assert_eq!(json["kind"], "external_tool");

        let back: StageError = serde_json::from_value(json).unwrap();
        assert_eq!(back, err);
    }

    #[test]
    fn test_validation_error_code() {
        let err = PipelineValidationError::new("empty")
            .with_error_info(ContractErrorInfo::new("CONTRACT-001-EMPTY", "no stages"));
        assert_eq!(err.code(), Some("CONTRACT-001-EMPTY"));
    }

    #[test]
    fn test_artifact_error_families() {
        let id = TaskId::new();
        assert_eq!(ArtifactError::UnknownTask(id).not_found_kind(), NotFoundKind::Task);
        assert_eq!(
            ArtifactError::NotFinished {
                task_id: id,
                status: TaskStatus::Started
            }
            .not_found_kind(),
            NotFoundKind::Task
        );
        assert_eq!(
            ArtifactError::FileMissing {
                task_id: id,
                path: PathBuf::from("/tmp/x.zip")
            }
            .not_found_kind(),
            NotFoundKind::File
        );
    }
}
