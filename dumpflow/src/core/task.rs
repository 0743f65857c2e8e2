//! Task identifiers and persisted task records.

use super::TaskStatus;
use crate::errors::StageError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Identifier of one unit of work submitted to the executor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(Uuid);

impl TaskId {
    /// Generates a fresh task id.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Returns the underlying UUID.
    #[must_use]
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for TaskId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<Uuid> for TaskId {
    fn from(id: Uuid) -> Self {
        Self(id)
    }
}

impl FromStr for TaskId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s.trim()).map(Self)
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Failure detail persisted with a failed task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskError {
    /// Taxonomy code, e.g. `NotFoundError`.
    pub kind: String,
    /// Human readable message.
    pub message: String,
}

impl From<&StageError> for TaskError {
    fn from(err: &StageError) -> Self {
        Self {
            kind: err.kind().to_string(),
            message: err.to_string(),
        }
    }
}

/// A task as persisted by the task store.
///
/// Records form a singly linked chain through `parent`. A record with
/// non-empty `children` is a composite whose members run as a nested
/// sub-sequence, in the listed order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskRecord {
    /// Task id.
    pub id: TaskId,
    /// Stage name the task runs.
    pub name: String,
    /// Current status.
    pub status: TaskStatus,
    /// The predecessor in the chain.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<TaskId>,
    /// Members of a composite task, in execution order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<TaskId>,
    /// Last reported progress percentage.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress: Option<u8>,
    /// Result payload of a successful task.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    /// Failure detail of a failed or retrying task.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<TaskError>,
    /// Number of retries recorded so far.
    #[serde(default)]
    pub retries: u32,
    /// When the record was created.
    pub created_at: DateTime<Utc>,
    /// When the record last changed.
    pub updated_at: DateTime<Utc>,
}

impl TaskRecord {
    /// Creates a pending record.
    #[must_use]
    pub fn pending(id: TaskId, name: impl Into<String>, parent: Option<TaskId>) -> Self {
        let now = Utc::now();
        Self {
            id,
            name: name.into(),
            status: TaskStatus::Pending,
            parent,
            children: Vec::new(),
            progress: None,
            result: None,
            error: None,
            retries: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// Marks the record as a composite of the given members.
    #[must_use]
    pub fn with_children(mut self, children: Vec<TaskId>) -> Self {
        self.children = children;
        self
    }

    /// Sets the status.
    #[must_use]
    pub fn with_status(mut self, status: TaskStatus) -> Self {
        self.status = status;
        self
    }

    /// Returns true if the record fans out into a nested sub-sequence.
    #[must_use]
    pub fn is_composite(&self) -> bool {
        !self.children.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_task_id_parse_roundtrip() {
        let id = TaskId::new();
        let parsed: TaskId = id.to_string().parse().unwrap();
        assert_eq!(parsed, id);
        assert!("not-a-uuid".parse::<TaskId>().is_err());
    }

    #[test]
    fn test_pending_record() {
        let parent = TaskId::new();
        let record = TaskRecord::pending(TaskId::new(), "dump-database", Some(parent));

        assert_eq!(record.status, TaskStatus::Pending);
        assert_eq!(record.parent, Some(parent));
        assert!(!record.is_composite());
    }

    #[test]
    fn test_task_error_from_stage_error() {
        let err = StageError::not_found("Filestore '/x' not found.");
        let task_error = TaskError::from(&err);
        assert_eq!(task_error.kind, "NotFoundError");
        assert!(task_error.message.contains("/x"));
    }
}
