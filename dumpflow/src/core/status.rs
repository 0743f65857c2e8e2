//! Task status enum.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The lifecycle status of one task in a chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskStatus {
    /// Task is known but not yet picked up.
    #[default]
    Pending,
    /// A worker started the task.
    Started,
    /// The task reported intermediate progress.
    Progress,
    /// The task failed and is waiting for another attempt.
    Retry,
    /// Task completed successfully.
    Success,
    /// Task failed.
    Failure,
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "PENDING"),
            Self::Started => write!(f, "STARTED"),
            Self::Progress => write!(f, "PROGRESS"),
            Self::Retry => write!(f, "RETRY"),
            Self::Success => write!(f, "SUCCESS"),
            Self::Failure => write!(f, "FAILURE"),
        }
    }
}

impl TaskStatus {
    /// Returns true if the status represents a terminal state.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Success | Self::Failure)
    }

    /// Returns true if a worker has picked the task up at least once.
    #[must_use]
    pub fn has_started(&self) -> bool {
        !matches!(self, Self::Pending)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_display() {
        assert_eq!(TaskStatus::Pending.to_string(), "PENDING");
        assert_eq!(TaskStatus::Progress.to_string(), "PROGRESS");
        assert_eq!(TaskStatus::Failure.to_string(), "FAILURE");
    }

    #[test]
    fn test_status_is_terminal() {
        assert!(TaskStatus::Success.is_terminal());
        assert!(TaskStatus::Failure.is_terminal());
        assert!(!TaskStatus::Retry.is_terminal());
        assert!(!TaskStatus::Pending.is_terminal());
    }

    #[test]
    fn test_status_serialize() {
        let json = serde_json::to_string(&TaskStatus::Success).unwrap();
        assert_eq!(json, r#""SUCCESS""#);

        let back: TaskStatus = serde_json::from_str(r#""RETRY""#).unwrap();
        assert_eq!(back, TaskStatus::Retry);
    }
}
