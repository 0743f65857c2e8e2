//! Task store: where the executor persists task records.
//!
//! The store plays the role of the broker's result backend. The executor
//! writes to it; the status aggregator and the artifact resolver only read.

use crate::core::{TaskError, TaskId, TaskRecord, TaskStatus};
use crate::errors::StoreError;
use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use tracing::debug;

/// A state transition applied to a stored task.
#[derive(Debug, Clone, PartialEq)]
pub enum TaskUpdate {
    /// A worker picked the task up.
    Started,
    /// The task reported a progress percentage.
    Progress(u8),
    /// An attempt failed and the task will run again.
    Retry {
        /// The attempt that failed, starting at 1.
        attempt: u32,
        /// Why it failed.
        error: TaskError,
    },
    /// The task finished with a result payload.
    Success(serde_json::Value),
    /// The task failed.
    Failure(TaskError),
}

impl TaskUpdate {
    /// The status a record has after this update.
    #[must_use]
    pub fn status(&self) -> TaskStatus {
        match self {
            Self::Started => TaskStatus::Started,
            Self::Progress(_) => TaskStatus::Progress,
            Self::Retry { .. } => TaskStatus::Retry,
            Self::Success(_) => TaskStatus::Success,
            Self::Failure(_) => TaskStatus::Failure,
        }
    }

    /// Applies the update to a record.
    ///
    /// Records in a terminal state are left untouched; returns whether the
    /// record changed.
    pub fn apply(self, record: &mut TaskRecord) -> bool {
        if record.status.is_terminal() {
            return false;
        }

        record.status = self.status();
        record.updated_at = Utc::now();
        match self {
            Self::Started => {}
            Self::Progress(percent) => record.progress = Some(percent.min(100)),
            Self::Retry { attempt, error } => {
                record.retries = attempt;
                record.error = Some(error);
            }
            Self::Success(result) => {
                record.result = Some(result);
                record.error = None;
            }
            Self::Failure(error) => record.error = Some(error),
        }
        true
    }
}

/// Persistent storage for task records.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TaskStore: Send + Sync {
    /// Inserts a new record.
    async fn insert(&self, record: TaskRecord) -> Result<(), StoreError>;

    /// Fetches a record.
    async fn get(&self, id: TaskId) -> Result<Option<TaskRecord>, StoreError>;

    /// Applies an update to a record.
    async fn update(&self, id: TaskId, update: TaskUpdate) -> Result<(), StoreError>;

    /// Returns the records that name `id` as their predecessor.
    ///
    /// Returns `None` when the store cannot discover successors.
    async fn successors(&self, id: TaskId) -> Result<Option<Vec<TaskId>>, StoreError>;
}

/// In-process task store backed by a concurrent map.
#[derive(Debug, Default)]
pub struct InMemoryTaskStore {
    records: DashMap<TaskId, TaskRecord>,
}

impl InMemoryTaskStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Returns true if nothing is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[async_trait]
impl TaskStore for InMemoryTaskStore {
    async fn insert(&self, record: TaskRecord) -> Result<(), StoreError> {
        let id = record.id;
        match self.records.entry(id) {
            dashmap::mapref::entry::Entry::Occupied(_) => Err(StoreError::Duplicate(id)),
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                slot.insert(record);
                Ok(())
            }
        }
    }

    async fn get(&self, id: TaskId) -> Result<Option<TaskRecord>, StoreError> {
        Ok(self.records.get(&id).map(|r| r.value().clone()))
    }

    async fn update(&self, id: TaskId, update: TaskUpdate) -> Result<(), StoreError> {
        let mut record = self.records.get_mut(&id).ok_or(StoreError::UnknownTask(id))?;
        let status = update.status();
        if !update.apply(record.value_mut()) {
            debug!(task_id = %id, ?status, "Ignoring update to finished task");
        }
        Ok(())
    }

    async fn successors(&self, id: TaskId) -> Result<Option<Vec<TaskId>>, StoreError> {
        let members: Vec<TaskId> = self
            .records
            .get(&id)
            .map(|r| r.children.clone())
            .unwrap_or_default();

        let mut next: Vec<(chrono::DateTime<Utc>, TaskId)> = self
            .records
            .iter()
            .filter(|r| r.parent == Some(id) && !members.contains(&r.id))
            .map(|r| (r.created_at, r.id))
            .collect();
        next.sort();

        Ok(Some(next.into_iter().map(|(_, id)| id).collect()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn failure() -> TaskError {
        TaskError {
            kind: "StageFailure".to_string(),
            message: "boom".to_string(),
        }
    }

    #[tokio::test]
    async fn test_insert_get_update() {
        let store = InMemoryTaskStore::new();
        let id = TaskId::new();
        store.insert(TaskRecord::pending(id, "create-workdir", None)).await.unwrap();

        store.update(id, TaskUpdate::Started).await.unwrap();
        store.update(id, TaskUpdate::Progress(40)).await.unwrap();

        let record = store.get(id).await.unwrap().unwrap();
        assert_eq!(record.status, TaskStatus::Progress);
        assert_eq!(record.progress, Some(40));
    }

    #[tokio::test]
    async fn test_duplicate_insert_is_rejected() {
        let store = InMemoryTaskStore::new();
        let id = TaskId::new();
        store.insert(TaskRecord::pending(id, "a", None)).await.unwrap();
        assert!(matches!(
            store.insert(TaskRecord::pending(id, "a", None)).await,
            Err(StoreError::Duplicate(_))
        ));
    }

    #[tokio::test]
    async fn test_update_unknown_task() {
        let store = InMemoryTaskStore::new();
        assert!(matches!(
            store.update(TaskId::new(), TaskUpdate::Started).await,
            Err(StoreError::UnknownTask(_))
        ));
    }

    #[tokio::test]
    async fn test_terminal_records_are_frozen() {
        let store = InMemoryTaskStore::new();
        let id = TaskId::new();
        store.insert(TaskRecord::pending(id, "a", None)).await.unwrap();
        store.update(id, TaskUpdate::Failure(failure())).await.unwrap();
        store
            .update(id, TaskUpdate::Success(serde_json::json!({})))
            .await
            .unwrap();

        let record = store.get(id).await.unwrap().unwrap();
        assert_eq!(record.status, TaskStatus::Failure);
        assert!(record.result.is_none());
    }

    #[tokio::test]
    async fn test_retry_records_attempt() {
        let store = InMemoryTaskStore::new();
        let id = TaskId::new();
        store.insert(TaskRecord::pending(id, "merge-filestore", None)).await.unwrap();
        store
            .update(id, TaskUpdate::Retry { attempt: 1, error: failure() })
            .await
            .unwrap();

        let record = store.get(id).await.unwrap().unwrap();
        assert_eq!(record.status, TaskStatus::Retry);
        assert_eq!(record.retries, 1);
        assert_eq!(record.error, Some(failure()));
    }

    #[tokio::test]
    async fn test_successors_skip_composite_members() {
        let store = InMemoryTaskStore::new();
        let first = TaskId::new();
        let member = TaskId::new();
        let composite = TaskId::new();
        let last = TaskId::new();

        store.insert(TaskRecord::pending(first, "a", None)).await.unwrap();
        store
            .insert(TaskRecord::pending(composite, "group", Some(first)).with_children(vec![member]))
            .await
            .unwrap();
        store.insert(TaskRecord::pending(member, "b", Some(composite))).await.unwrap();
        store.insert(TaskRecord::pending(last, "c", Some(composite))).await.unwrap();

        assert_eq!(store.successors(first).await.unwrap(), Some(vec![composite]));
        assert_eq!(store.successors(composite).await.unwrap(), Some(vec![last]));
        assert_eq!(store.successors(last).await.unwrap(), Some(vec![]));
    }
}
