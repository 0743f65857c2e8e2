//! Whole-run status reconstructed from the task store.
//!
//! Any task of a run can be queried. The [`ChainWalker`] follows parent
//! links back to the first task, then follows successors forward,
//! flattening composite tasks into their members.

use crate::core::{TaskId, TaskRecord, TaskStatus};
use crate::errors::{DumpflowError, StoreError};
use crate::store::TaskStore;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, warn};

/// Walks a chain of task records.
#[derive(Clone, Copy)]
pub struct ChainWalker<'a> {
    store: &'a dyn TaskStore,
}

impl<'a> ChainWalker<'a> {
    /// Creates a walker over `store`.
    pub fn new(store: &'a dyn TaskStore) -> Self {
        Self { store }
    }

    async fn fetch(&self, id: TaskId) -> Result<TaskRecord, StoreError> {
        self.store.get(id).await?.ok_or(StoreError::UnknownTask(id))
    }

    /// Follows parent links from `id` and returns the records from the
    /// first task to `id`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::UnknownTask`] if `id` or a named parent is
    /// missing.
    pub async fn ancestry(&self, id: TaskId) -> Result<Vec<TaskRecord>, StoreError> {
        let mut seen = HashSet::new();
        let mut chain = Vec::new();
        let mut next = Some(id);

        while let Some(current) = next {
            if !seen.insert(current) {
                warn!(task_id = %current, "Task chain loops back on itself");
                break;
            }
            let record = self.fetch(current).await?;
            next = record.parent;
            chain.push(record);
        }

        chain.reverse();
        Ok(chain)
    }

    /// Returns the leaf records of the whole chain `id` belongs to, in
    /// execution order.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails or `id` is unknown.
    pub async fn stages(&self, id: TaskId) -> Result<Vec<TaskRecord>, StoreError> {
        let ancestry = self.ancestry(id).await?;
        let Some(origin) = ancestry.first().cloned() else {
            return Err(StoreError::UnknownTask(id));
        };

        let mut seen = HashSet::new();
        let mut leaves = Vec::new();

        if self.store.successors(origin.id).await?.is_none() {
            debug!(task_id = %id, "Store cannot list successors, reporting ancestry only");
            for record in ancestry.into_iter().filter(|r| !r.is_composite()) {
                seen.insert(record.id);
                leaves.push(record);
            }
            return Ok(leaves);
        }

        let mut current = origin;
        loop {
            let current_id = current.id;
            if !seen.insert(current_id) {
                warn!(task_id = %current_id, "Task chain loops back on itself");
                break;
            }
            self.flatten(current, &mut seen, &mut leaves).await?;

            let next = self
                .store
                .successors(current_id)
                .await?
                .and_then(|ids| ids.first().copied());
            match next {
                Some(next_id) => current = self.fetch(next_id).await?,
                None => break,
            }
        }

        Ok(leaves)
    }

    /// Pushes `record`, or the members of a composite depth first.
    async fn flatten(
        &self,
        record: TaskRecord,
        seen: &mut HashSet<TaskId>,
        leaves: &mut Vec<TaskRecord>,
    ) -> Result<(), StoreError> {
        let mut pending = vec![record];
        while let Some(record) = pending.pop() {
            if !record.is_composite() {
                leaves.push(record);
                continue;
            }
            let mut members = Vec::with_capacity(record.children.len());
            for child in &record.children {
                if seen.insert(*child) {
                    members.push(self.fetch(*child).await?);
                }
            }
            pending.extend(members.into_iter().rev());
        }
        Ok(())
    }
}

/// Status of a whole run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusReport {
    /// The queried task.
    pub task_id: TaskId,
    /// Status of the run as a whole.
    pub status: TaskStatus,
    /// `(stage name, status)` of every stage in execution order.
    pub stages: Vec<(String, TaskStatus)>,
}

/// Folds per-stage statuses into the status of the run.
///
/// Any failure fails the run, and it succeeds only when every stage did.
/// Otherwise the furthest stage that left PENDING decides. When that stage
/// already succeeded but later stages have not been picked up yet, the run
/// as a whole is still STARTED.
#[must_use]
pub fn overall_status(stages: &[TaskStatus]) -> TaskStatus {
    if stages.contains(&TaskStatus::Failure) {
        return TaskStatus::Failure;
    }
    if !stages.is_empty() && stages.iter().all(|s| *s == TaskStatus::Success) {
        return TaskStatus::Success;
    }
    match stages.iter().rev().find(|s| s.has_started()) {
        None => TaskStatus::Pending,
        Some(TaskStatus::Success) => TaskStatus::Started,
        Some(status) => *status,
    }
}

/// Answers status queries.
#[derive(Clone)]
pub struct StatusAggregator {
    store: Arc<dyn TaskStore>,
}

impl std::fmt::Debug for StatusAggregator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StatusAggregator").finish_non_exhaustive()
    }
}

impl StatusAggregator {
    /// Creates an aggregator over `store`.
    pub fn new(store: Arc<dyn TaskStore>) -> Self {
        Self { store }
    }

    /// Builds the status report of the run `task_id` belongs to.
    ///
    /// # Errors
    ///
    /// Returns [`DumpflowError::Store`] if the task is unknown or the store
    /// fails.
    pub async fn status_of(&self, task_id: TaskId) -> Result<StatusReport, DumpflowError> {
        let records = ChainWalker::new(self.store.as_ref()).stages(task_id).await?;
        let statuses: Vec<TaskStatus> = records.iter().map(|r| r.status).collect();

        Ok(StatusReport {
            task_id,
            status: overall_status(&statuses),
            stages: records.into_iter().map(|r| (r.name, r.status)).collect(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{InMemoryTaskStore, MockTaskStore};
    use pretty_assertions::assert_eq;

    async fn chain(store: &InMemoryTaskStore, stages: &[(&str, TaskStatus)]) -> Vec<TaskId> {
        let mut ids = Vec::new();
        let mut parent = None;
        for (name, status) in stages {
            let id = TaskId::new();
            store
                .insert(TaskRecord::pending(id, *name, parent).with_status(*status))
                .await
                .unwrap();
            ids.push(id);
            parent = Some(id);
        }
        ids
    }

    #[test]
    fn test_overall_status_rules() {
        use TaskStatus::{Failure, Pending, Progress, Retry, Started, Success};

        assert_eq!(overall_status(&[Success, Success]), Success);
        assert_eq!(overall_status(&[Success, Failure, Pending]), Failure);
        assert_eq!(overall_status(&[Pending, Pending]), Pending);
        assert_eq!(overall_status(&[Success, Progress, Pending]), Progress);
        assert_eq!(overall_status(&[Success, Retry, Pending]), Retry);
        assert_eq!(overall_status(&[Success, Success, Pending]), Started);
        assert_eq!(overall_status(&[]), Pending);
    }

    #[tokio::test]
    async fn test_status_from_any_task_of_the_chain() {
        let store = Arc::new(InMemoryTaskStore::new());
        let ids = chain(
            &store,
            &[
                ("create-workdir", TaskStatus::Success),
                ("write-manifest", TaskStatus::Success),
                ("dump-database", TaskStatus::Failure),
                ("archive-files", TaskStatus::Pending),
            ],
        )
        .await;
        let aggregator = StatusAggregator::new(store);

        let expected = vec![
            ("create-workdir".to_string(), TaskStatus::Success),
            ("write-manifest".to_string(), TaskStatus::Success),
            ("dump-database".to_string(), TaskStatus::Failure),
            ("archive-files".to_string(), TaskStatus::Pending),
        ];
        for id in &ids {
            let report = aggregator.status_of(*id).await.unwrap();
            assert_eq!(report.task_id, *id);
            assert_eq!(report.status, TaskStatus::Failure);
            assert_eq!(report.stages, expected);
        }
    }

    #[tokio::test]
    async fn test_composite_is_flattened() {
        let store = Arc::new(InMemoryTaskStore::new());
        let first = TaskId::new();
        let group = TaskId::new();
        let inner_a = TaskId::new();
        let inner_b = TaskId::new();
        let last = TaskId::new();

        store
            .insert(TaskRecord::pending(first, "init-restore", None).with_status(TaskStatus::Success))
            .await
            .unwrap();
        store
            .insert(TaskRecord::pending(group, "restore-database", Some(first)).with_children(vec![inner_a, inner_b]))
            .await
            .unwrap();
        store
            .insert(TaskRecord::pending(inner_a, "create-database", Some(group)).with_status(TaskStatus::Success))
            .await
            .unwrap();
        store
            .insert(TaskRecord::pending(inner_b, "restore-dump", Some(group)).with_status(TaskStatus::Started))
            .await
            .unwrap();
        store
            .insert(TaskRecord::pending(last, "unzip-filestore", Some(group)))
            .await
            .unwrap();

        let report = StatusAggregator::new(store).status_of(last).await.unwrap();
        assert_eq!(
            report.stages,
            vec![
                ("init-restore".to_string(), TaskStatus::Success),
                ("create-database".to_string(), TaskStatus::Success),
                ("restore-dump".to_string(), TaskStatus::Started),
                ("unzip-filestore".to_string(), TaskStatus::Pending),
            ]
        );
        assert_eq!(report.status, TaskStatus::Started);
    }

    #[tokio::test]
    async fn test_unknown_task() {
        let aggregator = StatusAggregator::new(Arc::new(InMemoryTaskStore::new()));
        let err = aggregator.status_of(TaskId::new()).await.unwrap_err();
        assert!(matches!(err, DumpflowError::Store(StoreError::UnknownTask(_))));
    }

    #[tokio::test]
    async fn test_parent_cycle_terminates() {
        let a = TaskId::new();
        let b = TaskId::new();
        let mut store = MockTaskStore::new();
        store.expect_get().returning(move |id| {
            let parent = if id == a { b } else { a };
            Ok(Some(TaskRecord::pending(id, "loop", Some(parent))))
        });
        store.expect_successors().returning(|_| Ok(None));

        let records = ChainWalker::new(&store).stages(a).await.unwrap();
        assert_eq!(records.len(), 2);
    }

    #[tokio::test]
    async fn test_store_without_successors_reports_ancestry() {
        let first = TaskId::new();
        let second = TaskId::new();
        let mut store = MockTaskStore::new();
        store.expect_get().returning(move |id| {
            let record = if id == first {
                TaskRecord::pending(first, "init-restore", None).with_status(TaskStatus::Success)
            } else {
                TaskRecord::pending(second, "unzip-filestore", Some(first)).with_status(TaskStatus::Progress)
            };
            Ok(Some(record))
        });
        store.expect_successors().returning(|_| Ok(None));

        let report = StatusAggregator::new(Arc::new(store)).status_of(second).await.unwrap();
        assert_eq!(report.status, TaskStatus::Progress);
        assert_eq!(report.stages.len(), 2);
        assert_eq!(report.stages[0].0, "init-restore");
    }
}
