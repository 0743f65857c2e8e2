//! Stage trait and implementations.
//!
//! A stage is a named transformation of a [`Context`] into a new
//! [`Context`]. Stages hold their collaborators but no per-run state.

pub mod backup;
pub mod restore;

use crate::context::Context;
use crate::core::TaskId;
use crate::errors::StageError;
use crate::pipeline::RetryPolicy;
use crate::store::{TaskStore, TaskUpdate};
use async_trait::async_trait;
use std::fmt::Debug;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Stage names.
pub mod names {
    /// Creates the run's workdir.
    pub const CREATE_WORKDIR: &str = "create-workdir";
    /// Writes `manifest.json`.
    pub const WRITE_MANIFEST: &str = "write-manifest";
    /// Dumps the database.
    pub const DUMP_DATABASE: &str = "dump-database";
    /// Zips the produced files.
    pub const ARCHIVE_FILES: &str = "archive-files";
    /// Appends the filestore to the archive.
    pub const MERGE_FILESTORE: &str = "merge-filestore";
    /// Removes the run's files.
    pub const CLEANUP_WORKDIR: &str = "cleanup-workdir";
    /// Locates an uploaded archive.
    pub const INIT_RESTORE: &str = "init-restore";
    /// Extracts the manifest and dump.
    pub const UNZIP_DUMP: &str = "unzip-dump";
    /// Creates the target database.
    pub const CREATE_DATABASE: &str = "create-database";
    /// Loads the dump.
    pub const RESTORE_DUMP: &str = "restore-dump";
    /// Extracts the filestore.
    pub const UNZIP_FILESTORE: &str = "unzip-filestore";
}

/// Execution limits of a stage.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StagePolicy {
    /// Wall-clock limit per attempt.
    pub time_limit: Option<Duration>,
    /// Retries after retryable failures.
    pub retry: RetryPolicy,
}

impl StagePolicy {
    /// Sets the time limit.
    #[must_use]
    pub fn with_time_limit(mut self, limit: Duration) -> Self {
        self.time_limit = Some(limit);
        self
    }

    /// Sets the retry policy.
    #[must_use]
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }
}

/// Cooperative stop signal for one stage attempt.
///
/// Raised by the executor when the attempt runs out of time. Blocking work
/// cannot be aborted, so it polls the token and stops on its own.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    /// Creates a token that is not cancelled.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Raises the signal. Returns false if it was already raised.
    pub fn cancel(&self) -> bool {
        self.cancelled
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    /// Returns true once the signal was raised.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// The task a stage runs as.
#[derive(Clone)]
pub struct TaskHandle {
    task_id: TaskId,
    stage: String,
    store: Arc<dyn TaskStore>,
    cancel: CancellationToken,
}

impl Debug for TaskHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskHandle")
            .field("task_id", &self.task_id)
            .field("stage", &self.stage)
            .field("cancelled", &self.cancel.is_cancelled())
            .finish_non_exhaustive()
    }
}

impl TaskHandle {
    /// Creates a handle.
    pub fn new(task_id: TaskId, stage: impl Into<String>, store: Arc<dyn TaskStore>) -> Self {
        Self {
            task_id,
            stage: stage.into(),
            store,
            cancel: CancellationToken::new(),
        }
    }

    /// Same task with a fresh stop signal, one per attempt.
    #[must_use]
    pub fn for_attempt(&self) -> Self {
        Self {
            cancel: CancellationToken::new(),
            ..self.clone()
        }
    }

    /// Stop signal of the current attempt.
    #[must_use]
    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Task id.
    #[must_use]
    pub fn task_id(&self) -> TaskId {
        self.task_id
    }

    /// Stage name.
    #[must_use]
    pub fn stage(&self) -> &str {
        &self.stage
    }

    /// Records a progress percentage on the task.
    pub async fn report_progress(&self, percent: u8) -> Result<(), StageError> {
        self.store
            .update(self.task_id, TaskUpdate::Progress(percent))
            .await?;
        Ok(())
    }

    /// Last progress percentage recorded on the task, across attempts.
    pub async fn progress(&self) -> Result<Option<u8>, StageError> {
        let record = self.store.get(self.task_id).await?;
        Ok(record.and_then(|r| r.progress))
    }
}

/// Trait for pipeline stages.
#[async_trait]
pub trait Stage: Send + Sync + Debug {
    /// Returns the name of the stage.
    fn name(&self) -> &str;

    /// Returns the execution limits of the stage.
    fn policy(&self) -> StagePolicy {
        StagePolicy::default()
    }

    /// Executes the stage against the context of the previous stage.
    async fn execute(&self, ctx: Context, task: &TaskHandle) -> Result<Context, StageError>;
}

/// A simple function-based stage.
pub struct FnStage<F>
where
    F: Fn(Context) -> Result<Context, StageError> + Send + Sync,
{
    name: String,
    policy: StagePolicy,
    func: F,
}

impl<F> FnStage<F>
where
    F: Fn(Context) -> Result<Context, StageError> + Send + Sync,
{
    /// Creates a new function-based stage.
    pub fn new(name: impl Into<String>, func: F) -> Self {
        Self {
            name: name.into(),
            policy: StagePolicy::default(),
            func,
        }
    }

    /// Sets the policy.
    #[must_use]
    pub fn with_policy(mut self, policy: StagePolicy) -> Self {
        self.policy = policy;
        self
    }
}

impl<F> Debug for FnStage<F>
where
    F: Fn(Context) -> Result<Context, StageError> + Send + Sync,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnStage").field("name", &self.name).finish()
    }
}

#[async_trait]
impl<F> Stage for FnStage<F>
where
    F: Fn(Context) -> Result<Context, StageError> + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn policy(&self) -> StagePolicy {
        self.policy
    }

    async fn execute(&self, ctx: Context, _task: &TaskHandle) -> Result<Context, StageError> {
        (self.func)(ctx)
    }
}

/// Runs filesystem work on the blocking pool.
pub(crate) async fn blocking<T, F>(work: F) -> Result<T, StageError>
where
    F: FnOnce() -> Result<T, StageError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| StageError::failure(format!("blocking task failed: {e}")))?
}
