use crate::archive::{merge_tree, Deadline};
use crate::context::{missing_key, Context};
use crate::errors::StageError;
use crate::pipeline::RetryPolicy;
use crate::stages::{blocking, names, Stage, StagePolicy, TaskHandle};
use async_trait::async_trait;
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{info, warn};

/// Appends the database's filestore to the archive.
#[derive(Debug, Clone)]
pub struct MergeFilestoreStage {
    filestore_root: PathBuf,
    time_limit: Duration,
    retry: RetryPolicy,
}

impl MergeFilestoreStage {
    /// Creates the stage reading filestores under `filestore_root`.
    #[must_use]
    pub fn new(filestore_root: impl Into<PathBuf>) -> Self {
        Self {
            filestore_root: filestore_root.into(),
            time_limit: Duration::from_secs(240),
            retry: RetryPolicy::retries(1),
        }
    }

    /// Sets the time limit per attempt.
    #[must_use]
    pub fn with_time_limit(mut self, limit: Duration) -> Self {
        self.time_limit = limit;
        self
    }

    /// Sets the retry policy.
    #[must_use]
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }
}

#[async_trait]
impl Stage for MergeFilestoreStage {
    fn name(&self) -> &str {
        names::MERGE_FILESTORE
    }

    fn policy(&self) -> StagePolicy {
        StagePolicy::default()
            .with_time_limit(self.time_limit)
            .with_retry(self.retry)
    }

    async fn execute(&self, ctx: Context, task: &TaskHandle) -> Result<Context, StageError> {
        let source = self.filestore_root.join(ctx.db_name());
        if !source.is_dir() {
            return Err(StageError::not_found(format!("Filestore '{}' not found.", source.display())));
        }
        let archive = ctx
            .download()
            .or_else(|| ctx.archive_path())
            .ok_or_else(|| missing_key("archive_path"))?
            .to_path_buf();

        // A retried attempt only reports boundaries past what the task holds.
        let floor = match task.progress().await {
            Ok(progress) => progress.unwrap_or(0),
            Err(err) => {
                warn!(task_id = %task.task_id(), error = %err, "Could not read recorded progress");
                0
            }
        };

        let (tx, mut rx) = mpsc::unbounded_channel::<u8>();
        let deadline = Deadline::after(self.time_limit).with_cancellation(task.cancellation().clone());
        let merge = {
            let archive = archive.clone();
            blocking(move || {
                merge_tree(&source, &archive, Some(deadline), move |percent: u8| {
                    // The receiver only goes away when the stage was dropped.
                    let _ = tx.send(percent);
                })
            })
        };
        let forward = async {
            while let Some(percent) = rx.recv().await {
                if percent <= floor {
                    continue;
                }
                if let Err(err) = task.report_progress(percent).await {
                    warn!(task_id = %task.task_id(), percent, error = %err, "Could not record progress");
                }
            }
        };

        let (summary, ()) = tokio::join!(merge, forward);
        let summary = summary?;

        info!(
            archive = %archive.display(),
            total = summary.total,
            written = summary.written,
            skipped = summary.skipped,
            "Filestore merged"
        );
        Ok(ctx)
    }
}
