//! Failure handling.

use crate::context::Context;
use crate::errors::PipelineFailure;
use crate::workdir::{clean_workdir, CleanupScope};
use async_trait::async_trait;
use std::fmt::Debug;
use tracing::{error, info, warn};

/// Invoked once when a pipeline stage fails.
///
/// Handlers must not fail: whatever goes wrong is logged and the run's
/// outcome stays the original stage failure.
#[async_trait]
pub trait FailureHandler: Send + Sync + Debug {
    /// Handles a failure. `ctx` is the context that entered the failed stage.
    async fn on_failure(&self, ctx: &Context, failure: &PipelineFailure);
}

/// Removes the run's whole workdir.
#[derive(Debug, Clone, Copy, Default)]
pub struct WorkdirCleanupHandler;

#[async_trait]
impl FailureHandler for WorkdirCleanupHandler {
    async fn on_failure(&self, ctx: &Context, failure: &PipelineFailure) {
        error!(
            pipeline = %failure.pipeline,
            stage = %failure.stage,
            task_id = %failure.task_id,
            kind = failure.error.kind(),
            error = %failure.error,
            "Pipeline failed"
        );

        let Some(workdir) = ctx.workdir().map(ToOwned::to_owned) else {
            info!(pipeline = %failure.pipeline, "No workdir to clean up");
            return;
        };

        let target = workdir.clone();
        match tokio::task::spawn_blocking(move || clean_workdir(&target, &CleanupScope::All)).await {
            Ok(report) if report.is_clean() => {
                info!(workdir = %workdir.display(), "Workdir cleaned up after failure");
            }
            Ok(report) => {
                warn!(
                    workdir = %workdir.display(),
                    failures = report.failures.len(),
                    "Workdir cleanup after failure was incomplete"
                );
            }
            Err(err) => {
                warn!(workdir = %workdir.display(), error = %err, "Workdir cleanup task failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::TaskId;
    use crate::errors::StageError;

    fn failure(ctx: &Context) -> PipelineFailure {
        PipelineFailure {
            pipeline: "backup".to_string(),
            stage: "dump-database".to_string(),
            task_id: TaskId::new(),
            error: StageError::external_tool("pg_dump", Some(1), "boom"),
            context: Box::new(ctx.clone()),
        }
    }

    #[tokio::test]
    async fn test_removes_workdir() {
        let root = tempfile::TempDir::new().unwrap();
        let workdir = root.path().join("run");
        std::fs::create_dir_all(&workdir).unwrap();
        std::fs::write(workdir.join("manifest.json"), "{}").unwrap();

        let mut ctx = Context::backup("erp");
        ctx.set_workdir(&workdir).unwrap();

        WorkdirCleanupHandler.on_failure(&ctx, &failure(&ctx)).await;
        assert!(!workdir.exists());
    }

    #[tokio::test]
    async fn test_without_workdir_is_a_no_op() {
        let ctx = Context::backup("erp");
        WorkdirCleanupHandler.on_failure(&ctx, &failure(&ctx)).await;
    }

    #[tokio::test]
    async fn test_already_removed_workdir() {
        let root = tempfile::TempDir::new().unwrap();
        let mut ctx = Context::backup("erp");
        ctx.set_workdir(root.path().join("gone")).unwrap();

        WorkdirCleanupHandler.on_failure(&ctx, &failure(&ctx)).await;
        assert!(!root.path().join("gone").exists());
    }
}
