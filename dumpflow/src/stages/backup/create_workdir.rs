use crate::context::Context;
use crate::errors::StageError;
use crate::stages::{blocking, names, Stage, TaskHandle};
use crate::workdir::create_workdir;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::path::PathBuf;
use tracing::info;

/// Archive base name, `<db_name>_<YYYYMMDD_HHMM>`.
#[must_use]
pub fn archive_base_name(db_name: &str, at: DateTime<Utc>) -> String {
    format!("{db_name}_{}", at.format("%Y%m%d_%H%M"))
}

/// Creates the run's workdir and names its archive.
#[derive(Debug, Clone)]
pub struct CreateWorkdirStage {
    data_root: PathBuf,
    clock: fn() -> DateTime<Utc>,
}

impl CreateWorkdirStage {
    /// Creates the stage with workdirs under `data_root`.
    #[must_use]
    pub fn new(data_root: impl Into<PathBuf>) -> Self {
        Self {
            data_root: data_root.into(),
            clock: Utc::now,
        }
    }

    /// Replaces the clock used for the archive name.
    #[must_use]
    pub fn with_clock(mut self, clock: fn() -> DateTime<Utc>) -> Self {
        self.clock = clock;
        self
    }
}

#[async_trait]
impl Stage for CreateWorkdirStage {
    fn name(&self) -> &str {
        names::CREATE_WORKDIR
    }

    async fn execute(&self, mut ctx: Context, _task: &TaskHandle) -> Result<Context, StageError> {
        let root = self.data_root.clone();
        let workdir = blocking(move || create_workdir(&root).map_err(StageError::from)).await?;
        let filename = archive_base_name(ctx.db_name(), (self.clock)());

        ctx.set_archive_path(workdir.join(&filename))?;
        ctx.set_filename(filename)?;
        ctx.set_workdir(&workdir)?;

        info!(db_name = ctx.db_name(), workdir = %workdir.display(), "Workdir ready");
        Ok(ctx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::task_handle;
    use chrono::TimeZone;

    fn fixed() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 9, 7, 5, 59).unwrap()
    }

    #[test]
    fn test_archive_base_name_truncates_to_minute() {
        assert_eq!(archive_base_name("erp", fixed()), "erp_20240309_0705");
    }

    #[tokio::test]
    async fn test_create_workdir() {
        let root = tempfile::TempDir::new().unwrap();
        let (handle, _) = task_handle(names::CREATE_WORKDIR).await;
        let stage = CreateWorkdirStage::new(root.path()).with_clock(fixed);

        let ctx = stage.execute(Context::backup("erp"), &handle).await.unwrap();

        let workdir = ctx.workdir().unwrap();
        assert!(workdir.is_dir());
        assert_eq!(workdir.parent(), Some(root.path()));
        assert_eq!(ctx.filename(), Some("erp_20240309_0705"));
        assert_eq!(ctx.archive_path(), Some(workdir.join("erp_20240309_0705").as_path()));
    }

    #[tokio::test]
    async fn test_rerun_on_same_context_conflicts() {
        let root = tempfile::TempDir::new().unwrap();
        let (handle, _) = task_handle(names::CREATE_WORKDIR).await;
        let stage = CreateWorkdirStage::new(root.path());

        let ctx = stage.execute(Context::backup("erp"), &handle).await.unwrap();
        let err = stage.execute(ctx, &handle).await.unwrap_err();
        assert_eq!(err.kind(), "StageFailure");
    }
}
