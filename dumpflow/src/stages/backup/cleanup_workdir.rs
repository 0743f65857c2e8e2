use crate::context::Context;
use crate::errors::StageError;
use crate::stages::{names, Stage, TaskHandle};
use crate::workdir::{clean_workdir, CleanupScope};
use async_trait::async_trait;
use tracing::{info, warn};

/// Removes the files the run produced.
///
/// With recorded files only those are removed and the workdir (holding the
/// archive) stays; without any the whole workdir goes. Removal failures are
/// logged and the stage still succeeds.
#[derive(Debug, Clone, Copy, Default)]
pub struct CleanupWorkdirStage {
    whole: bool,
}

impl CleanupWorkdirStage {
    /// Creates the stage.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A stage that removes the whole workdir regardless of recorded files.
    ///
    /// Restores keep nothing in their workdir once they finish.
    #[must_use]
    pub fn whole_workdir() -> Self {
        Self { whole: true }
    }

    /// The scope cleanup applies to a context.
    #[must_use]
    pub fn scope_for(&self, ctx: &Context) -> CleanupScope {
        if self.whole || ctx.files().is_empty() {
            CleanupScope::All
        } else {
            CleanupScope::Only(ctx.files().as_slice().to_vec())
        }
    }
}

#[async_trait]
impl Stage for CleanupWorkdirStage {
    fn name(&self) -> &str {
        names::CLEANUP_WORKDIR
    }

    async fn execute(&self, ctx: Context, _task: &TaskHandle) -> Result<Context, StageError> {
        let Some(workdir) = ctx.workdir() else {
            return Ok(ctx);
        };

        let report = clean_workdir(workdir, &self.scope_for(&ctx));
        if report.is_clean() {
            info!(workdir = %workdir.display(), removed = report.removed.len(), "Workdir cleaned");
        } else {
            warn!(
                workdir = %workdir.display(),
                failures = report.failures.len(),
                "Workdir cleanup incomplete"
            );
        }
        Ok(ctx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::task_handle;
    use std::fs;

    #[tokio::test]
    async fn test_removes_listed_files_and_keeps_archive() {
        let dir = tempfile::TempDir::new().unwrap();
        let workdir = dir.path().join("run");
        fs::create_dir_all(&workdir).unwrap();
        fs::write(workdir.join("dump.sql.gz"), "x").unwrap();
        fs::write(workdir.join("erp.zip"), "z").unwrap();

        let mut ctx = Context::backup("erp");
        ctx.set_workdir(&workdir).unwrap();
        ctx.push_file(workdir.join("dump.sql.gz"));
        let (handle, _) = task_handle(names::CLEANUP_WORKDIR).await;

        CleanupWorkdirStage::new().execute(ctx, &handle).await.unwrap();

        assert!(!workdir.join("dump.sql.gz").exists());
        assert!(workdir.join("erp.zip").exists());
    }

    #[tokio::test]
    async fn test_without_files_removes_workdir() {
        let dir = tempfile::TempDir::new().unwrap();
        let workdir = dir.path().join("run");
        fs::create_dir_all(&workdir).unwrap();

        let mut ctx = Context::backup("erp");
        ctx.set_workdir(&workdir).unwrap();
        let (handle, _) = task_handle(names::CLEANUP_WORKDIR).await;

        CleanupWorkdirStage::new().execute(ctx, &handle).await.unwrap();
        assert!(!workdir.exists());
    }

    #[tokio::test]
    async fn test_whole_workdir_ignores_recorded_files() {
        let dir = tempfile::TempDir::new().unwrap();
        let workdir = dir.path().join("run");
        fs::create_dir_all(&workdir).unwrap();
        fs::write(workdir.join("dump.sql.gz"), "x").unwrap();
        fs::write(workdir.join("manifest.json"), "{}").unwrap();

        let mut ctx = Context::restore("erp", "erp.zip");
        ctx.set_workdir(&workdir).unwrap();
        ctx.push_file(workdir.join("dump.sql.gz"));
        let stage = CleanupWorkdirStage::whole_workdir();
        assert_eq!(stage.scope_for(&ctx), CleanupScope::All);

        let (handle, _) = task_handle(names::CLEANUP_WORKDIR).await;
        stage.execute(ctx, &handle).await.unwrap();
        assert!(!workdir.exists());
    }

    #[tokio::test]
    async fn test_absent_workdir_succeeds() {
        let dir = tempfile::TempDir::new().unwrap();
        let mut ctx = Context::backup("erp");
        ctx.set_workdir(dir.path().join("gone")).unwrap();
        let (handle, _) = task_handle(names::CLEANUP_WORKDIR).await;

        assert!(CleanupWorkdirStage::new().execute(ctx, &handle).await.is_ok());
    }

    /// Removal failures do not fail the stage. This mirrors the observed
    /// behavior of the cleanup contract and may be unintended.
    #[cfg(unix)]
    #[tokio::test]
    async fn test_removal_failure_still_reports_success() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::TempDir::new().unwrap();
        let workdir = dir.path().join("run");
        fs::create_dir_all(&workdir).unwrap();
        fs::write(workdir.join("dump.sql.gz"), "x").unwrap();
        fs::set_permissions(&workdir, fs::Permissions::from_mode(0o500)).unwrap();

        let mut ctx = Context::backup("erp");
        ctx.set_workdir(&workdir).unwrap();
        ctx.push_file(workdir.join("dump.sql.gz"));
        let (handle, _) = task_handle(names::CLEANUP_WORKDIR).await;

        let result = CleanupWorkdirStage::new().execute(ctx, &handle).await;
        fs::set_permissions(&workdir, fs::Permissions::from_mode(0o700)).unwrap();

        assert!(result.is_ok());
    }
}
