use crate::context::{missing_key, Context};
use crate::errors::StageError;
use crate::stages::{blocking, names, Stage, TaskHandle};
use crate::workdir::create_workdir;
use async_trait::async_trait;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use tracing::info;

/// Locates the uploaded archive and creates a fresh workdir.
#[derive(Debug, Clone)]
pub struct InitRestoreStage {
    upload_root: PathBuf,
    data_root: PathBuf,
}

impl InitRestoreStage {
    /// Creates the stage.
    #[must_use]
    pub fn new(upload_root: impl Into<PathBuf>, data_root: impl Into<PathBuf>) -> Self {
        Self {
            upload_root: upload_root.into(),
            data_root: data_root.into(),
        }
    }
}

#[async_trait]
impl Stage for InitRestoreStage {
    fn name(&self) -> &str {
        names::INIT_RESTORE
    }

    async fn execute(&self, mut ctx: Context, _task: &TaskHandle) -> Result<Context, StageError> {
        let name = ctx.upload_name().ok_or_else(|| missing_key("upload_name"))?;
        if Path::new(name).file_name() != Some(OsStr::new(name)) {
            return Err(StageError::failure(format!("'{name}' is not a plain file name")));
        }

        let archive = self.upload_root.join(name);
        if !archive.is_file() {
            return Err(StageError::not_found(format!("Archive '{}' not found.", archive.display())));
        }

        let root = self.data_root.clone();
        let workdir = blocking(move || create_workdir(&root).map_err(StageError::from)).await?;

        info!(db_name = ctx.db_name(), archive = %archive.display(), workdir = %workdir.display(), "Restore initialized");
        ctx.set_workdir(workdir)?;
        ctx.set_restore_archive(archive)?;
        Ok(ctx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::task_handle;

    #[tokio::test]
    async fn test_locates_upload() {
        let dir = tempfile::TempDir::new().unwrap();
        let uploads = dir.path().join("uploads");
        std::fs::create_dir_all(&uploads).unwrap();
        std::fs::write(uploads.join("erp.zip"), "zip").unwrap();
        let (handle, _) = task_handle(names::INIT_RESTORE).await;

        let ctx = InitRestoreStage::new(&uploads, dir.path().join("data"))
            .execute(Context::restore("erp_copy", "erp.zip"), &handle)
            .await
            .unwrap();

        assert_eq!(ctx.restore_archive(), Some(uploads.join("erp.zip").as_path()));
        assert!(ctx.workdir().unwrap().is_dir());
    }

    #[tokio::test]
    async fn test_missing_upload() {
        let dir = tempfile::TempDir::new().unwrap();
        let (handle, _) = task_handle(names::INIT_RESTORE).await;

        let err = InitRestoreStage::new(dir.path(), dir.path())
            .execute(Context::restore("erp", "missing.zip"), &handle)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "NotFoundError");
    }

    #[tokio::test]
    async fn test_rejects_paths() {
        let dir = tempfile::TempDir::new().unwrap();
        let (handle, _) = task_handle(names::INIT_RESTORE).await;

        let err = InitRestoreStage::new(dir.path(), dir.path())
            .execute(Context::restore("erp", "../etc/passwd"), &handle)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "StageFailure");
    }
}
