use crate::archive::{below_root, extract_members};
use crate::context::{missing_key, Context, ExtractRecord};
use crate::errors::StageError;
use crate::stages::{blocking, names, Stage, TaskHandle};
use async_trait::async_trait;
use std::path::PathBuf;
use tracing::info;

/// Extracts the archive's filestore into `<filestore_root>/<db_name>`.
///
/// Filestore members are the ones below a top-level directory; that
/// directory (the source database name) is dropped.
#[derive(Debug, Clone)]
pub struct UnzipFilestoreStage {
    filestore_root: PathBuf,
}

impl UnzipFilestoreStage {
    /// Creates the stage.
    #[must_use]
    pub fn new(filestore_root: impl Into<PathBuf>) -> Self {
        Self {
            filestore_root: filestore_root.into(),
        }
    }
}

#[async_trait]
impl Stage for UnzipFilestoreStage {
    fn name(&self) -> &str {
        names::UNZIP_FILESTORE
    }

    async fn execute(&self, mut ctx: Context, _task: &TaskHandle) -> Result<Context, StageError> {
        let archive = ctx
            .restore_archive()
            .ok_or_else(|| missing_key("restore_archive"))?
            .to_path_buf();
        let dest = self.filestore_root.join(ctx.db_name());

        let target = dest.clone();
        let summary = blocking(move || extract_members(&archive, &target, below_root)).await?;

        info!(path = %dest.display(), files = summary.files, archive_size = summary.archive_size, "Filestore extracted");
        ctx.set_filestore_restore(ExtractRecord {
            path: dest,
            archive_size: summary.archive_size,
            files: summary.files,
        })?;
        Ok(ctx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::{merge_tree, write_flat_archive};
    use crate::testing::task_handle;
    use std::fs;

    #[tokio::test]
    async fn test_extracts_filestore_under_target_name() {
        let dir = tempfile::TempDir::new().unwrap();
        let source = dir.path().join("src/erp");
        fs::create_dir_all(source.join("ab")).unwrap();
        fs::write(source.join("ab/blob"), "data").unwrap();
        let dump = dir.path().join("dump.sql.gz");
        fs::write(&dump, "x").unwrap();
        let archive = dir.path().join("erp.zip");
        write_flat_archive(&[dump], &archive).unwrap();
        merge_tree(&source, &archive, None, |_: u8| {}).unwrap();

        let mut ctx = Context::restore("erp_copy", "erp.zip");
        ctx.set_restore_archive(&archive).unwrap();
        let (handle, _) = task_handle(names::UNZIP_FILESTORE).await;
        let filestore_root = dir.path().join("filestore");

        let ctx = UnzipFilestoreStage::new(&filestore_root)
            .execute(ctx, &handle)
            .await
            .unwrap();

        let record = ctx.filestore_restore().unwrap();
        assert_eq!(record.path, filestore_root.join("erp_copy"));
        assert_eq!(record.files, 1);
        assert_eq!(record.archive_size, fs::metadata(&archive).unwrap().len());
        assert_eq!(fs::read_to_string(filestore_root.join("erp_copy/ab/blob")).unwrap(), "data");
        assert!(!filestore_root.join("erp_copy/dump.sql.gz").exists());
    }

    #[tokio::test]
    async fn test_missing_archive() {
        let dir = tempfile::TempDir::new().unwrap();
        let mut ctx = Context::restore("erp", "erp.zip");
        ctx.set_restore_archive(dir.path().join("erp.zip")).unwrap();
        let (handle, _) = task_handle(names::UNZIP_FILESTORE).await;

        let err = UnzipFilestoreStage::new(dir.path()).execute(ctx, &handle).await.unwrap_err();
        assert_eq!(err.kind(), "NotFoundError");
    }
}
