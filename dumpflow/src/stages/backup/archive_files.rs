use crate::archive::{ensure_zip_suffix, write_flat_archive};
use crate::context::{missing_key, Context};
use crate::errors::StageError;
use crate::stages::{blocking, names, Stage, TaskHandle};
use async_trait::async_trait;
use tracing::info;

/// Zips every recorded file, flattened to basenames.
#[derive(Debug, Clone, Copy, Default)]
pub struct ArchiveFilesStage;

impl ArchiveFilesStage {
    /// Creates the stage.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Stage for ArchiveFilesStage {
    fn name(&self) -> &str {
        names::ARCHIVE_FILES
    }

    async fn execute(&self, mut ctx: Context, _task: &TaskHandle) -> Result<Context, StageError> {
        let target = ensure_zip_suffix(ctx.archive_path().ok_or_else(|| missing_key("archive_path"))?);
        let files = ctx.files().as_slice().to_vec();
        let count = files.len();

        let dest = target.clone();
        let size = blocking(move || write_flat_archive(&files, &dest)).await?;

        info!(archive = %target.display(), files = count, size, "Archive written");
        ctx.finalize_archive(target)?;
        Ok(ctx)
    }
}
