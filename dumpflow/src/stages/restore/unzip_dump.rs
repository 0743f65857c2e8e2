use crate::archive::{extract_members, top_level};
use crate::context::{missing_key, Context, DumpFormat, DumpRecord, Manifest, MANIFEST_FILE_NAME};
use crate::errors::StageError;
use crate::stages::{blocking, names, Stage, TaskHandle};
use async_trait::async_trait;
use tracing::{info, warn};

/// Extracts the manifest and the dump into the workdir.
#[derive(Debug, Clone, Copy, Default)]
pub struct UnzipDumpStage;

impl UnzipDumpStage {
    /// Creates the stage.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Stage for UnzipDumpStage {
    fn name(&self) -> &str {
        names::UNZIP_DUMP
    }

    async fn execute(&self, mut ctx: Context, _task: &TaskHandle) -> Result<Context, StageError> {
        let archive = ctx
            .restore_archive()
            .ok_or_else(|| missing_key("restore_archive"))?
            .to_path_buf();
        let workdir = ctx.workdir().ok_or_else(|| missing_key("workdir"))?.to_path_buf();

        let dest = workdir.clone();
        blocking(move || extract_members(&archive, &dest, top_level)).await?;

        let dump = [DumpFormat::Sql, DumpFormat::Custom]
            .into_iter()
            .map(|format| (format, workdir.join(format.file_name())))
            .find(|(_, path)| path.is_file())
            .ok_or_else(|| StageError::not_found("archive contains no database dump"))?;
        let (format, path) = dump;
        let size = tokio::fs::metadata(&path).await?.len();

        let manifest_path = workdir.join(MANIFEST_FILE_NAME);
        if let Ok(body) = tokio::fs::read(&manifest_path).await {
            match serde_json::from_slice::<Manifest>(&body) {
                Ok(manifest) => ctx.set_manifest(manifest)?,
                Err(err) => warn!(path = %manifest_path.display(), error = %err, "Ignoring unreadable manifest"),
            }
        }

        info!(path = %path.display(), size, %format, "Dump extracted");
        ctx.set_extracted_dump(DumpRecord { path, size, format })?;
        Ok(ctx)
    }
}
