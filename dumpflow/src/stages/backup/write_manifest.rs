use crate::context::{missing_key, Context, MANIFEST_FILE_NAME};
use crate::database::ManifestSource;
use crate::errors::StageError;
use crate::stages::{names, Stage, TaskHandle};
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use tracing::info;

/// Writes `manifest.json` describing the database.
#[derive(Clone)]
pub struct WriteManifestStage {
    source: Arc<dyn ManifestSource>,
}

impl fmt::Debug for WriteManifestStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WriteManifestStage").finish_non_exhaustive()
    }
}

impl WriteManifestStage {
    /// Creates the stage.
    pub fn new(source: Arc<dyn ManifestSource>) -> Self {
        Self { source }
    }
}

#[async_trait]
impl Stage for WriteManifestStage {
    fn name(&self) -> &str {
        names::WRITE_MANIFEST
    }

    async fn execute(&self, mut ctx: Context, _task: &TaskHandle) -> Result<Context, StageError> {
        let path = ctx
            .workdir()
            .ok_or_else(|| missing_key("workdir"))?
            .join(MANIFEST_FILE_NAME);

        let manifest = self.source.introspect(ctx.db_name()).await?;
        let body = serde_json::to_vec_pretty(&manifest).map_err(|e| StageError::failure(e.to_string()))?;
        tokio::fs::write(&path, body).await?;

        info!(
            db_name = ctx.db_name(),
            server_version = %manifest.server_version,
            modules = manifest.modules.len(),
            "Manifest written"
        );
        ctx.push_file(path);
        ctx.set_manifest(manifest)?;
        Ok(ctx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::Manifest;
    use crate::testing::{task_handle, FakeManifestSource};
    use std::collections::BTreeMap;

    #[tokio::test]
    async fn test_writes_manifest_and_appends_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let mut modules = BTreeMap::new();
        modules.insert("base".to_string(), "16.0.1.3".to_string());
        let manifest = Manifest::new("erp", 150_004, modules);

        let mut ctx = Context::backup("erp");
        ctx.set_workdir(dir.path()).unwrap();
        let (handle, _) = task_handle(names::WRITE_MANIFEST).await;
        let stage = WriteManifestStage::new(Arc::new(FakeManifestSource::new(manifest.clone())));

        let ctx = stage.execute(ctx, &handle).await.unwrap();

        let path = dir.path().join(MANIFEST_FILE_NAME);
        assert_eq!(ctx.files().as_slice(), &[path.clone()]);
        assert_eq!(ctx.manifest(), Some(&manifest));

        let written: serde_json::Value = serde_json::from_slice(&std::fs::read(path).unwrap()).unwrap();
        assert_eq!(written["serverVersion"], "15.0");
        assert_eq!(written["majorVersion"], "16.0");
    }

    #[tokio::test]
    async fn test_connection_failure_propagates() {
        let dir = tempfile::TempDir::new().unwrap();
        let mut ctx = Context::backup("erp");
        ctx.set_workdir(dir.path()).unwrap();
        let (handle, _) = task_handle(names::WRITE_MANIFEST).await;
        let stage = WriteManifestStage::new(Arc::new(FakeManifestSource::failing(
            StageError::connectivity("db down"),
        )));

        let err = stage.execute(ctx, &handle).await.unwrap_err();
        assert_eq!(err.kind(), "ConnectivityError");
    }

    #[tokio::test]
    async fn test_requires_workdir() {
        let (handle, _) = task_handle(names::WRITE_MANIFEST).await;
        let stage = WriteManifestStage::new(Arc::new(FakeManifestSource::default()));
        assert!(stage.execute(Context::backup("erp"), &handle).await.is_err());
    }
}
