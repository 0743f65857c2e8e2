use crate::context::{missing_key, Context};
use crate::database::DumpTool;
use crate::errors::StageError;
use crate::stages::{names, Stage, TaskHandle};
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use tracing::info;

/// Loads the extracted dump into the database.
#[derive(Clone)]
pub struct RestoreDumpStage {
    tool: Arc<dyn DumpTool>,
}

impl fmt::Debug for RestoreDumpStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RestoreDumpStage").finish_non_exhaustive()
    }
}

impl RestoreDumpStage {
    /// Creates the stage.
    pub fn new(tool: Arc<dyn DumpTool>) -> Self {
        Self { tool }
    }
}

#[async_trait]
impl Stage for RestoreDumpStage {
    fn name(&self) -> &str {
        names::RESTORE_DUMP
    }

    async fn execute(&self, mut ctx: Context, _task: &TaskHandle) -> Result<Context, StageError> {
        let dump = ctx.extracted_dump().ok_or_else(|| missing_key("extracted_dump"))?;
        self.tool.restore(ctx.db_name(), dump).await?;

        info!(db_name = ctx.db_name(), format = %dump.format, "Dump restored");
        let name = ctx.db_name().to_string();
        ctx.set_restored_database(name)?;
        Ok(ctx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{DumpFormat, DumpRecord};
    use crate::testing::{task_handle, FakeDumpTool};
    use std::path::PathBuf;

    fn extracted() -> Context {
        let mut ctx = Context::restore("erp", "erp.zip");
        ctx.set_extracted_dump(DumpRecord {
            path: PathBuf::from("/w/dump.sql.gz"),
            size: 10,
            format: DumpFormat::Sql,
        })
        .unwrap();
        ctx
    }

    #[tokio::test]
    async fn test_restores_into_db_name() {
        let tool = Arc::new(FakeDumpTool::new());
        let (handle, _) = task_handle(names::RESTORE_DUMP).await;

        let ctx = RestoreDumpStage::new(tool.clone()).execute(extracted(), &handle).await.unwrap();

        assert_eq!(ctx.restored_database(), Some("erp"));
        assert_eq!(tool.restored(), vec!["erp".to_string()]);
    }

    #[tokio::test]
    async fn test_requires_extracted_dump() {
        let (handle, _) = task_handle(names::RESTORE_DUMP).await;
        let result = RestoreDumpStage::new(Arc::new(FakeDumpTool::new()))
            .execute(Context::restore("erp", "erp.zip"), &handle)
            .await;
        assert!(result.is_err());
    }
}
