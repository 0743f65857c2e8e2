use crate::context::{missing_key, Context, DumpRecord};
use crate::database::DumpTool;
use crate::errors::StageError;
use crate::stages::{names, Stage, TaskHandle};
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;

/// Dumps the database into the workdir.
#[derive(Clone)]
pub struct DumpDatabaseStage {
    tool: Arc<dyn DumpTool>,
}

impl fmt::Debug for DumpDatabaseStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DumpDatabaseStage").finish_non_exhaustive()
    }
}

impl DumpDatabaseStage {
    /// Creates the stage.
    pub fn new(tool: Arc<dyn DumpTool>) -> Self {
        Self { tool }
    }
}

#[async_trait]
impl Stage for DumpDatabaseStage {
    fn name(&self) -> &str {
        names::DUMP_DATABASE
    }

    async fn execute(&self, mut ctx: Context, _task: &TaskHandle) -> Result<Context, StageError> {
        let format = ctx.options().dump_format;
        let path = ctx
            .workdir()
            .ok_or_else(|| missing_key("workdir"))?
            .join(format.file_name());

        let size = self.tool.dump(ctx.db_name(), format, &path).await?;

        ctx.push_file(&path);
        ctx.set_dump(DumpRecord { path, size, format })?;
        Ok(ctx)
    }
}
