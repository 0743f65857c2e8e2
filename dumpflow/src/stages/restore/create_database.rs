use crate::context::Context;
use crate::database::{validate_database_name, DatabaseAdmin};
use crate::errors::StageError;
use crate::stages::{names, Stage, TaskHandle};
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;

/// Creates the empty database a dump is restored into.
#[derive(Clone)]
pub struct CreateDatabaseStage {
    admin: Arc<dyn DatabaseAdmin>,
}

impl fmt::Debug for CreateDatabaseStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CreateDatabaseStage").finish_non_exhaustive()
    }
}

impl CreateDatabaseStage {
    /// Creates the stage.
    pub fn new(admin: Arc<dyn DatabaseAdmin>) -> Self {
        Self { admin }
    }
}

#[async_trait]
impl Stage for CreateDatabaseStage {
    fn name(&self) -> &str {
        names::CREATE_DATABASE
    }

    async fn execute(&self, mut ctx: Context, _task: &TaskHandle) -> Result<Context, StageError> {
        let name = ctx.db_name().to_string();
        validate_database_name(&name)?;
        self.admin.create_database(&name).await?;
        ctx.set_created_database(name)?;
        Ok(ctx)
    }
}
