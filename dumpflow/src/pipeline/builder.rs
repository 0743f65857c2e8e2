//! Pipeline builder with validation.

use super::{FailureHandler, Pipeline};
use crate::errors::{ContractErrorInfo, PipelineValidationError};
use crate::stages::Stage;
use std::collections::HashSet;
use std::sync::Arc;

/// Builder for validated pipelines.
#[derive(Debug, Clone)]
pub struct PipelineBuilder {
    name: String,
    stages: Vec<Arc<dyn Stage>>,
    on_failure: Option<Arc<dyn FailureHandler>>,
}

impl PipelineBuilder {
    /// Creates a builder.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            stages: Vec::new(),
            on_failure: None,
        }
    }

    /// Appends a stage.
    #[must_use]
    pub fn stage(mut self, stage: Arc<dyn Stage>) -> Self {
        self.stages.push(stage);
        self
    }

    /// Appends several stages in order.
    #[must_use]
    pub fn stages(mut self, stages: impl IntoIterator<Item = Arc<dyn Stage>>) -> Self {
        self.stages.extend(stages);
        self
    }

    /// Sets the handler invoked once when a stage fails.
    #[must_use]
    pub fn on_failure(mut self, handler: Arc<dyn FailureHandler>) -> Self {
        self.on_failure = Some(handler);
        self
    }

    /// Returns the pipeline name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the number of stages added so far.
    #[must_use]
    pub fn stage_count(&self) -> usize {
        self.stages.len()
    }

    /// Validates and builds the pipeline.
    ///
    /// # Errors
    ///
    /// Returns an error if the name is blank, there are no stages, a stage
    /// name is blank, or two stages share a name.
    pub fn build(self) -> Result<Pipeline, PipelineValidationError> {
        if self.name.trim().is_empty() {
            return Err(PipelineValidationError::new("Pipeline name is blank").with_error_info(
                ContractErrorInfo::new("CONTRACT-004-NAME", "Pipeline names must not be blank")
                    .with_fix_hint("Pass a non-empty name to PipelineBuilder::new."),
            ));
        }

        if self.stages.is_empty() {
            return Err(PipelineValidationError::new(format!("Pipeline '{}' has no stages", self.name))
                .with_error_info(
                    ContractErrorInfo::new("CONTRACT-004-EMPTY", "Cannot build an empty pipeline")
                        .with_fix_hint("Add at least one stage to the pipeline before building."),
                ));
        }

        let mut seen = HashSet::new();
        for stage in &self.stages {
            let name = stage.name();
            if name.trim().is_empty() {
                return Err(PipelineValidationError::new("Stage name is blank").with_error_info(
                    ContractErrorInfo::new("CONTRACT-004-STAGE_NAME", "Stage names must not be blank")
                        .with_fix_hint("Return a non-empty name from Stage::name."),
                ));
            }
            if !seen.insert(name) {
                return Err(PipelineValidationError::new(format!(
                    "Stage '{name}' appears more than once in pipeline '{}'",
                    self.name
                ))
                .with_stages(vec![name.to_string()])
                .with_error_info(
                    ContractErrorInfo::new("CONTRACT-004-DUPLICATE", format!("Duplicate stage '{name}'"))
                        .with_fix_hint("Task records are reported by stage name; give every stage a distinct name."),
                ));
            }
        }

        Ok(Pipeline {
            name: self.name,
            stages: self.stages,
            on_failure: self.on_failure,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::Context;
    use crate::pipeline::WorkdirCleanupHandler;
    use crate::stages::FnStage;

    fn noop(name: &str) -> Arc<dyn Stage> {
        Arc::new(FnStage::new(name, |ctx: Context| Ok(ctx)))
    }

    #[test]
    fn test_build_keeps_order() {
        let pipeline = PipelineBuilder::new("backup")
            .stage(noop("a"))
            .stages([noop("b"), noop("c")])
            .on_failure(Arc::new(WorkdirCleanupHandler))
            .build()
            .unwrap();

        assert_eq!(pipeline.name(), "backup");
        assert_eq!(pipeline.stage_names(), vec!["a", "b", "c"]);
        assert!(pipeline.failure_handler().is_some());
    }

    #[test]
    fn test_empty_pipeline() {
        let err = PipelineBuilder::new("backup").build().unwrap_err();
        assert_eq!(err.code(), Some("CONTRACT-004-EMPTY"));
    }

    #[test]
    fn test_blank_name() {
        let err = PipelineBuilder::new("  ").stage(noop("a")).build().unwrap_err();
        assert_eq!(err.code(), Some("CONTRACT-004-NAME"));
    }

    #[test]
    fn test_blank_stage_name() {
        let err = PipelineBuilder::new("p").stage(noop("")).build().unwrap_err();
        assert_eq!(err.code(), Some("CONTRACT-004-STAGE_NAME"));
    }

    #[test]
    fn test_duplicate_stage() {
        let builder = PipelineBuilder::new("p").stage(noop("a")).stage(noop("a"));
        assert_eq!(builder.stage_count(), 2);

        let err = builder.build().unwrap_err();
        assert_eq!(err.code(), Some("CONTRACT-004-DUPLICATE"));
        assert_eq!(err.stages, vec!["a".to_string()]);
    }
}
