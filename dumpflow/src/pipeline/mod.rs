//! Pipelines and the executor that runs them.
//!
//! A [`Pipeline`] is an ordered, immutable list of stages plus an optional
//! [`FailureHandler`]. Composition is data: the [`catalog`] builds the
//! backup and restore pipelines from lists, and [`PipelineBuilder`]
//! validates them.
//!
//! [`PipelineExecutor`] runs every stage as its own task record, strictly
//! one after the other. Each stage's output is persisted through the
//! [`TaskStore`](crate::store::TaskStore) before the next stage reads it
//! back as its input.

mod builder;
pub mod catalog;
mod executor;
mod handler;
mod retry;


pub use builder::PipelineBuilder;
pub use catalog::{backup_pipeline, restore_pipeline, Collaborators, RestoreStep};
pub use executor::{PipelineExecutor, Submission};
pub use handler::{FailureHandler, WorkdirCleanupHandler};
pub use retry::{BackoffStrategy, JitterStrategy, RetryDecision, RetryPolicy};

use crate::stages::Stage;
use std::sync::Arc;

/// An ordered, validated list of stages.
#[derive(Debug, Clone)]
pub struct Pipeline {
    name: String,
    stages: Vec<Arc<dyn Stage>>,
    on_failure: Option<Arc<dyn FailureHandler>>,
}

impl Pipeline {
    /// Returns the pipeline name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the stages in execution order.
    #[must_use]
    pub fn stages(&self) -> &[Arc<dyn Stage>] {
        &self.stages
    }

    /// Returns the stage names in execution order.
    #[must_use]
    pub fn stage_names(&self) -> Vec<&str> {
        self.stages.iter().map(|s| s.name()).collect()
    }

    /// Returns the handler invoked when a stage fails.
    #[must_use]
    pub fn failure_handler(&self) -> Option<&Arc<dyn FailureHandler>> {
        self.on_failure.as_ref()
    }

    /// Number of stages.
    #[must_use]
    pub fn len(&self) -> usize {
        self.stages.len()
    }

    /// Always false for a built pipeline.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }
}
