//! Lifecycle events emitted by the pipeline executor.
//!
//! The sink is explicit executor configuration; there is no process-wide
//! registry.

mod sink;

pub use sink::{CollectingEventSink, EventSink, LoggingEventSink, NoOpEventSink};

/// Event type names.
pub mod kinds {
    /// A run was accepted and its task records were created.
    pub const PIPELINE_SUBMITTED: &str = "pipeline.submitted";
    /// Every stage succeeded.
    pub const PIPELINE_COMPLETED: &str = "pipeline.completed";
    /// A stage failed and the run stopped.
    pub const PIPELINE_FAILED: &str = "pipeline.failed";
    /// The failure handler ran.
    pub const PIPELINE_CLEANUP: &str = "pipeline.cleanup";
    /// A worker picked a stage up.
    pub const STAGE_STARTED: &str = "stage.started";
    /// A stage attempt failed and will run again.
    pub const STAGE_RETRYING: &str = "stage.retrying";
    /// A stage returned its context.
    pub const STAGE_COMPLETED: &str = "stage.completed";
    /// A stage gave up.
    pub const STAGE_FAILED: &str = "stage.failed";
}
