//! Core domain model types for dumpflow.
//!
//! This module contains the task-level types shared by the executor, the
//! task store and the status/artifact queries:
//! - Task identifiers and statuses
//! - Task records as persisted by the store
//! - The versioned stage result schema

mod result;
mod status;
mod task;

pub use result::{ResultSchemaError, StageResult, STAGE_RESULT_SCHEMA_VERSION};
pub use status::TaskStatus;
pub use task::{TaskError, TaskId, TaskRecord};
