//! # Dumpflow
//!
//! Backup and restore pipelines for a database and its filestore.
//!
//! Dumpflow provides:
//!
//! - **Typed stages**: each stage turns a [`context::Context`] into the next one
//! - **Sequential execution**: every stage runs as its own task record
//! - **Guaranteed cleanup**: a failed run invokes its failure handler exactly once
//! - **Status and downloads**: reconstructed from the task store alone
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use dumpflow::prelude::*;
//!
//! let settings = Settings::load(None)?;
//! let executor = PipelineExecutor::new(Arc::new(InMemoryTaskStore::new()), settings.worker.concurrency);
//! let service = ArchiveService::new(Collaborators::postgres(settings), executor);
//!
//! let submitted = service
//!     .submit_backup(BackupRequest { name: "erp".into(), filestore: None, dump_format: None })
//!     .await?;
//! let report = service.status(submitted.task_id).await?;
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod archive;
pub mod artifact;
pub mod config;
pub mod context;
pub mod core;
pub mod database;
pub mod errors;
pub mod events;
pub mod observability;
pub mod pipeline;
pub mod progress;
pub mod service;
pub mod stages;
pub mod status;
pub mod store;
pub mod testing;
pub mod workdir;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::artifact::{ArtifactResolver, ArtifactStream};
    pub use crate::config::Settings;
    pub use crate::context::{BackupOptions, Context, DumpFormat, Manifest};
    pub use crate::core::{StageResult, TaskId, TaskRecord, TaskStatus};
    pub use crate::errors::{
        ArtifactError, DumpflowError, NotFoundKind, PipelineFailure, PipelineValidationError,
        StageError, StoreError,
    };
    pub use crate::events::{EventSink, LoggingEventSink, NoOpEventSink};
    pub use crate::pipeline::{
        backup_pipeline, restore_pipeline, Collaborators, FailureHandler, Pipeline,
        PipelineBuilder, PipelineExecutor, RestoreStep, RetryPolicy, Submission,
        WorkdirCleanupHandler,
    };
    pub use crate::service::{
        ArchiveService, BackupRequest, BackupSubmitted, Download, NotFoundResponse,
        RestoreRequest, RestoreSubmitted,
    };
    pub use crate::stages::{CancellationToken, Stage, StagePolicy, TaskHandle};
    pub use crate::status::{StatusAggregator, StatusReport};
    pub use crate::store::{InMemoryTaskStore, TaskStore, TaskUpdate};
}
