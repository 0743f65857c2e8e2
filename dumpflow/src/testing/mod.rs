//! Testing utilities for dumpflow pipelines.
//!
//! This module provides:
//! - In-memory fakes of the database collaborators
//! - Scripted, failing and slow stages for executor tests
//! - Helpers that wire a task handle or a full set of collaborators

mod fakes;
mod stages;

pub use fakes::{FakeDatabaseAdmin, FakeDumpTool, FakeManifestSource};
pub use stages::{FailingStage, ScriptedStage, SlowStage};

use crate::config::Settings;
use crate::core::{TaskId, TaskRecord};
use crate::pipeline::Collaborators;
use crate::stages::TaskHandle;
use crate::store::{InMemoryTaskStore, TaskStore};
use std::path::Path;
use std::sync::Arc;

/// Creates a pending task for `stage` in a fresh store and returns its handle.
///
/// # Panics
///
/// Panics if the in-memory store rejects the record, which it never does
/// for a fresh id.
pub async fn task_handle(stage: &str) -> (TaskHandle, Arc<InMemoryTaskStore>) {
    let store = Arc::new(InMemoryTaskStore::new());
    let id = TaskId::new();
    store
        .insert(TaskRecord::pending(id, stage, None))
        .await
        .unwrap_or_else(|e| panic!("fresh store rejected a record: {e}"));

    let handle = TaskHandle::new(id, stage, Arc::clone(&store) as Arc<dyn TaskStore>);
    (handle, store)
}

/// Settings whose storage roots all live under `root`.
#[must_use]
pub fn settings(root: &Path) -> Settings {
    let mut settings = Settings::default();
    settings.storage.data_root = root.join("data");
    settings.storage.filestore_root = root.join("filestore");
    settings.storage.upload_root = root.join("uploads");
    settings.worker.retry_base_delay_ms = 1;
    settings
}

/// Fake collaborators over [`settings`].
#[must_use]
pub fn collaborators(root: &Path) -> Collaborators {
    Collaborators {
        settings: settings(root),
        manifest_source: Arc::new(FakeManifestSource::default()),
        dump_tool: Arc::new(FakeDumpTool::new()),
        admin: Arc::new(FakeDatabaseAdmin::new()),
    }
}
