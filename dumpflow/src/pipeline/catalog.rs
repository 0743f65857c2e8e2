//! The backup and restore pipelines.

use super::{Pipeline, PipelineBuilder, RetryPolicy, WorkdirCleanupHandler};
use crate::config::Settings;
use crate::context::BackupOptions;
use crate::database::{DatabaseAdmin, DumpTool, ManifestSource, PgDumpTool, PostgresAdmin, PostgresIntrospector};
use crate::errors::{ContractErrorInfo, PipelineValidationError};
use crate::stages::backup::{
    ArchiveFilesStage, CleanupWorkdirStage, CreateWorkdirStage, DumpDatabaseStage, MergeFilestoreStage,
    WriteManifestStage,
};
use crate::stages::restore::{
    CreateDatabaseStage, InitRestoreStage, RestoreDumpStage, UnzipDumpStage, UnzipFilestoreStage,
};
use crate::stages::{names, Stage};
use std::fmt;
use std::sync::Arc;

/// Name of the backup pipeline.
pub const BACKUP: &str = "backup";
/// Name of the restore pipeline.
pub const RESTORE: &str = "restore";

/// Everything the stages need from outside the process.
#[derive(Clone)]
pub struct Collaborators {
    /// Runtime settings.
    pub settings: Settings,
    /// Reads manifests.
    pub manifest_source: Arc<dyn ManifestSource>,
    /// Dumps and restores.
    pub dump_tool: Arc<dyn DumpTool>,
    /// Creates databases.
    pub admin: Arc<dyn DatabaseAdmin>,
}

impl fmt::Debug for Collaborators {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Collaborators")
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

impl Collaborators {
    /// Postgres-backed collaborators.
    #[must_use]
    pub fn postgres(settings: Settings) -> Self {
        let pg = settings.postgres.clone();
        Self {
            manifest_source: Arc::new(PostgresIntrospector::new(pg.clone())),
            dump_tool: Arc::new(PgDumpTool::new(pg.clone())),
            admin: Arc::new(PostgresAdmin::new(pg)),
            settings,
        }
    }
}

/// Builds the backup pipeline.
///
/// merge-filestore is left out when `options.filestore` is false.
pub fn backup_pipeline(collab: &Collaborators, options: &BackupOptions) -> Result<Pipeline, PipelineValidationError> {
    let storage = &collab.settings.storage;
    let worker = &collab.settings.worker;

    let mut stages: Vec<Arc<dyn Stage>> = vec![
        Arc::new(CreateWorkdirStage::new(&storage.data_root)),
        Arc::new(WriteManifestStage::new(Arc::clone(&collab.manifest_source))),
        Arc::new(DumpDatabaseStage::new(Arc::clone(&collab.dump_tool))),
        Arc::new(ArchiveFilesStage::new()),
    ];
    if options.filestore {
        stages.push(Arc::new(
            MergeFilestoreStage::new(&storage.filestore_root)
                .with_time_limit(worker.merge_time_limit())
                .with_retry(RetryPolicy::retries(worker.merge_max_retries).with_base_delay_ms(worker.retry_base_delay_ms)),
        ));
    }
    stages.push(Arc::new(CleanupWorkdirStage::new()));

    PipelineBuilder::new(BACKUP)
        .stages(stages)
        .on_failure(Arc::new(WorkdirCleanupHandler))
        .build()
}

/// The restore stages, in the only order they may run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum RestoreStep {
    /// Locate the upload and create a workdir.
    InitRestore,
    /// Extract manifest and dump.
    UnzipDump,
    /// Create the target database.
    CreateDatabase,
    /// Load the dump.
    RestoreDump,
    /// Extract the filestore.
    UnzipFilestore,
    /// Remove the restore workdir.
    Cleanup,
}

impl RestoreStep {
    /// Every step, in order.
    pub const ALL: [Self; 6] = [
        Self::InitRestore,
        Self::UnzipDump,
        Self::CreateDatabase,
        Self::RestoreDump,
        Self::UnzipFilestore,
        Self::Cleanup,
    ];

    /// The steps the default restore pipeline runs.
    pub const ACTIVE: [Self; 3] = [Self::InitRestore, Self::UnzipFilestore, Self::Cleanup];

    /// Stage name of the step.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::InitRestore => names::INIT_RESTORE,
            Self::UnzipDump => names::UNZIP_DUMP,
            Self::CreateDatabase => names::CREATE_DATABASE,
            Self::RestoreDump => names::RESTORE_DUMP,
            Self::UnzipFilestore => names::UNZIP_FILESTORE,
            Self::Cleanup => names::CLEANUP_WORKDIR,
        }
    }

    fn stage(self, collab: &Collaborators) -> Arc<dyn Stage> {
        let storage = &collab.settings.storage;
        match self {
            Self::InitRestore => Arc::new(InitRestoreStage::new(&storage.upload_root, &storage.data_root)),
            Self::UnzipDump => Arc::new(UnzipDumpStage::new()),
            Self::CreateDatabase => Arc::new(CreateDatabaseStage::new(Arc::clone(&collab.admin))),
            Self::RestoreDump => Arc::new(RestoreDumpStage::new(Arc::clone(&collab.dump_tool))),
            Self::UnzipFilestore => Arc::new(UnzipFilestoreStage::new(&storage.filestore_root)),
            Self::Cleanup => Arc::new(CleanupWorkdirStage::whole_workdir()),
        }
    }
}

/// Builds a restore pipeline from an ordered subset of [`RestoreStep::ALL`].
///
/// A subset that creates a workdir must end with [`RestoreStep::Cleanup`],
/// otherwise a successful restore would leave its workdir behind.
pub fn restore_pipeline(collab: &Collaborators, steps: &[RestoreStep]) -> Result<Pipeline, PipelineValidationError> {
    if let Some(pair) = steps.windows(2).find(|pair| pair[0] >= pair[1]) {
        return Err(PipelineValidationError::new(format!(
            "Restore step '{}' cannot follow '{}'",
            pair[1].name(),
            pair[0].name()
        ))
        .with_stages(vec![pair[0].name().to_string(), pair[1].name().to_string()])
        .with_error_info(
            ContractErrorInfo::new("CONTRACT-004-RESTORE_ORDER", "Restore steps are out of order or repeated")
                .with_fix_hint("List each step at most once, in the order of RestoreStep::ALL."),
        ));
    }

    if steps.contains(&RestoreStep::InitRestore) && steps.last() != Some(&RestoreStep::Cleanup) {
        return Err(PipelineValidationError::new("Restore steps create a workdir but never remove it")
            .with_stages(vec![RestoreStep::InitRestore.name().to_string()])
            .with_error_info(
                ContractErrorInfo::new("CONTRACT-004-RESTORE_CLEANUP", "Restore pipeline leaks its workdir")
                    .with_fix_hint("End the step list with RestoreStep::Cleanup."),
            ));
    }

    PipelineBuilder::new(RESTORE)
        .stages(steps.iter().map(|step| step.stage(collab)))
        .on_failure(Arc::new(WorkdirCleanupHandler))
        .build()
}
