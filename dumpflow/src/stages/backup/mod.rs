//! The backup stages, in pipeline order.

mod archive_files;
mod cleanup_workdir;
mod create_workdir;
mod dump_database;
mod merge_filestore;
mod write_manifest;

pub use archive_files::ArchiveFilesStage;
pub use cleanup_workdir::CleanupWorkdirStage;
pub use create_workdir::{archive_base_name, CreateWorkdirStage};
pub use dump_database::DumpDatabaseStage;
pub use merge_filestore::MergeFilestoreStage;
pub use write_manifest::WriteManifestStage;
