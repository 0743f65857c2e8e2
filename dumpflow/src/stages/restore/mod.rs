//! The restore stages.
//!
//! Only init-restore and unzip-filestore are wired into the default restore
//! pipeline; the others can be selected when building one.

mod create_database;
mod init_restore;
mod restore_dump;
mod unzip_dump;
mod unzip_filestore;

pub use create_database::CreateDatabaseStage;
pub use init_restore::InitRestoreStage;
pub use restore_dump::RestoreDumpStage;
pub use unzip_dump::UnzipDumpStage;
pub use unzip_filestore::UnzipFilestoreStage;
