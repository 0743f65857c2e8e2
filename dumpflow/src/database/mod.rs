//! Database collaborators used by the stages.
//!
//! Stages only see the traits. The Postgres implementations talk to the
//! server through `sqlx` and run the client tools as child processes.

mod postgres;
mod tools;

pub use postgres::{PostgresAdmin, PostgresIntrospector, SQL_SELECT_MODULES};
pub use tools::PgDumpTool;

use crate::context::{DumpFormat, DumpRecord, Manifest};
use crate::errors::StageError;
use async_trait::async_trait;
use regex::Regex;
use std::path::Path;

/// Reads the manifest of a database.
#[async_trait]
pub trait ManifestSource: Send + Sync {
    /// Connects to `db_name` and introspects installed components and the
    /// server version.
    async fn introspect(&self, db_name: &str) -> Result<Manifest, StageError>;
}

/// Dumps and restores databases.
#[async_trait]
pub trait DumpTool: Send + Sync {
    /// Dumps `db_name` into `dest` and returns the written size in bytes.
    async fn dump(&self, db_name: &str, format: DumpFormat, dest: &Path) -> Result<u64, StageError>;

    /// Restores a dump into `db_name`.
    async fn restore(&self, db_name: &str, dump: &DumpRecord) -> Result<(), StageError>;
}

/// Server-level administration.
#[async_trait]
pub trait DatabaseAdmin: Send + Sync {
    /// Creates an empty database.
    async fn create_database(&self, name: &str) -> Result<(), StageError>;
}

const DATABASE_NAME_PATTERN: &str = r"^[A-Za-z0-9_][A-Za-z0-9_.\-]{0,62}$";

/// Rejects names that cannot be used as a quoted database identifier.
pub fn validate_database_name(name: &str) -> Result<(), StageError> {
    let pattern = Regex::new(DATABASE_NAME_PATTERN).map_err(|e| StageError::failure(e.to_string()))?;
    if pattern.is_match(name) {
        Ok(())
    } else {
        Err(StageError::failure(format!("invalid database name '{name}'")))
    }
}
