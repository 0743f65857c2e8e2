//! Runtime settings.
//!
//! Sources, lowest priority first: compiled defaults, an optional settings
//! file, then `DUMPFLOW__SECTION__KEY` environment variables (a `.env` file
//! is loaded first).

use crate::context::{BackupOptions, DumpFormat};
use crate::errors::DumpflowError;
use dotenvy::dotenv;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// All settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Filesystem locations.
    pub storage: StorageSettings,
    /// Database connection.
    pub postgres: PostgresSettings,
    /// Worker pool.
    pub worker: WorkerSettings,
    /// Submission defaults.
    pub defaults: DefaultsSettings,
    /// Downloads.
    pub download: DownloadSettings,
    /// Logging.
    pub logging: LoggingSettings,
}

/// Filesystem locations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageSettings {
    /// Parent of every workdir.
    pub data_root: PathBuf,
    /// Parent of per-database filestores.
    pub filestore_root: PathBuf,
    /// Where uploaded archives are looked up.
    pub upload_root: PathBuf,
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            data_root: PathBuf::from("/usr/src/data"),
            filestore_root: PathBuf::from("/usr/src/filestore"),
            upload_root: PathBuf::from("/usr/src/data/uploads"),
        }
    }
}

/// Connection parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PostgresSettings {
    /// Server host (`PGHOST`).
    pub host: String,
    /// Server port (`PGPORT`).
    pub port: u16,
    /// Role (`PGUSER`).
    pub user: Option<String>,
    /// Password (`PGPASSWORD`).
    pub password: Option<String>,
    /// Database used to issue `CREATE DATABASE`.
    pub maintenance_db: String,
}

impl Default for PostgresSettings {
    fn default() -> Self {
        Self {
            host: "db".to_string(),
            port: 5432,
            user: None,
            password: None,
            maintenance_db: "postgres".to_string(),
        }
    }
}

impl PostgresSettings {
    /// Environment handed to the Postgres client tools.
    #[must_use]
    pub fn tool_env(&self) -> Vec<(&'static str, String)> {
        let mut env = vec![("PGHOST", self.host.clone()), ("PGPORT", self.port.to_string())];
        if let Some(user) = &self.user {
            env.push(("PGUSER", user.clone()));
        }
        if let Some(password) = &self.password {
            env.push(("PGPASSWORD", password.clone()));
        }
        env
    }
}

/// Worker pool and stage limits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerSettings {
    /// Stages that may run at once across all runs.
    pub concurrency: usize,
    /// Time limit of merge-filestore in seconds.
    pub merge_time_limit_secs: u64,
    /// Retries allowed for merge-filestore.
    pub merge_max_retries: u32,
    /// Base delay between retries.
    pub retry_base_delay_ms: u64,
}

impl Default for WorkerSettings {
    fn default() -> Self {
        Self {
            concurrency: 4,
            merge_time_limit_secs: 240,
            merge_max_retries: 1,
            retry_base_delay_ms: 1000,
        }
    }
}

impl WorkerSettings {
    /// Time limit of merge-filestore.
    #[must_use]
    pub fn merge_time_limit(&self) -> Duration {
        Duration::from_secs(self.merge_time_limit_secs)
    }
}

/// Defaults applied to submissions that omit an option.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DefaultsSettings {
    /// Merge the filestore.
    pub filestore: bool,
    /// Dump format.
    pub dump_format: DumpFormat,
}

impl Default for DefaultsSettings {
    fn default() -> Self {
        let options = BackupOptions::default();
        Self {
            filestore: options.filestore,
            dump_format: options.dump_format,
        }
    }
}

/// Streaming downloads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DownloadSettings {
    /// Chunk size in bytes.
    pub chunk_size: usize,
}

impl Default for DownloadSettings {
    fn default() -> Self {
        Self { chunk_size: 64 * 1024 }
    }
}

/// Log output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// Default filter directive, overridden by `RUST_LOG`.
    pub level: String,
    /// Emit JSON lines instead of compact text.
    pub json: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

impl Settings {
    /// Loads settings from defaults, an optional file and the environment.
    pub fn load(path: Option<&Path>) -> Result<Self, DumpflowError> {
        dotenv().ok();

        let defaults = config::Config::try_from(&Self::default()).map_err(config_error)?;
        let mut builder = config::Config::builder().add_source(defaults);

        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path));
        }

        builder = builder.add_source(
            config::Environment::with_prefix("DUMPFLOW")
                .separator("__")
                .try_parsing(true),
        );

        let settings: Self = builder
            .build()
            .map_err(config_error)?
            .try_deserialize()
            .map_err(config_error)?;

        settings.validate()?;
        Ok(settings)
    }

    /// Rejects settings the executor cannot run with.
    pub fn validate(&self) -> Result<(), DumpflowError> {
        if self.worker.concurrency == 0 {
            return Err(DumpflowError::Config(
                "worker.concurrency must be greater than 0".to_string(),
            ));
        }

        if self.download.chunk_size == 0 {
            return Err(DumpflowError::Config(
                "download.chunk_size must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}

#[allow(clippy::needless_pass_by_value)]
fn config_error(err: config::ConfigError) -> DumpflowError {
    DumpflowError::Config(err.to_string())
}
