//! Records written into the context by individual stages.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

/// Output format of the database dump.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DumpFormat {
    /// Plain SQL, compressed by the dump tool.
    #[default]
    Sql,
    /// The dump tool's custom archive format.
    Custom,
}

impl DumpFormat {
    /// File name the dump is written to inside the workdir.
    #[must_use]
    pub fn file_name(self) -> &'static str {
        match self {
            Self::Sql => "dump.sql.gz",
            Self::Custom => "dump.dump",
        }
    }

    /// Returns the format as used in requests and settings.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Sql => "sql",
            Self::Custom => "custom",
        }
    }
}

impl fmt::Display for DumpFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing an unknown dump format.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown dump format '{0}' (expected 'sql' or 'custom')")]
pub struct UnknownDumpFormat(pub String);

impl FromStr for DumpFormat {
    type Err = UnknownDumpFormat;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sql" | "plain" => Ok(Self::Sql),
            "custom" => Ok(Self::Custom),
            other => Err(UnknownDumpFormat(other.to_string())),
        }
    }
}

/// Options fixed at submission time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupOptions {
    /// Whether the filestore is merged into the archive.
    pub filestore: bool,
    /// The dump format.
    pub dump_format: DumpFormat,
}

impl Default for BackupOptions {
    fn default() -> Self {
        Self {
            filestore: true,
            dump_format: DumpFormat::Sql,
        }
    }
}

impl BackupOptions {
    /// Sets the filestore flag.
    #[must_use]
    pub fn with_filestore(mut self, filestore: bool) -> Self {
        self.filestore = filestore;
        self
    }

    /// Sets the dump format.
    #[must_use]
    pub fn with_dump_format(mut self, format: DumpFormat) -> Self {
        self.dump_format = format;
        self
    }
}

/// Result of the dump-database stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DumpRecord {
    /// Path of the dump file.
    pub path: PathBuf,
    /// Size in bytes.
    pub size: u64,
    /// Format it was written in.
    pub format: DumpFormat,
}

/// Result of extracting an uploaded archive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractRecord {
    /// Directory the members were extracted into.
    pub path: PathBuf,
    /// Size of the source archive in bytes.
    pub archive_size: u64,
    /// Number of files written.
    pub files: usize,
}
