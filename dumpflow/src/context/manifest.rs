//! The `manifest.json` document describing a dumped database.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// File name of the manifest inside the workdir and the archive.
pub const MANIFEST_FILE_NAME: &str = "manifest.json";

/// Manifest document format version.
pub const MANIFEST_SCHEMA_VERSION: &str = "1";

/// Installed components and versions of a dumped database.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Manifest {
    /// Manifest format version.
    pub schema_version: String,
    /// Database name as reported by the connection.
    pub db_name: String,
    /// Guessed application version.
    pub version: String,
    /// Same as `version`.
    pub version_info: String,
    /// Same as `version`.
    pub major_version: String,
    /// Server version as `<major>.<minor>`.
    pub server_version: String,
    /// Component name to version.
    pub modules: BTreeMap<String, String>,
}

impl Manifest {
    /// Builds a manifest from introspected connection data.
    #[must_use]
    pub fn new(db_name: impl Into<String>, server_version_num: i64, modules: BTreeMap<String, String>) -> Self {
        let version = guess_app_version(&modules);
        Self {
            schema_version: MANIFEST_SCHEMA_VERSION.to_string(),
            db_name: db_name.into(),
            version_info: version.clone(),
            major_version: version.clone(),
            version,
            server_version: server_version_string(server_version_num),
            modules,
        }
    }
}

/// Formats a numeric server version (e.g. `150004`) as `"15.0"`.
#[must_use]
pub fn server_version_string(num: i64) -> String {
    format!("{}.{}", num / 10_000, (num / 100) % 100)
}

/// Guesses the application version from the installed components.
///
/// Uses the `base` component when present, otherwise the first one by name,
/// and keeps the leading integer of its version. Returns an empty string when
/// nothing usable is found.
#[must_use]
pub fn guess_app_version(modules: &BTreeMap<String, String>) -> String {
    let Some(version) = modules.get("base").or_else(|| modules.values().next()) else {
        return String::new();
    };

    version
        .split('.')
        .next()
        .and_then(|major| major.trim().parse::<u32>().ok())
        .map(|major| format!("{major}.0"))
        .unwrap_or_default()
}
