//! In-memory database collaborators.

use crate::context::{DumpFormat, DumpRecord, Manifest};
use crate::database::{DatabaseAdmin, DumpTool, ManifestSource};
use crate::errors::StageError;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::path::Path;

/// Returns a fixed manifest, or a fixed error.
#[derive(Debug, Clone)]
pub struct FakeManifestSource {
    outcome: Result<Manifest, StageError>,
}

impl FakeManifestSource {
    /// Always returns `manifest`.
    #[must_use]
    pub fn new(manifest: Manifest) -> Self {
        Self { outcome: Ok(manifest) }
    }

    /// Always fails with `error`.
    #[must_use]
    pub fn failing(error: StageError) -> Self {
        Self { outcome: Err(error) }
    }
}

impl Default for FakeManifestSource {
    fn default() -> Self {
        let modules = BTreeMap::from([
            ("base".to_string(), "16.0.1.3".to_string()),
            ("web".to_string(), "16.0.1.0".to_string()),
        ]);
        Self::new(Manifest::new("erp", 150_004, modules))
    }
}

#[async_trait]
impl ManifestSource for FakeManifestSource {
    async fn introspect(&self, db_name: &str) -> Result<Manifest, StageError> {
        let mut manifest = self.outcome.clone()?;
        manifest.db_name = db_name.to_string();
        Ok(manifest)
    }
}

/// Writes a small placeholder dump and records every call.
#[derive(Debug, Default)]
pub struct FakeDumpTool {
    error: Option<StageError>,
    dumped: Mutex<Vec<String>>,
    restored: Mutex<Vec<String>>,
}

impl FakeDumpTool {
    /// A tool that succeeds.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A tool whose every call fails with `error`.
    #[must_use]
    pub fn failing(error: StageError) -> Self {
        Self {
            error: Some(error),
            ..Self::default()
        }
    }

    /// Databases dumped so far.
    #[must_use]
    pub fn dumped(&self) -> Vec<String> {
        self.dumped.lock().clone()
    }

    /// Databases restored so far.
    #[must_use]
    pub fn restored(&self) -> Vec<String> {
        self.restored.lock().clone()
    }

    fn check(&self) -> Result<(), StageError> {
        self.error.clone().map_or(Ok(()), Err)
    }
}

#[async_trait]
impl DumpTool for FakeDumpTool {
    async fn dump(&self, db_name: &str, format: DumpFormat, dest: &Path) -> Result<u64, StageError> {
        self.check()?;
        let body = format!("-- {format} dump of {db_name}\n");
        tokio::fs::write(dest, body.as_bytes()).await?;
        self.dumped.lock().push(db_name.to_string());
        Ok(body.len() as u64)
    }

    async fn restore(&self, db_name: &str, _dump: &DumpRecord) -> Result<(), StageError> {
        self.check()?;
        self.restored.lock().push(db_name.to_string());
        Ok(())
    }
}

/// Records created databases.
#[derive(Debug, Default)]
pub struct FakeDatabaseAdmin {
    created: Mutex<Vec<String>>,
}

impl FakeDatabaseAdmin {
    /// Creates the fake.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Databases created so far.
    #[must_use]
    pub fn created(&self) -> Vec<String> {
        self.created.lock().clone()
    }
}

#[async_trait]
impl DatabaseAdmin for FakeDatabaseAdmin {
    async fn create_database(&self, name: &str) -> Result<(), StageError> {
        let mut created = self.created.lock();
        if created.iter().any(|c| c == name) {
            return Err(StageError::failure(format!("database \"{name}\" already exists")));
        }
        created.push(name.to_string());
        Ok(())
    }
}
