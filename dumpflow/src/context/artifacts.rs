//! Append-only list of files produced by a run.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Ordered list of artifact paths.
///
/// Entries can be appended and read but never removed or replaced.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ArtifactList(Vec<PathBuf>);

impl ArtifactList {
    /// Creates an empty list.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a path.
    pub fn push(&mut self, path: impl Into<PathBuf>) {
        self.0.push(path.into());
    }

    /// Returns the paths in insertion order.
    #[must_use]
    pub fn as_slice(&self) -> &[PathBuf] {
        &self.0
    }

    /// Iterates over the paths.
    pub fn iter(&self) -> impl Iterator<Item = &Path> {
        self.0.iter().map(PathBuf::as_path)
    }

    /// Returns the number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns true if nothing was recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Returns true if the path was recorded.
    #[must_use]
    pub fn contains(&self, path: &Path) -> bool {
        self.0.iter().any(|p| p == path)
    }
}

impl<'a> IntoIterator for &'a ArtifactList {
    type Item = &'a PathBuf;
    type IntoIter = std::slice::Iter<'a, PathBuf>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}
