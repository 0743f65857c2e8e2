//! Downloadable artifacts of finished runs.

use crate::core::{StageResult, TaskId, TaskStatus};
use crate::errors::{ArtifactError, StoreError};
use crate::status::ChainWalker;
use crate::store::TaskStore;
use futures::stream::{self, Stream};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs::File;
use tokio::io::AsyncReadExt;

/// Maps a run to the file its last stage produced.
#[derive(Clone)]
pub struct ArtifactResolver {
    store: Arc<dyn TaskStore>,
}

impl std::fmt::Debug for ArtifactResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArtifactResolver").finish_non_exhaustive()
    }
}

impl ArtifactResolver {
    /// Creates a resolver over `store`.
    pub fn new(store: Arc<dyn TaskStore>) -> Self {
        Self { store }
    }

    /// Resolves the output file of the run `task_id` belongs to.
    ///
    /// Only the last stage of the chain is consulted, and only once it
    /// succeeded.
    ///
    /// # Errors
    ///
    /// Returns [`ArtifactError::FileMissing`] when the result names a file
    /// that does not exist, and one of the task-family errors when there is
    /// no finished result to look at.
    pub async fn resolve(&self, task_id: TaskId) -> Result<PathBuf, ArtifactError> {
        let stages = ChainWalker::new(self.store.as_ref())
            .stages(task_id)
            .await
            .map_err(|err| match err {
                StoreError::UnknownTask(_) => ArtifactError::UnknownTask(task_id),
                other => ArtifactError::Store(other),
            })?;
        let last = stages.last().ok_or(ArtifactError::UnknownTask(task_id))?;

        if last.status != TaskStatus::Success {
            return Err(ArtifactError::NotFinished {
                task_id,
                status: last.status,
            });
        }

        let value = last.result.as_ref().ok_or(ArtifactError::NoResult(task_id))?;
        let result = StageResult::from_value(value).map_err(|e| ArtifactError::InvalidResult {
            task_id,
            reason: e.to_string(),
        })?;
        let path = result
            .context
            .output_path()
            .ok_or(ArtifactError::NoResult(task_id))?
            .to_path_buf();

        if !tokio::fs::metadata(&path).await.is_ok_and(|m| m.is_file()) {
            return Err(ArtifactError::FileMissing { task_id, path });
        }
        Ok(path)
    }
}

/// A file read lazily in fixed-size chunks.
#[derive(Debug)]
pub struct ArtifactStream {
    path: PathBuf,
    file: File,
    len: u64,
    chunk_size: usize,
}

impl ArtifactStream {
    /// Opens `path` for streaming.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened.
    pub async fn open(path: impl AsRef<Path>, chunk_size: usize) -> io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = File::open(&path).await?;
        let len = file.metadata().await?.len();
        Ok(Self {
            path,
            file,
            len,
            chunk_size: chunk_size.max(1),
        })
    }

    /// Size of the file in bytes.
    #[must_use]
    pub fn len(&self) -> u64 {
        self.len
    }

    /// Returns true for an empty file.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// File name to offer the client.
    #[must_use]
    pub fn file_name(&self) -> Option<&str> {
        self.path.file_name().and_then(|n| n.to_str())
    }

    /// Consumes the handle into a finite stream of chunks.
    pub fn into_stream(self) -> impl Stream<Item = io::Result<Vec<u8>>> + Send {
        stream::try_unfold((self.file, self.chunk_size), |(mut file, chunk_size)| async move {
            let mut buf = vec![0; chunk_size];
            let read = file.read(&mut buf).await?;
            if read == 0 {
                return Ok(None);
            }
            buf.truncate(read);
            Ok(Some((buf, (file, chunk_size))))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::Context;
    use crate::core::TaskRecord;
    use crate::store::{InMemoryTaskStore, TaskUpdate};
    use chrono::Utc;
    use futures::TryStreamExt;

    async fn finished_run(store: &InMemoryTaskStore, ctx: Context) -> TaskId {
        let first = TaskId::new();
        let last = TaskId::new();
        store.insert(TaskRecord::pending(first, "archive-files", None)).await.unwrap();
        store.insert(TaskRecord::pending(last, "cleanup-workdir", Some(first))).await.unwrap();

        for id in [first, last] {
            let value = StageResult::completed("stage", Utc::now(), ctx.clone()).to_value().unwrap();
            store.update(id, TaskUpdate::Success(value)).await.unwrap();
        }
        last
    }

    fn downloadable(path: &Path) -> Context {
        let mut ctx = Context::backup("erp");
        ctx.finalize_archive(path).unwrap();
        ctx
    }

    #[tokio::test]
    async fn test_resolves_download() {
        let dir = tempfile::TempDir::new().unwrap();
        let archive = dir.path().join("erp.zip");
        std::fs::write(&archive, "zip").unwrap();
        let store = Arc::new(InMemoryTaskStore::new());
        let id = finished_run(&store, downloadable(&archive)).await;

        assert_eq!(ArtifactResolver::new(store).resolve(id).await.unwrap(), archive);
    }

    #[tokio::test]
    async fn test_missing_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let archive = dir.path().join("erp.zip");
        let store = Arc::new(InMemoryTaskStore::new());
        let id = finished_run(&store, downloadable(&archive)).await;

        let err = ArtifactResolver::new(store).resolve(id).await.unwrap_err();
        assert!(matches!(err, ArtifactError::FileMissing { .. }));
    }

    #[tokio::test]
    async fn test_unfinished_run() {
        let store = Arc::new(InMemoryTaskStore::new());
        let first = TaskId::new();
        let last = TaskId::new();
        store.insert(TaskRecord::pending(first, "create-workdir", None)).await.unwrap();
        store.insert(TaskRecord::pending(last, "cleanup-workdir", Some(first))).await.unwrap();
        store.update(first, TaskUpdate::Started).await.unwrap();

        let err = ArtifactResolver::new(store).resolve(first).await.unwrap_err();
        assert!(matches!(
            err,
            ArtifactError::NotFinished {
                status: TaskStatus::Pending,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_unknown_task_and_missing_output() {
        let store = Arc::new(InMemoryTaskStore::new());
        let resolver = ArtifactResolver::new(store.clone());
        assert!(matches!(
            resolver.resolve(TaskId::new()).await.unwrap_err(),
            ArtifactError::UnknownTask(_)
        ));

        let id = finished_run(&store, Context::backup("erp")).await;
        assert!(matches!(resolver.resolve(id).await.unwrap_err(), ArtifactError::NoResult(_)));
    }

    #[tokio::test]
    async fn test_rejects_foreign_payload() {
        let store = Arc::new(InMemoryTaskStore::new());
        let id = TaskId::new();
        store.insert(TaskRecord::pending(id, "archive-files", None)).await.unwrap();
        store
            .update(id, TaskUpdate::Success(serde_json::json!({"download": "/etc/passwd"})))
            .await
            .unwrap();

        let err = ArtifactResolver::new(store).resolve(id).await.unwrap_err();
        assert!(matches!(err, ArtifactError::InvalidResult { .. }));
    }

    #[tokio::test]
    async fn test_stream_in_chunks() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("erp.zip");
        std::fs::write(&path, b"0123456789").unwrap();

        let stream = ArtifactStream::open(&path, 4).await.unwrap();
        assert_eq!(stream.len(), 10);
        assert_eq!(stream.file_name(), Some("erp.zip"));

        let chunks: Vec<Vec<u8>> = stream.into_stream().try_collect().await.unwrap();
        assert_eq!(chunks, vec![b"0123".to_vec(), b"4567".to_vec(), b"89".to_vec()]);
    }
}
