use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use walkdir::WalkDir;

use super::{ArtifactSet, validate_path};
use crate::errors::StoreError;
use crate::models::RunId;

/// Durable (run id, relative path) → content mapping.
///
/// Calls are synchronous; async callers go through [`StoreHandle`].
pub trait ArtifactStore: Send + Sync {
    fn put(&self, run_id: &RunId, path: &str, content: &str) -> Result<(), StoreError>;

    /// All paths stored for `run_id`, sorted. An unknown run lists as empty.
    fn list(&self, run_id: &RunId) -> Result<Vec<String>, StoreError>;

    fn get(&self, run_id: &RunId, path: &str) -> Result<String, StoreError>;

    /// Remove every artifact of `run_id`. Deleting an unknown run is a no-op.
    fn delete(&self, run_id: &RunId) -> Result<(), StoreError>;

    fn put_all(&self, run_id: &RunId, set: &ArtifactSet) -> Result<(), StoreError> {
        for (path, content) in set.iter() {
            self.put(run_id, path, content)?;
        }
        Ok(())
    }

    fn load(&self, run_id: &RunId) -> Result<ArtifactSet, StoreError> {
        self.list(run_id)?
            .into_iter()
            .map(|path| {
                let content = self.get(run_id, &path)?;
                Ok((path, content))
            })
            .collect()
    }
}

/// Stores each run under `<root>/<run_id>/`.
#[derive(Debug, Clone)]
pub struct FsArtifactStore {
    root: PathBuf,
}

impl FsArtifactStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn run_dir(&self, run_id: &RunId) -> PathBuf {
        self.root.join(run_id.to_string())
    }

    fn io_err(path: &Path, source: std::io::Error) -> StoreError {
        StoreError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

impl ArtifactStore for FsArtifactStore {
    fn put(&self, run_id: &RunId, path: &str, content: &str) -> Result<(), StoreError> {
        validate_path(path)?;
        let target = self.run_dir(run_id).join(path);
        if let Some(parent) = target.parent() {
            std::fs::create_dir_all(parent).map_err(|e| Self::io_err(parent, e))?;
        }
        std::fs::write(&target, content).map_err(|e| Self::io_err(&target, e))
    }

    fn list(&self, run_id: &RunId) -> Result<Vec<String>, StoreError> {
        let dir = self.run_dir(run_id);
        if !dir.exists() {
            return Ok(Vec::new());
        }
        let mut paths = Vec::new();
        for entry in WalkDir::new(&dir).sort_by_file_name() {
            let entry = entry.map_err(|e| StoreError::Unreachable(e.to_string()))?;
            if !entry.file_type().is_file() {
                continue;
            }
            let rel = entry
                .path()
                .strip_prefix(&dir)
                .map_err(|e| StoreError::Unreachable(e.to_string()))?;
            let rel: Vec<String> = rel
                .components()
                .map(|c| c.as_os_str().to_string_lossy().into_owned())
                .collect();
            paths.push(rel.join("/"));
        }
        paths.sort();
        Ok(paths)
    }

    fn get(&self, run_id: &RunId, path: &str) -> Result<String, StoreError> {
        validate_path(path)?;
        let target = self.run_dir(run_id).join(path);
        std::fs::read_to_string(&target).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => StoreError::NotFound {
                path: path.to_string(),
            },
            _ => Self::io_err(&target, e),
        })
    }

    fn delete(&self, run_id: &RunId) -> Result<(), StoreError> {
        let dir = self.run_dir(run_id);
        if dir.exists() {
            std::fs::remove_dir_all(&dir).map_err(|e| Self::io_err(&dir, e))?;
        }
        Ok(())
    }
}

/// Process-local store, used by tests and dry runs.
#[derive(Debug, Default)]
pub struct MemoryArtifactStore {
    runs: Mutex<HashMap<RunId, BTreeMap<String, String>>>,
}

impl MemoryArtifactStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(
        &self,
    ) -> Result<std::sync::MutexGuard<'_, HashMap<RunId, BTreeMap<String, String>>>, StoreError>
    {
        self.runs
            .lock()
            .map_err(|e| StoreError::Unreachable(format!("store lock poisoned: {}", e)))
    }
}

impl ArtifactStore for MemoryArtifactStore {
    fn put(&self, run_id: &RunId, path: &str, content: &str) -> Result<(), StoreError> {
        validate_path(path)?;
        self.lock()?
            .entry(*run_id)
            .or_default()
            .insert(path.to_string(), content.to_string());
        Ok(())
    }

    fn list(&self, run_id: &RunId) -> Result<Vec<String>, StoreError> {
        Ok(self
            .lock()?
            .get(run_id)
            .map(|files| files.keys().cloned().collect())
            .unwrap_or_default())
    }

    fn get(&self, run_id: &RunId, path: &str) -> Result<String, StoreError> {
        self.lock()?
            .get(run_id)
            .and_then(|files| files.get(path).cloned())
            .ok_or_else(|| StoreError::NotFound {
                path: path.to_string(),
            })
    }

    fn delete(&self, run_id: &RunId) -> Result<(), StoreError> {
        self.lock()?.remove(run_id);
        Ok(())
    }
}

/// Shareable async handle to an [`ArtifactStore`].
///
/// Runs every call on tokio's blocking pool via `spawn_blocking`, so
/// filesystem I/O never ties up async worker threads.
#[derive(Clone)]
pub struct StoreHandle {
    inner: Arc<dyn ArtifactStore>,
}

impl StoreHandle {
    pub fn new(store: Arc<dyn ArtifactStore>) -> Self {
        Self { inner: store }
    }

    /// Run a closure against the store on a blocking thread.
    pub async fn call<F, R>(&self, f: F) -> Result<R, StoreError>
    where
        F: FnOnce(&dyn ArtifactStore) -> Result<R, StoreError> + Send + 'static,
        R: Send + 'static,
    {
        let store = self.inner.clone();
        tokio::task::spawn_blocking(move || f(store.as_ref()))
            .await
            .map_err(|e| StoreError::Unreachable(format!("store task panicked: {}", e)))?
    }

    /// Direct synchronous access, for contexts already off the async runtime.
    pub fn store(&self) -> &dyn ArtifactStore {
        self.inner.as_ref()
    }
}

impl std::fmt::Debug for StoreHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreHandle").finish_non_exhaustive()
    }
}
