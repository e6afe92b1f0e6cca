//! Persisted backend state.
//!
//! Each backend keeps one flat JSON map (browser state plus pending login
//! flow) between runs.

use crate::error::{BackendError, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tokio::fs;
use trawl_browser::StateMap;
use trawl_core::BackendName;
use uuid::Uuid;

/// Where backend states live.
#[async_trait]
pub trait StateStorage: Send + Sync {
    /// Saved state of `backend`, if any.
    async fn load(&self, backend: &BackendName) -> Result<Option<StateMap>>;

    async fn save(&self, backend: &BackendName, state: &StateMap) -> Result<()>;

    async fn remove(&self, backend: &BackendName) -> Result<()>;
}

/// One `<backend>.json` file per backend under a directory.
#[derive(Debug, Clone)]
pub struct FileStorage {
    dir: PathBuf,
}

impl FileStorage {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path(&self, backend: &BackendName) -> PathBuf {
        self.dir.join(format!("{backend}.json"))
    }
}

fn storage_error(backend: &BackendName, err: impl std::fmt::Display) -> BackendError {
    BackendError::Storage {
        backend: backend.to_string(),
        reason: err.to_string(),
    }
}

#[async_trait]
impl StateStorage for FileStorage {
    async fn load(&self, backend: &BackendName) -> Result<Option<StateMap>> {
        let path = self.path(backend);
        let contents = match fs::read_to_string(&path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(storage_error(backend, e)),
        };

        match serde_json::from_str(&contents) {
            Ok(state) => {
                tracing::debug!(backend = %backend, path = %path.display(), "loaded backend state");
                Ok(Some(state))
            }
            Err(e) => {
                // A corrupt state only costs a fresh login
                tracing::warn!(backend = %backend, error = %e, "ignoring unreadable backend state");
                Ok(None)
            }
        }
    }

    async fn save(&self, backend: &BackendName, state: &StateMap) -> Result<()> {
        fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| storage_error(backend, e))?;

        let path = self.path(backend);
        // one temporary file per save, so concurrent saves never share it
        let tmp = self.dir.join(format!("{backend}.json.{}.tmp", Uuid::new_v4().simple()));
        let contents = serde_json::to_string_pretty(state).map_err(|e| storage_error(backend, e))?;

        fs::write(&tmp, contents).await.map_err(|e| storage_error(backend, e))?;
        if let Err(e) = fs::rename(&tmp, &path).await {
            fs::remove_file(&tmp).await.ok();
            return Err(storage_error(backend, e));
        }

        tracing::debug!(backend = %backend, path = %path.display(), "saved backend state");
        Ok(())
    }

    async fn remove(&self, backend: &BackendName) -> Result<()> {
        match fs::remove_file(self.path(backend)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(storage_error(backend, e)),
        }
    }
}

/// Process-local storage, for tests and one-shot runs.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    states: Mutex<HashMap<BackendName, StateMap>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StateStorage for MemoryStorage {
    async fn load(&self, backend: &BackendName) -> Result<Option<StateMap>> {
        let states = self.states.lock().expect("acquire lock on states");
        Ok(states.get(backend).cloned())
    }

    async fn save(&self, backend: &BackendName, state: &StateMap) -> Result<()> {
        let mut states = self.states.lock().expect("acquire lock on states");
        states.insert(backend.clone(), state.clone());
        Ok(())
    }

    async fn remove(&self, backend: &BackendName) -> Result<()> {
        let mut states = self.states.lock().expect("acquire lock on states");
        states.remove(backend);
        Ok(())
    }
}
