//! Backends file loading and saving.
//!
//! The backends file declares configured backends:
//!
//! ```toml
//! [backends.mybank]
//! module = "fakebank"
//! enabled = true
//!
//! [backends.mybank.config]
//! login = "12345678"
//! password = "hunter2"
//! ```

use crate::error::{BackendError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use trawl_core::BackendName;

/// One configured backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackendEntry {
    pub module: String,
    #[serde(default = "enabled_default")]
    pub enabled: bool,
    #[serde(default)]
    pub config: BTreeMap<String, String>,
}

fn enabled_default() -> bool {
    true
}

impl BackendEntry {
    pub fn new(module: impl Into<String>, config: BTreeMap<String, String>) -> Self {
        Self {
            module: module.into(),
            enabled: true,
            config,
        }
    }
}

/// Contents of the backends file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackendsFile {
    #[serde(default)]
    backends: BTreeMap<BackendName, BackendEntry>,
}

impl BackendsFile {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load from `path`; a missing file is an empty one.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            debug!(path = %path.display(), "backends file not found, starting empty");
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path).map_err(|e| file_error(path, e))?;
        let file: Self = toml::from_str(&contents).map_err(|e| file_error(path, e))?;

        info!(count = file.backends.len(), path = %path.display(), "loaded backends file");
        Ok(file)
    }

    /// Write to `path`, creating the parent directory.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir).map_err(|e| file_error(path, e))?;
        }
        let contents = toml::to_string_pretty(self).map_err(|e| file_error(path, e))?;

        let tmp: PathBuf = path.with_extension("toml.tmp");
        fs::write(&tmp, contents).map_err(|e| file_error(path, e))?;
        fs::rename(&tmp, path).map_err(|e| file_error(path, e))?;

        debug!(path = %path.display(), "saved backends file");
        Ok(())
    }

    pub fn get(&self, name: &BackendName) -> Option<&BackendEntry> {
        self.backends.get(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&BackendName, &BackendEntry)> {
        self.backends.iter()
    }

    pub fn len(&self) -> usize {
        self.backends.len()
    }

    pub fn is_empty(&self) -> bool {
        self.backends.is_empty()
    }

    /// Add a new entry.
    ///
    /// # Errors
    /// [`BackendError::BackendExists`] if the name is taken.
    pub fn add(&mut self, name: BackendName, entry: BackendEntry) -> Result<()> {
        if self.backends.contains_key(&name) {
            return Err(BackendError::BackendExists {
                backend: name.to_string(),
            });
        }
        self.backends.insert(name, entry);
        Ok(())
    }

    /// Remove an entry. Returns whether it existed.
    pub fn remove(&mut self, name: &BackendName) -> bool {
        self.backends.remove(name).is_some()
    }

    /// # Errors
    /// [`BackendError::BackendNotFound`] for an unknown name.
    pub fn set_enabled(&mut self, name: &BackendName, enabled: bool) -> Result<()> {
        let entry = self
            .backends
            .get_mut(name)
            .ok_or_else(|| BackendError::BackendNotFound {
                backend: name.to_string(),
            })?;
        entry.enabled = enabled;
        Ok(())
    }
}

fn file_error(path: &Path, err: impl std::fmt::Display) -> BackendError {
    BackendError::BackendsFile {
        path: path.display().to_string(),
        reason: err.to_string(),
    }
}
