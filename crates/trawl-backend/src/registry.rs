//! Module catalog and configured backends.

use crate::backend::{Backend, BackendEnv};
use crate::error::{BackendError, Result};
use crate::loader::BackendsFile;
use crate::module::Module;
use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};
use tracing::{debug, info, warn};
use trawl_core::{BackendName, CapabilityId};

/// Known modules and the backends built from them.
pub struct BackendRegistry {
    env: BackendEnv,
    modules: RwLock<BTreeMap<String, Arc<dyn Module>>>,
    backends: RwLock<BTreeMap<BackendName, Arc<Backend>>>,
}

impl BackendRegistry {
    pub fn new(env: BackendEnv) -> Self {
        Self {
            env,
            modules: RwLock::new(BTreeMap::new()),
            backends: RwLock::new(BTreeMap::new()),
        }
    }

    pub fn register_module(&self, module: Arc<dyn Module>) {
        let mut modules = self.modules.write().expect("acquire write lock on modules");
        debug!(module = module.name(), "registered module");
        modules.insert(module.name().to_string(), module);
    }

    pub fn module(&self, name: &str) -> Result<Arc<dyn Module>> {
        let modules = self.modules.read().expect("acquire read lock on modules");
        modules
            .get(name)
            .cloned()
            .ok_or_else(|| BackendError::ModuleNotFound {
                module: name.to_string(),
            })
    }

    /// Registered modules, sorted by name.
    pub fn modules(&self) -> Vec<Arc<dyn Module>> {
        let modules = self.modules.read().expect("acquire read lock on modules");
        modules.values().cloned().collect()
    }

    /// Configure a backend of `module` named `name`.
    ///
    /// # Errors
    /// - [`BackendError::BackendExists`] if the name is taken
    /// - [`BackendError::ModuleNotFound`] for an unknown module
    /// - [`BackendError::Configuration`] if `raw_config` does not fit the
    ///   module schema
    pub fn register_backend(
        &self,
        name: BackendName,
        module: &str,
        raw_config: &BTreeMap<String, String>,
    ) -> Result<Arc<Backend>> {
        let module = self.module(module)?;
        let config = module.schema().validate(name.as_str(), raw_config)?;

        let mut backends = self.backends.write().expect("acquire write lock on backends");
        if backends.contains_key(&name) {
            return Err(BackendError::BackendExists {
                backend: name.to_string(),
            });
        }

        let backend = Arc::new(Backend::new(name.clone(), module, config, self.env.clone()));
        backends.insert(name.clone(), backend.clone());

        info!(backend = %name, module = backend.module().name(), "registered backend");
        Ok(backend)
    }

    /// Remove a backend. Returns whether it existed.
    pub fn remove(&self, name: &BackendName) -> bool {
        let mut backends = self.backends.write().expect("acquire write lock on backends");
        let removed = backends.remove(name).is_some();
        if removed {
            debug!(backend = %name, "removed backend");
        }
        removed
    }

    pub fn enable(&self, name: &BackendName) -> Result<()> {
        self.get(name)?.set_enabled(true);
        Ok(())
    }

    pub fn disable(&self, name: &BackendName) -> Result<()> {
        self.get(name)?.set_enabled(false);
        Ok(())
    }

    pub fn get(&self, name: &BackendName) -> Result<Arc<Backend>> {
        let backends = self.backends.read().expect("acquire read lock on backends");
        backends
            .get(name)
            .cloned()
            .ok_or_else(|| BackendError::BackendNotFound {
                backend: name.to_string(),
            })
    }

    /// Every configured backend, sorted by name.
    pub fn backends(&self) -> Vec<Arc<Backend>> {
        let backends = self.backends.read().expect("acquire read lock on backends");
        backends.values().cloned().collect()
    }

    /// Enabled backends declaring `capability`, optionally restricted to
    /// `selection`.
    ///
    /// # Errors
    /// [`BackendError::BackendNotFound`] if `selection` names an unknown
    /// backend.
    pub fn backends_for(
        &self,
        capability: CapabilityId,
        selection: Option<&[BackendName]>,
    ) -> Result<Vec<Arc<Backend>>> {
        let candidates = match selection {
            Some(names) => names
                .iter()
                .map(|name| self.get(name))
                .collect::<Result<Vec<_>>>()?,
            None => self.backends(),
        };

        Ok(candidates
            .into_iter()
            .filter(|backend| {
                let usable = backend.is_enabled() && backend.has_capability(capability);
                if !usable {
                    debug!(backend = %backend.name(), capability = %capability, "skipping backend");
                }
                usable
            })
            .collect())
    }

    /// Register every entry of a backends file.
    ///
    /// Invalid entries are logged and skipped; their errors are returned so
    /// the caller can report them.
    pub fn load_from(&self, file: &BackendsFile) -> Vec<(BackendName, BackendError)> {
        let mut failures = Vec::new();

        for (name, entry) in file.iter() {
            match self.register_backend(name.clone(), &entry.module, &entry.config) {
                Ok(backend) => backend.set_enabled(entry.enabled),
                Err(e) => {
                    warn!(backend = %name, error = %e, "skipping backend");
                    failures.push((name.clone(), e));
                }
            }
        }

        info!(count = self.backends().len(), "loaded backends");
        failures
    }
}
