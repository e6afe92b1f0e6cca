//! Configured backend and its lazily created session.

use crate::error::Result;
use crate::module::{BackendInstance, InstanceContext, Module};
use crate::schema::BackendConfig;
use crate::storage::StateStorage;
use futures::future::BoxFuture;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use trawl_auth::InteractionInput;
use trawl_browser::HttpTransport;
use trawl_core::{AuthConfig, BackendName, BrowserConfig, CapabilityId};

/// Settings and services shared by every backend of a registry.
#[derive(Clone)]
pub struct BackendEnv {
    pub browser: BrowserConfig,
    pub auth: AuthConfig,
    pub transport: Arc<dyn HttpTransport>,
    pub storage: Arc<dyn StateStorage>,
}

/// A module bound to a validated configuration.
pub struct Backend {
    name: BackendName,
    module: Arc<dyn Module>,
    config: Arc<BackendConfig>,
    enabled: AtomicBool,
    env: BackendEnv,
    instance: Mutex<Option<Box<dyn BackendInstance>>>,
}

impl Backend {
    pub(crate) fn new(
        name: BackendName,
        module: Arc<dyn Module>,
        config: BackendConfig,
        env: BackendEnv,
    ) -> Self {
        Self {
            name,
            module,
            config: Arc::new(config),
            enabled: AtomicBool::new(true),
            env,
            instance: Mutex::new(None),
        }
    }

    pub fn name(&self) -> &BackendName {
        &self.name
    }

    pub fn module(&self) -> &dyn Module {
        self.module.as_ref()
    }

    pub fn config(&self) -> &BackendConfig {
        &self.config
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Relaxed)
    }

    pub(crate) fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Relaxed);
    }

    pub fn has_capability(&self, capability: CapabilityId) -> bool {
        self.module.capabilities().has(capability)
    }

    /// Run `op` on the session, creating it first if needed.
    ///
    /// The session lock is held for the whole operation, so calls on one
    /// backend never interleave. The state is saved afterwards, including
    /// when the operation failed or suspended for input.
    pub async fn run<T, F>(&self, op: F) -> Result<T>
    where
        F: for<'a> FnOnce(&'a mut dyn BackendInstance) -> BoxFuture<'a, Result<T>> + Send,
        T: Send,
    {
        let mut guard = self.instance.lock().await;
        let instance = match guard.take() {
            Some(instance) => instance,
            None => self.create_instance().await?,
        };
        let instance = guard.insert(instance);

        let result = op(&mut **instance).await;
        let saved = self.env.storage.save(&self.name, &instance.dump_state()).await;

        match (result, saved) {
            (Ok(value), Ok(())) => Ok(value),
            (Ok(_), Err(e)) => Err(e),
            (Err(e), saved) => {
                if let Err(save_err) = saved {
                    tracing::warn!(backend = %self.name, error = %save_err, "failed to save backend state");
                }
                Err(e)
            }
        }
    }

    /// Hand answers to the session; the next [`Backend::run`] consumes them.
    pub async fn provide_input(&self, input: InteractionInput) -> Result<()> {
        let mut guard = self.instance.lock().await;
        let instance = match guard.take() {
            Some(instance) => instance,
            None => self.create_instance().await?,
        };
        guard.insert(instance).provide_input(input);
        Ok(())
    }

    /// Drop the session and its saved state.
    pub async fn reset(&self) -> Result<()> {
        self.instance.lock().await.take();
        self.env.storage.remove(&self.name).await
    }

    async fn create_instance(&self) -> Result<Box<dyn BackendInstance>> {
        let context = InstanceContext {
            backend: self.name.clone(),
            config: self.config.clone(),
            browser: self.env.browser.clone(),
            auth: self.env.auth.clone(),
            transport: self.env.transport.clone(),
        };
        let mut instance = self.module.create_instance(context)?;

        if let Some(state) = self.env.storage.load(&self.name).await? {
            match instance.load_state(&state).await {
                Ok(()) => tracing::debug!(backend = %self.name, "restored backend state"),
                Err(e) if e.is_unavailable() => return Err(e),
                Err(e) => {
                    tracing::warn!(backend = %self.name, error = %e, "discarding backend state");
                }
            }
        }

        tracing::debug!(backend = %self.name, module = self.module.name(), "created backend instance");
        Ok(instance)
    }
}

impl std::fmt::Debug for Backend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Backend")
            .field("name", &self.name)
            .field("module", &self.module.name())
            .field("enabled", &self.is_enabled())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::module::bank;
    use crate::storage::MemoryStorage;
    use crate::testing::ConstModule;
    use futures::FutureExt;
    use serde_json::json;
    use std::collections::BTreeMap;
    use trawl_browser::mock::{MockResponse, MockTransport};
    use trawl_browser::Method;

    const URL: &str = "https://jane.example/accounts";

    fn backend(mock: Arc<MockTransport>, storage: Arc<MemoryStorage>) -> Backend {
        let module = ConstModule::bank("bankmod");
        let config = module
            .schema()
            .validate("jane", &BTreeMap::from([("login".to_string(), "jane".to_string())]))
            .expect("valid config");
        Backend::new(
            BackendName::new("jane").expect("valid name"),
            Arc::new(module),
            config,
            BackendEnv {
                browser: BrowserConfig::default(),
                auth: AuthConfig::default(),
                transport: mock,
                storage,
            },
        )
    }

    async fn accounts(backend: &Backend) -> Result<usize> {
        backend
            .run(|instance| async move { Ok(bank(instance)?.iter_accounts().await?.len()) }.boxed())
            .await
    }

    #[tokio::test]
    async fn test_state_is_saved_after_each_run() {
        let mock = MockTransport::shared();
        mock.on_get(URL, MockResponse::text("ok"));
        let storage = Arc::new(MemoryStorage::new());
        let name = BackendName::new("jane").expect("valid name");

        let first = backend(mock.clone(), storage.clone());
        assert_eq!(accounts(&first).await.expect("accounts"), 1);
        assert_eq!(accounts(&first).await.expect("accounts"), 1);
        let saved = storage.load(&name).await.expect("load").expect("saved state");
        assert_eq!(saved["calls"], json!(2));

        // A new session picks up where the previous one stopped
        let second = backend(mock.clone(), storage.clone());
        accounts(&second).await.expect("accounts");
        let saved = storage.load(&name).await.expect("load").expect("saved state");
        assert_eq!(saved["calls"], json!(3));
    }

    #[tokio::test]
    async fn test_state_is_saved_when_the_operation_fails() {
        let mock = MockTransport::shared();
        mock.fail(Method::Get, URL, "reset");
        let storage = Arc::new(MemoryStorage::new());

        let backend = backend(mock, storage.clone());
        let err = accounts(&backend).await.expect_err("unavailable");
        assert!(err.is_unavailable());
        assert!(storage
            .load(&BackendName::new("jane").expect("valid name"))
            .await
            .expect("load")
            .is_some());
    }

    #[tokio::test]
    async fn test_reset_drops_session_and_state() {
        let mock = MockTransport::shared();
        mock.on_get(URL, MockResponse::text("ok"));
        let storage = Arc::new(MemoryStorage::new());
        let name = BackendName::new("jane").expect("valid name");

        let backend = backend(mock, storage.clone());
        accounts(&backend).await.expect("accounts");
        backend.reset().await.expect("reset");
        assert!(storage.load(&name).await.expect("load").is_none());

        accounts(&backend).await.expect("accounts");
        let saved = storage.load(&name).await.expect("load").expect("saved state");
        assert_eq!(saved["calls"], json!(1));
    }
}
