//! Scatter-gather calls across backends.
//!
//! One task per backend, bounded by a semaphore. Results come back as they
//! complete; a failing or panicking backend yields an error item for itself
//! and never stops the others.

use crate::backend::Backend;
use crate::error::{BackendError, ErrorKind, Result};
use crate::module::BackendInstance;
use crate::registry::BackendRegistry;
use futures::future::BoxFuture;
use futures::stream::{BoxStream, FuturesUnordered, StreamExt};
use std::sync::Arc;
use tokio::sync::Semaphore;
use trawl_core::{BackendName, CapabilityId, DispatchConfig};
use uuid::Uuid;

/// Result of one backend.
#[derive(Debug)]
pub struct CallItem<T> {
    pub backend: BackendName,
    pub result: Result<T>,
}

/// Every backend result of a call, split by outcome.
#[derive(Debug)]
pub struct CallResults<T> {
    pub values: Vec<(BackendName, T)>,
    pub errors: Vec<(BackendName, BackendError)>,
}

impl<T> Default for CallResults<T> {
    fn default() -> Self {
        Self {
            values: Vec::new(),
            errors: Vec::new(),
        }
    }
}

impl<T> CallResults<T> {
    pub fn is_success(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn error_kinds(&self) -> Vec<ErrorKind> {
        self.errors.iter().map(|(_, e)| e.kind()).collect()
    }
}

impl<T> FromIterator<CallItem<T>> for CallResults<T> {
    fn from_iter<I: IntoIterator<Item = CallItem<T>>>(iter: I) -> Self {
        let mut results = Self::default();
        for item in iter {
            match item.result {
                Ok(value) => results.values.push((item.backend, value)),
                Err(e) => results.errors.push((item.backend, e)),
            }
        }
        results
    }
}

pub struct Dispatcher {
    registry: Arc<BackendRegistry>,
    max_concurrent: usize,
}

impl Dispatcher {
    pub fn new(registry: Arc<BackendRegistry>) -> Self {
        Self {
            registry,
            max_concurrent: DispatchConfig::default().max_concurrent_backends,
        }
    }

    #[must_use]
    pub fn with_config(mut self, config: &DispatchConfig) -> Self {
        self.max_concurrent = config.max_concurrent_backends.max(1);
        self
    }

    pub fn registry(&self) -> &Arc<BackendRegistry> {
        &self.registry
    }

    /// Run `op` on every matching backend, yielding results in completion
    /// order.
    ///
    /// # Errors
    /// Fails before dispatching only if `selection` names an unknown backend.
    pub fn call_stream<T, F>(
        &self,
        capability: CapabilityId,
        selection: Option<&[BackendName]>,
        op: F,
    ) -> Result<BoxStream<'static, CallItem<T>>>
    where
        F: for<'a> Fn(&'a mut dyn BackendInstance) -> BoxFuture<'a, Result<T>>
            + Send
            + Sync
            + 'static,
        T: Send + 'static,
    {
        let backends = self.registry.backends_for(capability, selection)?;
        Ok(self.spawn_all(capability, backends, op))
    }

    /// Like [`Dispatcher::call_stream`], collected.
    pub async fn call<T, F>(
        &self,
        capability: CapabilityId,
        selection: Option<&[BackendName]>,
        op: F,
    ) -> Result<CallResults<T>>
    where
        F: for<'a> Fn(&'a mut dyn BackendInstance) -> BoxFuture<'a, Result<T>>
            + Send
            + Sync
            + 'static,
        T: Send + 'static,
    {
        let stream = self.call_stream(capability, selection, op)?;
        Ok(stream.collect::<Vec<_>>().await.into_iter().collect())
    }

    fn spawn_all<T, F>(
        &self,
        capability: CapabilityId,
        backends: Vec<Arc<Backend>>,
        op: F,
    ) -> BoxStream<'static, CallItem<T>>
    where
        F: for<'a> Fn(&'a mut dyn BackendInstance) -> BoxFuture<'a, Result<T>>
            + Send
            + Sync
            + 'static,
        T: Send + 'static,
    {
        let call = Uuid::new_v4();
        tracing::debug!(%call, capability = %capability, backends = backends.len(), "dispatching call");

        let op = Arc::new(op);
        let semaphore = Arc::new(Semaphore::new(self.max_concurrent));

        let tasks: FuturesUnordered<_> = backends
            .into_iter()
            .map(|backend| {
                let name = backend.name().clone();
                let op = op.clone();
                let semaphore = semaphore.clone();

                let handle = tokio::spawn(async move {
                    let _permit = semaphore
                        .acquire_owned()
                        .await
                        .map_err(|e| BackendError::Bug(e.to_string()))?;
                    backend.run(|instance| (*op)(instance)).await
                });

                async move {
                    let result = match handle.await {
                        Ok(result) => result,
                        Err(e) if e.is_panic() => {
                            tracing::error!(%call, backend = %name, "backend panicked");
                            Err(BackendError::Bug(format!("backend panicked: {e}")))
                        }
                        Err(e) => Err(BackendError::Bug(e.to_string())),
                    };
                    if let Err(e) = &result {
                        tracing::debug!(%call, backend = %name, kind = ?e.kind(), error = %e, "backend call failed");
                    }
                    CallItem {
                        backend: name,
                        result,
                    }
                }
            })
            .collect();

        tasks.boxed()
    }
}
