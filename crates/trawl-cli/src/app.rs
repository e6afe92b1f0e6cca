//! Command runner state: configured backends, dispatch and interaction handling.

use crate::exit::ExitStatus;
use crate::output::Output;
use crate::prompt::Prompter;
use futures::future::BoxFuture;
use futures::StreamExt;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info};
use trawl_auth::{InteractionInput, InteractionRequest};
use trawl_backend::{
    BackendEnv, BackendError, BackendInstance, BackendRegistry, BackendsFile, Dispatcher,
    StateStorage,
};
use trawl_core::{AppConfig, BackendName, CapabilityId};

/// A capability call, re-runnable with the answers to a transfer step.
pub type Operation<T> = Arc<
    dyn for<'a> Fn(&'a mut dyn BackendInstance, InteractionInput) -> BoxFuture<'a, trawl_backend::Result<T>>
        + Send
        + Sync,
>;

pub fn operation<T, F>(op: F) -> Operation<T>
where
    F: for<'a> Fn(&'a mut dyn BackendInstance, InteractionInput) -> BoxFuture<'a, trawl_backend::Result<T>>
        + Send
        + Sync
        + 'static,
{
    Arc::new(op)
}

pub struct App {
    pub(crate) backends_path: PathBuf,
    pub(crate) backends: BackendsFile,
    /// Entries of the backends file the registry refused
    pub(crate) invalid: BTreeMap<BackendName, BackendError>,
    pub(crate) registry: Arc<BackendRegistry>,
    pub(crate) storage: Arc<dyn StateStorage>,
    pub(crate) output: Output,
    pub(crate) prompter: Box<dyn Prompter>,
    pub(crate) interactive: bool,
    dispatcher: Dispatcher,
    selection: Option<Vec<BackendName>>,
    status: ExitStatus,
}

impl App {
    /// Load the backends file and register every module and backend.
    pub fn new(
        config: &AppConfig,
        backends_path: PathBuf,
        env: BackendEnv,
        output: Output,
        prompter: Box<dyn Prompter>,
    ) -> trawl_backend::Result<Self> {
        let backends = BackendsFile::load(&backends_path)?;
        let storage = env.storage.clone();

        let registry = Arc::new(BackendRegistry::new(env));
        trawl_modules::register_all(&registry);
        let invalid = registry.load_from(&backends).into_iter().collect();
        let dispatcher = Dispatcher::new(registry.clone()).with_config(&config.dispatch);

        Ok(Self {
            backends_path,
            backends,
            invalid,
            registry,
            storage,
            output,
            prompter,
            interactive: config.general.interactive,
            dispatcher,
            selection: None,
            status: ExitStatus::Success,
        })
    }

    /// Restrict calls to `backends`; empty means all of them.
    #[must_use]
    pub fn select(mut self, backends: Vec<BackendName>) -> Self {
        self.selection = (!backends.is_empty()).then_some(backends);
        self
    }

    #[must_use]
    pub fn interactive(mut self, interactive: bool) -> Self {
        self.interactive = interactive;
        self
    }

    pub fn status(&self) -> ExitStatus {
        self.status
    }

    /// Print `err` and fold it into the exit status.
    pub fn report(&mut self, backend: Option<&BackendName>, err: &BackendError) {
        self.status = self.status.worst(ExitStatus::from(err.kind()));
        if let Err(e) = self.output.error(backend, err) {
            tracing::warn!(error = %e, "failed to print error");
        }
    }

    /// Abort on a command line problem.
    pub fn usage(&mut self, message: &str) {
        self.status = self.status.worst(ExitStatus::Usage);
        if let Err(e) = self.output.note(&format!("Error: {message}")) {
            tracing::warn!(error = %e, "failed to print error");
        }
    }

    /// Run `op` on every selected backend having `capability`.
    ///
    /// `only` narrows the selection to the backend named by a qualified id.
    /// Failures are reported per backend; interactions are resolved with the
    /// user before giving up on a backend.
    pub async fn gather<T>(
        &mut self,
        capability: CapabilityId,
        only: Option<BackendName>,
        op: Operation<T>,
    ) -> Vec<(BackendName, T)>
    where
        T: Send + 'static,
    {
        let selection = match only {
            Some(backend) => Some(vec![backend]),
            None => self.selection.clone(),
        };

        match self.registry.backends_for(capability, selection.as_deref()) {
            Ok(backends) if backends.is_empty() => {
                self.report(None, &BackendError::not_supported(capability));
                return Vec::new();
            }
            Ok(_) => {}
            Err(e) => {
                self.report(None, &e);
                return Vec::new();
            }
        }

        let scatter = op.clone();
        let stream = self.dispatcher.call_stream(capability, selection.as_deref(), move |instance| {
            (*scatter)(instance, InteractionInput::new())
        });
        let mut stream = match stream {
            Ok(stream) => stream,
            Err(e) => {
                self.report(None, &e);
                return Vec::new();
            }
        };

        let mut values = Vec::new();
        while let Some(item) = stream.next().await {
            let result = match item.result {
                Err(e) if e.interaction().is_some() => self.resume(&item.backend, e, &op).await,
                other => other,
            };
            match result {
                Ok(value) => values.push((item.backend, value)),
                Err(e) => self.report(Some(&item.backend), &e),
            }
        }
        values
    }

    /// Answer the interactions of one backend until `op` completes there.
    async fn resume<T>(
        &mut self,
        name: &BackendName,
        mut err: BackendError,
        op: &Operation<T>,
    ) -> trawl_backend::Result<T>
    where
        T: Send + 'static,
    {
        let backend = self.registry.get(name)?;

        loop {
            let Some(request) = err.interaction().cloned() else {
                return Err(err);
            };
            if !self.interactive {
                return Err(err);
            }
            debug!(backend = %name, medium = %request.medium(), "resolving interaction");

            let input = if request.is_decoupled() {
                self.prompter
                    .notice(&format!("{name}: {request}"))
                    .map_err(|e| BackendError::Bug(format!("cannot show message: {e}")))?;
                InteractionInput::new()
            } else {
                let message = format!("{name}: {request}");
                self.prompter
                    .ask(&message, request.fields())
                    .map_err(|e| BackendError::Bug(format!("cannot read answer: {e}")))?
            };

            // transfer steps take the answers as an argument, logins through the session
            let input = match request {
                InteractionRequest::TransferStep { .. } | InteractionRequest::AddRecipientStep { .. } => input,
                _ => {
                    if !input.is_empty() {
                        backend.provide_input(input).await?;
                    }
                    InteractionInput::new()
                }
            };

            let op = op.clone();
            match backend.run(move |instance| (*op)(instance, input)).await {
                Ok(value) => {
                    info!(backend = %name, "interaction resolved");
                    return Ok(value);
                }
                Err(e) => err = e,
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::output::Captured;
    use crate::prompt::LinePrompter;
    use futures::FutureExt;
    use serde_json::json;
    use std::io::Cursor;
    use tempfile::TempDir;
    use trawl_backend::{bank, BackendEntry, MemoryStorage};
    use trawl_browser::mock::{MockResponse, MockTransport};
    use trawl_browser::Method;
    use trawl_core::{AuthConfig, BrowserConfig, OutputFormat};

    pub(crate) struct Harness {
        pub app: App,
        pub out: Captured,
        pub err: Captured,
        pub mock: Arc<MockTransport>,
        pub dir: TempDir,
    }

    pub(crate) fn fakebank_entry(base: &str) -> BackendEntry {
        BackendEntry::new(
            "fakebank",
            BTreeMap::from([
                ("login".to_string(), "12345678".to_string()),
                ("password".to_string(), "hunter2".to_string()),
                ("base_url".to_string(), base.to_string()),
            ]),
        )
    }

    /// App over a mocked network with the given backends and typed answers.
    pub(crate) fn harness(backends: &[(&str, BackendEntry)], answers: &str, format: OutputFormat) -> Harness {
        let dir = TempDir::new().expect("temp dir");
        let path = dir.path().join("backends.toml");
        let mut file = BackendsFile::new();
        for (name, entry) in backends {
            file.add(BackendName::new(*name).expect("valid name"), entry.clone())
                .expect("add");
        }
        file.save(&path).expect("save backends");

        let mock = MockTransport::shared();
        let env = BackendEnv {
            browser: BrowserConfig {
                max_retries: 0,
                ..BrowserConfig::default()
            },
            auth: AuthConfig::default(),
            transport: mock.clone(),
            storage: Arc::new(MemoryStorage::new()),
        };
        let (out, err) = (Captured::default(), Captured::default());
        let output = Output::new(format, None, Box::new(out.clone()), Box::new(err.clone()));
        let prompter = LinePrompter::new(Cursor::new(answers.to_string()), Vec::new());

        let app = App::new(&AppConfig::default(), path, env, output, Box::new(prompter)).expect("app");
        Harness {
            app,
            out,
            err,
            mock,
            dir,
        }
    }

    pub(crate) fn accounts(mock: &MockTransport, base: &str) {
        mock.on_get(
            &format!("{base}/api/accounts"),
            MockResponse::json(&json!({
                "accounts": [{"id": "1", "label": "Compte courant", "type": "checking", "balance": "12.00"}]
            })),
        );
    }

    fn list_op() -> Operation<Vec<trawl_backend::Account>> {
        operation(|instance, _input| async move { bank(instance)?.iter_accounts().await }.boxed())
    }

    const A: &str = "https://a.example";
    const B: &str = "https://b.example";

    #[tokio::test]
    async fn test_failures_are_isolated_per_backend() {
        let mut h = harness(
            &[("a", fakebank_entry(A)), ("b", fakebank_entry(B))],
            "",
            OutputFormat::Plain,
        );
        h.mock
            .on_post(&format!("{A}/api/login"), MockResponse::json(&json!({"status": "ok"})));
        accounts(&h.mock, A);
        h.mock.fail(Method::Post, &format!("{B}/api/login"), "connection refused");

        let values = h.app.gather(CapabilityId::Bank, None, list_op()).await;
        assert_eq!(values.len(), 1);
        assert_eq!(values[0].0.as_str(), "a");
        assert_eq!(h.app.status(), ExitStatus::Unavailable);
        assert!(h.err.text().starts_with("Error(b): "));
    }

    #[tokio::test]
    async fn test_otp_is_prompted_and_resumed_on_the_same_backend() {
        let mut h = harness(&[("fb", fakebank_entry(A))], "123456\n", OutputFormat::Plain);
        h.mock.on_post(
            &format!("{A}/api/login"),
            MockResponse::json(&json!({"status": "otp", "transaction": "tx-1"})),
        );
        h.mock
            .on_post(&format!("{A}/api/otp"), MockResponse::json(&json!({"status": "ok"})));
        accounts(&h.mock, A);

        let values = h.app.gather(CapabilityId::Bank, None, list_op()).await;
        assert_eq!(values.len(), 1);
        assert_eq!(h.app.status(), ExitStatus::Success);
        assert_eq!(h.mock.request_count(Method::Post, &format!("{A}/api/login")), 1);
        assert_eq!(h.mock.request_count(Method::Post, &format!("{A}/api/otp")), 1);
    }

    #[tokio::test]
    async fn test_non_interactive_reports_the_request() {
        let mut h = harness(&[("fb", fakebank_entry(A))], "", OutputFormat::Plain);
        h.app = h.app.interactive(false);
        h.mock.on_post(
            &format!("{A}/api/login"),
            MockResponse::json(&json!({"status": "otp", "transaction": "tx-1"})),
        );

        let values = h.app.gather(CapabilityId::Bank, None, list_op()).await;
        assert!(values.is_empty());
        assert_eq!(h.app.status(), ExitStatus::InteractionNeeded);
        let err = h.err.text();
        assert!(err.starts_with("Error(fb): interaction required"), "{err}");
        assert!(err.contains("[fields: otp]"));
    }

    #[tokio::test]
    async fn test_unknown_selection_and_missing_capability() {
        let mut h = harness(&[("fb", fakebank_entry(A))], "", OutputFormat::Plain);
        let ghost = BackendName::new("ghost").expect("valid name");
        let values = h.app.gather(CapabilityId::Bank, Some(ghost), list_op()).await;
        assert!(values.is_empty());
        assert_eq!(h.app.status(), ExitStatus::NotFound);

        let mut h = harness(&[], "", OutputFormat::Plain);
        h.app.gather(CapabilityId::Bank, None, list_op()).await;
        assert_eq!(h.app.status(), ExitStatus::Bug);
        assert!(h.err.text().starts_with("Error: bank is not supported"));
    }

    #[tokio::test]
    async fn test_invalid_entries_are_kept_aside() {
        let mut bad = fakebank_entry(A);
        bad.config.insert("login".to_string(), "jane".to_string());
        let h = harness(&[("good", fakebank_entry(A)), ("bad", bad)], "", OutputFormat::Plain);
        assert_eq!(h.app.registry.backends().len(), 1);
        assert!(h.app.invalid.contains_key(&BackendName::new("bad").expect("valid name")));
    }
}
