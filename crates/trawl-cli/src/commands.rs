//! Command implementations.

use crate::app::{operation, App};
use crate::cli::{BackendsCommand, Command};
use crate::output::Render;
use anyhow::{Context, Result};
use futures::FutureExt;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::PathBuf;
use trawl_auth::Field;
use trawl_backend::{
    bank, bank_transfer, documents, profile, BackendEntry, BackendError, FieldKind, Recipient,
    Transfer,
};
use trawl_core::{BackendName, CapabilityId, QualifiedId};

/// Row of `backends list`.
#[derive(Debug, Serialize)]
struct BackendRow {
    name: String,
    module: String,
    enabled: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl Render for BackendRow {
    fn plain(&self, _backend: Option<&BackendName>) -> String {
        let state = match (&self.error, self.enabled) {
            (Some(error), _) => format!("invalid: {error}"),
            (None, true) => "enabled".to_string(),
            (None, false) => "disabled".to_string(),
        };
        format!("{:<16} {:<16} {state}", self.name, self.module)
    }
}

/// Row of `backends modules`.
#[derive(Debug, Serialize)]
struct ModuleRow {
    name: String,
    description: String,
    capabilities: Vec<String>,
}

impl Render for ModuleRow {
    fn plain(&self, _backend: Option<&BackendName>) -> String {
        format!("{:<16} {} [{}]", self.name, self.description, self.capabilities.join(", "))
    }
}

/// Result of `download`.
#[derive(Debug, Serialize)]
struct Saved {
    id: String,
    path: String,
    size: usize,
}

impl Render for Saved {
    fn plain(&self, backend: Option<&BackendName>) -> String {
        let id = match backend {
            Some(backend) => QualifiedId::new(self.id.clone(), backend.clone()).to_string(),
            None => self.id.clone(),
        };
        format!("{id} saved to {} ({} bytes)", self.path, self.size)
    }
}

/// File name for a downloaded document.
fn download_path(id: &str, format: &str) -> PathBuf {
    let safe: String = id
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect();
    PathBuf::from(format!("{safe}.{format}"))
}

impl App {
    pub async fn run(&mut self, command: Command) -> Result<()> {
        match command {
            Command::Backends(command) => self.backends_command(command).await,
            Command::List => {
                let op = operation(|instance, _input| {
                    async move { bank(instance)?.iter_accounts().await }.boxed()
                });
                for (backend, accounts) in self.gather(CapabilityId::Bank, None, op).await {
                    self.output.items(&backend, &accounts)?;
                }
                Ok(())
            }
            Command::History { account } => self.transactions(account, false).await,
            Command::Coming { account } => self.transactions(account, true).await,
            Command::Recipients { account } => {
                let id = account.id;
                let op = operation(move |instance, _input| {
                    let id = id.clone();
                    async move { bank_transfer(instance)?.iter_transfer_recipients(&id).await }.boxed()
                });
                for (backend, recipients) in self.gather(CapabilityId::BankTransfer, account.backend, op).await {
                    self.output.items(&backend, &recipients)?;
                }
                Ok(())
            }
            Command::Transfer {
                account,
                recipient,
                amount,
                label,
            } => {
                if recipient.backend.is_some() && recipient.backend != account.backend {
                    self.usage("the recipient must belong to the backend of the account");
                    return Ok(());
                }
                let transfer = Transfer::new(account.id, recipient.id, amount, label.unwrap_or_default());
                let op = operation(move |instance, input| {
                    let transfer = transfer.clone();
                    async move {
                        let cap = bank_transfer(instance)?;
                        let registered = cap.init_transfer(&transfer, &input).await?;
                        cap.execute_transfer(&registered, &input).await
                    }
                    .boxed()
                });
                for (backend, done) in self.gather(CapabilityId::BankTransfer, account.backend, op).await {
                    self.output.item(Some(&backend), &done)?;
                }
                Ok(())
            }
            Command::AddRecipient { account, iban, label } => {
                let recipient = Recipient {
                    id: String::new(),
                    label,
                    iban: Some(iban),
                    bank_name: None,
                    enabled: true,
                };
                let id = account.id;
                let op = operation(move |instance, input| {
                    let (id, recipient) = (id.clone(), recipient.clone());
                    async move { bank_transfer(instance)?.new_recipient(&id, &recipient, &input).await }.boxed()
                });
                for (backend, added) in self.gather(CapabilityId::BankTransfer, account.backend, op).await {
                    self.output.item(Some(&backend), &added)?;
                }
                Ok(())
            }
            Command::Profile => {
                let op = operation(|instance, _input| {
                    async move { profile(instance)?.get_profile().await }.boxed()
                });
                for (backend, holder) in self.gather(CapabilityId::Profile, None, op).await {
                    self.output.item(Some(&backend), &holder)?;
                }
                Ok(())
            }
            Command::Subscriptions => {
                let op = operation(|instance, _input| {
                    async move { documents(instance)?.iter_subscriptions().await }.boxed()
                });
                for (backend, subscriptions) in self.gather(CapabilityId::Documents, None, op).await {
                    self.output.items(&backend, &subscriptions)?;
                }
                Ok(())
            }
            Command::Documents { subscription } => {
                let id = subscription.id;
                let op = operation(move |instance, _input| {
                    let id = id.clone();
                    async move { documents(instance)?.iter_documents(&id).await }.boxed()
                });
                for (backend, docs) in self.gather(CapabilityId::Documents, subscription.backend, op).await {
                    self.output.items(&backend, &docs)?;
                }
                Ok(())
            }
            Command::Download { document, output } => {
                let id = document.id;
                let op = operation(move |instance, _input| {
                    let id = id.clone();
                    async move {
                        let cap = documents(instance)?;
                        let document = cap.get_document(&id).await?;
                        let data = cap.download_document(&document).await?;
                        Ok((document, data))
                    }
                    .boxed()
                });
                let results = self.gather(CapabilityId::Documents, document.backend, op).await;
                if results.len() > 1 && output.is_some() {
                    self.usage("several backends have this document; qualify it with @backend");
                    return Ok(());
                }
                for (backend, (document, data)) in results {
                    let path = output
                        .clone()
                        .unwrap_or_else(|| download_path(&document.id, &document.format));
                    std::fs::write(&path, &data)
                        .with_context(|| format!("failed to write {}", path.display()))?;
                    let saved = Saved {
                        id: document.id,
                        path: path.display().to_string(),
                        size: data.len(),
                    };
                    self.output.item(Some(&backend), &saved)?;
                }
                Ok(())
            }
        }
    }

    async fn transactions(&mut self, account: QualifiedId, coming: bool) -> Result<()> {
        let id = account.id;
        let op = operation(move |instance, _input| {
            let id = id.clone();
            async move {
                let bank = bank(instance)?;
                let account = bank.get_account(&id).await?;
                if coming {
                    bank.iter_coming(&account).await
                } else {
                    bank.iter_history(&account).await
                }
            }
            .boxed()
        });
        for (backend, transactions) in self.gather(CapabilityId::Bank, account.backend, op).await {
            self.output.items(&backend, &transactions)?;
            if self.output.is_full() {
                break;
            }
        }
        Ok(())
    }

    async fn backends_command(&mut self, command: BackendsCommand) -> Result<()> {
        let (name, result) = match command {
            BackendsCommand::List => return self.list_backends(),
            BackendsCommand::Modules => return self.list_modules(),
            BackendsCommand::Add { name, module, params } => {
                let result = self.add_backend(&name, &module, params.into_iter().collect());
                (name, result)
            }
            BackendsCommand::Remove { name } => {
                let result = self.remove_backend(&name).await;
                (name, result)
            }
            BackendsCommand::Enable { name } => {
                let result = self.enable_backend(&name, true);
                (name, result)
            }
            BackendsCommand::Disable { name } => {
                let result = self.enable_backend(&name, false);
                (name, result)
            }
        };
        if let Err(e) = result {
            self.report(Some(&name), &e);
        }
        Ok(())
    }

    fn list_backends(&mut self) -> Result<()> {
        let rows: Vec<BackendRow> = self
            .backends
            .iter()
            .map(|(name, entry)| BackendRow {
                name: name.to_string(),
                module: entry.module.clone(),
                enabled: entry.enabled,
                error: self.invalid.get(name).map(ToString::to_string),
            })
            .collect();
        for row in &rows {
            self.output.item(None, row)?;
        }
        Ok(())
    }

    fn list_modules(&mut self) -> Result<()> {
        for module in self.registry.modules() {
            let row = ModuleRow {
                name: module.name().to_string(),
                description: module.description().to_string(),
                capabilities: module.capabilities().iter().map(|c| c.name().to_string()).collect(),
            };
            self.output.item(None, &row)?;
        }
        Ok(())
    }

    fn add_backend(
        &mut self,
        name: &BackendName,
        module: &str,
        mut config: BTreeMap<String, String>,
    ) -> trawl_backend::Result<()> {
        if self.backends.get(name).is_some() {
            return Err(BackendError::BackendExists {
                backend: name.to_string(),
            });
        }
        let module = self.registry.module(module)?;
        let schema = module.schema();

        let missing: Vec<Field> = schema
            .fields()
            .iter()
            .filter(|f| f.required && f.default.is_none() && f.kind != FieldKind::Transient)
            .filter(|f| !config.contains_key(&f.id))
            .map(|f| {
                let field = Field::new(f.id.clone(), f.label.clone()).choices(f.choices.clone());
                if f.kind == FieldKind::Masked {
                    field.masked()
                } else {
                    field
                }
            })
            .collect();
        if !missing.is_empty() && self.interactive {
            let answers = self
                .prompter
                .ask(&format!("Configure {name} ({})", module.name()), &missing)
                .map_err(|e| BackendError::Bug(format!("cannot read answer: {e}")))?;
            config.extend(answers);
        }

        schema.validate(name.as_str(), &config)?;
        self.backends
            .add(name.clone(), BackendEntry::new(module.name(), config))?;
        self.backends.save(&self.backends_path)?;
        tracing::info!(backend = %name, module = module.name(), "added backend");
        Ok(())
    }

    async fn remove_backend(&mut self, name: &BackendName) -> trawl_backend::Result<()> {
        if !self.backends.remove(name) {
            return Err(BackendError::BackendNotFound {
                backend: name.to_string(),
            });
        }
        self.backends.save(&self.backends_path)?;
        self.registry.remove(name);
        self.storage.remove(name).await?;
        tracing::info!(backend = %name, "removed backend");
        Ok(())
    }

    fn enable_backend(&mut self, name: &BackendName, enabled: bool) -> trawl_backend::Result<()> {
        self.backends.set_enabled(name, enabled)?;
        self.backends.save(&self.backends_path)?;
        // invalid entries are not in the registry
        let _ = if enabled {
            self.registry.enable(name)
        } else {
            self.registry.disable(name)
        };
        Ok(())
    }
}
