//! Reference module for a JSON banking API.
//!
//! Password login, optionally followed by an SMS code or a mobile app
//! validation; accounts with paginated history, profile, recipients,
//! transfers confirmed by code, and downloadable statements.

mod browser;
mod pages;

pub use browser::FakeBankBrowser;
pub use pages::FakePage;

use async_trait::async_trait;
use futures::FutureExt;
use std::sync::Arc;
use trawl_auth::{retry_on_logout, FlowPolicy, InteractionInput};
use trawl_backend::{
    Account, BackendError, BackendInstance, CapBank, CapBankTransfer, CapDocument, CapProfile,
    ConfigField, ConfigSchema, Document, InstanceContext, Module, Profile, Recipient, Result,
    Subscription, Transaction, Transfer,
};
use trawl_browser::{BrowserOptions, StateMap};
use trawl_core::{CapabilityId, CapabilitySet, TrawlError};
use zeroize::Zeroizing;

pub const NAME: &str = "fakebank";
pub const DEFAULT_BASE_URL: &str = "https://fakebank.example";

#[derive(Debug, Default)]
pub struct FakeBankModule;

impl Module for FakeBankModule {
    fn name(&self) -> &str {
        NAME
    }

    fn description(&self) -> &str {
        "Fakebank reference banking module"
    }

    fn capabilities(&self) -> CapabilitySet {
        [
            CapabilityId::Bank,
            CapabilityId::BankTransfer,
            CapabilityId::Profile,
            CapabilityId::Documents,
        ]
        .into_iter()
        .collect()
    }

    fn schema(&self) -> ConfigSchema {
        ConfigSchema::new(vec![
            ConfigField::new("login", "Customer number").regex(r"\d{8}"),
            ConfigField::new("password", "Password").masked(),
            ConfigField::new("base_url", "API URL")
                .regex(r"https?://\S+")
                .default_value(DEFAULT_BASE_URL),
            ConfigField::new("otp", "SMS code").transient(),
        ])
    }

    fn create_instance(&self, context: InstanceContext) -> Result<Box<dyn BackendInstance>> {
        let config = &context.config;
        let base_url = config.get("base_url").unwrap_or(DEFAULT_BASE_URL);
        let credentials = (
            config.require("login")?.to_string(),
            Zeroizing::new(config.require("password")?.to_string()),
        );

        let mut browser = FakeBankBrowser::new(
            base_url,
            context.transport.clone(),
            BrowserOptions::from_config(&context.browser).restrict_to(&[base_url]),
            credentials,
            FlowPolicy::from_config(&context.auth),
        )?;
        browser.set_configured_otp(config.get("otp").map(|code| Zeroizing::new(code.to_string())));

        tracing::debug!(backend = %context.backend, base_url, "created fakebank instance");
        Ok(Box::new(FakeBank { browser }))
    }
}

/// Live fakebank session.
pub struct FakeBank {
    browser: FakeBankBrowser,
}

impl FakeBank {
    pub fn browser(&self) -> &FakeBankBrowser {
        &self.browser
    }
}

#[async_trait]
impl CapBank for FakeBank {
    async fn iter_accounts(&mut self) -> Result<Vec<Account>> {
        Ok(retry_on_logout(&mut self.browser, |b| b.iter_accounts().boxed()).await?)
    }

    async fn iter_history(&mut self, account: &Account) -> Result<Vec<Transaction>> {
        let id = account.id.clone();
        Ok(retry_on_logout(&mut self.browser, move |b| {
            let id = id.clone();
            async move { b.iter_history(&id).await }.boxed()
        })
        .await?)
    }

    async fn iter_coming(&mut self, account: &Account) -> Result<Vec<Transaction>> {
        let id = account.id.clone();
        Ok(retry_on_logout(&mut self.browser, move |b| {
            let id = id.clone();
            async move { b.iter_coming(&id).await }.boxed()
        })
        .await?)
    }
}

#[async_trait]
impl CapBankTransfer for FakeBank {
    async fn iter_transfer_recipients(&mut self, account_id: &str) -> Result<Vec<Recipient>> {
        let id = account_id.to_string();
        Ok(retry_on_logout(&mut self.browser, move |b| {
            let id = id.clone();
            async move { b.iter_recipients(&id).await }.boxed()
        })
        .await?)
    }

    async fn init_transfer(&mut self, transfer: &Transfer, _input: &InteractionInput) -> Result<Transfer> {
        if transfer.amount.cents() <= 0 {
            return Err(TrawlError::Validation(format!(
                "transfer amount must be positive, got {}",
                transfer.amount
            ))
            .into());
        }
        self.get_account(&transfer.account_id).await?;

        let transfer = transfer.clone();
        Ok(retry_on_logout(&mut self.browser, move |b| {
            let transfer = transfer.clone();
            async move { b.init_transfer(&transfer).await }.boxed()
        })
        .await?)
    }

    async fn execute_transfer(&mut self, transfer: &Transfer, input: &InteractionInput) -> Result<Transfer> {
        let (transfer, input) = (transfer.clone(), input.clone());
        Ok(retry_on_logout(&mut self.browser, move |b| {
            let (transfer, input) = (transfer.clone(), input.clone());
            async move { b.execute_transfer(&transfer, &input).await }.boxed()
        })
        .await?)
    }

    async fn new_recipient(
        &mut self,
        account_id: &str,
        recipient: &Recipient,
        input: &InteractionInput,
    ) -> Result<Recipient> {
        if recipient.iban.as_deref().map_or(true, str::is_empty) {
            return Err(TrawlError::Validation("a new recipient needs an IBAN".to_string()).into());
        }
        let (id, recipient, input) = (account_id.to_string(), recipient.clone(), input.clone());
        Ok(retry_on_logout(&mut self.browser, move |b| {
            let (id, recipient, input) = (id.clone(), recipient.clone(), input.clone());
            async move { b.new_recipient(&id, &recipient, &input).await }.boxed()
        })
        .await?)
    }
}

#[async_trait]
impl CapProfile for FakeBank {
    async fn get_profile(&mut self) -> Result<Profile> {
        Ok(retry_on_logout(&mut self.browser, |b| b.get_profile().boxed()).await?)
    }
}

#[async_trait]
impl CapDocument for FakeBank {
    async fn iter_subscriptions(&mut self) -> Result<Vec<Subscription>> {
        Ok(retry_on_logout(&mut self.browser, |b| b.iter_subscriptions().boxed()).await?)
    }

    async fn iter_documents(&mut self, subscription_id: &str) -> Result<Vec<Document>> {
        let id = subscription_id.to_string();
        Ok(retry_on_logout(&mut self.browser, move |b| {
            let id = id.clone();
            async move { b.iter_documents(&id).await }.boxed()
        })
        .await?)
    }

    async fn download_document(&mut self, document: &Document) -> Result<Vec<u8>> {
        let url = document
            .url
            .clone()
            .ok_or_else(|| BackendError::not_found(format!("{} has no download link", document.id)))?;
        Ok(retry_on_logout(&mut self.browser, move |b| {
            let url = url.clone();
            async move { b.download(&url).await }.boxed()
        })
        .await?)
    }
}

#[async_trait]
impl BackendInstance for FakeBank {
    fn as_bank(&mut self) -> Option<&mut dyn CapBank> {
        Some(self)
    }

    fn as_bank_transfer(&mut self) -> Option<&mut dyn CapBankTransfer> {
        Some(self)
    }

    fn as_profile(&mut self) -> Option<&mut dyn CapProfile> {
        Some(self)
    }

    fn as_documents(&mut self) -> Option<&mut dyn CapDocument> {
        Some(self)
    }

    fn provide_input(&mut self, input: InteractionInput) {
        self.browser.provide_input(input);
    }

    fn dump_state(&self) -> StateMap {
        self.browser.dump_state()
    }

    async fn load_state(&mut self, state: &StateMap) -> Result<()> {
        Ok(self.browser.load_state(state).await?)
    }
}

/// Register the module under `fakebank`.
pub fn module() -> Arc<dyn Module> {
    Arc::new(FakeBankModule)
}

#[cfg(test)]
mod tests;
