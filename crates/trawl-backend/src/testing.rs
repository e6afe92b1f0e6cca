//! Test module: one account per backend, fetched through the transport.

use crate::backend::BackendEnv;
use crate::capabilities::{Account, AccountType, Amount, CapBank, CapProfile, Profile, Transaction};
use crate::error::Result;
use crate::module::{BackendInstance, InstanceContext, Module};
use crate::schema::{ConfigField, ConfigSchema};
use crate::storage::MemoryStorage;
use async_trait::async_trait;
use serde_json::json;
use std::sync::Arc;
use trawl_auth::InteractionInput;
use trawl_browser::mock::MockTransport;
use trawl_browser::{HttpRequest, HttpTransport, StateMap};
use trawl_core::{AuthConfig, BrowserConfig, CapabilityId, CapabilitySet};

pub fn env() -> BackendEnv {
    env_with(MockTransport::shared())
}

pub fn env_with(transport: Arc<MockTransport>) -> BackendEnv {
    BackendEnv {
        browser: BrowserConfig::default(),
        auth: AuthConfig::default(),
        transport,
        storage: Arc::new(MemoryStorage::new()),
    }
}

pub struct ConstModule {
    name: String,
    capabilities: CapabilitySet,
}

impl ConstModule {
    pub fn new(name: &str, capabilities: CapabilitySet) -> Self {
        Self {
            name: name.to_string(),
            capabilities,
        }
    }

    pub fn bank(name: &str) -> Self {
        Self::new(name, [CapabilityId::Bank].into_iter().collect())
    }
}

impl Module for ConstModule {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        "test module"
    }

    fn capabilities(&self) -> CapabilitySet {
        self.capabilities.clone()
    }

    fn schema(&self) -> ConfigSchema {
        ConfigSchema::new(vec![ConfigField::new("login", "Login")])
    }

    fn create_instance(&self, context: InstanceContext) -> Result<Box<dyn BackendInstance>> {
        Ok(Box::new(ConstInstance {
            login: context.config.require("login")?.to_string(),
            transport: context.transport,
            calls: 0,
        }))
    }
}

struct ConstInstance {
    login: String,
    transport: Arc<dyn HttpTransport>,
    calls: u64,
}

#[async_trait]
impl CapBank for ConstInstance {
    async fn iter_accounts(&mut self) -> Result<Vec<Account>> {
        assert!(self.login != "panic", "backend exploded");

        self.calls += 1;
        self.transport
            .send(HttpRequest::get(format!("https://{}.example/accounts", self.login)))
            .await?;
        Ok(vec![Account {
            id: "1".to_string(),
            label: self.login.clone(),
            kind: AccountType::Checking,
            balance: Amount::from_cents(100),
            currency: "EUR".to_string(),
            iban: None,
            coming: None,
        }])
    }

    async fn iter_history(&mut self, _account: &Account) -> Result<Vec<Transaction>> {
        Ok(Vec::new())
    }
}

#[async_trait]
impl CapProfile for ConstInstance {
    async fn get_profile(&mut self) -> Result<Profile> {
        Ok(Profile {
            id: self.login.clone(),
            name: self.login.clone(),
            ..Profile::default()
        })
    }
}

#[async_trait]
impl BackendInstance for ConstInstance {
    fn as_bank(&mut self) -> Option<&mut dyn CapBank> {
        Some(self)
    }

    fn as_profile(&mut self) -> Option<&mut dyn CapProfile> {
        Some(self)
    }

    fn provide_input(&mut self, _input: InteractionInput) {}

    fn dump_state(&self) -> StateMap {
        StateMap::from([("calls".to_string(), json!(self.calls))])
    }

    async fn load_state(&mut self, state: &StateMap) -> Result<()> {
        self.calls = state.get("calls").and_then(|v| v.as_u64()).unwrap_or(0);
        Ok(())
    }
}
