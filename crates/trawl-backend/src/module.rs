//! Module and backend instance traits.
//!
//! A [`Module`] is the code for one website. A backend is a module plus a
//! validated configuration; its live session is a [`BackendInstance`] created
//! by the module on first use.

use crate::capabilities::{CapBank, CapBankTransfer, CapDocument, CapProfile};
use crate::error::{BackendError, Result};
use crate::schema::{BackendConfig, ConfigSchema};
use async_trait::async_trait;
use std::sync::Arc;
use trawl_auth::InteractionInput;
use trawl_browser::{HttpTransport, StateMap};
use trawl_core::{AuthConfig, BackendName, BrowserConfig, CapabilityId, CapabilitySet};

/// Everything a module gets to build an instance.
#[derive(Clone)]
pub struct InstanceContext {
    pub backend: BackendName,
    pub config: Arc<BackendConfig>,
    pub browser: BrowserConfig,
    pub auth: AuthConfig,
    pub transport: Arc<dyn HttpTransport>,
}

/// Site module.
pub trait Module: Send + Sync {
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    fn capabilities(&self) -> CapabilitySet;

    fn schema(&self) -> ConfigSchema;

    /// Build a fresh session for one backend.
    fn create_instance(&self, context: InstanceContext) -> Result<Box<dyn BackendInstance>>;
}

/// Live session of a backend.
///
/// Accessors return `None` for capabilities the module does not implement.
#[async_trait]
pub trait BackendInstance: Send {
    fn as_bank(&mut self) -> Option<&mut dyn CapBank> {
        None
    }

    fn as_bank_transfer(&mut self) -> Option<&mut dyn CapBankTransfer> {
        None
    }

    fn as_profile(&mut self) -> Option<&mut dyn CapProfile> {
        None
    }

    fn as_documents(&mut self) -> Option<&mut dyn CapDocument> {
        None
    }

    /// Answers to the pending interaction, used by the next operation.
    fn provide_input(&mut self, input: InteractionInput);

    fn dump_state(&self) -> StateMap;

    async fn load_state(&mut self, state: &StateMap) -> Result<()>;
}

/// Bank capability of `instance`, or `NotSupported`.
pub fn bank(instance: &mut dyn BackendInstance) -> Result<&mut dyn CapBank> {
    instance
        .as_bank()
        .ok_or_else(|| BackendError::not_supported(CapabilityId::Bank))
}

pub fn bank_transfer(instance: &mut dyn BackendInstance) -> Result<&mut dyn CapBankTransfer> {
    instance
        .as_bank_transfer()
        .ok_or_else(|| BackendError::not_supported(CapabilityId::BankTransfer))
}

pub fn profile(instance: &mut dyn BackendInstance) -> Result<&mut dyn CapProfile> {
    instance
        .as_profile()
        .ok_or_else(|| BackendError::not_supported(CapabilityId::Profile))
}

pub fn documents(instance: &mut dyn BackendInstance) -> Result<&mut dyn CapDocument> {
    instance
        .as_documents()
        .ok_or_else(|| BackendError::not_supported(CapabilityId::Documents))
}
