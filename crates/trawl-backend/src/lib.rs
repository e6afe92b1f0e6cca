//! Trawl Backend - modules, configured backends and multi-backend calls.
//!
//! # Modules
//!
//! - [`capabilities`] - Capability traits and their objects (bank, transfer, profile, documents)
//! - [`module`] - Module and backend instance traits
//! - [`schema`] - Backend configuration schema and validated values
//! - [`backend`] - A configured backend and its session
//! - [`storage`] - Persisted backend state
//! - [`loader`] - Backends file
//! - [`registry`] - Modules and backends catalog
//! - [`dispatch`] - Scatter-gather calls across backends
//! - [`error`] - Error types and classification

pub mod backend;
pub mod capabilities;
pub mod dispatch;
pub mod error;
pub mod loader;
pub mod module;
pub mod registry;
pub mod schema;
pub mod storage;

#[cfg(test)]
mod testing;

pub use backend::{Backend, BackendEnv};
pub use capabilities::{
    Account, AccountType, Amount, CapBank, CapBankTransfer, CapDocument, CapProfile, Document,
    DocumentType, Profile, Recipient, Subscription, Transaction, TransactionType, Transfer,
    TransferStatus,
};
pub use dispatch::{CallItem, CallResults, Dispatcher};
pub use error::{BackendError, BadField, ErrorKind, Result};
pub use loader::{BackendEntry, BackendsFile};
pub use module::{bank, bank_transfer, documents, profile, BackendInstance, InstanceContext, Module};
pub use registry::BackendRegistry;
pub use schema::{BackendConfig, ConfigField, ConfigSchema, FieldKind};
pub use storage::{FileStorage, MemoryStorage, StateStorage};
