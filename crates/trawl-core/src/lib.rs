//! Trawl Core - Foundation crate for the Trawl scraping framework.
//!
//! This crate provides shared types, error handling, configuration management,
//! and capability descriptors that all other Trawl crates depend on.
//!
//! # Modules
//!
//! - [`error`] - Central error types using thiserror
//! - [`config`] - TOML-based configuration with XDG paths
//! - [`types`] - Shared newtypes (`BackendName`, `QualifiedId`, `Timestamp`)
//! - [`capabilities`] - Capability identifiers and their operation descriptors
//!
//! # Example
//!
//! ```rust
//! use trawl_core::{AppConfig, CapabilityId, QualifiedId};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = AppConfig::default();
//! assert_eq!(config.auth.poll_interval_secs, 5);
//!
//! let id = QualifiedId::parse("1234@mybank")?;
//! assert_eq!(id.id, "1234");
//! assert!(CapabilityId::Bank.declares("iter_accounts"));
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]

pub mod capabilities;
pub mod config;
pub mod error;
pub mod types;

// Re-export commonly used types
pub use capabilities::{CapabilityDescriptor, CapabilityId, CapabilitySet};
pub use config::{
    AppConfig, AuthConfig, BrowserConfig, DispatchConfig, GeneralConfig, OutputFormat,
};
pub use error::{ConfigError, ConfigResult, Result, TrawlError};
pub use types::{BackendName, QualifiedId, Timestamp};
