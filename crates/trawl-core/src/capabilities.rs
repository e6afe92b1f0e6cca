//! Capability descriptors.
//!
//! A capability is an abstract interface a backend may implement. Each one is
//! identified by a stable name and described by the list of operations it
//! declares, so applications can address any backend through it without
//! knowing the module behind it.

use crate::error::TrawlError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

/// Identifies a capability interface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CapabilityId {
    /// Bank accounts and their transactions
    Bank,
    /// Transfers and recipients on top of [`CapabilityId::Bank`]
    BankTransfer,
    /// Account holder profile
    Profile,
    /// Subscriptions and downloadable documents (bills, statements)
    Documents,
}

/// Static description of a capability.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CapabilityDescriptor {
    /// Capability identifier
    pub id: CapabilityId,
    /// Stable machine name
    pub name: &'static str,
    /// Short human readable summary
    pub description: &'static str,
    /// Operations the interface declares
    pub operations: &'static [&'static str],
}

const DESCRIPTORS: &[CapabilityDescriptor] = &[
    CapabilityDescriptor {
        id: CapabilityId::Bank,
        name: "bank",
        description: "List bank accounts and iterate their history",
        operations: &["iter_accounts", "get_account", "iter_history", "iter_coming"],
    },
    CapabilityDescriptor {
        id: CapabilityId::BankTransfer,
        name: "bank-transfer",
        description: "Send transfers and manage recipients",
        operations: &[
            "iter_transfer_recipients",
            "init_transfer",
            "execute_transfer",
            "new_recipient",
        ],
    },
    CapabilityDescriptor {
        id: CapabilityId::Profile,
        name: "profile",
        description: "Fetch the account holder profile",
        operations: &["get_profile"],
    },
    CapabilityDescriptor {
        id: CapabilityId::Documents,
        name: "documents",
        description: "List subscriptions and download their documents",
        operations: &["iter_subscriptions", "iter_documents", "download_document"],
    },
];

impl CapabilityId {
    /// All known capabilities, in declaration order.
    #[must_use]
    pub fn all() -> &'static [CapabilityId] {
        &[
            Self::Bank,
            Self::BankTransfer,
            Self::Profile,
            Self::Documents,
        ]
    }

    /// Descriptor of this capability.
    #[must_use]
    pub fn descriptor(self) -> &'static CapabilityDescriptor {
        // DESCRIPTORS holds one entry per variant, in variant order
        &DESCRIPTORS[self as usize]
    }

    /// Stable machine name.
    #[must_use]
    pub fn name(self) -> &'static str {
        self.descriptor().name
    }

    /// Whether the interface declares `operation`.
    #[must_use]
    pub fn declares(self, operation: &str) -> bool {
        self.descriptor().operations.contains(&operation)
    }
}

impl fmt::Display for CapabilityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for CapabilityId {
    type Err = TrawlError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        DESCRIPTORS
            .iter()
            .find(|d| d.name == s)
            .map(|d| d.id)
            .ok_or_else(|| TrawlError::Validation(format!("unknown capability: '{s}'")))
    }
}

/// Set of capabilities declared by a module.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapabilitySet {
    capabilities: BTreeSet<CapabilityId>,
}

impl CapabilitySet {
    /// Create an empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a capability.
    pub fn insert(&mut self, capability: CapabilityId) {
        tracing::trace!("Declaring capability: {}", capability);
        self.capabilities.insert(capability);
    }

    /// Check whether a capability is declared.
    #[must_use]
    pub fn has(&self, capability: CapabilityId) -> bool {
        self.capabilities.contains(&capability)
    }

    /// Check whether every capability in `required` is declared.
    #[must_use]
    pub fn has_all(&self, required: &[CapabilityId]) -> bool {
        required.iter().all(|c| self.has(*c))
    }

    /// Iterate declared capabilities in stable order.
    pub fn iter(&self) -> impl Iterator<Item = CapabilityId> + '_ {
        self.capabilities.iter().copied()
    }

    /// Number of declared capabilities.
    #[must_use]
    pub fn len(&self) -> usize {
        self.capabilities.len()
    }

    /// Whether no capability is declared.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.capabilities.is_empty()
    }
}

impl FromIterator<CapabilityId> for CapabilitySet {
    fn from_iter<I: IntoIterator<Item = CapabilityId>>(iter: I) -> Self {
        Self {
            capabilities: iter.into_iter().collect(),
        }
    }
}
