//! Capability interfaces and the objects they exchange.

pub mod bank;
pub mod documents;
pub mod profile;
pub mod transfer;

pub use bank::{Account, AccountType, Amount, CapBank, Transaction, TransactionType};
pub use documents::{CapDocument, Document, DocumentType, Subscription};
pub use profile::{CapProfile, Profile};
pub use transfer::{CapBankTransfer, Recipient, Transfer, TransferStatus};
