//! Transfers and recipients.
//!
//! Sending money is two calls: [`CapBankTransfer::init_transfer`] registers
//! the order and returns it as the bank understood it (fees, execution date),
//! then [`CapBankTransfer::execute_transfer`] confirms it. Either may suspend
//! with a transfer step interaction when the bank asks for a code.

use super::bank::Amount;
use crate::error::Result;
use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use trawl_auth::InteractionInput;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recipient {
    pub id: String,
    pub label: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iban: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bank_name: Option<String>,
    /// New recipients may have to wait before receiving transfers
    #[serde(default = "enabled_default")]
    pub enabled: bool,
}

fn enabled_default() -> bool {
    true
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransferStatus {
    /// Built locally, not sent yet
    #[default]
    Draft,
    /// Registered by the bank, waiting for confirmation
    Pending,
    Executed,
    Rejected,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transfer {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub account_id: String,
    pub recipient_id: String,
    pub amount: Amount,
    pub label: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exec_date: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fees: Option<Amount>,
    #[serde(default)]
    pub status: TransferStatus,
}

impl Transfer {
    pub fn new(
        account_id: impl Into<String>,
        recipient_id: impl Into<String>,
        amount: Amount,
        label: impl Into<String>,
    ) -> Self {
        Self {
            id: None,
            account_id: account_id.into(),
            recipient_id: recipient_id.into(),
            amount,
            label: label.into(),
            exec_date: None,
            fees: None,
            status: TransferStatus::Draft,
        }
    }
}

/// Transfers on top of the bank capability.
#[async_trait]
pub trait CapBankTransfer: Send {
    async fn iter_transfer_recipients(&mut self, account_id: &str) -> Result<Vec<Recipient>>;

    /// Register `transfer`; `input` answers a previous transfer step.
    async fn init_transfer(
        &mut self,
        transfer: &Transfer,
        input: &InteractionInput,
    ) -> Result<Transfer>;

    async fn execute_transfer(
        &mut self,
        transfer: &Transfer,
        input: &InteractionInput,
    ) -> Result<Transfer>;

    async fn new_recipient(
        &mut self,
        account_id: &str,
        recipient: &Recipient,
        input: &InteractionInput,
    ) -> Result<Recipient>;
}
