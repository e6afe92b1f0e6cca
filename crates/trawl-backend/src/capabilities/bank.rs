//! Bank accounts and transactions.

use crate::error::{BackendError, Result};
use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use trawl_core::{CapabilityId, TrawlError};

/// Amount in minor units (cents).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Amount(i64);

impl Amount {
    pub fn from_cents(cents: i64) -> Self {
        Self(cents)
    }

    pub fn cents(self) -> i64 {
        self.0
    }

    pub fn is_negative(self) -> bool {
        self.0 < 0
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        write!(f, "{sign}{}.{:02}", abs / 100, abs % 100)
    }
}

impl FromStr for Amount {
    type Err = TrawlError;

    /// Parse `-12.3`, `12,30` or `1200`.
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let invalid = || TrawlError::Validation(format!("invalid amount: '{s}'"));

        let trimmed = s.trim().replace(',', ".");
        let (negative, digits) = match trimmed.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, trimmed.strip_prefix('+').unwrap_or(&trimmed)),
        };
        let (units, fraction) = digits.split_once('.').unwrap_or((digits, ""));

        if units.is_empty()
            || fraction.len() > 2
            || !units.chars().all(|c| c.is_ascii_digit())
            || !fraction.chars().all(|c| c.is_ascii_digit())
        {
            return Err(invalid());
        }

        let units: i64 = units.parse().map_err(|_| invalid())?;
        let fraction: i64 = format!("{fraction:0<2}").parse().map_err(|_| invalid())?;
        let cents = units
            .checked_mul(100)
            .and_then(|c| c.checked_add(fraction))
            .ok_or_else(invalid)?;

        Ok(Self(if negative { -cents } else { cents }))
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccountType {
    #[default]
    Unknown,
    Checking,
    Savings,
    Card,
    Loan,
    Market,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub id: String,
    pub label: String,
    #[serde(default)]
    pub kind: AccountType,
    pub balance: Amount,
    /// ISO 4217 code
    pub currency: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iban: Option<String>,
    /// Sum of pending operations
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub coming: Option<Amount>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionType {
    #[default]
    Unknown,
    Transfer,
    Card,
    Order,
    Check,
    Deposit,
    Bank,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub date: NaiveDate,
    pub label: String,
    pub amount: Amount,
    #[serde(default)]
    pub kind: TransactionType,
    /// Not yet debited
    #[serde(default)]
    pub coming: bool,
}

/// Bank accounts and their history.
#[async_trait]
pub trait CapBank: Send {
    async fn iter_accounts(&mut self) -> Result<Vec<Account>>;

    /// Account by id; looked up in [`CapBank::iter_accounts`] unless the
    /// module knows better.
    async fn get_account(&mut self, id: &str) -> Result<Account> {
        self.iter_accounts()
            .await?
            .into_iter()
            .find(|a| a.id == id)
            .ok_or_else(|| BackendError::not_found(id))
    }

    /// Past transactions, newest first.
    async fn iter_history(&mut self, account: &Account) -> Result<Vec<Transaction>>;

    async fn iter_coming(&mut self, _account: &Account) -> Result<Vec<Transaction>> {
        Err(BackendError::operation_not_supported(
            CapabilityId::Bank,
            "iter_coming",
        ))
    }
}
