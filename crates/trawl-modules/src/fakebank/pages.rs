//! Fakebank pages and their JSON payloads.

use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use trawl_auth::{ActionType, AuthError, Result};
use trawl_backend::{
    Account, AccountType, Amount, Document, DocumentType, Profile, Recipient, Subscription,
    Transaction, TransactionType,
};
use trawl_browser::{Page, PageDescriptor, PageResolver};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FakePage {
    /// Served in place of any API page during maintenance
    Maintenance,
    Accounts,
    History,
    Coming,
    Recipients,
    Profile,
    Subscriptions,
    Documents,
}

fn has_key(doc: &trawl_browser::Document, key: &str) -> bool {
    doc.as_json().is_some_and(|json| json.get(key).is_some())
}

/// Page declarations of the site rooted at `base_url`.
pub fn resolver(base_url: &str) -> trawl_browser::Result<PageResolver<FakePage>> {
    PageResolver::with_base(base_url)
        .page(
            PageDescriptor::new("maintenance", FakePage::Maintenance, &["/api/.*"])
                .json()
                .is_here(|doc, _| has_key(doc, "maintenance")),
        )?
        .page(
            PageDescriptor::new("accounts", FakePage::Accounts, &["/api/accounts"])
                .json()
                .logged()
                .is_here(|doc, _| has_key(doc, "accounts")),
        )?
        .page(
            PageDescriptor::new(
                "history",
                FakePage::History,
                &[
                    r"/api/accounts/(?P<id>[^/?]+)/transactions",
                    r"/api/accounts/(?P<id>[^/?]+)/transactions\?page=(?P<page>\d+)",
                ],
            )
            .json()
            .logged()
            .is_here(|doc, _| has_key(doc, "transactions")),
        )?
        .page(
            PageDescriptor::new("coming", FakePage::Coming, &[r"/api/accounts/(?P<id>[^/?]+)/coming"])
                .json()
                .logged(),
        )?
        .page(
            PageDescriptor::new(
                "recipients",
                FakePage::Recipients,
                &[r"/api/accounts/(?P<id>[^/?]+)/recipients"],
            )
            .json()
            .logged(),
        )?
        .page(
            PageDescriptor::new("profile", FakePage::Profile, &["/api/profile"])
                .json()
                .logged()
                .is_here(|doc, _| has_key(doc, "name")),
        )?
        .page(
            PageDescriptor::new("subscriptions", FakePage::Subscriptions, &["/api/subscriptions"])
                .json()
                .logged(),
        )?
        .page(
            PageDescriptor::new(
                "documents",
                FakePage::Documents,
                &[r"/api/subscriptions/(?P<id>[^/?]+)/documents"],
            )
            .json()
            .logged(),
        )
}

/// Error payload of 4xx answers: `{"error": "...", "message": "..."}`.
#[derive(Debug, Default, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    error: String,
    #[serde(default)]
    message: String,
}

/// Classify a 4xx answer of the site.
pub fn site_error(status: u16, body: &str) -> Option<AuthError> {
    let body: ErrorBody = serde_json::from_str(body).unwrap_or_default();
    let message = body.message;
    match body.error.as_str() {
        "wrong_password" => Some(AuthError::IncorrectPassword {
            message,
            bad_fields: vec!["login".to_string(), "password".to_string()],
        }),
        "wrong_otp" | "wrong_code" => Some(AuthError::incorrect_password(message)),
        "banned" => Some(AuthError::UserBanned { message }),
        "password_expired" => Some(AuthError::PasswordExpired { message }),
        "terms_update" => Some(AuthError::action_needed(message, ActionType::Acknowledge)),
        "session_expired" => Some(AuthError::LoggedOut),
        _ if status == 401 => Some(AuthError::LoggedOut),
        _ => None,
    }
}

/// Fail with `Unavailable` when the site answered with its maintenance page.
pub fn check_available(page: &Page<FakePage>) -> Result<()> {
    if page.kind() != FakePage::Maintenance {
        return Ok(());
    }
    let reason = page.json()["maintenance"]
        .as_str()
        .unwrap_or("maintenance")
        .to_string();
    Err(AuthError::Browser(trawl_browser::BrowserError::Unavailable {
        url: page.url().to_string(),
        reason,
    }))
}

fn decode<T: DeserializeOwned>(json: &Value, what: &str) -> Result<T> {
    T::deserialize(json).map_err(|e| AuthError::Assertion(format!("unexpected {what} payload: {e}")))
}

fn amount(value: &str) -> Result<Amount> {
    value
        .parse()
        .map_err(|e| AuthError::Assertion(format!("{e}")))
}

#[derive(Debug, Deserialize)]
struct RawAccount {
    id: String,
    label: String,
    #[serde(rename = "type", default)]
    kind: String,
    balance: String,
    #[serde(default = "euro")]
    currency: String,
    iban: Option<String>,
    coming: Option<String>,
}

fn euro() -> String {
    "EUR".to_string()
}

#[derive(Debug, Deserialize)]
struct AccountList {
    accounts: Vec<RawAccount>,
}

pub fn parse_accounts(json: &Value) -> Result<Vec<Account>> {
    let list: AccountList = decode(json, "accounts")?;
    list.accounts
        .into_iter()
        .map(|raw| {
            Ok(Account {
                kind: match raw.kind.as_str() {
                    "checking" => AccountType::Checking,
                    "savings" => AccountType::Savings,
                    "card" => AccountType::Card,
                    "loan" => AccountType::Loan,
                    "market" => AccountType::Market,
                    _ => AccountType::Unknown,
                },
                balance: amount(&raw.balance)?,
                coming: raw.coming.as_deref().map(amount).transpose()?,
                id: raw.id,
                label: raw.label,
                currency: raw.currency,
                iban: raw.iban,
            })
        })
        .collect()
}

#[derive(Debug, Deserialize)]
struct RawTransaction {
    id: Option<String>,
    date: chrono::NaiveDate,
    label: String,
    amount: String,
    #[serde(rename = "type", default)]
    kind: String,
}

#[derive(Debug, Deserialize)]
struct TransactionList {
    transactions: Vec<RawTransaction>,
    next_page: Option<String>,
}

/// Transactions of one page and the URL of the next page.
pub fn parse_transactions(json: &Value, coming: bool) -> Result<(Vec<Transaction>, Option<String>)> {
    let list: TransactionList = decode(json, "transactions")?;
    let transactions = list
        .transactions
        .into_iter()
        .map(|raw| {
            Ok(Transaction {
                amount: amount(&raw.amount)?,
                kind: match raw.kind.as_str() {
                    "transfer" => TransactionType::Transfer,
                    "card" => TransactionType::Card,
                    "order" => TransactionType::Order,
                    "check" => TransactionType::Check,
                    "deposit" => TransactionType::Deposit,
                    "bank" => TransactionType::Bank,
                    _ => TransactionType::Unknown,
                },
                id: raw.id,
                date: raw.date,
                label: raw.label,
                coming,
            })
        })
        .collect::<Result<Vec<_>>>()?;
    Ok((transactions, list.next_page))
}

#[derive(Debug, Deserialize)]
struct RecipientList {
    recipients: Vec<Recipient>,
}

pub fn parse_recipients(json: &Value) -> Result<Vec<Recipient>> {
    decode::<RecipientList>(json, "recipients").map(|list| list.recipients)
}

pub fn parse_profile(json: &Value) -> Result<Profile> {
    decode(json, "profile")
}

#[derive(Debug, Deserialize)]
struct SubscriptionList {
    subscriptions: Vec<Subscription>,
}

pub fn parse_subscriptions(json: &Value) -> Result<Vec<Subscription>> {
    decode::<SubscriptionList>(json, "subscriptions").map(|list| list.subscriptions)
}

#[derive(Debug, Deserialize)]
struct RawDocument {
    id: String,
    label: String,
    date: Option<chrono::NaiveDate>,
    #[serde(rename = "type", default)]
    kind: String,
    #[serde(default = "pdf")]
    format: String,
    url: Option<String>,
}

fn pdf() -> String {
    "pdf".to_string()
}

#[derive(Debug, Deserialize)]
struct DocumentList {
    documents: Vec<RawDocument>,
}

pub fn parse_documents(json: &Value) -> Result<Vec<Document>> {
    let list: DocumentList = decode(json, "documents")?;
    Ok(list
        .documents
        .into_iter()
        .map(|raw| Document {
            kind: match raw.kind.as_str() {
                "bill" => DocumentType::Bill,
                "statement" => DocumentType::Statement,
                "contract" => DocumentType::Contract,
                "notice" => DocumentType::Notice,
                _ => DocumentType::Other,
            },
            id: raw.id,
            label: raw.label,
            date: raw.date,
            format: raw.format,
            url: raw.url,
        })
        .collect())
}

/// `status` field of an action answer.
pub fn status(json: &Value) -> &str {
    json.get("status").and_then(Value::as_str).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_accounts() {
        let accounts = parse_accounts(&json!({
            "accounts": [
                {"id": "1", "label": "Compte courant", "type": "checking", "balance": "1234.56",
                 "iban": "FR7630001007941234567890185"},
                {"id": "2", "label": "Livret A", "type": "savings", "balance": "-0.50", "coming": "10"}
            ]
        }))
        .expect("accounts");

        assert_eq!(accounts.len(), 2);
        assert_eq!(accounts[0].kind, AccountType::Checking);
        assert_eq!(accounts[0].balance, Amount::from_cents(123_456));
        assert_eq!(accounts[0].currency, "EUR");
        assert_eq!(accounts[1].balance, Amount::from_cents(-50));
        assert_eq!(accounts[1].coming, Some(Amount::from_cents(1000)));
    }

    #[test]
    fn test_bad_amount_is_an_assertion() {
        let err = parse_accounts(&json!({
            "accounts": [{"id": "1", "label": "x", "balance": "12.345"}]
        }))
        .expect_err("three decimals");
        assert!(matches!(err, AuthError::Assertion(_)));
    }

    #[test]
    fn test_parse_transactions_with_next_page() {
        let (transactions, next) = parse_transactions(
            &json!({
                "transactions": [
                    {"id": "t1", "date": "2026-10-01", "label": "CB SUPERMARCHE", "amount": "-42.10", "type": "card"}
                ],
                "next_page": "/api/accounts/1/transactions?page=2"
            }),
            false,
        )
        .expect("transactions");
        assert_eq!(transactions[0].kind, TransactionType::Card);
        assert_eq!(transactions[0].amount, Amount::from_cents(-4210));
        assert_eq!(next.as_deref(), Some("/api/accounts/1/transactions?page=2"));
    }

    #[test]
    fn test_site_errors() {
        assert!(matches!(
            site_error(401, r#"{"error": "wrong_password"}"#),
            Some(AuthError::IncorrectPassword { ref bad_fields, .. }) if bad_fields.len() == 2
        ));
        assert!(matches!(
            site_error(403, r#"{"error": "banned", "message": "fraud"}"#),
            Some(AuthError::UserBanned { .. })
        ));
        assert!(matches!(site_error(401, "not json"), Some(AuthError::LoggedOut)));
        assert!(site_error(400, r#"{"error": "odd"}"#).is_none());
    }
}
