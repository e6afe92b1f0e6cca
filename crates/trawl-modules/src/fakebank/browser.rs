//! Fakebank browser: login procedure and site navigation.

use super::pages::{self, FakePage};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;
use trawl_auth::{
    translate_http_error, AuthError, Authenticator, Field, FlowContext, FlowPolicy, InteractionInput,
    InteractionRequest, LoginFlow, LoginProcedure, Result, Step, ValidationStatus,
};
use trawl_backend::{
    Account, Amount, Document, Profile, Recipient, Subscription, Transaction, Transfer,
    TransferStatus,
};
use trawl_browser::{
    Browser, BrowserError, BrowserOptions, BrowserStatus, HttpResponse, HttpTransport,
    PageResolver, RequestOptions, StateMap, UrlParams,
};
use zeroize::Zeroizing;

const FLOW_KEY: &str = "login_flow";
const PENDING_TRANSFER: &str = "pending_transfer";
const PENDING_RECIPIENT: &str = "pending_recipient";
const CODE_FIELD: &str = "code";

fn translate(err: BrowserError) -> AuthError {
    translate_http_error(err, pages::site_error)
}

/// Browser errors wrapped by the flow or by pagination still need the site's
/// error mapping.
fn translate_auth(err: AuthError) -> AuthError {
    match err {
        AuthError::Browser(inner) => translate(inner),
        other => other,
    }
}

fn params<const N: usize>(pairs: [(&str, &str); N]) -> UrlParams {
    pairs
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

fn json_body(response: &HttpResponse) -> Result<Value> {
    serde_json::from_slice(&response.body).map_err(|e| {
        AuthError::Assertion(format!("{} did not answer JSON: {e}", response.url))
    })
}

fn code_field(label: &str) -> Field {
    Field::new(CODE_FIELD, label).masked()
}

/// Browser and credentials; the steps of the login flow.
struct Site {
    browser: Browser<FakePage>,
    login: String,
    password: Zeroizing<String>,
}

impl Site {
    async fn post(&mut self, url: &str, options: RequestOptions) -> Result<Value> {
        let response = self.browser.open(url, options).await.map_err(translate)?;
        json_body(&response)
    }

    async fn get_page(&mut self, kind: FakePage, params: &UrlParams) -> Result<Value> {
        let page = self.browser.go(kind, params).await.map_err(translate)?;
        pages::check_available(page)?;
        Ok(page.json().clone())
    }
}

#[async_trait]
impl LoginProcedure for Site {
    async fn init_login(&mut self, context: &mut FlowContext) -> Result<Step> {
        let form = [
            ("login", self.login.clone()),
            ("password", self.password.as_str().to_string()),
        ];
        let answer = self.post("/api/login", RequestOptions::new().form(form)).await?;

        match pages::status(&answer) {
            "ok" => Ok(Step::Done),
            status @ ("otp" | "app") => {
                let transaction = answer["transaction"]
                    .as_str()
                    .ok_or_else(|| AuthError::assertion("second factor without a transaction"))?;
                context.set("transaction", transaction);

                if status == "otp" {
                    let phone = answer["phone"].as_str().map(ToString::to_string);
                    Ok(Step::ask(
                        "otp",
                        InteractionRequest::sms_otp("otp", phone, "Enter the code received by SMS"),
                    ))
                } else {
                    let message = answer["message"]
                        .as_str()
                        .unwrap_or("Confirm the login in your Fakebank app");
                    Ok(Step::poll("app", InteractionRequest::app_validation(message)))
                }
            }
            other => Err(AuthError::AuthMethodNotImplemented {
                message: format!("login answered '{other}'"),
            }),
        }
    }

    async fn handle_step(
        &mut self,
        step: &str,
        input: &InteractionInput,
        context: &mut FlowContext,
    ) -> Result<Step> {
        let transaction = context.require_str("transaction")?.to_string();
        match step {
            "otp" => {
                let code = input.get("otp").map(String::as_str).unwrap_or_default();
                let answer = self
                    .post(
                        "/api/otp",
                        RequestOptions::new().form([("transaction", transaction.as_str()), ("code", code)]),
                    )
                    .await?;
                match pages::status(&answer) {
                    "ok" => Ok(Step::Done),
                    other => Err(AuthError::Assertion(format!("OTP check answered '{other}'"))),
                }
            }
            "app" => {
                self.post(
                    &format!("/api/validation/{transaction}/confirm"),
                    RequestOptions::new().form([("transaction", transaction.as_str())]),
                )
                .await?;
                Ok(Step::Done)
            }
            other => Err(AuthError::Assertion(format!("unknown login step '{other}'"))),
        }
    }

    async fn poll_step(&mut self, _step: &str, context: &mut FlowContext) -> Result<ValidationStatus> {
        let transaction = context.require_str("transaction")?.to_string();
        let response = self
            .browser
            .open(&format!("/api/validation/{transaction}"), RequestOptions::new())
            .await
            .map_err(translate)?;
        let answer = json_body(&response)?;

        Ok(match pages::status(&answer) {
            "pending" => ValidationStatus::Pending,
            "validated" => ValidationStatus::Completed,
            "cancelled" => ValidationStatus::Cancelled,
            "expired" => ValidationStatus::Timeout,
            other => ValidationStatus::Other(other.to_string()),
        })
    }
}

pub struct FakeBankBrowser {
    site: Site,
    flow: LoginFlow,
    policy: FlowPolicy,
    pending_input: Option<InteractionInput>,
    /// Code from the configuration, used once to resume a suspended login
    configured_otp: Option<Zeroizing<String>>,
}

impl FakeBankBrowser {
    pub fn new(
        base_url: &str,
        transport: Arc<dyn HttpTransport>,
        options: BrowserOptions,
        credentials: (String, Zeroizing<String>),
        policy: FlowPolicy,
    ) -> trawl_browser::Result<Self> {
        let resolver = Arc::new(pages::resolver(base_url)?);
        Ok(Self::with_resolver(resolver, transport, options, credentials, policy))
    }

    pub fn with_resolver(
        resolver: Arc<PageResolver<FakePage>>,
        transport: Arc<dyn HttpTransport>,
        options: BrowserOptions,
        (login, password): (String, Zeroizing<String>),
        policy: FlowPolicy,
    ) -> Self {
        let options = options.persist_fields(&[PENDING_TRANSFER, PENDING_RECIPIENT]);
        Self {
            site: Site {
                browser: Browser::new(resolver, transport, options),
                login,
                password,
            },
            flow: LoginFlow::new(policy),
            policy,
            pending_input: None,
            configured_otp: None,
        }
    }

    pub fn set_configured_otp(&mut self, code: Option<Zeroizing<String>>) {
        self.configured_otp = code;
    }

    pub fn provide_input(&mut self, input: InteractionInput) {
        self.pending_input
            .get_or_insert_with(InteractionInput::new)
            .extend(input);
    }

    pub fn flow(&self) -> &LoginFlow {
        &self.flow
    }

    pub fn browser(&self) -> &Browser<FakePage> {
        &self.site.browser
    }

    pub fn dump_state(&self) -> StateMap {
        let mut state = self.site.browser.dump_state();
        state.insert(FLOW_KEY.to_string(), self.flow.to_value());
        state
    }

    pub async fn load_state(&mut self, state: &StateMap) -> Result<()> {
        if let Some(flow) = state.get(FLOW_KEY) {
            self.flow = LoginFlow::from_value(flow.clone(), self.policy)?;
        }
        self.site.browser.load_state(state).await?;
        Ok(())
    }

    fn take_login_input(&mut self) -> Option<InteractionInput> {
        if let Some(input) = self.pending_input.take() {
            return Some(input);
        }
        if !self.flow.is_suspended() {
            return None;
        }
        self.configured_otp
            .take()
            .map(|code| InteractionInput::from([("otp".to_string(), code.as_str().to_string())]))
    }

    pub async fn iter_accounts(&mut self) -> Result<Vec<Account>> {
        let page = self
            .site
            .browser
            .stay_or_go(FakePage::Accounts, &UrlParams::new())
            .await
            .map_err(translate)?;
        pages::check_available(page)?;
        pages::parse_accounts(page.json())
    }

    pub async fn iter_history(&mut self, account_id: &str) -> Result<Vec<Transaction>> {
        let first = self
            .site
            .browser
            .resolver()
            .url_for(FakePage::History, &params([("id", account_id)]))?;

        self.site
            .browser
            .pagination(&first, |page| {
                pages::check_available(page)?;
                pages::parse_transactions(page.json(), false)
            })
            .await
            .map_err(translate_auth)
    }

    pub async fn iter_coming(&mut self, account_id: &str) -> Result<Vec<Transaction>> {
        let json = self
            .site
            .get_page(FakePage::Coming, &params([("id", account_id)]))
            .await?;
        pages::parse_transactions(&json, true).map(|(transactions, _)| transactions)
    }

    pub async fn get_profile(&mut self) -> Result<Profile> {
        let json = self.site.get_page(FakePage::Profile, &UrlParams::new()).await?;
        pages::parse_profile(&json)
    }

    pub async fn iter_recipients(&mut self, account_id: &str) -> Result<Vec<Recipient>> {
        let json = self
            .site
            .get_page(FakePage::Recipients, &params([("id", account_id)]))
            .await?;
        pages::parse_recipients(&json)
    }

    pub async fn iter_subscriptions(&mut self) -> Result<Vec<Subscription>> {
        let json = self
            .site
            .get_page(FakePage::Subscriptions, &UrlParams::new())
            .await?;
        pages::parse_subscriptions(&json)
    }

    pub async fn iter_documents(&mut self, subscription_id: &str) -> Result<Vec<Document>> {
        let json = self
            .site
            .get_page(FakePage::Documents, &params([("id", subscription_id)]))
            .await?;
        pages::parse_documents(&json)
    }

    pub async fn download(&mut self, url: &str) -> Result<Vec<u8>> {
        let response = self
            .site
            .browser
            .open(url, RequestOptions::new())
            .await
            .map_err(translate)?;
        Ok(response.body)
    }

    /// Create the transfer on the site, or return the one already pending for
    /// the same order.
    pub async fn init_transfer(&mut self, transfer: &Transfer) -> Result<Transfer> {
        if let Some(pending) = self.pending_transfer()? {
            if same_order(&pending, transfer) {
                tracing::debug!(id = ?pending.id, "reusing pending transfer");
                return Ok(pending);
            }
        }

        let answer = self
            .site
            .post(
                &format!("/api/accounts/{}/transfers", transfer.account_id),
                RequestOptions::new().json(json!({
                    "recipient": transfer.recipient_id,
                    "amount": transfer.amount.to_string(),
                    "label": transfer.label,
                    "exec_date": transfer.exec_date,
                })),
            )
            .await?;

        let mut created = transfer.clone();
        created.id = Some(
            answer["id"]
                .as_str()
                .ok_or_else(|| AuthError::assertion("created transfer has no id"))?
                .to_string(),
        );
        created.fees = match answer["fees"].as_str() {
            Some(fees) => Some(
                fees.parse::<Amount>()
                    .map_err(|e| AuthError::Assertion(e.to_string()))?,
            ),
            None => None,
        };
        created.exec_date = answer["exec_date"]
            .as_str()
            .and_then(|d| d.parse().ok())
            .or(transfer.exec_date);
        created.status = TransferStatus::Draft;

        self.set_session_field(
            PENDING_TRANSFER,
            serde_json::to_value(&created).unwrap_or(Value::Null),
        )?;
        tracing::info!(id = ?created.id, "transfer created");
        Ok(created)
    }

    /// Execute a created transfer; asks for a code when the site wants one.
    pub async fn execute_transfer(&mut self, transfer: &Transfer, input: &InteractionInput) -> Result<Transfer> {
        let id = transfer
            .id
            .as_deref()
            .ok_or_else(|| AuthError::assertion("transfer was not initialised"))?;

        let mut form = Vec::new();
        if let Some(code) = input.get(CODE_FIELD) {
            form.push((CODE_FIELD, code.as_str()));
        }
        let answer = self
            .site
            .post(&format!("/api/transfers/{id}/execute"), RequestOptions::new().form(form))
            .await?;

        let mut done = transfer.clone();
        done.status = match pages::status(&answer) {
            "executed" => TransferStatus::Executed,
            "pending" => TransferStatus::Pending,
            "rejected" => TransferStatus::Rejected,
            "confirmation_required" => {
                let message = answer["message"]
                    .as_str()
                    .unwrap_or("Enter the code received by SMS to confirm the transfer");
                return Err(AuthError::InteractionRequired(Box::new(
                    InteractionRequest::TransferStep {
                        fields: vec![code_field("Confirmation code")],
                        message: message.to_string(),
                        resource: serde_json::to_value(transfer).unwrap_or(Value::Null),
                    },
                )));
            }
            other => return Err(AuthError::Assertion(format!("transfer answered '{other}'"))),
        };

        self.set_session_field(PENDING_TRANSFER, Value::Null)?;
        tracing::info!(id = %id, status = ?done.status, "transfer executed");
        Ok(done)
    }

    /// Add a recipient; the site confirms new recipients with a code.
    pub async fn new_recipient(
        &mut self,
        account_id: &str,
        recipient: &Recipient,
        input: &InteractionInput,
    ) -> Result<Recipient> {
        let pending = self
            .site
            .browser
            .session()
            .field(PENDING_RECIPIENT)
            .and_then(|v| serde_json::from_value::<Recipient>(v.clone()).ok());

        if let (Some(pending), Some(code)) = (pending, input.get(CODE_FIELD)) {
            let answer = self
                .site
                .post(
                    &format!("/api/recipients/{}/confirm", pending.id),
                    RequestOptions::new().form([(CODE_FIELD, code.as_str())]),
                )
                .await?;
            self.set_session_field(PENDING_RECIPIENT, Value::Null)?;
            let mut added = pending;
            added.enabled = pages::status(&answer) == "active";
            tracing::info!(id = %added.id, "recipient added");
            return Ok(added);
        }

        let answer = self
            .site
            .post(
                &format!("/api/accounts/{account_id}/recipients"),
                RequestOptions::new().json(json!({
                    "label": recipient.label,
                    "iban": recipient.iban,
                })),
            )
            .await?;

        let mut created = recipient.clone();
        created.id = answer["id"]
            .as_str()
            .ok_or_else(|| AuthError::assertion("created recipient has no id"))?
            .to_string();

        if pages::status(&answer) == "active" {
            return Ok(created);
        }

        created.enabled = false;
        let resource = serde_json::to_value(&created).unwrap_or(Value::Null);
        self.set_session_field(PENDING_RECIPIENT, resource.clone())?;
        Err(AuthError::InteractionRequired(Box::new(
            InteractionRequest::AddRecipientStep {
                fields: vec![code_field("Code received by SMS")],
                message: "Enter the code received by SMS to add the recipient".to_string(),
                resource,
            },
        )))
    }

    fn pending_transfer(&self) -> Result<Option<Transfer>> {
        self.site
            .browser
            .session()
            .field(PENDING_TRANSFER)
            .map(|v| {
                serde_json::from_value(v.clone())
                    .map_err(|e| AuthError::Assertion(format!("invalid pending transfer: {e}")))
            })
            .transpose()
    }

    fn set_session_field(&mut self, name: &str, value: Value) -> Result<()> {
        self.site
            .browser
            .session_mut()
            .set_field(name, value)
            .map_err(AuthError::from)
    }
}

fn same_order(pending: &Transfer, wanted: &Transfer) -> bool {
    pending.account_id == wanted.account_id
        && pending.recipient_id == wanted.recipient_id
        && pending.amount == wanted.amount
        && pending.label == wanted.label
}

#[async_trait]
impl Authenticator for FakeBankBrowser {
    fn logged(&self) -> bool {
        self.site.browser.status() == BrowserStatus::LoggedIn
    }

    async fn do_login(&mut self) -> Result<()> {
        let input = self.take_login_input();
        self.site.browser.mark_logged(false);
        self.flow
            .drive(&mut self.site, input.as_ref())
            .await
            .map_err(translate_auth)?;
        self.site.browser.mark_logged(true);
        Ok(())
    }
}
