use super::*;
use serde_json::json;
use std::collections::BTreeMap;
use trawl_auth::InteractionRequest;
use trawl_backend::{bank, bank_transfer, documents, profile, AccountType, Amount, ErrorKind, TransferStatus};
use trawl_browser::mock::{MockResponse, MockTransport};
use trawl_browser::{Method, RequestBody};
use trawl_core::{AuthConfig, BackendName, BrowserConfig};

const BASE: &str = "https://fakebank.example";

fn url(path: &str) -> String {
    format!("{BASE}{path}")
}

fn instance(mock: &Arc<MockTransport>) -> Box<dyn BackendInstance> {
    let raw = BTreeMap::from([
        ("login".to_string(), "12345678".to_string()),
        ("password".to_string(), "hunter2".to_string()),
    ]);
    let config = FakeBankModule.schema().validate("fb", &raw).expect("valid config");
    FakeBankModule
        .create_instance(InstanceContext {
            backend: BackendName::new("fb").expect("valid name"),
            config: Arc::new(config),
            browser: BrowserConfig {
                max_retries: 0,
                ..BrowserConfig::default()
            },
            auth: AuthConfig::default(),
            transport: mock.clone(),
        })
        .expect("instance")
}

fn login_answer(mock: &MockTransport, answer: serde_json::Value) {
    mock.on_post(&url("/api/login"), MockResponse::json(&answer));
}

fn accounts(mock: &MockTransport) {
    mock.on_get(
        &url("/api/accounts"),
        MockResponse::json(&json!({
            "accounts": [
                {"id": "1", "label": "Compte courant", "type": "checking", "balance": "1520.30"},
                {"id": "2", "label": "Livret A", "type": "savings", "balance": "10000"}
            ]
        })),
    );
}

fn error(status: u16, code: &str) -> MockResponse {
    MockResponse::json(&json!({"error": code})).with_status(status)
}

fn otp(code: &str) -> InteractionInput {
    InteractionInput::from([("otp".to_string(), code.to_string())])
}

fn checking() -> Account {
    Account {
        id: "1".to_string(),
        label: "Compte courant".to_string(),
        kind: AccountType::Checking,
        balance: Amount::from_cents(152_030),
        currency: "EUR".to_string(),
        iban: None,
        coming: None,
    }
}

#[test]
fn test_schema() {
    let schema = FakeBankModule.schema();
    let config = schema
        .validate(
            "fb",
            &BTreeMap::from([
                ("login".to_string(), "12345678".to_string()),
                ("password".to_string(), "hunter2".to_string()),
            ]),
        )
        .expect("valid");
    assert_eq!(config.get("base_url"), Some(DEFAULT_BASE_URL));
    assert!(config.is_masked("password"));

    let err = schema
        .validate("fb", &BTreeMap::from([("login".to_string(), "jane".to_string())]))
        .expect_err("bad login, no password");
    match err {
        BackendError::Configuration { bad_fields, .. } => {
            let ids: Vec<&str> = bad_fields.iter().map(|f| f.field.as_str()).collect();
            assert_eq!(ids, vec!["login", "password"]);
        }
        other => panic!("unexpected error {other}"),
    }
}

#[tokio::test]
async fn test_password_login_then_accounts() {
    let mock = MockTransport::shared();
    login_answer(&mock, json!({"status": "ok"}));
    accounts(&mock);
    let mut fb = instance(&mock);

    let list = bank(fb.as_mut())
        .expect("bank")
        .iter_accounts()
        .await
        .expect("accounts");
    assert_eq!(list.len(), 2);
    assert_eq!(list[0].balance, Amount::from_cents(152_030));

    // still logged and already on the accounts page
    bank(fb.as_mut()).expect("bank").iter_accounts().await.expect("accounts");
    assert_eq!(mock.request_count(Method::Post, &url("/api/login")), 1);
    assert_eq!(mock.request_count(Method::Get, &url("/api/accounts")), 1);

    let Some(RequestBody::Form(form)) = mock.requests()[0].body.clone() else {
        panic!("login is a form post");
    };
    assert!(form.contains(&("login".to_string(), "12345678".to_string())));
}

#[tokio::test]
async fn test_wrong_password() {
    let mock = MockTransport::shared();
    mock.on_post(&url("/api/login"), error(401, "wrong_password"));
    let mut fb = instance(&mock);

    let err = bank(fb.as_mut())
        .expect("bank")
        .iter_accounts()
        .await
        .expect_err("refused");
    assert_eq!(err.kind(), ErrorKind::IncorrectPassword);
}

#[tokio::test]
async fn test_otp_login_resumes_without_resending() {
    let mock = MockTransport::shared();
    login_answer(
        &mock,
        json!({"status": "otp", "transaction": "tx-1", "phone": "06 ** ** ** 42"}),
    );
    mock.on_post(&url("/api/otp"), error(401, "wrong_otp"))
        .on_post(&url("/api/otp"), MockResponse::json(&json!({"status": "ok"})));
    accounts(&mock);
    let mut fb = instance(&mock);

    let err = bank(fb.as_mut())
        .expect("bank")
        .iter_accounts()
        .await
        .expect_err("code needed");
    let request = err.interaction().expect("interaction");
    assert!(request.is_otp());
    assert_eq!(request.medium_label(), Some("06 ** ** ** 42"));

    fb.provide_input(otp("000000"));
    let err = bank(fb.as_mut())
        .expect("bank")
        .iter_accounts()
        .await
        .expect_err("wrong code");
    assert_eq!(err.kind(), ErrorKind::IncorrectPassword);

    fb.provide_input(otp("123456"));
    bank(fb.as_mut())
        .expect("bank")
        .iter_accounts()
        .await
        .expect("logged in");
    assert_eq!(mock.request_count(Method::Post, &url("/api/login")), 1);
    assert_eq!(mock.request_count(Method::Post, &url("/api/otp")), 2);
}

#[tokio::test]
async fn test_suspended_login_survives_a_restart() {
    let mock = MockTransport::shared();
    login_answer(&mock, json!({"status": "otp", "transaction": "tx-1"}));
    mock.on_post(&url("/api/otp"), MockResponse::json(&json!({"status": "ok"})));
    accounts(&mock);

    let mut first = instance(&mock);
    assert!(bank(first.as_mut())
        .expect("bank")
        .iter_accounts()
        .await
        .is_err());
    let state = first.dump_state();
    assert!(state.contains_key("login_flow"));

    let mut second = instance(&mock);
    second.load_state(&state).await.expect("restore");
    second.provide_input(otp("123456"));
    bank(second.as_mut())
        .expect("bank")
        .iter_accounts()
        .await
        .expect("logged in");
    assert_eq!(mock.request_count(Method::Post, &url("/api/login")), 1);

    let otp_post = mock
        .requests()
        .into_iter()
        .find(|r| r.url == url("/api/otp"))
        .expect("code sent");
    let Some(RequestBody::Form(form)) = otp_post.body else {
        panic!("otp is a form post");
    };
    assert!(form.contains(&("transaction".to_string(), "tx-1".to_string())));
}

#[tokio::test(start_paused = true)]
async fn test_app_validation_is_polled() {
    let mock = MockTransport::shared();
    login_answer(&mock, json!({"status": "app", "transaction": "tx-2"}));
    let poll = url("/api/validation/tx-2");
    mock.on_get(&poll, MockResponse::json(&json!({"status": "pending"})))
        .on_get(&poll, MockResponse::json(&json!({"status": "pending"})))
        .on_get(&poll, MockResponse::json(&json!({"status": "validated"})));
    mock.on_post(
        &url("/api/validation/tx-2/confirm"),
        MockResponse::json(&json!({"status": "ok"})),
    );
    accounts(&mock);
    let mut fb = instance(&mock);

    let err = bank(fb.as_mut())
        .expect("bank")
        .iter_accounts()
        .await
        .expect_err("validation needed");
    assert!(err.interaction().is_some_and(InteractionRequest::is_decoupled));

    // resumed without input
    bank(fb.as_mut())
        .expect("bank")
        .iter_accounts()
        .await
        .expect("validated");
    assert_eq!(mock.request_count(Method::Get, &poll), 3);
}

#[tokio::test(start_paused = true)]
async fn test_cancelled_app_validation() {
    let mock = MockTransport::shared();
    login_answer(&mock, json!({"status": "app", "transaction": "tx-3"}));
    mock.on_get(
        &url("/api/validation/tx-3"),
        MockResponse::json(&json!({"status": "cancelled"})),
    );
    let mut fb = instance(&mock);

    let _ = bank(fb.as_mut()).expect("bank").iter_accounts().await;
    let err = bank(fb.as_mut())
        .expect("bank")
        .iter_accounts()
        .await
        .expect_err("cancelled");
    assert_eq!(err.kind(), ErrorKind::IncorrectPassword);
}

#[tokio::test]
async fn test_paginated_history() {
    let mock = MockTransport::shared();
    login_answer(&mock, json!({"status": "ok"}));
    mock.on_get(
        &url("/api/accounts/1/transactions"),
        MockResponse::json(&json!({
            "transactions": [
                {"id": "t1", "date": "2026-10-02", "label": "CB BOULANGERIE", "amount": "-4.20", "type": "card"},
                {"id": "t2", "date": "2026-10-01", "label": "VIR SALAIRE", "amount": "2100.00", "type": "transfer"}
            ],
            "next_page": "/api/accounts/1/transactions?page=2"
        })),
    );
    mock.on_get(
        &url("/api/accounts/1/transactions?page=2"),
        MockResponse::json(&json!({
            "transactions": [
                {"id": "t3", "date": "2026-09-28", "label": "PRLV EDF", "amount": "-61.00"}
            ],
            "next_page": null
        })),
    );
    let mut fb = instance(&mock);

    let history = bank(fb.as_mut())
        .expect("bank")
        .iter_history(&checking())
        .await
        .expect("history");
    let ids: Vec<&str> = history.iter().filter_map(|t| t.id.as_deref()).collect();
    assert_eq!(ids, vec!["t1", "t2", "t3"]);
    assert_eq!(history[2].amount, Amount::from_cents(-6100));
}

#[tokio::test]
async fn test_expired_session_logs_in_again() {
    let mock = MockTransport::shared();
    login_answer(&mock, json!({"status": "ok"}));
    mock.on_get(&url("/api/profile"), error(401, "session_expired"))
        .on_get(
            &url("/api/profile"),
            MockResponse::json(&json!({"id": "c1", "name": "Jane Doe", "email": "jane@example.org"})),
        );
    let mut fb = instance(&mock);

    let me = profile(fb.as_mut())
        .expect("profile")
        .get_profile()
        .await
        .expect("profile");
    assert_eq!(me.name, "Jane Doe");
    assert_eq!(mock.request_count(Method::Post, &url("/api/login")), 2);
}

#[tokio::test]
async fn test_maintenance_page_is_unavailable() {
    let mock = MockTransport::shared();
    login_answer(&mock, json!({"status": "ok"}));
    mock.on_get(
        &url("/api/accounts"),
        MockResponse::json(&json!({"maintenance": "Back at 6am"})),
    );
    let mut fb = instance(&mock);

    let err = bank(fb.as_mut())
        .expect("bank")
        .iter_accounts()
        .await
        .expect_err("maintenance");
    assert_eq!(err.kind(), ErrorKind::Unavailable);
    assert!(err.to_string().contains("Back at 6am"));
}

async fn send_transfer(
    fb: &mut dyn BackendInstance,
    input: &InteractionInput,
) -> trawl_backend::Result<Transfer> {
    let order = Transfer::new("1", "r1", "12.50".parse().expect("amount"), "rent");
    let transfers = bank_transfer(fb)?;
    let created = transfers.init_transfer(&order, input).await?;
    transfers.execute_transfer(&created, input).await
}

#[tokio::test]
async fn test_transfer_confirmed_by_code() {
    let mock = MockTransport::shared();
    login_answer(&mock, json!({"status": "ok"}));
    accounts(&mock);
    mock.on_post(
        &url("/api/accounts/1/transfers"),
        MockResponse::json(&json!({"id": "tr-1", "status": "draft", "fees": "0.50"})),
    );
    let execute = url("/api/transfers/tr-1/execute");
    mock.on_post(
        &execute,
        MockResponse::json(&json!({"status": "confirmation_required"})),
    )
    .on_post(&execute, MockResponse::json(&json!({"status": "executed"})));
    let mut fb = instance(&mock);

    let err = send_transfer(fb.as_mut(), &InteractionInput::new())
        .await
        .expect_err("confirmation");
    let Some(InteractionRequest::TransferStep { fields, resource, .. }) = err.interaction() else {
        panic!("expected a transfer step, got {err}");
    };
    assert_eq!(fields[0].id, "code");
    assert_eq!(resource["id"], "tr-1");

    // the same order again, now with the code
    let code = InteractionInput::from([("code".to_string(), "4242".to_string())]);
    let done = send_transfer(fb.as_mut(), &code).await.expect("executed");
    assert_eq!(done.status, TransferStatus::Executed);
    assert_eq!(done.fees, Some(Amount::from_cents(50)));
    assert_eq!(mock.request_count(Method::Post, &url("/api/accounts/1/transfers")), 1);

    let Some(RequestBody::Form(form)) = mock.last_request().and_then(|r| r.body) else {
        panic!("execute is a form post");
    };
    assert_eq!(form, vec![("code".to_string(), "4242".to_string())]);
}

#[tokio::test]
async fn test_transfer_to_unknown_account() {
    let mock = MockTransport::shared();
    login_answer(&mock, json!({"status": "ok"}));
    accounts(&mock);
    let mut fb = instance(&mock);

    let order = Transfer::new("9", "r1", Amount::from_cents(100), "rent");
    let err = bank_transfer(fb.as_mut())
        .expect("transfer")
        .init_transfer(&order, &InteractionInput::new())
        .await
        .expect_err("no such account");
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[tokio::test]
async fn test_new_recipient_needs_code() {
    let mock = MockTransport::shared();
    login_answer(&mock, json!({"status": "ok"}));
    mock.on_post(
        &url("/api/accounts/1/recipients"),
        MockResponse::json(&json!({"id": "r9", "status": "pending_otp"})),
    );
    mock.on_post(
        &url("/api/recipients/r9/confirm"),
        MockResponse::json(&json!({"status": "active"})),
    );
    let mut fb = instance(&mock);

    let wanted = Recipient {
        id: String::new(),
        label: "Landlord".to_string(),
        iban: Some("FR7630006000011234567890189".to_string()),
        bank_name: None,
        enabled: true,
    };

    let err = bank_transfer(fb.as_mut())
        .expect("transfer")
        .new_recipient("1", &wanted, &InteractionInput::new())
        .await
        .expect_err("code needed");
    assert!(matches!(
        err.interaction(),
        Some(InteractionRequest::AddRecipientStep { .. })
    ));

    let code = InteractionInput::from([("code".to_string(), "777".to_string())]);
    let added = bank_transfer(fb.as_mut())
        .expect("transfer")
        .new_recipient("1", &wanted, &code)
        .await
        .expect("added");
    assert_eq!(added.id, "r9");
    assert!(added.enabled);
}

#[tokio::test]
async fn test_documents_download() {
    let mock = MockTransport::shared();
    login_answer(&mock, json!({"status": "ok"}));
    mock.on_get(
        &url("/api/subscriptions"),
        MockResponse::json(&json!({"subscriptions": [{"id": "s1", "label": "Compte courant"}]})),
    );
    mock.on_get(
        &url("/api/subscriptions/s1/documents"),
        MockResponse::json(&json!({
            "documents": [
                {"id": "d1", "label": "Relevé octobre", "date": "2026-10-01", "type": "statement",
                 "url": "/api/documents/d1/download"}
            ]
        })),
    );
    mock.on_get(
        &url("/api/documents/d1/download"),
        MockResponse::status(200).with_body(b"%PDF-1.7".to_vec()),
    );
    let mut fb = instance(&mock);

    let docs = documents(fb.as_mut()).expect("documents");
    let document = docs.get_document("d1").await.expect("found");
    assert_eq!(document.format, "pdf");
    let bytes = docs.download_document(&document).await.expect("download");
    assert_eq!(bytes, b"%PDF-1.7");
}
