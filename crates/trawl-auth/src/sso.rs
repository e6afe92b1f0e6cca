//! OAuth2 redirect single sign-on, with optional PKCE.
//!
//! The login suspends with an [`InteractionRequest::Redirect`] carrying the
//! authorization URI. The user completes the login in a real browser and
//! pastes back the URL the provider redirected to; resuming parses that
//! callback and exchanges the code for an access token.

use crate::error::{AuthError, Result};
use crate::flow::FlowContext;
use crate::interaction::{Field, InteractionRequest};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::Duration;
use rand::RngCore;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::OnceLock;
use trawl_browser::{Browser, BrowserError, PageKind, RequestOptions};
use trawl_core::Timestamp;
use url::Url;

const STATE_KEY: &str = "oauth_state";
const VERIFIER_KEY: &str = "pkce_verifier";

/// Field the callback URL is supplied in.
pub const CALLBACK_FIELD: &str = "callback_url";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OAuth2Config {
    pub authorization_url: String,
    pub token_url: String,
    pub client_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_secret: Option<String>,
    pub redirect_uri: String,
    #[serde(default)]
    pub scope: Vec<String>,
    #[serde(default)]
    pub pkce: bool,
}

/// PKCE verifier and its S256 challenge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pkce {
    pub verifier: String,
    pub challenge: String,
}

impl Pkce {
    pub fn generate() -> Self {
        let mut bytes = [0u8; 64];
        rand::thread_rng().fill_bytes(&mut bytes);
        Self::from_verifier(URL_SAFE_NO_PAD.encode(bytes))
    }

    pub fn from_verifier(verifier: String) -> Self {
        let challenge = URL_SAFE_NO_PAD.encode(Sha256::digest(verifier.as_bytes()));
        Self {
            verifier,
            challenge,
        }
    }
}

/// Tokens kept in the persisted browser state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenState {
    pub access_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    pub token_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<Timestamp>,
}

impl TokenState {
    pub fn is_expired(&self) -> bool {
        self.expires_at.is_some_and(|at| at.is_past())
    }

    /// `Authorization` header value.
    pub fn authorization(&self) -> String {
        format!("{} {}", self.token_type, self.access_token)
    }

    /// Parse a token endpoint response, keeping `previous_refresh` when the
    /// provider does not rotate refresh tokens.
    pub fn from_response(response: &Value, previous_refresh: Option<String>) -> Result<Self> {
        let access_token = response
            .get("access_token")
            .and_then(Value::as_str)
            .ok_or_else(|| AuthError::Assertion("token response without access_token".to_string()))?;
        let token_type = response
            .get("token_type")
            .and_then(Value::as_str)
            .map_or_else(|| "Bearer".to_string(), capitalize);
        let expires_in = response.get("expires_in").and_then(|v| {
            v.as_i64()
                .or_else(|| v.as_str().and_then(|s| s.parse().ok()))
        });

        Ok(Self {
            access_token: access_token.to_string(),
            refresh_token: response
                .get("refresh_token")
                .and_then(Value::as_str)
                .map(ToString::to_string)
                .or(previous_refresh),
            token_type,
            expires_at: expires_in.map(|secs| Timestamp::now().plus(Duration::seconds(secs))),
        })
    }
}

fn capitalize(s: &str) -> String {
    let lower = s.to_ascii_lowercase();
    let mut chars = lower.chars();
    match chars.next() {
        Some(first) => first.to_ascii_uppercase().to_string() + chars.as_str(),
        None => String::new(),
    }
}

fn wrongpass_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(
            "operation canceled by the client|login cancelled|consent denied|psu cancelled the transaction",
        )
        .expect("valid regex")
    })
}

/// Map the `error` parameters of a callback to a domain error.
pub fn callback_error(error: &str, description: Option<&str>) -> AuthError {
    match (error, description.filter(|d| !d.is_empty())) {
        ("access_denied", Some(message)) if wrongpass_pattern().is_match(&message.to_lowercase()) => {
            AuthError::incorrect_password(message)
        }
        ("access_denied", Some(message)) => {
            AuthError::Assertion(format!("unhandled callback error message: {message}"))
        }
        ("access_denied", None) => AuthError::incorrect_password(""),
        ("server_error", _) => AuthError::Browser(BrowserError::Unavailable {
            url: String::new(),
            reason: "authorization server error".to_string(),
        }),
        (other, message) => AuthError::Assertion(format!(
            "unhandled callback error: {other}, message: {}",
            message.unwrap_or("none")
        )),
    }
}

#[derive(Debug, Clone)]
pub struct OAuth2Client {
    config: OAuth2Config,
}

impl OAuth2Client {
    pub fn new(config: OAuth2Config) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &OAuth2Config {
        &self.config
    }

    /// Authorization URI for `state`, with the PKCE challenge when enabled.
    pub fn authorization_uri(&self, state: &str, pkce: Option<&Pkce>) -> Result<String> {
        let mut url = Url::parse(&self.config.authorization_url).map_err(|e| {
            BrowserError::InvalidUrl {
                url: self.config.authorization_url.clone(),
                reason: e.to_string(),
            }
        })?;
        {
            let mut query = url.query_pairs_mut();
            query
                .append_pair("response_type", "code")
                .append_pair("client_id", &self.config.client_id)
                .append_pair("redirect_uri", &self.config.redirect_uri)
                .append_pair("state", state);
            if !self.config.scope.is_empty() {
                query.append_pair("scope", &self.config.scope.join(" "));
            }
            if let Some(pkce) = pkce {
                query
                    .append_pair("code_challenge_method", "S256")
                    .append_pair("code_challenge", &pkce.challenge);
            }
        }
        Ok(url.to_string())
    }

    /// Start an authorization: remember state and verifier in `context` and
    /// return the redirect request for the user.
    pub fn request_authorization(&self, context: &mut FlowContext) -> Result<InteractionRequest> {
        let mut nonce = [0u8; 16];
        rand::thread_rng().fill_bytes(&mut nonce);
        let state = URL_SAFE_NO_PAD.encode(nonce);

        let pkce = self.config.pkce.then(Pkce::generate);
        let url = self.authorization_uri(&state, pkce.as_ref())?;

        context.set(STATE_KEY, state);
        if let Some(pkce) = pkce {
            context.set(VERIFIER_KEY, pkce.verifier);
        }

        tracing::info!("requesting authorization");
        Ok(InteractionRequest::Redirect {
            url,
            field: Field::new(CALLBACK_FIELD, "URL you were redirected to"),
            message: "Log in with your browser, then paste the final URL".to_string(),
        })
    }

    /// Extract the authorization code from a callback URL.
    ///
    /// # Errors
    /// The provider's `error` is mapped by [`callback_error`]; a state that
    /// does not match the pending one is an assertion.
    pub fn parse_callback(&self, callback_url: &str, context: &FlowContext) -> Result<String> {
        let url = Url::parse(callback_url.trim()).map_err(|e| BrowserError::InvalidUrl {
            url: callback_url.to_string(),
            reason: e.to_string(),
        })?;
        let values: HashMap<String, String> = url.query_pairs().into_owned().collect();

        let Some(code) = values.get("code").filter(|c| !c.is_empty()) else {
            return Err(callback_error(
                values.get("error").map_or("", String::as_str),
                values.get("error_description").map(String::as_str),
            ));
        };

        if let Some(expected) = context.get_str(STATE_KEY) {
            if values.get("state").map(String::as_str) != Some(expected) {
                return Err(AuthError::Assertion("OAuth2 state mismatch".to_string()));
            }
        }

        Ok(code.clone())
    }

    /// Exchange an authorization code for tokens.
    pub async fn exchange_code<K: PageKind>(
        &self,
        browser: &mut Browser<K>,
        code: &str,
        context: &FlowContext,
    ) -> Result<TokenState> {
        let mut form = vec![
            ("grant_type".to_string(), "authorization_code".to_string()),
            ("code".to_string(), code.to_string()),
            ("redirect_uri".to_string(), self.config.redirect_uri.clone()),
        ];
        if let Some(verifier) = context.get_str(VERIFIER_KEY) {
            form.push(("code_verifier".to_string(), verifier.to_string()));
        }

        tracing::info!("requesting access token");
        let response = self.token_request(browser, form).await.map_err(|e| match e {
            AuthError::Browser(BrowserError::Http { .. }) => AuthError::Assertion(
                "logged in with the provider, but the access token request failed".to_string(),
            ),
            other => other,
        })?;
        TokenState::from_response(&response, None)
    }

    /// Renew tokens. A refused refresh token is reported as an incorrect
    /// password so the next login starts from the authorization again.
    pub async fn refresh<K: PageKind>(
        &self,
        browser: &mut Browser<K>,
        tokens: &TokenState,
    ) -> Result<TokenState> {
        let refresh_token = tokens
            .refresh_token
            .clone()
            .ok_or_else(|| AuthError::Assertion("no refresh token".to_string()))?;
        let form = vec![
            ("grant_type".to_string(), "refresh_token".to_string()),
            ("refresh_token".to_string(), refresh_token.clone()),
            ("redirect_uri".to_string(), self.config.redirect_uri.clone()),
        ];

        tracing::info!("refreshing token");
        let response = self.token_request(browser, form).await.map_err(|e| match e {
            AuthError::Browser(BrowserError::Http { status, .. }) if (400..500).contains(&status) => {
                AuthError::incorrect_password("refresh token refused")
            }
            other => other,
        })?;
        TokenState::from_response(&response, Some(refresh_token))
    }

    async fn token_request<K: PageKind>(
        &self,
        browser: &mut Browser<K>,
        mut form: Vec<(String, String)>,
    ) -> Result<Value> {
        form.push(("client_id".to_string(), self.config.client_id.clone()));
        if let Some(secret) = &self.config.client_secret {
            form.push(("client_secret".to_string(), secret.clone()));
        }

        let response = browser
            .open(&self.config.token_url, RequestOptions::new().form(form))
            .await?;
        serde_json::from_slice(&response.body)
            .map_err(|e| AuthError::Assertion(format!("invalid token response: {e}")))
    }
}
