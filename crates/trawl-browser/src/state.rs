//! Persistable browser session.
//!
//! A session dumps to a flat JSON map: `url`, `cookies`, one entry per
//! allow-listed field that currently has a value, and `expire` when the
//! session has a limited lifetime.

use crate::cookies::CookieJar;
use crate::error::{BrowserError, Result};
use crate::transport::HeaderMap;
use chrono::{DateTime, Duration, Utc};
use serde_json::Value;
use std::collections::BTreeMap;

/// Flat persisted state.
pub type StateMap = BTreeMap<String, Value>;

const URL_KEY: &str = "url";
const COOKIES_KEY: &str = "cookies";
const EXPIRE_KEY: &str = "expire";

/// What [`BrowserSession::restore`] found in a state map.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Restored {
    /// The state expired; nothing was loaded.
    Expired,
    /// State loaded; the session should go back to `url` if any.
    Loaded { url: Option<String> },
}

#[derive(Debug, Clone, Default)]
pub struct BrowserSession {
    pub cookies: CookieJar,
    pub headers: HeaderMap,
    pub url: Option<String>,
    allowed: Vec<String>,
    fields: BTreeMap<String, Value>,
}

impl BrowserSession {
    /// Session persisting the given extra fields.
    pub fn new<S: AsRef<str>>(allowed_fields: &[S]) -> Self {
        Self {
            allowed: allowed_fields
                .iter()
                .map(|f| f.as_ref().to_string())
                .collect(),
            ..Self::default()
        }
    }

    pub fn allowed_fields(&self) -> &[String] {
        &self.allowed
    }

    /// Set an allow-listed field. `Null` clears it.
    pub fn set_field(&mut self, name: &str, value: Value) -> Result<()> {
        if !self.allowed.iter().any(|f| f == name) {
            return Err(BrowserError::State(format!(
                "field '{name}' is not part of the persisted state"
            )));
        }
        if value.is_null() {
            self.fields.remove(name);
        } else {
            self.fields.insert(name.to_string(), value);
        }
        Ok(())
    }

    pub fn field(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    pub fn take_field(&mut self, name: &str) -> Option<Value> {
        self.fields.remove(name)
    }

    /// Snapshot the session, stamped with an expiry `lifetime` from now.
    pub fn dump(&self, lifetime: Option<Duration>) -> StateMap {
        let mut state = StateMap::new();
        if let Some(url) = &self.url {
            state.insert(URL_KEY.to_string(), Value::String(url.clone()));
        }
        if let Ok(cookies) = serde_json::to_value(&self.cookies) {
            state.insert(COOKIES_KEY.to_string(), cookies);
        }
        for (name, value) in &self.fields {
            state.insert(name.clone(), value.clone());
        }
        if let Some(lifetime) = lifetime {
            state.insert(
                EXPIRE_KEY.to_string(),
                Value::String((Utc::now() + lifetime).to_rfc3339()),
            );
        }
        state
    }

    /// Load cookies and allow-listed fields from `state`.
    ///
    /// Unknown keys are ignored so states written by newer versions still load.
    pub fn restore(&mut self, state: &StateMap) -> Result<Restored> {
        if let Some(expire) = state.get(EXPIRE_KEY) {
            let at = expire
                .as_str()
                .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
                .ok_or_else(|| BrowserError::State(format!("invalid expire value: {expire}")))?;
            if at.with_timezone(&Utc) <= Utc::now() {
                tracing::debug!(expire = %at, "ignoring expired browser state");
                return Ok(Restored::Expired);
            }
        }

        if let Some(cookies) = state.get(COOKIES_KEY) {
            self.cookies = serde_json::from_value(cookies.clone())
                .map_err(|e| BrowserError::State(format!("invalid cookies: {e}")))?;
        }

        for name in &self.allowed {
            match state.get(name) {
                Some(value) if !value.is_null() => {
                    self.fields.insert(name.clone(), value.clone());
                }
                _ => {
                    self.fields.remove(name);
                }
            }
        }

        let url = state
            .get(URL_KEY)
            .and_then(Value::as_str)
            .map(ToString::to_string);
        Ok(Restored::Loaded { url })
    }

    /// Forget cookies, fields and location; keep the allow-list and headers.
    pub fn clear(&mut self) {
        self.cookies.clear();
        self.fields.clear();
        self.url = None;
    }
}
