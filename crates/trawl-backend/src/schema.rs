//! Module configuration schema and validated backend configuration.
//!
//! A module declares the values it needs as [`ConfigField`]s. Raw values from
//! the backends file are checked against the schema once, when the backend is
//! registered; modules then read them from a [`BackendConfig`].

use crate::error::{BadField, BackendError, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use zeroize::Zeroizing;

/// Prefix of private keys passed through without validation.
pub const PRIVATE_PREFIX: char = '_';

/// How a configuration value is stored and shown.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    /// Regular value
    #[default]
    Plain,
    /// Secret (password, token): redacted in output, wiped on drop
    Masked,
    /// Only valid for the current run (one-time code); never saved
    Transient,
}

/// One value a module needs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigField {
    pub id: String,
    pub label: String,
    #[serde(default)]
    pub kind: FieldKind,
    /// Whole-value pattern the value must match
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub regex: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub choices: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<String>,
    #[serde(default)]
    pub required: bool,
}

impl ConfigField {
    /// Required plain field.
    pub fn new(id: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
            kind: FieldKind::Plain,
            regex: None,
            choices: Vec::new(),
            default: None,
            required: true,
        }
    }

    #[must_use]
    pub fn masked(mut self) -> Self {
        self.kind = FieldKind::Masked;
        self
    }

    #[must_use]
    pub fn transient(mut self) -> Self {
        self.kind = FieldKind::Transient;
        self.required = false;
        self
    }

    #[must_use]
    pub fn regex(mut self, pattern: impl Into<String>) -> Self {
        self.regex = Some(pattern.into());
        self
    }

    #[must_use]
    pub fn choices<S: Into<String>>(mut self, choices: impl IntoIterator<Item = S>) -> Self {
        self.choices = choices.into_iter().map(Into::into).collect();
        self
    }

    /// Value used when the field is absent; makes the field optional.
    #[must_use]
    pub fn default_value(mut self, value: impl Into<String>) -> Self {
        self.default = Some(value.into());
        self.required = false;
        self
    }

    #[must_use]
    pub fn optional(mut self) -> Self {
        self.required = false;
        self
    }

    fn check(&self, value: &str) -> std::result::Result<(), String> {
        if !self.choices.is_empty() && !self.choices.iter().any(|c| c == value) {
            return Err(format!("not one of {}", self.choices.join(", ")));
        }
        if let Some(pattern) = &self.regex {
            let regex = Regex::new(&format!("^(?:{pattern})$"))
                .map_err(|e| format!("schema pattern does not compile: {e}"))?;
            if !regex.is_match(value) {
                return Err(format!("does not match {pattern}"));
            }
        }
        Ok(())
    }
}

/// Every field a module accepts, in display order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConfigSchema {
    fields: Vec<ConfigField>,
}

impl ConfigSchema {
    pub fn new(fields: Vec<ConfigField>) -> Self {
        Self { fields }
    }

    pub fn fields(&self) -> &[ConfigField] {
        &self.fields
    }

    pub fn field(&self, id: &str) -> Option<&ConfigField> {
        self.fields.iter().find(|f| f.id == id)
    }

    /// Validate `raw` for `backend`.
    ///
    /// Defaults fill absent optional fields and private `_` keys pass through.
    ///
    /// # Errors
    /// [`BackendError::Configuration`] listing every missing, unknown or
    /// invalid field.
    pub fn validate(&self, backend: &str, raw: &BTreeMap<String, String>) -> Result<BackendConfig> {
        let mut bad_fields = Vec::new();
        let mut values = BTreeMap::new();
        let mut private = BTreeMap::new();

        for (key, value) in raw {
            if key.starts_with(PRIVATE_PREFIX) {
                private.insert(key.clone(), value.clone());
            } else if self.field(key).is_none() {
                bad_fields.push(BadField::new(key, "unknown field"));
            }
        }

        for field in &self.fields {
            let value = raw
                .get(&field.id)
                .filter(|v| !v.is_empty())
                .or(field.default.as_ref());

            match value {
                Some(value) => match field.check(value) {
                    Ok(()) => {
                        values.insert(
                            field.id.clone(),
                            ConfigValue {
                                kind: field.kind,
                                value: Zeroizing::new(value.clone()),
                            },
                        );
                    }
                    Err(reason) => bad_fields.push(BadField::new(&field.id, reason)),
                },
                None if field.required => bad_fields.push(BadField::new(&field.id, "required")),
                None => {}
            }
        }

        if bad_fields.is_empty() {
            Ok(BackendConfig {
                backend: backend.to_string(),
                values,
                private,
            })
        } else {
            tracing::debug!(backend, bad = bad_fields.len(), "backend configuration refused");
            Err(BackendError::Configuration {
                backend: backend.to_string(),
                bad_fields,
            })
        }
    }
}

#[derive(Clone)]
struct ConfigValue {
    kind: FieldKind,
    value: Zeroizing<String>,
}

/// Validated configuration of one backend.
#[derive(Clone, Default)]
pub struct BackendConfig {
    backend: String,
    values: BTreeMap<String, ConfigValue>,
    private: BTreeMap<String, String>,
}

impl BackendConfig {
    pub fn backend(&self) -> &str {
        &self.backend
    }

    pub fn get(&self, id: &str) -> Option<&str> {
        self.values.get(id).map(|v| v.value.as_str())
    }

    /// Value of `id`, or a configuration error naming it.
    pub fn require(&self, id: &str) -> Result<&str> {
        self.get(id).ok_or_else(|| BackendError::Configuration {
            backend: self.backend.clone(),
            bad_fields: vec![BadField::new(id, "required")],
        })
    }

    /// Private `_` key, e.g. `_proxy`.
    pub fn private(&self, key: &str) -> Option<&str> {
        self.private.get(key).map(String::as_str)
    }

    pub fn is_masked(&self, id: &str) -> bool {
        self.values
            .get(id)
            .is_some_and(|v| v.kind == FieldKind::Masked)
    }

    /// Values to write back to the backends file: everything but transient
    /// values.
    pub fn dump(&self) -> BTreeMap<String, String> {
        self.values
            .iter()
            .filter(|(_, v)| v.kind != FieldKind::Transient)
            .map(|(k, v)| (k.clone(), v.value.as_str().to_string()))
            .chain(self.private.iter().map(|(k, v)| (k.clone(), v.clone())))
            .collect()
    }
}

impl fmt::Debug for BackendConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut map = f.debug_map();
        for (key, value) in &self.values {
            if value.kind == FieldKind::Plain {
                map.entry(key, &value.value.as_str());
            } else {
                map.entry(key, &"********");
            }
        }
        for (key, value) in &self.private {
            map.entry(key, value);
        }
        map.finish()
    }
}
