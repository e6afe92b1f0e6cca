//! Shared types used across Trawl.
//!
//! Newtypes for backend names and backend-qualified object identifiers, and a
//! timestamp wrapper used for expiries.

use crate::error::TrawlError;
use chrono::{DateTime, Duration, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

/// Name of a configured backend.
///
/// Backend names are 1-64 characters of ASCII letters, digits, `_` and `-`.
/// They never contain `@`, so they can qualify object identifiers.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct BackendName(String);

impl BackendName {
    /// Create a new `BackendName` from a string.
    ///
    /// # Errors
    /// Returns error if the name doesn't match the required format.
    pub fn new(name: impl Into<String>) -> Result<Self, TrawlError> {
        let name = name.into();
        Self::validate(&name)?;
        Ok(Self(name))
    }

    /// Get the inner string value.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn validate(name: &str) -> Result<(), TrawlError> {
        static NAME_REGEX: OnceLock<Regex> = OnceLock::new();
        let regex =
            NAME_REGEX.get_or_init(|| Regex::new(r"^[A-Za-z0-9_-]{1,64}$").expect("valid regex"));

        if regex.is_match(name) {
            Ok(())
        } else {
            Err(TrawlError::Validation(format!(
                "invalid backend name: must be 1-64 letters, digits, '_' or '-', got '{name}'"
            )))
        }
    }
}

impl fmt::Display for BackendName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for BackendName {
    type Err = TrawlError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for BackendName {
    type Error = TrawlError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<BackendName> for String {
    fn from(name: BackendName) -> Self {
        name.0
    }
}

/// An object identifier, optionally qualified by the backend that owns it.
///
/// Written `id@backend`. The split happens on the last `@`, so object ids may
/// themselves contain `@` (e-mail based ids, for instance).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QualifiedId {
    /// Backend-local identifier
    pub id: String,
    /// Owning backend, if given
    pub backend: Option<BackendName>,
}

impl QualifiedId {
    /// Qualify `id` with `backend`.
    #[must_use]
    pub fn new(id: impl Into<String>, backend: BackendName) -> Self {
        Self {
            id: id.into(),
            backend: Some(backend),
        }
    }

    /// Parse `id@backend` or a bare `id`.
    ///
    /// # Errors
    /// Returns error if the id part is empty or the backend part is not a
    /// valid backend name.
    pub fn parse(input: &str) -> Result<Self, TrawlError> {
        let (id, backend) = match input.rsplit_once('@') {
            Some((id, backend)) => (id, Some(BackendName::new(backend)?)),
            None => (input, None),
        };

        if id.is_empty() {
            return Err(TrawlError::Validation(format!(
                "invalid object id: empty identifier in '{input}'"
            )));
        }

        Ok(Self {
            id: id.to_string(),
            backend,
        })
    }
}

impl fmt::Display for QualifiedId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.backend {
            Some(backend) => write!(f, "{}@{}", self.id, backend),
            None => write!(f, "{}", self.id),
        }
    }
}

impl FromStr for QualifiedId {
    type Err = TrawlError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// Wrapper around `chrono::DateTime<Utc>` for consistent timestamp handling.
///
/// Serialized as RFC3339 so it survives any structure-preserving encoder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Timestamp(DateTime<Utc>);

impl Timestamp {
    /// Create a timestamp representing the current moment.
    #[must_use]
    pub fn now() -> Self {
        Self(Utc::now())
    }

    /// Create a timestamp from a `DateTime<Utc>`.
    #[must_use]
    pub fn from_datetime(dt: DateTime<Utc>) -> Self {
        Self(dt)
    }

    /// Get the inner `DateTime<Utc>`.
    #[must_use]
    pub fn as_datetime(&self) -> &DateTime<Utc> {
        &self.0
    }

    /// Timestamp `duration` after this one.
    #[must_use]
    pub fn plus(&self, duration: Duration) -> Self {
        Self(self.0 + duration)
    }

    /// Whether this timestamp lies in the past.
    #[must_use]
    pub fn is_past(&self) -> bool {
        self.0 <= Utc::now()
    }

    /// Parse a timestamp from an RFC3339 string.
    pub fn from_rfc3339(s: &str) -> Result<Self, TrawlError> {
        DateTime::parse_from_rfc3339(s)
            .map(|dt| Self(dt.with_timezone(&Utc)))
            .map_err(|e| TrawlError::Validation(format!("invalid timestamp: {e}")))
    }

    /// Format as RFC3339 string.
    #[must_use]
    pub fn to_rfc3339(&self) -> String {
        self.0.to_rfc3339()
    }

    /// Get seconds since Unix epoch.
    #[must_use]
    pub fn timestamp(&self) -> i64 {
        self.0.timestamp()
    }
}

impl Default for Timestamp {
    fn default() -> Self {
        Self::now()
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.to_rfc3339())
    }
}

impl From<DateTime<Utc>> for Timestamp {
    fn from(dt: DateTime<Utc>) -> Self {
        Self(dt)
    }
}

impl From<Timestamp> for DateTime<Utc> {
    fn from(ts: Timestamp) -> Self {
        ts.0
    }
}
