//! Session cookie jar.
//!
//! Parsing, domain/path/secure matching and expiry are handled by
//! `cookie_store`; the jar adds the browser-facing helpers and persists as a
//! JSON list inside the browser state.

use cookie_store::CookieStore;
use serde::de::Error as _;
use serde::ser::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use url::Url;

/// Cookies of one browser session.
#[derive(Debug, Clone, Default)]
pub struct CookieJar {
    store: CookieStore,
}

impl CookieJar {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store every `Set-Cookie` header of a response received from `url`.
    ///
    /// An already expired cookie deletes its namesake.
    pub fn store<'a>(&mut self, url: &str, set_cookie: impl Iterator<Item = &'a str>) {
        let Ok(url) = Url::parse(url) else {
            return;
        };
        for header in set_cookie {
            match self.store.parse(header, &url) {
                Ok(action) => tracing::trace!(url = %url, ?action, "stored cookie"),
                Err(e) => tracing::debug!(url = %url, error = %e, "cookie not stored"),
            }
        }
    }

    /// `Cookie` header value for a request to `url`.
    pub fn header_for(&self, url: &str) -> Option<String> {
        let url = Url::parse(url).ok()?;
        let mut pairs: Vec<(&str, &str)> = self.store.get_request_values(&url).collect();
        if pairs.is_empty() {
            return None;
        }
        pairs.sort_unstable();
        Some(
            pairs
                .iter()
                .map(|(name, value)| format!("{name}={value}"))
                .collect::<Vec<_>>()
                .join("; "),
        )
    }

    /// Value of the first unexpired cookie called `name`.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.store
            .iter_unexpired()
            .find(|c| c.name() == name)
            .map(|c| c.value())
    }

    pub fn len(&self) -> usize {
        self.store.iter_unexpired().count()
    }

    pub fn is_empty(&self) -> bool {
        self.store.iter_unexpired().next().is_none()
    }

    pub fn clear(&mut self) {
        self.store.clear();
    }

    fn entries(&self) -> Vec<(String, String, Option<String>, Option<String>)> {
        let mut entries: Vec<_> = self
            .store
            .iter_unexpired()
            .map(|c| {
                (
                    c.name().to_string(),
                    c.value().to_string(),
                    c.domain().map(ToString::to_string),
                    c.path().map(ToString::to_string),
                )
            })
            .collect();
        entries.sort();
        entries
    }
}

impl PartialEq for CookieJar {
    fn eq(&self, other: &Self) -> bool {
        self.entries() == other.entries()
    }
}

impl Eq for CookieJar {}

impl Serialize for CookieJar {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut buf = Vec::new();
        // session cookies are part of the browser state
        cookie_store::serde::json::save_incl_expired_and_nonpersistent(&self.store, &mut buf)
            .map_err(S::Error::custom)?;
        let cookies: Value = serde_json::from_slice(&buf).map_err(S::Error::custom)?;
        cookies.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for CookieJar {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let cookies = Value::deserialize(deserializer)?;
        let buf = serde_json::to_vec(&cookies).map_err(D::Error::custom)?;
        let store = cookie_store::serde::json::load(buf.as_slice()).map_err(D::Error::custom)?;
        Ok(Self { store })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_domain_cookie_reaches_subdomains() {
        let mut jar = CookieJar::new();
        jar.store(
            "https://www.bank.example/login",
            ["SESSION=abc123; Path=/; Domain=.bank.example; Secure; HttpOnly"].into_iter(),
        );
        assert_eq!(jar.get("SESSION"), Some("abc123"));
        assert_eq!(
            jar.header_for("https://api.bank.example/").as_deref(),
            Some("SESSION=abc123")
        );
        assert_eq!(jar.header_for("http://api.bank.example/"), None);
    }

    #[test]
    fn test_foreign_domain_is_rejected() {
        let mut jar = CookieJar::new();
        jar.store(
            "https://bank.example/",
            ["a=1; Domain=evil.example", "=1"].into_iter(),
        );
        assert!(jar.is_empty());
    }

    #[test]
    fn test_header_for_matches_domain_path_and_scheme() {
        let mut jar = CookieJar::new();
        jar.store(
            "https://bank.example/accounts/list",
            [
                "sid=1; Path=/",
                "scoped=2; Path=/accounts",
                "tls=3; Secure; Path=/",
            ]
            .into_iter(),
        );

        assert_eq!(
            jar.header_for("https://bank.example/accounts/7").as_deref(),
            Some("scoped=2; sid=1; tls=3")
        );
        assert_eq!(
            jar.header_for("http://bank.example/").as_deref(),
            Some("sid=1")
        );
        assert_eq!(jar.header_for("https://other.example/"), None);
        // host-only cookie is not sent to subdomains
        assert_eq!(jar.header_for("https://www.bank.example/"), None);
    }

    #[test]
    fn test_max_age_zero_deletes() {
        let mut jar = CookieJar::new();
        jar.store("https://bank.example/", ["sid=1; Path=/"].into_iter());
        assert_eq!(jar.get("sid"), Some("1"));
        jar.store("https://bank.example/", ["sid=; Path=/; Max-Age=0"].into_iter());
        assert!(jar.is_empty());
    }

    #[test]
    fn test_expired_cookies_are_not_sent() {
        let mut jar = CookieJar::new();
        jar.store(
            "https://bank.example/",
            [
                "old=1; Path=/; Expires=Wed, 21-Oct-2015 07:28:00 GMT",
                "older=2; Path=/; Expires=Wed, 21 Oct 2015 07:28:00 GMT",
            ]
            .into_iter(),
        );
        assert_eq!(jar.header_for("https://bank.example/"), None);
        assert!(jar.is_empty());
    }

    #[test]
    fn test_expired_cookie_deletes_namesake() {
        let mut jar = CookieJar::new();
        jar.store("https://bank.example/", ["sid=1; Path=/"].into_iter());
        jar.store(
            "https://bank.example/",
            ["sid=; Path=/; Expires=Thu, 01-Jan-1970 00:00:00 GMT"].into_iter(),
        );
        assert_eq!(jar.get("sid"), None);
    }

    #[test]
    fn test_jar_serializes_as_list() {
        let mut jar = CookieJar::new();
        jar.store("https://bank.example/", ["sid=1; Path=/"].into_iter());
        let value = serde_json::to_value(&jar).expect("serialize");
        assert!(value.is_array());
        let back: CookieJar = serde_json::from_value(value).expect("deserialize");
        assert_eq!(back, jar);
        assert_eq!(back.header_for("https://bank.example/").as_deref(), Some("sid=1"));
    }
}
