use crate::page::ContentKind;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, BrowserError>;

#[derive(Debug, Error)]
pub enum BrowserError {
    /// A URL template failed to compile at registration time.
    #[error("invalid URL pattern '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },

    /// No template of a pattern accepts the supplied parameters.
    #[error("unable to build URL with {params}; available templates: {available}")]
    UrlNotResolvable { params: String, available: String },

    #[error("invalid URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("invalid header '{name}': {reason}")]
    InvalidHeader { name: String, reason: String },

    #[error("URL not allowed: {url}")]
    UrlNotAllowed { url: String },

    /// Network failure, timeout or unreachable site.
    #[error("site unavailable ({url}): {reason}")]
    Unavailable { url: String, reason: String },

    /// The site is actively refusing automated access.
    #[error("scraping blocked by {url}: {reason}")]
    ScrapingBlocked { url: String, reason: String },

    #[error("HTTP {status} on {url}")]
    Http {
        status: u16,
        url: String,
        body: String,
    },

    #[error("refusing HTTPS downgrade from {from} to {to}")]
    HttpsDowngrade { from: String, to: String },

    #[error("more than {max} redirects starting at {url}")]
    TooManyRedirects { url: String, max: u32 },

    #[error("no page matches {url}")]
    PageNotFound { url: String },

    #[error("failed to parse {kind} page at {url}: {reason}")]
    Parse {
        url: String,
        kind: ContentKind,
        reason: String,
    },

    #[error("invalid browser state: {0}")]
    State(String),
}

impl BrowserError {
    /// Transport or availability failure, including the blocked subtype.
    pub fn is_unavailable(&self) -> bool {
        matches!(self, Self::Unavailable { .. } | Self::ScrapingBlocked { .. })
    }

    /// HTTP status of the failing response, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Http { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub fn is_client_error(&self) -> bool {
        self.status().is_some_and(|s| (400..500).contains(&s))
    }

    pub fn is_server_error(&self) -> bool {
        self.status().is_some_and(|s| s >= 500)
    }

    pub fn is_not_found(&self) -> bool {
        self.status() == Some(404)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = BrowserError::PageNotFound {
            url: "https://bank.example/unknown".to_string(),
        };
        assert_eq!(err.to_string(), "no page matches https://bank.example/unknown");
    }

    #[test]
    fn test_blocked_is_unavailable() {
        let err = BrowserError::ScrapingBlocked {
            url: "https://bank.example".to_string(),
            reason: "HTTP 429".to_string(),
        };
        assert!(err.is_unavailable());
        assert!(err.status().is_none());
    }

    #[test]
    fn test_status_classes() {
        let not_found = BrowserError::Http {
            status: 404,
            url: "https://bank.example/x".to_string(),
            body: String::new(),
        };
        assert!(not_found.is_not_found());
        assert!(not_found.is_client_error());
        assert!(!not_found.is_server_error());

        let server = BrowserError::Http {
            status: 503,
            url: "https://bank.example/x".to_string(),
            body: String::new(),
        };
        assert!(server.is_server_error());
        assert!(!server.is_unavailable());
    }
}
