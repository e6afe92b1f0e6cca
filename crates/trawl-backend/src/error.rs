//! Error types for backends and dispatch.

use serde::Serialize;
use std::fmt;
use thiserror::Error;
use trawl_auth::{AuthError, InteractionRequest};
use trawl_browser::BrowserError;
use trawl_core::{CapabilityId, TrawlError};

/// Result type for backend operations.
pub type Result<T> = std::result::Result<T, BackendError>;

/// A configuration value that failed validation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BadField {
    /// Field id
    pub field: String,
    /// Why the value was refused
    pub reason: String,
}

impl BadField {
    /// Create a new bad field entry.
    pub fn new(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

impl fmt::Display for BadField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.reason)
    }
}

fn join_fields(fields: &[BadField]) -> String {
    fields
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Errors raised by a backend or by the machinery around it.
#[derive(Error, Debug)]
pub enum BackendError {
    /// Login, interaction and site errors
    #[error(transparent)]
    Auth(#[from] AuthError),

    /// Backend configuration refused by the module schema
    #[error("invalid configuration for backend {backend}: {}", join_fields(.bad_fields))]
    Configuration {
        /// Backend being configured
        backend: String,
        /// Every refused field
        bad_fields: Vec<BadField>,
    },

    /// No module registered under this name
    #[error("unknown module: {module}")]
    ModuleNotFound {
        /// Requested module
        module: String,
    },

    /// No backend configured under this name
    #[error("unknown backend: {backend}")]
    BackendNotFound {
        /// Requested backend
        backend: String,
    },

    /// A backend with this name already exists
    #[error("backend {backend} already exists")]
    BackendExists {
        /// Conflicting backend
        backend: String,
    },

    /// The backend does not implement the capability or operation
    #[error("{capability} is not supported{}", .operation.as_ref().map(|op| format!(" ({op})")).unwrap_or_default())]
    NotSupported {
        /// Capability asked for
        capability: CapabilityId,
        /// Operation, when only part of the capability is missing
        operation: Option<String>,
    },

    /// The requested object does not exist on this backend
    #[error("object not found: {id}")]
    NotFound {
        /// Backend-local identifier
        id: String,
    },

    /// Persisted state could not be read or written
    #[error("state storage error for {backend}: {reason}")]
    Storage {
        /// Backend whose state is concerned
        backend: String,
        /// Underlying failure
        reason: String,
    },

    /// The backends file could not be read or written
    #[error("backends file error at {path}: {reason}")]
    BackendsFile {
        /// Path to the backends file
        path: String,
        /// Underlying failure
        reason: String,
    },

    /// Core validation failures (invalid backend names, ids)
    #[error(transparent)]
    Core(#[from] TrawlError),

    /// Unexpected failure (panic, broken invariant)
    #[error("bug: {0}")]
    Bug(String),
}

impl From<BrowserError> for BackendError {
    fn from(err: BrowserError) -> Self {
        Self::Auth(AuthError::Browser(err))
    }
}

/// Classification used to report per-backend failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Site down, timing out or answering 5xx
    Unavailable,
    /// The site detected and refused the scraper
    ScrapingBlocked,
    /// Credentials refused or login not completed
    IncorrectPassword,
    /// Account banned
    UserBanned,
    /// Password must be renewed on the site
    PasswordExpired,
    /// User input required to go on
    InteractionNeeded,
    /// Something must be done on the website
    ActionNeeded,
    /// Invalid backend configuration
    Configuration,
    /// Capability or operation not implemented
    NotSupported,
    /// Unknown object
    NotFound,
    /// Anything unexpected
    Bug,
}

impl BackendError {
    /// Shorthand for a capability the backend does not have.
    pub fn not_supported(capability: CapabilityId) -> Self {
        Self::NotSupported {
            capability,
            operation: None,
        }
    }

    /// Shorthand for an operation the backend does not implement.
    pub fn operation_not_supported(capability: CapabilityId, operation: &str) -> Self {
        Self::NotSupported {
            capability,
            operation: Some(operation.to_string()),
        }
    }

    /// Shorthand for an unknown object.
    pub fn not_found(id: impl Into<String>) -> Self {
        Self::NotFound { id: id.into() }
    }

    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Auth(err) => auth_kind(err),
            Self::Configuration { .. } | Self::ModuleNotFound { .. } | Self::BackendExists { .. } => {
                ErrorKind::Configuration
            }
            Self::BackendNotFound { .. } | Self::NotFound { .. } => ErrorKind::NotFound,
            Self::NotSupported { .. } => ErrorKind::NotSupported,
            Self::Core(_) => ErrorKind::Configuration,
            Self::Storage { .. } | Self::BackendsFile { .. } | Self::Bug(_) => ErrorKind::Bug,
        }
    }

    /// The site could not be reached or refused the scraper.
    pub fn is_unavailable(&self) -> bool {
        matches!(self.kind(), ErrorKind::Unavailable | ErrorKind::ScrapingBlocked)
    }

    /// Pending interaction, when the backend is waiting for the user.
    pub fn interaction(&self) -> Option<&InteractionRequest> {
        match self {
            Self::Auth(err) => err.interaction(),
            _ => None,
        }
    }
}

fn auth_kind(err: &AuthError) -> ErrorKind {
    match err {
        AuthError::IncorrectPassword { .. }
        | AuthError::AppValidationExpired { .. }
        | AuthError::AppValidationCancelled { .. }
        | AuthError::WrongCaptchaResponse { .. } => ErrorKind::IncorrectPassword,
        AuthError::UserBanned { .. } => ErrorKind::UserBanned,
        AuthError::PasswordExpired { .. } => ErrorKind::PasswordExpired,
        AuthError::ActionNeeded { .. } => ErrorKind::ActionNeeded,
        AuthError::NeedInteractive
        | AuthError::NeedInteractiveFor2FA
        | AuthError::InteractionRequired(_)
        | AuthError::MissingInput { .. } => ErrorKind::InteractionNeeded,
        AuthError::AuthMethodNotImplemented { .. } => ErrorKind::NotSupported,
        AuthError::LoggedOut => ErrorKind::Unavailable,
        AuthError::Assertion(_) => ErrorKind::Bug,
        AuthError::Browser(err) => browser_kind(err),
    }
}

fn browser_kind(err: &BrowserError) -> ErrorKind {
    match err {
        BrowserError::ScrapingBlocked { .. } => ErrorKind::ScrapingBlocked,
        BrowserError::Unavailable { .. } | BrowserError::TooManyRedirects { .. } => {
            ErrorKind::Unavailable
        }
        BrowserError::Http { .. } if err.is_server_error() => ErrorKind::Unavailable,
        BrowserError::InvalidPattern { .. } => ErrorKind::Configuration,
        _ => ErrorKind::Bug,
    }
}
