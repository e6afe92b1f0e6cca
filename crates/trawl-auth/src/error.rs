//! Authentication error taxonomy.

use crate::interaction::InteractionRequest;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use trawl_browser::BrowserError;

/// Result type for authentication operations
pub type Result<T> = std::result::Result<T, AuthError>;

/// What the user has to do on the website before scraping can go on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    /// Acknowledge new terms of service or an important message
    Acknowledge,
    /// Fill in user information on the website
    FillKyc,
    /// Enable multi-factor authentication on the website
    EnableMfa,
    /// Perform multi-factor authentication on the website itself
    PerformMfa,
    /// Pay for the feature or renew a subscription
    Payment,
    /// Contact the site support
    Contact,
}

/// Authentication errors
#[derive(Debug, Error)]
pub enum AuthError {
    /// Credentials were refused
    #[error("incorrect password{}", fmt_message(.message))]
    IncorrectPassword {
        message: String,
        /// Configuration fields the site pointed at
        bad_fields: Vec<String>,
    },

    #[error("user banned{}", fmt_message(.message))]
    UserBanned { message: String },

    #[error("password expired{}", fmt_message(.message))]
    PasswordExpired { message: String },

    /// An action must be performed by the user, usually on the website
    #[error("action needed{}", fmt_message(.message))]
    ActionNeeded {
        message: String,
        action_type: Option<ActionType>,
        url: Option<String>,
        locale: Option<String>,
    },

    #[error("authentication method not implemented{}", fmt_message(.message))]
    AuthMethodNotImplemented { message: String },

    /// The decoupled validation was not confirmed in time
    #[error("app validation expired{}", fmt_message(.message))]
    AppValidationExpired { message: String },

    #[error("app validation cancelled{}", fmt_message(.message))]
    AppValidationCancelled { message: String },

    #[error("wrong CAPTCHA response{}", fmt_message(.message))]
    WrongCaptchaResponse { message: String },

    /// Login needs a human and the session is not interactive
    #[error("interactive session required")]
    NeedInteractive,

    #[error("interactive session required for two-factor authentication")]
    NeedInteractiveFor2FA,

    /// Login is suspended until the request is answered
    #[error("interaction required: {0}")]
    InteractionRequired(Box<InteractionRequest>),

    /// Resumed without every requested field
    #[error("missing input for: {}", .fields.join(", "))]
    MissingInput { fields: Vec<String> },

    /// The site ended the session
    #[error("logged out by the site")]
    LoggedOut,

    /// The site answered something unexpected
    #[error("assertion failed: {0}")]
    Assertion(String),

    #[error(transparent)]
    Browser(#[from] BrowserError),
}

fn fmt_message(message: &str) -> String {
    if message.is_empty() {
        String::new()
    } else {
        format!(": {message}")
    }
}

impl AuthError {
    pub fn incorrect_password(message: impl Into<String>) -> Self {
        Self::IncorrectPassword {
            message: message.into(),
            bad_fields: Vec::new(),
        }
    }

    pub fn action_needed(message: impl Into<String>, action_type: ActionType) -> Self {
        Self::ActionNeeded {
            message: message.into(),
            action_type: Some(action_type),
            url: None,
            locale: None,
        }
    }

    pub fn assertion(message: impl Into<String>) -> Self {
        Self::Assertion(message.into())
    }

    /// Pending interaction carried by this error, if any.
    pub fn interaction(&self) -> Option<&InteractionRequest> {
        match self {
            Self::InteractionRequired(request) => Some(request),
            _ => None,
        }
    }

    /// Credentials related failure.
    pub fn is_credentials(&self) -> bool {
        matches!(
            self,
            Self::IncorrectPassword { .. } | Self::UserBanned { .. } | Self::PasswordExpired { .. }
        )
    }
}
