//! Interaction requests.
//!
//! A login or a transfer that cannot go on without the user suspends with an
//! [`InteractionRequest`]. The request names the fields to supply; the answer
//! comes back as an [`InteractionInput`] keyed by field id.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use trawl_core::Timestamp;

/// Answers keyed by field id.
pub type InteractionInput = BTreeMap<String, String>;

/// Where a code or validation request was sent.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Medium {
    #[default]
    Unknown,
    Sms,
    MobileApp,
    Email,
    Device,
}

impl fmt::Display for Medium {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Unknown => "unknown",
            Self::Sms => "SMS",
            Self::MobileApp => "mobile app",
            Self::Email => "email",
            Self::Device => "device",
        })
    }
}

/// One value the user must supply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Field {
    pub id: String,
    pub label: String,
    /// Read without echo and never logged
    #[serde(default)]
    pub masked: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub choices: Vec<String>,
}

impl Field {
    pub fn new(id: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
            masked: false,
            choices: Vec::new(),
        }
    }

    #[must_use]
    pub fn masked(mut self) -> Self {
        self.masked = true;
        self
    }

    #[must_use]
    pub fn choices<S: Into<String>>(mut self, choices: impl IntoIterator<Item = S>) -> Self {
        self.choices = choices.into_iter().map(Into::into).collect();
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CaptchaChallenge {
    /// Base64 encoded image to read
    Image { data: String },
    RecaptchaV2 { website_key: String, website_url: String },
    RecaptchaV3 {
        website_key: String,
        website_url: String,
        action: Option<String>,
        min_score: Option<f64>,
    },
    Hcaptcha { website_key: String, website_url: String },
}

/// Suspension signal raised by a login procedure or a multi-step operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InteractionRequest {
    /// A one-time code was sent to the user
    SentOtp {
        field: Field,
        #[serde(default)]
        medium: Medium,
        medium_label: Option<String>,
        message: String,
        expires_at: Option<Timestamp>,
    },
    /// The user computes the code (card reader, paper grid)
    OfflineOtp {
        field: Field,
        /// Challenge to feed the device with
        input: Option<String>,
        medium_label: Option<String>,
        message: String,
        expires_at: Option<Timestamp>,
    },
    Captcha {
        field: Field,
        challenge: CaptchaChallenge,
        message: String,
    },
    /// Validation happens out of band (mobile app, email link); polled
    Decoupled {
        #[serde(default)]
        medium: Medium,
        medium_label: Option<String>,
        message: String,
        expires_at: Option<Timestamp>,
    },
    /// Free form questions
    Question { fields: Vec<Field>, message: String },
    /// A transfer needs confirmation input
    TransferStep {
        fields: Vec<Field>,
        message: String,
        /// Pending transfer as known by the module
        resource: Value,
    },
    AddRecipientStep {
        fields: Vec<Field>,
        message: String,
        resource: Value,
    },
    /// The user must visit `url` and paste back where it redirected
    Redirect { url: String, field: Field, message: String },
}

impl InteractionRequest {
    /// SMS code request for `field_id`.
    pub fn sms_otp(field_id: &str, medium_label: Option<String>, message: impl Into<String>) -> Self {
        let message = message.into();
        Self::SentOtp {
            field: Field::new(field_id, message.clone()).masked(),
            medium: Medium::Sms,
            medium_label,
            message,
            expires_at: None,
        }
    }

    /// Mobile app validation request.
    pub fn app_validation(message: impl Into<String>) -> Self {
        Self::Decoupled {
            medium: Medium::MobileApp,
            medium_label: None,
            message: message.into(),
            expires_at: None,
        }
    }

    /// CAPTCHA to solve, answered in `field_id`.
    pub fn captcha(field_id: &str, challenge: CaptchaChallenge, message: impl Into<String>) -> Self {
        let message = message.into();
        Self::Captcha {
            field: Field::new(field_id, message.clone()),
            challenge,
            message,
        }
    }

    pub fn question(message: impl Into<String>, fields: Vec<Field>) -> Self {
        Self::Question {
            fields,
            message: message.into(),
        }
    }

    /// Fields the user must supply; empty for decoupled validations.
    pub fn fields(&self) -> &[Field] {
        match self {
            Self::SentOtp { field, .. }
            | Self::OfflineOtp { field, .. }
            | Self::Captcha { field, .. }
            | Self::Redirect { field, .. } => std::slice::from_ref(field),
            Self::Question { fields, .. }
            | Self::TransferStep { fields, .. }
            | Self::AddRecipientStep { fields, .. } => fields,
            Self::Decoupled { .. } => &[],
        }
    }

    pub fn message(&self) -> &str {
        match self {
            Self::SentOtp { message, .. }
            | Self::OfflineOtp { message, .. }
            | Self::Captcha { message, .. }
            | Self::Decoupled { message, .. }
            | Self::Question { message, .. }
            | Self::TransferStep { message, .. }
            | Self::AddRecipientStep { message, .. }
            | Self::Redirect { message, .. } => message,
        }
    }

    pub fn medium(&self) -> Medium {
        match self {
            Self::SentOtp { medium, .. } | Self::Decoupled { medium, .. } => *medium,
            Self::OfflineOtp { .. } => Medium::Device,
            _ => Medium::Unknown,
        }
    }

    pub fn medium_label(&self) -> Option<&str> {
        match self {
            Self::SentOtp { medium_label, .. }
            | Self::OfflineOtp { medium_label, .. }
            | Self::Decoupled { medium_label, .. } => medium_label.as_deref(),
            _ => None,
        }
    }

    pub fn expires_at(&self) -> Option<&Timestamp> {
        match self {
            Self::SentOtp { expires_at, .. }
            | Self::OfflineOtp { expires_at, .. }
            | Self::Decoupled { expires_at, .. } => expires_at.as_ref(),
            _ => None,
        }
    }

    /// Validated out of band and resumed without input.
    pub fn is_decoupled(&self) -> bool {
        matches!(self, Self::Decoupled { .. })
    }

    /// Answering with a wrong value may be retried.
    pub fn is_otp(&self) -> bool {
        matches!(self, Self::SentOtp { .. } | Self::OfflineOtp { .. })
    }

    /// Ids of requested fields with no non-empty value in `input`.
    pub fn missing_fields(&self, input: &InteractionInput) -> Vec<String> {
        self.fields()
            .iter()
            .filter(|f| input.get(&f.id).map_or(true, |v| v.trim().is_empty()))
            .map(|f| f.id.clone())
            .collect()
    }
}

impl fmt::Display for InteractionRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let message = self.message();
        match self {
            Self::Redirect { url, .. } if message.is_empty() => write!(f, "redirecting to {url}"),
            _ if !message.is_empty() => f.write_str(message),
            Self::SentOtp { .. } | Self::OfflineOtp { .. } => f.write_str("one-time code required"),
            Self::Captcha { .. } => f.write_str("CAPTCHA required"),
            Self::Decoupled { medium, .. } => write!(f, "validation required on {medium}"),
            _ => {
                let ids: Vec<&str> = self.fields().iter().map(|f| f.id.as_str()).collect();
                write!(f, "input required: {}", ids.join(", "))
            }
        }
    }
}
