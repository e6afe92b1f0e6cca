//! Trawl Auth - login handling for scraping modules.
//!
//! # Modules
//!
//! - [`error`] - Authentication error taxonomy
//! - [`interaction`] - Requests for user input (OTP, CAPTCHA, questions, redirects)
//! - [`flow`] - Resumable multi-step login state machine
//! - [`polling`] - Decoupled (app) validation polling
//! - [`guard`] - Logged-in guard and HTTP error translation
//! - [`sso`] - OAuth2 redirect login with PKCE

pub mod error;
pub mod flow;
pub mod guard;
pub mod interaction;
pub mod polling;
pub mod sso;

pub use error::{ActionType, AuthError, Result};
pub use flow::{FlowContext, FlowPolicy, FlowState, LoginFlow, LoginProcedure, Step};
pub use guard::{ensure_logged_in, retry_on_logout, translate_http_error, Authenticator};
pub use interaction::{CaptchaChallenge, Field, InteractionInput, InteractionRequest, Medium};
pub use polling::{poll_validation, PollFn, PollPolicy, ValidationPoller, ValidationStatus};
pub use sso::{OAuth2Client, OAuth2Config, Pkce, TokenState};
