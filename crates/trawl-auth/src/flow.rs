//! Resumable login flow.
//!
//! A [`LoginFlow`] drives a [`LoginProcedure`] through its steps. When a step
//! needs the user, the flow suspends with the step name and the request that
//! was raised, and can be persisted with the browser state. Resuming hands the
//! answer to the suspended step directly: `init_login` is never called again,
//! so codes already sent are not re-sent.

use crate::error::{AuthError, Result};
use crate::interaction::{InteractionInput, InteractionRequest};
use crate::polling::{poll_validation, PollPolicy, ValidationPoller, ValidationStatus};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use trawl_core::AuthConfig;

/// Outcome of one login step.
#[derive(Debug, Clone, PartialEq)]
pub enum Step {
    /// Logged in
    Done,
    /// Suspend at `step` until the user answers `request`
    Ask {
        step: String,
        request: InteractionRequest,
    },
    /// Suspend at `step`; on resume, poll until the validation settles
    Poll {
        step: String,
        request: InteractionRequest,
    },
}

impl Step {
    pub fn ask(step: impl Into<String>, request: InteractionRequest) -> Self {
        Self::Ask {
            step: step.into(),
            request,
        }
    }

    pub fn poll(step: impl Into<String>, request: InteractionRequest) -> Self {
        Self::Poll {
            step: step.into(),
            request,
        }
    }
}

/// Transient data carried between steps (pending form, transaction ids).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FlowContext(BTreeMap<String, Value>);

impl FlowContext {
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(Value::as_str)
    }

    /// String value of `key`, or an assertion error naming it.
    pub fn require_str(&self, key: &str) -> Result<&str> {
        self.get_str(key)
            .ok_or_else(|| AuthError::Assertion(format!("login context lost '{key}'")))
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.0.remove(key)
    }

    pub fn clear(&mut self) {
        self.0.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Site specific login steps.
#[async_trait]
pub trait LoginProcedure: Send {
    /// First step: submit credentials, trigger a second factor if needed.
    async fn init_login(&mut self, context: &mut FlowContext) -> Result<Step>;

    /// Continue the suspended `step` with the user's answer.
    async fn handle_step(
        &mut self,
        step: &str,
        input: &InteractionInput,
        context: &mut FlowContext,
    ) -> Result<Step>;

    /// Ask the site where a decoupled validation stands.
    async fn poll_step(&mut self, step: &str, _context: &mut FlowContext) -> Result<ValidationStatus> {
        Err(AuthError::Assertion(format!("step '{step}' cannot be polled")))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum FlowState {
    #[default]
    Idle,
    Suspended {
        step: String,
        request: InteractionRequest,
        /// Wrong answers given so far
        #[serde(default)]
        attempts: u32,
        #[serde(default)]
        polling: bool,
    },
    Completed,
}

/// Limits applied while driving a flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlowPolicy {
    /// Wrong one-time codes accepted before the flow restarts
    pub otp_max_attempts: u32,
    pub poll: PollPolicy,
}

impl Default for FlowPolicy {
    fn default() -> Self {
        Self {
            otp_max_attempts: 3,
            poll: PollPolicy::default(),
        }
    }
}

impl FlowPolicy {
    pub fn from_config(config: &AuthConfig) -> Self {
        Self {
            otp_max_attempts: config.otp_max_attempts,
            poll: PollPolicy::from_config(config),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LoginFlow {
    #[serde(default)]
    state: FlowState,
    #[serde(default)]
    context: FlowContext,
    #[serde(skip)]
    policy: FlowPolicy,
}

struct StepPoller<'a, P: ?Sized> {
    procedure: &'a mut P,
    step: &'a str,
    context: &'a mut FlowContext,
}

#[async_trait]
impl<P: LoginProcedure + ?Sized> ValidationPoller for StepPoller<'_, P> {
    async fn poll(&mut self) -> Result<ValidationStatus> {
        self.procedure.poll_step(self.step, self.context).await
    }
}

impl LoginFlow {
    pub fn new(policy: FlowPolicy) -> Self {
        Self {
            policy,
            ..Self::default()
        }
    }

    /// Restore a persisted flow under `policy`.
    pub fn from_value(value: Value, policy: FlowPolicy) -> Result<Self> {
        let flow: Self = serde_json::from_value(value)
            .map_err(|e| AuthError::Assertion(format!("invalid persisted login flow: {e}")))?;
        Ok(flow.with_policy(policy))
    }

    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }

    #[must_use]
    pub fn with_policy(mut self, policy: FlowPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn state(&self) -> &FlowState {
        &self.state
    }

    pub fn context(&self) -> &FlowContext {
        &self.context
    }

    pub fn context_mut(&mut self) -> &mut FlowContext {
        &mut self.context
    }

    pub fn is_suspended(&self) -> bool {
        matches!(self.state, FlowState::Suspended { .. })
    }

    pub fn is_completed(&self) -> bool {
        matches!(self.state, FlowState::Completed)
    }

    /// Request the flow is waiting on.
    pub fn pending_request(&self) -> Option<&InteractionRequest> {
        match &self.state {
            FlowState::Suspended { request, .. } => Some(request),
            _ => None,
        }
    }

    pub fn reset(&mut self) {
        self.state = FlowState::Idle;
        self.context.clear();
    }

    /// Start a fresh login.
    ///
    /// Returns the request the flow suspended on, if any.
    pub async fn start<P>(&mut self, procedure: &mut P) -> Result<Option<InteractionRequest>>
    where
        P: LoginProcedure + ?Sized,
    {
        self.reset();
        tracing::debug!("starting login");
        match procedure.init_login(&mut self.context).await {
            Ok(step) => Ok(self.apply(step)),
            Err(e) => {
                self.reset();
                Err(e)
            }
        }
    }

    /// Continue the suspended step with `input`.
    ///
    /// # Errors
    /// [`AuthError::MissingInput`] leaves the flow suspended. A wrong one-time
    /// code keeps it suspended until the attempt limit; every other error
    /// resets it.
    pub async fn resume<P>(
        &mut self,
        procedure: &mut P,
        input: &InteractionInput,
    ) -> Result<Option<InteractionRequest>>
    where
        P: LoginProcedure + ?Sized,
    {
        let FlowState::Suspended {
            step,
            request,
            attempts,
            polling,
        } = self.state.clone()
        else {
            return Err(AuthError::Assertion("no login step is waiting for input".to_string()));
        };

        if !polling {
            let missing = request.missing_fields(input);
            if !missing.is_empty() {
                return Err(AuthError::MissingInput { fields: missing });
            }
        }

        tracing::debug!(step = %step, attempts, polling, "resuming login");

        if polling {
            let mut poller = StepPoller {
                procedure: &mut *procedure,
                step: &step,
                context: &mut self.context,
            };
            if let Err(e) = poll_validation(self.policy.poll, &mut poller).await {
                self.reset();
                return Err(e);
            }
        }

        match procedure.handle_step(&step, input, &mut self.context).await {
            Ok(next) => Ok(self.apply(next)),
            Err(e @ AuthError::IncorrectPassword { .. }) if request.is_otp() => {
                let attempts = attempts + 1;
                if attempts >= self.policy.otp_max_attempts {
                    tracing::warn!(step = %step, attempts, "one-time code attempts exhausted");
                    self.reset();
                } else {
                    tracing::info!(step = %step, attempts, "wrong one-time code");
                    self.state = FlowState::Suspended {
                        step,
                        request,
                        attempts,
                        polling,
                    };
                }
                Err(e)
            }
            Err(e) => {
                self.reset();
                Err(e)
            }
        }
    }

    /// Start or resume, turning a suspension into
    /// [`AuthError::InteractionRequired`].
    ///
    /// A suspended, non-polling flow given no input raises its pending request
    /// again without calling the procedure.
    pub async fn drive<P>(&mut self, procedure: &mut P, input: Option<&InteractionInput>) -> Result<()>
    where
        P: LoginProcedure + ?Sized,
    {
        let suspended = match &self.state {
            FlowState::Suspended {
                request, polling, ..
            } => Some((*polling, request.clone())),
            FlowState::Idle | FlowState::Completed => None,
        };
        let empty = InteractionInput::new();

        let pending = match (suspended, input) {
            (Some((true, _)), input) => self.resume(procedure, input.unwrap_or(&empty)).await?,
            (Some((false, request)), None) => Some(request),
            (Some((false, _)), Some(input)) => self.resume(procedure, input).await?,
            (None, _) => self.start(procedure).await?,
        };

        match pending {
            Some(request) => Err(AuthError::InteractionRequired(Box::new(request))),
            None => Ok(()),
        }
    }

    fn apply(&mut self, step: Step) -> Option<InteractionRequest> {
        match step {
            Step::Done => {
                tracing::info!("login completed");
                self.state = FlowState::Completed;
                self.context.clear();
                None
            }
            Step::Ask { step, request } => {
                tracing::info!(step = %step, "login suspended for user input");
                self.state = FlowState::Suspended {
                    step,
                    request: request.clone(),
                    attempts: 0,
                    polling: false,
                };
                Some(request)
            }
            Step::Poll { step, request } => {
                tracing::info!(step = %step, "login suspended for decoupled validation");
                self.state = FlowState::Suspended {
                    step,
                    request: request.clone(),
                    attempts: 0,
                    polling: true,
                };
                Some(request)
            }
        }
    }
}
