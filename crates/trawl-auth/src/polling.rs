//! Decoupled (app) validation polling.

use crate::error::{AuthError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;
use trawl_core::AuthConfig;

/// Poll cadence and budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    pub interval: Duration,
    pub timeout: Duration,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(5),
            timeout: Duration::from_secs(600),
        }
    }
}

impl PollPolicy {
    pub fn from_config(config: &AuthConfig) -> Self {
        Self {
            interval: config.poll_interval(),
            timeout: config.poll_timeout(),
        }
    }
}

/// Status reported by the site for a pending validation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationStatus {
    Pending,
    /// Validated by the user
    Completed,
    /// Answered by the user; the answer is fetched by the next step
    Responded,
    /// The site gave up waiting
    Timeout,
    Cancelled,
    /// Anything the module does not know how to classify
    Other(String),
}

/// One poll of a pending validation.
#[async_trait]
pub trait ValidationPoller: Send {
    async fn poll(&mut self) -> Result<ValidationStatus>;
}

/// Adapts a closure returning a future into a [`ValidationPoller`].
pub struct PollFn<F>(pub F);

#[async_trait]
impl<F, Fut> ValidationPoller for PollFn<F>
where
    F: FnMut() -> Fut + Send,
    Fut: Future<Output = Result<ValidationStatus>> + Send,
{
    async fn poll(&mut self) -> Result<ValidationStatus> {
        (self.0)().await
    }
}

/// Poll until the validation settles.
///
/// Polls immediately, then once per interval. Sleeping uses tokio time, so
/// only the calling task waits.
///
/// # Errors
/// - [`AuthError::AppValidationExpired`] on `Timeout` or when the budget runs out
/// - [`AuthError::AppValidationCancelled`] on `Cancelled`
/// - [`AuthError::Assertion`] on an unknown status
pub async fn poll_validation<P>(policy: PollPolicy, poller: &mut P) -> Result<ValidationStatus>
where
    P: ValidationPoller + ?Sized,
{
    let started = Instant::now();
    let mut polls = 0u32;

    loop {
        let status = poller.poll().await?;
        polls += 1;
        tracing::debug!(polls, status = ?status, "polled decoupled validation");

        match status {
            ValidationStatus::Completed | ValidationStatus::Responded => {
                tracing::info!(polls, "decoupled validation confirmed");
                return Ok(status);
            }
            ValidationStatus::Timeout => {
                return Err(AuthError::AppValidationExpired {
                    message: "the site reported the validation as expired".to_string(),
                })
            }
            ValidationStatus::Cancelled => {
                return Err(AuthError::AppValidationCancelled {
                    message: String::new(),
                })
            }
            ValidationStatus::Other(other) => {
                return Err(AuthError::Assertion(format!(
                    "unhandled validation status: {other}"
                )))
            }
            ValidationStatus::Pending => {}
        }

        if started.elapsed() + policy.interval > policy.timeout {
            tracing::warn!(polls, timeout_secs = policy.timeout.as_secs(), "decoupled validation timed out");
            return Err(AuthError::AppValidationExpired {
                message: format!("not validated within {} seconds", policy.timeout.as_secs()),
            });
        }
        tokio::time::sleep(policy.interval).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};

    struct Scripted {
        statuses: VecDeque<ValidationStatus>,
        polls: u32,
    }

    #[async_trait]
    impl ValidationPoller for Scripted {
        async fn poll(&mut self) -> Result<ValidationStatus> {
            self.polls += 1;
            Ok(self.statuses.pop_front().unwrap_or(ValidationStatus::Pending))
        }
    }

    fn scripted(statuses: &[ValidationStatus]) -> Scripted {
        Scripted {
            statuses: statuses.iter().cloned().collect(),
            polls: 0,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_completes_after_three_polls() {
        let mut poller = scripted(&[
            ValidationStatus::Pending,
            ValidationStatus::Pending,
            ValidationStatus::Completed,
        ]);
        let started = Instant::now();

        let status = poll_validation(PollPolicy::default(), &mut poller)
            .await
            .expect("validated");

        assert_eq!(status, ValidationStatus::Completed);
        assert_eq!(poller.polls, 3);
        assert_eq!(started.elapsed(), Duration::from_secs(10));
    }

    #[tokio::test(start_paused = true)]
    async fn test_always_pending_expires_within_budget() {
        let mut poller = scripted(&[]);
        let started = Instant::now();

        let err = poll_validation(PollPolicy::default(), &mut poller)
            .await
            .expect_err("expired");

        assert!(matches!(err, AuthError::AppValidationExpired { .. }));
        assert!(started.elapsed() <= Duration::from_secs(600));
        assert_eq!(poller.polls, 121);
    }

    #[tokio::test(start_paused = true)]
    async fn test_terminal_statuses() {
        let mut cancelled = scripted(&[ValidationStatus::Cancelled]);
        assert!(matches!(
            poll_validation(PollPolicy::default(), &mut cancelled).await,
            Err(AuthError::AppValidationCancelled { .. })
        ));

        let mut timeout = scripted(&[ValidationStatus::Pending, ValidationStatus::Timeout]);
        assert!(matches!(
            poll_validation(PollPolicy::default(), &mut timeout).await,
            Err(AuthError::AppValidationExpired { .. })
        ));

        let mut odd = scripted(&[ValidationStatus::Other("frozen".to_string())]);
        assert!(matches!(
            poll_validation(PollPolicy::default(), &mut odd).await,
            Err(AuthError::Assertion(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_poll_fn_adapter() {
        let calls = Arc::new(Mutex::new(0u32));
        let counter = calls.clone();
        let mut poller = PollFn(move || {
            let counter = counter.clone();
            async move {
                let mut n = counter.lock().expect("lock");
                *n += 1;
                Ok::<_, AuthError>(if *n < 2 {
                    ValidationStatus::Pending
                } else {
                    ValidationStatus::Responded
                })
            }
        });

        let policy = PollPolicy {
            interval: Duration::from_secs(1),
            timeout: Duration::from_secs(3),
        };
        let status = poll_validation(policy, &mut poller).await.expect("responded");
        assert_eq!(status, ValidationStatus::Responded);
        assert_eq!(*calls.lock().expect("lock"), 2);
    }
}
