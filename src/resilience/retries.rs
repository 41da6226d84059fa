//! Retry policy for operations against unreliable dependencies.
//!
//! # Responsibilities
//! - Bound (or not) the number of attempts
//! - Sleep the backoff delay between attempts
//! - Surface the last error once attempts are exhausted
//!
//! # Design Decisions
//! - The policy is a value; the retried operation is a closure taking the
//!   attempt number, so callers log and record metrics with their own context
//! - With `MaxAttempts::Unbounded` the returned future only resolves on success

use std::fmt::{Debug, Display};
use std::future::Future;
use std::time::Duration;

use thiserror::Error;

use crate::config::schema::RetryConfig;
use crate::resilience::backoff::Backoff;

/// Upper bound on attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MaxAttempts {
    #[default]
    Unbounded,
    Limited(u32),
}

/// Error returned when a limited policy runs out of attempts.
#[derive(Debug, Error)]
#[error("gave up after {attempts} attempt(s): {last_error}")]
pub struct RetryError<E: Debug + Display> {
    pub attempts: u32,
    pub last_error: E,
}

/// When and how often to retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RetryPolicy {
    pub max_attempts: MaxAttempts,
    pub backoff: Backoff,
}

impl RetryPolicy {
    pub fn new(max_attempts: MaxAttempts, backoff: Backoff) -> Self {
        Self {
            max_attempts,
            backoff,
        }
    }

    pub fn from_config(config: &RetryConfig) -> Self {
        let max_attempts = match config.max_attempts {
            Some(n) => MaxAttempts::Limited(n.max(1)),
            None => MaxAttempts::Unbounded,
        };
        Self::new(max_attempts, Backoff::from_config(config))
    }

    /// Whether another attempt may follow failed attempt number `attempt`.
    pub fn should_retry(&self, attempt: u32) -> bool {
        match self.max_attempts {
            MaxAttempts::Unbounded => true,
            MaxAttempts::Limited(max) => attempt < max,
        }
    }

    /// Run `operation` until it succeeds or the policy gives up.
    ///
    /// `operation` receives the 1-based attempt number.
    pub async fn run<T, E, F, Fut>(&self, operation: F) -> Result<T, RetryError<E>>
    where
        E: Debug + Display,
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        self.run_notify(operation, |_, _, _| {}).await
    }

    /// Like [`run`](Self::run), reporting each failure to `on_failure` with
    /// the delay actually slept before the next attempt (`None` when giving up).
    pub async fn run_notify<T, E, F, Fut, N>(
        &self,
        mut operation: F,
        mut on_failure: N,
    ) -> Result<T, RetryError<E>>
    where
        E: Debug + Display,
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        N: FnMut(u32, &E, Option<Duration>),
    {
        let mut attempt: u32 = 0;
        loop {
            attempt = attempt.saturating_add(1);
            match operation(attempt).await {
                Ok(value) => return Ok(value),
                Err(e) => {
                    if !self.should_retry(attempt) {
                        on_failure(attempt, &e, None);
                        return Err(RetryError {
                            attempts: attempt,
                            last_error: e,
                        });
                    }
                    let delay = self.backoff.delay(attempt);
                    on_failure(attempt, &e, Some(delay));
                    tracing::debug!(
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Retrying after backoff"
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
}
