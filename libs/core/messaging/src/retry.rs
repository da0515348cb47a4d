//! Retry policy applied around broker operations.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

/// Backoff strategy for retries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackoffStrategy {
    /// Fixed delay between retries
    Fixed(Duration),

    /// `base * 2^attempt`, capped at `max`
    Exponential { base: Duration, max: Duration },
}

impl BackoffStrategy {
    /// Delay to wait after the given failed attempt (1-based).
    pub fn delay(&self, attempt: u32) -> Duration {
        match self {
            BackoffStrategy::Fixed(d) => *d,
            BackoffStrategy::Exponential { base, max } => {
                let delay = base.saturating_mul(2u32.saturating_pow(attempt));
                delay.min(*max)
            }
        }
    }
}

/// Outcome of running an operation under a [`RetryPolicy`].
#[derive(Debug)]
pub enum RetryOutcome<T, E> {
    /// The operation succeeded on attempt number `attempts`
    Succeeded { value: T, attempts: u32 },

    /// All attempts failed; `error` is the cause of the last one
    Exhausted { error: E, attempts: u32 },
}

impl<T, E> RetryOutcome<T, E> {
    /// Total attempts made, including the first one.
    pub fn attempts(&self) -> u32 {
        match self {
            RetryOutcome::Succeeded { attempts, .. } | RetryOutcome::Exhausted { attempts, .. } => {
                *attempts
            }
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, RetryOutcome::Succeeded { .. })
    }

    pub fn into_result(self) -> Result<T, E> {
        match self {
            RetryOutcome::Succeeded { value, .. } => Ok(value),
            RetryOutcome::Exhausted { error, .. } => Err(error),
        }
    }
}

/// Retry policy: how many times to retry and how long to wait in between.
///
/// The default policy retries 3 times (4 attempts in total) and waits
/// 2s, 4s and 8s before the retries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt
    pub max_retries: u32,

    /// Delay between attempts
    pub backoff: BackoffStrategy,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            backoff: BackoffStrategy::Exponential {
                base: Duration::from_secs(1),
                max: Duration::from_secs(60),
            },
        }
    }
}

impl RetryPolicy {
    /// A policy that never retries.
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            backoff: BackoffStrategy::Fixed(Duration::ZERO),
        }
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_backoff(mut self, backoff: BackoffStrategy) -> Self {
        self.backoff = backoff;
        self
    }

    /// Total attempts allowed by this policy.
    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// Run `operation` until it succeeds or the policy is exhausted.
    ///
    /// The closure receives the 1-based attempt number. Each failure that
    /// will be retried is logged with the attempt number and its cause.
    pub async fn run<F, Fut, T, E>(&self, operation_name: &str, operation: F) -> RetryOutcome<T, E>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Display,
    {
        self.run_if(operation_name, operation, |_| true).await
    }

    /// Like [`run`](Self::run), but stops at the first error for which
    /// `retryable` returns `false`.
    pub async fn run_if<F, Fut, T, E, R>(
        &self,
        operation_name: &str,
        mut operation: F,
        retryable: R,
    ) -> RetryOutcome<T, E>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Display,
        R: Fn(&E) -> bool,
    {
        let mut attempt = 1;

        loop {
            match operation(attempt).await {
                Ok(value) => {
                    if attempt > 1 {
                        debug!(operation = operation_name, attempt, "Operation succeeded after retry");
                    }
                    return RetryOutcome::Succeeded {
                        value,
                        attempts: attempt,
                    };
                }
                Err(error) => {
                    if !retryable(&error) {
                        warn!(
                            operation = operation_name,
                            attempts = attempt,
                            error = %error,
                            "Giving up on non-retryable error"
                        );
                        return RetryOutcome::Exhausted {
                            error,
                            attempts: attempt,
                        };
                    }

                    if attempt > self.max_retries {
                        warn!(
                            operation = operation_name,
                            attempts = attempt,
                            error = %error,
                            "Giving up after final attempt"
                        );
                        return RetryOutcome::Exhausted {
                            error,
                            attempts: attempt,
                        };
                    }

                    let delay = self.backoff.delay(attempt);
                    warn!(
                        operation = operation_name,
                        attempt,
                        error = %error,
                        retry_in_ms = delay.as_millis() as u64,
                        "Operation failed, retrying"
                    );

                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}
