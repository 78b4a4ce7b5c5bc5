//! Retry with exponential backoff for hosted model calls
//!
//! Transient provider failures (rate limits, overload, exhausted quota) are
//! retried on a doubling schedule; everything else fails on first attempt.

use backoff::backoff::Backoff;
use std::future::Future;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use crate::config::RetryConfig;
use crate::errors::LlmError;
use crate::metrics;

/// How many times and how patiently to retry transient provider errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt
    pub max_retries: u32,
    /// Delay before the first retry; doubled for each one after
    pub initial_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 5,
            initial_delay: Duration::from_millis(2000),
        }
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            initial_delay: config.initial_delay(),
        }
    }
}

impl RetryPolicy {
    /// A policy that never waits, for callers that must fail fast
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            initial_delay: Duration::ZERO,
        }
    }
}

/// Doubling backoff with a fixed retry budget and no jitter
#[derive(Debug, Clone)]
pub struct TransientBackoff {
    policy: RetryPolicy,
    next_delay: Duration,
    remaining: u32,
}

impl TransientBackoff {
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            policy,
            next_delay: policy.initial_delay,
            remaining: policy.max_retries,
        }
    }
}

impl Backoff for TransientBackoff {
    fn next_backoff(&mut self) -> Option<Duration> {
        if self.remaining == 0 {
            return None;
        }
        self.remaining -= 1;
        let delay = self.next_delay;
        self.next_delay = self.next_delay.saturating_mul(2);
        Some(delay)
    }

    fn reset(&mut self) {
        self.next_delay = self.policy.initial_delay;
        self.remaining = self.policy.max_retries;
    }
}

/// Run `call` until it succeeds, fails permanently, or the policy runs out.
///
/// The error of the last attempt is returned unchanged.
pub async fn with_retry<T, F, Fut>(
    policy: RetryPolicy,
    operation: &str,
    mut call: F,
) -> Result<T, LlmError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, LlmError>>,
{
    let started = Instant::now();

    let result = backoff::future::retry_notify(
        TransientBackoff::new(policy),
        || {
            let attempt = call();
            async move {
                attempt.await.map_err(|err| {
                    if err.is_transient() {
                        backoff::Error::transient(err)
                    } else {
                        backoff::Error::permanent(err)
                    }
                })
            }
        },
        |err: LlmError, delay: Duration| {
            warn!(
                operation = operation,
                error = %err,
                delay_ms = delay.as_millis() as u64,
                "Transient provider error, retrying"
            );
            metrics::record_provider_retry(operation);
        },
    )
    .await;

    let elapsed = started.elapsed().as_secs_f64();
    metrics::record_provider_call(operation, elapsed, result.is_ok());
    if let Err(err) = &result {
        debug!(operation = operation, error = %err, elapsed_secs = elapsed, "Provider call gave up");
    }
    result
}
