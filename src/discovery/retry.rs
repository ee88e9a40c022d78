//! Retry Policy
//!
//! Error classification and exponential backoff with jitter. Classification
//! reads the full error chain text, where the HTTP layer records the status
//! line of failed requests.

use super::progress::ProgressHandle;
use crate::api::http::status_code;
use anyhow::Result;
use rand::Rng;
use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Default number of retries after the first attempt
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Default delay before the first retry
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_secs(1);

/// Default upper bound for any single backoff
pub const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(30);

/// Symmetric jitter applied to each backoff (+/- 10%)
const JITTER_FRACTION: f64 = 0.1;

const TRANSIENT_MARKERS: &[&str] = &[
    "timed out",
    "timeout",
    "connection reset",
    "connection refused",
    "connection closed",
    "broken pipe",
    "error sending request",
    "too many requests",
    "rate limit",
    "throttl",
    "internal server error",
    "bad gateway",
    "service unavailable",
    "gateway timeout",
    "temporarily unavailable",
];

const SKIPPABLE_MARKERS: &[&str] = &[
    "notauthorizedornotfound",
    "not authorized",
    "notauthorized",
    "not found",
    "notfound",
    "forbidden",
    "unauthorized",
];

fn chain_text(err: &anyhow::Error) -> String {
    format!("{:#}", err).to_lowercase()
}

/// The failure is expected to go away on retry (timeouts, throttling, 5xx)
pub fn is_transient(err: &anyhow::Error) -> bool {
    let text = chain_text(err);
    if let Some(code) = status_code(&text) {
        return code == 429 || (500..600).contains(&code);
    }
    TRANSIENT_MARKERS.iter().any(|m| text.contains(m))
}

/// The target does not exist or is not accessible to the caller
pub fn is_skippable(err: &anyhow::Error) -> bool {
    let text = chain_text(err);
    if let Some(code) = status_code(&text) {
        return matches!(code, 401 | 403 | 404);
    }
    SKIPPABLE_MARKERS.iter().any(|m| text.contains(m))
}

/// Retry settings
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Retries after the first attempt
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_delay: DEFAULT_BASE_DELAY,
            max_delay: DEFAULT_MAX_DELAY,
        }
    }
}

impl RetryPolicy {
    pub fn with_max_attempts(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            ..Default::default()
        }
    }

    /// Backoff before retry number `attempt + 1`: min(base * 2^attempt, max)
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt);
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }

    fn jittered_backoff(&self, attempt: u32) -> Duration {
        let jitter = rand::thread_rng().gen_range(-JITTER_FRACTION..=JITTER_FRACTION);
        self.backoff(attempt).mul_f64(1.0 + jitter)
    }

    /// Run `op`, retrying transient failures.
    ///
    /// Non-transient errors are returned unchanged after one call. Transient
    /// errors are retried up to `max_attempts` times; exhaustion returns the
    /// last error with `label` and the attempt count attached. Cancellation
    /// interrupts both the operation and any pending backoff.
    pub async fn run<T, F, Fut>(
        &self,
        label: &str,
        cancel: &CancellationToken,
        progress: &ProgressHandle,
        mut op: F,
    ) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempt = 0;

        loop {
            if cancel.is_cancelled() {
                return Err(anyhow::anyhow!("{}: cancelled", label));
            }

            let result = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    return Err(anyhow::anyhow!("{}: cancelled", label));
                }
                result = op() => result,
            };

            let err = match result {
                Ok(value) => return Ok(value),
                Err(err) => err,
            };

            if !is_transient(&err) {
                return Err(err);
            }

            if attempt >= self.max_attempts {
                return Err(err.context(format!(
                    "{}: giving up after {} attempts",
                    label,
                    attempt + 1
                )));
            }

            let delay = self.jittered_backoff(attempt);
            tracing::debug!(
                "{}: transient failure (attempt {}), retrying in {:?}: {:#}",
                label,
                attempt + 1,
                delay,
                err
            );
            progress.retry();

            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    return Err(err.context(format!("{}: cancelled during backoff", label)));
                }
                _ = tokio::time::sleep(delay) => {}
            }

            attempt += 1;
        }
    }
}
