//! Retry-with-backoff wrapper shared by retryable collaborator calls.
//!
//! Transient vs. permanent is decided per call site through an allow-list of
//! [`ErrorKind`]s. Without an allow-list every error is retried (legacy
//! mode). Every error leaving the wrapper is tagged with the number of
//! retries already consumed.

use std::future::Future;
use std::time::Duration;

use tracing::warn;

use crate::error::{ErrorKind, PipelineError, Result};

/// Configuration for retry behavior.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Maximum number of retries, not counting the initial attempt.
    pub max_retries: u32,
    /// Base delay before the first retry. Actual delay = base * 2^attempt.
    pub base_delay: Duration,
    /// Hard cap on the computed delay.
    pub max_delay: Duration,
    /// Error kinds eligible for retry. `None` retries everything.
    pub transient_kinds: Option<Vec<ErrorKind>>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
            transient_kinds: None,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_retries: u32, base_delay: Duration) -> Self {
        Self {
            max_retries,
            base_delay,
            ..Self::default()
        }
    }

    /// Restrict retries to the given error kinds.
    pub fn transient_on(mut self, kinds: &[ErrorKind]) -> Self {
        self.transient_kinds = Some(kinds.to_vec());
        self
    }

    /// Compute the delay for a given attempt number (0-indexed).
    ///
    /// 2^attempt is computed with a checked shift so large attempt values
    /// saturate at `max_delay` instead of overflowing.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let multiplier = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
        self.base_delay
            .checked_mul(multiplier)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }

    fn is_transient(&self, err: &PipelineError) -> bool {
        match &self.transient_kinds {
            None => true,
            Some(kinds) => kinds.contains(&err.kind()),
        }
    }
}

/// Execute an async operation with exponential backoff.
///
/// The closure receives the current attempt number (0-indexed). A permanent
/// error returns immediately; a transient one sleeps and retries up to
/// `policy.max_retries` times. Either way the final error is wrapped as
/// [`PipelineError::Retried`] carrying the retries consumed before it
/// propagated (0 when the first attempt failed permanently).
pub async fn retry_with_backoff<T, F, Fut>(
    policy: &RetryPolicy,
    op_name: &'static str,
    mut op: F,
) -> Result<T>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T>>,
{
    for attempt in 0..=policy.max_retries {
        match op(attempt).await {
            Ok(value) => return Ok(value),
            Err(err) => {
                if !policy.is_transient(&err) || attempt >= policy.max_retries {
                    return Err(PipelineError::retried(attempt, err));
                }
                let delay = policy.delay_for_attempt(attempt);
                warn!(
                    operation = op_name,
                    attempt = attempt + 1,
                    max = policy.max_retries,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "retrying after transient error"
                );
                tokio::time::sleep(delay).await;
            }
        }
    }

    // Unreachable: the loop covers 0..=max_retries and the final iteration
    // always returns.
    Err(PipelineError::internal("retry loop exited without result"))
}
