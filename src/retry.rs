//! Retry executor for control-plane calls
//!
//! Every remote operation goes through [`with_retry`]. Failures carrying a
//! client-error status code are terminal and surface immediately; anything
//! else is retried with linear backoff (`base_delay * attempt_number`) until
//! the attempt budget is exhausted, at which point the last error surfaces.
//!
//! # Example
//!
//! ```ignore
//! use berth::retry::{with_retry, RetryPolicy};
//!
//! let status = with_retry(&RetryPolicy::default(), "get_workload", || async {
//!     client.get_workload("tenant-acme", "churn").await
//! })
//! .await?;
//! ```

use std::time::Duration;

use tracing::{error, warn};

use crate::error::ControlPlaneError;

/// Retry budget for one control-plane operation
///
/// Created per call and discarded after; cheap to clone.
#[derive(Clone, Debug)]
pub struct RetryPolicy {
    /// Maximum number of attempts (including the first)
    pub max_attempts: u32,
    /// Base delay; attempt `n` waits `base_delay * n` before retrying
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(500),
        }
    }
}

impl RetryPolicy {
    /// Create a policy with a custom attempt budget
    pub fn with_max_attempts(attempts: u32) -> Self {
        Self {
            max_attempts: attempts,
            ..Default::default()
        }
    }
}

/// Execute an async control-plane operation under a retry policy.
///
/// Terminal errors (client-error status codes) are surfaced immediately
/// without consuming the retry budget. Transient errors are retried with
/// linearly increasing delays; after the last attempt the last error is
/// surfaced.
pub async fn with_retry<F, Fut, T>(
    policy: &RetryPolicy,
    operation_name: &str,
    mut operation: F,
) -> Result<T, ControlPlaneError>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, ControlPlaneError>>,
{
    let mut attempt = 0u32;

    loop {
        attempt += 1;

        match operation().await {
            Ok(result) => return Ok(result),
            Err(e) if e.is_terminal() => {
                error!(
                    operation = %operation_name,
                    attempt = attempt,
                    error = %e,
                    "Operation failed terminally, not retrying"
                );
                return Err(e);
            }
            Err(e) => {
                if attempt >= policy.max_attempts {
                    error!(
                        operation = %operation_name,
                        attempt = attempt,
                        error = %e,
                        "Operation failed after max retries"
                    );
                    return Err(e);
                }

                let delay = policy.base_delay * attempt;
                warn!(
                    operation = %operation_name,
                    attempt = attempt,
                    error = %e,
                    delay_ms = delay.as_millis(),
                    "Operation failed, retrying"
                );

                tokio::time::sleep(delay).await;
            }
        }
    }
}
