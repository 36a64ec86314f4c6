//! Bounded retry with linear-scaled backoff
//!
//! Re-invokes the downstream chain on failure, sleeping `base_delay × attempt`
//! between attempts (no sleep after the last). A failed result on the final
//! attempt is returned as-is; an error on the final attempt is converted into
//! a failed result naming the attempt count. Cancellation is never retried
//! and never converted.

use crate::clock::SharedClock;
use crate::domain_types::{BaseDelayMs, MaxAttempts};
use crate::message::{HandlerResult, Message};
use crate::pipeline::{DispatchResult, Middleware, Next};
use async_trait::async_trait;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::warn;

/// Retries the downstream on failed results and errors.
pub struct RetryMiddleware {
    max_attempts: MaxAttempts,
    base_delay: BaseDelayMs,
    clock: SharedClock,
}

impl RetryMiddleware {
    /// Creates the middleware. A single-attempt configuration never retries;
    /// a zero base delay retries immediately.
    #[must_use]
    pub fn new(max_attempts: MaxAttempts, base_delay: BaseDelayMs, clock: SharedClock) -> Self {
        Self {
            max_attempts,
            base_delay,
            clock,
        }
    }

    fn backoff_for(&self, attempt: u32) -> Duration {
        Duration::from_millis(self.base_delay.as_u64().saturating_mul(u64::from(attempt)))
    }
}

#[async_trait]
impl Middleware for RetryMiddleware {
    fn name(&self) -> &str {
        "retry"
    }

    async fn handle(
        &self,
        message: &mut Message,
        next: Next<'_>,
        cancel: &CancellationToken,
    ) -> DispatchResult {
        let max_attempts = self.max_attempts.as_u32();
        let mut last_failure: Option<HandlerResult> = None;

        for attempt in 1..=max_attempts {
            match next.run(message, cancel).await {
                Ok(result) if result.success => return Ok(result),
                Ok(result) => {
                    warn!(
                        message_id = %message.id,
                        attempt,
                        max_attempts,
                        error = result.error.as_deref().unwrap_or("unknown"),
                        "attempt failed"
                    );
                    last_failure = Some(result);
                }
                Err(error) if error.is_cancelled() => return Err(error),
                Err(error) => {
                    warn!(
                        message_id = %message.id,
                        attempt,
                        max_attempts,
                        %error,
                        "attempt errored"
                    );
                    if attempt == max_attempts {
                        return Ok(HandlerResult::fail(format!(
                            "Failed after {max_attempts} attempts: {error}"
                        )));
                    }
                    last_failure = None;
                }
            }

            if attempt < max_attempts {
                let backoff = self.backoff_for(attempt);
                if !backoff.is_zero() {
                    self.clock.sleep(backoff).await;
                }
                if cancel.is_cancelled() {
                    return Err(crate::error::DispatchError::Cancelled);
                }
            }
        }

        Ok(last_failure.unwrap_or_else(|| {
            HandlerResult::fail(format!("Failed after {max_attempts} attempts"))
        }))
    }
}
