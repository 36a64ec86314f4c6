//! Before/after logging
//!
//! Emits structured events through the [`Logger`] collaborator around the
//! downstream call. Never alters the result; errors are logged and
//! re-propagated unchanged.

use crate::logger::Logger;
use crate::message::Message;
use crate::pipeline::{DispatchResult, Middleware, Next};
use std::sync::Arc;
use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

/// Logs message entry and outcome.
pub struct LoggingMiddleware {
    logger: Arc<dyn Logger>,
}

impl LoggingMiddleware {
    /// Creates the middleware with a logger collaborator.
    #[must_use]
    pub fn new(logger: Arc<dyn Logger>) -> Self {
        Self { logger }
    }
}

#[async_trait]
impl Middleware for LoggingMiddleware {
    fn name(&self) -> &str {
        "logging"
    }

    async fn handle(
        &self,
        message: &mut Message,
        next: Next<'_>,
        cancel: &CancellationToken,
    ) -> DispatchResult {
        self.logger.info(&format!(
            "processing message {} from '{}' (category '{}', subject '{}')",
            message.id, message.sender_id, message.category, message.subject
        ));
        let message_id = message.id.clone();

        match next.run(message, cancel).await {
            Ok(result) => {
                if result.success {
                    self.logger
                        .info(&format!("message {message_id} handled successfully"));
                } else {
                    self.logger.warn(&format!(
                        "message {message_id} failed: {}",
                        result.error.as_deref().unwrap_or("unknown")
                    ));
                }
                Ok(result)
            }
            Err(error) => {
                self.logger
                    .error(&format!("message {message_id} aborted: {error}"));
                Err(error)
            }
        }
    }
}
