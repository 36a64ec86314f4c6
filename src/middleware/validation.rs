//! Required-field validation
//!
//! Rejects messages with an empty or whitespace-only sender, subject, or
//! content before any downstream work happens.

use crate::message::{HandlerResult, Message};
use crate::pipeline::{DispatchResult, Middleware, Next};
use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

/// Short-circuits with a failed result when a required field is blank.
#[derive(Debug, Clone, Default)]
pub struct ValidationMiddleware;

impl ValidationMiddleware {
    /// Creates the middleware.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    fn first_blank_field(message: &Message) -> Option<&'static str> {
        if message.sender_id.trim().is_empty() {
            Some("sender_id")
        } else if message.subject.trim().is_empty() {
            Some("subject")
        } else if message.content.trim().is_empty() {
            Some("content")
        } else {
            None
        }
    }
}

#[async_trait]
impl Middleware for ValidationMiddleware {
    fn name(&self) -> &str {
        "validation"
    }

    async fn handle(
        &self,
        message: &mut Message,
        next: Next<'_>,
        cancel: &CancellationToken,
    ) -> DispatchResult {
        if let Some(field) = Self::first_blank_field(message) {
            return Ok(HandlerResult::fail(format!(
                "Message validation failed: {field} is required"
            )));
        }
        next.run(message, cancel).await
    }
}
