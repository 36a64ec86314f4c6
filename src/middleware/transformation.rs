//! Message normalization and sanitization
//!
//! Trims surrounding whitespace, collapses runs of whitespace in the subject,
//! and strips a fixed set of dangerous substrings from subject and content.
//! Sanitization is exact-case by contract: `<SCRIPT>` passes through
//! untouched while `<script>` is removed.

use crate::message::Message;
use crate::pipeline::{DispatchResult, Middleware, Next};
use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

const STRIPPED_TOKENS: [&str; 4] = ["<script>", "</script>", "javascript:", "onerror="];

/// Normalizes and sanitizes subject and content in place.
#[derive(Debug, Clone, Default)]
pub struct TransformationMiddleware;

impl TransformationMiddleware {
    /// Creates the middleware.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    fn sanitize(text: &str) -> String {
        let mut sanitized = text.to_string();
        for token in STRIPPED_TOKENS {
            sanitized = sanitized.replace(token, "");
        }
        sanitized
    }

    fn collapse_whitespace(text: &str) -> String {
        text.split_whitespace().collect::<Vec<_>>().join(" ")
    }
}

#[async_trait]
impl Middleware for TransformationMiddleware {
    fn name(&self) -> &str {
        "transformation"
    }

    async fn handle(
        &self,
        message: &mut Message,
        next: Next<'_>,
        cancel: &CancellationToken,
    ) -> DispatchResult {
        message.subject = Self::collapse_whitespace(&Self::sanitize(&message.subject));
        message.content = Self::sanitize(&message.content).trim().to_string();
        next.run(message, cancel).await
    }
}
