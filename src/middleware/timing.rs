//! Wall-clock timing
//!
//! Measures how long the downstream chain takes and attaches the elapsed
//! milliseconds to the result's data map.

use crate::message::Message;
use crate::pipeline::{DispatchResult, Middleware, Next};
use async_trait::async_trait;
use serde_json::json;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Result-data key for the measured processing time.
pub const PROCESSING_TIME_KEY: &str = "ProcessingTimeMs";

/// Records downstream elapsed time into `result.data["ProcessingTimeMs"]`.
#[derive(Debug, Clone, Default)]
pub struct TimingMiddleware;

impl TimingMiddleware {
    /// Creates the middleware.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Middleware for TimingMiddleware {
    fn name(&self) -> &str {
        "timing"
    }

    async fn handle(
        &self,
        message: &mut Message,
        next: Next<'_>,
        cancel: &CancellationToken,
    ) -> DispatchResult {
        let message_id = message.id.clone();
        let started = Instant::now();
        let mut result = next.run(message, cancel).await?;
        let elapsed_ms = started.elapsed().as_secs_f64() * 1_000.0;

        debug!(message_id = %message_id, elapsed_ms, "message processed");
        result
            .data
            .insert(PROCESSING_TIME_KEY.to_string(), json!(elapsed_ms));
        Ok(result)
    }
}
