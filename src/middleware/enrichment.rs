//! Metadata enrichment
//!
//! Stamps arrival metadata on every message: `ReceivedAt` (set once),
//! `ProcessedBy` (overwritten each pass), and a generated conversation id
//! when none is present. A whitespace-only conversation id counts as present;
//! only a missing or empty one is replaced.

use crate::clock::SharedClock;
use crate::message::Message;
use crate::pipeline::{DispatchResult, Middleware, Next};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Metadata key for the first-seen UTC timestamp.
pub const RECEIVED_AT_KEY: &str = "ReceivedAt";
/// Metadata key for the processing host name.
pub const PROCESSED_BY_KEY: &str = "ProcessedBy";

/// Ensures arrival metadata and a conversation id exist.
pub struct EnrichmentMiddleware {
    clock: SharedClock,
    machine_name: String,
}

impl EnrichmentMiddleware {
    /// Creates the middleware; the machine name is read from the environment
    /// (`HOSTNAME`, then `COMPUTERNAME`) with a fixed fallback.
    #[must_use]
    pub fn new(clock: SharedClock) -> Self {
        let machine_name = std::env::var("HOSTNAME")
            .or_else(|_| std::env::var("COMPUTERNAME"))
            .unwrap_or_else(|_| "unknown-host".to_string());
        Self {
            clock,
            machine_name,
        }
    }

    /// Creates the middleware with an explicit machine name.
    #[must_use]
    pub fn with_machine_name(clock: SharedClock, machine_name: impl Into<String>) -> Self {
        Self {
            clock,
            machine_name: machine_name.into(),
        }
    }

    /// The machine name stamped into `ProcessedBy`.
    #[must_use]
    pub fn machine_name(&self) -> &str {
        &self.machine_name
    }
}

#[async_trait]
impl Middleware for EnrichmentMiddleware {
    fn name(&self) -> &str {
        "enrichment"
    }

    async fn handle(
        &self,
        message: &mut Message,
        next: Next<'_>,
        cancel: &CancellationToken,
    ) -> DispatchResult {
        if !message.metadata.contains_key(RECEIVED_AT_KEY) {
            let received_at: DateTime<Utc> = self.clock.now().into();
            message.metadata.insert(
                RECEIVED_AT_KEY.to_string(),
                Value::String(received_at.to_rfc3339()),
            );
        }

        message.metadata.insert(
            PROCESSED_BY_KEY.to_string(),
            Value::String(self.machine_name.clone()),
        );

        // Null-or-empty check by contract: whitespace-only ids are preserved.
        if message
            .conversation_id
            .as_deref()
            .is_none_or(str::is_empty)
        {
            message.conversation_id = Some(Uuid::new_v4().simple().to_string());
        }

        next.run(message, cancel).await
    }
}
