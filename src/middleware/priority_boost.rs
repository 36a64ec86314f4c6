//! VIP priority boost
//!
//! Raises the priority of messages from configured senders to `High`.
//! Matching is ASCII case-insensitive; already-high or urgent messages are
//! left alone (the boost never downgrades).

use crate::message::{Message, MessagePriority};
use crate::pipeline::{DispatchResult, Middleware, Next};
use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

/// Boosts priority for a configured sender list.
#[derive(Debug, Clone)]
pub struct PriorityBoostMiddleware {
    vip_senders: Vec<String>,
}

impl PriorityBoostMiddleware {
    /// Creates the middleware with the VIP sender ids.
    #[must_use]
    pub fn new(vip_senders: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            vip_senders: vip_senders.into_iter().map(Into::into).collect(),
        }
    }

    fn is_vip(&self, sender_id: &str) -> bool {
        self.vip_senders
            .iter()
            .any(|vip| vip.eq_ignore_ascii_case(sender_id))
    }
}

#[async_trait]
impl Middleware for PriorityBoostMiddleware {
    fn name(&self) -> &str {
        "priority-boost"
    }

    async fn handle(
        &self,
        message: &mut Message,
        next: Next<'_>,
        cancel: &CancellationToken,
    ) -> DispatchResult {
        if self.is_vip(&message.sender_id) && message.priority < MessagePriority::High {
            message.priority = MessagePriority::High;
        }
        next.run(message, cancel).await
    }
}
