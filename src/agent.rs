//! Agent capability surface consumed by the router
//!
//! Concrete agents live outside this crate; the core only sees the [`Agent`]
//! trait: identity, availability, a capability set, and an async handler.

use crate::error::DispatchError;
use crate::message::{HandlerResult, Message};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tokio_util::sync::CancellationToken;

/// Agent availability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum AgentStatus {
    /// Accepting messages.
    #[default]
    Available,
    /// Temporarily saturated.
    Busy,
    /// Not accepting messages.
    Offline,
}

/// What an agent can do.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AgentCapabilities {
    /// Skill tags, matched case-insensitively.
    pub skills: HashSet<String>,
    /// Categories the agent accepts, matched case-sensitively.
    pub supported_categories: HashSet<String>,
    /// Upper bound on in-flight messages the agent will accept.
    pub max_concurrent_messages: usize,
}

impl AgentCapabilities {
    /// Creates a capability set from skill and category lists.
    #[must_use]
    pub fn new(
        skills: impl IntoIterator<Item = impl Into<String>>,
        supported_categories: impl IntoIterator<Item = impl Into<String>>,
        max_concurrent_messages: usize,
    ) -> Self {
        Self {
            skills: skills.into_iter().map(Into::into).collect(),
            supported_categories: supported_categories.into_iter().map(Into::into).collect(),
            max_concurrent_messages,
        }
    }

    /// ASCII case-insensitive skill membership.
    #[must_use]
    pub fn has_skill(&self, skill: &str) -> bool {
        self.skills.iter().any(|s| s.eq_ignore_ascii_case(skill))
    }

    /// Case-sensitive category membership.
    #[must_use]
    pub fn supports_category(&self, category: &str) -> bool {
        self.supported_categories.contains(category)
    }
}

/// The capability set the core consumes. Implemented by collaborators.
#[async_trait]
pub trait Agent: Send + Sync {
    /// Unique agent id.
    fn id(&self) -> &str;

    /// Human-readable name.
    fn name(&self) -> &str;

    /// Current availability.
    fn status(&self) -> AgentStatus;

    /// Declared capabilities.
    fn capabilities(&self) -> &AgentCapabilities;

    /// Whether the agent accepts this message. The default accepts anything
    /// when no categories are declared, otherwise requires a category match.
    fn can_handle(&self, message: &Message) -> bool {
        let caps = self.capabilities();
        caps.supported_categories.is_empty() || caps.supports_category(&message.category)
    }

    /// Handles a message. Failed handling is a `fail(..)` result; abnormal
    /// termination is an `Err`. Handlers that honor `cancel` return
    /// `Err(DispatchError::Cancelled)`.
    async fn handle(
        &self,
        message: &mut Message,
        cancel: &CancellationToken,
    ) -> Result<HandlerResult, DispatchError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn skills_match_case_insensitively() {
        let caps = AgentCapabilities::new(["Billing", "refunds"], ["Billing"], 4);
        assert!(caps.has_skill("billing"));
        assert!(caps.has_skill("REFUNDS"));
        assert!(!caps.has_skill("escalations"));
    }

    #[test]
    fn categories_match_case_sensitively() {
        let caps = AgentCapabilities::new(["billing"], ["Billing"], 4);
        assert!(caps.supports_category("Billing"));
        assert!(!caps.supports_category("billing"));
    }

    struct CategoryAgent {
        capabilities: AgentCapabilities,
    }

    #[async_trait]
    impl Agent for CategoryAgent {
        fn id(&self) -> &str {
            "billing-agent"
        }
        fn name(&self) -> &str {
            "Billing"
        }
        fn status(&self) -> AgentStatus {
            AgentStatus::Available
        }
        fn capabilities(&self) -> &AgentCapabilities {
            &self.capabilities
        }
        async fn handle(
            &self,
            _message: &mut Message,
            _cancel: &CancellationToken,
        ) -> Result<HandlerResult, DispatchError> {
            Ok(HandlerResult::ok())
        }
    }

    #[test]
    fn default_can_handle_requires_a_category_match_when_declared() {
        let picky = CategoryAgent {
            capabilities: AgentCapabilities::new(["billing"], ["Billing"], 4),
        };
        assert!(picky.can_handle(&Message::new("s", "subj", "c").with_category("Billing")));
        assert!(!picky.can_handle(&Message::new("s", "subj", "c").with_category("Tech")));

        let open = CategoryAgent {
            capabilities: AgentCapabilities::default(),
        };
        assert!(open.can_handle(&Message::new("s", "subj", "c").with_category("Anything")));
    }
}
