//! Read-only routing view of a message
//!
//! A [`RoutingContext`] is constructed once per `route` call and handed to
//! every rule predicate. It is a projection: predicates never see the mutable
//! message, so evaluation cannot perturb the pipeline.

use crate::message::{Message, MessagePriority};

/// Read-only projection of a [`Message`] with derived predicates.
#[derive(Debug, Clone)]
pub struct RoutingContext {
    message_id: String,
    sender_id: String,
    subject: String,
    content: String,
    category: String,
    priority: MessagePriority,
    conversation_id: Option<String>,
}

impl RoutingContext {
    /// Builds the projection from a message.
    #[must_use]
    pub fn from_message(message: &Message) -> Self {
        Self {
            message_id: message.id.clone(),
            sender_id: message.sender_id.clone(),
            subject: message.subject.clone(),
            content: message.content.clone(),
            category: message.category.clone(),
            priority: message.priority,
            conversation_id: message.conversation_id.clone(),
        }
    }

    /// Id of the projected message.
    #[must_use]
    pub fn message_id(&self) -> &str {
        &self.message_id
    }

    /// Sender id.
    #[must_use]
    pub fn sender_id(&self) -> &str {
        &self.sender_id
    }

    /// Subject line.
    #[must_use]
    pub fn subject(&self) -> &str {
        &self.subject
    }

    /// Message body.
    #[must_use]
    pub fn content(&self) -> &str {
        &self.content
    }

    /// Routing category (possibly empty).
    #[must_use]
    pub fn category(&self) -> &str {
        &self.category
    }

    /// Message priority.
    #[must_use]
    pub fn priority(&self) -> MessagePriority {
        self.priority
    }

    /// Conversation correlation id.
    #[must_use]
    pub fn conversation_id(&self) -> Option<&str> {
        self.conversation_id.as_deref()
    }

    /// True for `High` or `Urgent` priority.
    #[must_use]
    pub fn is_high_priority(&self) -> bool {
        self.priority >= MessagePriority::High
    }

    /// True for `Urgent` priority.
    #[must_use]
    pub fn is_urgent(&self) -> bool {
        self.priority == MessagePriority::Urgent
    }

    /// Case-insensitive category comparison.
    #[must_use]
    pub fn category_is(&self, category: &str) -> bool {
        self.category.eq_ignore_ascii_case(category)
    }

    /// Substring match on the subject.
    #[must_use]
    pub fn subject_contains(&self, needle: &str) -> bool {
        self.subject.contains(needle)
    }

    /// Substring match on the content.
    #[must_use]
    pub fn content_contains(&self, needle: &str) -> bool {
        self.content.contains(needle)
    }
}
