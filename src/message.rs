//! Message model shared by every routing component
//!
//! A [`Message`] is an immutable-shell/mutable-bag record: identity fields are
//! set at creation, while middleware freely reads and writes the `metadata`
//! map and the typed `context` bag as the message moves down the pipeline.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

/// Message priority, lowest to highest.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
pub enum MessagePriority {
    /// Background work.
    Low,
    /// Default.
    #[default]
    Normal,
    /// Expedited handling.
    High,
    /// Front of every queue.
    Urgent,
}

/// Typed scratch area attached to a message.
///
/// Values are stored behind `Arc` so cloning a message shares the bag's
/// contents; a single pipeline invocation owns the message, so there is no
/// concurrent mutation to guard against.
#[derive(Clone, Default)]
pub struct TypedBag {
    values: HashMap<String, Arc<dyn Any + Send + Sync>>,
}

impl std::fmt::Debug for TypedBag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_set().entries(self.values.keys()).finish()
    }
}

impl TypedBag {
    /// Creates an empty bag.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores a typed value under `key`, replacing any previous value.
    pub fn set<T: Any + Send + Sync>(&mut self, key: impl Into<String>, value: T) {
        self.values.insert(key.into(), Arc::new(value));
    }

    /// Reads the value under `key` if it exists and has type `T`.
    #[must_use]
    pub fn get<T: Any + Send + Sync>(&self, key: &str) -> Option<&T> {
        self.values.get(key).and_then(|v| v.downcast_ref::<T>())
    }

    /// True when `key` is present regardless of type.
    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    /// Number of stored values.
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// True when no values are stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// A routable message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    /// Opaque unique id, generated at creation when not supplied.
    pub id: String,
    /// Originating agent or caller id.
    pub sender_id: String,
    /// Target agent id; may be empty until the router selects one.
    pub receiver_id: String,
    /// Short human-readable subject line.
    pub subject: String,
    /// Message body.
    pub content: String,
    /// Primary routing classifier; may be empty.
    pub category: String,
    /// Message priority.
    pub priority: MessagePriority,
    /// Correlation id for multi-turn exchanges.
    pub conversation_id: Option<String>,
    /// Erased-type metadata bag. Keys are case-sensitive.
    pub metadata: HashMap<String, Value>,
    /// Typed scratch values (not serialized).
    #[serde(skip)]
    pub context: TypedBag,
}

impl Message {
    /// Creates a message with a generated id and `Normal` priority.
    #[must_use]
    pub fn new(
        sender_id: impl Into<String>,
        subject: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().simple().to_string(),
            sender_id: sender_id.into(),
            receiver_id: String::new(),
            subject: subject.into(),
            content: content.into(),
            category: String::new(),
            priority: MessagePriority::Normal,
            conversation_id: None,
            metadata: HashMap::new(),
            context: TypedBag::new(),
        }
    }

    /// Sets the routing category.
    #[must_use]
    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = category.into();
        self
    }

    /// Sets the priority.
    #[must_use]
    pub fn with_priority(mut self, priority: MessagePriority) -> Self {
        self.priority = priority;
        self
    }

    /// Sets the receiver id explicitly.
    #[must_use]
    pub fn with_receiver(mut self, receiver_id: impl Into<String>) -> Self {
        self.receiver_id = receiver_id.into();
        self
    }

    /// Sets the conversation correlation id.
    #[must_use]
    pub fn with_conversation_id(mut self, conversation_id: impl Into<String>) -> Self {
        self.conversation_id = Some(conversation_id.into());
        self
    }

    /// Adds a metadata entry.
    #[must_use]
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Reads a metadata value as a string when it is one.
    #[must_use]
    pub fn metadata_str(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).and_then(Value::as_str)
    }
}

/// Outcome of a handler or middleware invocation.
///
/// A failed outcome (`success == false`) is a normal value that flows back up
/// the pipeline; errors that abort the pipeline are carried separately as
/// [`DispatchError`](crate::error::DispatchError).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HandlerResult {
    /// Whether the handler considers the message handled.
    pub success: bool,
    /// Handler response payload, when any.
    pub response: Option<String>,
    /// Failure description, when `success` is false.
    pub error: Option<String>,
    /// Auxiliary values attached by middleware (timings, counters).
    pub data: HashMap<String, Value>,
    /// Messages a middleware asks the caller to dispatch next
    /// (workflow stage forwarding). Never dispatched by the pipeline itself.
    pub forwarded_messages: Vec<Message>,
}

impl HandlerResult {
    /// Successful outcome with no response payload.
    #[must_use]
    pub fn ok() -> Self {
        Self {
            success: true,
            ..Self::default()
        }
    }

    /// Successful outcome carrying a response.
    #[must_use]
    pub fn ok_with(response: impl Into<String>) -> Self {
        Self {
            success: true,
            response: Some(response.into()),
            ..Self::default()
        }
    }

    /// Failed outcome with a reason.
    #[must_use]
    pub fn fail(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
            ..Self::default()
        }
    }
}
