//! Content analysis for semantic routing
//!
//! Inspects subject and content and records what it finds in metadata:
//! email/phone mentions, a best-effort language guess, and keyword-derived
//! intents. Downstream rules can then route on these keys without re-parsing
//! the text.

use crate::clock::SharedClock;
use crate::message::Message;
use crate::pipeline::{DispatchResult, Middleware, Next};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;

/// Metadata key: whether any email address was found.
pub const CONTAINS_EMAIL_KEY: &str = "ContainsEmail";
/// Metadata key: number of email addresses found.
pub const EMAIL_COUNT_KEY: &str = "EmailCount";
/// Metadata key: whether any phone number was found.
pub const CONTAINS_PHONE_KEY: &str = "ContainsPhone";
/// Metadata key: number of phone numbers found.
pub const PHONE_COUNT_KEY: &str = "PhoneCount";
/// Metadata key: best-effort language guess.
pub const DETECTED_LANGUAGE_KEY: &str = "DetectedLanguage";
/// Metadata key: analysis timestamp (ISO-8601).
pub const PROCESSING_TIMESTAMP_KEY: &str = "ProcessingTimestamp";
/// Metadata key: comma-separated detected intents.
pub const DETECTED_INTENTS_KEY: &str = "DetectedIntents";

static EMAIL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}").expect("email regex")
});

static PHONE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\+?\d[\d \-().]{6,}\d").expect("phone regex"));

// Small stop-word tables; ties resolve in table order.
const LANGUAGE_MARKERS: [(&str, &[&str]); 4] = [
    ("en", &["the", "and", "is", "you", "for", "with", "please"]),
    ("es", &["el", "los", "que", "por", "para", "gracias", "hola"]),
    ("fr", &["le", "les", "est", "pour", "avec", "merci", "bonjour"]),
    ("de", &["der", "die", "das", "und", "ist", "nicht", "bitte"]),
];

const INTENT_KEYWORDS: [(&str, &[&str]); 6] = [
    ("refund", &["refund", "money back", "reimburse"]),
    ("cancellation", &["cancel", "terminate", "unsubscribe"]),
    ("complaint", &["complaint", "unacceptable", "disappointed"]),
    ("support", &["help", "support", "issue", "error", "broken"]),
    ("purchase", &["buy", "purchase", "order"]),
    ("billing", &["invoice", "billing", "charge", "payment"]),
];

/// Writes content-analysis metadata before calling downstream.
pub struct SemanticRoutingMiddleware {
    clock: SharedClock,
}

impl SemanticRoutingMiddleware {
    /// Creates the middleware.
    #[must_use]
    pub fn new(clock: SharedClock) -> Self {
        Self { clock }
    }

    fn detect_language(text: &str) -> &'static str {
        let words: Vec<String> = text
            .split_whitespace()
            .map(|w| {
                w.trim_matches(|c: char| !c.is_alphanumeric())
                    .to_ascii_lowercase()
            })
            .collect();

        let mut best = ("unknown", 0usize);
        for (language, markers) in LANGUAGE_MARKERS {
            let hits = words
                .iter()
                .filter(|w| markers.contains(&w.as_str()))
                .count();
            if hits > best.1 {
                best = (language, hits);
            }
        }
        best.0
    }

    fn detect_intents(text: &str) -> Vec<&'static str> {
        let lowered = text.to_ascii_lowercase();
        INTENT_KEYWORDS
            .iter()
            .filter(|(_, keywords)| keywords.iter().any(|k| lowered.contains(k)))
            .map(|(intent, _)| *intent)
            .collect()
    }
}

#[async_trait]
impl Middleware for SemanticRoutingMiddleware {
    fn name(&self) -> &str {
        "semantic-routing"
    }

    async fn handle(
        &self,
        message: &mut Message,
        next: Next<'_>,
        cancel: &CancellationToken,
    ) -> DispatchResult {
        let text = format!("{} {}", message.subject, message.content);

        let email_count = EMAIL_RE.find_iter(&text).count();
        let phone_count = PHONE_RE.find_iter(&text).count();
        message
            .metadata
            .insert(CONTAINS_EMAIL_KEY.to_string(), json!(email_count > 0));
        message
            .metadata
            .insert(EMAIL_COUNT_KEY.to_string(), json!(email_count));
        message
            .metadata
            .insert(CONTAINS_PHONE_KEY.to_string(), json!(phone_count > 0));
        message
            .metadata
            .insert(PHONE_COUNT_KEY.to_string(), json!(phone_count));

        message.metadata.insert(
            DETECTED_LANGUAGE_KEY.to_string(),
            Value::String(Self::detect_language(&text).to_string()),
        );

        let intents = Self::detect_intents(&text);
        if !intents.is_empty() {
            message.metadata.insert(
                DETECTED_INTENTS_KEY.to_string(),
                Value::String(intents.join(",")),
            );
        }

        let analyzed_at: DateTime<Utc> = self.clock.now().into();
        message.metadata.insert(
            PROCESSING_TIMESTAMP_KEY.to_string(),
            Value::String(analyzed_at.to_rfc3339()),
        );

        next.run(message, cancel).await
    }
}
