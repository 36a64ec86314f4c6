//! Traffic analytics
//!
//! Counts total messages plus per-category and per-receiver volumes, and can
//! render a deterministic human-readable report. Empty categories and
//! receivers are not recorded (strict empty check, whitespace counts as a
//! value).

use crate::message::Message;
use crate::pipeline::{DispatchResult, Middleware, Next};
use async_trait::async_trait;
use std::collections::HashMap;
use std::fmt::Write as _;
use std::sync::Mutex;
use tokio_util::sync::CancellationToken;

/// Point-in-time analytics counters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AnalyticsReport {
    /// Messages observed.
    pub total_messages: u64,
    /// Message counts keyed by category.
    pub by_category: HashMap<String, u64>,
    /// Message counts keyed by receiver id.
    pub by_receiver: HashMap<String, u64>,
}

#[derive(Debug, Default)]
struct AnalyticsState {
    total: u64,
    by_category: HashMap<String, u64>,
    by_receiver: HashMap<String, u64>,
}

/// Records category and receiver distribution of routed traffic.
#[derive(Debug, Default)]
pub struct AnalyticsMiddleware {
    state: Mutex<AnalyticsState>,
}

impl AnalyticsMiddleware {
    /// Creates the middleware.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Fresh snapshot of all counters.
    #[must_use]
    pub fn report(&self) -> AnalyticsReport {
        let state = self.state.lock().expect("analytics lock poisoned");
        AnalyticsReport {
            total_messages: state.total,
            by_category: state.by_category.clone(),
            by_receiver: state.by_receiver.clone(),
        }
    }

    /// Renders the report as deterministic text: categories by count
    /// descending (name ascending on ties) with one-decimal percentages,
    /// then receiver workload.
    #[must_use]
    pub fn render_report(&self) -> String {
        let report = self.report();
        let mut rendered = String::from("=== Message Analytics Report ===\n");
        let _ = writeln!(rendered, "Total messages: {}", report.total_messages);

        let mut categories: Vec<(&String, &u64)> = report.by_category.iter().collect();
        categories.sort_by(|a, b| b.1.cmp(a.1).then_with(|| a.0.cmp(b.0)));
        rendered.push_str("Categories:\n");
        for (category, count) in categories {
            let share = if report.total_messages == 0 {
                0.0
            } else {
                *count as f64 / report.total_messages as f64 * 100.0
            };
            let _ = writeln!(rendered, "  {category}: {count} ({share:.1}%)");
        }

        let mut receivers: Vec<(&String, &u64)> = report.by_receiver.iter().collect();
        receivers.sort_by(|a, b| b.1.cmp(a.1).then_with(|| a.0.cmp(b.0)));
        rendered.push_str("Agent workload:\n");
        for (receiver, count) in receivers {
            let _ = writeln!(rendered, "  {receiver}: {count}");
        }
        rendered
    }
}

#[async_trait]
impl Middleware for AnalyticsMiddleware {
    fn name(&self) -> &str {
        "analytics"
    }

    async fn handle(
        &self,
        message: &mut Message,
        next: Next<'_>,
        cancel: &CancellationToken,
    ) -> DispatchResult {
        {
            let mut state = self.state.lock().expect("analytics lock poisoned");
            state.total += 1;
            if !message.category.is_empty() {
                *state.by_category.entry(message.category.clone()).or_insert(0) += 1;
            }
            if !message.receiver_id.is_empty() {
                *state
                    .by_receiver
                    .entry(message.receiver_id.clone())
                    .or_insert(0) += 1;
            }
        }
        next.run(message, cancel).await
    }
}
