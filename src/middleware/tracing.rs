//! Distributed-tracing span capture
//!
//! Records one span per pipeline invocation, chaining onto trace and span
//! ids found in metadata and writing the new ids back for downstream
//! propagation (workflow forwards carry them to the next stage). Spans are
//! held in memory and exportable as a Jaeger-style text report.

use crate::clock::SharedClock;
use crate::message::Message;
use crate::pipeline::{DispatchResult, Middleware, Next};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt::Write as _;
use std::sync::Mutex;
use std::time::{Duration, SystemTime};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Metadata key carrying the trace id.
pub const TRACE_ID_KEY: &str = "TraceId";
/// Metadata key carrying the current span id.
pub const SPAN_ID_KEY: &str = "SpanId";

/// One recorded unit of work.
#[derive(Debug, Clone)]
pub struct TraceSpan {
    /// 32 lowercase hex chars shared by every span of a trace.
    pub trace_id: String,
    /// 16 lowercase hex chars identifying this span.
    pub span_id: String,
    /// Present on child spans.
    pub parent_span_id: Option<String>,
    /// Emitting service.
    pub service_name: String,
    /// Operation label, `ProcessMessage: <subject>`.
    pub operation_name: String,
    /// Span start.
    pub start_time: SystemTime,
    /// Span duration.
    pub duration: Duration,
    /// Whether the traced work succeeded.
    pub success: bool,
    /// Free-form span tags.
    pub tags: HashMap<String, String>,
}

/// Captures spans around the downstream call.
pub struct DistributedTracingMiddleware {
    spans: Mutex<Vec<TraceSpan>>,
    service_name: String,
    clock: SharedClock,
}

impl DistributedTracingMiddleware {
    /// Creates the middleware for the given service name.
    #[must_use]
    pub fn new(service_name: impl Into<String>, clock: SharedClock) -> Self {
        Self {
            spans: Mutex::new(Vec::new()),
            service_name: service_name.into(),
            clock,
        }
    }

    fn new_trace_id() -> String {
        Uuid::new_v4().simple().to_string()
    }

    fn new_span_id() -> String {
        Uuid::new_v4().simple().to_string()[..16].to_string()
    }

    /// Snapshot copy of every recorded span.
    #[must_use]
    pub fn traces(&self) -> Vec<TraceSpan> {
        self.spans.lock().expect("trace lock poisoned").clone()
    }

    /// Removes all recorded spans.
    pub fn clear(&self) {
        self.spans.lock().expect("trace lock poisoned").clear();
    }

    /// Renders every trace as a Jaeger-style text block: a header, one line
    /// per trace id, one line per span with child spans arrow-indented.
    #[must_use]
    pub fn export_jaeger_format(&self) -> String {
        let spans = self.traces();

        // Group by trace id, preserving first-appearance order.
        let mut trace_order: Vec<String> = Vec::new();
        let mut grouped: HashMap<String, Vec<&TraceSpan>> = HashMap::new();
        for span in &spans {
            if !grouped.contains_key(&span.trace_id) {
                trace_order.push(span.trace_id.clone());
            }
            grouped.entry(span.trace_id.clone()).or_default().push(span);
        }

        let mut rendered = String::from("Jaeger Trace Export:\n");
        for trace_id in trace_order {
            let _ = writeln!(rendered, "Trace ID: {trace_id}");
            for span in &grouped[&trace_id] {
                let marker = if span.parent_span_id.is_some() {
                    "→ "
                } else {
                    ""
                };
                let success = if span.success { "True" } else { "False" };
                let _ = writeln!(
                    rendered,
                    "  {marker}Span: {} | Duration: {}ms | Success: {success}",
                    span.operation_name,
                    span.duration.as_millis(),
                );
            }
        }
        rendered
    }
}

#[async_trait]
impl Middleware for DistributedTracingMiddleware {
    fn name(&self) -> &str {
        "distributed-tracing"
    }

    async fn handle(
        &self,
        message: &mut Message,
        next: Next<'_>,
        cancel: &CancellationToken,
    ) -> DispatchResult {
        let trace_id = message
            .metadata_str(TRACE_ID_KEY)
            .map_or_else(Self::new_trace_id, ToString::to_string);
        let parent_span_id = message.metadata_str(SPAN_ID_KEY).map(ToString::to_string);
        let span_id = Self::new_span_id();

        // Write the ids back so forwarded messages continue the trace.
        message
            .metadata
            .insert(TRACE_ID_KEY.to_string(), Value::String(trace_id.clone()));
        message
            .metadata
            .insert(SPAN_ID_KEY.to_string(), Value::String(span_id.clone()));

        let mut tags = HashMap::from([
            ("message.id".to_string(), message.id.clone()),
            ("message.sender".to_string(), message.sender_id.clone()),
            ("message.category".to_string(), message.category.clone()),
            (
                "message.priority".to_string(),
                format!("{:?}", message.priority),
            ),
        ]);

        let mut span = TraceSpan {
            trace_id,
            span_id,
            parent_span_id,
            service_name: self.service_name.clone(),
            operation_name: format!("ProcessMessage: {}", message.subject),
            start_time: self.clock.now(),
            duration: Duration::ZERO,
            success: false,
            tags: HashMap::new(),
        };

        let outcome = next.run(message, cancel).await;
        span.duration = self
            .clock
            .now()
            .duration_since(span.start_time)
            .unwrap_or_default();

        match &outcome {
            Ok(result) => {
                span.success = result.success;
                tags.insert("result.success".to_string(), result.success.to_string());
                if let Some(error) = &result.error {
                    tags.insert("error.message".to_string(), error.clone());
                }
            }
            Err(error) => {
                span.success = false;
                tags.insert("result.success".to_string(), "false".to_string());
                tags.insert("error.type".to_string(), error.error_type().to_string());
                tags.insert("error.message".to_string(), error.to_string());
            }
        }
        span.tags = tags;

        self.spans.lock().expect("trace lock poisoned").push(span);
        outcome
    }
}
