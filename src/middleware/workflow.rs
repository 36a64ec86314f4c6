//! Multi-stage workflow forwarding
//!
//! Messages carrying a `WorkflowId` advance through a registered stage list:
//! when the current stage succeeds and is not the last, the middleware emits
//! a follow-up message for the next stage into the result's
//! `forwarded_messages`. Nothing is dispatched here; the caller re-routes the
//! forwarded message.

use crate::message::Message;
use crate::pipeline::{DispatchResult, Middleware, Next};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Metadata key naming the workflow a message belongs to.
pub const WORKFLOW_ID_KEY: &str = "WorkflowId";
/// Metadata key holding the current stage index.
pub const STAGE_INDEX_KEY: &str = "StageIndex";

/// Optional gate deciding whether a stage forward happens.
pub type StageCondition = Arc<dyn Fn(&Message) -> bool + Send + Sync>;

/// One step of a workflow, bound to an agent.
#[derive(Clone)]
pub struct WorkflowStage {
    /// Stage label, for operators.
    pub name: String,
    /// Agent the stage's messages are addressed to.
    pub agent_id: String,
    /// Entry gate; when present and false, the workflow stops instead of
    /// forwarding into this stage.
    pub condition: Option<StageCondition>,
}

impl WorkflowStage {
    /// Creates an unconditional stage.
    #[must_use]
    pub fn new(name: impl Into<String>, agent_id: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            agent_id: agent_id.into(),
            condition: None,
        }
    }

    /// Creates a gated stage.
    #[must_use]
    pub fn gated(
        name: impl Into<String>,
        agent_id: impl Into<String>,
        condition: impl Fn(&Message) -> bool + Send + Sync + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            agent_id: agent_id.into(),
            condition: Some(Arc::new(condition)),
        }
    }
}

impl std::fmt::Debug for WorkflowStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkflowStage")
            .field("name", &self.name)
            .field("agent_id", &self.agent_id)
            .field("gated", &self.condition.is_some())
            .finish()
    }
}

/// Forwards successful stage results to the next workflow stage.
#[derive(Default)]
pub struct WorkflowOrchestrationMiddleware {
    workflows: RwLock<HashMap<String, Vec<WorkflowStage>>>,
}

impl WorkflowOrchestrationMiddleware {
    /// Creates the middleware with no workflows.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers or replaces a named workflow.
    pub fn register_workflow(&self, name: impl Into<String>, stages: Vec<WorkflowStage>) {
        self.workflows
            .write()
            .expect("workflow lock poisoned")
            .insert(name.into(), stages);
    }

    /// Coerces the `StageIndex` metadata value to an index. Integers,
    /// doubles, and numeric strings are accepted; anything else is 0.
    #[must_use]
    pub fn coerce_stage_index(value: Option<&Value>) -> i64 {
        match value {
            Some(Value::Number(n)) => n
                .as_i64()
                .or_else(|| n.as_f64().map(|f| f as i64))
                .unwrap_or(0),
            Some(Value::String(s)) => s.trim().parse::<i64>().unwrap_or(0),
            _ => 0,
        }
    }
}

#[async_trait]
impl Middleware for WorkflowOrchestrationMiddleware {
    fn name(&self) -> &str {
        "workflow-orchestration"
    }

    async fn handle(
        &self,
        message: &mut Message,
        next: Next<'_>,
        cancel: &CancellationToken,
    ) -> DispatchResult {
        let workflow_id = message
            .metadata_str(WORKFLOW_ID_KEY)
            .unwrap_or_default()
            .to_string();
        if workflow_id.is_empty() {
            return next.run(message, cancel).await;
        }

        let stages = {
            let workflows = self.workflows.read().expect("workflow lock poisoned");
            workflows.get(&workflow_id).cloned()
        };
        let Some(stages) = stages else {
            return next.run(message, cancel).await;
        };

        let stage_index = Self::coerce_stage_index(message.metadata.get(STAGE_INDEX_KEY));
        if stage_index < 0 || stage_index as usize >= stages.len() {
            return next.run(message, cancel).await;
        }
        let stage_index = stage_index as usize;

        let original_content = message.content.clone();

        let mut result = next.run(message, cancel).await?;
        if !result.success {
            return Ok(result);
        }

        let next_index = stage_index + 1;
        if next_index >= stages.len() {
            return Ok(result);
        }

        let next_stage = &stages[next_index];
        if let Some(condition) = &next_stage.condition
            && !condition(message)
        {
            debug!(
                workflow = %workflow_id,
                stage = %next_stage.name,
                "stage condition rejected forward"
            );
            return Ok(result);
        }

        // Metadata is copied after the stage ran, so values written by inner
        // middleware (trace ids, content detectors) travel with the forward.
        let mut metadata = message.metadata.clone();
        metadata.insert(STAGE_INDEX_KEY.to_string(), Value::from(next_index as i64));
        let mut forwarded = Message::new(
            message.receiver_id.clone(),
            format!("Workflow {workflow_id} - Stage {next_index}"),
            result
                .response
                .clone()
                .unwrap_or(original_content),
        )
        .with_receiver(next_stage.agent_id.clone())
        .with_category(message.category.clone())
        .with_priority(message.priority);
        forwarded.metadata = metadata;
        forwarded.conversation_id = message.conversation_id.clone();

        result.forwarded_messages.push(forwarded);
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::HandlerResult;
    use crate::pipeline::{FnHandler, Pipeline};
    use serde_json::json;

    fn staged_pipeline(
        orchestrator: &Arc<WorkflowOrchestrationMiddleware>,
        response: Option<&'static str>,
        succeed: bool,
    ) -> crate::pipeline::BuiltPipeline {
        let mut pipeline = Pipeline::new();
        pipeline.use_middleware(Arc::clone(orchestrator) as Arc<dyn Middleware>);
        pipeline.build(Arc::new(FnHandler::new(move |_m: &mut Message| {
            Ok(match (succeed, response) {
                (true, Some(text)) => HandlerResult::ok_with(text),
                (true, None) => HandlerResult::ok(),
                (false, _) => HandlerResult::fail("stage failed"),
            })
        })))
    }

    fn three_stage_orchestrator() -> Arc<WorkflowOrchestrationMiddleware> {
        let orchestrator = Arc::new(WorkflowOrchestrationMiddleware::new());
        orchestrator.register_workflow(
            "W",
            vec![
                WorkflowStage::new("intake", "A"),
                WorkflowStage::new("review", "B"),
                WorkflowStage::new("archive", "C"),
            ],
        );
        orchestrator
    }

    fn workflow_message(stage_index: Value) -> Message {
        Message::new("caller", "start", "x")
            .with_receiver("A")
            .with_conversation_id("conv-9")
            .with_metadata(WORKFLOW_ID_KEY, "W")
            .with_metadata(STAGE_INDEX_KEY, stage_index)
    }

    #[tokio::test]
    async fn successful_middle_stage_forwards_to_next() {
        let orchestrator = three_stage_orchestrator();
        let built = staged_pipeline(&orchestrator, Some("x1"), true);

        let mut message = workflow_message(json!(0));
        let result = built
            .call(&mut message, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(result.forwarded_messages.len(), 1);
        let forwarded = &result.forwarded_messages[0];
        assert_eq!(forwarded.receiver_id, "B");
        assert_eq!(forwarded.sender_id, "A");
        assert_eq!(forwarded.content, "x1");
        assert_eq!(forwarded.metadata[STAGE_INDEX_KEY], json!(1));
        assert_eq!(forwarded.metadata_str(WORKFLOW_ID_KEY), Some("W"));
        assert_eq!(forwarded.conversation_id.as_deref(), Some("conv-9"));
        assert_ne!(forwarded.id, message.id);
    }

    #[tokio::test]
    async fn final_stage_does_not_forward() {
        let orchestrator = three_stage_orchestrator();
        let built = staged_pipeline(&orchestrator, Some("done"), true);

        let mut message = workflow_message(json!(2));
        let result = built
            .call(&mut message, &CancellationToken::new())
            .await
            .unwrap();
        assert!(result.forwarded_messages.is_empty());
    }

    #[tokio::test]
    async fn failed_stage_does_not_forward() {
        let orchestrator = three_stage_orchestrator();
        let built = staged_pipeline(&orchestrator, None, false);

        let mut message = workflow_message(json!(0));
        let result = built
            .call(&mut message, &CancellationToken::new())
            .await
            .unwrap();
        assert!(!result.success);
        assert!(result.forwarded_messages.is_empty());
    }

    #[tokio::test]
    async fn stage_index_coercion_accepts_numbers_and_strings() {
        assert_eq!(
            WorkflowOrchestrationMiddleware::coerce_stage_index(Some(&json!(2))),
            2
        );
        assert_eq!(
            WorkflowOrchestrationMiddleware::coerce_stage_index(Some(&json!(1.0))),
            1
        );
        assert_eq!(
            WorkflowOrchestrationMiddleware::coerce_stage_index(Some(&json!("1"))),
            1
        );
        assert_eq!(
            WorkflowOrchestrationMiddleware::coerce_stage_index(Some(&json!("junk"))),
            0
        );
        assert_eq!(WorkflowOrchestrationMiddleware::coerce_stage_index(None), 0);
    }

    #[tokio::test]
    async fn missing_stage_index_defaults_to_zero() {
        let orchestrator = three_stage_orchestrator();
        let built = staged_pipeline(&orchestrator, Some("x1"), true);

        let mut message = Message::new("caller", "start", "x")
            .with_receiver("A")
            .with_metadata(WORKFLOW_ID_KEY, "W");
        let result = built
            .call(&mut message, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(result.forwarded_messages[0].metadata[STAGE_INDEX_KEY], json!(1));
    }

    #[tokio::test]
    async fn unknown_workflow_and_out_of_range_pass_through() {
        let orchestrator = three_stage_orchestrator();
        let built = staged_pipeline(&orchestrator, Some("x1"), true);
        let token = CancellationToken::new();

        let mut unknown = Message::new("c", "s", "x").with_metadata(WORKFLOW_ID_KEY, "nope");
        assert!(
            built
                .call(&mut unknown, &token)
                .await
                .unwrap()
                .forwarded_messages
                .is_empty()
        );

        for index in [json!(-1), json!(99)] {
            let mut message = workflow_message(index);
            assert!(
                built
                    .call(&mut message, &token)
                    .await
                    .unwrap()
                    .forwarded_messages
                    .is_empty()
            );
        }
    }

    #[tokio::test]
    async fn stage_without_response_forwards_original_content() {
        let orchestrator = three_stage_orchestrator();
        let built = staged_pipeline(&orchestrator, None, true);

        let mut message = workflow_message(json!(0));
        let result = built
            .call(&mut message, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(result.forwarded_messages[0].content, "x");
    }

    struct StampingMiddleware;

    #[async_trait]
    impl Middleware for StampingMiddleware {
        fn name(&self) -> &str {
            "stamper"
        }

        async fn handle(
            &self,
            message: &mut Message,
            next: Next<'_>,
            cancel: &CancellationToken,
        ) -> DispatchResult {
            message
                .metadata
                .insert("StampedBy".to_string(), Value::from("stamper"));
            next.run(message, cancel).await
        }
    }

    #[tokio::test]
    async fn forward_carries_metadata_written_during_the_stage() {
        let orchestrator = three_stage_orchestrator();
        let mut pipeline = Pipeline::new();
        pipeline.use_middleware(Arc::clone(&orchestrator) as Arc<dyn Middleware>);
        // Inner middleware mutates metadata while the stage runs.
        pipeline.use_middleware(Arc::new(StampingMiddleware));
        let built = pipeline.build(Arc::new(FnHandler::new(|_m: &mut Message| {
            Ok(HandlerResult::ok_with("x1"))
        })));

        let mut message = workflow_message(json!(0));
        assert!(!message.metadata.contains_key("StampedBy"));
        let result = built
            .call(&mut message, &CancellationToken::new())
            .await
            .unwrap();

        let forwarded = &result.forwarded_messages[0];
        assert_eq!(forwarded.metadata_str("StampedBy"), Some("stamper"));
        assert_eq!(forwarded.metadata[STAGE_INDEX_KEY], json!(1));
    }

    #[tokio::test]
    async fn rejected_gate_stops_the_workflow() {
        let orchestrator = Arc::new(WorkflowOrchestrationMiddleware::new());
        orchestrator.register_workflow(
            "gated",
            vec![
                WorkflowStage::new("first", "A"),
                WorkflowStage::gated("second", "B", |_| false),
            ],
        );
        let built = staged_pipeline(&orchestrator, Some("out"), true);

        let mut message = Message::new("c", "s", "x")
            .with_receiver("A")
            .with_metadata(WORKFLOW_ID_KEY, "gated")
            .with_metadata(STAGE_INDEX_KEY, json!(0));
        let result = built
            .call(&mut message, &CancellationToken::new())
            .await
            .unwrap();
        assert!(result.success);
        assert!(result.forwarded_messages.is_empty());
    }
}
