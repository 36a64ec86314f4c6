//! Shared test fixtures: scriptable agents for integration tests.
#![allow(dead_code)] // not every test binary uses every fixture

use async_trait::async_trait;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use switchboard::{
    Agent, AgentCapabilities, AgentStatus, DispatchResult, HandlerResult, Message,
};
use tokio_util::sync::CancellationToken;

type Behavior = Box<dyn Fn(&Message, usize) -> DispatchResult + Send + Sync>;

/// Installs a console subscriber for debugging test runs. Safe to call from
/// every test; only the first call wins.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("switchboard=info")),
        )
        .with_test_writer()
        .try_init();
}

/// Agent whose behavior is a closure over `(message, call_number)`.
pub struct ScriptedAgent {
    id: String,
    capabilities: AgentCapabilities,
    behavior: Behavior,
    calls: AtomicUsize,
}

impl ScriptedAgent {
    /// Agent that always succeeds, echoing its id and the subject.
    pub fn echo(id: &str) -> Arc<Self> {
        let agent_id = id.to_string();
        Self::with_behavior(id, move |message, _| {
            Ok(HandlerResult::ok_with(format!(
                "{agent_id}:{}",
                message.subject
            )))
        })
    }

    /// Agent with fully scripted behavior.
    pub fn with_behavior(
        id: &str,
        behavior: impl Fn(&Message, usize) -> DispatchResult + Send + Sync + 'static,
    ) -> Arc<Self> {
        Arc::new(Self {
            id: id.to_string(),
            capabilities: AgentCapabilities::default(),
            behavior: Box::new(behavior),
            calls: AtomicUsize::new(0),
        })
    }

    /// Agent advertising specific skills.
    pub fn with_skills(id: &str, skills: &[&str]) -> Arc<Self> {
        let agent_id = id.to_string();
        Arc::new(Self {
            id: id.to_string(),
            capabilities: AgentCapabilities::new(skills.iter().copied(), Vec::<String>::new(), 8),
            behavior: Box::new(move |_, _| Ok(HandlerResult::ok_with(agent_id.clone()))),
            calls: AtomicUsize::new(0),
        })
    }

    /// How many times `handle` ran.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Agent for ScriptedAgent {
    fn id(&self) -> &str {
        &self.id
    }

    fn name(&self) -> &str {
        &self.id
    }

    fn status(&self) -> AgentStatus {
        AgentStatus::Available
    }

    fn capabilities(&self) -> &AgentCapabilities {
        &self.capabilities
    }

    async fn handle(&self, message: &mut Message, _cancel: &CancellationToken) -> DispatchResult {
        let call_number = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        (self.behavior)(message, call_number)
    }
}
