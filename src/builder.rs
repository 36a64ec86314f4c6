//! Fluent router assembly
//!
//! Collects the registry, rule engine, pipeline, logger, and agents, then
//! produces a [`Router`]. `build` may be called repeatedly; every call
//! returns a fresh router over the same configured collaborators.

use crate::agent::Agent;
use crate::context::RoutingContext;
use crate::logger::{Logger, TracingLogger};
use crate::pipeline::{Middleware, Pipeline};
use crate::registry::AgentRegistry;
use crate::router::Router;
use crate::rules::{RoutingRule, RuleEngine};
use std::sync::Arc;

/// Fluent configuration producing a [`Router`].
pub struct RouterBuilder {
    registry: Arc<AgentRegistry>,
    rules: Arc<RuleEngine>,
    pipeline: Pipeline,
    logger: Arc<dyn Logger>,
    default_agent_id: Option<String>,
}

impl RouterBuilder {
    /// Starts a builder with an empty registry, a first-match rule engine,
    /// an empty pipeline, and the tracing-backed logger.
    #[must_use]
    pub fn new() -> Self {
        Self {
            registry: Arc::new(AgentRegistry::new()),
            rules: Arc::new(RuleEngine::stopping_on_first_match()),
            pipeline: Pipeline::new(),
            logger: Arc::new(TracingLogger::new()),
            default_agent_id: None,
        }
    }

    /// Replaces the logger collaborator.
    #[must_use]
    pub fn with_logger(mut self, logger: Arc<dyn Logger>) -> Self {
        self.logger = logger;
        self
    }

    /// Replaces the rule engine.
    #[must_use]
    pub fn with_routing_engine(mut self, rules: Arc<RuleEngine>) -> Self {
        self.rules = rules;
        self
    }

    /// Replaces the middleware pipeline.
    #[must_use]
    pub fn with_pipeline(mut self, pipeline: Pipeline) -> Self {
        self.pipeline = pipeline;
        self
    }

    /// Sets the agent that takes messages no rule matched.
    #[must_use]
    pub fn with_default_agent(mut self, agent_id: impl Into<String>) -> Self {
        self.default_agent_id = Some(agent_id.into());
        self
    }

    /// Appends a middleware in registration order.
    #[must_use]
    pub fn use_middleware(mut self, middleware: Arc<dyn Middleware>) -> Self {
        self.pipeline.use_middleware(middleware);
        self
    }

    /// Registers an agent.
    #[must_use]
    pub fn register_agent(self, agent: Arc<dyn Agent>) -> Self {
        self.registry.register(agent);
        self
    }

    /// Adds a routing rule from its parts.
    #[must_use]
    pub fn add_routing_rule(
        self,
        id: impl Into<String>,
        name: impl Into<String>,
        predicate: impl Fn(&RoutingContext) -> bool + Send + Sync + 'static,
        target_agent_id: impl Into<String>,
        priority: i32,
    ) -> Self {
        self.rules
            .add_rule(RoutingRule::new(id, name, predicate, target_agent_id, priority));
        self
    }

    /// Builds a router. The builder stays usable; later builds share the
    /// same registry and rule engine.
    #[must_use]
    pub fn build(&self) -> Router {
        Router::new(
            Arc::clone(&self.registry),
            Arc::clone(&self.rules),
            self.pipeline.clone(),
            Arc::clone(&self.logger),
            self.default_agent_id.clone(),
        )
    }
}

impl Default for RouterBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for RouterBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RouterBuilder")
            .field("agents", &self.registry.len())
            .field("rules", &self.rules.list_rules().len())
            .field("middleware", &self.pipeline.names())
            .finish()
    }
}
