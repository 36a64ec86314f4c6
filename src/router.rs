//! Message router
//!
//! Orchestrates one `route` call end to end: build the routing context,
//! evaluate the rules, resolve the target agent, stamp the receiver, and run
//! the middleware pipeline with the agent as terminal handler. Also exposes
//! broadcast fan-out, unroutable/routed event surfaces, and per-rule hit
//! metrics.

use crate::agent::Agent;
use crate::context::RoutingContext;
use crate::logger::Logger;
use crate::message::{HandlerResult, Message};
use crate::pipeline::{DispatchResult, Handler, Middleware, Pipeline};
use crate::registry::AgentRegistry;
use crate::rules::{RoutingRule, RuleEngine};
use async_trait::async_trait;
use dashmap::DashMap;
use futures::future::join_all;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Subscriber for messages no rule or agent could take.
pub type UnroutableHandler = Box<dyn Fn(&Message, &str) -> Result<(), anyhow::Error> + Send + Sync>;

/// Subscriber for successfully routed messages `(message, from, to)`.
pub type RoutedHandler =
    Box<dyn Fn(&Message, Option<&str>, &str) -> Result<(), anyhow::Error> + Send + Sync>;

/// Terminal pipeline handler delegating to an agent.
///
/// The receiver is re-resolved at call time so middleware that reroutes by
/// mutating `receiver_id` (health checks) hands the message to the new
/// agent; when the receiver is unknown the originally selected agent takes
/// it.
struct AgentTerminal {
    agent: Arc<dyn Agent>,
    registry: Arc<AgentRegistry>,
}

#[async_trait]
impl Handler for AgentTerminal {
    async fn call(&self, message: &mut Message, cancel: &CancellationToken) -> DispatchResult {
        let agent = if message.receiver_id == self.agent.id() {
            Arc::clone(&self.agent)
        } else {
            self.registry
                .get(&message.receiver_id)
                .unwrap_or_else(|| Arc::clone(&self.agent))
        };
        agent.handle(message, cancel).await
    }
}

/// Routes messages to agents through the middleware pipeline.
pub struct Router {
    registry: Arc<AgentRegistry>,
    rules: Arc<RuleEngine>,
    pipeline: RwLock<Pipeline>,
    logger: Arc<dyn Logger>,
    default_agent_id: Option<String>,
    rule_hits: DashMap<String, u64>,
    unroutable_subscribers: RwLock<Vec<UnroutableHandler>>,
    routed_subscribers: RwLock<Vec<RoutedHandler>>,
}

impl Router {
    /// Assembles a router from its collaborators. Most callers go through
    /// [`RouterBuilder`](crate::builder::RouterBuilder) instead.
    #[must_use]
    pub fn new(
        registry: Arc<AgentRegistry>,
        rules: Arc<RuleEngine>,
        pipeline: Pipeline,
        logger: Arc<dyn Logger>,
        default_agent_id: Option<String>,
    ) -> Self {
        Self {
            registry,
            rules,
            pipeline: RwLock::new(pipeline),
            logger,
            default_agent_id,
            rule_hits: DashMap::new(),
            unroutable_subscribers: RwLock::new(Vec::new()),
            routed_subscribers: RwLock::new(Vec::new()),
        }
    }

    /// Routes one message. Routing misses come back as failed results (and
    /// fire the unroutable event); pipeline errors propagate.
    pub async fn route(
        &self,
        message: &mut Message,
        cancel: &CancellationToken,
    ) -> DispatchResult {
        let ctx = RoutingContext::from_message(message);
        let matches = self.rules.evaluate(&ctx);
        let selected = matches.first();

        let target_id = match selected {
            Some(rule) => rule.target_agent_id.clone(),
            None => match &self.default_agent_id {
                Some(default) => default.clone(),
                None => {
                    let reason = "no routing rule matched";
                    self.emit_unroutable(message, reason);
                    return Ok(HandlerResult::fail(format!("No agent available: {reason}")));
                }
            },
        };

        let Some(agent) = self.registry.get(&target_id) else {
            let reason = format!("agent '{target_id}' not registered");
            self.emit_unroutable(message, &reason);
            return Ok(HandlerResult::fail(format!("No agent available: {reason}")));
        };

        message.receiver_id = agent.id().to_string();
        debug!(
            message_id = %message.id,
            agent_id = %target_id,
            rule_id = selected.map_or("<default>", |r| r.id.as_str()),
            "message routed"
        );

        let built = {
            let pipeline = self.pipeline.read().expect("pipeline lock poisoned");
            pipeline.build(Arc::new(AgentTerminal {
                agent: Arc::clone(&agent),
                registry: Arc::clone(&self.registry),
            }))
        };
        let outcome = built.call(message, cancel).await;

        if let Some(rule) = selected {
            *self.rule_hits.entry(rule.id.clone()).or_insert(0) += 1;
        }
        if outcome.is_ok() {
            self.emit_routed(message, None, agent.id());
        }
        outcome
    }

    /// Fans the message out to every registered agent, each running
    /// independently through the full pipeline on its own copy.
    pub async fn broadcast(
        &self,
        message: &Message,
        cancel: &CancellationToken,
    ) -> Vec<DispatchResult> {
        self.broadcast_filtered(message, |_| true, cancel).await
    }

    /// Broadcast limited to agents accepted by the filter.
    pub async fn broadcast_filtered(
        &self,
        message: &Message,
        filter: impl Fn(&dyn Agent) -> bool,
        cancel: &CancellationToken,
    ) -> Vec<DispatchResult> {
        let recipients: Vec<Arc<dyn Agent>> = self
            .registry
            .all()
            .into_iter()
            .filter(|agent| filter(agent.as_ref()))
            .collect();
        info!(
            message_id = %message.id,
            recipients = recipients.len(),
            "broadcasting message"
        );

        let deliveries = recipients.into_iter().map(|agent| {
            let mut copy = message.clone();
            copy.receiver_id = agent.id().to_string();
            let built = {
                let pipeline = self.pipeline.read().expect("pipeline lock poisoned");
                pipeline.build(Arc::new(AgentTerminal {
                    agent,
                    registry: Arc::clone(&self.registry),
                }))
            };
            let cancel = cancel.clone();
            async move { built.call(&mut copy, &cancel).await }
        });
        join_all(deliveries).await
    }

    /// Registers an agent (same id replaces).
    pub fn register_agent(&self, agent: Arc<dyn Agent>) {
        self.registry.register(agent);
    }

    /// Removes an agent. Returns whether it existed.
    pub fn unregister_agent(&self, id: &str) -> bool {
        self.registry.unregister(id)
    }

    /// Looks up one agent.
    #[must_use]
    pub fn agent(&self, id: &str) -> Option<Arc<dyn Agent>> {
        self.registry.get(id)
    }

    /// Snapshot of all registered agents.
    #[must_use]
    pub fn all_agents(&self) -> Vec<Arc<dyn Agent>> {
        self.registry.all()
    }

    /// Agents advertising a skill (case-insensitive).
    #[must_use]
    pub fn agents_by_capability(&self, skill: &str) -> Vec<Arc<dyn Agent>> {
        self.registry.by_capability(skill)
    }

    /// Appends a middleware to the pipeline.
    pub fn use_middleware(&self, middleware: Arc<dyn Middleware>) {
        self.pipeline
            .write()
            .expect("pipeline lock poisoned")
            .use_middleware(middleware);
    }

    /// Adds or replaces a routing rule.
    pub fn add_routing_rule(&self, rule: RoutingRule) {
        self.rules.add_rule(rule);
    }

    /// Hit count per rule id.
    #[must_use]
    pub fn routing_metrics(&self) -> HashMap<String, u64> {
        self.rule_hits
            .iter()
            .map(|entry| (entry.key().clone(), *entry.value()))
            .collect()
    }

    /// Subscribes to unroutable-message events. Subscriber failures are
    /// logged and discarded.
    pub fn on_unroutable(&self, handler: UnroutableHandler) {
        self.unroutable_subscribers
            .write()
            .expect("subscriber lock poisoned")
            .push(handler);
    }

    /// Subscribes to routed-message events. Subscriber failures are logged
    /// and discarded.
    pub fn on_message_routed(&self, handler: RoutedHandler) {
        self.routed_subscribers
            .write()
            .expect("subscriber lock poisoned")
            .push(handler);
    }

    fn emit_unroutable(&self, message: &Message, reason: &str) {
        self.logger.warn(&format!(
            "message {} is unroutable: {reason}",
            message.id
        ));
        let subscribers = self
            .unroutable_subscribers
            .read()
            .expect("subscriber lock poisoned");
        for subscriber in subscribers.iter() {
            if let Err(error) = subscriber(message, reason) {
                self.logger
                    .error(&format!("unroutable subscriber failed: {error}"));
            }
        }
    }

    fn emit_routed(&self, message: &Message, from: Option<&str>, to: &str) {
        let subscribers = self
            .routed_subscribers
            .read()
            .expect("subscriber lock poisoned");
        for subscriber in subscribers.iter() {
            if let Err(error) = subscriber(message, from, to) {
                self.logger
                    .error(&format!("routed subscriber failed: {error}"));
            }
        }
    }
}

impl std::fmt::Debug for Router {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Router")
            .field("agents", &self.registry.len())
            .field("rules", &self.rules.list_rules().len())
            .field("default_agent_id", &self.default_agent_id)
            .finish()
    }
}
