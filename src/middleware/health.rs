//! Health-aware rerouting
//!
//! Keeps a probe per agent, sweeps them on a periodic timer, and reroutes
//! messages addressed to an unhealthy agent to the first healthy one in
//! registration order. With no healthy agent left, the message fails without
//! reaching downstream.

use crate::domain_types::ProbeIntervalMs;
use crate::message::{HandlerResult, Message};
use crate::pipeline::{DispatchResult, Middleware, Next};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Fallible health probe; an `Err` marks the agent unhealthy.
pub type HealthProbe = Arc<dyn Fn() -> Result<bool, anyhow::Error> + Send + Sync>;

struct ProbeEntry {
    agent_id: String,
    probe: HealthProbe,
    healthy: bool,
}

/// Reroutes messages away from unhealthy agents.
pub struct AgentHealthCheckMiddleware {
    entries: Mutex<Vec<ProbeEntry>>,
    disposed: AtomicBool,
    timer_cancel: CancellationToken,
}

impl AgentHealthCheckMiddleware {
    /// Creates the middleware and starts its periodic probe timer.
    #[must_use]
    pub fn new(probe_interval: ProbeIntervalMs) -> Arc<Self> {
        let middleware = Arc::new(Self {
            entries: Mutex::new(Vec::new()),
            disposed: AtomicBool::new(false),
            timer_cancel: CancellationToken::new(),
        });

        let timer = Arc::downgrade(&middleware);
        let cancel = middleware.timer_cancel.clone();
        let period = probe_interval.as_duration();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    () = cancel.cancelled() => break,
                    () = tokio::time::sleep(period) => {
                        let Some(checker) = timer.upgrade() else { break };
                        checker.run_probes_once();
                    }
                }
            }
        });

        middleware
    }

    /// Registers an agent probe. Agents start healthy; re-registration
    /// replaces the probe in place and resets health.
    pub fn register_agent(&self, agent_id: impl Into<String>, probe: HealthProbe) {
        let agent_id = agent_id.into();
        let mut entries = self.entries.lock().expect("health lock poisoned");
        match entries.iter_mut().find(|e| e.agent_id == agent_id) {
            Some(entry) => {
                entry.probe = probe;
                entry.healthy = true;
            }
            None => entries.push(ProbeEntry {
                agent_id,
                probe,
                healthy: true,
            }),
        }
    }

    /// Invokes every probe once and records the results.
    pub fn run_probes_once(&self) {
        // Clone the probes out so slow probes never run under the lock.
        let probes: Vec<(String, HealthProbe)> = {
            let entries = self.entries.lock().expect("health lock poisoned");
            entries
                .iter()
                .map(|e| (e.agent_id.clone(), Arc::clone(&e.probe)))
                .collect()
        };

        for (agent_id, probe) in probes {
            let healthy = match probe() {
                Ok(healthy) => healthy,
                Err(error) => {
                    warn!(agent_id = %agent_id, %error, "health probe failed");
                    false
                }
            };
            self.set_health(&agent_id, healthy);
        }
    }

    /// Overrides an agent's recorded health. Also the testing hook.
    pub fn set_health(&self, agent_id: &str, healthy: bool) {
        let mut entries = self.entries.lock().expect("health lock poisoned");
        if let Some(entry) = entries.iter_mut().find(|e| e.agent_id == agent_id) {
            entry.healthy = healthy;
        }
    }

    /// Defensive copy of the current health table.
    #[must_use]
    pub fn health_status(&self) -> HashMap<String, bool> {
        self.entries
            .lock()
            .expect("health lock poisoned")
            .iter()
            .map(|e| (e.agent_id.clone(), e.healthy))
            .collect()
    }

    /// Stops the probe timer. Idempotent.
    pub fn dispose(&self) {
        if self.disposed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.timer_cancel.cancel();
    }

    /// Whether `dispose` has run.
    #[must_use]
    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::SeqCst)
    }

    fn recorded_health(&self, agent_id: &str) -> Option<bool> {
        self.entries
            .lock()
            .expect("health lock poisoned")
            .iter()
            .find(|e| e.agent_id == agent_id)
            .map(|e| e.healthy)
    }

    fn first_healthy(&self) -> Option<String> {
        self.entries
            .lock()
            .expect("health lock poisoned")
            .iter()
            .find(|e| e.healthy)
            .map(|e| e.agent_id.clone())
    }
}

impl Drop for AgentHealthCheckMiddleware {
    fn drop(&mut self) {
        self.dispose();
    }
}

impl std::fmt::Debug for AgentHealthCheckMiddleware {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentHealthCheckMiddleware")
            .field("agents", &self.entries.lock().expect("health lock poisoned").len())
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

#[async_trait]
impl Middleware for AgentHealthCheckMiddleware {
    fn name(&self) -> &str {
        "agent-health-check"
    }

    async fn handle(
        &self,
        message: &mut Message,
        next: Next<'_>,
        cancel: &CancellationToken,
    ) -> DispatchResult {
        // Unknown receivers are not this middleware's concern.
        match self.recorded_health(&message.receiver_id) {
            None | Some(true) => next.run(message, cancel).await,
            Some(false) => match self.first_healthy() {
                Some(replacement) => {
                    debug!(
                        from = %message.receiver_id,
                        to = %replacement,
                        "rerouting away from unhealthy agent"
                    );
                    message.receiver_id = replacement;
                    next.run(message, cancel).await
                }
                None => Ok(HandlerResult::fail("No healthy agents available")),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::{FnHandler, Pipeline};
    use std::sync::atomic::AtomicUsize;

    fn healthy_probe() -> HealthProbe {
        Arc::new(|| Ok(true))
    }

    fn checked_pipeline(
        checker: &Arc<AgentHealthCheckMiddleware>,
    ) -> crate::pipeline::BuiltPipeline {
        let mut pipeline = Pipeline::new();
        pipeline.use_middleware(Arc::clone(checker) as Arc<dyn Middleware>);
        pipeline.build(Arc::new(FnHandler::new(|m: &mut Message| {
            Ok(HandlerResult::ok_with(format!("handled by {}", m.receiver_id)))
        })))
    }

    fn checker() -> Arc<AgentHealthCheckMiddleware> {
        AgentHealthCheckMiddleware::new(ProbeIntervalMs::try_new(60_000).unwrap())
    }

    #[tokio::test]
    async fn healthy_and_unknown_receivers_pass_through() {
        let checker = checker();
        checker.register_agent("a", healthy_probe());
        let built = checked_pipeline(&checker);
        let token = CancellationToken::new();

        let mut to_known = Message::new("s", "subj", "c").with_receiver("a");
        let result = built.call(&mut to_known, &token).await.unwrap();
        assert_eq!(result.response.as_deref(), Some("handled by a"));

        let mut to_unknown = Message::new("s", "subj", "c").with_receiver("ghost");
        let result = built.call(&mut to_unknown, &token).await.unwrap();
        assert_eq!(result.response.as_deref(), Some("handled by ghost"));

        let mut unaddressed = Message::new("s", "subj", "c");
        assert!(built.call(&mut unaddressed, &token).await.unwrap().success);
    }

    #[tokio::test]
    async fn unhealthy_receiver_reroutes_to_first_healthy() {
        let checker = checker();
        checker.register_agent("a", healthy_probe());
        checker.register_agent("b", healthy_probe());
        checker.register_agent("c", healthy_probe());
        checker.set_health("a", false);
        checker.set_health("b", false);

        let built = checked_pipeline(&checker);
        let mut message = Message::new("s", "subj", "c").with_receiver("a");
        let result = built
            .call(&mut message, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(result.response.as_deref(), Some("handled by c"));
        assert_eq!(message.receiver_id, "c");
    }

    #[tokio::test]
    async fn no_healthy_agent_short_circuits() {
        let checker = checker();
        checker.register_agent("a", healthy_probe());
        checker.set_health("a", false);

        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let mut pipeline = Pipeline::new();
        pipeline.use_middleware(Arc::clone(&checker) as Arc<dyn Middleware>);
        let built = pipeline.build(Arc::new(FnHandler::new(move |_m: &mut Message| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(HandlerResult::ok())
        })));

        let mut message = Message::new("s", "subj", "c").with_receiver("a");
        let result = built
            .call(&mut message, &CancellationToken::new())
            .await
            .unwrap();

        assert!(!result.success);
        assert_eq!(result.error.as_deref(), Some("No healthy agents available"));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn failing_probe_marks_unhealthy() {
        let checker = checker();
        checker.register_agent("a", Arc::new(|| Err(anyhow::anyhow!("probe timeout"))));
        checker.register_agent("b", healthy_probe());

        checker.run_probes_once();
        let status = checker.health_status();
        assert!(!status["a"]);
        assert!(status["b"]);
    }

    #[tokio::test]
    async fn periodic_timer_runs_probes() {
        let checker =
            AgentHealthCheckMiddleware::new(ProbeIntervalMs::try_new(20).unwrap());
        let flips = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&flips);
        checker.register_agent(
            "a",
            Arc::new(move || {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(false)
            }),
        );

        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        assert!(flips.load(Ordering::SeqCst) >= 1);
        assert!(!checker.health_status()["a"]);

        checker.dispose();
        checker.dispose();
        assert!(checker.is_disposed());
        let after = flips.load(Ordering::SeqCst);
        tokio::time::sleep(std::time::Duration::from_millis(60)).await;
        // Timer stopped; at most one in-flight sweep may still land.
        assert!(flips.load(Ordering::SeqCst) <= after + 1);
    }

    #[tokio::test]
    async fn health_status_is_a_defensive_copy() {
        let checker = checker();
        checker.register_agent("a", healthy_probe());
        let mut copy = checker.health_status();
        copy.insert("a".to_string(), false);
        assert!(checker.health_status()["a"]);
    }
}
