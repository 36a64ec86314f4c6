//! Thread-safe agent registry with capability lookup
//!
//! Backed by a `DashMap` for lock-free reads plus a small ordered index so
//! `all()` snapshots come back in registration order.

use crate::agent::Agent;
use dashmap::DashMap;
use std::sync::{Arc, Mutex};

/// Mapping from agent id to agent, with capability-indexed lookup.
#[derive(Default)]
pub struct AgentRegistry {
    agents: DashMap<String, Arc<dyn Agent>>,
    order: Mutex<Vec<String>>,
}

impl AgentRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            agents: DashMap::new(),
            order: Mutex::new(Vec::new()),
        }
    }

    /// Registers an agent. Registering the same id again replaces the prior
    /// entry and keeps its original registration position.
    pub fn register(&self, agent: Arc<dyn Agent>) {
        let id = agent.id().to_string();
        let replaced = self.agents.insert(id.clone(), agent).is_some();
        if !replaced {
            self.order.lock().expect("registry lock poisoned").push(id);
        }
    }

    /// Removes an agent by id. Returns whether an agent was removed.
    pub fn unregister(&self, id: &str) -> bool {
        let removed = self.agents.remove(id).is_some();
        if removed {
            self.order
                .lock()
                .expect("registry lock poisoned")
                .retain(|existing| existing != id);
        }
        removed
    }

    /// Looks up an agent by id.
    #[must_use]
    pub fn get(&self, id: &str) -> Option<Arc<dyn Agent>> {
        self.agents.get(id).map(|entry| Arc::clone(entry.value()))
    }

    /// Snapshot of all agents in registration order.
    #[must_use]
    pub fn all(&self) -> Vec<Arc<dyn Agent>> {
        let order = self.order.lock().expect("registry lock poisoned");
        order.iter().filter_map(|id| self.get(id)).collect()
    }

    /// Agents advertising the given skill (ASCII case-insensitive).
    #[must_use]
    pub fn by_capability(&self, skill: &str) -> Vec<Arc<dyn Agent>> {
        self.all()
            .into_iter()
            .filter(|agent| agent.capabilities().has_skill(skill))
            .collect()
    }

    /// Number of registered agents.
    #[must_use]
    pub fn len(&self) -> usize {
        self.agents.len()
    }

    /// True when no agents are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }
}

impl std::fmt::Debug for AgentRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentRegistry")
            .field("agents", &self.agents.len())
            .finish()
    }
}
