//! A/B experiment assignment
//!
//! Assigns every message a variant for each registered experiment and records
//! the assignment in metadata under `Experiment_<name>`. Probabilities are
//! clamped into [0, 1]; re-registering an experiment replaces its
//! configuration.

use crate::message::Message;
use crate::pipeline::{DispatchResult, Middleware, Next};
use async_trait::async_trait;
use rand::Rng;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::RwLock;
use tokio_util::sync::CancellationToken;

/// Metadata key prefix for experiment assignments.
pub const EXPERIMENT_KEY_PREFIX: &str = "Experiment_";

#[derive(Debug, Clone)]
struct Experiment {
    probability: f64,
    variant_a: String,
    variant_b: String,
}

/// Samples a variant per message per experiment.
#[derive(Debug, Default)]
pub struct ABTestingMiddleware {
    experiments: RwLock<HashMap<String, Experiment>>,
}

impl ABTestingMiddleware {
    /// Creates the middleware with no experiments.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers or replaces an experiment. `probability` is the chance of
    /// variant A and is clamped into [0, 1].
    pub fn register_experiment(
        &self,
        name: impl Into<String>,
        probability: f64,
        variant_a: impl Into<String>,
        variant_b: impl Into<String>,
    ) {
        let experiment = Experiment {
            probability: probability.clamp(0.0, 1.0),
            variant_a: variant_a.into(),
            variant_b: variant_b.into(),
        };
        self.experiments
            .write()
            .expect("experiment lock poisoned")
            .insert(name.into(), experiment);
    }

    /// Removes an experiment. Returns whether it existed.
    pub fn remove_experiment(&self, name: &str) -> bool {
        self.experiments
            .write()
            .expect("experiment lock poisoned")
            .remove(name)
            .is_some()
    }
}

#[async_trait]
impl Middleware for ABTestingMiddleware {
    fn name(&self) -> &str {
        "ab-testing"
    }

    async fn handle(
        &self,
        message: &mut Message,
        next: Next<'_>,
        cancel: &CancellationToken,
    ) -> DispatchResult {
        {
            let experiments = self.experiments.read().expect("experiment lock poisoned");
            let mut rng = rand::thread_rng();
            for (name, experiment) in experiments.iter() {
                let variant = if rng.gen_range(0.0..1.0) < experiment.probability {
                    &experiment.variant_a
                } else {
                    &experiment.variant_b
                };
                message.metadata.insert(
                    format!("{EXPERIMENT_KEY_PREFIX}{name}"),
                    Value::String(variant.clone()),
                );
            }
        }
        next.run(message, cancel).await
    }
}
