//! Per-message feature flags
//!
//! Evaluates registered flags against each message and stores the boolean in
//! the message's typed context under `Feature_<name>`. A flag is on when it
//! is enabled and its condition (when present) holds. Condition failures
//! propagate as middleware errors; conversion to a failed result, if wanted,
//! belongs to an upper layer.

use crate::error::DispatchError;
use crate::message::Message;
use crate::pipeline::{DispatchResult, Middleware, Next};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tokio_util::sync::CancellationToken;

/// Context key prefix for flag evaluations.
pub const FEATURE_KEY_PREFIX: &str = "Feature_";

/// Fallible flag condition.
pub type FlagCondition = Arc<dyn Fn(&Message) -> Result<bool, anyhow::Error> + Send + Sync>;

#[derive(Clone)]
struct FeatureFlag {
    enabled: bool,
    condition: Option<FlagCondition>,
}

/// Evaluates feature flags into the typed message context.
#[derive(Default)]
pub struct FeatureFlagsMiddleware {
    flags: RwLock<HashMap<String, FeatureFlag>>,
}

impl FeatureFlagsMiddleware {
    /// Creates the middleware with no flags.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers or replaces an unconditional flag.
    pub fn register_flag(&self, name: impl Into<String>, enabled: bool) {
        self.flags.write().expect("flag lock poisoned").insert(
            name.into(),
            FeatureFlag {
                enabled,
                condition: None,
            },
        );
    }

    /// Registers or replaces a conditional flag. The flag is on only when
    /// `enabled` and the condition returns true.
    pub fn register_conditional_flag(
        &self,
        name: impl Into<String>,
        enabled: bool,
        condition: impl Fn(&Message) -> bool + Send + Sync + 'static,
    ) {
        self.flags.write().expect("flag lock poisoned").insert(
            name.into(),
            FeatureFlag {
                enabled,
                condition: Some(Arc::new(move |message| Ok(condition(message)))),
            },
        );
    }

    /// Registers or replaces a conditional flag whose condition may fail.
    pub fn register_fallible_flag(
        &self,
        name: impl Into<String>,
        enabled: bool,
        condition: impl Fn(&Message) -> Result<bool, anyhow::Error> + Send + Sync + 'static,
    ) {
        self.flags.write().expect("flag lock poisoned").insert(
            name.into(),
            FeatureFlag {
                enabled,
                condition: Some(Arc::new(condition)),
            },
        );
    }
}

#[async_trait]
impl Middleware for FeatureFlagsMiddleware {
    fn name(&self) -> &str {
        "feature-flags"
    }

    async fn handle(
        &self,
        message: &mut Message,
        next: Next<'_>,
        cancel: &CancellationToken,
    ) -> DispatchResult {
        let flags: Vec<(String, FeatureFlag)> = {
            let flags = self.flags.read().expect("flag lock poisoned");
            flags
                .iter()
                .map(|(name, flag)| (name.clone(), flag.clone()))
                .collect()
        };

        for (name, flag) in flags {
            let active = flag.enabled
                && match &flag.condition {
                    Some(condition) => {
                        condition(message).map_err(|source| DispatchError::Middleware {
                            name: self.name().to_string(),
                            source,
                        })?
                    }
                    None => true,
                };
            message
                .context
                .set(format!("{FEATURE_KEY_PREFIX}{name}"), active);
        }

        next.run(message, cancel).await
    }
}
