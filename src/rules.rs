//! Priority-ordered routing rules
//!
//! The rule engine owns an ordered rule set and evaluates it against a
//! [`RoutingContext`]. Matches are returned sorted by priority descending with
//! insertion order breaking ties, so evaluation is fully deterministic.

use crate::context::RoutingContext;
use std::sync::{Arc, Mutex};
use tracing::warn;

/// Fallible predicate over a routing context.
///
/// Infallible closures are wrapped via [`RoutingRule::new`]; an `Err` from a
/// predicate is treated as "does not match" and logged.
pub type RulePredicate = Arc<dyn Fn(&RoutingContext) -> Result<bool, anyhow::Error> + Send + Sync>;

/// One routing rule: when the predicate matches, route to `target_agent_id`.
#[derive(Clone)]
pub struct RoutingRule {
    /// Unique rule id; adding the same id twice replaces in place.
    pub id: String,
    /// Human-readable rule name.
    pub name: String,
    /// Match predicate.
    pub predicate: RulePredicate,
    /// Agent selected when the rule matches.
    pub target_agent_id: String,
    /// Any integer; higher wins. Ties break by insertion order.
    pub priority: i32,
}

impl RoutingRule {
    /// Creates a rule from an infallible predicate.
    #[must_use]
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        predicate: impl Fn(&RoutingContext) -> bool + Send + Sync + 'static,
        target_agent_id: impl Into<String>,
        priority: i32,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            predicate: Arc::new(move |ctx| Ok(predicate(ctx))),
            target_agent_id: target_agent_id.into(),
            priority,
        }
    }

    /// Creates a rule whose predicate may fail. A failing predicate does not
    /// match and does not abort evaluation of other rules.
    #[must_use]
    pub fn new_fallible(
        id: impl Into<String>,
        name: impl Into<String>,
        predicate: impl Fn(&RoutingContext) -> Result<bool, anyhow::Error> + Send + Sync + 'static,
        target_agent_id: impl Into<String>,
        priority: i32,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            predicate: Arc::new(predicate),
            target_agent_id: target_agent_id.into(),
            priority,
        }
    }
}

impl std::fmt::Debug for RoutingRule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RoutingRule")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("target_agent_id", &self.target_agent_id)
            .field("priority", &self.priority)
            .finish_non_exhaustive()
    }
}

/// Ordered rule set with deterministic evaluation.
#[derive(Debug)]
pub struct RuleEngine {
    rules: Mutex<Vec<RoutingRule>>,
    stop_on_first_match: bool,
}

impl RuleEngine {
    /// Creates an engine that returns every matching rule.
    #[must_use]
    pub fn new() -> Self {
        Self {
            rules: Mutex::new(Vec::new()),
            stop_on_first_match: false,
        }
    }

    /// Creates an engine that returns at most the single best match.
    #[must_use]
    pub fn stopping_on_first_match() -> Self {
        Self {
            rules: Mutex::new(Vec::new()),
            stop_on_first_match: true,
        }
    }

    /// Inserts a rule, or replaces in place when the id already exists
    /// (the replaced rule keeps its insertion position).
    pub fn add_rule(&self, rule: RoutingRule) {
        let mut rules = self.rules.lock().expect("rule lock poisoned");
        match rules.iter_mut().find(|r| r.id == rule.id) {
            Some(slot) => *slot = rule,
            None => rules.push(rule),
        }
    }

    /// Removes a rule by id. Returns whether a rule was removed.
    pub fn remove_rule(&self, id: &str) -> bool {
        let mut rules = self.rules.lock().expect("rule lock poisoned");
        let before = rules.len();
        rules.retain(|r| r.id != id);
        rules.len() < before
    }

    /// Snapshot of the current rules in insertion order.
    #[must_use]
    pub fn list_rules(&self) -> Vec<RoutingRule> {
        self.rules.lock().expect("rule lock poisoned").clone()
    }

    /// Evaluates every rule against the context.
    ///
    /// Matches come back sorted by priority descending, insertion order
    /// ascending. With `stop_on_first_match` the result holds at most the
    /// best match. Predicate failures are logged and treated as non-matches.
    #[must_use]
    pub fn evaluate(&self, ctx: &RoutingContext) -> Vec<RoutingRule> {
        // Snapshot under the lock; predicates run outside it.
        let snapshot = self.list_rules();

        let mut matches: Vec<RoutingRule> = snapshot
            .into_iter()
            .filter(|rule| match (rule.predicate)(ctx) {
                Ok(matched) => matched,
                Err(error) => {
                    warn!(
                        rule_id = %rule.id,
                        rule_name = %rule.name,
                        %error,
                        "routing rule predicate failed; treating as non-match"
                    );
                    false
                }
            })
            .collect();

        // Stable sort keeps insertion order for equal priorities.
        matches.sort_by(|a, b| b.priority.cmp(&a.priority));

        if self.stop_on_first_match {
            matches.truncate(1);
        }
        matches
    }
}

impl Default for RuleEngine {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::Message;
    use proptest::prelude::*;

    fn ctx(category: &str) -> RoutingContext {
        RoutingContext::from_message(&Message::new("s", "subj", "body").with_category(category))
    }

    #[test]
    fn matches_sort_by_priority_then_insertion() {
        let engine = RuleEngine::new();
        engine.add_rule(RoutingRule::new("low", "low", |_| true, "a", 1));
        engine.add_rule(RoutingRule::new("hi-1", "first high", |_| true, "b", 10));
        engine.add_rule(RoutingRule::new("hi-2", "second high", |_| true, "c", 10));

        let matched = engine.evaluate(&ctx(""));
        let ids: Vec<_> = matched.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["hi-1", "hi-2", "low"]);
    }

    #[test]
    fn stop_on_first_match_returns_single_best() {
        let engine = RuleEngine::stopping_on_first_match();
        engine.add_rule(RoutingRule::new("fallback", "fallback", |_| true, "cs", 1));
        engine.add_rule(RoutingRule::new(
            "tech",
            "tech",
            |c: &RoutingContext| c.category_is("TechnicalSupport"),
            "tech-agent",
            100,
        ));

        let matched = engine.evaluate(&ctx("TechnicalSupport"));
        assert_eq!(matched.len(), 1);
        assert_eq!(matched[0].id, "tech");
    }

    #[test]
    fn add_rule_replaces_in_place() {
        let engine = RuleEngine::new();
        engine.add_rule(RoutingRule::new("r1", "v1", |_| true, "a", 5));
        engine.add_rule(RoutingRule::new("r2", "other", |_| true, "b", 5));
        engine.add_rule(RoutingRule::new("r1", "v2", |_| true, "z", 5));

        let rules = engine.list_rules();
        assert_eq!(rules.len(), 2);
        // Replacement kept the original slot, so r1 still wins the tie.
        assert_eq!(rules[0].id, "r1");
        assert_eq!(rules[0].name, "v2");
        assert_eq!(rules[0].target_agent_id, "z");

        let matched = engine.evaluate(&ctx(""));
        assert_eq!(matched[0].id, "r1");
    }

    #[test]
    fn failing_predicate_is_non_match_and_does_not_abort() {
        let engine = RuleEngine::new();
        engine.add_rule(RoutingRule::new_fallible(
            "bad",
            "explodes",
            |_| Err(anyhow::anyhow!("lookup failed")),
            "a",
            100,
        ));
        engine.add_rule(RoutingRule::new("good", "good", |_| true, "b", 1));

        let matched = engine.evaluate(&ctx(""));
        assert_eq!(matched.len(), 1);
        assert_eq!(matched[0].id, "good");
    }

    #[test]
    fn remove_rule_reports_presence() {
        let engine = RuleEngine::new();
        engine.add_rule(RoutingRule::new("r", "r", |_| true, "a", 0));
        assert!(engine.remove_rule("r"));
        assert!(!engine.remove_rule("r"));
        assert!(engine.evaluate(&ctx("")).is_empty());
    }

    proptest! {
        #[test]
        fn evaluation_order_is_deterministic(priorities in proptest::collection::vec(-50i32..50, 1..20)) {
            let engine = RuleEngine::new();
            for (i, priority) in priorities.iter().enumerate() {
                engine.add_rule(RoutingRule::new(
                    format!("r{i}"),
                    format!("rule {i}"),
                    |_| true,
                    "agent",
                    *priority,
                ));
            }

            let first = engine.evaluate(&ctx(""));
            let second = engine.evaluate(&ctx(""));
            let first_ids: Vec<_> = first.iter().map(|r| r.id.clone()).collect();
            let second_ids: Vec<_> = second.iter().map(|r| r.id.clone()).collect();
            prop_assert_eq!(&first_ids, &second_ids);

            // Priority descending; equal priorities keep insertion order.
            for pair in first.windows(2) {
                prop_assert!(pair[0].priority >= pair[1].priority);
                if pair[0].priority == pair[1].priority {
                    let a: usize = pair[0].id[1..].parse().unwrap();
                    let b: usize = pair[1].id[1..].parse().unwrap();
                    prop_assert!(a < b);
                }
            }
        }
    }
}
