//! # Message Routing Performance Benchmarks
//!
//! Measures rule evaluation, bare routing, and routing through a realistic
//! middleware stack.

#![allow(clippy::pedantic)] // bench scaffolding favors directness

use async_trait::async_trait;
use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use std::hint::black_box;
use std::sync::Arc;
use std::time::Duration;
use switchboard::{
    Agent, AgentCapabilities, AgentStatus, CacheCapacity, CacheTtlMs, CachingMiddleware,
    DispatchResult, EnrichmentMiddleware, HandlerResult, Message, NullLogger, RouterBuilder,
    RoutingContext, RoutingRule, RuleEngine, ValidationMiddleware, system_clock,
};
use tokio::runtime::Runtime;
use tokio_util::sync::CancellationToken;

struct NoopAgent;

#[async_trait]
impl Agent for NoopAgent {
    fn id(&self) -> &str {
        "bench-agent"
    }
    fn name(&self) -> &str {
        "bench-agent"
    }
    fn status(&self) -> AgentStatus {
        AgentStatus::Available
    }
    fn capabilities(&self) -> &AgentCapabilities {
        static CAPS: std::sync::OnceLock<AgentCapabilities> = std::sync::OnceLock::new();
        CAPS.get_or_init(AgentCapabilities::default)
    }
    async fn handle(&self, _message: &mut Message, _cancel: &CancellationToken) -> DispatchResult {
        Ok(HandlerResult::ok())
    }
}

fn bench_rule_evaluation(c: &mut Criterion) {
    let mut group = c.benchmark_group("rule_evaluation");

    for rule_count in [10usize, 100, 1000] {
        let engine = RuleEngine::stopping_on_first_match();
        for i in 0..rule_count {
            engine.add_rule(RoutingRule::new(
                format!("rule-{i}"),
                format!("rule {i}"),
                move |ctx: &RoutingContext| ctx.category_is("never-matches"),
                "bench-agent",
                i as i32,
            ));
        }
        engine.add_rule(RoutingRule::new("hit", "matches", |_| true, "bench-agent", -1));

        let message = Message::new("bench", "subject", "content").with_category("Load");
        let ctx = RoutingContext::from_message(&message);

        group.bench_with_input(
            BenchmarkId::new("evaluate", rule_count),
            &rule_count,
            |b, _| {
                b.iter(|| black_box(engine.evaluate(&ctx)));
            },
        );
    }
    group.finish();
}

fn bench_route(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let mut group = c.benchmark_group("route");
    group.measurement_time(Duration::from_secs(10));

    let bare = RouterBuilder::new()
        .with_logger(Arc::new(NullLogger::new()))
        .register_agent(Arc::new(NoopAgent))
        .add_routing_rule("all", "everything", |_| true, "bench-agent", 1)
        .build();

    group.bench_function("bare_pipeline", |b| {
        b.to_async(&rt).iter(|| async {
            let mut message = Message::new("bench", "subject", "content");
            black_box(
                bare.route(&mut message, &CancellationToken::new())
                    .await
                    .unwrap(),
            );
        });
    });

    let clock = system_clock();
    let stacked = RouterBuilder::new()
        .with_logger(Arc::new(NullLogger::new()))
        .register_agent(Arc::new(NoopAgent))
        .use_middleware(Arc::new(ValidationMiddleware::new()))
        .use_middleware(Arc::new(EnrichmentMiddleware::with_machine_name(
            clock.clone(),
            "bench-host",
        )))
        .use_middleware(Arc::new(CachingMiddleware::new(
            CacheCapacity::try_new(10_000).unwrap(),
            CacheTtlMs::try_new(300_000).unwrap(),
            clock,
        )))
        .add_routing_rule("all", "everything", |_| true, "bench-agent", 1)
        .build();

    group.bench_function("middleware_stack", |b| {
        b.to_async(&rt).iter(|| async {
            // Unique subject per call defeats the cache, exercising the
            // full miss path.
            let mut message = Message::new("bench", uuid::Uuid::new_v4().to_string(), "content");
            black_box(
                stacked
                    .route(&mut message, &CancellationToken::new())
                    .await
                    .unwrap(),
            );
        });
    });

    group.finish();
}

criterion_group!(benches, bench_rule_evaluation, bench_route);
criterion_main!(benches);
