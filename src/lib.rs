//! # Switchboard - In-Process Agent Message Routing
//!
//! Switchboard routes structured messages to handler agents through a
//! composable middleware pipeline. Three subsystems carry the core
//! contracts:
//!
//! - a priority-ordered **rule engine** with deterministic tie-breaking,
//! - a nested **middleware pipeline** with exact ordering, short-circuit,
//!   and error semantics,
//! - a family of **stateful middleware** with concurrency, time, and
//!   eviction guarantees (LRU cache, sliding-window rate limit, bounded
//!   metrics buffer, periodic health checks, batch queue, and more).
//!
//! Everything is process-local: no transport, no persistence, no
//! distributed coordination. Agents are in-process implementations of the
//! [`Agent`] trait, and time-dependent middleware take an injected
//! [`Clock`] so tests control time explicitly.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use switchboard::{RouterBuilder, Message, ValidationMiddleware};
//! use tokio_util::sync::CancellationToken;
//!
//! # use switchboard::{Agent, AgentCapabilities, AgentStatus, HandlerResult, DispatchResult};
//! # use async_trait::async_trait;
//! # struct SupportAgent;
//! # #[async_trait]
//! # impl Agent for SupportAgent {
//! #     fn id(&self) -> &str { "support" }
//! #     fn name(&self) -> &str { "Support" }
//! #     fn status(&self) -> AgentStatus { AgentStatus::Available }
//! #     fn capabilities(&self) -> &AgentCapabilities {
//! #         static CAPS: std::sync::OnceLock<AgentCapabilities> = std::sync::OnceLock::new();
//! #         CAPS.get_or_init(AgentCapabilities::default)
//! #     }
//! #     async fn handle(&self, _m: &mut Message, _c: &CancellationToken) -> DispatchResult {
//! #         Ok(HandlerResult::ok())
//! #     }
//! # }
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let router = RouterBuilder::new()
//!     .register_agent(Arc::new(SupportAgent))
//!     .use_middleware(Arc::new(ValidationMiddleware::new()))
//!     .add_routing_rule(
//!         "support",
//!         "support tickets",
//!         |ctx| ctx.category_is("Support"),
//!         "support",
//!         100,
//!     )
//!     .build();
//!
//! let mut message = Message::new("alice", "help!", "the API is down")
//!     .with_category("Support");
//! let result = router.route(&mut message, &CancellationToken::new()).await?;
//! assert!(result.success);
//! # Ok(())
//! # }
//! ```

// Pedantic opt-outs for conventions this crate does not follow.
#![allow(
    clippy::cast_possible_truncation,
    clippy::cast_precision_loss,
    clippy::cast_sign_loss,
    clippy::doc_markdown,
    clippy::explicit_iter_loop,
    clippy::float_cmp,
    clippy::missing_errors_doc,
    clippy::missing_fields_in_debug,
    clippy::missing_panics_doc,
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::similar_names,
    clippy::single_match_else,
    clippy::unused_async
)]

// Core modules
pub mod agent;
pub mod builder;
pub mod clock;
pub mod container;
pub mod context;
pub mod domain_types;
pub mod error;
pub mod logger;
pub mod message;
pub mod middleware;
pub mod pipeline;
pub mod registry;
pub mod router;
pub mod rules;
pub mod state_store;

// Re-export the public surface at the crate root
pub use crate::agent::{Agent, AgentCapabilities, AgentStatus};
pub use crate::builder::RouterBuilder;
pub use crate::clock::{Clock, ManualClock, SharedClock, SystemClock, manual_clock, system_clock};
pub use crate::container::{ContainerError, Disposable, ServiceContainer};
pub use crate::context::RoutingContext;
pub use crate::domain_types::*;
pub use crate::error::DispatchError;
pub use crate::logger::{Logger, NullLogger, TracingLogger};
pub use crate::message::{HandlerResult, Message, MessagePriority, TypedBag};
pub use crate::middleware::*;
pub use crate::pipeline::{
    BuiltPipeline, DispatchResult, FnHandler, Handler, Middleware, Next, Pipeline,
};
pub use crate::registry::AgentRegistry;
pub use crate::router::{RoutedHandler, Router, UnroutableHandler};
pub use crate::rules::{RoutingRule, RuleEngine, RulePredicate};
pub use crate::state_store::{InMemoryStateStore, StateStore};
