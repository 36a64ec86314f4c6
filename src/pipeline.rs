//! Middleware composition
//!
//! A middleware wraps the downstream chain through [`Next`]: code before
//! `next.run(..)` is its pre-stage, code after the `.await` is its
//! post-stage. Composition is outermost-first in registration order, so for
//! `[M1, M2, M3]` and terminal `H` the effective call order is
//! `M1.pre, M2.pre, M3.pre, H, M3.post, M2.post, M1.post`.
//!
//! Short-circuiting is returning without calling `next.run`. An `Err`
//! propagates immediately: outer post-stages written after a `?` do not run,
//! which is the documented semantics — middleware needing cleanup on the
//! error path must hold it in a guard or inspect the result before
//! propagating.

use crate::error::DispatchError;
use crate::message::{HandlerResult, Message};
use async_trait::async_trait;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Outcome of a pipeline invocation.
pub type DispatchResult = Result<HandlerResult, DispatchError>;

/// Terminal handler at the bottom of the pipeline, typically an agent.
#[async_trait]
pub trait Handler: Send + Sync {
    /// Handles the message.
    async fn call(&self, message: &mut Message, cancel: &CancellationToken) -> DispatchResult;
}

/// Adapts a synchronous closure into a [`Handler`]. Test scaffolding mostly.
pub struct FnHandler<F> {
    f: F,
}

impl<F> FnHandler<F>
where
    F: Fn(&mut Message) -> DispatchResult + Send + Sync,
{
    /// Wraps the closure.
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

#[async_trait]
impl<F> Handler for FnHandler<F>
where
    F: Fn(&mut Message) -> DispatchResult + Send + Sync,
{
    async fn call(&self, message: &mut Message, _cancel: &CancellationToken) -> DispatchResult {
        (self.f)(message)
    }
}

/// One layer of the pipeline.
#[async_trait]
pub trait Middleware: Send + Sync {
    /// Stable middleware name, used in logs and error context.
    fn name(&self) -> &str;

    /// Handles the message, deciding whether and when to invoke `next`.
    async fn handle(
        &self,
        message: &mut Message,
        next: Next<'_>,
        cancel: &CancellationToken,
    ) -> DispatchResult;
}

/// The remaining downstream chain, ending at the terminal handler.
///
/// `Next` is `Copy`, so a middleware may invoke the downstream more than
/// once (retry does); most middleware call it exactly once or not at all.
#[derive(Clone, Copy)]
pub struct Next<'a> {
    middleware: &'a [Arc<dyn Middleware>],
    terminal: &'a dyn Handler,
}

impl Next<'_> {
    /// Invokes the rest of the chain. The cancellation token is passed
    /// through unchanged.
    pub async fn run(self, message: &mut Message, cancel: &CancellationToken) -> DispatchResult {
        match self.middleware.split_first() {
            Some((head, rest)) => {
                let next = Next {
                    middleware: rest,
                    terminal: self.terminal,
                };
                head.handle(message, next, cancel).await
            }
            None => self.terminal.call(message, cancel).await,
        }
    }
}

/// Ordered middleware list. Rebuilding from the same list yields identical
/// behavior; registration order is preserved.
#[derive(Clone, Default)]
pub struct Pipeline {
    middleware: Vec<Arc<dyn Middleware>>,
}

impl Pipeline {
    /// Creates an empty pipeline.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a middleware; it wraps everything registered after it.
    pub fn use_middleware(&mut self, middleware: Arc<dyn Middleware>) {
        self.middleware.push(middleware);
    }

    /// Number of registered middleware.
    #[must_use]
    pub fn len(&self) -> usize {
        self.middleware.len()
    }

    /// True when no middleware is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.middleware.is_empty()
    }

    /// Names of registered middleware in registration order.
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        self.middleware
            .iter()
            .map(|m| m.name().to_string())
            .collect()
    }

    /// Composes the middleware around a terminal handler.
    #[must_use]
    pub fn build(&self, terminal: Arc<dyn Handler>) -> BuiltPipeline {
        BuiltPipeline {
            middleware: self.middleware.clone(),
            terminal,
        }
    }
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("middleware", &self.names())
            .finish()
    }
}

/// A composed, reusable pipeline. Safe for concurrent invocations as long as
/// the middleware and terminal are.
pub struct BuiltPipeline {
    middleware: Vec<Arc<dyn Middleware>>,
    terminal: Arc<dyn Handler>,
}

impl BuiltPipeline {
    /// Runs the message through every middleware and the terminal handler.
    pub async fn call(&self, message: &mut Message, cancel: &CancellationToken) -> DispatchResult {
        let next = Next {
            middleware: &self.middleware,
            terminal: &*self.terminal,
        };
        next.run(message, cancel).await
    }
}
