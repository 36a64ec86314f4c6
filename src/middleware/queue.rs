//! Batched message admission
//!
//! Submissions wait in a bounded batch: the batch is released when it fills
//! or when the periodic flush timer fires, whichever comes first. Each
//! released submission then runs the downstream chain itself, so every
//! submitted message receives exactly one result. Downstream errors inside a
//! batch surface per-message as failed results; cancellation still
//! propagates.

use crate::domain_types::{BatchSize, BatchTimeoutMs};
use crate::error::DispatchError;
use crate::message::{HandlerResult, Message};
use crate::pipeline::{DispatchResult, Middleware, Next};
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Weak};
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Holds submissions until the batch fills or the flush timer fires.
pub struct MessageQueueMiddleware {
    waiters: Mutex<Vec<oneshot::Sender<()>>>,
    batch_size: BatchSize,
    disposed: AtomicBool,
    timer_cancel: CancellationToken,
}

impl MessageQueueMiddleware {
    /// Creates the middleware and starts its periodic flush timer.
    #[must_use]
    pub fn new(batch_size: BatchSize, batch_timeout: BatchTimeoutMs) -> Arc<Self> {
        let middleware = Arc::new(Self {
            waiters: Mutex::new(Vec::new()),
            batch_size,
            disposed: AtomicBool::new(false),
            timer_cancel: CancellationToken::new(),
        });

        let timer: Weak<Self> = Arc::downgrade(&middleware);
        let cancel = middleware.timer_cancel.clone();
        let period = batch_timeout.as_duration();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    () = cancel.cancelled() => break,
                    () = tokio::time::sleep(period) => {
                        let Some(queue) = timer.upgrade() else { break };
                        queue.flush();
                    }
                }
            }
        });

        middleware
    }

    /// Releases every waiting submission.
    pub fn flush(&self) {
        let drained: Vec<oneshot::Sender<()>> = {
            let mut waiters = self.waiters.lock().expect("queue lock poisoned");
            waiters.drain(..).collect()
        };
        if !drained.is_empty() {
            debug!(batch = drained.len(), "releasing message batch");
        }
        for waiter in drained {
            let _ = waiter.send(());
        }
    }

    /// Number of submissions currently waiting.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.waiters.lock().expect("queue lock poisoned").len()
    }

    /// Stops the flush timer and releases pending submissions. Idempotent.
    pub fn dispose(&self) {
        if self.disposed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.timer_cancel.cancel();
        self.flush();
    }

    /// Whether `dispose` has run.
    #[must_use]
    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::SeqCst)
    }
}

impl Drop for MessageQueueMiddleware {
    fn drop(&mut self) {
        self.dispose();
    }
}

impl std::fmt::Debug for MessageQueueMiddleware {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessageQueueMiddleware")
            .field("batch_size", &self.batch_size)
            .field("pending", &self.pending())
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

#[async_trait]
impl Middleware for MessageQueueMiddleware {
    fn name(&self) -> &str {
        "message-queue"
    }

    async fn handle(
        &self,
        message: &mut Message,
        next: Next<'_>,
        cancel: &CancellationToken,
    ) -> DispatchResult {
        // After disposal submissions flow straight through.
        if !self.is_disposed() {
            let (release_tx, release_rx) = oneshot::channel();
            let batch_full = {
                let mut waiters = self.waiters.lock().expect("queue lock poisoned");
                waiters.push(release_tx);
                waiters.len() >= self.batch_size.as_usize()
            };
            if batch_full {
                self.flush();
            }

            tokio::select! {
                _ = release_rx => {}
                () = cancel.cancelled() => return Err(DispatchError::Cancelled),
            }
        }

        match next.run(message, cancel).await {
            Ok(result) => Ok(result),
            Err(error) if error.is_cancelled() => Err(error),
            Err(error) => Ok(HandlerResult::fail(format!(
                "Batch processing error: {error}"
            ))),
        }
    }
}
