//! Per-sender sliding-window rate limiting
//!
//! Each sender gets `max_requests` per sliding window. Window records live in
//! a [`StateStore`] so tests can observe and seed them; an admission lock
//! serializes check-and-record, so the limit is exact under concurrency. A
//! request consumes quota when admitted; a failing downstream result does not
//! refund it.

use crate::clock::SharedClock;
use crate::domain_types::{MaxRequests, RateWindowMs};
use crate::message::{HandlerResult, Message};
use crate::pipeline::{DispatchResult, Middleware, Next};
use crate::state_store::{InMemoryStateStore, StateStore};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::SystemTime;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Admission window for one sender.
#[derive(Debug, Clone, Default)]
pub struct RateLimitRecord {
    /// Timestamps of admitted requests inside the window, oldest first.
    pub request_timestamps: VecDeque<SystemTime>,
}

/// Sliding-window limiter keyed by sender id (empty string is a valid key).
pub struct RateLimitMiddleware {
    store: Arc<dyn StateStore<RateLimitRecord>>,
    admission: Mutex<()>,
    max_requests: MaxRequests,
    window: RateWindowMs,
    clock: SharedClock,
}

impl RateLimitMiddleware {
    /// Creates the middleware over a private in-memory store.
    #[must_use]
    pub fn new(max_requests: MaxRequests, window: RateWindowMs, clock: SharedClock) -> Self {
        Self::with_store(
            max_requests,
            window,
            clock,
            Arc::new(InMemoryStateStore::new()),
        )
    }

    /// Creates the middleware over an injected store (testing seam).
    #[must_use]
    pub fn with_store(
        max_requests: MaxRequests,
        window: RateWindowMs,
        clock: SharedClock,
        store: Arc<dyn StateStore<RateLimitRecord>>,
    ) -> Self {
        Self {
            store,
            admission: Mutex::new(()),
            max_requests,
            window,
            clock,
        }
    }

    /// Admitted requests currently inside the window for `sender_id`.
    #[must_use]
    pub fn current_usage(&self, sender_id: &str) -> usize {
        let now = self.clock.now();
        let _guard = self.admission.lock().expect("rate limit lock poisoned");
        let mut record = self.store.get(sender_id).unwrap_or_default();
        self.prune(&mut record, now);
        let usage = record.request_timestamps.len();
        self.store.set(sender_id, record);
        usage
    }

    fn prune(&self, record: &mut RateLimitRecord, now: SystemTime) {
        let cutoff = now
            .checked_sub(self.window.as_duration())
            .unwrap_or(SystemTime::UNIX_EPOCH);
        while record
            .request_timestamps
            .front()
            .is_some_and(|&t| t < cutoff)
        {
            record.request_timestamps.pop_front();
        }
    }
}

#[async_trait]
impl Middleware for RateLimitMiddleware {
    fn name(&self) -> &str {
        "rate-limit"
    }

    async fn handle(
        &self,
        message: &mut Message,
        next: Next<'_>,
        cancel: &CancellationToken,
    ) -> DispatchResult {
        let sender = message.sender_id.clone();
        let now = self.clock.now();

        {
            // Check and record under one lock; the lock is released before
            // the downstream call.
            let _guard = self.admission.lock().expect("rate limit lock poisoned");
            let mut record = self.store.get(&sender).unwrap_or_default();
            self.prune(&mut record, now);

            if record.request_timestamps.len() >= self.max_requests.as_usize() {
                self.store.set(&sender, record);
                debug!(sender_id = %sender, "request rejected by rate limit");
                return Ok(HandlerResult::fail(format!(
                    "Rate limit exceeded for sender '{sender}': {} requests per {}ms",
                    self.max_requests, self.window
                )));
            }
            record.request_timestamps.push_back(now);
            self.store.set(&sender, record);
        }

        next.run(message, cancel).await
    }
}
