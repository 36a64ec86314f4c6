//! Time abstraction for testable time-dependent middleware
//!
//! Every time-dependent component (caching, rate limiting, retry backoff,
//! health probes) receives a [`Clock`] instead of reading ambient time, so
//! tests can advance time explicitly without real delays.

use async_trait::async_trait;
use std::sync::Arc;
use std::sync::Mutex;
use std::time::{Duration, SystemTime};
use tokio::time::sleep as tokio_sleep;

/// Injectable time source.
///
/// `now` answers wall-clock queries (TTL checks, sliding windows, span
/// timestamps); `sleep` is used for delays (retry backoff, batch timeouts).
#[async_trait]
pub trait Clock: Send + Sync + std::fmt::Debug {
    /// Current wall-clock time.
    #[must_use]
    fn now(&self) -> SystemTime;

    /// Sleep for the given duration.
    async fn sleep(&self, duration: Duration);
}

/// Real time source for production use.
#[derive(Debug, Clone, Default)]
pub struct SystemClock;

impl SystemClock {
    /// Creates a new system clock.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Clock for SystemClock {
    fn now(&self) -> SystemTime {
        SystemTime::now()
    }

    async fn sleep(&self, duration: Duration) {
        tokio_sleep(duration).await;
    }
}

/// Manually-driven clock for tests.
///
/// `now` starts at construction time and only moves when [`advance`] is
/// called. Sleeps advance the clock by the requested duration and resolve
/// immediately, so retry/backoff tests run at full speed.
///
/// [`advance`]: ManualClock::advance
#[derive(Debug)]
pub struct ManualClock {
    current: Mutex<SystemTime>,
}

impl ManualClock {
    /// Creates a manual clock starting at the real current time.
    #[must_use]
    pub fn new() -> Self {
        Self {
            current: Mutex::new(SystemTime::now()),
        }
    }

    /// Creates a manual clock starting at the given instant.
    #[must_use]
    pub fn starting_at(start: SystemTime) -> Self {
        Self {
            current: Mutex::new(start),
        }
    }

    /// Moves the clock forward.
    pub fn advance(&self, delta: Duration) {
        let mut current = self.current.lock().expect("clock lock poisoned");
        *current += delta;
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Clock for ManualClock {
    fn now(&self) -> SystemTime {
        *self.current.lock().expect("clock lock poisoned")
    }

    async fn sleep(&self, duration: Duration) {
        self.advance(duration);
        // Yield once so concurrent tasks can make progress.
        tokio::task::yield_now().await;
    }
}

/// Shared clock handle passed to middleware constructors.
pub type SharedClock = Arc<dyn Clock>;

/// Creates the production clock.
#[must_use]
pub fn system_clock() -> SharedClock {
    Arc::new(SystemClock::new())
}

/// Creates a test clock that must be advanced manually.
#[must_use]
pub fn manual_clock() -> Arc<ManualClock> {
    Arc::new(ManualClock::new())
}
