//! Throughput and latency metrics
//!
//! Counts every downstream outcome and keeps latency samples in a bounded
//! ring. Counters are unbounded; only the statistical sample window is
//! capped. All updates and snapshots go through one lock, so a snapshot is
//! always internally consistent (`total == success + failure`).

use crate::domain_types::SampleCapacity;
use crate::message::Message;
use crate::pipeline::{DispatchResult, Middleware, Next};
use async_trait::async_trait;
use std::sync::Mutex;
use std::time::Instant;
use tokio_util::sync::CancellationToken;

/// Immutable metrics view.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricsSnapshot {
    /// Messages observed.
    pub total_messages: u64,
    /// Successful results.
    pub success_count: u64,
    /// Failed results and errors.
    pub failure_count: u64,
    /// `success / total`, zero when nothing was observed.
    pub success_rate: f64,
    /// Mean latency over the sample window, milliseconds.
    pub average_processing_time_ms: f64,
    /// Minimum latency over the sample window, milliseconds.
    pub min_processing_time_ms: f64,
    /// Maximum latency over the sample window, milliseconds.
    pub max_processing_time_ms: f64,
}

#[derive(Debug)]
struct MetricsState {
    total: u64,
    success: u64,
    failure: u64,
    samples: Vec<f64>,
    next_slot: usize,
    capacity: usize,
}

impl MetricsState {
    fn record_sample(&mut self, elapsed_ms: f64) {
        if self.samples.len() < self.capacity {
            self.samples.push(elapsed_ms);
        } else {
            self.samples[self.next_slot] = elapsed_ms;
        }
        self.next_slot = (self.next_slot + 1) % self.capacity;
    }
}

/// Records outcome counters and a bounded latency sample buffer.
pub struct MetricsMiddleware {
    state: Mutex<MetricsState>,
}

impl MetricsMiddleware {
    /// Creates the middleware with the given sample window.
    #[must_use]
    pub fn new(sample_capacity: SampleCapacity) -> Self {
        Self {
            state: Mutex::new(MetricsState {
                total: 0,
                success: 0,
                failure: 0,
                samples: Vec::new(),
                next_slot: 0,
                capacity: sample_capacity.as_usize(),
            }),
        }
    }

    /// Consistent point-in-time view of all counters and latency stats.
    #[must_use]
    pub fn snapshot(&self) -> MetricsSnapshot {
        let state = self.state.lock().expect("metrics lock poisoned");
        let (min, max, avg) = if state.samples.is_empty() {
            (0.0, 0.0, 0.0)
        } else {
            let min = state.samples.iter().copied().fold(f64::INFINITY, f64::min);
            let max = state
                .samples
                .iter()
                .copied()
                .fold(f64::NEG_INFINITY, f64::max);
            let avg = state.samples.iter().sum::<f64>() / state.samples.len() as f64;
            (min, max, avg)
        };

        MetricsSnapshot {
            total_messages: state.total,
            success_count: state.success,
            failure_count: state.failure,
            success_rate: if state.total == 0 {
                0.0
            } else {
                state.success as f64 / state.total as f64
            },
            average_processing_time_ms: avg,
            min_processing_time_ms: min,
            max_processing_time_ms: max,
        }
    }
}

impl Default for MetricsMiddleware {
    fn default() -> Self {
        Self::new(SampleCapacity::default())
    }
}

#[async_trait]
impl Middleware for MetricsMiddleware {
    fn name(&self) -> &str {
        "metrics"
    }

    async fn handle(
        &self,
        message: &mut Message,
        next: Next<'_>,
        cancel: &CancellationToken,
    ) -> DispatchResult {
        let started = Instant::now();
        let outcome = next.run(message, cancel).await;
        let elapsed_ms = started.elapsed().as_secs_f64() * 1_000.0;

        let mut state = self.state.lock().expect("metrics lock poisoned");
        state.total += 1;
        match &outcome {
            Ok(result) if result.success => state.success += 1,
            // Errors are not caught here, but the sample still counts.
            _ => state.failure += 1,
        }
        state.record_sample(elapsed_ms);
        drop(state);

        outcome
    }
}
