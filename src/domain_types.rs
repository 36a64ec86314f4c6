//! Validated configuration values for the middleware family
//!
//! Newtypes prevent primitive obsession in middleware constructors: a cache
//! capacity cannot be swapped with a TTL, and out-of-range settings are
//! rejected at construction instead of misbehaving at runtime.

use nutype::nutype;
use std::time::Duration;

/// Maximum number of cached results held by the caching middleware.
#[nutype(
    validate(greater_or_equal = 1, less_or_equal = 1_000_000),
    derive(
        Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Display,
        Default, TryFrom, Into
    ),
    default = 1000
)]
pub struct CacheCapacity(usize);

impl CacheCapacity {
    /// Value as `usize`.
    #[must_use]
    pub fn as_usize(&self) -> usize {
        self.into_inner()
    }
}

/// Cache entry time-to-live in milliseconds.
#[nutype(
    validate(greater_or_equal = 1),
    derive(
        Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Display,
        Default, TryFrom, Into
    ),
    default = 300_000
)]
pub struct CacheTtlMs(u64);

impl CacheTtlMs {
    /// Converts to a `Duration`.
    #[must_use]
    pub fn as_duration(&self) -> Duration {
        Duration::from_millis(self.into_inner())
    }
}

/// Requests allowed per sliding window per sender.
#[nutype(
    validate(greater_or_equal = 1),
    derive(
        Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Display,
        Default, TryFrom, Into
    ),
    default = 100
)]
pub struct MaxRequests(u32);

impl MaxRequests {
    /// Value as `usize`.
    #[must_use]
    pub fn as_usize(&self) -> usize {
        self.into_inner() as usize
    }
}

/// Sliding-window width in milliseconds.
#[nutype(
    validate(greater_or_equal = 1),
    derive(
        Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Display,
        Default, TryFrom, Into
    ),
    default = 60_000
)]
pub struct RateWindowMs(u64);

impl RateWindowMs {
    /// Converts to a `Duration`.
    #[must_use]
    pub fn as_duration(&self) -> Duration {
        Duration::from_millis(self.into_inner())
    }
}

/// Maximum retry attempts, including the first.
#[nutype(
    validate(greater_or_equal = 1, less_or_equal = 10),
    derive(
        Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Display,
        Default, TryFrom, Into
    ),
    default = 3
)]
pub struct MaxAttempts(u8);

impl MaxAttempts {
    /// Value as `u32`.
    #[must_use]
    pub fn as_u32(&self) -> u32 {
        u32::from(self.into_inner())
    }
}

/// Base retry delay in milliseconds; attempt `n` backs off `base × n`.
/// Zero means immediate retries.
#[nutype(
    validate(less_or_equal = 300_000),
    derive(
        Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Display,
        Default, TryFrom, Into
    ),
    default = 100
)]
pub struct BaseDelayMs(u64);

impl BaseDelayMs {
    /// Converts to a `Duration`.
    #[must_use]
    pub fn as_duration(&self) -> Duration {
        Duration::from_millis(self.into_inner())
    }

    /// Value as `u64`.
    #[must_use]
    pub fn as_u64(&self) -> u64 {
        self.into_inner()
    }
}

/// Messages per batch in the queueing middleware.
#[nutype(
    validate(greater_or_equal = 1, less_or_equal = 10_000),
    derive(
        Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Display,
        Default, TryFrom, Into
    ),
    default = 10
)]
pub struct BatchSize(usize);

impl BatchSize {
    /// Value as `usize`.
    #[must_use]
    pub fn as_usize(&self) -> usize {
        self.into_inner()
    }
}

/// Batch flush timeout in milliseconds.
#[nutype(
    validate(greater_or_equal = 1),
    derive(
        Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Display,
        Default, TryFrom, Into
    ),
    default = 1000
)]
pub struct BatchTimeoutMs(u64);

impl BatchTimeoutMs {
    /// Converts to a `Duration`.
    #[must_use]
    pub fn as_duration(&self) -> Duration {
        Duration::from_millis(self.into_inner())
    }
}

/// Interval between health-probe sweeps in milliseconds.
#[nutype(
    validate(greater_or_equal = 10),
    derive(
        Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Display,
        Default, TryFrom, Into
    ),
    default = 30_000
)]
pub struct ProbeIntervalMs(u64);

impl ProbeIntervalMs {
    /// Converts to a `Duration`.
    #[must_use]
    pub fn as_duration(&self) -> Duration {
        Duration::from_millis(self.into_inner())
    }
}

/// Capacity of the metrics latency sample ring.
#[nutype(
    validate(greater_or_equal = 1, less_or_equal = 1_000_000),
    derive(
        Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Display,
        Default, TryFrom, Into
    ),
    default = 10_000
)]
pub struct SampleCapacity(usize);

impl SampleCapacity {
    /// Value as `usize`.
    #[must_use]
    pub fn as_usize(&self) -> usize {
        self.into_inner()
    }
}
