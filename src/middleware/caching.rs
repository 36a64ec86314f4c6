//! Result caching with LRU eviction and TTL
//!
//! Identical messages (same sender, category, subject, and content) within
//! the TTL are answered from the cache without invoking downstream. The cache
//! is bounded: inserting past capacity evicts the least-recently-accessed
//! entries.

use crate::clock::SharedClock;
use crate::domain_types::{CacheCapacity, CacheTtlMs};
use crate::message::{HandlerResult, Message};
use crate::pipeline::{DispatchResult, Middleware, Next};
use async_trait::async_trait;
use lru::LruCache;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::num::NonZeroUsize;
use std::sync::Mutex;
use std::time::SystemTime;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// One cached result.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    /// The stored downstream result.
    pub value: HandlerResult,
    /// When the entry was stored.
    pub inserted_at: SystemTime,
    /// When the entry was last read or written.
    pub last_accessed_at: SystemTime,
}

/// Caches downstream results keyed by a message fingerprint.
pub struct CachingMiddleware {
    entries: Mutex<LruCache<String, CacheEntry>>,
    ttl: CacheTtlMs,
    clock: SharedClock,
}

impl CachingMiddleware {
    /// Creates the middleware with a bounded LRU map and TTL.
    #[must_use]
    pub fn new(capacity: CacheCapacity, ttl: CacheTtlMs, clock: SharedClock) -> Self {
        let capacity =
            NonZeroUsize::new(capacity.as_usize()).expect("cache capacity is validated nonzero");
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
            ttl,
            clock,
        }
    }

    /// Stable hash over `(sender_id, category, subject, content)`.
    #[must_use]
    pub fn fingerprint(message: &Message) -> String {
        let mut hasher = DefaultHasher::new();
        message.sender_id.hash(&mut hasher);
        message.category.hash(&mut hasher);
        message.subject.hash(&mut hasher);
        message.content.hash(&mut hasher);
        format!("{:016x}", hasher.finish())
    }

    /// Number of cached entries, expired or not.
    #[must_use]
    pub fn count(&self) -> usize {
        self.entries.lock().expect("cache lock poisoned").len()
    }

    /// Removes every entry.
    pub fn clear(&self) {
        self.entries.lock().expect("cache lock poisoned").clear();
    }

    /// Removes all expired entries in a single pass. Safe on an empty cache.
    pub fn cleanup_expired(&self) {
        let now = self.clock.now();
        let mut entries = self.entries.lock().expect("cache lock poisoned");
        let expired: Vec<String> = entries
            .iter()
            .filter(|(_, entry)| self.is_expired(entry, now))
            .map(|(key, _)| key.clone())
            .collect();
        for key in expired {
            entries.pop(&key);
        }
    }

    fn is_expired(&self, entry: &CacheEntry, now: SystemTime) -> bool {
        now.duration_since(entry.inserted_at)
            .is_ok_and(|age| age >= self.ttl.as_duration())
    }
}

#[async_trait]
impl Middleware for CachingMiddleware {
    fn name(&self) -> &str {
        "caching"
    }

    async fn handle(
        &self,
        message: &mut Message,
        next: Next<'_>,
        cancel: &CancellationToken,
    ) -> DispatchResult {
        let key = Self::fingerprint(message);
        let now = self.clock.now();

        {
            let mut entries = self.entries.lock().expect("cache lock poisoned");
            // `get_mut` promotes the entry to most-recently-used.
            if let Some(entry) = entries.get_mut(&key) {
                if !self.is_expired(entry, now) {
                    entry.last_accessed_at = now;
                    debug!(fingerprint = %key, "cache hit");
                    return Ok(entry.value.clone());
                }
                entries.pop(&key);
            }
        }

        let result = next.run(message, cancel).await?;

        let mut entries = self.entries.lock().expect("cache lock poisoned");
        entries.put(
            key,
            CacheEntry {
                value: result.clone(),
                inserted_at: now,
                last_accessed_at: now,
            },
        );
        Ok(result)
    }
}
