use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::core::config::{RateLimitBackend, Settings};
use crate::core::redis::RedisHandle;

#[async_trait]
pub(crate) trait RateLimiter: Send + Sync {
    /// Records one hit for `key` and reports whether it fits in the window.
    async fn allow(&self, key: &str, limit: u64, window: Duration) -> bool;
}

/// Sliding window over per-key hit timestamps, kept in process memory.
#[derive(Default)]
pub(crate) struct InMemoryRateLimiter {
    hits: Mutex<HashMap<String, VecDeque<Instant>>>,
}

impl InMemoryRateLimiter {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    #[cfg(test)]
    fn tracked_keys(&self) -> usize {
        self.hits.lock().len()
    }

    fn allow_at(&self, key: &str, limit: u64, window: Duration, now: Instant) -> bool {
        let mut hits = self.hits.lock();
        // Keys with no hit inside the window are dropped.
        hits.retain(|_, queue| {
            while queue.front().is_some_and(|oldest| now.duration_since(*oldest) >= window) {
                queue.pop_front();
            }
            !queue.is_empty()
        });

        let queue = hits.entry(key.to_string()).or_default();
        if queue.len() as u64 >= limit {
            return false;
        }
        queue.push_back(now);
        true
    }
}

#[async_trait]
impl RateLimiter for InMemoryRateLimiter {
    async fn allow(&self, key: &str, limit: u64, window: Duration) -> bool {
        self.allow_at(key, limit, window, Instant::now())
    }
}

/// Fixed window in Redis, shared between replicas. Fails open.
pub(crate) struct RedisRateLimiter {
    redis: RedisHandle,
}

impl RedisRateLimiter {
    pub(crate) fn new(redis: RedisHandle) -> Self {
        Self { redis }
    }
}

#[async_trait]
impl RateLimiter for RedisRateLimiter {
    async fn allow(&self, key: &str, limit: u64, window: Duration) -> bool {
        match self.redis.rate_limit(key, limit, window.as_secs().max(1)).await {
            Ok(allowed) => allowed,
            Err(err) => {
                tracing::warn!(error = %err, key, "Rate limit check failed, allowing request");
                true
            }
        }
    }
}

pub(crate) fn from_settings(settings: &Settings, redis: &RedisHandle) -> Arc<dyn RateLimiter> {
    match settings.rate_limit().backend {
        RateLimitBackend::Memory => Arc::new(InMemoryRateLimiter::new()),
        RateLimitBackend::Redis => Arc::new(RedisRateLimiter::new(redis.clone())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn limit_applies_per_key() {
        let limiter = InMemoryRateLimiter::new();
        let window = Duration::from_secs(60);
        let now = Instant::now();

        for _ in 0..5 {
            assert!(limiter.allow_at("start:u1", 5, window, now));
        }
        assert!(!limiter.allow_at("start:u1", 5, window, now));
        assert!(limiter.allow_at("start:u2", 5, window, now));
    }

    #[test]
    fn window_slides() {
        let limiter = InMemoryRateLimiter::new();
        let window = Duration::from_secs(60);
        let start = Instant::now();

        assert!(limiter.allow_at("chat:u1", 2, window, start));
        assert!(limiter.allow_at("chat:u1", 2, window, start + Duration::from_secs(30)));
        assert!(!limiter.allow_at("chat:u1", 2, window, start + Duration::from_secs(59)));
        assert!(limiter.allow_at("chat:u1", 2, window, start + Duration::from_secs(61)));
        assert!(!limiter.allow_at("chat:u1", 2, window, start + Duration::from_secs(62)));
    }

    #[test]
    fn idle_keys_are_forgotten() {
        let limiter = InMemoryRateLimiter::new();
        let window = Duration::from_secs(60);
        let start = Instant::now();

        assert!(limiter.allow_at("chat:u1", 5, window, start));
        assert!(limiter.allow_at("chat:u2", 5, window, start));
        assert_eq!(limiter.tracked_keys(), 2);

        assert!(limiter.allow_at("chat:u3", 5, window, start + Duration::from_secs(61)));
        assert_eq!(limiter.tracked_keys(), 1);
    }

    #[tokio::test]
    async fn redis_backend_without_connection_allows() {
        let limiter = RedisRateLimiter::new(RedisHandle::new("redis://127.0.0.1:6379/0".into()));
        assert!(limiter.allow("chat:u1", 0, Duration::from_secs(60)).await);
    }
}
