//! Deadline enforcement for cache calls.
//!
//! Every shared-cache round trip is wrapped with a Tokio timeout; an elapsed
//! deadline surfaces as [`CacheError::Timeout`] so callers apply the same
//! fail-open/fail-closed policy as for an unreachable cache.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;

use super::{CacheError, CacheResult, SharedCache};

/// Decorator bounding every call on the inner cache by `deadline`.
#[derive(Debug)]
pub struct TimeoutCache<C> {
    inner: C,
    deadline: Duration,
}

impl<C: SharedCache> TimeoutCache<C> {
    pub fn new(inner: C, deadline: Duration) -> Self {
        Self { inner, deadline }
    }

    pub fn inner(&self) -> &C {
        &self.inner
    }

    async fn bounded<T>(&self, op: impl Future<Output = CacheResult<T>>) -> CacheResult<T> {
        match tokio::time::timeout(self.deadline, op).await {
            Ok(result) => result,
            Err(_) => Err(CacheError::Timeout(self.deadline)),
        }
    }
}

#[async_trait]
impl<C: SharedCache> SharedCache for TimeoutCache<C> {
    async fn increment(&self, key: &str) -> CacheResult<i64> {
        self.bounded(self.inner.increment(key)).await
    }

    async fn expire(&self, key: &str, ttl: Duration) -> CacheResult<bool> {
        self.bounded(self.inner.expire(key, ttl)).await
    }

    async fn ttl(&self, key: &str) -> CacheResult<Option<Duration>> {
        self.bounded(self.inner.ttl(key)).await
    }

    async fn get(&self, key: &str) -> CacheResult<Option<String>> {
        self.bounded(self.inner.get(key)).await
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> CacheResult<()> {
        self.bounded(self.inner.set(key, value, ttl)).await
    }

    async fn exists(&self, key: &str) -> CacheResult<bool> {
        self.bounded(self.inner.exists(key)).await
    }

    async fn delete(&self, key: &str) -> CacheResult<bool> {
        self.bounded(self.inner.delete(key)).await
    }
}
