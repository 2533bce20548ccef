//! Test doubles shared by unit and integration tests.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use crate::cache::{CacheError, CacheResult, MemoryCache, SharedCache};
use crate::clock::Clock;
use crate::config::ShieldConfig;
use crate::observability::{SecurityEvent, SecurityEventSink, SecurityEventType};

pub const TEST_ACCESS_SECRET: &str = "access-secret-for-tests-0123456789abcdef";
pub const TEST_REFRESH_SECRET: &str = "refresh-secret-for-tests-0123456789abcdef";

/// A valid configuration with test secrets and the built-in routes.
pub fn test_config() -> ShieldConfig {
    let mut config = ShieldConfig::default();
    config.tokens.access_secret = TEST_ACCESS_SECRET.to_string();
    config.tokens.refresh_secret = TEST_REFRESH_SECRET.to_string();
    config.server.bind_address = "127.0.0.1:0".to_string();
    config
}

/// Clock that only moves when told to.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicU64,
}

impl ManualClock {
    pub fn new(now: u64) -> Self {
        Self {
            now: AtomicU64::new(now),
        }
    }

    pub fn advance(&self, secs: u64) {
        self.now.fetch_add(secs, Ordering::SeqCst);
    }

    pub fn set(&self, now: u64) {
        self.now.store(now, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_unix(&self) -> u64 {
        self.now.load(Ordering::SeqCst)
    }
}

/// Cache that reports itself unreachable until switched back on.
#[derive(Default)]
pub struct FaultyCache {
    failing: AtomicBool,
    inner: MemoryCache,
}

impl FaultyCache {
    /// Starts out failing.
    pub fn new() -> Self {
        Self {
            failing: AtomicBool::new(true),
            inner: MemoryCache::new(),
        }
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    fn check(&self) -> CacheResult<()> {
        if self.failing.load(Ordering::SeqCst) {
            Err(CacheError::Unavailable("connection refused".to_string()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl SharedCache for FaultyCache {
    async fn increment(&self, key: &str) -> CacheResult<i64> {
        self.check()?;
        self.inner.increment(key).await
    }

    async fn expire(&self, key: &str, ttl: Duration) -> CacheResult<bool> {
        self.check()?;
        self.inner.expire(key, ttl).await
    }

    async fn ttl(&self, key: &str) -> CacheResult<Option<Duration>> {
        self.check()?;
        self.inner.ttl(key).await
    }

    async fn get(&self, key: &str) -> CacheResult<Option<String>> {
        self.check()?;
        self.inner.get(key).await
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> CacheResult<()> {
        self.check()?;
        self.inner.set(key, value, ttl).await
    }

    async fn exists(&self, key: &str) -> CacheResult<bool> {
        self.check()?;
        self.inner.exists(key).await
    }

    async fn delete(&self, key: &str) -> CacheResult<bool> {
        self.check()?;
        self.inner.delete(key).await
    }
}

/// Cache whose calls never complete.
#[derive(Debug, Default, Clone, Copy)]
pub struct StallingCache;

#[async_trait]
impl SharedCache for StallingCache {
    async fn increment(&self, _key: &str) -> CacheResult<i64> {
        std::future::pending().await
    }

    async fn expire(&self, _key: &str, _ttl: Duration) -> CacheResult<bool> {
        std::future::pending().await
    }

    async fn ttl(&self, _key: &str) -> CacheResult<Option<Duration>> {
        std::future::pending().await
    }

    async fn get(&self, _key: &str) -> CacheResult<Option<String>> {
        std::future::pending().await
    }

    async fn set(&self, _key: &str, _value: &str, _ttl: Option<Duration>) -> CacheResult<()> {
        std::future::pending().await
    }

    async fn exists(&self, _key: &str) -> CacheResult<bool> {
        std::future::pending().await
    }

    async fn delete(&self, _key: &str) -> CacheResult<bool> {
        std::future::pending().await
    }
}

/// Event sink that keeps everything it receives.
#[derive(Debug, Default)]
pub struct RecordingSink {
    events: Mutex<Vec<SecurityEvent>>,
}

impl RecordingSink {
    pub fn events(&self) -> Vec<SecurityEvent> {
        self.events
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn count(&self, event_type: SecurityEventType) -> usize {
        self.events()
            .iter()
            .filter(|e| e.event_type == event_type)
            .count()
    }
}

impl SecurityEventSink for RecordingSink {
    fn emit(&self, event: SecurityEvent) {
        self.events
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(event);
    }
}
