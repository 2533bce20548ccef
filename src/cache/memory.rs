//! In-process shared cache.
//!
//! Backed by a `DashMap`; expiry is enforced lazily on access and by an
//! occasional purge on the write path. Uses `tokio::time::Instant` so tests
//! can pause and advance time.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::time::Instant;

use super::{CacheError, CacheResult, SharedCache};

/// Writes between opportunistic purges of expired keys.
const PURGE_EVERY: u64 = 1024;

#[derive(Debug, Clone)]
struct Entry {
    value: String,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.map_or(true, |at| at > now)
    }
}

/// A thread-safe in-memory cache with per-key TTL.
#[derive(Debug, Default)]
pub struct MemoryCache {
    entries: DashMap<String, Entry>,
    writes: AtomicU64,
}

impl MemoryCache {
    /// Create a new empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored keys, including expired ones not yet purged.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop every expired key.
    pub fn purge_expired(&self) {
        let now = Instant::now();
        self.entries.retain(|_, entry| entry.is_live(now));
    }

    fn note_write(&self) {
        if self.writes.fetch_add(1, Ordering::Relaxed) % PURGE_EVERY == PURGE_EVERY - 1 {
            self.purge_expired();
        }
    }

    fn remove_if_expired(&self, key: &str, now: Instant) {
        self.entries.remove_if(key, |_, entry| !entry.is_live(now));
    }
}

#[async_trait]
impl SharedCache for MemoryCache {
    async fn increment(&self, key: &str) -> CacheResult<i64> {
        let now = Instant::now();
        let value = {
            // The entry guard holds the shard lock for the whole update.
            let mut entry = self.entries.entry(key.to_string()).or_insert_with(|| Entry {
                value: "0".to_string(),
                expires_at: None,
            });
            if !entry.is_live(now) {
                *entry = Entry {
                    value: "0".to_string(),
                    expires_at: None,
                };
            }
            let current: i64 = entry.value.parse().map_err(|_| CacheError::NotAnInteger {
                key: key.to_string(),
            })?;
            let next = current.saturating_add(1);
            entry.value = next.to_string();
            next
        };
        self.note_write();
        Ok(value)
    }

    async fn expire(&self, key: &str, ttl: Duration) -> CacheResult<bool> {
        let now = Instant::now();
        let updated = match self.entries.get_mut(key) {
            Some(mut entry) if entry.is_live(now) => {
                // A deadline past `Instant`'s range never expires.
                entry.expires_at = now.checked_add(ttl);
                true
            }
            _ => false,
        };
        if !updated {
            self.remove_if_expired(key, now);
        }
        Ok(updated)
    }

    async fn ttl(&self, key: &str) -> CacheResult<Option<Duration>> {
        let now = Instant::now();
        let ttl = self
            .entries
            .get(key)
            .filter(|entry| entry.is_live(now))
            .and_then(|entry| entry.expires_at)
            .map(|at| at.saturating_duration_since(now));
        Ok(ttl)
    }

    async fn get(&self, key: &str) -> CacheResult<Option<String>> {
        let now = Instant::now();
        let value = self
            .entries
            .get(key)
            .filter(|entry| entry.is_live(now))
            .map(|entry| entry.value.clone());
        if value.is_none() {
            self.remove_if_expired(key, now);
        }
        Ok(value)
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> CacheResult<()> {
        let expires_at = ttl.and_then(|ttl| Instant::now().checked_add(ttl));
        self.entries.insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expires_at,
            },
        );
        self.note_write();
        Ok(())
    }

    async fn exists(&self, key: &str) -> CacheResult<bool> {
        Ok(self.get(key).await?.is_some())
    }

    async fn delete(&self, key: &str) -> CacheResult<bool> {
        let now = Instant::now();
        Ok(self
            .entries
            .remove(key)
            .is_some_and(|(_, entry)| entry.is_live(now)))
    }
}
