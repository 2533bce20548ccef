//! Shared cache abstraction.
//!
//! # Data Flow
//! ```text
//! token revocation / session activity / rate-limit counters
//!     → SharedCache trait (async, fallible)
//!     → timeout.rs (every call bounded by a deadline)
//!     → memory.rs (in-process implementation) or a networked store
//! ```
//!
//! # Design Decisions
//! - Every call is treated as a fallible network round trip
//! - Expiry is owned by the cache (per-key TTL); no component sweeps keys
//! - `increment` is the only correctness-critical mutation and must be
//!   atomic in every implementation, never read-modify-write by callers

pub mod memory;
pub mod timeout;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

pub use memory::MemoryCache;
pub use timeout::TimeoutCache;

/// Errors raised by a shared cache.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CacheError {
    /// The cache could not be reached.
    #[error("cache unavailable: {0}")]
    Unavailable(String),

    /// The call did not complete within its deadline.
    #[error("cache operation timed out after {0:?}")]
    Timeout(Duration),

    /// `increment` hit a value that is not an integer.
    #[error("value at '{key}' is not an integer")]
    NotAnInteger { key: String },
}

pub type CacheResult<T> = Result<T, CacheError>;

/// Key-value store with per-key TTL shared by every running instance.
#[async_trait]
pub trait SharedCache: Send + Sync {
    /// Atomically increment the integer at `key`, creating it at 0 first.
    /// Returns the new value.
    async fn increment(&self, key: &str) -> CacheResult<i64>;

    /// Set the remaining lifetime of `key`. Returns `false` when absent.
    async fn expire(&self, key: &str, ttl: Duration) -> CacheResult<bool>;

    /// Remaining lifetime of `key`; `None` when absent or without expiry.
    async fn ttl(&self, key: &str) -> CacheResult<Option<Duration>>;

    async fn get(&self, key: &str) -> CacheResult<Option<String>>;

    /// Store `value`, replacing any previous value and expiry.
    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> CacheResult<()>;

    async fn exists(&self, key: &str) -> CacheResult<bool>;

    /// Remove `key`. Returns `false` when it was absent.
    async fn delete(&self, key: &str) -> CacheResult<bool>;
}

#[async_trait]
impl<C: SharedCache + ?Sized> SharedCache for Arc<C> {
    async fn increment(&self, key: &str) -> CacheResult<i64> {
        (**self).increment(key).await
    }

    async fn expire(&self, key: &str, ttl: Duration) -> CacheResult<bool> {
        (**self).expire(key, ttl).await
    }

    async fn ttl(&self, key: &str) -> CacheResult<Option<Duration>> {
        (**self).ttl(key).await
    }

    async fn get(&self, key: &str) -> CacheResult<Option<String>> {
        (**self).get(key).await
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> CacheResult<()> {
        (**self).set(key, value, ttl).await
    }

    async fn exists(&self, key: &str) -> CacheResult<bool> {
        (**self).exists(key).await
    }

    async fn delete(&self, key: &str) -> CacheResult<bool> {
        (**self).delete(key).await
    }
}
