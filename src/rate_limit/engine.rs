//! Fixed-window counters in the shared cache.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::cache::{CacheResult, SharedCache};
use crate::clock::Clock;
use crate::observability::metrics;
use crate::observability::{SecurityEvent, SecurityEventSink, SecurityEventType};
use crate::rate_limit::RateLimitPolicy;

const KEY_PREFIX: &str = "ratelimit:";

/// Who a counter belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RateLimitIdentity {
    /// Authenticated subject id.
    Subject(String),
    /// Network origin of an anonymous request.
    Origin(String),
    /// Neither subject nor origin is known.
    Unknown,
}

impl RateLimitIdentity {
    /// Subject when authenticated, otherwise the network origin.
    pub fn resolve(subject: Option<&str>, origin: Option<&str>) -> Self {
        match (subject, origin) {
            (Some(subject), _) => RateLimitIdentity::Subject(subject.to_string()),
            (None, Some(origin)) => RateLimitIdentity::Origin(origin.to_string()),
            (None, None) => RateLimitIdentity::Unknown,
        }
    }
}

impl fmt::Display for RateLimitIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RateLimitIdentity::Subject(id) => write!(f, "user:{id}"),
            RateLimitIdentity::Origin(origin) => write!(f, "ip:{origin}"),
            RateLimitIdentity::Unknown => f.write_str("ip:unknown"),
        }
    }
}

/// Composite counter key `ratelimit:<action>:<identity>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RateLimitKey(String);

impl RateLimitKey {
    pub fn new(action: &str, identity: &RateLimitIdentity) -> Self {
        Self(format!("{KEY_PREFIX}{action}:{identity}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RateLimitKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Outcome of one rate limit check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitDecision {
    pub allowed: bool,
    pub limit: u64,
    /// Counter value after this request.
    pub current: u64,
    pub remaining: u64,
    /// Unix time at which the window resets.
    pub reset_at: u64,
    /// Seconds until the window resets; zero when allowed.
    pub retry_after: u64,
    /// The cache could not be consulted and the request was let through.
    pub degraded: bool,
}

impl RateLimitDecision {
    fn counted(policy: RateLimitPolicy, current: u64, ttl: Duration, now: u64) -> Self {
        let reset_in = ceil_secs(ttl);
        let allowed = current <= policy.limit;
        Self {
            allowed,
            limit: policy.limit,
            current,
            remaining: policy.limit.saturating_sub(current),
            reset_at: now.saturating_add(reset_in),
            retry_after: if allowed { 0 } else { reset_in.max(1) },
            degraded: false,
        }
    }

    fn fail_open(policy: RateLimitPolicy, now: u64) -> Self {
        Self {
            allowed: true,
            limit: policy.limit,
            current: 0,
            remaining: policy.limit,
            reset_at: now.saturating_add(policy.window_secs),
            retry_after: 0,
            degraded: true,
        }
    }
}

fn ceil_secs(d: Duration) -> u64 {
    d.as_secs().saturating_add(u64::from(d.subsec_nanos() > 0))
}

/// Per-identity, per-action request counters.
pub struct RateLimiter {
    cache: Arc<dyn SharedCache>,
    clock: Arc<dyn Clock>,
    events: Arc<dyn SecurityEventSink>,
    alarm_threshold: u64,
    consecutive_fail_open: AtomicU64,
}

impl RateLimiter {
    pub fn new(
        cache: Arc<dyn SharedCache>,
        clock: Arc<dyn Clock>,
        events: Arc<dyn SecurityEventSink>,
        alarm_threshold: u64,
    ) -> Self {
        Self {
            cache,
            clock,
            events,
            alarm_threshold,
            consecutive_fail_open: AtomicU64::new(0),
        }
    }

    /// Fail-open decisions since the last successful cache round trip.
    pub fn consecutive_fail_open(&self) -> u64 {
        self.consecutive_fail_open.load(Ordering::Relaxed)
    }

    /// Count this request against `action` for `identity` and decide.
    pub async fn check(
        &self,
        action: &str,
        policy: RateLimitPolicy,
        identity: &RateLimitIdentity,
    ) -> RateLimitDecision {
        let key = RateLimitKey::new(action, identity);

        match self.count(&key, policy.window()).await {
            Ok((current, ttl)) => {
                self.consecutive_fail_open.store(0, Ordering::Relaxed);
                let decision =
                    RateLimitDecision::counted(policy, current, ttl, self.clock.now_unix());
                metrics::record_rate_limit(action, decision.allowed);
                if !decision.allowed {
                    tracing::debug!(
                        key = %key,
                        current = decision.current,
                        limit = decision.limit,
                        retry_after = decision.retry_after,
                        "Rate limit exceeded"
                    );
                }
                decision
            }
            Err(e) => {
                let streak = self.consecutive_fail_open.fetch_add(1, Ordering::Relaxed) + 1;
                if streak >= self.alarm_threshold {
                    tracing::error!(
                        key = %key,
                        error = %e,
                        consecutive = streak,
                        "Rate limiting has been failing open repeatedly"
                    );
                } else {
                    tracing::warn!(key = %key, error = %e, "Rate limit cache unreachable, failing open");
                }
                metrics::record_degraded("rate_limit");
                self.events.emit(
                    SecurityEvent::new(SecurityEventType::Degraded, "fail_open")
                        .field("component", "rate_limit")
                        .field("action", action)
                        .field("consecutive", streak)
                        .field("error", e.to_string()),
                );
                RateLimitDecision::fail_open(policy, self.clock.now_unix())
            }
        }
    }

    async fn count(&self, key: &RateLimitKey, window: Duration) -> CacheResult<(u64, Duration)> {
        let current = self.cache.increment(key.as_str()).await?;

        let ttl = if current == 1 {
            self.cache.expire(key.as_str(), window).await?;
            window
        } else {
            match self.cache.ttl(key.as_str()).await? {
                Some(ttl) => ttl,
                None => {
                    // A counter without expiry would never reset.
                    tracing::warn!(key = %key, "Rate limit counter had no expiry, re-applying window");
                    self.cache.expire(key.as_str(), window).await?;
                    window
                }
            }
        };

        Ok((u64::try_from(current).unwrap_or(0), ttl))
    }
}
