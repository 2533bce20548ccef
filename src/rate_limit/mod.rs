//! Rate limit engine.
//!
//! # Data Flow
//! ```text
//! (action, identity)
//!     → skip.rs (health paths, trusted roles outside production)
//!     → engine.rs: INCR ratelimit:<action>:<identity>
//!         value == 1 → EXPIRE window
//!         otherwise  → TTL (re-apply window if the counter has none)
//!     → RateLimitDecision { allowed = current <= limit, remaining, reset_at }
//! ```
//!
//! # Design Decisions
//! - Fixed window: one atomic increment per request, O(1) state per key
//! - Bursts of up to 2x the limit across a window boundary are accepted
//! - Cache outages fail open; consecutive fail-open decisions raise an alarm
//! - Policies come from configuration, never from the engine

pub mod engine;
pub mod skip;

use std::time::Duration;

use serde::{Deserialize, Serialize};

pub use engine::{RateLimitDecision, RateLimitIdentity, RateLimitKey, RateLimiter};
pub use skip::SkipRule;

/// Limit and window for one action label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RateLimitPolicy {
    /// Requests allowed per window.
    pub limit: u64,
    /// Window length in seconds.
    pub window_secs: u64,
}

impl RateLimitPolicy {
    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_secs)
    }
}
