//! Startup orchestration.
//!
//! # Responsibilities
//! - Construct every security component once, in dependency order
//! - Wire the shared cache, clock and event sink into each component
//! - Fail fast: any construction error is fatal
//!
//! # Design Decisions
//! - Components are built explicitly and shared by `Arc`, never global
//! - The shared cache is always wrapped in a per-call timeout
//! - Subsystems initialize in order, not concurrently

use std::sync::Arc;
use std::time::Duration;

use crate::auth::{MemoryIdentityStore, SessionTracker, TokenManager};
use crate::cache::{MemoryCache, SharedCache, TimeoutCache};
use crate::clock::{Clock, SystemClock};
use crate::config::ShieldConfig;
use crate::observability::{SecurityEventSink, TracingEventSink};
use crate::pipeline::middleware::RequestSettings;
use crate::pipeline::SecurityPipeline;
use crate::rate_limit::RateLimiter;
use crate::threat::ThreatDetector;

#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    #[error("failed to compile threat signatures: {0}")]
    Signatures(#[from] regex::Error),
}

/// The constructed security core plus what the HTTP surface needs.
#[derive(Clone)]
pub struct Components {
    pub pipeline: Arc<SecurityPipeline>,
    pub tokens: Arc<TokenManager>,
    pub identity: Arc<MemoryIdentityStore>,
    pub settings: Arc<RequestSettings>,
}

impl Components {
    /// Build with explicit collaborators.
    pub fn build(
        config: &ShieldConfig,
        cache: Arc<dyn SharedCache>,
        identity: Arc<MemoryIdentityStore>,
        clock: Arc<dyn Clock>,
        events: Arc<dyn SecurityEventSink>,
    ) -> Result<Self, StartupError> {
        let tokens = Arc::new(TokenManager::new(
            &config.tokens,
            cache.clone(),
            identity.clone(),
            clock.clone(),
            events.clone(),
        ));
        let rate_limiter = Arc::new(RateLimiter::new(
            cache.clone(),
            clock.clone(),
            events.clone(),
            config.rate_limit.alarm_threshold,
        ));
        let detector = Arc::new(ThreatDetector::new(&config.threat)?);
        let sessions = SessionTracker::new(
            cache,
            clock,
            Duration::from_secs(config.session.inactivity_secs),
        );

        let pipeline = Arc::new(SecurityPipeline::new(
            config,
            tokens.clone(),
            rate_limiter,
            detector,
            sessions,
            events,
        ));

        tracing::info!(
            routes = config.routes.len(),
            rate_limit_policies = config.rate_limit.policies.len(),
            threat_policies = config.threat.policies.len(),
            "Security components initialized"
        );

        Ok(Self {
            pipeline,
            tokens,
            identity,
            settings: Arc::new(RequestSettings::from_config(config)),
        })
    }

    /// Build with the in-process cache, the system clock and tracing events.
    pub fn from_config(
        config: &ShieldConfig,
        identity: Arc<MemoryIdentityStore>,
    ) -> Result<Self, StartupError> {
        let cache = Arc::new(TimeoutCache::new(
            MemoryCache::new(),
            Duration::from_millis(config.cache.op_timeout_ms),
        ));
        Self::build(
            config,
            cache,
            identity,
            Arc::new(SystemClock),
            Arc::new(TracingEventSink),
        )
    }
}
