//! Security pipeline orchestrator.
//!
//! # Data Flow
//! ```text
//! route name + InboundRequest
//!     → PolicyTable (hot-swappable: routes, rate policies, threat policies)
//!     → for each check in route order:
//!         rate_limit   → RateLimiter::check      → 429 | continue
//!         threat       → ThreatDetector::inspect → 400 | continue (maybe sanitized)
//!         authenticate → TokenManager::verify    → 401 | continue (subject attached)
//!     → SecurityContext | Rejection (with correlation id)
//! ```
//!
//! # Design Decisions
//! - First terminal result wins; later checks never run
//! - Each check runs behind `catch_unwind`; a panic becomes a generic 500
//! - Policies live behind `ArcSwap` so reloads never block requests
//! - Security events carry subject, origin and correlation id

pub mod checks;
pub mod middleware;
pub mod rejection;

use std::any::Any;
use std::collections::{BTreeMap, HashMap};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;

use arc_swap::ArcSwap;
use futures_util::FutureExt;

use crate::auth::{Claims, CredentialKind, SessionTracker, TokenManager};
use crate::config::{RouteConfig, ShieldConfig};
use crate::observability::metrics;
use crate::observability::{SecurityEvent, SecurityEventSink, SecurityEventType};
use crate::rate_limit::{RateLimitDecision, RateLimitIdentity, RateLimitPolicy, RateLimiter, SkipRule};
use crate::threat::{RequestInput, Severity, ThreatDetector, ThreatPolicy, Verdict};

pub use checks::{AuthRequirement, CheckKind};
pub use middleware::{security_middleware, RouteGuard};
pub use rejection::{Rejection, RejectionKind};

/// Everything the pipeline needs to know about one request.
#[derive(Debug, Clone, Default)]
pub struct InboundRequest {
    pub correlation_id: String,
    pub path: String,
    pub origin: Option<String>,
    pub user_agent: Option<String>,
    /// Presented access credential, if any.
    pub credential: Option<String>,
    pub input: RequestInput,
}

/// What the checks established about a request that passed.
#[derive(Debug, Clone, Default)]
pub struct SecurityContext {
    pub correlation_id: String,
    pub subject: Option<String>,
    pub role: Option<String>,
    pub claims: Option<Claims>,
    pub rate_limit: Option<RateLimitDecision>,
    pub threat_severity: Severity,
    /// Some input was rewritten by the threat check.
    pub sanitized: bool,
}

/// Hot-reloadable per-route policy.
#[derive(Debug, Clone)]
pub struct PolicyTable {
    routes: HashMap<String, RouteConfig>,
    rate_limit_enabled: bool,
    rate_limits: BTreeMap<String, RateLimitPolicy>,
    threat_policies: BTreeMap<String, ThreatPolicy>,
    skip: SkipRule,
}

impl PolicyTable {
    pub fn from_config(config: &ShieldConfig) -> Self {
        Self {
            routes: config
                .routes
                .iter()
                .map(|route| (route.name.clone(), route.clone()))
                .collect(),
            rate_limit_enabled: config.rate_limit.enabled,
            rate_limits: config.rate_limit.policies.clone(),
            threat_policies: config.threat.policies.clone(),
            skip: SkipRule::from_config(&config.rate_limit, config.server.environment),
        }
    }

    pub fn route(&self, name: &str) -> Option<&RouteConfig> {
        self.routes.get(name)
    }
}

/// Runs a route's ordered checks against a request.
pub struct SecurityPipeline {
    tokens: Arc<TokenManager>,
    rate_limiter: Arc<RateLimiter>,
    detector: Arc<ThreatDetector>,
    sessions: SessionTracker,
    events: Arc<dyn SecurityEventSink>,
    policies: ArcSwap<PolicyTable>,
}

impl SecurityPipeline {
    pub fn new(
        config: &ShieldConfig,
        tokens: Arc<TokenManager>,
        rate_limiter: Arc<RateLimiter>,
        detector: Arc<ThreatDetector>,
        sessions: SessionTracker,
        events: Arc<dyn SecurityEventSink>,
    ) -> Self {
        Self {
            tokens,
            rate_limiter,
            detector,
            sessions,
            events,
            policies: ArcSwap::from_pointee(PolicyTable::from_config(config)),
        }
    }

    /// Swap in route and policy tables from a reloaded configuration.
    pub fn apply_config(&self, config: &ShieldConfig) {
        self.policies
            .store(Arc::new(PolicyTable::from_config(config)));
        tracing::info!(routes = config.routes.len(), "Security policies reloaded");
    }

    pub fn policies(&self) -> Arc<PolicyTable> {
        self.policies.load_full()
    }

    pub fn tokens(&self) -> &Arc<TokenManager> {
        &self.tokens
    }

    pub fn sessions(&self) -> &SessionTracker {
        &self.sessions
    }

    /// Run every check configured for `route_name`, stopping at the first
    /// terminal result.
    pub async fn run(
        &self,
        route_name: &str,
        request: &mut InboundRequest,
    ) -> Result<SecurityContext, Rejection> {
        let start = Instant::now();
        let table = self.policies.load_full();
        let correlation_id = request.correlation_id.clone();

        let Some(route) = table.route(route_name) else {
            tracing::error!(route = %route_name, correlation_id = %correlation_id, "No security policy for route");
            return Err(Rejection::internal(&correlation_id, "unknown route"));
        };

        let mut context = SecurityContext {
            correlation_id: correlation_id.clone(),
            ..SecurityContext::default()
        };

        for check in &route.checks {
            let outcome = AssertUnwindSafe(self.run_check(*check, route, &table, request, &mut context))
                .catch_unwind()
                .await;

            let rejection = match outcome {
                Ok(Ok(())) => continue,
                Ok(Err(rejection)) => rejection,
                Err(panic) => {
                    let message = panic_message(panic.as_ref());
                    tracing::error!(
                        route = %route_name,
                        check = %check,
                        correlation_id = %correlation_id,
                        panic = %message,
                        "Security check panicked"
                    );
                    self.events.emit(
                        SecurityEvent::new(SecurityEventType::InternalError, "panic")
                            .subject(context.subject.as_deref())
                            .origin(request.origin.as_deref())
                            .correlation_id(Some(&correlation_id))
                            .field("check", check.as_str())
                            .field("route", route_name),
                    );
                    Rejection::internal(&correlation_id, format!("{check} check panicked"))
                }
            };

            tracing::info!(
                route = %route_name,
                check = %check,
                status = rejection.status().as_u16(),
                reason = %rejection.reason,
                correlation_id = %correlation_id,
                "Request rejected"
            );
            metrics::record_rejection(check.as_str(), rejection.kind.code());
            metrics::record_pipeline_duration(route_name, start);
            return Err(rejection);
        }

        metrics::record_pipeline_duration(route_name, start);
        Ok(context)
    }

    async fn run_check(
        &self,
        check: CheckKind,
        route: &RouteConfig,
        table: &PolicyTable,
        request: &mut InboundRequest,
        context: &mut SecurityContext,
    ) -> Result<(), Rejection> {
        match check {
            CheckKind::RateLimit => self.check_rate_limit(route, table, request, context).await,
            CheckKind::Threat => self.check_threat(route, table, request, context),
            CheckKind::Authenticate => self.authenticate(route, request, context).await,
        }
    }

    async fn check_rate_limit(
        &self,
        route: &RouteConfig,
        table: &PolicyTable,
        request: &InboundRequest,
        context: &mut SecurityContext,
    ) -> Result<(), Rejection> {
        if !table.rate_limit_enabled {
            return Ok(());
        }
        let cid = &request.correlation_id;
        let (action, policy) = route
            .rate_limit_action
            .as_deref()
            .and_then(|action| table.rate_limits.get(action).map(|policy| (action, *policy)))
            .ok_or_else(|| Rejection::internal(cid, "rate limit policy missing"))?;

        if table.skip.should_skip(&request.path, context.role.as_deref()) {
            tracing::debug!(path = %request.path, action = %action, "Rate limit skipped");
            return Ok(());
        }

        let identity =
            RateLimitIdentity::resolve(context.subject.as_deref(), request.origin.as_deref());
        let decision = self.rate_limiter.check(action, policy, &identity).await;
        context.rate_limit = Some(decision);

        if decision.allowed {
            return Ok(());
        }

        self.events.emit(
            SecurityEvent::new(SecurityEventType::RateLimitExceeded, "limited")
                .subject(context.subject.as_deref())
                .origin(request.origin.as_deref())
                .correlation_id(Some(cid))
                .field("action", action)
                .field("current", decision.current)
                .field("limit", decision.limit)
                .field("reset_at", decision.reset_at),
        );
        Err(Rejection::new(
            RejectionKind::RateLimited(decision),
            cid,
            format!("'{action}' limit of {} exceeded", decision.limit),
        ))
    }

    fn check_threat(
        &self,
        route: &RouteConfig,
        table: &PolicyTable,
        request: &mut InboundRequest,
        context: &mut SecurityContext,
    ) -> Result<(), Rejection> {
        let cid = request.correlation_id.clone();
        let (name, policy) = route
            .threat_policy
            .as_deref()
            .and_then(|name| table.threat_policies.get(name).map(|policy| (name, *policy)))
            .ok_or_else(|| Rejection::internal(&cid, "threat policy missing"))?;

        let outcome = self.detector.inspect(&mut request.input, &policy);
        context.threat_severity = outcome.severity;
        context.sanitized |= outcome.sanitized;

        if !outcome.findings.is_empty() {
            let findings = serde_json::to_value(&outcome.findings).unwrap_or_default();
            self.events.emit(
                SecurityEvent::new(SecurityEventType::ThreatDetected, outcome.severity.as_str())
                    .subject(context.subject.as_deref())
                    .origin(request.origin.as_deref())
                    .correlation_id(Some(&cid))
                    .field("policy", name)
                    .field("verdict", format!("{:?}", outcome.verdict).to_lowercase())
                    .field("findings", findings),
            );
        }

        if outcome.verdict == Verdict::Reject {
            return Err(Rejection::threat(
                &cid,
                format!("{} severity input under policy '{name}'", outcome.severity),
            ));
        }
        Ok(())
    }

    async fn authenticate(
        &self,
        route: &RouteConfig,
        request: &InboundRequest,
        context: &mut SecurityContext,
    ) -> Result<(), Rejection> {
        let cid = &request.correlation_id;
        let Some(token) = request.credential.as_deref() else {
            if route.auth == AuthRequirement::Required {
                self.report_auth_failure(request, "missing_credential");
                return Err(Rejection::authentication(cid, "missing credential"));
            }
            return Ok(());
        };

        match self.tokens.verify_subject(token, CredentialKind::Access).await {
            Ok((claims, subject)) => {
                self.sessions
                    .touch(&claims.sub, request.origin.as_deref(), request.user_agent.as_deref())
                    .await;
                context.subject = Some(claims.sub.clone());
                context.role = subject.role;
                context.claims = Some(claims);
                Ok(())
            }
            Err(e) if e.is_credential_failure() => {
                self.report_auth_failure(request, e.code());
                Err(Rejection::authentication(cid, e.to_string()))
            }
            Err(e) => {
                tracing::error!(error = %e, correlation_id = %cid, "Credential verification unavailable");
                self.events.emit(
                    SecurityEvent::new(SecurityEventType::Degraded, "fail_closed")
                        .origin(request.origin.as_deref())
                        .correlation_id(Some(cid))
                        .field("component", "identity")
                        .field("error", e.to_string()),
                );
                Err(Rejection::internal(cid, e.to_string()))
            }
        }
    }

    fn report_auth_failure(&self, request: &InboundRequest, reason: &str) {
        self.events.emit(
            SecurityEvent::new(SecurityEventType::AuthenticationFailed, "rejected")
                .origin(request.origin.as_deref())
                .correlation_id(Some(&request.correlation_id))
                .field("reason", reason),
        );
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
