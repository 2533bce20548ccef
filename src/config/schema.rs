//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the shield.
//! All types derive Serde traits for deserialization from config files, and
//! every struct rejects unknown keys so that typos fail at startup instead of
//! silently falling back to a default.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::pipeline::checks::{AuthRequirement, CheckKind};
use crate::rate_limit::RateLimitPolicy;
use crate::threat::{Severity, ThreatMode, ThreatPolicy};

/// Root configuration for the request-security pipeline.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct ShieldConfig {
    /// Listener and request-handling settings.
    pub server: ServerConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    /// Shared cache client settings.
    pub cache: CacheConfig,

    /// Credential issuance and verification.
    pub tokens: TokenConfig,

    /// Session activity tracking.
    pub session: SessionConfig,

    /// Rate limiting configuration.
    pub rate_limit: RateLimitConfig,

    /// Threat detection configuration.
    pub threat: ThreatConfig,

    /// Per-route check sequences.
    pub routes: Vec<RouteConfig>,
}

impl Default for ShieldConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            observability: ObservabilityConfig::default(),
            cache: CacheConfig::default(),
            tokens: TokenConfig::default(),
            session: SessionConfig::default(),
            rate_limit: RateLimitConfig::default(),
            threat: ThreatConfig::default(),
            routes: RouteConfig::builtin(),
        }
    }
}

/// Deployment environment. Trusted-role rate-limit bypass is only honoured
/// outside production.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Production,
    Staging,
    Development,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct ServerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,

    /// Deployment environment.
    pub environment: Environment,

    /// Request timeout (total time for request/response) in seconds.
    pub request_timeout_secs: u64,

    /// Maximum buffered request body in bytes.
    pub max_body_bytes: usize,

    /// Use the left-most `X-Forwarded-For` entry as the network origin.
    /// Only enable behind a proxy that overwrites the header.
    pub trust_forwarded_for: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
            environment: Environment::Production,
            request_timeout_secs: 30,
            max_body_bytes: 1024 * 1024,
            trust_forwarded_for: false,
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error). `RUST_LOG` wins when set.
    pub log_level: String,

    /// Log line format.
    pub log_format: LogFormat,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

/// Shared cache client configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct CacheConfig {
    /// Upper bound for a single cache round trip in milliseconds.
    pub op_timeout_ms: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self { op_timeout_ms: 250 }
    }
}

/// Credential configuration. Not hot-reloadable.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct TokenConfig {
    /// `iss` claim stamped on and required of every credential.
    pub issuer: String,

    /// `aud` claim stamped on and required of every credential.
    pub audience: String,

    /// HMAC secret for access credentials.
    pub access_secret: String,

    /// HMAC secret for refresh credentials. Must differ from the access secret.
    pub refresh_secret: String,

    /// Access credential lifetime in seconds.
    pub access_ttl_secs: u64,

    /// Refresh credential lifetime in seconds.
    pub refresh_ttl_secs: u64,

    /// Cookie consulted when no `Authorization` header is present.
    pub cookie_name: String,
}

impl Default for TokenConfig {
    fn default() -> Self {
        Self {
            issuer: "request-shield".to_string(),
            audience: "request-shield-api".to_string(),
            access_secret: String::new(),
            refresh_secret: String::new(),
            access_ttl_secs: 15 * 60,
            refresh_ttl_secs: 7 * 24 * 60 * 60,
            cookie_name: "access_token".to_string(),
        }
    }
}

/// Session activity configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct SessionConfig {
    /// Seconds of inactivity after which the activity record expires.
    pub inactivity_secs: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            inactivity_secs: 30 * 60,
        }
    }
}

/// Rate limiting configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct RateLimitConfig {
    /// Enable rate limiting.
    pub enabled: bool,

    /// Request paths that never consume quota (health checks).
    pub skip_paths: Vec<String>,

    /// Roles that bypass rate limiting outside production.
    pub trusted_roles: Vec<String>,

    /// Consecutive fail-open decisions before the degraded warning escalates.
    pub alarm_threshold: u64,

    /// Per-action limits, keyed by action label.
    pub policies: BTreeMap<String, RateLimitPolicy>,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        let mut policies = BTreeMap::new();
        policies.insert(
            "login".to_string(),
            RateLimitPolicy {
                limit: 5,
                window_secs: 15 * 60,
            },
        );
        policies.insert(
            "token-refresh".to_string(),
            RateLimitPolicy {
                limit: 30,
                window_secs: 15 * 60,
            },
        );
        policies.insert(
            "sms-send".to_string(),
            RateLimitPolicy {
                limit: 3,
                window_secs: 60 * 60,
            },
        );
        policies.insert(
            "post-create".to_string(),
            RateLimitPolicy {
                limit: 30,
                window_secs: 60,
            },
        );
        policies.insert(
            "api".to_string(),
            RateLimitPolicy {
                limit: 300,
                window_secs: 60,
            },
        );

        Self {
            enabled: true,
            skip_paths: vec!["/health".to_string()],
            trusted_roles: Vec::new(),
            alarm_threshold: 10,
            policies,
        }
    }
}

/// Threat detection configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct ThreatConfig {
    /// Header names (lowercase) whose values are scanned.
    pub header_allow_list: Vec<String>,

    /// Maximum nesting depth scanned before giving up on a payload.
    pub max_depth: usize,

    /// Matched substrings are truncated to this many characters in logs.
    pub max_match_len: usize,

    /// Named policies referenced by routes.
    pub policies: BTreeMap<String, ThreatPolicy>,
}

impl Default for ThreatConfig {
    fn default() -> Self {
        let mut policies = BTreeMap::new();
        policies.insert(
            "strict".to_string(),
            ThreatPolicy {
                mode: ThreatMode::Block,
                allowed_severity: Severity::Low,
            },
        );
        policies.insert(
            "default".to_string(),
            ThreatPolicy {
                mode: ThreatMode::Sanitize,
                allowed_severity: Severity::Medium,
            },
        );
        policies.insert(
            "observe".to_string(),
            ThreatPolicy {
                mode: ThreatMode::DetectOnly,
                allowed_severity: Severity::High,
            },
        );

        Self {
            header_allow_list: vec![
                "user-agent".to_string(),
                "referer".to_string(),
                "x-forwarded-for".to_string(),
            ],
            max_depth: 32,
            max_match_len: 64,
            policies,
        }
    }
}

/// Ordered check sequence for one route.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct RouteConfig {
    /// Route identifier, referenced by the HTTP layer.
    pub name: String,

    /// Checks executed in order; the first terminal result wins.
    pub checks: Vec<CheckKind>,

    /// Action label for the rate-limit check.
    #[serde(default)]
    pub rate_limit_action: Option<String>,

    /// Threat policy name for the threat check.
    #[serde(default)]
    pub threat_policy: Option<String>,

    /// Whether the authenticate check requires a credential.
    #[serde(default)]
    pub auth: AuthRequirement,
}

impl RouteConfig {
    fn new(
        name: &str,
        checks: &[CheckKind],
        rate_limit_action: Option<&str>,
        threat_policy: Option<&str>,
        auth: AuthRequirement,
    ) -> Self {
        Self {
            name: name.to_string(),
            checks: checks.to_vec(),
            rate_limit_action: rate_limit_action.map(str::to_string),
            threat_policy: threat_policy.map(str::to_string),
            auth,
        }
    }

    /// Routes served by the bundled HTTP surface.
    pub fn builtin() -> Vec<RouteConfig> {
        use CheckKind::{Authenticate, RateLimit, Threat};

        vec![
            RouteConfig::new(
                "login",
                &[RateLimit, Threat],
                Some("login"),
                Some("strict"),
                AuthRequirement::None,
            ),
            // Refresh credentials are opaque signed strings; their
            // base64url alphabet collides with the comment signatures.
            RouteConfig::new(
                "refresh",
                &[RateLimit],
                Some("token-refresh"),
                None,
                AuthRequirement::None,
            ),
            RouteConfig::new(
                "logout",
                &[Authenticate],
                None,
                None,
                AuthRequirement::Required,
            ),
            RouteConfig::new(
                "logout-all",
                &[Authenticate],
                None,
                None,
                AuthRequirement::Required,
            ),
            RouteConfig::new(
                "me",
                &[Authenticate, RateLimit],
                Some("api"),
                None,
                AuthRequirement::Required,
            ),
            RouteConfig::new(
                "post-create",
                &[Authenticate, RateLimit, Threat],
                Some("post-create"),
                Some("default"),
                AuthRequirement::Required,
            ),
            RouteConfig::new(
                "post-read",
                &[Authenticate, RateLimit, Threat],
                Some("api"),
                Some("observe"),
                AuthRequirement::Optional,
            ),
        ]
    }
}
