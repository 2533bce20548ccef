//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic and unknown keys)
//! - Check referential integrity (routes reference existing policies)
//! - Validate value ranges (lifetimes and windows within (0, one year], limits > 0)
//! - Require every route the HTTP surface serves
//! - Detect duplicate route names
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ShieldConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::collections::HashSet;
use std::net::SocketAddr;

use crate::config::schema::{RouteConfig, ShieldConfig, TokenConfig};
use crate::pipeline::checks::{AuthRequirement, CheckKind};

/// Minimum HMAC secret length in bytes (HS256 key size).
pub const MIN_SECRET_LEN: usize = 32;

/// Upper bound for credential lifetimes, rate-limit windows and the
/// session inactivity window.
pub const MAX_PERIOD_SECS: u64 = 366 * 24 * 60 * 60;

/// Upper bound for a single shared-cache call.
pub const MAX_CACHE_TIMEOUT_MS: u64 = 60_000;

/// A single semantic problem with a configuration file.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{field}: {message}")]
pub struct ValidationError {
    /// Dotted path of the offending field.
    pub field: String,
    pub message: String,
}

impl ValidationError {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// Validate a parsed configuration, collecting every error.
pub fn validate_config(config: &ShieldConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.server.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(
            "server.bind_address",
            format!("'{}' is not a socket address", config.server.bind_address),
        ));
    }
    if config.server.request_timeout_secs == 0 {
        errors.push(ValidationError::new(
            "server.request_timeout_secs",
            "must be greater than zero",
        ));
    }
    if config.server.max_body_bytes == 0 {
        errors.push(ValidationError::new(
            "server.max_body_bytes",
            "must be greater than zero",
        ));
    }

    if config.observability.metrics_enabled
        && config
            .observability
            .metrics_address
            .parse::<SocketAddr>()
            .is_err()
    {
        errors.push(ValidationError::new(
            "observability.metrics_address",
            "must be a socket address when metrics are enabled",
        ));
    }

    if config.cache.op_timeout_ms == 0 || config.cache.op_timeout_ms > MAX_CACHE_TIMEOUT_MS {
        errors.push(ValidationError::new(
            "cache.op_timeout_ms",
            format!("must be between 1 and {MAX_CACHE_TIMEOUT_MS}"),
        ));
    }

    validate_tokens(&config.tokens, &mut errors);

    check_period("session.inactivity_secs", config.session.inactivity_secs, &mut errors);

    for (action, policy) in &config.rate_limit.policies {
        if policy.limit == 0 {
            errors.push(ValidationError::new(
                format!("rate_limit.policies.{action}.limit"),
                "must be greater than zero",
            ));
        }
        check_period(
            &format!("rate_limit.policies.{action}.window_secs"),
            policy.window_secs,
            &mut errors,
        );
    }

    if config.threat.max_depth == 0 {
        errors.push(ValidationError::new(
            "threat.max_depth",
            "must be greater than zero",
        ));
    }
    if config.threat.max_match_len == 0 {
        errors.push(ValidationError::new(
            "threat.max_match_len",
            "must be greater than zero",
        ));
    }

    let mut seen = HashSet::new();
    for (i, route) in config.routes.iter().enumerate() {
        let field = format!("routes[{i}]");
        if route.name.is_empty() {
            errors.push(ValidationError::new(
                format!("{field}.name"),
                "must not be empty",
            ));
        } else if !seen.insert(route.name.as_str()) {
            errors.push(ValidationError::new(
                format!("{field}.name"),
                format!("duplicate route '{}'", route.name),
            ));
        }

        let mut kinds = HashSet::new();
        for check in &route.checks {
            if !kinds.insert(*check) {
                errors.push(ValidationError::new(
                    format!("{field}.checks"),
                    format!("check '{check}' listed more than once"),
                ));
            }
        }

        if route.checks.contains(&CheckKind::RateLimit) {
            match &route.rate_limit_action {
                None => errors.push(ValidationError::new(
                    format!("{field}.rate_limit_action"),
                    "required when the route runs the rate_limit check",
                )),
                Some(action) if !config.rate_limit.policies.contains_key(action) => {
                    errors.push(ValidationError::new(
                        format!("{field}.rate_limit_action"),
                        format!("no rate limit policy named '{action}'"),
                    ))
                }
                Some(_) => {}
            }
        }

        if route.checks.contains(&CheckKind::Threat) {
            match &route.threat_policy {
                None => errors.push(ValidationError::new(
                    format!("{field}.threat_policy"),
                    "required when the route runs the threat check",
                )),
                Some(name) if !config.threat.policies.contains_key(name) => {
                    errors.push(ValidationError::new(
                        format!("{field}.threat_policy"),
                        format!("no threat policy named '{name}'"),
                    ))
                }
                Some(_) => {}
            }
        }

        if route.auth != AuthRequirement::None && !route.checks.contains(&CheckKind::Authenticate)
        {
            errors.push(ValidationError::new(
                format!("{field}.auth"),
                "auth requirement set but the authenticate check is not listed",
            ));
        }
    }

    for served in RouteConfig::builtin() {
        if !seen.contains(served.name.as_str()) {
            errors.push(ValidationError::new(
                "routes",
                format!("route '{}' is served and must be configured", served.name),
            ));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn check_period(field: &str, secs: u64, errors: &mut Vec<ValidationError>) {
    if secs == 0 || secs > MAX_PERIOD_SECS {
        errors.push(ValidationError::new(
            field,
            format!("must be between 1 and {MAX_PERIOD_SECS} seconds"),
        ));
    }
}

fn validate_tokens(tokens: &TokenConfig, errors: &mut Vec<ValidationError>) {
    for (field, secret) in [
        ("tokens.access_secret", &tokens.access_secret),
        ("tokens.refresh_secret", &tokens.refresh_secret),
    ] {
        if secret.len() < MIN_SECRET_LEN {
            errors.push(ValidationError::new(
                field,
                format!("must be at least {MIN_SECRET_LEN} bytes"),
            ));
        }
    }
    if !tokens.access_secret.is_empty() && tokens.access_secret == tokens.refresh_secret {
        errors.push(ValidationError::new(
            "tokens.refresh_secret",
            "must differ from tokens.access_secret",
        ));
    }
    if tokens.issuer.is_empty() {
        errors.push(ValidationError::new("tokens.issuer", "must not be empty"));
    }
    if tokens.audience.is_empty() {
        errors.push(ValidationError::new("tokens.audience", "must not be empty"));
    }
    check_period("tokens.access_ttl_secs", tokens.access_ttl_secs, errors);
    check_period("tokens.refresh_ttl_secs", tokens.refresh_ttl_secs, errors);
    if tokens.refresh_ttl_secs <= tokens.access_ttl_secs {
        errors.push(ValidationError::new(
            "tokens.refresh_ttl_secs",
            "must be longer than tokens.access_ttl_secs",
        ));
    }
    if tokens.cookie_name.is_empty() {
        errors.push(ValidationError::new(
            "tokens.cookie_name",
            "must not be empty",
        ));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rate_limit::RateLimitPolicy;
    use crate::testutil::test_config;

    #[test]
    fn test_valid_config_passes() {
        assert_eq!(validate_config(&test_config()), Ok(()));
    }

    #[test]
    fn test_default_config_requires_secrets() {
        let errors = validate_config(&ShieldConfig::default()).unwrap_err();
        let fields: Vec<_> = errors.iter().map(|e| e.field.as_str()).collect();
        assert!(fields.contains(&"tokens.access_secret"));
        assert!(fields.contains(&"tokens.refresh_secret"));
    }

    #[test]
    fn test_identical_secrets_rejected() {
        let mut config = test_config();
        config.tokens.refresh_secret = config.tokens.access_secret.clone();
        let errors = validate_config(&config).unwrap_err();
        assert!(errors.iter().any(|e| e.message.contains("must differ")));
    }

    #[test]
    fn test_collects_all_errors() {
        let mut config = test_config();
        config.tokens.access_ttl_secs = 0;
        config.session.inactivity_secs = 0;
        config.routes.push(RouteConfig {
            name: "broken".into(),
            checks: vec![CheckKind::RateLimit, CheckKind::Threat],
            rate_limit_action: Some("missing".into()),
            threat_policy: None,
            auth: AuthRequirement::None,
        });

        let errors = validate_config(&config).unwrap_err();
        assert!(errors.len() >= 4, "got {errors:?}");
        assert!(errors
            .iter()
            .any(|e| e.message.contains("no rate limit policy named 'missing'")));
        assert!(errors.iter().any(|e| e.field.ends_with("threat_policy")));
    }

    #[test]
    fn test_unbounded_periods_rejected() {
        let mut config = test_config();
        config.tokens.refresh_ttl_secs = u64::MAX;
        config.session.inactivity_secs = MAX_PERIOD_SECS + 1;
        config.rate_limit.policies.insert(
            "login".into(),
            RateLimitPolicy {
                limit: 5,
                window_secs: u64::MAX,
            },
        );
        config.cache.op_timeout_ms = u64::MAX;

        let errors = validate_config(&config).unwrap_err();
        let fields: Vec<_> = errors.iter().map(|e| e.field.as_str()).collect();
        assert!(fields.contains(&"tokens.refresh_ttl_secs"), "{fields:?}");
        assert!(fields.contains(&"session.inactivity_secs"));
        assert!(fields.contains(&"rate_limit.policies.login.window_secs"));
        assert!(fields.contains(&"cache.op_timeout_ms"));
    }

    #[test]
    fn test_period_bound_is_inclusive() {
        let mut config = test_config();
        config.tokens.refresh_ttl_secs = MAX_PERIOD_SECS;
        config.rate_limit.policies.insert(
            "login".into(),
            RateLimitPolicy {
                limit: 5,
                window_secs: MAX_PERIOD_SECS,
            },
        );
        assert_eq!(validate_config(&config), Ok(()));
    }

    #[test]
    fn test_served_route_must_be_configured() {
        let mut config = test_config();
        config.routes.retain(|route| route.name != "me");
        let errors = validate_config(&config).unwrap_err();
        assert!(errors
            .iter()
            .any(|e| e.field == "routes" && e.message.contains("'me'")));
    }

    #[test]
    fn test_duplicate_route_rejected() {
        let mut config = test_config();
        let first = config.routes[0].clone();
        config.routes.push(first);
        let errors = validate_config(&config).unwrap_err();
        assert!(errors.iter().any(|e| e.message.starts_with("duplicate route")));
    }
}
