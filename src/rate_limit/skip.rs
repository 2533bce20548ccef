//! Requests that never consume rate-limit quota.

use crate::config::{Environment, RateLimitConfig};

/// Evaluated before the counter is touched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SkipRule {
    paths: Vec<String>,
    trusted_roles: Vec<String>,
    honour_roles: bool,
}

impl SkipRule {
    pub fn from_config(config: &RateLimitConfig, environment: Environment) -> Self {
        Self {
            paths: config.skip_paths.clone(),
            trusted_roles: config.trusted_roles.clone(),
            honour_roles: environment != Environment::Production,
        }
    }

    pub fn should_skip(&self, path: &str, role: Option<&str>) -> bool {
        if self.paths.iter().any(|p| p == path) {
            return true;
        }
        self.honour_roles
            && role.is_some_and(|role| self.trusted_roles.iter().any(|r| r == role))
    }
}
