//! Check kinds and route configuration vocabulary.

use std::fmt;

use serde::{Deserialize, Serialize};

/// One step of a route's check sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckKind {
    RateLimit,
    Threat,
    Authenticate,
}

impl CheckKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            CheckKind::RateLimit => "rate_limit",
            CheckKind::Threat => "threat",
            CheckKind::Authenticate => "authenticate",
        }
    }
}

impl fmt::Display for CheckKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Whether a route needs a verified access credential.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthRequirement {
    /// Missing or invalid credential rejects with 401.
    Required,
    /// Anonymous requests pass; a presented credential must still verify.
    Optional,
    #[default]
    None,
}
