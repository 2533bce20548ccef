//! Credential claims.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// The two credential kinds. Each is signed with its own secret.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CredentialKind {
    Access,
    Refresh,
}

impl CredentialKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            CredentialKind::Access => "access",
            CredentialKind::Refresh => "refresh",
        }
    }
}

impl fmt::Display for CredentialKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Signed claims carried by every credential.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// Subject identifier.
    pub sub: String,
    /// Issued at (Unix seconds).
    pub iat: u64,
    /// Expires at (Unix seconds), strictly after `iat`.
    pub exp: u64,
    pub iss: String,
    pub aud: String,
    pub kind: CredentialKind,
    /// Unique id; two credentials minted in the same second still differ.
    pub jti: String,
}

impl Claims {
    /// Lifetime left at `now`, or `None` once expired.
    pub fn remaining_lifetime(&self, now: u64) -> Option<Duration> {
        (self.exp > now).then(|| Duration::from_secs(self.exp - now))
    }

    pub fn is_expired(&self, now: u64) -> bool {
        now >= self.exp
    }
}

/// An encoded credential and the claims it carries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Credential {
    pub token: String,
    #[serde(skip)]
    pub claims: Claims,
    /// Seconds until expiry at issuance.
    pub expires_in: u64,
}

/// Result of login or rotation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CredentialPair {
    pub access: Credential,
    pub refresh: Credential,
}
