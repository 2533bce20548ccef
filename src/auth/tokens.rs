//! Credential issuance, verification, rotation and revocation.
//!
//! Credentials are HS256 JWTs. Access and refresh credentials are signed
//! with independent secrets, so one kind never verifies as the other.
//!
//! Verification order: structure → signature → issuer/audience → kind →
//! expiry → revocation set → subject state (active, credentials valid
//! since). `Expired` is only reported for a credential that passed every
//! structural and cryptographic check.

use std::sync::Arc;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::auth::claims::{Claims, Credential, CredentialKind, CredentialPair};
use crate::auth::identity::{constant_time_eq, IdentityError, IdentityStore, SubjectRecord};
use crate::cache::{CacheError, SharedCache};
use crate::clock::Clock;
use crate::config::TokenConfig;
use crate::observability::metrics;
use crate::observability::{SecurityEvent, SecurityEventSink, SecurityEventType};

/// Prefix of Revocation Set keys in the shared cache.
const REVOCATION_PREFIX: &str = "revoked:";

/// Why a credential was refused or could not be produced.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TokenError {
    #[error("malformed credential: {0}")]
    Malformed(String),

    #[error("credential signature is invalid")]
    SignatureInvalid,

    #[error("credential claim '{0}' does not match")]
    ClaimMismatch(&'static str),

    #[error("expected a {expected} credential, got {found}")]
    KindMismatch {
        expected: CredentialKind,
        found: CredentialKind,
    },

    #[error("credential expired")]
    Expired,

    #[error("credential revoked")]
    Revoked,

    #[error("credential issued before the subject's last invalidation")]
    StaleIssuance,

    #[error("refresh credential is not the subject's current one")]
    RefreshMismatch,

    #[error("subject unknown or inactive")]
    UnknownSubject,

    #[error("identity store error: {0}")]
    Identity(#[from] IdentityError),

    #[error("revocation set unavailable: {0}")]
    RevocationUnavailable(#[from] CacheError),

    #[error("failed to sign credential: {0}")]
    Signing(String),
}

impl TokenError {
    /// Stable label for logs and metrics.
    pub fn code(&self) -> &'static str {
        match self {
            TokenError::Malformed(_) => "malformed",
            TokenError::SignatureInvalid => "signature_invalid",
            TokenError::ClaimMismatch(_) => "claim_mismatch",
            TokenError::KindMismatch { .. } => "kind_mismatch",
            TokenError::Expired => "expired",
            TokenError::Revoked => "revoked",
            TokenError::StaleIssuance => "stale_issuance",
            TokenError::RefreshMismatch => "refresh_mismatch",
            TokenError::UnknownSubject => "unknown_subject",
            TokenError::Identity(_) => "identity_unavailable",
            TokenError::RevocationUnavailable(_) => "revocation_unavailable",
            TokenError::Signing(_) => "signing_failed",
        }
    }

    /// True when the failure is the caller's credential, not our infrastructure.
    pub fn is_credential_failure(&self) -> bool {
        !matches!(
            self,
            TokenError::Identity(IdentityError::Unavailable(_))
                | TokenError::RevocationUnavailable(_)
                | TokenError::Signing(_)
        )
    }
}

struct SigningKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
}

impl SigningKeys {
    fn from_secret(secret: &str) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
        }
    }
}

/// Mints and validates credentials and maintains the Revocation Set.
///
/// Constructed once at startup and shared by reference.
pub struct TokenManager {
    issuer: String,
    audience: String,
    access_ttl_secs: u64,
    refresh_ttl_secs: u64,
    access_keys: SigningKeys,
    refresh_keys: SigningKeys,
    validation: Validation,
    cache: Arc<dyn SharedCache>,
    identity: Arc<dyn IdentityStore>,
    clock: Arc<dyn Clock>,
    events: Arc<dyn SecurityEventSink>,
}

impl std::fmt::Debug for TokenManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenManager")
            .field("issuer", &self.issuer)
            .field("audience", &self.audience)
            .field("access_ttl_secs", &self.access_ttl_secs)
            .field("refresh_ttl_secs", &self.refresh_ttl_secs)
            .finish_non_exhaustive()
    }
}

impl TokenManager {
    pub fn new(
        config: &TokenConfig,
        cache: Arc<dyn SharedCache>,
        identity: Arc<dyn IdentityStore>,
        clock: Arc<dyn Clock>,
        events: Arc<dyn SecurityEventSink>,
    ) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        // Expiry is checked against the injected clock after decoding.
        validation.validate_exp = false;
        validation.validate_nbf = false;
        validation.leeway = 0;
        validation.set_issuer(&[config.issuer.as_str()]);
        validation.set_audience(&[config.audience.as_str()]);
        validation.set_required_spec_claims(&["sub", "exp", "iss", "aud"]);

        Self {
            issuer: config.issuer.clone(),
            audience: config.audience.clone(),
            access_ttl_secs: config.access_ttl_secs,
            refresh_ttl_secs: config.refresh_ttl_secs,
            access_keys: SigningKeys::from_secret(&config.access_secret),
            refresh_keys: SigningKeys::from_secret(&config.refresh_secret),
            validation,
            cache,
            identity,
            clock,
            events,
        }
    }

    fn keys(&self, kind: CredentialKind) -> &SigningKeys {
        match kind {
            CredentialKind::Access => &self.access_keys,
            CredentialKind::Refresh => &self.refresh_keys,
        }
    }

    /// Lifetime in seconds of a freshly issued credential of `kind`.
    pub fn lifetime_secs(&self, kind: CredentialKind) -> u64 {
        match kind {
            CredentialKind::Access => self.access_ttl_secs,
            CredentialKind::Refresh => self.refresh_ttl_secs,
        }
    }

    /// Build and sign a credential. Nothing is persisted.
    pub fn issue(&self, subject: &str, kind: CredentialKind) -> Result<Credential, TokenError> {
        if subject.is_empty() {
            return Err(TokenError::Malformed("empty subject".to_string()));
        }

        let now = self.clock.now_unix();
        let lifetime = self.lifetime_secs(kind);
        let claims = Claims {
            sub: subject.to_string(),
            iat: now,
            exp: now.saturating_add(lifetime),
            iss: self.issuer.clone(),
            aud: self.audience.clone(),
            kind,
            jti: Uuid::new_v4().to_string(),
        };

        let token = encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &self.keys(kind).encoding,
        )
        .map_err(|e| TokenError::Signing(e.to_string()))?;

        metrics::record_token_issued(kind.as_str());
        Ok(Credential {
            token,
            claims,
            expires_in: lifetime,
        })
    }

    /// Issue an access and a refresh credential. The caller is expected to
    /// register the refresh credential with the identity store.
    pub fn issue_pair(&self, subject: &str) -> Result<CredentialPair, TokenError> {
        Ok(CredentialPair {
            access: self.issue(subject, CredentialKind::Access)?,
            refresh: self.issue(subject, CredentialKind::Refresh)?,
        })
    }

    /// Issue a pair and register its refresh credential as the subject's
    /// only rotatable one, replacing any previous refresh credential.
    pub async fn start_session(&self, subject: &str) -> Result<CredentialPair, TokenError> {
        let pair = self.issue_pair(subject)?;
        self.identity
            .record_refresh_credential(subject, &pair.refresh.token)
            .await?;
        Ok(pair)
    }

    /// Pure verification: structure, signature, issuer/audience, kind and
    /// expiry. Does not consult the revocation set or identity store.
    pub fn decode(&self, token: &str, expected: CredentialKind) -> Result<Claims, TokenError> {
        self.decode_claims(token, expected, true)
    }

    fn decode_claims(
        &self,
        token: &str,
        expected: CredentialKind,
        check_expiry: bool,
    ) -> Result<Claims, TokenError> {
        check_structure(token)?;

        let data = decode::<Claims>(token, &self.keys(expected).decoding, &self.validation)
            .map_err(map_jwt_error)?;
        let claims = data.claims;

        if claims.kind != expected {
            return Err(TokenError::KindMismatch {
                expected,
                found: claims.kind,
            });
        }
        if claims.sub.is_empty() {
            return Err(TokenError::Malformed("empty subject".to_string()));
        }
        if claims.exp <= claims.iat {
            return Err(TokenError::Malformed(
                "expiry not after issuance".to_string(),
            ));
        }
        if check_expiry && claims.is_expired(self.clock.now_unix()) {
            return Err(TokenError::Expired);
        }

        Ok(claims)
    }

    /// Decode a credential of either kind, ignoring expiry.
    fn decode_any_kind(&self, token: &str) -> Result<Claims, TokenError> {
        match self.decode_claims(token, CredentialKind::Access, false) {
            Err(TokenError::SignatureInvalid) => {
                self.decode_claims(token, CredentialKind::Refresh, false)
            }
            other => other,
        }
    }

    /// Full verification of a presented credential.
    pub async fn verify(&self, token: &str, expected: CredentialKind) -> Result<Claims, TokenError> {
        self.verify_subject(token, expected)
            .await
            .map(|(claims, _)| claims)
    }

    /// Full verification, also returning the subject record it was checked against.
    pub async fn verify_subject(
        &self,
        token: &str,
        expected: CredentialKind,
    ) -> Result<(Claims, SubjectRecord), TokenError> {
        let result = self.verify_inner(token, expected).await;
        match &result {
            Ok((claims, _)) => {
                metrics::record_verification("ok");
                tracing::debug!(subject = %claims.sub, kind = %expected, "Credential verified");
            }
            Err(e) => {
                metrics::record_verification(e.code());
                tracing::debug!(kind = %expected, reason = e.code(), "Credential rejected");
            }
        }
        result
    }

    async fn verify_inner(
        &self,
        token: &str,
        expected: CredentialKind,
    ) -> Result<(Claims, SubjectRecord), TokenError> {
        let claims = self.decode(token, expected)?;

        if self.is_revoked(token).await {
            return Err(TokenError::Revoked);
        }

        let subject = self
            .identity
            .find_subject_by_id(&claims.sub)
            .await?
            .filter(|subject| subject.is_active)
            .ok_or(TokenError::UnknownSubject)?;

        if subject
            .credentials_valid_since
            .is_some_and(|since| claims.iat < since)
        {
            return Err(TokenError::StaleIssuance);
        }

        Ok((claims, subject))
    }

    /// Insert a credential into the Revocation Set for exactly its remaining
    /// natural lifetime.
    ///
    /// Returns `Ok(false)` when the credential has already expired, in which
    /// case nothing is written.
    pub async fn revoke(&self, token: &str) -> Result<bool, TokenError> {
        let claims = self.decode_any_kind(token)?;
        let Some(remaining) = claims.remaining_lifetime(self.clock.now_unix()) else {
            tracing::debug!(subject = %claims.sub, "Revocation skipped, credential already expired");
            return Ok(false);
        };

        if let Err(e) = self
            .cache
            .set(&revocation_key(token), &claims.sub, Some(remaining))
            .await
        {
            tracing::warn!(component = "revocation", error = %e, "Failed to record revocation");
            metrics::record_degraded("revocation");
            self.events.emit(
                SecurityEvent::new(SecurityEventType::Degraded, "revoke_failed")
                    .subject(Some(&claims.sub))
                    .field("component", "revocation")
                    .field("error", e.to_string()),
            );
            return Err(e.into());
        }

        self.events.emit(
            SecurityEvent::new(SecurityEventType::CredentialRevoked, "revoked")
                .subject(Some(&claims.sub))
                .field("kind", claims.kind.as_str())
                .field("ttl_secs", remaining.as_secs()),
        );
        Ok(true)
    }

    /// Point lookup in the Revocation Set.
    ///
    /// Fails open: when the cache cannot answer, the credential is treated
    /// as not revoked and a degraded-security event is emitted.
    pub async fn is_revoked(&self, token: &str) -> bool {
        match self.cache.exists(&revocation_key(token)).await {
            Ok(revoked) => revoked,
            Err(e) => {
                tracing::warn!(
                    component = "revocation",
                    error = %e,
                    "Revocation set unreachable, treating credential as not revoked"
                );
                metrics::record_degraded("revocation");
                self.events.emit(
                    SecurityEvent::new(SecurityEventType::Degraded, "fail_open")
                        .field("component", "revocation")
                        .field("error", e.to_string()),
                );
                false
            }
        }
    }

    /// Exchange the subject's current refresh credential for a new pair.
    ///
    /// The new refresh credential replaces the old one in the identity
    /// store; the old one is not added to the Revocation Set.
    pub async fn rotate(&self, old_refresh: &str) -> Result<CredentialPair, TokenError> {
        let (claims, subject) = self
            .verify_subject(old_refresh, CredentialKind::Refresh)
            .await?;

        let registered = subject
            .current_refresh_credential
            .as_deref()
            .is_some_and(|current| constant_time_eq(current.as_bytes(), old_refresh.as_bytes()));
        if !registered {
            self.events.emit(
                SecurityEvent::new(SecurityEventType::RefreshReuse, "rejected")
                    .subject(Some(&claims.sub))
                    .field("jti", claims.jti.clone()),
            );
            return Err(TokenError::RefreshMismatch);
        }

        self.start_session(&claims.sub).await
    }

    /// Reject every credential the subject holds that was issued before now.
    pub async fn revoke_all(&self, subject: &str) -> Result<(), TokenError> {
        let now = self.clock.now_unix();
        self.identity.invalidate_credentials(subject, now).await?;
        self.events.emit(
            SecurityEvent::new(SecurityEventType::CredentialsInvalidated, "invalidated")
                .subject(Some(subject))
                .field("valid_since", now),
        );
        Ok(())
    }
}

/// Cache key marking `token` as revoked.
pub fn revocation_key(token: &str) -> String {
    format!(
        "{REVOCATION_PREFIX}{}",
        hex::encode(Sha256::digest(token.as_bytes()))
    )
}

/// Three non-empty dot-delimited segments, the first two base64url JSON objects.
fn check_structure(token: &str) -> Result<(), TokenError> {
    let segments: Vec<&str> = token.split('.').collect();
    if segments.len() != 3 || segments.iter().any(|s| s.is_empty()) {
        return Err(TokenError::Malformed(
            "expected three dot-delimited segments".to_string(),
        ));
    }

    for (name, segment) in [("header", segments[0]), ("payload", segments[1])] {
        let bytes = URL_SAFE_NO_PAD
            .decode(segment)
            .map_err(|_| TokenError::Malformed(format!("{name} is not base64url")))?;
        serde_json::from_slice::<serde_json::Map<String, serde_json::Value>>(&bytes)
            .map_err(|_| TokenError::Malformed(format!("{name} is not a JSON object")))?;
    }
    Ok(())
}

fn map_jwt_error(e: jsonwebtoken::errors::Error) -> TokenError {
    match e.kind() {
        // Header and payload were checked up front, so a base64 failure here
        // is the signature segment.
        ErrorKind::InvalidSignature | ErrorKind::InvalidAlgorithm | ErrorKind::Base64(_) => {
            TokenError::SignatureInvalid
        }
        ErrorKind::InvalidIssuer => TokenError::ClaimMismatch("iss"),
        ErrorKind::InvalidAudience => TokenError::ClaimMismatch("aud"),
        ErrorKind::ExpiredSignature => TokenError::Expired,
        ErrorKind::MissingRequiredClaim(claim) => {
            TokenError::Malformed(format!("missing claim '{claim}'"))
        }
        _ => TokenError::Malformed(e.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::identity::MemoryIdentityStore;
    use crate::cache::MemoryCache;
    use crate::testutil::{test_config, FaultyCache, ManualClock, RecordingSink};
    use std::time::Duration;

    struct Fixture {
        tokens: TokenManager,
        cache: Arc<MemoryCache>,
        identity: Arc<MemoryIdentityStore>,
        clock: Arc<ManualClock>,
        events: Arc<RecordingSink>,
    }

    fn fixture() -> Fixture {
        let cache = Arc::new(MemoryCache::new());
        let identity = Arc::new(MemoryIdentityStore::new());
        identity.insert_subject("alice", "pw", None);
        let clock = Arc::new(ManualClock::new(1_700_000_000));
        let events = Arc::new(RecordingSink::default());
        let tokens = TokenManager::new(
            &test_config().tokens,
            cache.clone(),
            identity.clone(),
            clock.clone(),
            events.clone(),
        );
        Fixture {
            tokens,
            cache,
            identity,
            clock,
            events,
        }
    }

    fn tamper(token: &str, index: usize) -> String {
        let mut chars: Vec<char> = token.chars().collect();
        chars[index] = if chars[index] == 'A' { 'B' } else { 'A' };
        chars.into_iter().collect()
    }

    #[tokio::test]
    async fn test_issue_then_verify_both_kinds() {
        let f = fixture();
        for kind in [CredentialKind::Access, CredentialKind::Refresh] {
            let credential = f.tokens.issue("alice", kind).unwrap();
            let claims = f.tokens.verify(&credential.token, kind).await.unwrap();
            assert_eq!(claims.sub, "alice");
            assert_eq!(claims.kind, kind);
            assert!(claims.exp > claims.iat);
        }
    }

    #[tokio::test]
    async fn test_lifetimes_differ_by_kind() {
        let f = fixture();
        let pair = f.tokens.issue_pair("alice").unwrap();
        assert_eq!(pair.access.expires_in, 900);
        assert_eq!(pair.refresh.expires_in, 7 * 24 * 3600);
        assert_ne!(pair.access.claims.jti, pair.refresh.claims.jti);
    }

    #[tokio::test]
    async fn test_expired_after_lifetime() {
        let f = fixture();
        let credential = f.tokens.issue("alice", CredentialKind::Access).unwrap();

        f.clock.advance(899);
        assert!(f.tokens.verify(&credential.token, CredentialKind::Access).await.is_ok());

        f.clock.advance(1);
        assert_eq!(
            f.tokens.verify(&credential.token, CredentialKind::Access).await,
            Err(TokenError::Expired)
        );
    }

    #[tokio::test]
    async fn test_any_signature_byte_altered_is_rejected() {
        let f = fixture();
        let token = f.tokens.issue("alice", CredentialKind::Access).unwrap().token;
        let signature_start = token.rfind('.').unwrap() + 1;

        for index in signature_start..token.len() {
            let tampered = tamper(&token, index);
            assert_eq!(
                f.tokens.decode(&tampered, CredentialKind::Access),
                Err(TokenError::SignatureInvalid),
                "position {index}"
            );
        }
    }

    #[tokio::test]
    async fn test_expired_and_tampered_reports_signature() {
        let f = fixture();
        let token = f.tokens.issue("alice", CredentialKind::Access).unwrap().token;
        f.clock.advance(10_000);
        let tampered = tamper(&token, token.len() - 5);
        assert_eq!(
            f.tokens.decode(&tampered, CredentialKind::Access),
            Err(TokenError::SignatureInvalid)
        );
    }

    #[tokio::test]
    async fn test_oversized_lifetime_saturates() {
        let f = fixture();
        let mut config = test_config().tokens;
        config.refresh_ttl_secs = u64::MAX;
        let tokens = TokenManager::new(
            &config,
            f.cache.clone(),
            f.identity.clone(),
            f.clock.clone(),
            f.events.clone(),
        );
        let credential = tokens.issue("alice", CredentialKind::Refresh).unwrap();
        assert_eq!(credential.claims.exp, u64::MAX);
    }

    #[tokio::test]
    async fn test_kinds_are_not_interchangeable() {
        let f = fixture();
        let pair = f.tokens.issue_pair("alice").unwrap();
        assert_eq!(
            f.tokens.decode(&pair.refresh.token, CredentialKind::Access),
            Err(TokenError::SignatureInvalid)
        );
        assert_eq!(
            f.tokens.decode(&pair.access.token, CredentialKind::Refresh),
            Err(TokenError::SignatureInvalid)
        );
    }

    #[tokio::test]
    async fn test_malformed_tokens() {
        let f = fixture();
        for token in ["", "abc", "a.b", "a.b.c.d", "a..c", "!!!.e30.sig"] {
            assert!(
                matches!(
                    f.tokens.decode(token, CredentialKind::Access),
                    Err(TokenError::Malformed(_))
                ),
                "{token:?}"
            );
        }
    }

    #[tokio::test]
    async fn test_foreign_issuer_rejected() {
        let f = fixture();
        let mut config = test_config().tokens;
        config.issuer = "someone-else".into();
        let foreign = TokenManager::new(
            &config,
            f.cache.clone(),
            f.identity.clone(),
            f.clock.clone(),
            f.events.clone(),
        );
        let token = foreign.issue("alice", CredentialKind::Access).unwrap().token;
        assert_eq!(
            f.tokens.decode(&token, CredentialKind::Access),
            Err(TokenError::ClaimMismatch("iss"))
        );
    }

    #[tokio::test]
    async fn test_other_algorithm_rejected() {
        let f = fixture();
        let claims = f.tokens.issue("alice", CredentialKind::Access).unwrap().claims;
        let token = encode(
            &Header::new(Algorithm::HS512),
            &claims,
            &EncodingKey::from_secret(test_config().tokens.access_secret.as_bytes()),
        )
        .unwrap();
        assert_eq!(
            f.tokens.decode(&token, CredentialKind::Access),
            Err(TokenError::SignatureInvalid)
        );
    }

    #[tokio::test]
    async fn test_revoke_then_is_revoked() {
        let f = fixture();
        let credential = f.tokens.issue("alice", CredentialKind::Access).unwrap();
        f.clock.advance(300);

        assert!(!f.tokens.is_revoked(&credential.token).await);
        assert!(f.tokens.revoke(&credential.token).await.unwrap());
        assert!(f.tokens.is_revoked(&credential.token).await);

        let ttl = f
            .cache
            .ttl(&revocation_key(&credential.token))
            .await
            .unwrap()
            .unwrap();
        assert!(ttl <= Duration::from_secs(600), "ttl {ttl:?}");

        assert_eq!(
            f.tokens.verify(&credential.token, CredentialKind::Access).await,
            Err(TokenError::Revoked)
        );
    }

    #[tokio::test]
    async fn test_revoke_refresh_credential() {
        let f = fixture();
        let credential = f.tokens.issue("alice", CredentialKind::Refresh).unwrap();
        assert!(f.tokens.revoke(&credential.token).await.unwrap());
        assert!(f.tokens.is_revoked(&credential.token).await);
    }

    #[tokio::test]
    async fn test_revoke_expired_is_noop() {
        let f = fixture();
        let credential = f.tokens.issue("alice", CredentialKind::Access).unwrap();
        f.clock.advance(900);
        assert!(!f.tokens.revoke(&credential.token).await.unwrap());
        assert!(f.cache.is_empty());
    }

    #[tokio::test]
    async fn test_revoke_rejects_forged_token() {
        let f = fixture();
        let token = f.tokens.issue("alice", CredentialKind::Access).unwrap().token;
        let forged = tamper(&token, token.len() - 3);
        assert_eq!(f.tokens.revoke(&forged).await, Err(TokenError::SignatureInvalid));
    }

    #[tokio::test]
    async fn test_is_revoked_fails_open_and_reports() {
        let f = fixture();
        let events = Arc::new(RecordingSink::default());
        let tokens = TokenManager::new(
            &test_config().tokens,
            Arc::new(FaultyCache::new()),
            f.identity.clone(),
            f.clock.clone(),
            events.clone(),
        );
        let token = tokens.issue("alice", CredentialKind::Access).unwrap().token;

        assert!(!tokens.is_revoked(&token).await);
        assert!(tokens.verify(&token, CredentialKind::Access).await.is_ok());
        assert!(events
            .events()
            .iter()
            .any(|e| e.event_type == SecurityEventType::Degraded && e.outcome == "fail_open"));
    }

    #[tokio::test]
    async fn test_revoke_surfaces_cache_failure() {
        let f = fixture();
        let tokens = TokenManager::new(
            &test_config().tokens,
            Arc::new(FaultyCache::new()),
            f.identity.clone(),
            f.clock.clone(),
            f.events.clone(),
        );
        let token = tokens.issue("alice", CredentialKind::Access).unwrap().token;
        assert!(matches!(
            tokens.revoke(&token).await,
            Err(TokenError::RevocationUnavailable(_))
        ));
    }

    #[tokio::test]
    async fn test_rotate_replaces_refresh_credential() {
        let f = fixture();
        let first = f.tokens.start_session("alice").await.unwrap();

        let second = f.tokens.rotate(&first.refresh.token).await.unwrap();
        assert_ne!(second.refresh.token, first.refresh.token);
        assert!(f
            .tokens
            .verify(&second.access.token, CredentialKind::Access)
            .await
            .is_ok());

        // The old refresh credential was overwritten, not revoked.
        assert!(!f.tokens.is_revoked(&first.refresh.token).await);
        assert_eq!(
            f.tokens.rotate(&first.refresh.token).await,
            Err(TokenError::RefreshMismatch)
        );
        assert!(f
            .events
            .events()
            .iter()
            .any(|e| e.event_type == SecurityEventType::RefreshReuse));

        assert!(f.tokens.rotate(&second.refresh.token).await.is_ok());
    }

    #[tokio::test]
    async fn test_rotate_rejects_access_credential() {
        let f = fixture();
        let pair = f.tokens.start_session("alice").await.unwrap();
        assert_eq!(
            f.tokens.rotate(&pair.access.token).await,
            Err(TokenError::SignatureInvalid)
        );
    }

    #[tokio::test]
    async fn test_rotate_requires_registered_refresh_credential() {
        let f = fixture();
        let unregistered = f.tokens.issue("alice", CredentialKind::Refresh).unwrap();
        assert_eq!(
            f.tokens.rotate(&unregistered.token).await,
            Err(TokenError::RefreshMismatch)
        );

        let session = f.tokens.start_session("alice").await.unwrap();
        assert_eq!(
            f.tokens.rotate(&unregistered.token).await,
            Err(TokenError::RefreshMismatch)
        );
        assert!(f.tokens.rotate(&session.refresh.token).await.is_ok());
    }

    #[tokio::test]
    async fn test_stale_issuance_after_revoke_all() {
        let f = fixture();
        let old = f.tokens.start_session("alice").await.unwrap();

        f.clock.advance(5);
        f.tokens.revoke_all("alice").await.unwrap();

        assert_eq!(
            f.tokens.verify(&old.access.token, CredentialKind::Access).await,
            Err(TokenError::StaleIssuance)
        );
        assert_eq!(
            f.tokens.rotate(&old.refresh.token).await,
            Err(TokenError::StaleIssuance)
        );

        let fresh = f.tokens.start_session("alice").await.unwrap();
        assert!(f
            .tokens
            .verify(&fresh.access.token, CredentialKind::Access)
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_unknown_or_inactive_subject() {
        let f = fixture();
        let ghost = f.tokens.issue("ghost", CredentialKind::Access).unwrap().token;
        assert_eq!(
            f.tokens.verify(&ghost, CredentialKind::Access).await,
            Err(TokenError::UnknownSubject)
        );

        let token = f.tokens.issue("alice", CredentialKind::Access).unwrap().token;
        f.identity.set_active("alice", false);
        assert_eq!(
            f.tokens.verify(&token, CredentialKind::Access).await,
            Err(TokenError::UnknownSubject)
        );
    }
}
