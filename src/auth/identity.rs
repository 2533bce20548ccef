//! Identity store contract.
//!
//! The identity store owns subjects; the token manager only reads a
//! subject's activity flag, its "credentials valid since" timestamp and its
//! currently registered refresh credential, and writes the latter two.

use async_trait::async_trait;
use dashmap::DashMap;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

/// What the security core needs to know about a subject.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubjectRecord {
    pub id: String,
    pub is_active: bool,
    /// Credentials issued before this Unix second are rejected.
    pub credentials_valid_since: Option<u64>,
    /// The single refresh credential that may currently be rotated.
    pub current_refresh_credential: Option<String>,
    /// Operator role, consulted by the rate-limit skip rule.
    pub role: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IdentityError {
    #[error("identity store unavailable: {0}")]
    Unavailable(String),

    #[error("unknown subject '{0}'")]
    UnknownSubject(String),
}

#[async_trait]
pub trait IdentityStore: Send + Sync {
    async fn find_subject_by_id(&self, id: &str) -> Result<Option<SubjectRecord>, IdentityError>;

    /// Register `token` as the subject's only rotatable refresh credential.
    async fn record_refresh_credential(&self, id: &str, token: &str) -> Result<(), IdentityError>;

    /// Reject every credential issued before `since` (Unix seconds).
    async fn invalidate_credentials(&self, id: &str, since: u64) -> Result<(), IdentityError>;
}

#[derive(Debug, Clone)]
struct StoredSubject {
    record: SubjectRecord,
    password_digest: [u8; 32],
}

/// In-memory identity store used by the bundled HTTP surface and tests.
#[derive(Debug, Default)]
pub struct MemoryIdentityStore {
    subjects: DashMap<String, StoredSubject>,
}

impl MemoryIdentityStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a subject.
    pub fn insert_subject(&self, id: &str, password: &str, role: Option<&str>) {
        self.subjects.insert(
            id.to_string(),
            StoredSubject {
                record: SubjectRecord {
                    id: id.to_string(),
                    is_active: true,
                    credentials_valid_since: None,
                    current_refresh_credential: None,
                    role: role.map(str::to_string),
                },
                password_digest: digest(password),
            },
        );
    }

    pub fn set_active(&self, id: &str, active: bool) {
        if let Some(mut subject) = self.subjects.get_mut(id) {
            subject.record.is_active = active;
        }
    }

    /// Compare a password against the stored digest.
    pub fn check_password(&self, id: &str, password: &str) -> bool {
        let candidate = digest(password);
        self.subjects.get(id).is_some_and(|subject| {
            subject.record.is_active && constant_time_eq(&subject.password_digest, &candidate)
        })
    }
}

fn digest(password: &str) -> [u8; 32] {
    Sha256::digest(password.as_bytes()).into()
}

/// Constant-time comparison for secrets; only the length leaks.
pub(crate) fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.ct_eq(b).into()
}

#[async_trait]
impl IdentityStore for MemoryIdentityStore {
    async fn find_subject_by_id(&self, id: &str) -> Result<Option<SubjectRecord>, IdentityError> {
        Ok(self.subjects.get(id).map(|s| s.record.clone()))
    }

    async fn record_refresh_credential(&self, id: &str, token: &str) -> Result<(), IdentityError> {
        let mut subject = self
            .subjects
            .get_mut(id)
            .ok_or_else(|| IdentityError::UnknownSubject(id.to_string()))?;
        subject.record.current_refresh_credential = Some(token.to_string());
        Ok(())
    }

    async fn invalidate_credentials(&self, id: &str, since: u64) -> Result<(), IdentityError> {
        let mut subject = self
            .subjects
            .get_mut(id)
            .ok_or_else(|| IdentityError::UnknownSubject(id.to_string()))?;
        subject.record.credentials_valid_since = Some(since);
        subject.record.current_refresh_credential = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_password_check() {
        let store = MemoryIdentityStore::new();
        store.insert_subject("alice", "correct horse", None);
        assert!(store.check_password("alice", "correct horse"));
        assert!(!store.check_password("alice", "wrong"));
        assert!(!store.check_password("bob", "correct horse"));

        store.set_active("alice", false);
        assert!(!store.check_password("alice", "correct horse"));
    }

    #[test]
    fn test_constant_time_eq() {
        assert!(constant_time_eq(b"r1.token.sig", b"r1.token.sig"));
        assert!(!constant_time_eq(b"r1.token.sig", b"r1.token.sih"));
        assert!(!constant_time_eq(b"r1.token.sig", b"r1.token"));
        assert!(constant_time_eq(b"", b""));
    }

    #[tokio::test]
    async fn test_invalidate_clears_refresh() {
        let store = MemoryIdentityStore::new();
        store.insert_subject("alice", "pw", None);
        store.record_refresh_credential("alice", "r1").await.unwrap();
        store.invalidate_credentials("alice", 42).await.unwrap();

        let record = store.find_subject_by_id("alice").await.unwrap().unwrap();
        assert_eq!(record.credentials_valid_since, Some(42));
        assert_eq!(record.current_refresh_credential, None);
        assert_eq!(
            store.record_refresh_credential("nobody", "r").await,
            Err(IdentityError::UnknownSubject("nobody".into()))
        );
    }
}
