//! Token lifecycle subsystem.
//!
//! # Data Flow
//! ```text
//! login → TokenManager::start_session → CredentialPair (refresh recorded in IdentityStore)
//! request → extract.rs (Bearer header, then cookie)
//!     → TokenManager::verify (decode → revocation set → subject state)
//!     → session.rs (activity record, informational)
//! refresh → TokenManager::rotate (current refresh credential must match)
//! logout → TokenManager::revoke (revocation set, TTL = remaining lifetime)
//! ```
//!
//! # Design Decisions
//! - Access and refresh credentials use separate signing secrets
//! - The revocation set lives in the shared cache and expires itself
//! - A revocation lookup that cannot reach the cache fails open and is reported
//! - Identity store errors fail closed

pub mod claims;
pub mod extract;
pub mod identity;
pub mod session;
pub mod tokens;

pub use claims::{Claims, Credential, CredentialKind, CredentialPair};
pub use extract::{extract_credential, extract_origin};
pub use identity::{IdentityError, IdentityStore, MemoryIdentityStore, SubjectRecord};
pub use session::{SessionActivity, SessionTracker};
pub use tokens::{revocation_key, TokenError, TokenManager};
