//! Access code creation.

use std::sync::Arc;

use chrono::Duration;
use uuid::Uuid;

use crate::clock::Clock;
use crate::error::{Result, TurnstileError};
use crate::storage::CodeStore;
use crate::tokens::{generate_code_value, generate_share_token};
use crate::types::{AccessCode, EntitlementRef};

/// Fresh values drawn before giving up on a collision.
const MAX_ISSUE_ATTEMPTS: usize = 3;

/// Creates access codes bound to one owner and one entitlement.
#[derive(Clone)]
pub struct CodeIssuer {
    store: Arc<dyn CodeStore>,
    clock: Arc<dyn Clock>,
    ttl: Duration,
}

impl std::fmt::Debug for CodeIssuer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CodeIssuer").field("ttl", &self.ttl).finish_non_exhaustive()
    }
}

impl CodeIssuer {
    /// Create an issuer whose codes live for `ttl`.
    #[must_use]
    pub fn new(store: Arc<dyn CodeStore>, clock: Arc<dyn Clock>, ttl: Duration) -> Self {
        Self { store, clock, ttl }
    }

    /// Issue a code for `owner_id` against `entitlement`.
    ///
    /// `expires_at` is exactly `issued_at + ttl`.
    ///
    /// # Errors
    ///
    /// Returns [`TurnstileError::InvalidInput`] for empty identifiers, or a
    /// storage error.
    pub fn issue(&self, owner_id: &str, entitlement: EntitlementRef) -> Result<AccessCode> {
        if owner_id.trim().is_empty() {
            return Err(TurnstileError::InvalidInput("owner_id must not be empty".into()));
        }
        if entitlement.id.trim().is_empty() {
            return Err(TurnstileError::InvalidInput("entitlement id must not be empty".into()));
        }

        let issued_at = self.clock.now();
        for attempt in 1..=MAX_ISSUE_ATTEMPTS {
            let code = AccessCode {
                id: Uuid::new_v4(),
                current_value: generate_code_value(),
                share_token: generate_share_token(),
                owner_id: owner_id.to_string(),
                entitlement: entitlement.clone(),
                issued_at,
                rotated_at: None,
                expires_at: issued_at + self.ttl,
            };

            match self.store.insert_code(code.clone()) {
                Ok(()) => {
                    tracing::info!(
                        code_id = %code.id,
                        owner_id = %code.owner_id,
                        entitlement_kind = ?code.entitlement.kind,
                        expires_at = %code.expires_at,
                        "Issued access code"
                    );
                    return Ok(code);
                }
                Err(TurnstileError::CredentialCollision) => {
                    tracing::warn!(attempt, "Generated credential collided, retrying");
                }
                Err(e) => return Err(e),
            }
        }

        Err(TurnstileError::PersistenceError(format!(
            "could not generate a unique credential after {MAX_ISSUE_ATTEMPTS} attempts"
        )))
    }

    /// Issue a code from the two optional entitlement identifiers callers send.
    ///
    /// # Errors
    ///
    /// Returns [`TurnstileError::InvalidInput`] unless exactly one identifier is given.
    pub fn issue_for(
        &self,
        owner_id: &str,
        membership_id: Option<String>,
        session_pass_id: Option<String>,
    ) -> Result<AccessCode> {
        let entitlement = EntitlementRef::from_parts(membership_id, session_pass_id)?;
        self.issue(owner_id, entitlement)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::storage::Storage;
    use crate::tokens::{is_valid_code_value, is_valid_share_token};
    use chrono::{TimeZone, Utc};

    fn issuer() -> (CodeIssuer, Arc<Storage>) {
        let store = Arc::new(Storage::in_memory());
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2025, 1, 15, 10, 30, 0).unwrap(),
        ));
        (
            CodeIssuer::new(store.clone(), clock, Duration::hours(1)),
            store,
        )
    }

    #[test]
    fn test_issue_sets_exact_expiry() {
        let (issuer, store) = issuer();
        let code = issuer
            .issue("user_123", EntitlementRef::membership("mem_1"))
            .unwrap();

        assert_eq!(code.expires_at, code.issued_at + Duration::hours(1));
        assert!(code.rotated_at.is_none());
        assert!(is_valid_code_value(&code.current_value));
        assert!(is_valid_share_token(&code.share_token));
        assert_eq!(store.find_by_id(code.id).unwrap(), Some(code));
    }

    #[test]
    fn test_issue_for_requires_exactly_one_entitlement() {
        let (issuer, _) = issuer();
        assert!(matches!(
            issuer.issue_for("user_1", None, None),
            Err(TurnstileError::InvalidInput(_))
        ));
        assert!(matches!(
            issuer.issue_for("user_1", Some("m".into()), Some("p".into())),
            Err(TurnstileError::InvalidInput(_))
        ));

        let code = issuer
            .issue_for("user_1", None, Some("pass_9".into()))
            .unwrap();
        assert_eq!(code.entitlement, EntitlementRef::session_pass("pass_9"));
    }

    #[test]
    fn test_issue_rejects_empty_owner() {
        let (issuer, _) = issuer();
        assert!(matches!(
            issuer.issue(" ", EntitlementRef::membership("mem_1")),
            Err(TurnstileError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_each_issue_gets_distinct_credentials() {
        let (issuer, _) = issuer();
        let a = issuer.issue("user_1", EntitlementRef::membership("mem_1")).unwrap();
        let b = issuer.issue("user_1", EntitlementRef::membership("mem_1")).unwrap();
        assert_ne!(a.id, b.id);
        assert_ne!(a.current_value, b.current_value);
        assert_ne!(a.share_token, b.share_token);
    }
}
