//! Replacing a code's scanner-facing value.
//!
//! Rotation keeps a code's identity (`id`, `share_token`, owner, entitlement)
//! and gives it a fresh `current_value` with `expires_at = now + ttl`. The old
//! value stops resolving as soon as the store commits the replacement.

use std::sync::Arc;

use chrono::Duration;

use crate::clock::Clock;
use crate::error::{Result, TurnstileError};
use crate::storage::{CodeStore, ReplaceOutcome, ValueReplacement};
use crate::tokens::generate_code_value;
use crate::types::AccessCode;

const MAX_ROTATE_ATTEMPTS: usize = 3;

/// Rotates access codes on request or on behalf of the sweeper.
#[derive(Clone)]
pub struct Rotator {
    store: Arc<dyn CodeStore>,
    clock: Arc<dyn Clock>,
    ttl: Duration,
}

impl std::fmt::Debug for Rotator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Rotator").field("ttl", &self.ttl).finish_non_exhaustive()
    }
}

impl Rotator {
    /// Create a rotator that extends codes by `ttl`.
    #[must_use]
    pub fn new(store: Arc<dyn CodeStore>, clock: Arc<dyn Clock>, ttl: Duration) -> Self {
        Self { store, clock, ttl }
    }

    /// Rotate the code owning `share_token`.
    ///
    /// # Errors
    ///
    /// [`TurnstileError::ShareTokenNotFound`] if no code owns the token, or a
    /// storage error.
    pub fn rotate_by_share_token(&self, share_token: &str) -> Result<AccessCode> {
        if share_token.trim().is_empty() {
            return Err(TurnstileError::InvalidInput("share_token must not be empty".into()));
        }
        let code = self
            .store
            .find_by_share_token(share_token)?
            .ok_or(TurnstileError::ShareTokenNotFound)?;
        self.rotate(&code)?.ok_or(TurnstileError::ShareTokenNotFound)
    }

    /// Give every code in `codes` a fresh value in one store write. Outcomes
    /// line up with `codes`; a [`ReplaceOutcome::Collision`] leaves that code
    /// untouched for the caller to retry.
    ///
    /// # Errors
    ///
    /// Returns a storage error; nothing is rotated in that case.
    pub fn rotate_batch(&self, codes: &[AccessCode]) -> Result<Vec<ReplaceOutcome>> {
        if codes.is_empty() {
            return Ok(Vec::new());
        }
        let now = self.clock.now();
        let replacements = codes
            .iter()
            .map(|code| ValueReplacement {
                id: code.id,
                new_value: generate_code_value(),
                rotated_at: now,
                expires_at: now + self.ttl,
            })
            .collect();

        let outcomes = self.store.replace_values(replacements)?;
        for outcome in &outcomes {
            if let ReplaceOutcome::Replaced(rotated) = outcome {
                tracing::info!(
                    code_id = %rotated.id,
                    owner_id = %rotated.owner_id,
                    expires_at = %rotated.expires_at,
                    "Rotated access code"
                );
            }
        }
        Ok(outcomes)
    }

    /// Rotate `code`. Returns `None` if the code was deleted in the meantime.
    ///
    /// # Errors
    ///
    /// Returns a storage error.
    pub fn rotate(&self, code: &AccessCode) -> Result<Option<AccessCode>> {
        let now = self.clock.now();
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self
                .store
                .replace_value(code.id, generate_code_value(), now, now + self.ttl)
            {
                Ok(Some(rotated)) => {
                    tracing::info!(
                        code_id = %rotated.id,
                        owner_id = %rotated.owner_id,
                        expires_at = %rotated.expires_at,
                        "Rotated access code"
                    );
                    return Ok(Some(rotated));
                }
                Ok(None) => {
                    tracing::debug!(code_id = %code.id, "Code vanished before rotation");
                    return Ok(None);
                }
                Err(TurnstileError::CredentialCollision) if attempt < MAX_ROTATE_ATTEMPTS => {
                    tracing::warn!(code_id = %code.id, attempt, "Rotated value collided, retrying");
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::issuer::CodeIssuer;
    use crate::storage::Storage;
    use crate::types::EntitlementRef;
    use chrono::{TimeZone, Utc};

    #[test]
    fn test_rotation_preserves_identity() {
        let store = Arc::new(Storage::in_memory());
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2025, 1, 15, 10, 0, 0).unwrap(),
        ));
        let issuer = CodeIssuer::new(store.clone(), clock.clone(), Duration::hours(1));
        let rotator = Rotator::new(store.clone(), clock.clone(), Duration::hours(1));

        let original = issuer.issue("user_1", EntitlementRef::membership("mem_1")).unwrap();
        clock.advance(Duration::minutes(50));

        let rotated = rotator.rotate_by_share_token(&original.share_token).unwrap();
        assert_eq!(rotated.id, original.id);
        assert_eq!(rotated.share_token, original.share_token);
        assert_eq!(rotated.issued_at, original.issued_at);
        assert_ne!(rotated.current_value, original.current_value);
        assert_eq!(rotated.expires_at, clock.now() + Duration::hours(1));
        assert_eq!(rotated.rotated_at, Some(clock.now()));

        assert!(store.find_by_value(&original.current_value).unwrap().is_none());
        assert_eq!(
            store.find_by_value(&rotated.current_value).unwrap().unwrap().id,
            original.id
        );
    }

    #[test]
    fn test_rotate_batch_lines_up_with_input() {
        let store = Arc::new(Storage::in_memory());
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2025, 1, 15, 10, 0, 0).unwrap(),
        ));
        let issuer = CodeIssuer::new(store.clone(), clock.clone(), Duration::hours(1));
        let rotator = Rotator::new(store.clone(), clock.clone(), Duration::hours(1));

        let first = issuer.issue("user_1", EntitlementRef::membership("mem_1")).unwrap();
        let gone = issuer.issue("user_2", EntitlementRef::membership("mem_2")).unwrap();
        let last = issuer.issue("user_3", EntitlementRef::membership("mem_3")).unwrap();
        store.delete_code(gone.id).unwrap();
        clock.advance(Duration::minutes(55));

        let outcomes = rotator
            .rotate_batch(&[first.clone(), gone, last.clone()])
            .unwrap();
        assert_eq!(outcomes.len(), 3);
        assert_eq!(outcomes[1], ReplaceOutcome::Missing);
        for (outcome, original) in [(&outcomes[0], &first), (&outcomes[2], &last)] {
            let ReplaceOutcome::Replaced(rotated) = outcome else {
                panic!("expected a rotation, got {outcome:?}");
            };
            assert_eq!(rotated.id, original.id);
            assert_ne!(rotated.current_value, original.current_value);
            assert_eq!(rotated.expires_at, clock.now() + Duration::hours(1));
        }

        assert!(rotator.rotate_batch(&[]).unwrap().is_empty());
    }

    #[test]
    fn test_unknown_share_token() {
        let store = Arc::new(Storage::in_memory());
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let rotator = Rotator::new(store, clock, Duration::hours(1));

        assert!(matches!(
            rotator.rotate_by_share_token("token_missing"),
            Err(TurnstileError::ShareTokenNotFound)
        ));
        assert!(matches!(
            rotator.rotate_by_share_token(""),
            Err(TurnstileError::InvalidInput(_))
        ));
    }
}
