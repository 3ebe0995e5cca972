//! Entry admission.
//!
//! Admitting a scanned code runs these checks in order, stopping at the first failure:
//!
//! 1. the input is well formed and the facility is known
//! 2. the value resolves to a live code (rotated-away values do not)
//! 3. the code has not expired
//! 4. the code's entitlement is valid for this facility now
//! 5. the code has no open entry at this facility
//!
//! Steps 5 and the append happen inside one store operation
//! ([`CodeStore::append_entry`]), so two concurrent scans of the same code at
//! the same facility produce exactly one entry.

use std::sync::Arc;

use crate::clock::Clock;
use crate::directory::{EntitlementChecker, OwnerDirectory};
use crate::error::{Result, TurnstileError};
use crate::facility::FacilityRegistry;
use crate::storage::{CodeStore, NewCheckIn};
use crate::tokens::is_valid_code_value;
use crate::types::{CheckInOutcome, OwnerSummary};

/// Validates scanned codes and records entries.
#[derive(Clone)]
pub struct EntryValidator {
    store: Arc<dyn CodeStore>,
    facilities: Arc<FacilityRegistry>,
    entitlements: Arc<dyn EntitlementChecker>,
    owners: Arc<dyn OwnerDirectory>,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for EntryValidator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EntryValidator")
            .field("facilities", &self.facilities.len())
            .finish_non_exhaustive()
    }
}

impl EntryValidator {
    /// Create a validator over the given collaborators.
    #[must_use]
    pub fn new(
        store: Arc<dyn CodeStore>,
        facilities: Arc<FacilityRegistry>,
        entitlements: Arc<dyn EntitlementChecker>,
        owners: Arc<dyn OwnerDirectory>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            facilities,
            entitlements,
            owners,
            clock,
        }
    }

    /// Admit the holder of `current_value` into `facility_id`.
    ///
    /// # Errors
    ///
    /// - [`TurnstileError::InvalidInput`] for empty or malformed input
    /// - [`TurnstileError::FacilityNotFound`] for an unknown facility
    /// - [`TurnstileError::CodeNotFound`] if the value resolves to nothing
    /// - [`TurnstileError::CodeExpired`] if the code has expired
    /// - [`TurnstileError::EntitlementInvalid`] if the entitlement does not admit here
    /// - [`TurnstileError::AlreadyInside`] if the code has an open entry here
    pub fn admit(
        &self,
        facility_id: &str,
        current_value: &str,
        staff_id: Option<&str>,
    ) -> Result<CheckInOutcome> {
        let facility_id = facility_id.trim();
        let current_value = current_value.trim();
        if facility_id.is_empty() {
            return Err(TurnstileError::InvalidInput("facility_id must not be empty".into()));
        }
        if current_value.is_empty() {
            return Err(TurnstileError::InvalidInput("code must not be empty".into()));
        }
        if !is_valid_code_value(current_value) {
            return Err(TurnstileError::InvalidInput("malformed access code".into()));
        }
        self.facilities.get(facility_id)?;

        let now = self.clock.now();
        let code = self.store.find_by_value(current_value)?.ok_or_else(|| {
            tracing::warn!(facility_id, "Refused entry: unknown access code");
            TurnstileError::CodeNotFound
        })?;

        if code.is_expired(now) {
            tracing::warn!(
                code_id = %code.id,
                facility_id,
                expires_at = %code.expires_at,
                "Refused entry: access code expired"
            );
            return Err(TurnstileError::CodeExpired);
        }

        let status = self.entitlements.check(&code.entitlement, facility_id, now)?;
        if let Some(reason) = status.refusal_reason() {
            tracing::warn!(
                code_id = %code.id,
                facility_id,
                entitlement_id = %code.entitlement.id,
                ?status,
                "Refused entry: entitlement not valid"
            );
            return Err(TurnstileError::EntitlementInvalid {
                reason: reason.to_string(),
            });
        }

        let event = self
            .store
            .append_entry(NewCheckIn {
                facility_id: facility_id.to_string(),
                user_id: code.owner_id.clone(),
                access_code_id: Some(code.id),
                occurred_at: now,
                validated_by: staff_id
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(str::to_string),
            })
            .map_err(|e| {
                if e.is_conflict() {
                    tracing::warn!(code_id = %code.id, facility_id, "Refused entry: already inside");
                }
                e
            })?;

        tracing::info!(
            event_id = %event.id,
            code_id = %code.id,
            user_id = %event.user_id,
            facility_id,
            validated_by = event.validated_by.as_deref().unwrap_or("-"),
            "Admitted entry"
        );

        let owner = self
            .owners
            .owner(&event.user_id)?
            .unwrap_or_else(|| OwnerSummary::anonymous(&event.user_id));
        Ok(CheckInOutcome { event, owner })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::config::{Config, FacilityConfig};
    use crate::directory::Directory;
    use crate::issuer::CodeIssuer;
    use crate::storage::Storage;
    use crate::types::{AccessCode, CheckInKind, Entitlement, EntitlementRef, EntitlementState};
    use chrono::{Duration, TimeZone, Utc};

    struct Fixture {
        clock: Arc<ManualClock>,
        directory: Arc<Directory>,
        issuer: CodeIssuer,
        validator: EntryValidator,
    }

    fn fixture() -> Fixture {
        let mut config = Config::default();
        config.facilities = vec![FacilityConfig {
            id: "gym-1".to_string(),
            name: "Main".to_string(),
            exit_credential: "exit-1".to_string(),
            timezone: None,
        }];
        let store = Arc::new(Storage::in_memory());
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2025, 1, 15, 10, 0, 0).unwrap(),
        ));
        let directory = Arc::new(Directory::in_memory());
        directory
            .upsert_entitlement(Entitlement {
                reference: EntitlementRef::membership("mem_1"),
                facility_id: "gym-1".to_string(),
                state: EntitlementState::Active,
                valid_until: None,
            })
            .unwrap();

        let issuer = CodeIssuer::new(store.clone(), clock.clone(), Duration::hours(1));
        let validator = EntryValidator::new(
            store,
            Arc::new(FacilityRegistry::from_config(&config).unwrap()),
            directory.clone(),
            directory.clone(),
            clock.clone(),
        );
        Fixture {
            clock,
            directory,
            issuer,
            validator,
        }
    }

    fn issue(f: &Fixture) -> AccessCode {
        f.issuer
            .issue("user_1", EntitlementRef::membership("mem_1"))
            .unwrap()
    }

    #[test]
    fn test_admit_records_entry_with_staff() {
        let f = fixture();
        let code = issue(&f);

        let outcome = f
            .validator
            .admit("gym-1", &code.current_value, Some("staff_7"))
            .unwrap();
        assert_eq!(outcome.event.kind, CheckInKind::Entry);
        assert_eq!(outcome.event.access_code_id, Some(code.id));
        assert_eq!(outcome.event.validated_by.as_deref(), Some("staff_7"));
        assert_eq!(outcome.owner, OwnerSummary::anonymous("user_1"));
    }

    #[test]
    fn test_admit_returns_known_owner() {
        let f = fixture();
        let owner = OwnerSummary {
            id: "user_1".to_string(),
            first_name: Some("Moussa".to_string()),
            last_name: Some("Diop".to_string()),
            photo_url: Some("https://cdn.example.com/u1.jpg".to_string()),
        };
        f.directory.upsert_owner(owner.clone()).unwrap();
        let code = issue(&f);

        let outcome = f.validator.admit("gym-1", &code.current_value, None).unwrap();
        assert_eq!(outcome.owner, owner);
        assert!(outcome.event.validated_by.is_none());
    }

    #[test]
    fn test_admit_rejects_bad_input() {
        let f = fixture();
        let code = issue(&f);
        assert!(matches!(
            f.validator.admit("", &code.current_value, None),
            Err(TurnstileError::InvalidInput(_))
        ));
        assert!(matches!(
            f.validator.admit("gym-1", "not-a-code", None),
            Err(TurnstileError::InvalidInput(_))
        ));
        assert!(matches!(
            f.validator.admit("gym-9", &code.current_value, None),
            Err(TurnstileError::FacilityNotFound(_))
        ));
    }

    #[test]
    fn test_admit_unknown_and_expired() {
        let f = fixture();
        assert!(matches!(
            f.validator.admit("gym-1", "acc_AAAAAAAAAAAAAAAAAAAAAAAA", None),
            Err(TurnstileError::CodeNotFound)
        ));

        let code = issue(&f);
        f.clock.advance(Duration::hours(1));
        assert!(matches!(
            f.validator.admit("gym-1", &code.current_value, None),
            Err(TurnstileError::CodeExpired)
        ));
    }

    #[test]
    fn test_admit_checks_entitlement() {
        let f = fixture();
        let code = issue(&f);
        f.directory
            .upsert_entitlement(Entitlement {
                reference: EntitlementRef::membership("mem_1"),
                facility_id: "gym-1".to_string(),
                state: EntitlementState::Expired,
                valid_until: None,
            })
            .unwrap();

        match f.validator.admit("gym-1", &code.current_value, None) {
            Err(TurnstileError::EntitlementInvalid { reason }) => {
                assert!(reason.contains("renewal"));
            }
            other => panic!("expected EntitlementInvalid, got {other:?}"),
        }
    }

    #[test]
    fn test_second_admit_conflicts() {
        let f = fixture();
        let code = issue(&f);
        f.validator.admit("gym-1", &code.current_value, None).unwrap();
        f.clock.advance(Duration::minutes(1));
        assert!(matches!(
            f.validator.admit("gym-1", &code.current_value, None),
            Err(TurnstileError::AlreadyInside)
        ));
    }
}
