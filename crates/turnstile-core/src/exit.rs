//! Exit validation.
//!
//! Leaving is authenticated only by the facility's static exit credential. The
//! exit closes the most recent open entry recorded at that facility today.

use std::sync::Arc;

use crate::clock::Clock;
use crate::directory::OwnerDirectory;
use crate::error::{Result, TurnstileError};
use crate::facility::FacilityRegistry;
use crate::storage::CodeStore;
use crate::types::{CheckInOutcome, OwnerSummary};

/// Records exits against open entries.
#[derive(Clone)]
pub struct ExitValidator {
    store: Arc<dyn CodeStore>,
    facilities: Arc<FacilityRegistry>,
    owners: Arc<dyn OwnerDirectory>,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for ExitValidator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExitValidator").finish_non_exhaustive()
    }
}

impl ExitValidator {
    /// Create an exit validator.
    #[must_use]
    pub fn new(
        store: Arc<dyn CodeStore>,
        facilities: Arc<FacilityRegistry>,
        owners: Arc<dyn OwnerDirectory>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            facilities,
            owners,
            clock,
        }
    }

    /// Record an exit at `facility_id` presented with `exit_credential`.
    ///
    /// # Errors
    ///
    /// - [`TurnstileError::InvalidInput`] for empty input
    /// - [`TurnstileError::ExitCredentialInvalid`] if the credential matches no
    ///   facility or a different one
    /// - [`TurnstileError::NoActiveEntry`] if nobody entered today and is still inside
    pub fn exit(&self, facility_id: &str, exit_credential: &str) -> Result<CheckInOutcome> {
        let facility_id = facility_id.trim();
        let exit_credential = exit_credential.trim();
        if facility_id.is_empty() || exit_credential.is_empty() {
            return Err(TurnstileError::InvalidInput(
                "facility_id and exit credential are required".into(),
            ));
        }

        let facility = self
            .facilities
            .by_exit_credential(exit_credential)
            .filter(|facility| facility.id == facility_id)
            .ok_or_else(|| {
                tracing::warn!(facility_id, "Refused exit: credential does not match facility");
                TurnstileError::ExitCredentialInvalid
            })?;

        let now = self.clock.now();
        let since = facility.start_of_day(now);
        let event = self
            .store
            .close_latest_open_entry(&facility.id, since, now)
            .map_err(|e| {
                if matches!(e, TurnstileError::NoActiveEntry) {
                    tracing::warn!(facility_id, "Refused exit: no open entry today");
                }
                e
            })?;

        tracing::info!(
            event_id = %event.id,
            user_id = %event.user_id,
            facility_id,
            "Recorded exit"
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
    use crate::storage::{NewCheckIn, Storage};
    use crate::types::CheckInKind;
    use chrono::{Duration, TimeZone, Utc};
    use uuid::Uuid;

    fn setup() -> (ExitValidator, Arc<Storage>, Arc<ManualClock>) {
        let mut config = Config::default();
        config.facilities = vec![
            FacilityConfig {
                id: "gym-1".to_string(),
                name: String::new(),
                exit_credential: "exit_gym_12345".to_string(),
                timezone: None,
            },
            FacilityConfig {
                id: "gym-2".to_string(),
                name: String::new(),
                exit_credential: "exit_gym_67890".to_string(),
                timezone: None,
            },
        ];
        let store = Arc::new(Storage::in_memory());
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2025, 1, 15, 10, 0, 0).unwrap(),
        ));
        let validator = ExitValidator::new(
            store.clone(),
            Arc::new(FacilityRegistry::from_config(&config).unwrap()),
            Arc::new(Directory::in_memory()),
            clock.clone(),
        );
        (validator, store, clock)
    }

    fn enter(store: &Storage, clock: &ManualClock, user: &str) -> Uuid {
        let code_id = Uuid::new_v4();
        store
            .append_entry(NewCheckIn {
                facility_id: "gym-1".to_string(),
                user_id: user.to_string(),
                access_code_id: Some(code_id),
                occurred_at: clock.now(),
                validated_by: None,
            })
            .unwrap();
        code_id
    }

    #[test]
    fn test_exit_closes_latest_entry() {
        let (validator, store, clock) = setup();
        enter(&store, &clock, "user_a");
        clock.advance(Duration::minutes(1));
        let b = enter(&store, &clock, "user_b");

        let outcome = validator.exit("gym-1", "exit_gym_12345").unwrap();
        assert_eq!(outcome.event.kind, CheckInKind::Exit);
        assert_eq!(outcome.event.user_id, "user_b");
        assert_eq!(outcome.event.access_code_id, Some(b));
        assert_eq!(outcome.owner, OwnerSummary::anonymous("user_b"));

        assert_eq!(validator.exit("gym-1", "exit_gym_12345").unwrap().event.user_id, "user_a");
        assert!(matches!(
            validator.exit("gym-1", "exit_gym_12345"),
            Err(TurnstileError::NoActiveEntry)
        ));
    }

    #[test]
    fn test_exit_rejects_wrong_credential() {
        let (validator, store, clock) = setup();
        enter(&store, &clock, "user_a");

        assert!(matches!(
            validator.exit("gym-1", "exit_unknown"),
            Err(TurnstileError::ExitCredentialInvalid)
        ));
        // Valid credential, but for another facility.
        assert!(matches!(
            validator.exit("gym-1", "exit_gym_67890"),
            Err(TurnstileError::ExitCredentialInvalid)
        ));
        assert!(matches!(
            validator.exit("gym-1", ""),
            Err(TurnstileError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_exit_ignores_yesterdays_entries() {
        let (validator, store, clock) = setup();
        enter(&store, &clock, "user_a");
        clock.advance(Duration::days(1));

        assert!(matches!(
            validator.exit("gym-1", "exit_gym_12345"),
            Err(TurnstileError::NoActiveEntry)
        ));
    }
}
