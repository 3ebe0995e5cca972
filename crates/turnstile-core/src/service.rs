//! The [`AccessService`] facade.
//!
//! Wires storage, the directory, facilities, and the clock into the issuer,
//! rotator, validators, presence tracker, and sweeper, and exposes the
//! operations the HTTP layer calls.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::clock::{Clock, SystemClock};
use crate::config::Config;
use crate::directory::Directory;
use crate::entry::EntryValidator;
use crate::error::{Result, TurnstileError};
use crate::exit::ExitValidator;
use crate::facility::FacilityRegistry;
use crate::issuer::CodeIssuer;
use crate::presence::PresenceTracker;
use crate::rotator::Rotator;
use crate::storage::{default_data_dir, CodeStore, Storage};
use crate::sweeper::{SweepSchedule, Sweeper};
use crate::types::{
    AccessCode, CheckInOutcome, DailyStats, DisplayCode, EntitlementRef, InsideEntry,
    PresenceStatus,
};

/// Entry point for every access operation.
pub struct AccessService {
    config: Config,
    store: Arc<dyn CodeStore>,
    directory: Arc<Directory>,
    facilities: Arc<FacilityRegistry>,
    clock: Arc<dyn Clock>,
    issuer: CodeIssuer,
    rotator: Rotator,
    entry: EntryValidator,
    exit: ExitValidator,
    presence: PresenceTracker,
}

impl std::fmt::Debug for AccessService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccessService")
            .field("facilities", &self.facilities.len())
            .field("clock", &self.clock)
            .finish_non_exhaustive()
    }
}

impl AccessService {
    /// Assemble a service from explicit collaborators.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn new(
        config: Config,
        store: Arc<dyn CodeStore>,
        directory: Arc<Directory>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        config.validate()?;
        let facilities = Arc::new(FacilityRegistry::from_config(&config)?);
        let ttl = config.codes.ttl();

        let issuer = CodeIssuer::new(Arc::clone(&store), Arc::clone(&clock), ttl);
        let rotator = Rotator::new(Arc::clone(&store), Arc::clone(&clock), ttl);
        let entry = EntryValidator::new(
            Arc::clone(&store),
            Arc::clone(&facilities),
            directory.clone(),
            directory.clone(),
            Arc::clone(&clock),
        );
        let exit = ExitValidator::new(
            Arc::clone(&store),
            Arc::clone(&facilities),
            directory.clone(),
            Arc::clone(&clock),
        );
        let presence = PresenceTracker::new(
            Arc::clone(&store),
            Arc::clone(&facilities),
            directory.clone(),
            Arc::clone(&clock),
        );

        Ok(Self {
            config,
            store,
            directory,
            facilities,
            clock,
            issuer,
            rotator,
            entry,
            exit,
            presence,
        })
    }

    /// Open persistent storage and the directory under the configured data
    /// directory, using the system clock.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid or the data directory
    /// cannot be opened.
    pub fn open(config: Config) -> Result<Self> {
        let data_dir = match &config.storage.data_dir {
            Some(dir) => dir.clone(),
            None => default_data_dir()?,
        };
        let store = Arc::new(Storage::open(&data_dir)?);
        let directory = Arc::new(Directory::open(&data_dir)?);
        tracing::info!(
            data_dir = %data_dir.display(),
            facilities = config.facilities.len(),
            "Access service ready"
        );
        Self::new(config, store, directory, Arc::new(SystemClock))
    }

    /// A memory-only service, for tests and local experiments.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn in_memory(config: Config, clock: Arc<dyn Clock>) -> Result<Self> {
        Self::new(
            config,
            Arc::new(Storage::in_memory()),
            Arc::new(Directory::in_memory()),
            clock,
        )
    }

    /// The configuration this service was built from.
    #[must_use]
    pub const fn config(&self) -> &Config {
        &self.config
    }

    /// Owner and entitlement records.
    #[must_use]
    pub fn directory(&self) -> &Directory {
        &self.directory
    }

    /// Configured facilities.
    #[must_use]
    pub fn facilities(&self) -> &FacilityRegistry {
        &self.facilities
    }

    /// The current instant according to the service clock.
    #[must_use]
    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    // =========================================================================
    // ACCESS CODES
    // =========================================================================

    /// Issue a code for `owner_id` against `entitlement`.
    ///
    /// # Errors
    ///
    /// See [`CodeIssuer::issue`].
    pub fn issue(&self, owner_id: &str, entitlement: EntitlementRef) -> Result<AccessCode> {
        self.issuer.issue(owner_id, entitlement)
    }

    /// Issue a code from optional membership and session pass identifiers.
    ///
    /// # Errors
    ///
    /// See [`CodeIssuer::issue_for`].
    pub fn issue_for(
        &self,
        owner_id: &str,
        membership_id: Option<String>,
        session_pass_id: Option<String>,
    ) -> Result<AccessCode> {
        self.issuer.issue_for(owner_id, membership_id, session_pass_id)
    }

    /// The most recently issued live code of `owner_id`.
    ///
    /// # Errors
    ///
    /// [`TurnstileError::NoDisplayableCode`] if the owner has no live code.
    pub fn display(&self, owner_id: &str) -> Result<DisplayCode> {
        self.active_codes(owner_id)?
            .first()
            .map(DisplayCode::from_code)
            .ok_or_else(|| TurnstileError::NoDisplayableCode(owner_id.to_string()))
    }

    /// Rotate the code owning `share_token`.
    ///
    /// # Errors
    ///
    /// See [`Rotator::rotate_by_share_token`].
    pub fn rotate(&self, share_token: &str) -> Result<AccessCode> {
        self.rotator.rotate_by_share_token(share_token)
    }

    /// Every live code of `owner_id`, newest issuance first.
    ///
    /// # Errors
    ///
    /// Returns a storage error.
    pub fn active_codes(&self, owner_id: &str) -> Result<Vec<AccessCode>> {
        let now = self.clock.now();
        Ok(self
            .store
            .codes_for_owner(owner_id)?
            .into_iter()
            .filter(|code| !code.is_expired(now))
            .collect())
    }

    /// Hard-delete code `code_id`.
    ///
    /// Any entry still open under the code is closed in the same store
    /// operation, so the holder stops counting as inside.
    ///
    /// # Errors
    ///
    /// [`TurnstileError::CodeIdNotFound`] if no such code exists.
    pub fn revoke(&self, code_id: Uuid) -> Result<AccessCode> {
        let (code, closed) = self
            .store
            .revoke_code(code_id, self.clock.now())?
            .ok_or(TurnstileError::CodeIdNotFound(code_id))?;

        tracing::info!(
            code_id = %code.id,
            owner_id = %code.owner_id,
            closed_entries = closed.len(),
            "Revoked access code"
        );
        Ok(code)
    }

    // =========================================================================
    // CHECK-INS
    // =========================================================================

    /// Admit the holder of `current_value` into `facility_id`.
    ///
    /// # Errors
    ///
    /// See [`EntryValidator::admit`].
    pub fn admit(
        &self,
        facility_id: &str,
        current_value: &str,
        staff_id: Option<&str>,
    ) -> Result<CheckInOutcome> {
        self.entry.admit(facility_id, current_value, staff_id)
    }

    /// Record an exit at `facility_id`.
    ///
    /// # Errors
    ///
    /// See [`ExitValidator::exit`].
    pub fn exit(&self, facility_id: &str, exit_credential: &str) -> Result<CheckInOutcome> {
        self.exit.exit(facility_id, exit_credential)
    }

    /// Today's presence of `user_id` at `facility_id`.
    ///
    /// # Errors
    ///
    /// See [`PresenceTracker::status`].
    pub fn status(&self, user_id: &str, facility_id: &str) -> Result<PresenceStatus> {
        self.presence.status(user_id, facility_id)
    }

    /// Users currently inside `facility_id`.
    ///
    /// # Errors
    ///
    /// See [`PresenceTracker::currently_inside`].
    pub fn currently_inside(&self, facility_id: &str) -> Result<Vec<InsideEntry>> {
        self.presence.currently_inside(facility_id)
    }

    /// Today's counters for `facility_id`.
    ///
    /// # Errors
    ///
    /// See [`PresenceTracker::daily_stats`].
    pub fn daily_stats(&self, facility_id: &str) -> Result<DailyStats> {
        self.presence.daily_stats(facility_id)
    }

    // =========================================================================
    // MAINTENANCE
    // =========================================================================

    /// A sweeper over this service's store.
    #[must_use]
    pub fn sweeper(&self) -> Sweeper {
        Sweeper::new(
            Arc::clone(&self.store),
            self.rotator.clone(),
            Arc::clone(&self.clock),
            self.config.codes.rotation_window(),
        )
    }

    /// Tick periods from configuration.
    #[must_use]
    pub fn sweep_schedule(&self) -> SweepSchedule {
        SweepSchedule::from(&self.config.sweeper)
    }
}
