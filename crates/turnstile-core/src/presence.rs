//! Presence derived from the check-in log.
//!
//! Per (user, facility, local day) the state machine is:
//!
//! ```text
//! NOT_ENTERED --entry--> IN_GYM --exit--> EXITED --entry--> IN_GYM
//! ```
//!
//! Nothing is stored; every answer is a fold over today's events in insertion
//! order, and the state resets at the facility's local midnight.

use std::collections::HashMap;
use std::sync::Arc;

use crate::clock::Clock;
use crate::directory::OwnerDirectory;
use crate::error::Result;
use crate::facility::FacilityRegistry;
use crate::storage::CodeStore;
use crate::types::{
    CheckInEvent, CheckInKind, DailyStats, InsideEntry, PresenceState, PresenceStatus,
};

/// Answers presence questions for facilities.
#[derive(Clone)]
pub struct PresenceTracker {
    store: Arc<dyn CodeStore>,
    facilities: Arc<FacilityRegistry>,
    owners: Arc<dyn OwnerDirectory>,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for PresenceTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PresenceTracker").finish_non_exhaustive()
    }
}

impl PresenceTracker {
    /// Create a tracker.
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

    /// Today's presence state of `user_id` at `facility_id`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::TurnstileError::FacilityNotFound`] or a storage error.
    pub fn status(&self, user_id: &str, facility_id: &str) -> Result<PresenceStatus> {
        let facility = self.facilities.get(facility_id)?;
        let since = facility.start_of_day(self.clock.now());
        let last = self
            .store
            .latest_event_for_user(user_id, facility_id, since)?;
        Ok(status_from_last(last.as_ref()))
    }

    /// Users whose last event today at `facility_id` is an entry, earliest entry first.
    ///
    /// # Errors
    ///
    /// Returns [`crate::TurnstileError::FacilityNotFound`] or a storage error.
    pub fn currently_inside(&self, facility_id: &str) -> Result<Vec<InsideEntry>> {
        let facility = self.facilities.get(facility_id)?;
        let since = facility.start_of_day(self.clock.now());
        let events = self.store.events_for_facility_since(facility_id, since)?;

        let mut inside = fold_inside(&events);
        for entry in &mut inside {
            entry.owner = self.owners.owner(&entry.user_id)?;
        }
        Ok(inside)
    }

    /// Today's counters for `facility_id`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::TurnstileError::FacilityNotFound`] or a storage error.
    pub fn daily_stats(&self, facility_id: &str) -> Result<DailyStats> {
        let facility = self.facilities.get(facility_id)?;
        let now = self.clock.now();
        let events = self
            .store
            .events_for_facility_since(facility_id, facility.start_of_day(now))?;

        let entries = events.iter().filter(|e| e.kind == CheckInKind::Entry).count();
        let exits = events.len() - entries;
        Ok(DailyStats {
            facility_id: facility_id.to_string(),
            date: facility.local_date(now),
            entries,
            exits,
            currently_inside: entries.saturating_sub(exits),
        })
    }
}

fn status_from_last(last: Option<&CheckInEvent>) -> PresenceStatus {
    match last {
        None => PresenceStatus {
            state: PresenceState::NotEntered,
            last_event_at: None,
        },
        Some(event) => PresenceStatus {
            state: match event.kind {
                CheckInKind::Entry => PresenceState::InGym,
                CheckInKind::Exit => PresenceState::Exited,
            },
            last_event_at: Some(event.occurred_at),
        },
    }
}

/// Fold events per user, keeping those whose last event is an entry.
///
/// `events` must be one facility's events in insertion order.
#[must_use]
pub fn fold_inside(events: &[CheckInEvent]) -> Vec<InsideEntry> {
    let mut last: HashMap<&str, &CheckInEvent> = HashMap::new();
    for event in events {
        last.insert(event.user_id.as_str(), event);
    }

    let mut inside: Vec<&CheckInEvent> = last
        .into_values()
        .filter(|event| event.kind == CheckInKind::Entry)
        .collect();
    inside.sort_by_key(|event| event.sequence);

    inside
        .into_iter()
        .map(|event| InsideEntry {
            user_id: event.user_id.clone(),
            entered_at: event.occurred_at,
            owner: None,
        })
        .collect()
}
