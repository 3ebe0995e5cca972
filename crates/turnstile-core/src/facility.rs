//! Facility registry and facility-local day boundaries.

use std::collections::HashMap;

use chrono::{DateTime, Days, NaiveDate, TimeZone, Utc};
use chrono_tz::Tz;

use crate::config::Config;
use crate::error::{Result, TurnstileError};

/// A physical location that admits holders.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Facility {
    /// Facility identifier.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Static, non-expiring exit credential.
    pub exit_credential: String,
    /// Timezone that defines "today".
    pub timezone: Tz,
}

impl Facility {
    /// Facility-local date at `now`.
    #[must_use]
    pub fn local_date(&self, now: DateTime<Utc>) -> NaiveDate {
        now.with_timezone(&self.timezone).date_naive()
    }

    /// UTC instant at which the facility-local day containing `now` began.
    #[must_use]
    pub fn start_of_day(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        local_midnight(self.timezone, self.local_date(now))
    }

    /// UTC instant at which the next facility-local day begins.
    #[must_use]
    pub fn end_of_day(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        let tomorrow = self
            .local_date(now)
            .checked_add_days(Days::new(1))
            .unwrap_or(NaiveDate::MAX);
        local_midnight(self.timezone, tomorrow)
    }
}

/// Midnight on `date` in `tz`. Days that skip midnight (DST gaps) start at the
/// first representable instant after it.
fn local_midnight(tz: Tz, date: NaiveDate) -> DateTime<Utc> {
    let mut candidate = date.and_time(chrono::NaiveTime::MIN);
    for _ in 0..4 {
        if let Some(start) = tz.from_local_datetime(&candidate).earliest() {
            return start.with_timezone(&Utc);
        }
        candidate += chrono::Duration::minutes(30);
    }
    candidate.and_utc()
}

/// Facilities declared in configuration, indexed by id and exit credential.
#[derive(Debug, Clone, Default)]
pub struct FacilityRegistry {
    by_id: HashMap<String, Facility>,
    by_exit_credential: HashMap<String, String>,
}

impl FacilityRegistry {
    /// Build the registry from validated configuration.
    ///
    /// # Errors
    ///
    /// Returns [`TurnstileError::ConfigValidationError`] if a timezone cannot be parsed.
    pub fn from_config(config: &Config) -> Result<Self> {
        let default_tz = parse_tz(&config.system.timezone)?;
        let mut registry = Self::default();
        for facility in &config.facilities {
            let timezone = match &facility.timezone {
                Some(tz) => parse_tz(tz)?,
                None => default_tz,
            };
            registry.insert(Facility {
                id: facility.id.clone(),
                name: facility.name.clone(),
                exit_credential: facility.exit_credential.clone(),
                timezone,
            });
        }
        Ok(registry)
    }

    /// Register a facility, replacing any previous one with the same id.
    pub fn insert(&mut self, facility: Facility) {
        if let Some(previous) = self.by_id.get(&facility.id) {
            self.by_exit_credential.remove(&previous.exit_credential);
        }
        self.by_exit_credential
            .insert(facility.exit_credential.clone(), facility.id.clone());
        self.by_id.insert(facility.id.clone(), facility);
    }

    /// Facility with `id`.
    ///
    /// # Errors
    ///
    /// [`TurnstileError::FacilityNotFound`] if unknown.
    pub fn get(&self, id: &str) -> Result<&Facility> {
        self.by_id
            .get(id)
            .ok_or_else(|| TurnstileError::FacilityNotFound(id.to_string()))
    }

    /// Facility whose exit credential is `credential`.
    #[must_use]
    pub fn by_exit_credential(&self, credential: &str) -> Option<&Facility> {
        self.by_exit_credential
            .get(credential)
            .and_then(|id| self.by_id.get(id))
    }

    /// Number of registered facilities.
    #[must_use]
    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    /// Whether no facility is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }

    /// All facilities, sorted by id.
    #[must_use]
    pub fn all(&self) -> Vec<&Facility> {
        let mut facilities: Vec<&Facility> = self.by_id.values().collect();
        facilities.sort_by(|a, b| a.id.cmp(&b.id));
        facilities
    }
}

fn parse_tz(name: &str) -> Result<Tz> {
    name.parse::<Tz>()
        .map_err(|_| TurnstileError::ConfigValidationError(format!("unknown timezone '{name}'")))
}
