//! Owner and entitlement collaborators.
//!
//! The access core never owns membership billing or user profiles. It consults
//! two narrow seams instead: [`EntitlementChecker`] answers "is this
//! entitlement valid for facility F at time T", and [`OwnerDirectory`] returns
//! the display identity staff see at the scanner.
//!
//! [`Directory`] implements both from records pushed by the external systems,
//! optionally persisted as `directory.json` in the data directory.
//! Entitlements are keyed by kind and id together, so a membership and a
//! session pass may share an id.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Result, TurnstileError};
use crate::types::{Entitlement, EntitlementRef, EntitlementState, EntitlementStatus, OwnerSummary};

const DIRECTORY_FILE: &str = "directory.json";

/// Resolves whether an entitlement admits to a facility at a given time.
pub trait EntitlementChecker: Send + Sync {
    /// Status of `reference` for `facility_id` at `at`.
    fn check(
        &self,
        reference: &EntitlementRef,
        facility_id: &str,
        at: DateTime<Utc>,
    ) -> Result<EntitlementStatus>;
}

/// Resolves display identities for users.
pub trait OwnerDirectory: Send + Sync {
    /// Summary for `user_id`, or `None` if unknown.
    fn owner(&self, user_id: &str) -> Result<Option<OwnerSummary>>;
}

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
struct DirectoryState {
    #[serde(default)]
    owners: HashMap<String, OwnerSummary>,
    #[serde(default, with = "entitlement_list")]
    entitlements: HashMap<EntitlementRef, Entitlement>,
}

/// Entitlements are written as a list of records; the key is rebuilt from
/// each record's reference on load.
mod entitlement_list {
    use std::collections::HashMap;

    use serde::{Deserialize, Deserializer, Serializer};

    use crate::types::{Entitlement, EntitlementKind, EntitlementRef};

    pub fn serialize<S: Serializer>(
        entitlements: &HashMap<EntitlementRef, Entitlement>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        let mut records: Vec<&Entitlement> = entitlements.values().collect();
        records.sort_by(|a, b| {
            a.reference.id.cmp(&b.reference.id).then_with(|| {
                let pass = |e: &Entitlement| e.reference.kind == EntitlementKind::SessionPass;
                pass(a).cmp(&pass(b))
            })
        });
        serializer.collect_seq(records)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<HashMap<EntitlementRef, Entitlement>, D::Error> {
        let records = Vec::<Entitlement>::deserialize(deserializer)?;
        Ok(records
            .into_iter()
            .map(|entitlement| (entitlement.reference.clone(), entitlement))
            .collect())
    }
}

/// Owner and entitlement records pushed by external collaborators.
#[derive(Debug, Default)]
pub struct Directory {
    state: RwLock<DirectoryState>,
    path: Option<PathBuf>,
}

impl Directory {
    /// An empty, memory-only directory.
    #[must_use]
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Open (or create) a directory persisted under `data_dir`.
    ///
    /// # Errors
    ///
    /// Returns an error if an existing snapshot cannot be read or parsed.
    pub fn open(data_dir: impl Into<PathBuf>) -> Result<Self> {
        let path = data_dir.into().join(DIRECTORY_FILE);
        let state = if path.exists() {
            let content = std::fs::read_to_string(&path)?;
            if content.trim().is_empty() {
                DirectoryState::default()
            } else {
                serde_json::from_str(&content)?
            }
        } else {
            DirectoryState::default()
        };

        tracing::debug!(
            path = %path.display(),
            owners = state.owners.len(),
            entitlements = state.entitlements.len(),
            "Loaded directory"
        );

        Ok(Self {
            state: RwLock::new(state),
            path: Some(path),
        })
    }

    /// Insert or replace an owner summary.
    ///
    /// # Errors
    ///
    /// Returns [`TurnstileError::InvalidInput`] for an empty id, or a persistence error.
    pub fn upsert_owner(&self, owner: OwnerSummary) -> Result<()> {
        if owner.id.trim().is_empty() {
            return Err(TurnstileError::InvalidInput("owner id must not be empty".into()));
        }
        self.mutate(|state| {
            state.owners.insert(owner.id.clone(), owner);
        })
    }

    /// Remove an owner summary. Returns whether one existed.
    ///
    /// # Errors
    ///
    /// Returns an error if the snapshot cannot be written.
    pub fn remove_owner(&self, user_id: &str) -> Result<bool> {
        let mut removed = false;
        self.mutate(|state| removed = state.owners.remove(user_id).is_some())?;
        Ok(removed)
    }

    /// Insert or replace an entitlement record.
    ///
    /// # Errors
    ///
    /// Returns [`TurnstileError::InvalidInput`] for empty identifiers, or a persistence error.
    pub fn upsert_entitlement(&self, entitlement: Entitlement) -> Result<()> {
        if entitlement.reference.id.trim().is_empty() {
            return Err(TurnstileError::InvalidInput("entitlement id must not be empty".into()));
        }
        if entitlement.facility_id.trim().is_empty() {
            return Err(TurnstileError::InvalidInput("facility_id must not be empty".into()));
        }
        self.mutate(|state| {
            state
                .entitlements
                .insert(entitlement.reference.clone(), entitlement);
        })
    }

    /// Remove an entitlement record. Returns whether one existed.
    ///
    /// # Errors
    ///
    /// Returns an error if the snapshot cannot be written.
    pub fn remove_entitlement(&self, reference: &EntitlementRef) -> Result<bool> {
        let mut removed = false;
        self.mutate(|state| removed = state.entitlements.remove(reference).is_some())?;
        Ok(removed)
    }

    /// Entitlement record for `reference`.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory lock is poisoned.
    pub fn entitlement(&self, reference: &EntitlementRef) -> Result<Option<Entitlement>> {
        Ok(self.read()?.entitlements.get(reference).cloned())
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, DirectoryState>> {
        self.state
            .read()
            .map_err(|_| TurnstileError::PersistenceError("directory lock poisoned".into()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, DirectoryState>> {
        self.state
            .write()
            .map_err(|_| TurnstileError::PersistenceError("directory lock poisoned".into()))
    }

    /// Apply `change` to a copy, persist it, then commit.
    fn mutate(&self, change: impl FnOnce(&mut DirectoryState)) -> Result<()> {
        let mut state = self.write()?;
        let mut next = state.clone();
        change(&mut next);

        if let Some(path) = &self.path {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            let tmp = path.with_extension("json.tmp");
            std::fs::write(&tmp, serde_json::to_string_pretty(&next)?)?;
            std::fs::rename(&tmp, path)?;
        }

        *state = next;
        Ok(())
    }
}

impl EntitlementChecker for Directory {
    fn check(
        &self,
        reference: &EntitlementRef,
        facility_id: &str,
        at: DateTime<Utc>,
    ) -> Result<EntitlementStatus> {
        let state = self.read()?;
        Ok(state
            .entitlements
            .get(reference)
            .map_or(EntitlementStatus::Unknown, |entitlement| {
                evaluate(entitlement, facility_id, at)
            }))
    }
}

impl OwnerDirectory for Directory {
    fn owner(&self, user_id: &str) -> Result<Option<OwnerSummary>> {
        Ok(self.read()?.owners.get(user_id).cloned())
    }
}

/// Status of a known entitlement. Lifecycle state is checked before facility scope.
fn evaluate(entitlement: &Entitlement, facility_id: &str, at: DateTime<Utc>) -> EntitlementStatus {
    match entitlement.state {
        EntitlementState::Suspended => return EntitlementStatus::Suspended,
        EntitlementState::Expired => return EntitlementStatus::Expired,
        EntitlementState::Active => {}
    }
    if entitlement.valid_until.is_some_and(|until| until <= at) {
        return EntitlementStatus::Expired;
    }
    if entitlement.facility_id != facility_id {
        return EntitlementStatus::WrongFacility;
    }
    EntitlementStatus::Valid
}
