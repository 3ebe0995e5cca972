//! Keyed storage for access codes and check-in events.
//!
//! [`CodeStore`] is the seam the components talk to. [`Storage`] implements it
//! in memory with optional JSON persistence under a data directory:
//!
//! - `access_codes.json` - pretty-printed snapshot of every live code record
//! - `check_ins.jsonl` - append-only log, one event per line
//!
//! All mutations take one write lock. Inside it the store keeps an index of
//! open entries keyed by `(code id, facility id)` that holds at most one event
//! per key; [`CodeStore::append_entry`] checks and updates that index in the
//! same critical section that appends the event.
//!
//! Events are also indexed per facility. While a facility's events arrive with
//! non-decreasing `occurred_at`, day queries binary-search that index for
//! `since` and only touch the tail.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fs::OpenOptions;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::{Result, TurnstileError};
use crate::types::{AccessCode, CheckInEvent, CheckInKind};

const CODES_FILE: &str = "access_codes.json";
const EVENTS_FILE: &str = "check_ins.jsonl";

/// An event about to be appended; the store assigns `id` and `sequence`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewCheckIn {
    /// Facility the event happens at.
    pub facility_id: String,
    /// The holder.
    pub user_id: String,
    /// Code the event is recorded against.
    pub access_code_id: Option<Uuid>,
    /// When the event happens.
    pub occurred_at: DateTime<Utc>,
    /// Staff member who scanned the code.
    pub validated_by: Option<String>,
}

/// A new value for one code, applied by [`CodeStore::replace_values`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValueReplacement {
    /// Code to rotate.
    pub id: Uuid,
    /// Value the code carries from now on.
    pub new_value: String,
    /// When the rotation happens.
    pub rotated_at: DateTime<Utc>,
    /// New expiry.
    pub expires_at: DateTime<Utc>,
}

/// What happened to one [`ValueReplacement`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplaceOutcome {
    /// The code now carries the new value.
    Replaced(AccessCode),
    /// The code no longer exists.
    Missing,
    /// The new value is already taken; the code is untouched.
    Collision,
}

/// Durable keyed storage for access codes and check-in events. No business rules
/// live here beyond the uniqueness constraints the records carry.
pub trait CodeStore: Send + Sync {
    /// Insert a new code.
    ///
    /// # Errors
    ///
    /// [`TurnstileError::CredentialCollision`] if the value or share token is taken.
    fn insert_code(&self, code: AccessCode) -> Result<()>;

    /// Code currently carrying `value`.
    fn find_by_value(&self, value: &str) -> Result<Option<AccessCode>>;

    /// Code owning `share_token`.
    fn find_by_share_token(&self, share_token: &str) -> Result<Option<AccessCode>>;

    /// Code with identity `id`.
    fn find_by_id(&self, id: Uuid) -> Result<Option<AccessCode>>;

    /// Every code owned by `owner_id`, newest issuance first.
    fn codes_for_owner(&self, owner_id: &str) -> Result<Vec<AccessCode>>;

    /// Codes with `after < expires_at <= until`.
    fn codes_expiring_between(
        &self,
        after: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> Result<Vec<AccessCode>>;

    /// Apply a batch of value replacements in one write. Outcomes line up with
    /// `replacements`. `id`, share token, and owner are untouched.
    fn replace_values(&self, replacements: Vec<ValueReplacement>) -> Result<Vec<ReplaceOutcome>>;

    /// Replace the value of code `id` and move its expiry. Returns `None` if the
    /// code no longer exists.
    ///
    /// # Errors
    ///
    /// [`TurnstileError::CredentialCollision`] if `new_value` is taken.
    fn replace_value(
        &self,
        id: Uuid,
        new_value: String,
        rotated_at: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> Result<Option<AccessCode>> {
        let outcome = self
            .replace_values(vec![ValueReplacement {
                id,
                new_value,
                rotated_at,
                expires_at,
            }])?
            .pop();
        match outcome {
            Some(ReplaceOutcome::Replaced(code)) => Ok(Some(code)),
            Some(ReplaceOutcome::Collision) => Err(TurnstileError::CredentialCollision),
            Some(ReplaceOutcome::Missing) | None => Ok(None),
        }
    }

    /// Hard-delete code `id`, returning the removed record.
    fn delete_code(&self, id: Uuid) -> Result<Option<AccessCode>>;

    /// Close every open entry recorded against code `id`, then delete the code,
    /// as one operation. Returns the removed record and the exits appended, or
    /// `None` if the code does not exist.
    fn revoke_code(
        &self,
        id: Uuid,
        occurred_at: DateTime<Utc>,
    ) -> Result<Option<(AccessCode, Vec<CheckInEvent>)>>;

    /// Delete every code with `expires_at <= now`, returning how many went.
    fn delete_expired(&self, now: DateTime<Utc>) -> Result<usize>;

    /// Append an entry unless the code already has an open entry at the facility.
    ///
    /// # Errors
    ///
    /// - [`TurnstileError::CodeNotFound`] if the code no longer exists
    /// - [`TurnstileError::AlreadyInside`] when an unmatched entry exists
    fn append_entry(&self, entry: NewCheckIn) -> Result<CheckInEvent>;

    /// Close the most recent open entry at `facility_id` recorded at or after
    /// `since`, appending an exit for the same user and code.
    ///
    /// # Errors
    ///
    /// [`TurnstileError::NoActiveEntry`] when nothing is open.
    fn close_latest_open_entry(
        &self,
        facility_id: &str,
        since: DateTime<Utc>,
        occurred_at: DateTime<Utc>,
    ) -> Result<CheckInEvent>;

    /// Events at `facility_id` with `occurred_at >= since`, in insertion order.
    fn events_for_facility_since(
        &self,
        facility_id: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<CheckInEvent>>;

    /// Most recently inserted event for the user at the facility since `since`.
    fn latest_event_for_user(
        &self,
        user_id: &str,
        facility_id: &str,
        since: DateTime<Utc>,
    ) -> Result<Option<CheckInEvent>>;
}

/// Indices into `events` for one facility, in insertion order.
#[derive(Debug)]
struct FacilityLog {
    events: Vec<usize>,
    /// `occurred_at` is non-decreasing along `events`.
    ordered: bool,
}

impl Default for FacilityLog {
    fn default() -> Self {
        Self {
            events: Vec::new(),
            ordered: true,
        }
    }
}

impl FacilityLog {
    fn push(&mut self, index: usize, events: &[CheckInEvent]) {
        if let Some(&last) = self.events.last() {
            if events[last].occurred_at > events[index].occurred_at {
                self.ordered = false;
            }
        }
        self.events.push(index);
    }

    /// Indices that can hold events at or after `since`. Callers still filter.
    fn tail(&self, events: &[CheckInEvent], since: DateTime<Utc>) -> &[usize] {
        if !self.ordered {
            return &self.events;
        }
        let start = self
            .events
            .partition_point(|&index| events[index].occurred_at < since);
        &self.events[start..]
    }
}

/// In-memory state plus the indexes derived from it.
#[derive(Debug, Default)]
struct StoreState {
    codes: BTreeMap<Uuid, AccessCode>,
    by_value: HashMap<String, Uuid>,
    by_share_token: HashMap<String, Uuid>,
    events: Vec<CheckInEvent>,
    /// `(code id, facility id)` -> index into `events` of the unmatched entry.
    open_entries: HashMap<(Uuid, String), usize>,
    facility_logs: HashMap<String, FacilityLog>,
    next_sequence: u64,
}

impl StoreState {
    fn index_code(&mut self, code: &AccessCode) {
        self.by_value.insert(code.current_value.clone(), code.id);
        self.by_share_token.insert(code.share_token.clone(), code.id);
    }

    fn unindex_code(&mut self, code: &AccessCode) {
        self.by_value.remove(&code.current_value);
        self.by_share_token.remove(&code.share_token);
    }

    /// Fold one event into the facility and open-entry indexes.
    fn track(&mut self, index: usize) {
        let event = &self.events[index];
        self.facility_logs
            .entry(event.facility_id.clone())
            .or_default()
            .push(index, &self.events);
        let Some(code_id) = event.access_code_id else {
            return;
        };
        let key = (code_id, event.facility_id.clone());
        match event.kind {
            CheckInKind::Entry => {
                self.open_entries.insert(key, index);
            }
            CheckInKind::Exit => {
                self.open_entries.remove(&key);
            }
        }
    }

    fn build_event(&self, new: NewCheckIn, kind: CheckInKind) -> CheckInEvent {
        CheckInEvent {
            id: Uuid::now_v7(),
            sequence: self.next_sequence,
            facility_id: new.facility_id,
            user_id: new.user_id,
            access_code_id: new.access_code_id,
            kind,
            occurred_at: new.occurred_at,
            validated_by: new.validated_by,
        }
    }

    /// Exits closing every open entry of `code_id`, oldest entry first.
    fn closing_exits(&self, code_id: Uuid, occurred_at: DateTime<Utc>) -> Vec<CheckInEvent> {
        let mut open: Vec<&CheckInEvent> = self
            .open_entries
            .iter()
            .filter(|((id, _), _)| *id == code_id)
            .map(|(_, &index)| &self.events[index])
            .collect();
        open.sort_by_key(|event| event.sequence);

        open.into_iter()
            .zip(self.next_sequence..)
            .map(|(entry, sequence)| CheckInEvent {
                sequence,
                ..self.build_event(
                    NewCheckIn {
                        facility_id: entry.facility_id.clone(),
                        user_id: entry.user_id.clone(),
                        access_code_id: entry.access_code_id,
                        occurred_at,
                        validated_by: None,
                    },
                    CheckInKind::Exit,
                )
            })
            .collect()
    }
}

/// Storage backend for access codes and check-in events.
#[derive(Debug)]
pub struct Storage {
    state: RwLock<StoreState>,
    data_dir: Option<PathBuf>,
}

impl Storage {
    /// Create a store that keeps everything in memory.
    #[must_use]
    pub fn in_memory() -> Self {
        Self {
            state: RwLock::new(StoreState {
                next_sequence: 1,
                ..StoreState::default()
            }),
            data_dir: None,
        }
    }

    /// Open (or create) a persistent store under `data_dir`.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created or existing files
    /// cannot be parsed.
    pub fn open(data_dir: impl Into<PathBuf>) -> Result<Self> {
        let data_dir = data_dir.into();
        std::fs::create_dir_all(&data_dir).map_err(|e| {
            TurnstileError::PersistenceError(format!(
                "Failed to create directory {}: {e}",
                data_dir.display()
            ))
        })?;

        let mut state = StoreState {
            next_sequence: 1,
            ..StoreState::default()
        };

        for code in load_codes(&data_dir.join(CODES_FILE))? {
            state.index_code(&code);
            state.codes.insert(code.id, code);
        }

        state.events = load_events(&data_dir.join(EVENTS_FILE))?;
        state.events.sort_by_key(|event| event.sequence);
        for index in 0..state.events.len() {
            state.track(index);
        }
        state.next_sequence = state.events.last().map_or(1, |event| event.sequence + 1);

        tracing::info!(
            data_dir = %data_dir.display(),
            codes = state.codes.len(),
            events = state.events.len(),
            open_entries = state.open_entries.len(),
            "Opened access code storage"
        );

        Ok(Self {
            state: RwLock::new(state),
            data_dir: Some(data_dir),
        })
    }

    /// Directory the store persists to, if any.
    #[must_use]
    pub fn data_dir(&self) -> Option<&Path> {
        self.data_dir.as_deref()
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, StoreState>> {
        self.state
            .read()
            .map_err(|_| TurnstileError::PersistenceError("storage lock poisoned".into()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, StoreState>> {
        self.state
            .write()
            .map_err(|_| TurnstileError::PersistenceError("storage lock poisoned".into()))
    }

    /// Write the full code snapshot. Called with the write lock held, before the
    /// in-memory state is committed.
    fn persist_codes(&self, codes: &BTreeMap<Uuid, AccessCode>) -> Result<()> {
        let Some(dir) = &self.data_dir else {
            return Ok(());
        };
        let records: Vec<&AccessCode> = codes.values().collect();
        let content = serde_json::to_string_pretty(&records)?;
        let path = dir.join(CODES_FILE);
        let tmp = dir.join(format!("{CODES_FILE}.tmp"));
        std::fs::write(&tmp, content)?;
        std::fs::rename(&tmp, &path)?;
        Ok(())
    }

    /// Append events to the log. Called with the write lock held, before the
    /// events are pushed in memory.
    fn persist_events(&self, events: &[CheckInEvent]) -> Result<()> {
        let Some(dir) = &self.data_dir else {
            return Ok(());
        };
        let mut lines = String::new();
        for event in events {
            lines.push_str(&serde_json::to_string(event)?);
            lines.push('\n');
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(dir.join(EVENTS_FILE))?;
        file.write_all(lines.as_bytes())?;
        file.sync_data()?;
        Ok(())
    }

    /// Persist then commit a batch of events built against `state`.
    fn commit_events(&self, state: &mut StoreState, events: Vec<CheckInEvent>) -> Result<()> {
        if events.is_empty() {
            return Ok(());
        }
        self.persist_events(&events)?;
        for event in events {
            state.next_sequence = event.sequence + 1;
            state.events.push(event);
            let index = state.events.len() - 1;
            state.track(index);
        }
        Ok(())
    }
}

impl CodeStore for Storage {
    fn insert_code(&self, code: AccessCode) -> Result<()> {
        let mut state = self.write()?;
        if state.by_value.contains_key(&code.current_value)
            || state.by_share_token.contains_key(&code.share_token)
            || state.codes.contains_key(&code.id)
        {
            return Err(TurnstileError::CredentialCollision);
        }

        let mut next = state.codes.clone();
        next.insert(code.id, code.clone());
        self.persist_codes(&next)?;

        state.index_code(&code);
        state.codes = next;
        Ok(())
    }

    fn find_by_value(&self, value: &str) -> Result<Option<AccessCode>> {
        let state = self.read()?;
        Ok(state
            .by_value
            .get(value)
            .and_then(|id| state.codes.get(id))
            .cloned())
    }

    fn find_by_share_token(&self, share_token: &str) -> Result<Option<AccessCode>> {
        let state = self.read()?;
        Ok(state
            .by_share_token
            .get(share_token)
            .and_then(|id| state.codes.get(id))
            .cloned())
    }

    fn find_by_id(&self, id: Uuid) -> Result<Option<AccessCode>> {
        Ok(self.read()?.codes.get(&id).cloned())
    }

    fn codes_for_owner(&self, owner_id: &str) -> Result<Vec<AccessCode>> {
        let state = self.read()?;
        let mut codes: Vec<AccessCode> = state
            .codes
            .values()
            .filter(|code| code.owner_id == owner_id)
            .cloned()
            .collect();
        codes.sort_by(|a, b| b.issued_at.cmp(&a.issued_at));
        Ok(codes)
    }

    fn codes_expiring_between(
        &self,
        after: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> Result<Vec<AccessCode>> {
        let state = self.read()?;
        Ok(state
            .codes
            .values()
            .filter(|code| after < code.expires_at && code.expires_at <= until)
            .cloned()
            .collect())
    }

    fn replace_values(&self, replacements: Vec<ValueReplacement>) -> Result<Vec<ReplaceOutcome>> {
        let mut state = self.write()?;
        let mut next = state.codes.clone();
        let mut claimed = HashSet::new();
        let mut moved = Vec::new();
        let mut outcomes = Vec::with_capacity(replacements.len());

        for replacement in replacements {
            let Some(current) = next.get(&replacement.id) else {
                outcomes.push(ReplaceOutcome::Missing);
                continue;
            };
            if state.by_value.contains_key(&replacement.new_value)
                || !claimed.insert(replacement.new_value.clone())
            {
                outcomes.push(ReplaceOutcome::Collision);
                continue;
            }

            let updated = AccessCode {
                current_value: replacement.new_value,
                rotated_at: Some(replacement.rotated_at),
                expires_at: replacement.expires_at,
                ..current.clone()
            };
            moved.push((current.current_value.clone(), updated.current_value.clone(), updated.id));
            next.insert(updated.id, updated.clone());
            outcomes.push(ReplaceOutcome::Replaced(updated));
        }

        if moved.is_empty() {
            return Ok(outcomes);
        }
        self.persist_codes(&next)?;

        for (old_value, new_value, id) in moved {
            state.by_value.remove(&old_value);
            state.by_value.insert(new_value, id);
        }
        state.codes = next;
        Ok(outcomes)
    }

    fn delete_code(&self, id: Uuid) -> Result<Option<AccessCode>> {
        let mut state = self.write()?;
        if !state.codes.contains_key(&id) {
            return Ok(None);
        }

        let mut next = state.codes.clone();
        let removed = next.remove(&id);
        self.persist_codes(&next)?;

        if let Some(code) = &removed {
            state.unindex_code(code);
        }
        state.codes = next;
        Ok(removed)
    }

    fn revoke_code(
        &self,
        id: Uuid,
        occurred_at: DateTime<Utc>,
    ) -> Result<Option<(AccessCode, Vec<CheckInEvent>)>> {
        let mut state = self.write()?;
        let Some(code) = state.codes.get(&id).cloned() else {
            return Ok(None);
        };

        // Exits go to the log before the code leaves the snapshot.
        let exits = state.closing_exits(id, occurred_at);
        self.commit_events(&mut state, exits.clone())?;

        let mut next = state.codes.clone();
        next.remove(&id);
        self.persist_codes(&next)?;

        state.unindex_code(&code);
        state.codes = next;
        Ok(Some((code, exits)))
    }

    fn delete_expired(&self, now: DateTime<Utc>) -> Result<usize> {
        let mut state = self.write()?;
        let expired: Vec<AccessCode> = state
            .codes
            .values()
            .filter(|code| code.is_expired(now))
            .cloned()
            .collect();
        if expired.is_empty() {
            return Ok(0);
        }

        let mut next = state.codes.clone();
        for code in &expired {
            next.remove(&code.id);
        }
        self.persist_codes(&next)?;

        for code in &expired {
            state.unindex_code(code);
        }
        state.codes = next;
        Ok(expired.len())
    }

    fn append_entry(&self, entry: NewCheckIn) -> Result<CheckInEvent> {
        let code_id = entry.access_code_id.ok_or_else(|| {
            TurnstileError::InvalidInput("entry events require an access code".into())
        })?;

        let mut state = self.write()?;
        if !state.codes.contains_key(&code_id) {
            return Err(TurnstileError::CodeNotFound);
        }
        if state
            .open_entries
            .contains_key(&(code_id, entry.facility_id.clone()))
        {
            return Err(TurnstileError::AlreadyInside);
        }

        let event = state.build_event(entry, CheckInKind::Entry);
        self.commit_events(&mut state, vec![event.clone()])?;
        Ok(event)
    }

    fn close_latest_open_entry(
        &self,
        facility_id: &str,
        since: DateTime<Utc>,
        occurred_at: DateTime<Utc>,
    ) -> Result<CheckInEvent> {
        let mut state = self.write()?;
        let latest = state
            .open_entries
            .iter()
            .filter(|((_, facility), _)| facility == facility_id)
            .map(|(_, &index)| &state.events[index])
            .filter(|event| event.occurred_at >= since)
            .max_by_key(|event| event.sequence)
            .cloned()
            .ok_or(TurnstileError::NoActiveEntry)?;

        let exit = state.build_event(
            NewCheckIn {
                facility_id: latest.facility_id,
                user_id: latest.user_id,
                access_code_id: latest.access_code_id,
                occurred_at,
                validated_by: None,
            },
            CheckInKind::Exit,
        );
        self.commit_events(&mut state, vec![exit.clone()])?;
        Ok(exit)
    }

    fn events_for_facility_since(
        &self,
        facility_id: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<CheckInEvent>> {
        let state = self.read()?;
        let Some(log) = state.facility_logs.get(facility_id) else {
            return Ok(Vec::new());
        };
        Ok(log
            .tail(&state.events, since)
            .iter()
            .map(|&index| &state.events[index])
            .filter(|event| event.occurred_at >= since)
            .cloned()
            .collect())
    }

    fn latest_event_for_user(
        &self,
        user_id: &str,
        facility_id: &str,
        since: DateTime<Utc>,
    ) -> Result<Option<CheckInEvent>> {
        let state = self.read()?;
        let Some(log) = state.facility_logs.get(facility_id) else {
            return Ok(None);
        };
        Ok(log
            .tail(&state.events, since)
            .iter()
            .rev()
            .map(|&index| &state.events[index])
            .find(|event| event.user_id == user_id && event.occurred_at >= since)
            .cloned())
    }
}

/// Get the default data directory.
///
/// On Linux servers: `/var/lib/turnstile/`
/// Elsewhere: the platform data directory.
///
/// # Errors
///
/// Returns an error if no data directory can be determined for the platform.
pub fn default_data_dir() -> Result<PathBuf> {
    #[cfg(target_os = "linux")]
    {
        Ok(PathBuf::from("/var/lib/turnstile"))
    }
    #[cfg(not(target_os = "linux"))]
    {
        let dirs = directories::ProjectDirs::from("", "", "turnstile").ok_or_else(|| {
            TurnstileError::PersistenceError("Cannot determine data directory".into())
        })?;
        Ok(dirs.data_dir().to_path_buf())
    }
}

fn load_codes(path: &Path) -> Result<Vec<AccessCode>> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let content = std::fs::read_to_string(path)?;
    if content.trim().is_empty() {
        return Ok(Vec::new());
    }
    Ok(serde_json::from_str(&content)?)
}

fn load_events(path: &Path) -> Result<Vec<CheckInEvent>> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let reader = BufReader::new(std::fs::File::open(path)?);
    let mut events = Vec::new();
    for line in reader.lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        events.push(serde_json::from_str(&line)?);
    }
    Ok(events)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::EntitlementRef;
    use chrono::{Duration, TimeZone};
    use tempfile::TempDir;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, 15, 8, 0, 0).unwrap()
    }

    fn code(value: &str, token: &str, expires_at: DateTime<Utc>) -> AccessCode {
        AccessCode {
            id: Uuid::new_v4(),
            current_value: value.to_string(),
            share_token: token.to_string(),
            owner_id: "user_1".to_string(),
            entitlement: EntitlementRef::membership("mem_1"),
            issued_at: expires_at - Duration::hours(1),
            rotated_at: None,
            expires_at,
        }
    }

    fn entry(code: &AccessCode, facility: &str, at: DateTime<Utc>) -> NewCheckIn {
        NewCheckIn {
            facility_id: facility.to_string(),
            user_id: code.owner_id.clone(),
            access_code_id: Some(code.id),
            occurred_at: at,
            validated_by: Some("staff_1".to_string()),
        }
    }

    #[test]
    fn test_insert_and_lookup() {
        let store = Storage::in_memory();
        let record = code("acc_a", "token_a", t0() + Duration::hours(1));
        store.insert_code(record.clone()).unwrap();

        assert_eq!(store.find_by_value("acc_a").unwrap(), Some(record.clone()));
        assert_eq!(store.find_by_share_token("token_a").unwrap(), Some(record.clone()));
        assert_eq!(store.find_by_id(record.id).unwrap(), Some(record));
        assert!(store.find_by_value("acc_b").unwrap().is_none());
    }

    #[test]
    fn test_insert_rejects_duplicate_value() {
        let store = Storage::in_memory();
        store
            .insert_code(code("acc_a", "token_a", t0() + Duration::hours(1)))
            .unwrap();
        let err = store
            .insert_code(code("acc_a", "token_b", t0() + Duration::hours(1)))
            .unwrap_err();
        assert!(matches!(err, TurnstileError::CredentialCollision));
    }

    #[test]
    fn test_replace_value_reindexes() {
        let store = Storage::in_memory();
        let record = code("acc_a", "token_a", t0() + Duration::hours(1));
        store.insert_code(record.clone()).unwrap();

        let rotated = store
            .replace_value(record.id, "acc_b".into(), t0(), t0() + Duration::hours(1))
            .unwrap()
            .unwrap();
        assert_eq!(rotated.id, record.id);
        assert_eq!(rotated.share_token, record.share_token);
        assert!(store.find_by_value("acc_a").unwrap().is_none());
        assert_eq!(store.find_by_value("acc_b").unwrap().unwrap().id, record.id);

        assert!(store
            .replace_value(Uuid::new_v4(), "acc_c".into(), t0(), t0())
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_delete_expired_boundary() {
        let store = Storage::in_memory();
        store.insert_code(code("acc_past", "token_1", t0() - Duration::seconds(1))).unwrap();
        store.insert_code(code("acc_now", "token_2", t0())).unwrap();
        store.insert_code(code("acc_future", "token_3", t0() + Duration::seconds(1))).unwrap();

        assert_eq!(store.delete_expired(t0()).unwrap(), 2);
        assert!(store.find_by_value("acc_past").unwrap().is_none());
        assert!(store.find_by_value("acc_now").unwrap().is_none());
        assert!(store.find_by_value("acc_future").unwrap().is_some());
    }

    #[test]
    fn test_open_entry_uniqueness() {
        let store = Storage::in_memory();
        let record = code("acc_a", "token_a", t0() + Duration::hours(1));
        store.insert_code(record.clone()).unwrap();

        store.append_entry(entry(&record, "gym-1", t0())).unwrap();
        let err = store.append_entry(entry(&record, "gym-1", t0())).unwrap_err();
        assert!(matches!(err, TurnstileError::AlreadyInside));

        // A different facility has its own open-entry slot.
        store.append_entry(entry(&record, "gym-2", t0())).unwrap();

        store
            .close_latest_open_entry("gym-1", t0(), t0() + Duration::minutes(1))
            .unwrap();
        store
            .append_entry(entry(&record, "gym-1", t0() + Duration::minutes(2)))
            .unwrap();
    }

    #[test]
    fn test_close_latest_picks_highest_sequence() {
        let store = Storage::in_memory();
        let first = code("acc_a", "token_a", t0() + Duration::hours(1));
        let second = code("acc_b", "token_b", t0() + Duration::hours(1));
        store.insert_code(first.clone()).unwrap();
        store.insert_code(second.clone()).unwrap();

        // Same timestamp: insertion order decides.
        store.append_entry(entry(&first, "gym-1", t0())).unwrap();
        store.append_entry(entry(&second, "gym-1", t0())).unwrap();

        let exit = store.close_latest_open_entry("gym-1", t0(), t0()).unwrap();
        assert_eq!(exit.access_code_id, Some(second.id));
        assert_eq!(exit.kind, CheckInKind::Exit);

        let exit = store.close_latest_open_entry("gym-1", t0(), t0()).unwrap();
        assert_eq!(exit.access_code_id, Some(first.id));

        let err = store.close_latest_open_entry("gym-1", t0(), t0()).unwrap_err();
        assert!(matches!(err, TurnstileError::NoActiveEntry));
    }

    #[test]
    fn test_close_latest_ignores_entries_before_since() {
        let store = Storage::in_memory();
        let record = code("acc_a", "token_a", t0() + Duration::hours(30));
        store.insert_code(record.clone()).unwrap();
        store
            .append_entry(entry(&record, "gym-1", t0() - Duration::days(1)))
            .unwrap();

        let err = store.close_latest_open_entry("gym-1", t0(), t0()).unwrap_err();
        assert!(matches!(err, TurnstileError::NoActiveEntry));
    }

    #[test]
    fn test_sequences_are_monotonic() {
        let store = Storage::in_memory();
        let record = code("acc_a", "token_a", t0() + Duration::hours(1));
        store.insert_code(record.clone()).unwrap();

        let a = store.append_entry(entry(&record, "gym-1", t0())).unwrap();
        let b = store.close_latest_open_entry("gym-1", t0(), t0()).unwrap();
        let c = store.append_entry(entry(&record, "gym-1", t0())).unwrap();
        assert!(a.sequence < b.sequence && b.sequence < c.sequence);
    }

    #[test]
    fn test_persistence_round_trip() {
        let dir = TempDir::new().unwrap();
        let record = code("acc_a", "token_a", t0() + Duration::hours(1));
        {
            let store = Storage::open(dir.path()).unwrap();
            store.insert_code(record.clone()).unwrap();
            store.append_entry(entry(&record, "gym-1", t0())).unwrap();
        }

        let reopened = Storage::open(dir.path()).unwrap();
        assert_eq!(reopened.find_by_value("acc_a").unwrap(), Some(record.clone()));

        // The open entry survives a restart.
        let err = reopened.append_entry(entry(&record, "gym-1", t0())).unwrap_err();
        assert!(matches!(err, TurnstileError::AlreadyInside));

        let exit = reopened.close_latest_open_entry("gym-1", t0(), t0()).unwrap();
        assert_eq!(exit.sequence, 2);
    }

    #[test]
    fn test_events_since_filters_facility_and_time() {
        let store = Storage::in_memory();
        let record = code("acc_a", "token_a", t0() + Duration::hours(30));
        store.insert_code(record.clone()).unwrap();
        store
            .append_entry(entry(&record, "gym-1", t0() - Duration::days(1)))
            .unwrap();
        store.append_entry(entry(&record, "gym-2", t0())).unwrap();

        assert!(store.events_for_facility_since("gym-1", t0()).unwrap().is_empty());
        assert_eq!(store.events_for_facility_since("gym-2", t0()).unwrap().len(), 1);

        let latest = store
            .latest_event_for_user("user_1", "gym-2", t0())
            .unwrap()
            .unwrap();
        assert_eq!(latest.kind, CheckInKind::Entry);
    }

    #[test]
    fn test_append_entry_requires_live_code() {
        let store = Storage::in_memory();
        let record = code("acc_a", "token_a", t0() + Duration::hours(1));
        store.insert_code(record.clone()).unwrap();
        store.delete_code(record.id).unwrap();

        let err = store.append_entry(entry(&record, "gym-1", t0())).unwrap_err();
        assert!(matches!(err, TurnstileError::CodeNotFound));
        assert!(store.events_for_facility_since("gym-1", t0()).unwrap().is_empty());
    }

    #[test]
    fn test_revoke_code_closes_entries_and_deletes() {
        let dir = TempDir::new().unwrap();
        let record = code("acc_a", "token_a", t0() + Duration::hours(1));
        {
            let store = Storage::open(dir.path()).unwrap();
            store.insert_code(record.clone()).unwrap();
            store.append_entry(entry(&record, "gym-1", t0())).unwrap();
            store.append_entry(entry(&record, "gym-2", t0())).unwrap();

            let (removed, exits) = store
                .revoke_code(record.id, t0() + Duration::minutes(5))
                .unwrap()
                .unwrap();
            assert_eq!(removed, record);
            assert_eq!(exits.len(), 2);
            assert_eq!(exits[0].facility_id, "gym-1");
            assert_eq!(exits[1].facility_id, "gym-2");
            assert_eq!(exits[1].sequence, exits[0].sequence + 1);
            assert!(exits.iter().all(|exit| exit.kind == CheckInKind::Exit));

            assert!(store.find_by_value("acc_a").unwrap().is_none());
            assert!(store.find_by_share_token("token_a").unwrap().is_none());
            assert!(store.revoke_code(record.id, t0()).unwrap().is_none());
        }

        let reopened = Storage::open(dir.path()).unwrap();
        assert!(reopened.find_by_id(record.id).unwrap().is_none());
        let latest = reopened
            .latest_event_for_user("user_1", "gym-2", t0())
            .unwrap()
            .unwrap();
        assert_eq!(latest.kind, CheckInKind::Exit);
        assert!(matches!(
            reopened.close_latest_open_entry("gym-1", t0(), t0()),
            Err(TurnstileError::NoActiveEntry)
        ));
    }

    #[test]
    fn test_replace_values_applies_batch() {
        let dir = TempDir::new().unwrap();
        let first = code("acc_a", "token_a", t0() + Duration::minutes(5));
        let second = code("acc_b", "token_b", t0() + Duration::minutes(5));
        let third = code("acc_c", "token_c", t0() + Duration::minutes(5));
        let expires_at = t0() + Duration::hours(1);
        let replacement = |id: Uuid, value: &str| ValueReplacement {
            id,
            new_value: value.to_string(),
            rotated_at: t0(),
            expires_at,
        };
        {
            let store = Storage::open(dir.path()).unwrap();
            for record in [&first, &second, &third] {
                store.insert_code(record.clone()).unwrap();
            }

            let outcomes = store
                .replace_values(vec![
                    replacement(first.id, "acc_x"),
                    replacement(second.id, "acc_c"),
                    replacement(Uuid::new_v4(), "acc_y"),
                    replacement(third.id, "acc_x"),
                    replacement(third.id, "acc_z"),
                ])
                .unwrap();
            assert!(matches!(&outcomes[0], ReplaceOutcome::Replaced(c) if c.id == first.id));
            assert_eq!(outcomes[1], ReplaceOutcome::Collision);
            assert_eq!(outcomes[2], ReplaceOutcome::Missing);
            assert_eq!(outcomes[3], ReplaceOutcome::Collision);
            assert!(matches!(&outcomes[4], ReplaceOutcome::Replaced(c) if c.id == third.id));

            assert!(store.find_by_value("acc_a").unwrap().is_none());
            assert!(store.find_by_value("acc_c").unwrap().is_none());
            assert_eq!(store.find_by_value("acc_b").unwrap(), Some(second.clone()));
        }

        let reopened = Storage::open(dir.path()).unwrap();
        let rotated = reopened.find_by_value("acc_x").unwrap().unwrap();
        assert_eq!(rotated.id, first.id);
        assert_eq!(rotated.expires_at, expires_at);
        assert_eq!(rotated.rotated_at, Some(t0()));
        assert_eq!(reopened.find_by_value("acc_z").unwrap().unwrap().id, third.id);
        assert_eq!(reopened.find_by_value("acc_b").unwrap(), Some(second));
    }

    #[test]
    fn test_facility_queries_survive_clock_going_backwards() {
        let store = Storage::in_memory();
        let a = code("acc_a", "token_a", t0() + Duration::hours(30));
        let mut b = code("acc_b", "token_b", t0() + Duration::hours(30));
        b.owner_id = "user_2".to_string();
        store.insert_code(a.clone()).unwrap();
        store.insert_code(b.clone()).unwrap();

        store
            .append_entry(entry(&a, "gym-1", t0() - Duration::hours(2)))
            .unwrap();
        store.append_entry(entry(&a, "gym-2", t0())).unwrap();
        store
            .close_latest_open_entry("gym-1", t0() - Duration::days(1), t0() + Duration::hours(1))
            .unwrap();
        // Recorded after the exit above but stamped earlier.
        store
            .append_entry(entry(&b, "gym-1", t0() + Duration::minutes(30)))
            .unwrap();

        let events = store.events_for_facility_since("gym-1", t0()).unwrap();
        let kinds: Vec<_> = events
            .iter()
            .map(|event| (event.user_id.as_str(), event.kind))
            .collect();
        assert_eq!(
            kinds,
            vec![("user_1", CheckInKind::Exit), ("user_2", CheckInKind::Entry)]
        );
        assert_eq!(
            store
                .latest_event_for_user("user_1", "gym-1", t0())
                .unwrap()
                .unwrap()
                .kind,
            CheckInKind::Exit
        );
        assert!(store
            .latest_event_for_user("user_1", "gym-1", t0() + Duration::hours(2))
            .unwrap()
            .is_none());
        assert_eq!(store.events_for_facility_since("gym-2", t0()).unwrap().len(), 1);
        assert!(store.events_for_facility_since("gym-3", t0()).unwrap().is_empty());
    }

    #[test]
    fn test_facility_index_rebuilt_on_open() {
        let dir = TempDir::new().unwrap();
        let record = code("acc_a", "token_a", t0() + Duration::hours(30));
        {
            let store = Storage::open(dir.path()).unwrap();
            store.insert_code(record.clone()).unwrap();
            for hours in 0..3 {
                let at = t0() + Duration::hours(hours);
                store.append_entry(entry(&record, "gym-1", at)).unwrap();
                store.close_latest_open_entry("gym-1", at, at).unwrap();
            }
        }

        let reopened = Storage::open(dir.path()).unwrap();
        let events = reopened
            .events_for_facility_since("gym-1", t0() + Duration::hours(1))
            .unwrap();
        assert_eq!(events.len(), 4);
        assert!(events.windows(2).all(|pair| pair[0].sequence < pair[1].sequence));
        assert_eq!(events[0].occurred_at, t0() + Duration::hours(1));
    }
}
