//! Shared domain types and OpenAPI schemas.
//!
//! These are the records the core persists ([`AccessCode`], [`CheckInEvent`]), the
//! records it consults from external collaborators ([`Entitlement`], [`OwnerSummary`]),
//! and the derived views it returns ([`PresenceStatus`], [`DailyStats`]).

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::error::{Result, TurnstileError};

// =============================================================================
// ENTITLEMENTS
// =============================================================================

/// Which kind of external record grants the right to enter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum EntitlementKind {
    /// A recurring membership.
    Membership,
    /// A single session or day pass.
    SessionPass,
}

/// Reference to exactly one entitlement owned by the billing collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({"kind": "membership", "id": "mem_8f2c"}))]
pub struct EntitlementRef {
    /// Kind of entitlement.
    pub kind: EntitlementKind,

    /// Identifier in the collaborator's system.
    #[schema(example = "mem_8f2c")]
    pub id: String,
}

impl EntitlementRef {
    /// Reference a membership.
    pub fn membership(id: impl Into<String>) -> Self {
        Self {
            kind: EntitlementKind::Membership,
            id: id.into(),
        }
    }

    /// Reference a session pass.
    pub fn session_pass(id: impl Into<String>) -> Self {
        Self {
            kind: EntitlementKind::SessionPass,
            id: id.into(),
        }
    }

    /// Build a reference from the two optional identifiers callers send.
    ///
    /// # Errors
    ///
    /// Returns [`TurnstileError::InvalidInput`] unless exactly one non-empty
    /// identifier is given.
    pub fn from_parts(membership_id: Option<String>, session_pass_id: Option<String>) -> Result<Self> {
        let membership_id = membership_id.filter(|id| !id.trim().is_empty());
        let session_pass_id = session_pass_id.filter(|id| !id.trim().is_empty());

        match (membership_id, session_pass_id) {
            (Some(id), None) => Ok(Self::membership(id)),
            (None, Some(id)) => Ok(Self::session_pass(id)),
            (None, None) => Err(TurnstileError::InvalidInput(
                "either membership_id or session_pass_id is required".into(),
            )),
            (Some(_), Some(_)) => Err(TurnstileError::InvalidInput(
                "membership_id and session_pass_id are mutually exclusive".into(),
            )),
        }
    }
}

/// Lifecycle state of an entitlement as reported by the collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum EntitlementState {
    /// Paid up and usable.
    Active,
    /// Temporarily blocked (unpaid, disciplinary, frozen).
    Suspended,
    /// Lapsed.
    Expired,
}

/// An entitlement record pushed by the billing collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({
    "reference": {"kind": "membership", "id": "mem_8f2c"},
    "facility_id": "gym-dakar-01",
    "state": "active",
    "valid_until": "2025-02-01T00:00:00Z"
}))]
pub struct Entitlement {
    /// Which entitlement this is.
    pub reference: EntitlementRef,

    /// The single facility the entitlement admits to.
    #[schema(example = "gym-dakar-01")]
    pub facility_id: String,

    /// Current lifecycle state.
    pub state: EntitlementState,

    /// Instant after which the entitlement no longer admits, if bounded.
    #[schema(nullable)]
    pub valid_until: Option<DateTime<Utc>>,
}

/// Answer to "is this entitlement valid for facility F at time T".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum EntitlementStatus {
    /// Usable here and now.
    Valid,
    /// Lapsed, either by state or by `valid_until`.
    Expired,
    /// Scoped to a different facility.
    WrongFacility,
    /// Blocked by the collaborator.
    Suspended,
    /// The collaborator does not know this entitlement.
    Unknown,
}

impl EntitlementStatus {
    /// Human-readable refusal reason, or `None` when valid.
    #[must_use]
    pub const fn refusal_reason(self) -> Option<&'static str> {
        match self {
            Self::Valid => None,
            Self::Expired => Some("entitlement expired, renewal required"),
            Self::WrongFacility => Some("entitlement belongs to another facility"),
            Self::Suspended => Some("entitlement suspended"),
            Self::Unknown => Some("entitlement not found"),
        }
    }
}

// =============================================================================
// ACCESS CODES
// =============================================================================

/// A rotating credential bound to one owner and one entitlement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({
    "id": "6f1c1a52-9a55-4a43-9b4e-0d6f5c4cf7a1",
    "current_value": "acc_Xq3b9TzLm2Pw7Rk4Hs8Vn1Ya",
    "share_token": "token_Lk2Hs9Pq4Rt7Vw1Xz3Bn5Mc8Df0Gj6Ka",
    "owner_id": "user_123",
    "entitlement": {"kind": "membership", "id": "mem_8f2c"},
    "issued_at": "2025-01-15T10:30:00Z",
    "rotated_at": null,
    "expires_at": "2025-01-15T11:30:00Z"
}))]
pub struct AccessCode {
    /// Durable identity, unchanged by rotation.
    pub id: Uuid,

    /// Scanner-facing value; replaced on every rotation.
    #[schema(example = "acc_Xq3b9TzLm2Pw7Rk4Hs8Vn1Ya")]
    pub current_value: String,

    /// Long-lived secret that authorizes a rotation.
    #[schema(example = "token_Lk2Hs9Pq4Rt7Vw1Xz3Bn5Mc8Df0Gj6Ka")]
    pub share_token: String,

    /// The single user this code belongs to.
    #[schema(example = "user_123")]
    pub owner_id: String,

    /// The single entitlement this code stands for.
    pub entitlement: EntitlementRef,

    /// When the record was created.
    pub issued_at: DateTime<Utc>,

    /// When `current_value` was last replaced.
    #[schema(nullable)]
    pub rotated_at: Option<DateTime<Utc>>,

    /// When the current value stops admitting.
    pub expires_at: DateTime<Utc>,
}

impl AccessCode {
    /// Whether the code is past its expiry at `now`.
    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }

    /// Whether the code is still valid but expires within `window` of `now`.
    #[must_use]
    pub fn expires_within(&self, now: DateTime<Utc>, window: Duration) -> bool {
        now < self.expires_at && self.expires_at <= now + window
    }

    /// Instant the current value was put in place.
    #[must_use]
    pub fn value_issued_at(&self) -> DateTime<Utc> {
        self.rotated_at.unwrap_or(self.issued_at)
    }
}

/// What the holder's device shows: the current value and how to refresh it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({
    "code_id": "6f1c1a52-9a55-4a43-9b4e-0d6f5c4cf7a1",
    "current_value": "acc_Xq3b9TzLm2Pw7Rk4Hs8Vn1Ya",
    "expires_at": "2025-01-15T11:30:00Z",
    "refresh_url": "/api/access-codes/refresh?share_token=token_Lk2Hs9Pq4Rt7Vw1Xz3Bn5Mc8Df0Gj6Ka"
}))]
pub struct DisplayCode {
    /// Identity of the code being displayed.
    pub code_id: Uuid,

    /// Value to render for the scanner.
    pub current_value: String,

    /// When the value stops being accepted.
    pub expires_at: DateTime<Utc>,

    /// Path that rotates this code when requested with POST.
    pub refresh_url: String,
}

impl DisplayCode {
    /// Path prefix of the refresh endpoint.
    pub const REFRESH_PATH: &'static str = "/api/access-codes/refresh";

    /// Display view of `code`.
    #[must_use]
    pub fn from_code(code: &AccessCode) -> Self {
        Self {
            code_id: code.id,
            current_value: code.current_value.clone(),
            expires_at: code.expires_at,
            refresh_url: format!("{}?share_token={}", Self::REFRESH_PATH, code.share_token),
        }
    }
}

// =============================================================================
// CHECK-IN EVENTS
// =============================================================================

/// Direction of a check-in event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum CheckInKind {
    /// The holder was admitted.
    Entry,
    /// The holder left.
    Exit,
}

/// An immutable record of an entry or exit at a facility.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({
    "id": "01943f4e-8a7b-7cc2-9d1e-3b5f8a2c4d6e",
    "sequence": 42,
    "facility_id": "gym-dakar-01",
    "user_id": "user_123",
    "access_code_id": "6f1c1a52-9a55-4a43-9b4e-0d6f5c4cf7a1",
    "kind": "entry",
    "occurred_at": "2025-01-15T10:35:00Z",
    "validated_by": "staff_7"
}))]
pub struct CheckInEvent {
    /// Event identity.
    pub id: Uuid,

    /// Storage insertion order; breaks ties between equal timestamps.
    #[schema(example = 42)]
    pub sequence: u64,

    /// Facility the event happened at.
    #[schema(example = "gym-dakar-01")]
    pub facility_id: String,

    /// The holder.
    #[schema(example = "user_123")]
    pub user_id: String,

    /// Code the event was recorded against, when one was involved.
    #[schema(nullable)]
    pub access_code_id: Option<Uuid>,

    /// Entry or exit.
    pub kind: CheckInKind,

    /// When the event happened.
    pub occurred_at: DateTime<Utc>,

    /// Staff member who scanned the code, for entries.
    #[schema(nullable, example = "staff_7")]
    pub validated_by: Option<String>,
}

/// Display identity of a code owner, sourced from the user directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({
    "id": "user_123",
    "first_name": "Awa",
    "last_name": "Diop",
    "photo_url": "https://cdn.example.com/u/123.jpg"
}))]
pub struct OwnerSummary {
    /// User identifier.
    #[schema(example = "user_123")]
    pub id: String,

    /// Given name.
    #[schema(nullable, example = "Awa")]
    pub first_name: Option<String>,

    /// Family name.
    #[schema(nullable, example = "Diop")]
    pub last_name: Option<String>,

    /// Photo shown to staff at the scanner.
    #[schema(nullable)]
    pub photo_url: Option<String>,
}

impl OwnerSummary {
    /// Summary carrying only the identifier, for owners the directory does not know.
    pub fn anonymous(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            first_name: None,
            last_name: None,
            photo_url: None,
        }
    }
}

/// An appended event together with the owner it concerns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct CheckInOutcome {
    /// The event that was recorded.
    pub event: CheckInEvent,

    /// Who the event was recorded for.
    pub owner: OwnerSummary,
}

// =============================================================================
// PRESENCE
// =============================================================================

/// Per-day presence state of a user at a facility.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum PresenceState {
    /// No event today.
    NotEntered,
    /// Last event today is an entry.
    InGym,
    /// Last event today is an exit.
    Exited,
}

impl PresenceState {
    /// Human-readable description.
    #[must_use]
    pub const fn describe(self) -> &'static str {
        match self {
            Self::NotEntered => "Not entered today",
            Self::InGym => "Currently inside",
            Self::Exited => "Left the facility",
        }
    }
}

/// Presence of one user at one facility.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({
    "state": "in_gym",
    "last_event_at": "2025-01-15T10:35:00Z"
}))]
pub struct PresenceStatus {
    /// Current state.
    pub state: PresenceState,

    /// Time of the last event today.
    #[schema(nullable)]
    pub last_event_at: Option<DateTime<Utc>>,
}

/// A user currently inside a facility.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct InsideEntry {
    /// The user.
    #[schema(example = "user_123")]
    pub user_id: String,

    /// When their open entry was recorded.
    pub entered_at: DateTime<Utc>,

    /// Display identity, when the directory knows the user.
    #[schema(nullable)]
    pub owner: Option<OwnerSummary>,
}

/// Today's counters for a facility.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({
    "facility_id": "gym-dakar-01",
    "date": "2025-01-15",
    "entries": 57,
    "exits": 41,
    "currently_inside": 16
}))]
pub struct DailyStats {
    /// Facility the counters describe.
    pub facility_id: String,

    /// Facility-local date.
    pub date: NaiveDate,

    /// Entry events today.
    pub entries: usize,

    /// Exit events today.
    pub exits: usize,

    /// `entries - exits`, saturating at zero. Dashboard approximation only.
    pub currently_inside: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn code_expiring_at(expires_at: DateTime<Utc>) -> AccessCode {
        AccessCode {
            id: Uuid::new_v4(),
            current_value: "acc_test".into(),
            share_token: "token_test".into(),
            owner_id: "user_1".into(),
            entitlement: EntitlementRef::membership("mem_1"),
            issued_at: expires_at - Duration::hours(1),
            rotated_at: None,
            expires_at,
        }
    }

    #[test]
    fn test_entitlement_ref_from_parts() {
        let reference = EntitlementRef::from_parts(Some("mem_1".into()), None).unwrap();
        assert_eq!(reference.kind, EntitlementKind::Membership);

        let reference = EntitlementRef::from_parts(None, Some("pass_1".into())).unwrap();
        assert_eq!(reference.kind, EntitlementKind::SessionPass);

        assert!(EntitlementRef::from_parts(None, None).is_err());
        assert!(EntitlementRef::from_parts(Some("a".into()), Some("b".into())).is_err());
        assert!(EntitlementRef::from_parts(Some("  ".into()), None).is_err());
    }

    #[test]
    fn test_expiry_boundaries() {
        let now = Utc.with_ymd_and_hms(2025, 1, 15, 10, 0, 0).unwrap();
        let window = Duration::minutes(10);

        assert!(code_expiring_at(now).is_expired(now));
        assert!(!code_expiring_at(now + Duration::seconds(1)).is_expired(now));

        assert!(code_expiring_at(now + Duration::minutes(10)).expires_within(now, window));
        assert!(!code_expiring_at(now + Duration::minutes(20)).expires_within(now, window));
        assert!(!code_expiring_at(now).expires_within(now, window));
    }

    #[test]
    fn test_presence_state_serialization() {
        let json = serde_json::to_string(&PresenceState::NotEntered).unwrap();
        assert_eq!(json, "\"not_entered\"");
        let json = serde_json::to_string(&PresenceState::InGym).unwrap();
        assert_eq!(json, "\"in_gym\"");
    }

    #[test]
    fn test_refusal_reasons() {
        assert!(EntitlementStatus::Valid.refusal_reason().is_none());
        assert!(EntitlementStatus::WrongFacility
            .refusal_reason()
            .unwrap()
            .contains("another facility"));
    }
}
