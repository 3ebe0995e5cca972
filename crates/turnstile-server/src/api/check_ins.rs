//! Check-in API endpoints.
//!
//! Staff scan a holder's code at the entrance; holders leave by scanning the
//! facility's static exit code. Presence and daily counters are derived from
//! the resulting event log.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use turnstile_core::{CheckInOutcome, DailyStats, InsideEntry, PresenceState};
use utoipa::{IntoParams, ToSchema};

use crate::api::error::{ApiResult, ErrorResponse};
use crate::state::SharedState;

/// Creates the check-ins router.
pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/scan", post(scan_entry))
        .route("/exit", get(scan_exit))
        .route("/status/{user_id}/{facility_id}", get(get_status))
        .route("/live/{facility_id}", get(get_live))
        .route("/stats/{facility_id}", get(get_stats))
}

// ============================================================================
// Request/Response Types
// ============================================================================

/// A code scanned at the entrance.
#[derive(Debug, Clone, Deserialize, ToSchema)]
#[schema(example = json!({
    "facility_id": "gym-dakar-01",
    "code": "acc_Xq3b9TzLm2Pw7Rk4Hs8Vn1Ya",
    "staff_id": "staff_42"
}))]
pub struct ScanRequest {
    /// Facility the scanner belongs to.
    #[schema(example = "gym-dakar-01")]
    pub facility_id: String,

    /// Value read from the holder's device.
    #[schema(example = "acc_Xq3b9TzLm2Pw7Rk4Hs8Vn1Ya")]
    pub code: String,

    /// Staff member operating the scanner.
    #[serde(default)]
    #[schema(example = "staff_42")]
    pub staff_id: Option<String>,
}

/// Query parameters for the exit endpoint.
#[derive(Debug, Clone, Deserialize, IntoParams)]
pub struct ExitQuery {
    /// Facility being left.
    #[param(example = "gym-dakar-01")]
    pub facility_id: String,

    /// Static exit code posted at the facility.
    #[param(example = "exit_gym_12345")]
    pub exit_code: String,
}

/// Today's presence of one user at one facility.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({
    "user_id": "user_123",
    "facility_id": "gym-dakar-01",
    "state": "in_gym",
    "last_event_at": "2025-01-15T10:35:00Z",
    "message": "Currently inside"
}))]
pub struct StatusResponse {
    /// The user.
    pub user_id: String,

    /// The facility.
    pub facility_id: String,

    /// Presence state.
    pub state: PresenceState,

    /// Time of the last event today.
    #[schema(nullable)]
    pub last_event_at: Option<DateTime<Utc>>,

    /// Human-readable description of `state`.
    pub message: String,
}

/// Users currently inside a facility.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct LiveResponse {
    /// The facility.
    #[schema(example = "gym-dakar-01")]
    pub facility_id: String,

    /// Number of users inside.
    #[schema(example = 16)]
    pub count: usize,

    /// Who is inside, earliest entry first.
    pub users: Vec<InsideEntry>,
}

// ============================================================================
// Handlers
// ============================================================================

/// Validate a scanned code and record an entry.
#[utoipa::path(
    post,
    path = "/api/check-ins/scan",
    tag = "check-ins",
    operation_id = "scanEntry",
    summary = "Admit a holder",
    description = "Validates the scanned value, the code's expiry, and its \
        entitlement, then records an entry. Refused while the code already has an \
        open entry at the facility.",
    request_body = ScanRequest,
    responses(
        (status = 201, description = "Entry recorded", body = CheckInOutcome),
        (status = 400, description = "Malformed input", body = ErrorResponse),
        (status = 403, description = "Entitlement not valid here", body = ErrorResponse),
        (status = 404, description = "Unknown code or facility", body = ErrorResponse),
        (status = 409, description = "Already inside", body = ErrorResponse),
        (status = 410, description = "Code expired", body = ErrorResponse)
    )
)]
pub async fn scan_entry(
    State(state): State<SharedState>,
    Json(request): Json<ScanRequest>,
) -> ApiResult<(StatusCode, Json<CheckInOutcome>)> {
    let outcome = state.service.admit(
        &request.facility_id,
        &request.code,
        request.staff_id.as_deref(),
    )?;
    Ok((StatusCode::CREATED, Json(outcome)))
}

/// Record an exit with the facility's exit code.
#[utoipa::path(
    get,
    path = "/api/check-ins/exit",
    tag = "check-ins",
    operation_id = "scanExit",
    summary = "Record an exit",
    description = "Closes the most recent open entry at the facility today.",
    params(ExitQuery),
    responses(
        (status = 200, description = "Exit recorded", body = CheckInOutcome),
        (status = 400, description = "No active entry today", body = ErrorResponse),
        (status = 404, description = "Exit code does not match the facility", body = ErrorResponse)
    )
)]
pub async fn scan_exit(
    State(state): State<SharedState>,
    Query(query): Query<ExitQuery>,
) -> ApiResult<Json<CheckInOutcome>> {
    Ok(Json(state.service.exit(&query.facility_id, &query.exit_code)?))
}

/// Get a user's presence today.
#[utoipa::path(
    get,
    path = "/api/check-ins/status/{user_id}/{facility_id}",
    tag = "check-ins",
    operation_id = "getPresenceStatus",
    summary = "Get presence status",
    params(
        ("user_id" = String, Path, description = "The user"),
        ("facility_id" = String, Path, description = "The facility")
    ),
    responses(
        (status = 200, description = "Presence status", body = StatusResponse),
        (status = 404, description = "Unknown facility", body = ErrorResponse)
    )
)]
pub async fn get_status(
    State(state): State<SharedState>,
    Path((user_id, facility_id)): Path<(String, String)>,
) -> ApiResult<Json<StatusResponse>> {
    let status = state.service.status(&user_id, &facility_id)?;
    Ok(Json(StatusResponse {
        user_id,
        facility_id,
        state: status.state,
        last_event_at: status.last_event_at,
        message: status.state.describe().to_string(),
    }))
}

/// List users currently inside.
#[utoipa::path(
    get,
    path = "/api/check-ins/live/{facility_id}",
    tag = "check-ins",
    operation_id = "getLivePresence",
    summary = "List users inside",
    params(
        ("facility_id" = String, Path, description = "The facility")
    ),
    responses(
        (status = 200, description = "Users inside", body = LiveResponse),
        (status = 404, description = "Unknown facility", body = ErrorResponse)
    )
)]
pub async fn get_live(
    State(state): State<SharedState>,
    Path(facility_id): Path<String>,
) -> ApiResult<Json<LiveResponse>> {
    let users = state.service.currently_inside(&facility_id)?;
    Ok(Json(LiveResponse {
        facility_id,
        count: users.len(),
        users,
    }))
}

/// Get today's counters.
#[utoipa::path(
    get,
    path = "/api/check-ins/stats/{facility_id}",
    tag = "check-ins",
    operation_id = "getDailyStats",
    summary = "Get today's counters",
    description = "Entries and exits recorded today in the facility's timezone. \
        `currently_inside` is `entries - exits`, an approximation for dashboards.",
    params(
        ("facility_id" = String, Path, description = "The facility")
    ),
    responses(
        (status = 200, description = "Daily counters", body = DailyStats),
        (status = 404, description = "Unknown facility", body = ErrorResponse)
    )
)]
pub async fn get_stats(
    State(state): State<SharedState>,
    Path(facility_id): Path<String>,
) -> ApiResult<Json<DailyStats>> {
    Ok(Json(state.service.daily_stats(&facility_id)?))
}
