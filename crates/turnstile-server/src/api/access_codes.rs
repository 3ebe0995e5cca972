//! Access code API endpoints.
//!
//! Codes are issued once per membership or session pass and then rotated: the
//! holder's device shows `current_value`, which the scanner reads, and asks for a
//! fresh one with the share token when it is about to expire.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use turnstile_core::{AccessCode, DisplayCode};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use crate::api::error::{ApiError, ApiResult, ErrorResponse};
use crate::state::SharedState;

/// Creates the access codes router.
pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/", post(issue_code))
        .route("/display", get(get_display))
        .route("/refresh", post(refresh_code))
        .route("/owners/{owner_id}", get(get_owner_codes))
        .route("/{code_id}", delete(revoke_code))
}

// ============================================================================
// Request/Response Types
// ============================================================================

/// Request body for issuing a code. Exactly one of `membership_id` and
/// `session_pass_id` must be set.
#[derive(Debug, Clone, Deserialize, ToSchema)]
#[schema(example = json!({
    "owner_id": "user_123",
    "membership_id": "mem_8f2c"
}))]
pub struct IssueCodeRequest {
    /// The holder the code is issued to.
    #[schema(example = "user_123", min_length = 1)]
    pub owner_id: String,

    /// Membership granting entry.
    #[serde(default)]
    #[schema(example = "mem_8f2c")]
    pub membership_id: Option<String>,

    /// Session pass granting entry.
    #[serde(default)]
    pub session_pass_id: Option<String>,
}

/// Query parameters for the display endpoint.
#[derive(Debug, Clone, Deserialize, IntoParams)]
pub struct DisplayQuery {
    /// The holder whose code to display.
    #[param(example = "user_123")]
    pub owner_id: String,
}

/// Query parameters for the refresh endpoint.
#[derive(Debug, Clone, Deserialize, IntoParams)]
pub struct RefreshQuery {
    /// Stable secret identifying the code to rotate.
    #[param(example = "token_Lk2Hs9Pq4Rt7Vw1Xz3Bn5Mc8Df0Gj6Ka")]
    pub share_token: String,
}

/// Live codes of one holder.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct OwnerCodesResponse {
    /// The holder.
    #[schema(example = "user_123")]
    pub owner_id: String,

    /// Number of live codes.
    #[schema(example = 1)]
    pub count: usize,

    /// Live codes, newest issuance first.
    pub codes: Vec<AccessCode>,
}

// ============================================================================
// Handlers
// ============================================================================

/// Issue an access code.
#[utoipa::path(
    post,
    path = "/api/access-codes",
    tag = "access-codes",
    operation_id = "issueAccessCode",
    summary = "Issue an access code",
    description = "Creates a code bound to one holder and one membership or session \
        pass. The code expires one TTL after issuance unless rotated.",
    request_body = IssueCodeRequest,
    responses(
        (status = 201, description = "Code issued", body = AccessCode),
        (status = 400, description = "Missing owner or ambiguous entitlement", body = ErrorResponse)
    )
)]
pub async fn issue_code(
    State(state): State<SharedState>,
    Json(request): Json<IssueCodeRequest>,
) -> ApiResult<(StatusCode, Json<AccessCode>)> {
    let code = state.service.issue_for(
        &request.owner_id,
        request.membership_id,
        request.session_pass_id,
    )?;
    Ok((StatusCode::CREATED, Json(code)))
}

/// Get the code a holder's device should display.
#[utoipa::path(
    get,
    path = "/api/access-codes/display",
    tag = "access-codes",
    operation_id = "getDisplayCode",
    summary = "Get the code to display",
    description = "Returns the most recently issued live code of the holder along \
        with the URL that rotates it.",
    params(DisplayQuery),
    responses(
        (status = 200, description = "Code to display", body = DisplayCode),
        (status = 404, description = "Holder has no live code", body = ErrorResponse)
    )
)]
pub async fn get_display(
    State(state): State<SharedState>,
    Query(query): Query<DisplayQuery>,
) -> ApiResult<Json<DisplayCode>> {
    Ok(Json(state.service.display(&query.owner_id)?))
}

/// Rotate a code by its share token.
#[utoipa::path(
    post,
    path = "/api/access-codes/refresh",
    tag = "access-codes",
    operation_id = "refreshAccessCode",
    summary = "Rotate an access code",
    description = "Replaces the code's value and extends its expiry. The previous \
        value stops being accepted immediately; the share token is unchanged.",
    params(RefreshQuery),
    responses(
        (status = 200, description = "Code rotated", body = DisplayCode),
        (status = 404, description = "Unknown share token", body = ErrorResponse)
    )
)]
pub async fn refresh_code(
    State(state): State<SharedState>,
    Query(query): Query<RefreshQuery>,
) -> ApiResult<Json<DisplayCode>> {
    let code = state.service.rotate(&query.share_token)?;
    Ok(Json(DisplayCode::from_code(&code)))
}

/// List a holder's live codes.
#[utoipa::path(
    get,
    path = "/api/access-codes/owners/{owner_id}",
    tag = "access-codes",
    operation_id = "getOwnerAccessCodes",
    summary = "List a holder's live codes",
    params(
        ("owner_id" = String, Path, description = "The holder")
    ),
    responses(
        (status = 200, description = "Live codes", body = OwnerCodesResponse)
    )
)]
pub async fn get_owner_codes(
    State(state): State<SharedState>,
    Path(owner_id): Path<String>,
) -> ApiResult<Json<OwnerCodesResponse>> {
    let codes = state.service.active_codes(&owner_id)?;
    Ok(Json(OwnerCodesResponse {
        owner_id,
        count: codes.len(),
        codes,
    }))
}

/// Revoke a code.
#[utoipa::path(
    delete,
    path = "/api/access-codes/{code_id}",
    tag = "access-codes",
    operation_id = "revokeAccessCode",
    summary = "Revoke an access code",
    description = "Deletes the code. An entry still open under it is closed first.",
    params(
        ("code_id" = Uuid, Path, description = "Code identity")
    ),
    responses(
        (status = 204, description = "Code revoked"),
        (status = 400, description = "Malformed code id", body = ErrorResponse),
        (status = 404, description = "Unknown code", body = ErrorResponse)
    )
)]
pub async fn revoke_code(
    State(state): State<SharedState>,
    Path(code_id): Path<String>,
) -> ApiResult<StatusCode> {
    let code_id = Uuid::parse_str(&code_id)
        .map_err(|_| ApiError::bad_request(format!("'{code_id}' is not a valid code id")))?;
    state.service.revoke(code_id)?;
    Ok(StatusCode::NO_CONTENT)
}
