//! Directory feed endpoints.
//!
//! Billing and profile systems push the owner summaries and entitlement
//! records that admission consults.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::put;
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use turnstile_core::{Entitlement, EntitlementKind, EntitlementRef, EntitlementState, OwnerSummary};
use utoipa::ToSchema;

use crate::api::error::{ApiError, ApiResult, ErrorResponse};
use crate::state::SharedState;

/// Creates the directory router.
pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/owners/{user_id}", put(upsert_owner).delete(remove_owner))
        .route(
            "/entitlements/{kind}/{entitlement_id}",
            put(upsert_entitlement).delete(remove_entitlement),
        )
}

// ============================================================================
// Request Types
// ============================================================================

/// Display identity of a user.
#[derive(Debug, Clone, Deserialize, ToSchema)]
#[schema(example = json!({
    "first_name": "Awa",
    "last_name": "Ndiaye",
    "photo_url": "https://cdn.example.com/u/123.jpg"
}))]
pub struct OwnerRequest {
    /// Given name.
    #[serde(default)]
    pub first_name: Option<String>,

    /// Family name.
    #[serde(default)]
    pub last_name: Option<String>,

    /// Photo shown at the scanner.
    #[serde(default)]
    pub photo_url: Option<String>,
}

/// An entitlement record. Kind and id come from the path.
#[derive(Debug, Clone, Deserialize, ToSchema)]
#[schema(example = json!({
    "facility_id": "gym-dakar-01",
    "state": "active",
    "valid_until": "2025-02-01T00:00:00Z"
}))]
pub struct EntitlementRequest {
    /// The facility it admits to.
    pub facility_id: String,

    /// Lifecycle state.
    pub state: EntitlementState,

    /// Instant after which it no longer admits.
    #[serde(default)]
    pub valid_until: Option<DateTime<Utc>>,
}

// ============================================================================
// Handlers
// ============================================================================

/// Create or replace an owner summary.
#[utoipa::path(
    put,
    path = "/api/directory/owners/{user_id}",
    tag = "directory",
    operation_id = "upsertOwner",
    summary = "Create or replace an owner",
    params(
        ("user_id" = String, Path, description = "The user")
    ),
    request_body = OwnerRequest,
    responses(
        (status = 200, description = "Owner stored", body = OwnerSummary),
        (status = 400, description = "Invalid input", body = ErrorResponse)
    )
)]
pub async fn upsert_owner(
    State(state): State<SharedState>,
    Path(user_id): Path<String>,
    Json(request): Json<OwnerRequest>,
) -> ApiResult<Json<OwnerSummary>> {
    let owner = OwnerSummary {
        id: user_id,
        first_name: request.first_name,
        last_name: request.last_name,
        photo_url: request.photo_url,
    };
    state.service.directory().upsert_owner(owner.clone())?;
    Ok(Json(owner))
}

/// Remove an owner summary.
#[utoipa::path(
    delete,
    path = "/api/directory/owners/{user_id}",
    tag = "directory",
    operation_id = "removeOwner",
    summary = "Remove an owner",
    params(
        ("user_id" = String, Path, description = "The user")
    ),
    responses(
        (status = 204, description = "Owner removed"),
        (status = 404, description = "Unknown owner", body = ErrorResponse)
    )
)]
pub async fn remove_owner(
    State(state): State<SharedState>,
    Path(user_id): Path<String>,
) -> ApiResult<StatusCode> {
    if state.service.directory().remove_owner(&user_id)? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::NotFound {
            error_code: "OWNER_NOT_FOUND".to_string(),
            message: format!("Owner not found: '{user_id}'"),
        })
    }
}

/// Create or replace an entitlement.
#[utoipa::path(
    put,
    path = "/api/directory/entitlements/{kind}/{entitlement_id}",
    tag = "directory",
    operation_id = "upsertEntitlement",
    summary = "Create or replace an entitlement",
    params(
        ("kind" = EntitlementKind, Path, description = "`membership` or `session_pass`"),
        ("entitlement_id" = String, Path, description = "Membership or session pass id")
    ),
    request_body = EntitlementRequest,
    responses(
        (status = 200, description = "Entitlement stored", body = Entitlement),
        (status = 400, description = "Invalid input", body = ErrorResponse)
    )
)]
pub async fn upsert_entitlement(
    State(state): State<SharedState>,
    Path((kind, entitlement_id)): Path<(EntitlementKind, String)>,
    Json(request): Json<EntitlementRequest>,
) -> ApiResult<Json<Entitlement>> {
    let entitlement = Entitlement {
        reference: EntitlementRef {
            kind,
            id: entitlement_id,
        },
        facility_id: request.facility_id,
        state: request.state,
        valid_until: request.valid_until,
    };
    state
        .service
        .directory()
        .upsert_entitlement(entitlement.clone())?;
    Ok(Json(entitlement))
}

/// Remove an entitlement.
#[utoipa::path(
    delete,
    path = "/api/directory/entitlements/{kind}/{entitlement_id}",
    tag = "directory",
    operation_id = "removeEntitlement",
    summary = "Remove an entitlement",
    params(
        ("kind" = EntitlementKind, Path, description = "`membership` or `session_pass`"),
        ("entitlement_id" = String, Path, description = "Membership or session pass id")
    ),
    responses(
        (status = 204, description = "Entitlement removed"),
        (status = 404, description = "Unknown entitlement", body = ErrorResponse)
    )
)]
pub async fn remove_entitlement(
    State(state): State<SharedState>,
    Path((kind, entitlement_id)): Path<(EntitlementKind, String)>,
) -> ApiResult<StatusCode> {
    let reference = EntitlementRef {
        kind,
        id: entitlement_id,
    };
    if state.service.directory().remove_entitlement(&reference)? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::NotFound {
            error_code: "ENTITLEMENT_NOT_FOUND".to_string(),
            message: format!("Entitlement not found: '{}'", reference.id),
        })
    }
}
