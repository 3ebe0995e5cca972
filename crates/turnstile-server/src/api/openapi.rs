//! OpenAPI specification generation for the turnstile API.
//!
//! The document is served at `/api/openapi.json` and written to disk by the
//! `gen-openapi` binary for client generation.

use axum::Json;
use turnstile_core::{
    AccessCode, CheckInEvent, CheckInKind, CheckInOutcome, DailyStats, DisplayCode, Entitlement,
    EntitlementKind, EntitlementRef, EntitlementState, InsideEntry, OwnerSummary, PresenceState,
};
use utoipa::OpenApi;

use super::access_codes::{IssueCodeRequest, OwnerCodesResponse};
use super::check_ins::{LiveResponse, ScanRequest, StatusResponse};
use super::directory::{EntitlementRequest, OwnerRequest};
use super::error::ErrorResponse;
use super::health::{FacilityClock, HealthResponse};

/// Serve the OpenAPI specification as JSON.
pub async fn get_openapi_spec() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}

/// Returns the OpenAPI specification as pretty-printed JSON.
///
/// # Errors
///
/// Returns an error if the document cannot be serialized.
pub fn get_openapi_json() -> Result<String, serde_json::Error> {
    ApiDoc::openapi().to_pretty_json()
}

/// Main OpenAPI document structure for turnstile.
#[derive(OpenApi)]
#[openapi(
    info(
        title = "turnstile API",
        version = "0.1.0",
        description = r#"
# turnstile API

turnstile controls physical entry to facilities with rotating access codes.

## Overview

1. **Access codes**: each membership or session pass gets a code. The holder's
   device displays `current_value` and rotates it with the share token before it
   expires. A rotated-away value is never accepted again.
2. **Check-ins**: staff scan the displayed value at the entrance. A code that
   already has an open entry at the facility is refused until the holder exits
   with the facility's exit code.
3. **Presence**: who is inside right now, and today's entry and exit counters,
   computed in the facility's timezone.
4. **Directory**: billing and profile systems push entitlement and owner records.

## Error format

Every error body is `{"error": CODE, "message": text, "details": object | null}`.
"#,
        license(name = "MIT", url = "https://opensource.org/licenses/MIT")
    ),
    servers(
        (url = "/", description = "Local turnstile server")
    ),
    tags(
        (name = "system", description = "Health checks"),
        (name = "access-codes", description = "Issuing, displaying, rotating, and revoking access codes"),
        (name = "check-ins", description = "Entry and exit scanning, presence, and daily counters"),
        (name = "directory", description = "Owner and entitlement records pushed by external systems")
    ),
    paths(
        super::health::health_check,
        super::access_codes::issue_code,
        super::access_codes::get_display,
        super::access_codes::refresh_code,
        super::access_codes::get_owner_codes,
        super::access_codes::revoke_code,
        super::check_ins::scan_entry,
        super::check_ins::scan_exit,
        super::check_ins::get_status,
        super::check_ins::get_live,
        super::check_ins::get_stats,
        super::directory::upsert_owner,
        super::directory::remove_owner,
        super::directory::upsert_entitlement,
        super::directory::remove_entitlement,
    ),
    components(
        schemas(
            // Error types
            ErrorResponse,
            // Health types
            HealthResponse,
            FacilityClock,
            // Access code types
            AccessCode,
            DisplayCode,
            IssueCodeRequest,
            OwnerCodesResponse,
            EntitlementRef,
            EntitlementKind,
            // Check-in types
            ScanRequest,
            CheckInOutcome,
            CheckInEvent,
            CheckInKind,
            OwnerSummary,
            StatusResponse,
            PresenceState,
            LiveResponse,
            InsideEntry,
            DailyStats,
            // Directory types
            OwnerRequest,
            EntitlementRequest,
            Entitlement,
            EntitlementState,
        )
    )
)]
pub struct ApiDoc;
