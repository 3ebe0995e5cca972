//! Liveness endpoint.
//!
//! Besides "up", it reports each facility's local date and when its presence
//! counters next reset, which is the first thing to check when a dashboard
//! looks wrong around midnight.

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::state::SharedState;

/// Liveness report.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({
    "status": "ok",
    "version": "0.1.0",
    "uptime_secs": 86400,
    "facilities": [{
        "id": "gym-dakar-01",
        "name": "Dakar Plateau",
        "timezone": "Africa/Dakar",
        "local_date": "2025-01-15",
        "day_resets_at": "2025-01-16T00:00:00Z"
    }]
}))]
pub struct HealthResponse {
    /// Always `ok` when the server answers.
    pub status: String,

    /// Crate version.
    pub version: String,

    /// Seconds since the server started.
    pub uptime_secs: i64,

    /// Served facilities, ordered by id.
    pub facilities: Vec<FacilityClock>,
}

/// Day boundary state of one facility.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct FacilityClock {
    /// Facility identifier.
    pub id: String,

    /// Display name.
    pub name: String,

    /// IANA timezone the facility's day is computed in.
    pub timezone: String,

    /// Today in the facility's timezone.
    pub local_date: NaiveDate,

    /// Next local midnight, when presence and counters start over.
    pub day_resets_at: DateTime<Utc>,
}

/// Creates the health router.
pub fn router() -> Router<SharedState> {
    Router::new().route("/", get(health_check))
}

/// Report liveness and facility day boundaries.
#[utoipa::path(
    get,
    path = "/health",
    tag = "system",
    operation_id = "healthCheck",
    summary = "Check service health",
    responses(
        (status = 200, description = "Service is up", body = HealthResponse)
    )
)]
pub async fn health_check(State(state): State<SharedState>) -> Json<HealthResponse> {
    let now = state.service.now();
    let mut facilities: Vec<FacilityClock> = state
        .service
        .facilities()
        .all()
        .into_iter()
        .map(|facility| FacilityClock {
            id: facility.id.clone(),
            name: facility.name.clone(),
            timezone: facility.timezone.name().to_string(),
            local_date: facility.local_date(now),
            day_resets_at: facility.end_of_day(now),
        })
        .collect();
    facilities.sort_by(|a, b| a.id.cmp(&b.id));

    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_secs: (Utc::now() - state.started_at).num_seconds(),
        facilities,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_facility_clock_serializes_plain_date() {
        let clock = FacilityClock {
            id: "gym-1".to_string(),
            name: "Main".to_string(),
            timezone: "America/New_York".to_string(),
            local_date: NaiveDate::from_ymd_opt(2025, 3, 9).unwrap(),
            day_resets_at: Utc.with_ymd_and_hms(2025, 3, 10, 4, 0, 0).unwrap(),
        };
        let json = serde_json::to_value(&clock).unwrap();
        assert_eq!(json["local_date"], "2025-03-09");
        assert_eq!(json["day_resets_at"], "2025-03-10T04:00:00Z");
    }
}
