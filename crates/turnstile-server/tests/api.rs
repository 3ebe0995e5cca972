//! HTTP behaviour of the turnstile API.

use std::sync::Arc;

use axum::http::StatusCode;
use axum_test::TestServer;
use chrono::{Duration, TimeZone, Utc};
use serde_json::{json, Value};
use turnstile_core::{AccessService, Config, FacilityConfig, ManualClock};
use turnstile_server::api::create_router;
use turnstile_server::state::AppState;

const FACILITY: &str = "gym-dakar-01";
const EXIT_CODE: &str = "exit_gym_12345";

struct Harness {
    server: TestServer,
    clock: Arc<ManualClock>,
}

fn harness() -> Harness {
    let mut config = Config::default();
    config.facilities = vec![FacilityConfig {
        id: FACILITY.to_string(),
        name: "Dakar Plateau".to_string(),
        exit_credential: EXIT_CODE.to_string(),
        timezone: Some("Africa/Dakar".to_string()),
    }];
    let clock = Arc::new(ManualClock::new(
        Utc.with_ymd_and_hms(2025, 1, 15, 10, 30, 0).unwrap(),
    ));
    let service = AccessService::in_memory(config, clock.clone()).unwrap();
    let server = TestServer::new(create_router(AppState::shared(service))).unwrap();
    Harness { server, clock }
}

async fn grant_membership(server: &TestServer, membership_id: &str) {
    server
        .put(&format!("/api/directory/entitlements/membership/{membership_id}"))
        .json(&json!({
            "facility_id": FACILITY,
            "state": "active"
        }))
        .await
        .assert_status_ok();
}

async fn issue(server: &TestServer, owner_id: &str, membership_id: &str) -> Value {
    let response = server
        .post("/api/access-codes")
        .json(&json!({ "owner_id": owner_id, "membership_id": membership_id }))
        .await;
    response.assert_status(StatusCode::CREATED);
    response.json::<Value>()
}

async fn scan(server: &TestServer, code: &str) -> axum_test::TestResponse {
    server
        .post("/api/check-ins/scan")
        .json(&json!({ "facility_id": FACILITY, "code": code, "staff_id": "staff_1" }))
        .await
}

async fn presence(server: &TestServer, user_id: &str) -> String {
    let body = server
        .get(&format!("/api/check-ins/status/{user_id}/{FACILITY}"))
        .await
        .json::<Value>();
    body["state"].as_str().unwrap_or_default().to_string()
}

#[tokio::test]
async fn test_health() {
    let h = harness();
    let response = h.server.get("/health").await;
    response.assert_status_ok();
    let body = response.json::<Value>();
    assert_eq!(body["status"], "ok");
    assert_eq!(body["facilities"].as_array().map(Vec::len), Some(1));
    assert_eq!(body["facilities"][0]["id"], FACILITY);
    assert_eq!(body["facilities"][0]["timezone"], "Africa/Dakar");
    assert_eq!(body["facilities"][0]["local_date"], "2025-01-15");
    assert_eq!(body["facilities"][0]["day_resets_at"], "2025-01-16T00:00:00Z");
}

#[tokio::test]
async fn test_entry_exit_reentry_over_http() {
    let h = harness();
    grant_membership(&h.server, "mem_1").await;
    let code = issue(&h.server, "user_123", "mem_1").await;
    let value = code["current_value"].as_str().unwrap().to_string();

    assert_eq!(presence(&h.server, "user_123").await, "not_entered");

    h.clock.advance(Duration::minutes(5));
    let response = scan(&h.server, &value).await;
    response.assert_status(StatusCode::CREATED);
    let body = response.json::<Value>();
    assert_eq!(body["event"]["kind"], "entry");
    assert_eq!(body["event"]["validated_by"], "staff_1");
    assert_eq!(body["owner"]["id"], "user_123");
    assert_eq!(presence(&h.server, "user_123").await, "in_gym");

    h.clock.advance(Duration::minutes(1));
    let response = scan(&h.server, &value).await;
    response.assert_status(StatusCode::CONFLICT);
    assert_eq!(response.json::<Value>()["error"], "ALREADY_INSIDE");

    h.clock.advance(Duration::minutes(4));
    let response = h
        .server
        .get("/api/check-ins/exit")
        .add_query_param("facility_id", FACILITY)
        .add_query_param("exit_code", EXIT_CODE)
        .await;
    response.assert_status_ok();
    assert_eq!(response.json::<Value>()["event"]["kind"], "exit");
    assert_eq!(presence(&h.server, "user_123").await, "exited");

    h.clock.advance(Duration::minutes(1));
    scan(&h.server, &value).await.assert_status(StatusCode::CREATED);
    assert_eq!(presence(&h.server, "user_123").await, "in_gym");

    let stats = h
        .server
        .get(&format!("/api/check-ins/stats/{FACILITY}"))
        .await
        .json::<Value>();
    assert_eq!(stats["entries"], 2);
    assert_eq!(stats["exits"], 1);
    assert_eq!(stats["currently_inside"], 1);
    assert_eq!(stats["date"], "2025-01-15");

    let live = h
        .server
        .get(&format!("/api/check-ins/live/{FACILITY}"))
        .await
        .json::<Value>();
    assert_eq!(live["count"], 1);
    assert_eq!(live["users"][0]["user_id"], "user_123");
}

#[tokio::test]
async fn test_exit_errors() {
    let h = harness();

    let response = h
        .server
        .get("/api/check-ins/exit")
        .add_query_param("facility_id", FACILITY)
        .add_query_param("exit_code", EXIT_CODE)
        .await;
    response.assert_status(StatusCode::BAD_REQUEST);
    assert_eq!(response.json::<Value>()["error"], "NO_ACTIVE_ENTRY");

    let response = h
        .server
        .get("/api/check-ins/exit")
        .add_query_param("facility_id", FACILITY)
        .add_query_param("exit_code", "exit_wrong")
        .await;
    response.assert_status(StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_scan_refusals() {
    let h = harness();

    scan(&h.server, "garbage").await.assert_status(StatusCode::BAD_REQUEST);
    scan(&h.server, "acc_AAAAAAAAAAAAAAAAAAAAAAAA")
        .await
        .assert_status(StatusCode::NOT_FOUND);

    // No entitlement record for this membership.
    let code = issue(&h.server, "user_9", "mem_unknown").await;
    let response = scan(&h.server, code["current_value"].as_str().unwrap()).await;
    response.assert_status(StatusCode::FORBIDDEN);
    assert!(response.json::<Value>()["details"]["reason"].is_string());

    grant_membership(&h.server, "mem_1").await;
    let code = issue(&h.server, "user_1", "mem_1").await;
    h.clock.advance(Duration::hours(1));
    let response = scan(&h.server, code["current_value"].as_str().unwrap()).await;
    response.assert_status(StatusCode::GONE);
    assert_eq!(response.json::<Value>()["error"], "CODE_EXPIRED");
}

#[tokio::test]
async fn test_display_and_refresh() {
    let h = harness();
    h.server
        .get("/api/access-codes/display")
        .add_query_param("owner_id", "user_1")
        .await
        .assert_status(StatusCode::NOT_FOUND);

    let code = issue(&h.server, "user_1", "mem_1").await;
    let display = h
        .server
        .get("/api/access-codes/display")
        .add_query_param("owner_id", "user_1")
        .await
        .json::<Value>();
    assert_eq!(display["current_value"], code["current_value"]);
    let share_token = code["share_token"].as_str().unwrap();
    assert_eq!(
        display["refresh_url"],
        format!("/api/access-codes/refresh?share_token={share_token}")
    );

    h.clock.advance(Duration::minutes(55));
    let response = h
        .server
        .post("/api/access-codes/refresh")
        .add_query_param("share_token", share_token)
        .await;
    response.assert_status_ok();
    let refreshed = response.json::<Value>();
    assert_eq!(refreshed["code_id"], code["id"]);
    assert_ne!(refreshed["current_value"], code["current_value"]);

    h.server
        .post("/api/access-codes/refresh")
        .add_query_param("share_token", "token_missing")
        .await
        .assert_status(StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_issue_validation() {
    let h = harness();
    h.server
        .post("/api/access-codes")
        .json(&json!({ "owner_id": "user_1" }))
        .await
        .assert_status(StatusCode::BAD_REQUEST);
    h.server
        .post("/api/access-codes")
        .json(&json!({ "owner_id": "user_1", "membership_id": "m", "session_pass_id": "p" }))
        .await
        .assert_status(StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_owner_codes_and_revoke() {
    let h = harness();
    grant_membership(&h.server, "mem_1").await;
    let code = issue(&h.server, "user_1", "mem_1").await;
    scan(&h.server, code["current_value"].as_str().unwrap())
        .await
        .assert_status(StatusCode::CREATED);

    let listing = h
        .server
        .get("/api/access-codes/owners/user_1")
        .await
        .json::<Value>();
    assert_eq!(listing["count"], 1);

    let code_id = code["id"].as_str().unwrap();
    h.server
        .delete(&format!("/api/access-codes/{code_id}"))
        .await
        .assert_status(StatusCode::NO_CONTENT);
    h.server
        .delete(&format!("/api/access-codes/{code_id}"))
        .await
        .assert_status(StatusCode::NOT_FOUND);
    h.server
        .delete("/api/access-codes/not-a-uuid")
        .await
        .assert_status(StatusCode::BAD_REQUEST);

    assert_eq!(presence(&h.server, "user_1").await, "exited");
    let listing = h
        .server
        .get("/api/access-codes/owners/user_1")
        .await
        .json::<Value>();
    assert_eq!(listing["count"], 0);
}

#[tokio::test]
async fn test_directory_owner_shown_at_scan() {
    let h = harness();
    grant_membership(&h.server, "mem_1").await;
    h.server
        .put("/api/directory/owners/user_1")
        .json(&json!({ "first_name": "Awa", "last_name": "Ndiaye" }))
        .await
        .assert_status_ok();

    let code = issue(&h.server, "user_1", "mem_1").await;
    let body = scan(&h.server, code["current_value"].as_str().unwrap())
        .await
        .json::<Value>();
    assert_eq!(body["owner"]["first_name"], "Awa");

    h.server
        .delete("/api/directory/owners/user_1")
        .await
        .assert_status(StatusCode::NO_CONTENT);
    h.server
        .delete("/api/directory/owners/user_1")
        .await
        .assert_status(StatusCode::NOT_FOUND);
    h.server
        .delete("/api/directory/entitlements/session_pass/mem_1")
        .await
        .assert_status(StatusCode::NOT_FOUND);
    h.server
        .delete("/api/directory/entitlements/membership/mem_1")
        .await
        .assert_status(StatusCode::NO_CONTENT);
}

#[tokio::test]
async fn test_entitlement_kinds_sharing_an_id() {
    let h = harness();
    grant_membership(&h.server, "ent_7").await;
    h.server
        .put("/api/directory/entitlements/session_pass/ent_7")
        .json(&json!({ "facility_id": "gym-elsewhere", "state": "active" }))
        .await
        .assert_status_ok();

    // The session pass did not replace the membership.
    let code = issue(&h.server, "user_1", "ent_7").await;
    scan(&h.server, code["current_value"].as_str().unwrap())
        .await
        .assert_status(StatusCode::CREATED);

    let pass = h
        .server
        .post("/api/access-codes")
        .json(&json!({ "owner_id": "user_2", "session_pass_id": "ent_7" }))
        .await
        .json::<Value>();
    let response = scan(&h.server, pass["current_value"].as_str().unwrap()).await;
    response.assert_status(StatusCode::FORBIDDEN);

    h.server
        .put("/api/directory/entitlements/day_pass/ent_7")
        .json(&json!({ "facility_id": FACILITY, "state": "active" }))
        .await
        .assert_status(StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_unknown_facility() {
    let h = harness();
    h.server
        .get("/api/check-ins/stats/gym-nowhere")
        .await
        .assert_status(StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_openapi_served() {
    let h = harness();
    let doc = h.server.get("/api/openapi.json").await.json::<Value>();
    assert_eq!(doc["info"]["title"], "turnstile API");
    assert!(doc["paths"]["/api/check-ins/scan"].is_object());
}
