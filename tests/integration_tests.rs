use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::routing::{get, post};
use axum::Router;
use chrono::{DateTime, Utc};
use tower::ServiceExt;

use salonbook::config::AppConfig;
use salonbook::db;
use salonbook::handlers;
use salonbook::models::Interval;
use salonbook::services::calendar::{CalendarSync, SyncOperation};
use salonbook::services::clock::FixedClock;
use salonbook::state::AppState;

// ── Mock Calendar ──

#[derive(Default)]
struct MockCalendar {
    busy: Vec<(String, Interval)>,
    down_for: Option<String>,
    pushes: Mutex<Vec<(String, SyncOperation)>>,
}

#[async_trait]
impl CalendarSync for MockCalendar {
    async fn fetch_busy_events(
        &self,
        staff_id: &str,
        time_min: DateTime<Utc>,
        time_max: DateTime<Utc>,
    ) -> anyhow::Result<Vec<Interval>> {
        if self.down_for.as_deref() == Some(staff_id) {
            anyhow::bail!("calendar unreachable");
        }
        Ok(self
            .busy
            .iter()
            .filter(|(id, b)| id == staff_id && b.start() < time_max && b.end() > time_min)
            .map(|(_, b)| *b)
            .collect())
    }

    async fn push_appointment_sync(
        &self,
        appointment_id: &str,
        _staff_id: &str,
        operation: SyncOperation,
    ) -> anyhow::Result<()> {
        self.pushes
            .lock()
            .unwrap()
            .push((appointment_id.to_string(), operation));
        Ok(())
    }
}

// ── Helpers ──

const AUTH: &str = "Bearer test-token";

fn utc(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
}

fn test_config() -> AppConfig {
    AppConfig {
        admin_token: "test-token".to_string(),
        ..AppConfig::default()
    }
}

fn test_state_with(calendar: MockCalendar) -> Arc<AppState> {
    let conn = db::init_db(":memory:").unwrap();
    Arc::new(AppState::new(
        conn,
        test_config(),
        Arc::new(calendar),
        Arc::new(FixedClock(utc("2024-06-01T08:00:00Z"))),
    ))
}

fn test_state() -> Arc<AppState> {
    test_state_with(MockCalendar::default())
}

fn test_app(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(handlers::health::health))
        .route(
            "/api/availability",
            get(handlers::availability::get_availability)
                .post(handlers::availability::post_availability),
        )
        .route(
            "/api/available-dates",
            get(handlers::availability::get_available_dates)
                .post(handlers::availability::post_available_dates),
        )
        .route(
            "/api/available-dates/stream",
            get(handlers::availability::stream_available_dates),
        )
        .route(
            "/api/appointments",
            get(handlers::appointments::list_appointments)
                .post(handlers::appointments::create_appointment),
        )
        .route(
            "/api/appointments/:id",
            get(handlers::appointments::get_appointment),
        )
        .route(
            "/api/appointments/:id/cancel",
            post(handlers::appointments::cancel_appointment),
        )
        .route(
            "/api/appointments/:id/status",
            post(handlers::appointments::update_status),
        )
        .route(
            "/api/appointments/:id/ics",
            get(handlers::appointments::download_ics),
        )
        .route(
            "/api/admin/tenants/:id",
            get(handlers::admin::get_tenant).post(handlers::admin::update_tenant),
        )
        .route(
            "/api/admin/tenants/:id/staff",
            post(handlers::admin::upsert_staff),
        )
        .route(
            "/api/admin/tenants/:id/services",
            post(handlers::admin::upsert_service),
        )
        .with_state(state)
}

fn get_req(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn post_json(uri: &str, body: serde_json::Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("Content-Type", "application/json")
        .header("Authorization", AUTH)
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn send(app: &Router, req: Request<Body>) -> (StatusCode, serde_json::Value) {
    let res = app.clone().oneshot(req).await.unwrap();
    let status = res.status();
    let body = axum::body::to_bytes(res.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = serde_json::from_slice(&body).unwrap_or(serde_json::Value::Null);
    (status, json)
}

/// Tenant `t1` in UTC, open 09:00-18:00 on weekdays, one stylist and one
/// 60 minute service, configured through the admin API.
async fn seed_salon(app: &Router) {
    let (status, _) = send(
        app,
        post_json(
            "/api/admin/tenants/t1",
            serde_json::json!({
                "name": "Studio Nord",
                "timezone": "UTC",
                "slotGranularityMinutes": 30,
                "businessHours": {
                    "mon": {"open": "09:00", "close": "18:00"},
                    "tue": {"open": "09:00", "close": "18:00"},
                    "wed": {"open": "09:00", "close": "18:00"},
                    "thu": {"open": "09:00", "close": "18:00"},
                    "fri": {"open": "09:00", "close": "18:00"},
                    "sat": null,
                    "sun": null
                }
            }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = send(
        app,
        post_json(
            "/api/admin/tenants/t1/staff",
            serde_json::json!({"id": "s1", "name": "Mia"}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = send(
        app,
        post_json(
            "/api/admin/tenants/t1/services",
            serde_json::json!({"id": "cut", "name": "Haircut", "durationMinutes": 60, "price": 4500}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
}

async fn book(app: &Router, staff_id: Option<&str>, start_at: &str) -> (StatusCode, serde_json::Value) {
    send(
        app,
        post_json(
            "/api/appointments",
            serde_json::json!({
                "tenantId": "t1",
                "staffId": staff_id,
                "customerId": "cust-1",
                "serviceIds": ["cut"],
                "startAt": start_at
            }),
        ),
    )
    .await
}

fn slot_starts(json: &serde_json::Value) -> Vec<String> {
    json["availableSlots"]
        .as_array()
        .unwrap()
        .iter()
        .map(|s| s["startTime"].as_str().unwrap().to_string())
        .collect()
}

// ── Health ──

#[tokio::test]
async fn test_health() {
    let app = test_app(test_state());
    let (status, json) = send(&app, get_req("/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "ok");
}

// ── Admin API Tests ──

#[tokio::test]
async fn test_admin_requires_auth() {
    let app = test_app(test_state());

    let (status, json) = send(&app, get_req("/api/admin/tenants/t1")).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(json["success"], false);
    assert_eq!(json["error"], "Unauthorized");
}

#[tokio::test]
async fn test_admin_wrong_token() {
    let app = test_app(test_state());

    let res = app
        .oneshot(
            Request::builder()
                .uri("/api/admin/tenants/t1")
                .header("Authorization", "Bearer wrong-token")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_admin_tenant_settings_round_trip() {
    let app = test_app(test_state());
    seed_salon(&app).await;

    let (status, json) = send(
        &app,
        Request::builder()
            .uri("/api/admin/tenants/t1")
            .header("Authorization", AUTH)
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["name"], "Studio Nord");
    assert_eq!(json["slotGranularityMinutes"], 30);
    assert!(json["hoursSummary"]
        .as_str()
        .unwrap()
        .starts_with("Mon: 09:00-18:00"));
}

#[tokio::test]
async fn test_admin_rejects_overnight_hours() {
    let app = test_app(test_state());

    let (status, json) = send(
        &app,
        post_json(
            "/api/admin/tenants/t1",
            serde_json::json!({"businessHours": {"fri": {"open": "20:00", "close": "02:00"}}}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error"], "InvalidHours");
}

#[tokio::test]
async fn test_admin_rejects_bad_timezone_and_granularity() {
    let app = test_app(test_state());

    let (status, json) = send(
        &app,
        post_json("/api/admin/tenants/t1", serde_json::json!({"timezone": "Mars/Olympus"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error"], "InvalidTimezone");

    let (status, _) = send(
        &app,
        post_json("/api/admin/tenants/t1", serde_json::json!({"slotGranularityMinutes": 7})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

// ── Availability ──

#[tokio::test]
async fn test_admin_rejects_foreign_staff_and_service_ids() {
    let app = test_app(test_state());
    seed_salon(&app).await;
    let (status, _) = send(
        &app,
        post_json("/api/admin/tenants/t2", serde_json::json!({"name": "Rival"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, json) = send(
        &app,
        post_json(
            "/api/admin/tenants/t2/staff",
            serde_json::json!({"id": "s1", "name": "Other", "active": false}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(json["error"], "IdTaken");

    let (status, json) = send(
        &app,
        post_json(
            "/api/admin/tenants/t2/services",
            serde_json::json!({"id": "cut", "name": "Long", "durationMinutes": 200}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(json["error"], "IdTaken");

    // t1 keeps its active stylist and 60 minute service
    let (status, json) = send(
        &app,
        post_json(
            "/api/availability",
            serde_json::json!({"tenantId": "t1", "staffId": "s1", "date": "2024-06-10", "serviceIds": ["cut"]}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(slot_starts(&json).len(), 17);
    assert_eq!(json["availableSlots"][0]["endTime"], "10:00");
}

#[tokio::test]
async fn test_availability_excludes_booked_hour() {
    let app = test_app(test_state());
    seed_salon(&app).await;
    let (status, _) = book(&app, Some("s1"), "2024-06-10T10:00:00Z").await;
    assert_eq!(status, StatusCode::OK);

    let (status, json) = send(
        &app,
        get_req("/api/availability?tenantId=t1&staffId=s1&date=2024-06-10&serviceDurationMinutes=60"),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["success"], true);

    let starts = slot_starts(&json);
    assert_eq!(starts.first().map(String::as_str), Some("09:00"));
    assert_eq!(starts.get(1).map(String::as_str), Some("11:00"));
    assert_eq!(starts.last().map(String::as_str), Some("17:00"));
    assert!(!starts.iter().any(|s| s == "09:30" || s == "10:00" || s == "10:30"));
    assert_eq!(json["availableSlots"][0]["endTime"], "10:00");
}

#[tokio::test]
async fn test_availability_post_with_service_ids() {
    let app = test_app(test_state());
    seed_salon(&app).await;

    let (status, json) = send(
        &app,
        post_json(
            "/api/availability",
            serde_json::json!({"tenantId": "t1", "date": "2024-06-10", "serviceIds": ["cut"], "detail": true}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(slot_starts(&json).len(), 17);
    assert_eq!(json["availableSlots"][0]["freeStaffIds"][0], "s1");
}

#[tokio::test]
async fn test_availability_closed_day_has_message() {
    let app = test_app(test_state());
    seed_salon(&app).await;

    let (status, json) = send(
        &app,
        get_req("/api/availability?tenantId=t1&date=2024-06-09&serviceDurationMinutes=60"),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(json["availableSlots"].as_array().unwrap().is_empty());
    assert!(json["message"].is_string());
}

#[tokio::test]
async fn test_availability_degrades_when_calendar_down() {
    let state = test_state_with(MockCalendar {
        down_for: Some("s1".to_string()),
        ..MockCalendar::default()
    });
    let app = test_app(state);
    seed_salon(&app).await;

    let (status, json) = send(
        &app,
        get_req("/api/availability?tenantId=t1&date=2024-06-10&serviceDurationMinutes=60"),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(slot_starts(&json).len(), 17);
    assert_eq!(json["degradedStaff"][0], "s1");
}

#[tokio::test]
async fn test_availability_invalid_duration() {
    let app = test_app(test_state());
    seed_salon(&app).await;

    let (status, json) = send(
        &app,
        get_req("/api/availability?tenantId=t1&date=2024-06-10&serviceDurationMinutes=0"),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error"], "InvalidDuration");
}

#[tokio::test]
async fn test_availability_unknown_staff() {
    let app = test_app(test_state());
    seed_salon(&app).await;

    let (status, json) = send(
        &app,
        get_req("/api/availability?tenantId=t1&staffId=nobody&date=2024-06-10"),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json["error"], "StaffNotFound");
}

#[tokio::test]
async fn test_availability_blank_staff_means_any() {
    let app = test_app(test_state());
    seed_salon(&app).await;

    let (status, json) = send(
        &app,
        get_req("/api/availability?tenantId=t1&staffId=&date=2024-06-10&serviceDurationMinutes=60"),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(slot_starts(&json).len(), 17);
}

#[tokio::test]
async fn test_available_dates_counts_days() {
    let app = test_app(test_state());
    seed_salon(&app).await;

    let (status, json) = send(
        &app,
        get_req("/api/available-dates?tenantId=t1&startDate=2024-06-07&numDays=4&serviceDurationMinutes=60"),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["success"], true);

    let days = json["days"].as_array().unwrap();
    assert_eq!(days.len(), 4);
    assert_eq!(days[0]["date"], "2024-06-07");
    assert_eq!(days[0]["count"], 17);
    // Weekend days are checked and empty, not missing.
    assert_eq!(days[1]["count"], 0);
    assert_eq!(days[2]["count"], 0);
    assert_eq!(days[3]["count"], 17);
    assert!(json["failures"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_available_dates_rejects_window_size() {
    let app = test_app(test_state());
    seed_salon(&app).await;

    let (status, json) = send(
        &app,
        get_req("/api/available-dates?tenantId=t1&startDate=2024-06-07&numDays=0"),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error"], "BadRequest");

    let (status, _) = send(
        &app,
        get_req("/api/available-dates?tenantId=t1&startDate=2024-06-07&numDays=500"),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_available_dates_stream_ends_with_done() {
    let app = test_app(test_state());
    seed_salon(&app).await;

    let res = app
        .clone()
        .oneshot(get_req(
            "/api/available-dates/stream?tenantId=t1&startDate=2024-06-10&numDays=2&serviceDurationMinutes=60",
        ))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(res.headers().get("content-type").unwrap(), "text/event-stream");

    let body = axum::body::to_bytes(res.into_body(), usize::MAX)
        .await
        .unwrap();
    let text = String::from_utf8(body.to_vec()).unwrap();
    assert_eq!(text.matches("event: day\n").count(), 2);
    assert!(text.contains("\"date\":\"2024-06-10\""));
    assert!(text.contains("event: done"));
}

// ── Booking ──

#[tokio::test]
async fn test_booking_returns_id_and_pushes_create() {
    let state = test_state();
    let app = test_app(state.clone());
    seed_salon(&app).await;

    let (status, json) = book(&app, Some("s1"), "2024-06-10T14:00:00Z").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["success"], true);
    let id = json["appointmentId"].as_str().unwrap().to_string();
    assert_eq!(json["appointment"]["endAt"], "2024-06-10T15:00:00Z");

    let (status, json) = send(&app, get_req(&format!("/api/appointments/{id}"))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "scheduled");
}

#[tokio::test]
async fn test_conflicting_booking_rejected() {
    let app = test_app(test_state());
    seed_salon(&app).await;

    let (status, _) = book(&app, Some("s1"), "2024-06-10T10:00:00Z").await;
    assert_eq!(status, StatusCode::OK);

    let (status, json) = book(&app, Some("s1"), "2024-06-10T10:30:00Z").await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(json["success"], false);
    assert_eq!(json["error"], "SlotConflict");

    // Back-to-back is fine.
    let (status, _) = book(&app, Some("s1"), "2024-06-10T11:00:00Z").await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_external_busy_blocks_booking() {
    let state = test_state_with(MockCalendar {
        busy: vec![(
            "s1".to_string(),
            Interval::new(utc("2024-06-10T12:00:00Z"), utc("2024-06-10T13:00:00Z")).unwrap(),
        )],
        ..MockCalendar::default()
    });
    let app = test_app(state);
    seed_salon(&app).await;

    let (status, json) = book(&app, Some("s1"), "2024-06-10T12:30:00Z").await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(json["error"], "SlotConflict");
}

#[tokio::test]
async fn test_cancel_reopens_slot() {
    let app = test_app(test_state());
    seed_salon(&app).await;

    let (_, json) = book(&app, Some("s1"), "2024-06-10T10:00:00Z").await;
    let id = json["appointmentId"].as_str().unwrap().to_string();

    let (status, json) = send(
        &app,
        post_json(&format!("/api/appointments/{id}/cancel"), serde_json::json!({})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "canceled");

    let (status, _) = book(&app, Some("s1"), "2024-06-10T10:00:00Z").await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_status_update_and_invalid_transition() {
    let app = test_app(test_state());
    seed_salon(&app).await;

    let (_, json) = book(&app, Some("s1"), "2024-06-10T10:00:00Z").await;
    let id = json["appointmentId"].as_str().unwrap().to_string();
    let uri = format!("/api/appointments/{id}/status");

    let (status, json) = send(&app, post_json(&uri, serde_json::json!({"status": "confirmed"}))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "confirmed");

    let (status, _) = send(&app, post_json(&uri, serde_json::json!({"status": "completed"}))).await;
    assert_eq!(status, StatusCode::OK);

    let (status, json) = send(&app, post_json(&uri, serde_json::json!({"status": "scheduled"}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error"], "InvalidTransition");

    let (status, _) = send(&app, post_json(&uri, serde_json::json!({"status": "sleeping"}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_list_appointments_for_day() {
    let app = test_app(test_state());
    seed_salon(&app).await;
    book(&app, Some("s1"), "2024-06-10T10:00:00Z").await;
    book(&app, Some("s1"), "2024-06-11T10:00:00Z").await;
    book(&app, None, "2024-06-10T15:00:00Z").await;

    let (status, json) = send(&app, get_req("/api/appointments?tenantId=t1&date=2024-06-10")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json.as_array().unwrap().len(), 2);

    let (_, json) = send(
        &app,
        get_req("/api/appointments?tenantId=t1&date=2024-06-10&staffId=s1"),
    )
    .await;
    assert_eq!(json.as_array().unwrap().len(), 1);
}

// ── Calendar export ──

#[tokio::test]
async fn test_ics_not_found() {
    let app = test_app(test_state());
    let (status, json) = send(&app, get_req("/api/appointments/nonexistent/ics")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json["error"], "AppointmentNotFound");
}

#[tokio::test]
async fn test_ics_download() {
    let app = test_app(test_state());
    seed_salon(&app).await;
    let (_, json) = book(&app, Some("s1"), "2024-06-10T14:00:00Z").await;
    let id = json["appointmentId"].as_str().unwrap().to_string();

    let res = app
        .clone()
        .oneshot(get_req(&format!("/api/appointments/{id}/ics")))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(
        res.headers().get("content-type").unwrap(),
        "text/calendar; charset=utf-8"
    );

    let body = axum::body::to_bytes(res.into_body(), usize::MAX)
        .await
        .unwrap();
    let text = String::from_utf8(body.to_vec()).unwrap();
    assert!(text.contains("BEGIN:VEVENT"));
    assert!(text.contains("DTSTART:20240610T140000Z"));
    assert!(text.contains("SUMMARY:Appointment at Studio Nord"));
    assert!(text.contains("DESCRIPTION:Haircut"));
}
