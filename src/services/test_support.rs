//! Fixtures shared by the service tests: a seeded salon and a scriptable
//! calendar collaborator.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};

use crate::config::{AppConfig, RetryPolicy};
use crate::db::{self, queries};
use crate::models::{Appointment, AppointmentStatus, Interval, Service, Staff, Tenant, WeeklyHours};
use crate::services::calendar::{CalendarSync, SyncOperation};
use crate::services::clock::FixedClock;
use crate::state::AppState;

pub const TENANT: &str = "t1";

pub const SALON_HOURS: &str = r#"{
    "mon": {"open": "09:00", "close": "18:00"},
    "tue": {"open": "09:00", "close": "18:00"},
    "wed": {"open": "09:00", "close": "18:00"},
    "thu": {"open": "09:00", "close": "18:00"},
    "fri": {"open": "09:00", "close": "18:00"},
    "sat": {"open": "09:00", "close": "18:00"},
    "sun": null
}"#;

pub fn utc(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
}

/// 2024-06-10, a Monday.
pub fn monday() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 6, 10).unwrap()
}

#[derive(Clone, Default)]
pub struct MockCalendar {
    busy: HashMap<String, Vec<Interval>>,
    failing: HashSet<String>,
    slow: HashMap<NaiveDate, Duration>,
    reject_pushes: bool,
    pub pushes: Arc<Mutex<Vec<(String, SyncOperation)>>>,
}

impl MockCalendar {
    pub fn with_busy(mut self, staff_id: &str, start: &str, end: &str) -> Self {
        self.busy
            .entry(staff_id.to_string())
            .or_default()
            .push(Interval::new(utc(start), utc(end)).unwrap());
        self
    }

    pub fn failing_for(mut self, staff_id: &str) -> Self {
        self.failing.insert(staff_id.to_string());
        self
    }

    /// Delays every fetch whose range starts on `date` (UTC).
    pub fn slow_on(mut self, date: &str, delay: Duration) -> Self {
        self.slow.insert(date.parse().unwrap(), delay);
        self
    }

    pub fn rejecting_pushes(mut self) -> Self {
        self.reject_pushes = true;
        self
    }

    pub fn pushed(&self) -> Vec<(String, SyncOperation)> {
        self.pushes.lock().unwrap().clone()
    }
}

#[async_trait]
impl CalendarSync for MockCalendar {
    async fn fetch_busy_events(
        &self,
        staff_id: &str,
        time_min: DateTime<Utc>,
        time_max: DateTime<Utc>,
    ) -> anyhow::Result<Vec<Interval>> {
        if let Some(delay) = self.slow.get(&time_min.date_naive()) {
            tokio::time::sleep(*delay).await;
        }
        if self.failing.contains(staff_id) {
            anyhow::bail!("calendar feed for {staff_id} returned 503");
        }
        Ok(self
            .busy
            .get(staff_id)
            .map(|blocks| {
                blocks
                    .iter()
                    .filter(|b| b.start() < time_max && b.end() > time_min)
                    .copied()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn push_appointment_sync(
        &self,
        appointment_id: &str,
        _staff_id: &str,
        operation: SyncOperation,
    ) -> anyhow::Result<()> {
        if self.reject_pushes {
            anyhow::bail!("calendar push rejected");
        }
        self.pushes
            .lock()
            .unwrap()
            .push((appointment_id.to_string(), operation));
        Ok(())
    }
}

pub fn test_config() -> AppConfig {
    AppConfig {
        sync_retry: RetryPolicy {
            max_attempts: 2,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(2),
        },
        ..AppConfig::default()
    }
}

/// State with the clock fixed well before the test dates.
pub fn test_state(calendar: MockCalendar) -> Arc<AppState> {
    test_state_at(calendar, "2024-06-01T00:00:00Z")
}

pub fn test_state_at(calendar: MockCalendar, now: &str) -> Arc<AppState> {
    test_state_with(calendar, test_config(), now)
}

pub fn test_state_with(calendar: MockCalendar, config: AppConfig, now: &str) -> Arc<AppState> {
    let conn = db::init_db(":memory:").unwrap();
    Arc::new(AppState::new(
        conn,
        config,
        Arc::new(calendar),
        Arc::new(FixedClock(utc(now))),
    ))
}

/// UTC tenant open 09:00-18:00 Monday to Saturday, with a 45 minute cut and
/// a 75 minute color service.
pub fn seed_salon(state: &AppState, staff_ids: &[&str]) {
    let db = state.conn();
    queries::upsert_tenant(
        &db,
        &Tenant {
            id: TENANT.to_string(),
            name: "Studio Nord".to_string(),
            timezone: "UTC".to_string(),
            business_hours: WeeklyHours::from_json(SALON_HOURS).unwrap(),
            slot_granularity_minutes: 30,
        },
    )
    .unwrap();

    for id in staff_ids {
        queries::upsert_staff(
            &db,
            &Staff {
                id: id.to_string(),
                tenant_id: TENANT.to_string(),
                name: format!("Stylist {id}"),
                active: true,
                hours_override: None,
            },
        )
        .unwrap();
    }

    for (id, minutes) in [("cut", 45), ("color", 75)] {
        queries::upsert_service(
            &db,
            &Service {
                id: id.to_string(),
                tenant_id: TENANT.to_string(),
                name: id.to_string(),
                duration_minutes: minutes,
                price: 5000,
                set_discount_eligible: false,
            },
        )
        .unwrap();
    }
}

/// Inserts a scheduled appointment directly, bypassing the booking path.
pub fn book(state: &AppState, staff_id: &str, start: &str, minutes: i64) -> String {
    let start_at = utc(start);
    let id = format!("appt-{staff_id}-{}", start_at.timestamp());
    let now = utc("2024-06-01T00:00:00Z").naive_utc();
    let appointment = Appointment {
        id: id.clone(),
        tenant_id: TENANT.to_string(),
        customer_id: "c-walkin".to_string(),
        staff_id: Some(staff_id.to_string()),
        service_ids: vec![],
        start_at,
        end_at: start_at + chrono::Duration::minutes(minutes),
        status: AppointmentStatus::Scheduled,
        created_at: now,
        updated_at: now,
    };
    let mut db = state.conn();
    queries::insert_appointment_checked(&mut db, &appointment).unwrap();
    id
}
