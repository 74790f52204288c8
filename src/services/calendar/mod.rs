pub mod http;
pub mod ics;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::models::Interval;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncOperation {
    Create,
    Update,
    Delete,
}

impl SyncOperation {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncOperation::Create => "create",
            SyncOperation::Update => "update",
            SyncOperation::Delete => "delete",
        }
    }
}

/// External calendar collaborator. Both calls are best-effort and may fail
/// independently per staff member.
#[async_trait]
pub trait CalendarSync: Send + Sync {
    /// Busy time for `staff_id` inside `[time_min, time_max)`. Classifying raw
    /// events (shift vs. booking) is the collaborator's job; every returned
    /// interval is opaque busy time.
    async fn fetch_busy_events(
        &self,
        staff_id: &str,
        time_min: DateTime<Utc>,
        time_max: DateTime<Utc>,
    ) -> anyhow::Result<Vec<Interval>>;

    async fn push_appointment_sync(
        &self,
        appointment_id: &str,
        staff_id: &str,
        operation: SyncOperation,
    ) -> anyhow::Result<()>;
}

/// Used when no calendar collaborator is configured.
pub struct NoopCalendarSync;

#[async_trait]
impl CalendarSync for NoopCalendarSync {
    async fn fetch_busy_events(
        &self,
        _staff_id: &str,
        _time_min: DateTime<Utc>,
        _time_max: DateTime<Utc>,
    ) -> anyhow::Result<Vec<Interval>> {
        Ok(vec![])
    }

    async fn push_appointment_sync(
        &self,
        _appointment_id: &str,
        _staff_id: &str,
        _operation: SyncOperation,
    ) -> anyhow::Result<()> {
        Ok(())
    }
}
