use chrono::NaiveDate;
use serde::Serialize;

/// A bookable start point. Derived per request, never stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AvailableSlot {
    /// Tenant-local `HH:mm`.
    pub start_time: String,
    pub end_time: String,
    pub staff_id: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub free_staff_ids: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DayCount {
    pub date: NaiveDate,
    pub count: usize,
}

/// A day (or staff member) in a fan-out that could not be computed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FanOutFailure {
    pub key: String,
    pub error: String,
}
