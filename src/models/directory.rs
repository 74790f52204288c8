use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use crate::errors::SchedulingError;
use crate::models::WeeklyHours;

pub const DEFAULT_SLOT_GRANULARITY_MINUTES: i64 = 30;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tenant {
    pub id: String,
    pub name: String,
    pub timezone: String,
    pub business_hours: WeeklyHours,
    pub slot_granularity_minutes: i64,
}

impl Tenant {
    pub fn tz(&self) -> Result<Tz, SchedulingError> {
        parse_timezone(&self.timezone)
    }
}

pub fn parse_timezone(name: &str) -> Result<Tz, SchedulingError> {
    name.parse::<Tz>()
        .map_err(|_| SchedulingError::InvalidTimezone(name.to_string()))
}

/// Granularity must tile a day evenly so every staff grid stays regular.
pub fn validate_granularity(minutes: i64) -> Result<(), SchedulingError> {
    if !(5..=240).contains(&minutes) || 1440 % minutes != 0 {
        return Err(SchedulingError::InvalidHours(format!(
            "slot granularity must be 5-240 minutes and divide a day evenly, got {minutes}"
        )));
    }
    Ok(())
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Staff {
    pub id: String,
    pub tenant_id: String,
    pub name: String,
    pub active: bool,
    pub hours_override: Option<WeeklyHours>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Service {
    pub id: String,
    pub tenant_id: String,
    pub name: String,
    pub duration_minutes: i64,
    pub price: i64,
    pub set_discount_eligible: bool,
}

pub fn total_duration_minutes(services: &[Service]) -> i64 {
    services.iter().map(|s| s.duration_minutes).sum()
}
