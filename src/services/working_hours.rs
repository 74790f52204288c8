use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;

use crate::errors::SchedulingError;
use crate::models::interval::merge_overlapping;
use crate::models::{Interval, Staff, Tenant, WorkingWindow};

/// Absolute instant of a tenant-local wall-clock time. Ambiguous times take
/// the earlier instant; times inside a DST gap move to the first valid
/// instant after the gap.
pub fn localize(tz: Tz, date: NaiveDate, time: NaiveTime) -> Result<DateTime<Utc>, SchedulingError> {
    let naive = date.and_time(time);
    let mut candidate = naive;
    for _ in 0..=12 {
        if let Some(t) = tz.from_local_datetime(&candidate).earliest() {
            return Ok(t.with_timezone(&Utc));
        }
        candidate += Duration::minutes(15);
    }
    Err(SchedulingError::InvalidTimezone(format!(
        "{naive} does not exist in {tz}"
    )))
}

/// The whole tenant-local calendar day as an absolute interval.
pub fn local_day(tz: Tz, date: NaiveDate) -> Result<Interval, SchedulingError> {
    let next = date
        .succ_opt()
        .ok_or_else(|| SchedulingError::InvalidTimezone(format!("no day after {date}")))?;
    Interval::new(
        localize(tz, date, NaiveTime::MIN)?,
        localize(tz, next, NaiveTime::MIN)?,
    )
}

/// Staff override for the weekday when present (an explicit `null` closes the
/// day), otherwise the tenant default.
pub fn effective_window(tenant: &Tenant, staff: &Staff, date: NaiveDate) -> Option<WorkingWindow> {
    let weekday = date.weekday();
    match staff.hours_override.as_ref().and_then(|o| o.entry(weekday)) {
        Some(overridden) => overridden,
        None => tenant.business_hours.window(weekday),
    }
}

/// Working intervals of one staff member on `date`. Empty when closed.
pub fn working_intervals(
    tenant: &Tenant,
    staff: &Staff,
    date: NaiveDate,
) -> Result<Vec<Interval>, SchedulingError> {
    let Some(window) = effective_window(tenant, staff, date) else {
        return Ok(vec![]);
    };
    let tz = tenant.tz()?;
    let open = localize(tz, date, window.open())?;
    let close = localize(tz, date, window.close())?;

    // A window lying entirely inside a DST gap collapses to nothing.
    Ok(Interval::new(open, close).into_iter().collect())
}

/// Union of the working intervals of every given staff member: open whenever
/// at least one of them is.
pub fn any_staff_intervals(
    tenant: &Tenant,
    staff: &[Staff],
    date: NaiveDate,
) -> Result<Vec<Interval>, SchedulingError> {
    let mut all = Vec::new();
    for member in staff.iter().filter(|s| s.active) {
        all.extend(working_intervals(tenant, member, date)?);
    }
    Ok(merge_overlapping(&all))
}
