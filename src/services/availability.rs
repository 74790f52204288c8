use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, NaiveDate, Utc};
use chrono_tz::Tz;
use tokio::sync::mpsc;

use crate::db::queries;
use crate::errors::SchedulingError;
use crate::models::{AvailableSlot, DayCount, FanOutFailure, Interval, Staff, Tenant};
use crate::services::busy::collect_busy_blocks;
use crate::services::slots::{generate_slots, wall_clock, SlotParams};
use crate::services::working_hours::{any_staff_intervals, local_day, working_intervals};
use crate::state::AppState;

#[derive(Debug, Clone)]
pub struct SlotQuery {
    pub tenant_id: String,
    /// `None` means any staff.
    pub staff_id: Option<String>,
    pub date: NaiveDate,
    pub duration_minutes: i64,
    /// Include the free staff ids for each slot in an any-staff query.
    pub detail: bool,
}

#[derive(Debug, Default)]
pub struct DaySlots {
    pub slots: Vec<AvailableSlot>,
    /// Staff whose external calendar could not be read; their slots come from
    /// internal appointments only.
    pub degraded_staff: Vec<String>,
    /// Staff whose availability could not be computed and who are left out.
    pub failed_staff: Vec<FanOutFailure>,
}

#[derive(Debug, Clone)]
pub struct WindowQuery {
    pub tenant_id: String,
    pub staff_id: Option<String>,
    pub start_date: NaiveDate,
    pub num_days: u32,
    pub duration_minutes: i64,
}

/// Day counts for a rolling window. A day missing from `days` and listed in
/// `failures` could not be checked; a day with count 0 was checked and is full.
/// A `date/staff` failure key marks a staff member left out of that day's count.
#[derive(Debug, Default)]
pub struct WindowSummary {
    pub days: Vec<DayCount>,
    pub failures: Vec<FanOutFailure>,
}

impl WindowSummary {
    pub fn partial_failure(&self) -> Option<SchedulingError> {
        (!self.failures.is_empty()).then(|| SchedulingError::PartialWindowFailure {
            failed: self.failures.len(),
            total: self.days.len() + self.failures.len(),
        })
    }
}

#[derive(Debug, Clone)]
pub enum DayOutcome {
    Counted {
        day: DayCount,
        /// Staff left out of the count, keyed `date/staff`.
        failed_staff: Vec<FanOutFailure>,
    },
    Failed(FanOutFailure),
}

/// Everything one day's computation needs, resolved once per request.
#[derive(Debug, Clone)]
struct DayContext {
    tenant: Tenant,
    tz: Tz,
    date: NaiveDate,
    day: Interval,
    params: SlotParams,
}

struct StaffSlots {
    slots: Vec<Interval>,
    degraded: bool,
}

/// Duration for a slot query: an explicit value wins, then the summed
/// durations of `service_ids`, then `default_minutes`.
pub fn resolve_duration(
    state: &AppState,
    tenant_id: &str,
    explicit_minutes: Option<i64>,
    service_ids: &[String],
) -> Result<i64, SchedulingError> {
    if let Some(minutes) = explicit_minutes {
        if minutes <= 0 {
            return Err(SchedulingError::InvalidDuration(minutes));
        }
        return Ok(minutes);
    }

    let default_minutes = state.config.default_service_duration_minutes;
    if service_ids.is_empty() {
        return Ok(default_minutes);
    }

    let db = state.conn();
    let mut total = 0;
    for id in service_ids {
        match queries::get_service(&db, tenant_id, id)? {
            Some(service) => total += service.duration_minutes,
            None => {
                tracing::warn!(tenant_id, service_id = %id, "unknown service, using default duration");
                return Ok(default_minutes);
            }
        }
    }
    Ok(if total > 0 { total } else { default_minutes })
}

fn load_tenant(state: &AppState, tenant_id: &str) -> Result<Tenant, SchedulingError> {
    let db = state.conn();
    queries::get_tenant(&db, tenant_id)?
        .ok_or_else(|| SchedulingError::TenantNotFound(tenant_id.to_string()))
}

fn load_active_staff(state: &AppState, tenant_id: &str, staff_id: &str) -> Result<Staff, SchedulingError> {
    let db = state.conn();
    queries::get_staff(&db, tenant_id, staff_id)?
        .filter(|s| s.active)
        .ok_or_else(|| SchedulingError::StaffNotFound(staff_id.to_string()))
}

fn day_context(
    tenant: Tenant,
    date: NaiveDate,
    duration_minutes: i64,
    now: DateTime<Utc>,
) -> Result<DayContext, SchedulingError> {
    let tz = tenant.tz()?;
    let params = SlotParams::new(duration_minutes, tenant.slot_granularity_minutes, Some(now))?;
    Ok(DayContext {
        day: local_day(tz, date)?,
        tz,
        date,
        params,
        tenant,
    })
}

async fn staff_slots(
    state: &AppState,
    ctx: &DayContext,
    staff: &Staff,
) -> Result<StaffSlots, SchedulingError> {
    let windows = working_intervals(&ctx.tenant, staff, ctx.date)?;
    if windows.is_empty() {
        return Ok(StaffSlots {
            slots: vec![],
            degraded: false,
        });
    }

    let busy = collect_busy_blocks(state, &ctx.tenant.id, &staff.id, &ctx.day).await?;
    Ok(StaffSlots {
        slots: generate_slots(&windows, &busy.merged, &ctx.params),
        degraded: busy.is_degraded(),
    })
}

/// Slots for one staff member, or the union across active staff.
pub async fn day_slots(state: &Arc<AppState>, query: &SlotQuery) -> Result<DaySlots, SchedulingError> {
    let tenant = load_tenant(state, &query.tenant_id)?;
    let ctx = day_context(tenant, query.date, query.duration_minutes, state.clock.now())?;

    match query.staff_id.as_deref() {
        Some(staff_id) => {
            let staff = load_active_staff(state, &query.tenant_id, staff_id)?;
            single_staff_slots(state, &ctx, &staff).await
        }
        None => any_staff_slots(state, Arc::new(ctx), query.detail).await,
    }
}

async fn single_staff_slots(
    state: &AppState,
    ctx: &DayContext,
    staff: &Staff,
) -> Result<DaySlots, SchedulingError> {
    let computed = staff_slots(state, ctx, staff).await?;
    Ok(DaySlots {
        slots: computed
            .slots
            .iter()
            .map(|slot| AvailableSlot {
                start_time: wall_clock(slot.start(), ctx.tz),
                end_time: wall_clock(slot.end(), ctx.tz),
                staff_id: Some(staff.id.clone()),
                free_staff_ids: vec![],
            })
            .collect(),
        degraded_staff: if computed.degraded {
            vec![staff.id.clone()]
        } else {
            vec![]
        },
        failed_staff: vec![],
    })
}

async fn any_staff_slots(
    state: &Arc<AppState>,
    ctx: Arc<DayContext>,
    detail: bool,
) -> Result<DaySlots, SchedulingError> {
    let staff = {
        let db = state.conn();
        queries::list_active_staff(&db, &ctx.tenant.id)?
    };

    if any_staff_intervals(&ctx.tenant, &staff, ctx.date)?.is_empty() {
        return Ok(DaySlots::default());
    }

    let handles: Vec<_> = staff
        .into_iter()
        .map(|member| {
            let state = Arc::clone(state);
            let ctx = Arc::clone(&ctx);
            let staff_id = member.id.clone();
            let handle = tokio::spawn(async move { staff_slots(&state, &ctx, &member).await });
            (staff_id, handle)
        })
        .collect();

    let mut by_start: BTreeMap<DateTime<Utc>, (DateTime<Utc>, Vec<String>)> = BTreeMap::new();
    let mut result = DaySlots::default();

    for (staff_id, handle) in handles {
        let computed = match handle.await {
            Ok(Ok(computed)) => computed,
            Ok(Err(e)) => {
                tracing::warn!(tenant_id = %ctx.tenant.id, staff_id = %staff_id, date = %ctx.date, error = %e, "staff availability failed");
                result.failed_staff.push(FanOutFailure {
                    key: staff_id,
                    error: e.to_string(),
                });
                continue;
            }
            Err(e) => {
                tracing::error!(tenant_id = %ctx.tenant.id, staff_id = %staff_id, error = %e, "staff availability task panicked");
                result.failed_staff.push(FanOutFailure {
                    key: staff_id,
                    error: "internal error".to_string(),
                });
                continue;
            }
        };

        if computed.degraded {
            result.degraded_staff.push(staff_id.clone());
        }
        for slot in computed.slots {
            by_start
                .entry(slot.start())
                .or_insert_with(|| (slot.end(), Vec::new()))
                .1
                .push(staff_id.clone());
        }
    }

    result.slots = by_start
        .into_iter()
        .map(|(start, (end, staff_ids))| AvailableSlot {
            start_time: wall_clock(start, ctx.tz),
            end_time: wall_clock(end, ctx.tz),
            staff_id: None,
            free_staff_ids: if detail { staff_ids } else { vec![] },
        })
        .collect();
    Ok(result)
}

/// Number of bookable starts on one day, plus the staff that could not be
/// computed. A day where nothing is free and some staff could not be
/// computed is reported as a failure rather than 0.
async fn count_day(
    state: &Arc<AppState>,
    tenant: Tenant,
    staff: Option<Staff>,
    date: NaiveDate,
    duration_minutes: i64,
) -> Result<(usize, Vec<FanOutFailure>), SchedulingError> {
    let ctx = day_context(tenant, date, duration_minutes, state.clock.now())?;
    let day = match staff {
        Some(staff) => single_staff_slots(state, &ctx, &staff).await?,
        None => any_staff_slots(state, Arc::new(ctx), false).await?,
    };

    if day.slots.is_empty() && !day.failed_staff.is_empty() {
        return Err(SchedulingError::PartialWindowFailure {
            failed: day.failed_staff.len(),
            total: day.failed_staff.len(),
        });
    }
    let failed_staff = day
        .failed_staff
        .into_iter()
        .map(|failure| FanOutFailure {
            key: format!("{date}/{}", failure.key),
            error: failure.error,
        })
        .collect();
    Ok((day.slots.len(), failed_staff))
}

async fn count_day_bounded(
    state: Arc<AppState>,
    tenant: Tenant,
    staff: Option<Staff>,
    date: NaiveDate,
    duration_minutes: i64,
) -> DayOutcome {
    let timeout = state.config.day_query_timeout;
    let outcome = tokio::time::timeout(
        timeout,
        count_day(&state, tenant, staff, date, duration_minutes),
    )
    .await;

    match outcome {
        Ok(Ok((count, failed_staff))) => DayOutcome::Counted {
            day: DayCount { date, count },
            failed_staff,
        },
        Ok(Err(e)) => {
            tracing::warn!(date = %date, error = %e, "day availability failed");
            DayOutcome::Failed(FanOutFailure {
                key: date.to_string(),
                error: e.to_string(),
            })
        }
        Err(_) => {
            tracing::warn!(date = %date, timeout_ms = timeout.as_millis() as u64, "day availability timed out");
            DayOutcome::Failed(FanOutFailure {
                key: date.to_string(),
                error: format!("timed out after {}ms", timeout.as_millis()),
            })
        }
    }
}

fn window_dates(query: &WindowQuery, max_days: u32) -> Vec<NaiveDate> {
    let days = query.num_days.min(max_days);
    (0..days)
        .filter_map(|offset| {
            query
                .start_date
                .checked_add_signed(Duration::days(i64::from(offset)))
        })
        .collect()
}

fn prepare_window(
    state: &AppState,
    query: &WindowQuery,
) -> Result<(Tenant, Option<Staff>), SchedulingError> {
    if query.duration_minutes <= 0 {
        return Err(SchedulingError::InvalidDuration(query.duration_minutes));
    }
    let tenant = load_tenant(state, &query.tenant_id)?;
    tenant.tz()?;
    let staff = query
        .staff_id
        .as_deref()
        .map(|id| load_active_staff(state, &query.tenant_id, id))
        .transpose()?;
    Ok((tenant, staff))
}

/// Per-day counts for `num_days` days from `start_date`. Days run in
/// parallel and independently; a failed or timed-out day is reported in
/// `failures` and never aborts the others.
pub async fn available_dates(
    state: &Arc<AppState>,
    query: &WindowQuery,
) -> Result<WindowSummary, SchedulingError> {
    let (tenant, staff) = prepare_window(state, query)?;

    let handles: Vec<_> = window_dates(query, state.config.max_window_days)
        .into_iter()
        .map(|date| {
            let handle = tokio::spawn(count_day_bounded(
                Arc::clone(state),
                tenant.clone(),
                staff.clone(),
                date,
                query.duration_minutes,
            ));
            (date, handle)
        })
        .collect();

    let mut summary = WindowSummary::default();
    for (date, handle) in handles {
        match handle.await {
            Ok(DayOutcome::Counted { day, failed_staff }) => {
                summary.days.push(day);
                summary.failures.extend(failed_staff);
            }
            Ok(DayOutcome::Failed(failure)) => summary.failures.push(failure),
            Err(e) => {
                tracing::error!(date = %date, error = %e, "day availability task panicked");
                summary.failures.push(FanOutFailure {
                    key: date.to_string(),
                    error: "internal error".to_string(),
                });
            }
        }
    }
    Ok(summary)
}

/// Same as [`available_dates`] but day by day in date order, sending each
/// outcome as soon as it is known. Stops early when the receiver is dropped.
pub fn stream_available_dates(
    state: Arc<AppState>,
    query: WindowQuery,
) -> Result<mpsc::Receiver<DayOutcome>, SchedulingError> {
    let (tenant, staff) = prepare_window(&state, &query)?;
    let dates = window_dates(&query, state.config.max_window_days);
    let (tx, rx) = mpsc::channel(8);

    tokio::spawn(async move {
        for date in dates {
            let outcome = count_day_bounded(
                Arc::clone(&state),
                tenant.clone(),
                staff.clone(),
                date,
                query.duration_minutes,
            )
            .await;
            if tx.send(outcome).await.is_err() {
                tracing::debug!(date = %date, "window stream receiver gone, stopping");
                break;
            }
        }
    });

    Ok(rx)
}
