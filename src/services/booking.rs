use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

use crate::db::queries::{self, InsertOutcome};
use crate::errors::SchedulingError;
use crate::models::directory::total_duration_minutes;
use crate::models::{Appointment, AppointmentStatus, Interval, Service};
use crate::services::busy::collect_busy_blocks;
use crate::services::calendar::SyncOperation;
use crate::services::sync::dispatch_push;
use crate::state::AppState;

#[derive(Debug, Clone)]
pub struct NewAppointment {
    pub tenant_id: String,
    /// `None` records the booking without an occupancy check.
    pub staff_id: Option<String>,
    pub customer_id: String,
    pub service_ids: Vec<String>,
    pub start_at: DateTime<Utc>,
}

fn load_services(
    state: &AppState,
    tenant_id: &str,
    service_ids: &[String],
) -> Result<Vec<Service>, SchedulingError> {
    let db = state.conn();
    service_ids
        .iter()
        .map(|id| {
            queries::get_service(&db, tenant_id, id)?
                .ok_or_else(|| SchedulingError::ServiceNotFound(id.clone()))
        })
        .collect()
}

/// Books `request` if its interval is still free for the staff member.
///
/// The busy check and the insert run under the staff member's lock for the
/// tenant-local start date, and the insert re-checks internal overlap inside
/// an `IMMEDIATE` transaction. Writers for other staff or days never wait.
pub async fn create_appointment(
    state: &Arc<AppState>,
    request: NewAppointment,
) -> Result<Appointment, SchedulingError> {
    let tenant = {
        let db = state.conn();
        queries::get_tenant(&db, &request.tenant_id)?
            .ok_or_else(|| SchedulingError::TenantNotFound(request.tenant_id.clone()))?
    };
    let tz = tenant.tz()?;

    let services = load_services(state, &tenant.id, &request.service_ids)?;
    let minutes = total_duration_minutes(&services);
    if minutes <= 0 {
        return Err(SchedulingError::InvalidDuration(minutes));
    }
    let interval = Interval::with_duration(request.start_at, Duration::minutes(minutes))?;

    let now = state.clock.now().naive_utc();
    let appointment = Appointment {
        id: Uuid::new_v4().to_string(),
        tenant_id: tenant.id.clone(),
        customer_id: request.customer_id,
        staff_id: request.staff_id,
        service_ids: request.service_ids,
        start_at: interval.start(),
        end_at: interval.end(),
        status: AppointmentStatus::Scheduled,
        created_at: now,
        updated_at: now,
    };

    let Some(staff_id) = appointment.staff_id.clone() else {
        tracing::warn!(
            tenant_id = %tenant.id,
            start = %interval.start(),
            "booking without staff, occupancy not checked"
        );
        insert(state, &appointment)?;
        return Ok(appointment);
    };

    {
        let db = state.conn();
        queries::get_staff(&db, &tenant.id, &staff_id)?
            .filter(|s| s.active)
            .ok_or_else(|| SchedulingError::StaffNotFound(staff_id.clone()))?;
    }

    let local_date = interval.start().with_timezone(&tz).date_naive();
    let _guard = state.booking_locks.acquire(&staff_id, local_date).await;

    let busy = collect_busy_blocks(state, &tenant.id, &staff_id, &interval).await?;
    if let Some(block) = busy.conflicts_with(&interval) {
        tracing::info!(
            tenant_id = %tenant.id,
            staff_id = %staff_id,
            start = %interval.start(),
            source = ?block.source,
            blocking = ?block.ref_id,
            "booking rejected, slot taken"
        );
        return Err(conflict(&staff_id, &interval));
    }

    insert(state, &appointment)?;
    dispatch_push(
        Arc::clone(&state.calendar),
        state.config.sync_retry,
        appointment.id.clone(),
        staff_id,
        SyncOperation::Create,
    );
    Ok(appointment)
}

fn conflict(staff_id: &str, interval: &Interval) -> SchedulingError {
    SchedulingError::SlotConflict {
        staff_id: staff_id.to_string(),
        start: interval.start(),
        end: interval.end(),
    }
}

fn insert(state: &AppState, appointment: &Appointment) -> Result<(), SchedulingError> {
    let mut db = state.conn();
    match queries::insert_appointment_checked(&mut db, appointment)? {
        InsertOutcome::Inserted => {
            tracing::info!(
                appointment_id = %appointment.id,
                tenant_id = %appointment.tenant_id,
                staff_id = ?appointment.staff_id,
                start = %appointment.start_at,
                end = %appointment.end_at,
                "appointment booked"
            );
            Ok(())
        }
        InsertOutcome::Conflict { existing_id } => {
            tracing::info!(appointment_id = %appointment.id, existing_id = %existing_id, "booking lost race");
            let staff_id = appointment.staff_id.as_deref().unwrap_or_default();
            Err(SchedulingError::SlotConflict {
                staff_id: staff_id.to_string(),
                start: appointment.start_at,
                end: appointment.end_at,
            })
        }
    }
}

pub fn get_appointment(state: &AppState, id: &str) -> Result<Appointment, SchedulingError> {
    let db = state.conn();
    queries::get_appointment(&db, id)?
        .ok_or_else(|| SchedulingError::AppointmentNotFound(id.to_string()))
}

/// Moves an appointment to `next`. Terminal statuses are final, so a status
/// change never re-occupies time.
pub fn update_status(
    state: &AppState,
    id: &str,
    next: AppointmentStatus,
) -> Result<Appointment, SchedulingError> {
    let mut appointment = get_appointment(state, id)?;
    if !appointment.status.can_transition_to(next) {
        return Err(SchedulingError::InvalidTransition {
            from: appointment.status.as_str().to_string(),
            to: next.as_str().to_string(),
        });
    }

    let now = state.clock.now().naive_utc();
    {
        let db = state.conn();
        if !queries::update_appointment_status(&db, id, next, now)? {
            return Err(SchedulingError::AppointmentNotFound(id.to_string()));
        }
    }
    tracing::info!(appointment_id = %id, from = appointment.status.as_str(), to = next.as_str(), "appointment status changed");
    appointment.status = next;
    appointment.updated_at = now;

    if let Some(staff_id) = appointment.staff_id.clone() {
        let operation = if next == AppointmentStatus::Canceled {
            SyncOperation::Delete
        } else {
            SyncOperation::Update
        };
        dispatch_push(
            Arc::clone(&state.calendar),
            state.config.sync_retry,
            appointment.id.clone(),
            staff_id,
            operation,
        );
    }
    Ok(appointment)
}

pub fn cancel_appointment(state: &AppState, id: &str) -> Result<Appointment, SchedulingError> {
    update_status(state, id, AppointmentStatus::Canceled)
}
