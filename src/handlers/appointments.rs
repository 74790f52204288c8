use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::header;
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::db::queries;
use crate::errors::{AppError, SchedulingError};
use crate::models::{Appointment, AppointmentStatus};
use crate::services::booking::{self, NewAppointment};
use crate::services::calendar::ics::generate_ics;
use crate::services::working_hours::local_day;
use crate::state::AppState;

// POST /api/appointments
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateAppointmentRequest {
    pub tenant_id: String,
    pub staff_id: Option<String>,
    pub customer_id: String,
    pub service_ids: Vec<String>,
    pub start_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateAppointmentResponse {
    success: bool,
    appointment_id: String,
    appointment: Appointment,
}

pub async fn create_appointment(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateAppointmentRequest>,
) -> Result<Json<CreateAppointmentResponse>, AppError> {
    if req.customer_id.trim().is_empty() {
        return Err(AppError::BadRequest("customerId is required".to_string()));
    }

    let appointment = booking::create_appointment(
        &state,
        NewAppointment {
            tenant_id: req.tenant_id,
            staff_id: req.staff_id.filter(|s| !s.is_empty()),
            customer_id: req.customer_id,
            service_ids: req.service_ids,
            start_at: req.start_at,
        },
    )
    .await?;

    Ok(Json(CreateAppointmentResponse {
        success: true,
        appointment_id: appointment.id.clone(),
        appointment,
    }))
}

// GET /api/appointments
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListAppointmentsQuery {
    pub tenant_id: String,
    pub date: NaiveDate,
    pub staff_id: Option<String>,
}

pub async fn list_appointments(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListAppointmentsQuery>,
) -> Result<Json<Vec<Appointment>>, AppError> {
    let db = state.conn();
    let tenant = queries::get_tenant(&db, &query.tenant_id)
        .map_err(SchedulingError::from)?
        .ok_or_else(|| SchedulingError::TenantNotFound(query.tenant_id.clone()))?;
    let day = local_day(tenant.tz()?, query.date)?;

    let appointments =
        queries::list_appointments(&db, &tenant.id, &day, query.staff_id.as_deref())
            .map_err(SchedulingError::from)?;
    Ok(Json(appointments))
}

// GET /api/appointments/:id
pub async fn get_appointment(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Appointment>, AppError> {
    Ok(Json(booking::get_appointment(&state, &id)?))
}

// POST /api/appointments/:id/cancel
pub async fn cancel_appointment(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Appointment>, AppError> {
    Ok(Json(booking::cancel_appointment(&state, &id)?))
}

// POST /api/appointments/:id/status
#[derive(Debug, Deserialize)]
pub struct StatusRequest {
    pub status: String,
}

pub async fn update_status(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(body): Json<StatusRequest>,
) -> Result<Json<Appointment>, AppError> {
    let status = AppointmentStatus::parse(&body.status)
        .ok_or_else(|| AppError::BadRequest(format!("unknown status '{}'", body.status)))?;
    Ok(Json(booking::update_status(&state, &id, status)?))
}

// GET /api/appointments/:id/ics
pub async fn download_ics(
    State(state): State<Arc<AppState>>,
    Path(raw_id): Path<String>,
) -> Result<Response, AppError> {
    let id = raw_id.strip_suffix(".ics").unwrap_or(&raw_id);
    let appointment = booking::get_appointment(&state, id)?;

    let (business_name, service_names) = {
        let db = state.conn();
        let business_name = queries::get_tenant(&db, &appointment.tenant_id)
            .map_err(SchedulingError::from)?
            .map(|t| t.name)
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| "Salon".to_string());

        let mut names = Vec::with_capacity(appointment.service_ids.len());
        for service_id in &appointment.service_ids {
            match queries::get_service(&db, &appointment.tenant_id, service_id) {
                Ok(Some(service)) => names.push(service.name),
                Ok(None) => names.push(service_id.clone()),
                Err(e) => {
                    tracing::warn!(appointment_id = %appointment.id, service_id = %service_id, error = %e, "service lookup failed for .ics");
                    names.push(service_id.clone());
                }
            }
        }
        (business_name, names)
    };

    let ics = generate_ics(&appointment, &business_name, &service_names);
    let filename = format!("appointment-{id}.ics");

    Ok((
        [
            (header::CONTENT_TYPE, "text/calendar; charset=utf-8".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{filename}\""),
            ),
        ],
        ics,
    )
        .into_response())
}
