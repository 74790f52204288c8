use std::convert::Infallible;
use std::sync::Arc;

use axum::extract::{Query, State};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::Json;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::StreamExt;

use crate::errors::AppError;
use crate::models::{AvailableSlot, DayCount, FanOutFailure};
use crate::services::availability::{self, DayOutcome, SlotQuery, WindowQuery};
use crate::state::AppState;

/// Comma-separated ids in query strings, a list in JSON bodies.
#[derive(Debug, Default, Deserialize)]
#[serde(untagged)]
pub enum ServiceIds {
    List(Vec<String>),
    Csv(String),
    #[default]
    Missing,
}

impl ServiceIds {
    fn into_vec(self) -> Vec<String> {
        match self {
            ServiceIds::List(ids) => ids,
            ServiceIds::Csv(csv) => csv
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect(),
            ServiceIds::Missing => vec![],
        }
    }
}

// GET/POST /api/availability
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AvailabilityRequest {
    pub tenant_id: String,
    pub staff_id: Option<String>,
    pub date: NaiveDate,
    pub service_duration_minutes: Option<i64>,
    #[serde(default)]
    pub service_ids: ServiceIds,
    #[serde(default)]
    pub detail: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AvailabilityResponse {
    success: bool,
    available_slots: Vec<AvailableSlot>,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<String>,
    degraded_staff: Vec<String>,
    failed_staff: Vec<FanOutFailure>,
}

pub async fn get_availability(
    State(state): State<Arc<AppState>>,
    Query(req): Query<AvailabilityRequest>,
) -> Result<Json<AvailabilityResponse>, AppError> {
    availability_for(&state, req).await.map(Json)
}

pub async fn post_availability(
    State(state): State<Arc<AppState>>,
    Json(req): Json<AvailabilityRequest>,
) -> Result<Json<AvailabilityResponse>, AppError> {
    availability_for(&state, req).await.map(Json)
}

async fn availability_for(
    state: &Arc<AppState>,
    req: AvailabilityRequest,
) -> Result<AvailabilityResponse, AppError> {
    let service_ids = req.service_ids.into_vec();
    let duration_minutes = availability::resolve_duration(
        state,
        &req.tenant_id,
        req.service_duration_minutes,
        &service_ids,
    )?;

    let day = availability::day_slots(
        state,
        &SlotQuery {
            tenant_id: req.tenant_id,
            staff_id: req.staff_id.filter(|s| !s.is_empty()),
            date: req.date,
            duration_minutes,
            detail: req.detail,
        },
    )
    .await?;

    let message = day
        .slots
        .is_empty()
        .then(|| format!("No availability on {}", req.date));

    Ok(AvailabilityResponse {
        success: true,
        available_slots: day.slots,
        message,
        degraded_staff: day.degraded_staff,
        failed_staff: day.failed_staff,
    })
}

// GET/POST /api/available-dates
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AvailableDatesRequest {
    pub tenant_id: String,
    pub staff_id: Option<String>,
    pub start_date: NaiveDate,
    pub num_days: u32,
    pub service_duration_minutes: Option<i64>,
    #[serde(default)]
    pub service_ids: ServiceIds,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AvailableDatesResponse {
    success: bool,
    days: Vec<DayCount>,
    failures: Vec<FanOutFailure>,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<String>,
}

pub async fn get_available_dates(
    State(state): State<Arc<AppState>>,
    Query(req): Query<AvailableDatesRequest>,
) -> Result<Json<AvailableDatesResponse>, AppError> {
    available_dates_for(&state, req).await.map(Json)
}

pub async fn post_available_dates(
    State(state): State<Arc<AppState>>,
    Json(req): Json<AvailableDatesRequest>,
) -> Result<Json<AvailableDatesResponse>, AppError> {
    available_dates_for(&state, req).await.map(Json)
}

fn window_query(state: &AppState, req: AvailableDatesRequest) -> Result<WindowQuery, AppError> {
    let max = state.config.max_window_days;
    if req.num_days == 0 || req.num_days > max {
        return Err(AppError::BadRequest(format!(
            "numDays must be between 1 and {max}"
        )));
    }

    let service_ids = req.service_ids.into_vec();
    let duration_minutes = availability::resolve_duration(
        state,
        &req.tenant_id,
        req.service_duration_minutes,
        &service_ids,
    )?;

    Ok(WindowQuery {
        tenant_id: req.tenant_id,
        staff_id: req.staff_id.filter(|s| !s.is_empty()),
        start_date: req.start_date,
        num_days: req.num_days,
        duration_minutes,
    })
}

async fn available_dates_for(
    state: &Arc<AppState>,
    req: AvailableDatesRequest,
) -> Result<AvailableDatesResponse, AppError> {
    let query = window_query(state, req)?;
    let summary = availability::available_dates(state, &query).await?;
    let message = summary.partial_failure().map(|e| e.to_string());

    Ok(AvailableDatesResponse {
        success: true,
        days: summary.days,
        failures: summary.failures,
        message,
    })
}

// GET /api/available-dates/stream
pub async fn stream_available_dates(
    State(state): State<Arc<AppState>>,
    Query(req): Query<AvailableDatesRequest>,
) -> Result<Sse<impl tokio_stream::Stream<Item = Result<Event, Infallible>>>, AppError> {
    let query = window_query(&state, req)?;
    let rx = availability::stream_available_dates(Arc::clone(&state), query)?;

    let days = ReceiverStream::new(rx).map(|outcome| {
        let event = match outcome {
            DayOutcome::Counted { day, failed_staff } => {
                let mut data = serde_json::to_value(&day).unwrap_or_default();
                if !failed_staff.is_empty() {
                    data["failedStaff"] = serde_json::to_value(&failed_staff).unwrap_or_default();
                }
                Event::default().event("day").data(data.to_string())
            }
            DayOutcome::Failed(failure) => Event::default()
                .event("day_error")
                .data(serde_json::to_string(&failure).unwrap_or_default()),
        };
        Ok::<_, Infallible>(event)
    });
    let done = tokio_stream::once(Ok(Event::default().event("done").data("{}")));

    Ok(Sse::new(days.chain(done)).keep_alive(KeepAlive::default()))
}
