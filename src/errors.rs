use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use chrono::{DateTime, Utc};

#[derive(Debug, thiserror::Error)]
pub enum SchedulingError {
    #[error("invalid interval: start {start} is not before end {end}")]
    InvalidInterval {
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },

    #[error("invalid service duration: {0} minutes")]
    InvalidDuration(i64),

    #[error("tenant not found: {0}")]
    TenantNotFound(String),

    #[error("staff not found: {0}")]
    StaffNotFound(String),

    #[error("service not found: {0}")]
    ServiceNotFound(String),

    #[error("appointment not found: {0}")]
    AppointmentNotFound(String),

    #[error("external calendar unavailable for staff {staff_id}: {reason}")]
    ExternalSyncUnavailable { staff_id: String, reason: String },

    #[error("slot {start} - {end} is no longer free for staff {staff_id}")]
    SlotConflict {
        staff_id: String,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },

    #[error("{kind} id {id} belongs to another tenant")]
    IdTaken { kind: &'static str, id: String },

    #[error("appointment cannot move from {from} to {to}")]
    InvalidTransition { from: String, to: String },

    #[error("{failed} of {total} entries could not be computed")]
    PartialWindowFailure { failed: usize, total: usize },

    #[error("invalid business hours: {0}")]
    InvalidHours(String),

    #[error("invalid timezone: {0}")]
    InvalidTimezone(String),

    #[error("storage error: {0:#}")]
    Storage(#[from] anyhow::Error),
}

impl SchedulingError {
    /// Stable name used on the wire.
    pub fn kind(&self) -> &'static str {
        match self {
            SchedulingError::InvalidInterval { .. } => "InvalidInterval",
            SchedulingError::InvalidDuration(_) => "InvalidDuration",
            SchedulingError::TenantNotFound(_) => "TenantNotFound",
            SchedulingError::StaffNotFound(_) => "StaffNotFound",
            SchedulingError::ServiceNotFound(_) => "ServiceNotFound",
            SchedulingError::AppointmentNotFound(_) => "AppointmentNotFound",
            SchedulingError::ExternalSyncUnavailable { .. } => "ExternalSyncUnavailable",
            SchedulingError::SlotConflict { .. } => "SlotConflict",
            SchedulingError::IdTaken { .. } => "IdTaken",
            SchedulingError::InvalidTransition { .. } => "InvalidTransition",
            SchedulingError::PartialWindowFailure { .. } => "PartialWindowFailure",
            SchedulingError::InvalidHours(_) => "InvalidHours",
            SchedulingError::InvalidTimezone(_) => "InvalidTimezone",
            SchedulingError::Storage(_) => "Storage",
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            SchedulingError::InvalidInterval { .. }
            | SchedulingError::InvalidDuration(_)
            | SchedulingError::InvalidHours(_)
            | SchedulingError::InvalidTimezone(_)
            | SchedulingError::InvalidTransition { .. } => StatusCode::BAD_REQUEST,
            SchedulingError::TenantNotFound(_)
            | SchedulingError::StaffNotFound(_)
            | SchedulingError::ServiceNotFound(_)
            | SchedulingError::AppointmentNotFound(_) => StatusCode::NOT_FOUND,
            SchedulingError::SlotConflict { .. } | SchedulingError::IdTaken { .. } => {
                StatusCode::CONFLICT
            }
            SchedulingError::ExternalSyncUnavailable { .. } => StatusCode::BAD_GATEWAY,
            SchedulingError::PartialWindowFailure { .. } | SchedulingError::Storage(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error(transparent)]
    Scheduling(#[from] SchedulingError),

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("unauthorized")]
    Unauthorized,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, kind) = match &self {
            AppError::Scheduling(e) => (e.status(), e.kind()),
            AppError::BadRequest(_) => (StatusCode::BAD_REQUEST, "BadRequest"),
            AppError::Unauthorized => (StatusCode::UNAUTHORIZED, "Unauthorized"),
        };

        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        }

        let body = serde_json::json!({
            "success": false,
            "error": kind,
            "message": self.to_string(),
        });
        (status, axum::Json(body)).into_response()
    }
}
