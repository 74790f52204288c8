use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::db::queries;
use crate::errors::{AppError, SchedulingError};
use crate::models::directory::{parse_timezone, validate_granularity, DEFAULT_SLOT_GRANULARITY_MINUTES};
use crate::models::{Service, Staff, Tenant, WeeklyHours};
use crate::state::AppState;

fn check_auth(headers: &HeaderMap, expected_token: &str) -> Result<(), AppError> {
    let auth = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");

    let token = auth.strip_prefix("Bearer ").unwrap_or("");
    if token.is_empty() || token != expected_token {
        return Err(AppError::Unauthorized);
    }
    Ok(())
}

// GET /api/admin/tenants/:id
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TenantSettingsResponse {
    #[serde(flatten)]
    tenant: Tenant,
    hours_summary: String,
}

impl From<Tenant> for TenantSettingsResponse {
    fn from(tenant: Tenant) -> Self {
        Self {
            hours_summary: tenant.business_hours.to_human_readable(),
            tenant,
        }
    }
}

pub async fn get_tenant(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<TenantSettingsResponse>, AppError> {
    check_auth(&headers, &state.config.admin_token)?;

    let db = state.conn();
    let tenant = queries::get_tenant(&db, &id)
        .map_err(SchedulingError::from)?
        .ok_or(SchedulingError::TenantNotFound(id))?;
    Ok(Json(tenant.into()))
}

// POST /api/admin/tenants/:id
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateTenantRequest {
    pub name: Option<String>,
    pub timezone: Option<String>,
    /// Weekly template; validated before anything is saved.
    pub business_hours: Option<serde_json::Value>,
    pub slot_granularity_minutes: Option<i64>,
}

pub async fn update_tenant(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(body): Json<UpdateTenantRequest>,
) -> Result<Json<TenantSettingsResponse>, AppError> {
    check_auth(&headers, &state.config.admin_token)?;

    let db = state.conn();
    let mut tenant = queries::get_tenant(&db, &id)
        .map_err(SchedulingError::from)?
        .unwrap_or_else(|| Tenant {
            id: id.clone(),
            name: String::new(),
            timezone: "UTC".to_string(),
            business_hours: WeeklyHours::default(),
            slot_granularity_minutes: DEFAULT_SLOT_GRANULARITY_MINUTES,
        });

    if let Some(name) = body.name {
        tenant.name = name;
    }
    if let Some(tz) = body.timezone {
        parse_timezone(&tz)?;
        tenant.timezone = tz;
    }
    if let Some(hours) = body.business_hours {
        tenant.business_hours = WeeklyHours::from_json(&hours.to_string())?;
    }
    if let Some(minutes) = body.slot_granularity_minutes {
        validate_granularity(minutes)?;
        tenant.slot_granularity_minutes = minutes;
    }

    queries::upsert_tenant(&db, &tenant).map_err(SchedulingError::from)?;
    tracing::info!(tenant_id = %tenant.id, hours = %tenant.business_hours.to_human_readable(), "tenant settings saved");
    Ok(Json(tenant.into()))
}

// POST /api/admin/tenants/:id/staff
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpsertStaffRequest {
    pub id: String,
    pub name: String,
    #[serde(default = "default_active")]
    pub active: bool,
    pub hours_override: Option<serde_json::Value>,
}

fn default_active() -> bool {
    true
}

pub async fn upsert_staff(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(tenant_id): Path<String>,
    Json(body): Json<UpsertStaffRequest>,
) -> Result<Json<Staff>, AppError> {
    check_auth(&headers, &state.config.admin_token)?;

    let hours_override = body
        .hours_override
        .filter(|v| !v.is_null())
        .map(|v| WeeklyHours::from_json(&v.to_string()))
        .transpose()?;

    let staff = Staff {
        id: body.id,
        tenant_id,
        name: body.name,
        active: body.active,
        hours_override,
    };

    let db = state.conn();
    queries::get_tenant(&db, &staff.tenant_id)
        .map_err(SchedulingError::from)?
        .ok_or_else(|| SchedulingError::TenantNotFound(staff.tenant_id.clone()))?;
    if !queries::upsert_staff(&db, &staff).map_err(SchedulingError::from)? {
        tracing::warn!(tenant_id = %staff.tenant_id, staff_id = %staff.id, "staff id owned by another tenant");
        return Err(SchedulingError::IdTaken {
            kind: "staff",
            id: staff.id,
        }
        .into());
    }
    tracing::info!(tenant_id = %staff.tenant_id, staff_id = %staff.id, active = staff.active, "staff saved");
    Ok(Json(staff))
}

// POST /api/admin/tenants/:id/services
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpsertServiceRequest {
    pub id: String,
    pub name: String,
    pub duration_minutes: i64,
    #[serde(default)]
    pub price: i64,
    #[serde(default)]
    pub set_discount_eligible: bool,
}

pub async fn upsert_service(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(tenant_id): Path<String>,
    Json(body): Json<UpsertServiceRequest>,
) -> Result<Json<Service>, AppError> {
    check_auth(&headers, &state.config.admin_token)?;

    if body.duration_minutes <= 0 {
        return Err(SchedulingError::InvalidDuration(body.duration_minutes).into());
    }

    let service = Service {
        id: body.id,
        tenant_id,
        name: body.name,
        duration_minutes: body.duration_minutes,
        price: body.price,
        set_discount_eligible: body.set_discount_eligible,
    };

    let db = state.conn();
    queries::get_tenant(&db, &service.tenant_id)
        .map_err(SchedulingError::from)?
        .ok_or_else(|| SchedulingError::TenantNotFound(service.tenant_id.clone()))?;
    if !queries::upsert_service(&db, &service).map_err(SchedulingError::from)? {
        return Err(SchedulingError::IdTaken {
            kind: "service",
            id: service.id,
        }
        .into());
    }
    Ok(Json(service))
}
