use anyhow::Context;
use chrono::{DateTime, NaiveDateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};

use crate::models::{
    Appointment, AppointmentStatus, Interval, Service, Staff, Tenant, WeeklyHours,
};

const TS_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

pub fn fmt_ts(ts: &DateTime<Utc>) -> String {
    ts.format(TS_FORMAT).to_string()
}

fn parse_ts(s: &str) -> anyhow::Result<DateTime<Utc>> {
    let naive = NaiveDateTime::parse_from_str(s, TS_FORMAT)
        .with_context(|| format!("malformed timestamp in database: {s}"))?;
    Ok(naive.and_utc())
}

// ── Tenants ──

pub fn upsert_tenant(conn: &Connection, tenant: &Tenant) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO tenants (id, name, timezone, business_hours, slot_granularity_minutes)
         VALUES (?1, ?2, ?3, ?4, ?5)
         ON CONFLICT(id) DO UPDATE SET
           name = excluded.name,
           timezone = excluded.timezone,
           business_hours = excluded.business_hours,
           slot_granularity_minutes = excluded.slot_granularity_minutes,
           updated_at = datetime('now')",
        params![
            tenant.id,
            tenant.name,
            tenant.timezone,
            tenant.business_hours.to_json(),
            tenant.slot_granularity_minutes,
        ],
    )?;
    Ok(())
}

pub fn get_tenant(conn: &Connection, id: &str) -> anyhow::Result<Option<Tenant>> {
    let row = conn
        .query_row(
            "SELECT id, name, timezone, business_hours, slot_granularity_minutes
             FROM tenants WHERE id = ?1",
            params![id],
            |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, i64>(4)?,
                ))
            },
        )
        .optional()?;

    row.map(|(id, name, timezone, hours_json, slot_granularity_minutes)| {
        let business_hours = WeeklyHours::from_json(&hours_json)
            .with_context(|| format!("stored business hours for tenant {id} are invalid"))?;
        Ok(Tenant {
            id,
            name,
            timezone,
            business_hours,
            slot_granularity_minutes,
        })
    })
    .transpose()
}

// ── Staff ──

/// Returns false when the id is already owned by another tenant.
pub fn upsert_staff(conn: &Connection, staff: &Staff) -> anyhow::Result<bool> {
    let count = conn.execute(
        "INSERT INTO staff (id, tenant_id, name, active, hours_override)
         VALUES (?1, ?2, ?3, ?4, ?5)
         ON CONFLICT(id) DO UPDATE SET
           name = excluded.name,
           active = excluded.active,
           hours_override = excluded.hours_override
         WHERE staff.tenant_id = excluded.tenant_id",
        params![
            staff.id,
            staff.tenant_id,
            staff.name,
            staff.active as i32,
            staff.hours_override.as_ref().map(|h| h.to_json()),
        ],
    )?;
    Ok(count > 0)
}

pub fn get_staff(conn: &Connection, tenant_id: &str, id: &str) -> anyhow::Result<Option<Staff>> {
    let mut stmt = conn.prepare(
        "SELECT id, tenant_id, name, active, hours_override
         FROM staff WHERE tenant_id = ?1 AND id = ?2",
    )?;
    let mut rows = stmt.query_map(params![tenant_id, id], |row| Ok(parse_staff_row(row)))?;
    match rows.next() {
        Some(row) => Ok(Some(row??)),
        None => Ok(None),
    }
}

pub fn list_active_staff(conn: &Connection, tenant_id: &str) -> anyhow::Result<Vec<Staff>> {
    let mut stmt = conn.prepare(
        "SELECT id, tenant_id, name, active, hours_override
         FROM staff WHERE tenant_id = ?1 AND active = 1 ORDER BY id ASC",
    )?;
    let rows = stmt.query_map(params![tenant_id], |row| Ok(parse_staff_row(row)))?;

    let mut staff = vec![];
    for row in rows {
        staff.push(row??);
    }
    Ok(staff)
}

fn parse_staff_row(row: &rusqlite::Row) -> anyhow::Result<Staff> {
    let id: String = row.get(0)?;
    let hours_override: Option<String> = row.get(4)?;
    let hours_override = hours_override
        .map(|json| WeeklyHours::from_json(&json))
        .transpose()
        .with_context(|| format!("stored hours override for staff {id} is invalid"))?;

    Ok(Staff {
        id,
        tenant_id: row.get(1)?,
        name: row.get(2)?,
        active: row.get::<_, i32>(3)? != 0,
        hours_override,
    })
}

// ── Services ──

/// Returns false when the id is already owned by another tenant.
pub fn upsert_service(conn: &Connection, service: &Service) -> anyhow::Result<bool> {
    let count = conn.execute(
        "INSERT INTO services (id, tenant_id, name, duration_minutes, price, set_discount_eligible)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)
         ON CONFLICT(id) DO UPDATE SET
           name = excluded.name,
           duration_minutes = excluded.duration_minutes,
           price = excluded.price,
           set_discount_eligible = excluded.set_discount_eligible
         WHERE services.tenant_id = excluded.tenant_id",
        params![
            service.id,
            service.tenant_id,
            service.name,
            service.duration_minutes,
            service.price,
            service.set_discount_eligible as i32,
        ],
    )?;
    Ok(count > 0)
}

pub fn get_service(conn: &Connection, tenant_id: &str, id: &str) -> anyhow::Result<Option<Service>> {
    let service = conn
        .query_row(
            "SELECT id, tenant_id, name, duration_minutes, price, set_discount_eligible
             FROM services WHERE tenant_id = ?1 AND id = ?2",
            params![tenant_id, id],
            |row| {
                Ok(Service {
                    id: row.get(0)?,
                    tenant_id: row.get(1)?,
                    name: row.get(2)?,
                    duration_minutes: row.get(3)?,
                    price: row.get(4)?,
                    set_discount_eligible: row.get::<_, i32>(5)? != 0,
                })
            },
        )
        .optional()?;
    Ok(service)
}

// ── Appointments ──

const APPOINTMENT_COLUMNS: &str =
    "id, tenant_id, customer_id, staff_id, service_ids, start_at, end_at, status, created_at, updated_at";

/// Scheduled or confirmed appointments of one staff member overlapping `range`.
pub fn get_occupying_appointments(
    conn: &Connection,
    tenant_id: &str,
    staff_id: &str,
    range: &Interval,
) -> anyhow::Result<Vec<Appointment>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {APPOINTMENT_COLUMNS} FROM appointments
         WHERE tenant_id = ?1 AND staff_id = ?2
           AND start_at < ?3 AND end_at > ?4
           AND status IN ('scheduled', 'confirmed')
         ORDER BY start_at ASC"
    ))?;

    let rows = stmt.query_map(
        params![
            tenant_id,
            staff_id,
            fmt_ts(&range.end()),
            fmt_ts(&range.start())
        ],
        |row| Ok(parse_appointment_row(row)),
    )?;

    let mut appointments = vec![];
    for row in rows {
        appointments.push(row??);
    }
    Ok(appointments)
}

pub fn list_appointments(
    conn: &Connection,
    tenant_id: &str,
    range: &Interval,
    staff_id: Option<&str>,
) -> anyhow::Result<Vec<Appointment>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {APPOINTMENT_COLUMNS} FROM appointments
         WHERE tenant_id = ?1 AND start_at < ?2 AND end_at > ?3
           AND (?4 IS NULL OR staff_id = ?4)
         ORDER BY start_at ASC"
    ))?;

    let rows = stmt.query_map(
        params![
            tenant_id,
            fmt_ts(&range.end()),
            fmt_ts(&range.start()),
            staff_id
        ],
        |row| Ok(parse_appointment_row(row)),
    )?;

    let mut appointments = vec![];
    for row in rows {
        appointments.push(row??);
    }
    Ok(appointments)
}

pub fn get_appointment(conn: &Connection, id: &str) -> anyhow::Result<Option<Appointment>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {APPOINTMENT_COLUMNS} FROM appointments WHERE id = ?1"
    ))?;
    let mut rows = stmt.query_map(params![id], |row| Ok(parse_appointment_row(row)))?;
    match rows.next() {
        Some(row) => Ok(Some(row??)),
        None => Ok(None),
    }
}

pub enum InsertOutcome {
    Inserted,
    /// An occupying appointment for the same staff already overlaps.
    Conflict { existing_id: String },
}

/// Inserts `appointment` unless an occupying appointment of the same staff
/// overlaps it. The check and the insert run in one `IMMEDIATE` transaction.
pub fn insert_appointment_checked(
    conn: &mut Connection,
    appointment: &Appointment,
) -> anyhow::Result<InsertOutcome> {
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

    if let Some(staff_id) = appointment.staff_id.as_deref() {
        let existing: Option<String> = tx
            .query_row(
                "SELECT id FROM appointments
                 WHERE tenant_id = ?1 AND staff_id = ?2
                   AND start_at < ?3 AND end_at > ?4
                   AND status IN ('scheduled', 'confirmed')
                 LIMIT 1",
                params![
                    appointment.tenant_id,
                    staff_id,
                    fmt_ts(&appointment.end_at),
                    fmt_ts(&appointment.start_at)
                ],
                |row| row.get(0),
            )
            .optional()?;

        if let Some(existing_id) = existing {
            return Ok(InsertOutcome::Conflict { existing_id });
        }
    }

    insert_appointment(&tx, appointment)?;
    tx.commit()?;
    Ok(InsertOutcome::Inserted)
}

fn insert_appointment(conn: &Connection, appointment: &Appointment) -> anyhow::Result<()> {
    conn.execute(
        &format!(
            "INSERT INTO appointments ({APPOINTMENT_COLUMNS})
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)"
        ),
        params![
            appointment.id,
            appointment.tenant_id,
            appointment.customer_id,
            appointment.staff_id,
            serde_json::to_string(&appointment.service_ids)?,
            fmt_ts(&appointment.start_at),
            fmt_ts(&appointment.end_at),
            appointment.status.as_str(),
            appointment.created_at.format(TS_FORMAT).to_string(),
            appointment.updated_at.format(TS_FORMAT).to_string(),
        ],
    )?;
    Ok(())
}

pub fn update_appointment_status(
    conn: &Connection,
    id: &str,
    status: AppointmentStatus,
    now: NaiveDateTime,
) -> anyhow::Result<bool> {
    let count = conn.execute(
        "UPDATE appointments SET status = ?1, updated_at = ?2 WHERE id = ?3",
        params![status.as_str(), now.format(TS_FORMAT).to_string(), id],
    )?;
    Ok(count > 0)
}

fn parse_appointment_row(row: &rusqlite::Row) -> anyhow::Result<Appointment> {
    let id: String = row.get(0)?;
    let service_ids_json: String = row.get(4)?;
    let start_at_str: String = row.get(5)?;
    let end_at_str: String = row.get(6)?;
    let status_str: String = row.get(7)?;
    let created_at_str: String = row.get(8)?;
    let updated_at_str: String = row.get(9)?;

    let service_ids: Vec<String> = serde_json::from_str(&service_ids_json)
        .with_context(|| format!("malformed service ids on appointment {id}"))?;
    let status = AppointmentStatus::parse(&status_str)
        .with_context(|| format!("unknown status '{status_str}' on appointment {id}"))?;

    Ok(Appointment {
        tenant_id: row.get(1)?,
        customer_id: row.get(2)?,
        staff_id: row.get(3)?,
        service_ids,
        start_at: parse_ts(&start_at_str)?,
        end_at: parse_ts(&end_at_str)?,
        status,
        created_at: parse_ts(&created_at_str)?.naive_utc(),
        updated_at: parse_ts(&updated_at_str)?.naive_utc(),
        id,
    })
}
