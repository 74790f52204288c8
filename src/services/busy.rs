use crate::db::queries;
use crate::errors::SchedulingError;
use crate::models::interval::merge_overlapping;
use crate::models::Interval;
use crate::state::AppState;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockSource {
    /// Scheduled or confirmed appointment in our own store.
    Internal,
    /// Advisory block from the synced external calendar.
    External,
}

#[derive(Debug, Clone)]
pub struct BusyBlock {
    pub interval: Interval,
    pub source: BlockSource,
    pub ref_id: Option<String>,
}

/// Occupied time for one staff member over a range.
#[derive(Debug)]
pub struct BusySnapshot {
    pub blocks: Vec<BusyBlock>,
    /// Disjoint, sorted union of all blocks.
    pub merged: Vec<Interval>,
    /// Set when the external calendar could not be read and only internal
    /// blocks are included.
    pub external_error: Option<SchedulingError>,
}

impl BusySnapshot {
    pub fn is_degraded(&self) -> bool {
        self.external_error.is_some()
    }

    pub fn conflicts_with(&self, interval: &Interval) -> Option<&BusyBlock> {
        self.blocks.iter().find(|b| b.interval.overlaps(interval))
    }
}

/// Internal appointments plus external events for `staff_id` overlapping
/// `range`. An external fetch failure degrades to internal-only blocks; an
/// internal read failure is an error.
pub async fn collect_busy_blocks(
    state: &AppState,
    tenant_id: &str,
    staff_id: &str,
    range: &Interval,
) -> Result<BusySnapshot, SchedulingError> {
    let appointments = {
        let db = state.conn();
        queries::get_occupying_appointments(&db, tenant_id, staff_id, range)?
    };

    let mut blocks = Vec::with_capacity(appointments.len());
    for appointment in appointments {
        blocks.push(BusyBlock {
            interval: appointment.interval()?,
            source: BlockSource::Internal,
            ref_id: Some(appointment.id),
        });
    }

    let external_error = match state
        .calendar
        .fetch_busy_events(staff_id, range.start(), range.end())
        .await
    {
        Ok(events) => {
            blocks.extend(events.into_iter().map(|interval| BusyBlock {
                interval,
                source: BlockSource::External,
                ref_id: None,
            }));
            None
        }
        Err(e) => {
            let err = SchedulingError::ExternalSyncUnavailable {
                staff_id: staff_id.to_string(),
                reason: format!("{e:#}"),
            };
            tracing::warn!(tenant_id, staff_id, error = %err, "using internal busy blocks only");
            Some(err)
        }
    };

    let intervals: Vec<Interval> = blocks.iter().map(|b| b.interval).collect();
    Ok(BusySnapshot {
        merged: merge_overlapping(&intervals),
        blocks,
        external_error,
    })
}
