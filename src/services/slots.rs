use chrono::{DateTime, Duration, Utc};
use chrono_tz::Tz;

use crate::errors::SchedulingError;
use crate::models::interval::subtract;
use crate::models::Interval;

#[derive(Debug, Clone, Copy)]
pub struct SlotParams {
    duration: Duration,
    granularity: Duration,
    not_before: Option<DateTime<Utc>>,
}

impl SlotParams {
    pub fn new(
        duration_minutes: i64,
        granularity_minutes: i64,
        not_before: Option<DateTime<Utc>>,
    ) -> Result<Self, SchedulingError> {
        if duration_minutes <= 0 {
            return Err(SchedulingError::InvalidDuration(duration_minutes));
        }
        if granularity_minutes <= 0 {
            return Err(SchedulingError::InvalidHours(format!(
                "slot granularity must be positive, got {granularity_minutes}"
            )));
        }
        Ok(Self {
            duration: Duration::minutes(duration_minutes),
            granularity: Duration::minutes(granularity_minutes),
            not_before,
        })
    }

    pub fn duration(&self) -> Duration {
        self.duration
    }
}

/// Smallest `anchor + k * step` (k >= 0) that is `>= t`.
fn align_up(anchor: DateTime<Utc>, step: Duration, t: DateTime<Utc>) -> DateTime<Utc> {
    if t <= anchor {
        return anchor;
    }
    let step_secs = step.num_seconds();
    let offset = (t - anchor).num_seconds();
    let steps = (offset + step_secs - 1) / step_secs;
    anchor + Duration::seconds(steps * step_secs)
}

/// Candidate slots for one staff member.
///
/// Each working window is cut by `busy`; inside every free piece a slot
/// starts on the window's own grid (multiples of the granularity from the
/// window's open time) whenever the full duration still fits. Starts before
/// `not_before` are skipped.
pub fn generate_slots(windows: &[Interval], busy: &[Interval], params: &SlotParams) -> Vec<Interval> {
    let mut slots = Vec::new();

    for window in windows {
        for free in subtract(window, busy) {
            let mut t = align_up(window.start(), params.granularity, free.start());
            if let Some(not_before) = params.not_before {
                t = t.max(align_up(window.start(), params.granularity, not_before));
            }
            while t + params.duration <= free.end() {
                if let Ok(slot) = Interval::with_duration(t, params.duration) {
                    slots.push(slot);
                }
                t += params.granularity;
            }
        }
    }

    slots.sort_by_key(|s| s.start());
    slots.dedup();
    slots
}

/// Tenant-local `HH:mm` for a slot boundary.
pub fn wall_clock(t: DateTime<Utc>, tz: Tz) -> String {
    t.with_timezone(&tz).format("%H:%M").to_string()
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn at(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 10, h, m, 0).unwrap()
    }

    fn iv(sh: u32, sm: u32, eh: u32, em: u32) -> Interval {
        Interval::new(at(sh, sm), at(eh, em)).unwrap()
    }

    fn starts(slots: &[Interval]) -> Vec<String> {
        slots.iter().map(|s| s.start().format("%H:%M").to_string()).collect()
    }

    #[test]
    fn test_open_day_with_one_confirmed_appointment() {
        let params = SlotParams::new(60, 30, None).unwrap();
        let slots = generate_slots(&[iv(9, 0, 18, 0)], &[iv(10, 0, 11, 0)], &params);

        let mut expected = vec!["09:00".to_string()];
        for h in 11..=17 {
            expected.push(format!("{h:02}:00"));
            if h < 17 {
                expected.push(format!("{h:02}:30"));
            }
        }
        assert_eq!(starts(&slots), expected);
        assert!(!starts(&slots).contains(&"09:30".to_string()));
        assert!(!starts(&slots).contains(&"10:00".to_string()));
        assert!(!starts(&slots).contains(&"10:30".to_string()));
        assert_eq!(slots.last().unwrap().end(), at(18, 0));
    }

    #[test]
    fn test_slots_hold_duration_and_avoid_busy() {
        let busy = [iv(9, 45, 10, 15), iv(12, 10, 13, 0), iv(16, 0, 16, 20)];
        for duration in [15, 30, 45, 60, 90, 120] {
            let params = SlotParams::new(duration, 15, None).unwrap();
            for slot in generate_slots(&[iv(9, 0, 18, 0)], &busy, &params) {
                assert!(slot.duration() >= Duration::minutes(duration));
                assert!(busy.iter().all(|b| !b.overlaps(&slot)));
                assert!(iv(9, 0, 18, 0).contains(&slot));
            }
        }
    }

    #[test]
    fn test_grid_anchored_to_window_open() {
        // Opens at 09:15: the grid is :15 / :45, and a busy block ending at
        // 10:50 pushes the next start to 11:15.
        let params = SlotParams::new(30, 30, None).unwrap();
        let slots = generate_slots(&[iv(9, 15, 12, 0)], &[iv(9, 15, 10, 50)], &params);
        assert_eq!(starts(&slots), vec!["11:15"]);
    }

    #[test]
    fn test_past_starts_excluded() {
        let params = SlotParams::new(60, 30, Some(at(14, 32))).unwrap();
        let slots = generate_slots(&[iv(9, 0, 18, 0)], &[], &params);
        assert_eq!(starts(&slots), vec!["15:00", "15:30", "16:00", "16:30", "17:00"]);
        assert!(slots.iter().all(|s| s.start() >= at(14, 32)));
    }

    #[test]
    fn test_duration_longer_than_free_time() {
        let params = SlotParams::new(120, 30, None).unwrap();
        let slots = generate_slots(&[iv(9, 0, 12, 0)], &[iv(10, 0, 11, 0)], &params);
        assert!(slots.is_empty());
    }

    #[test]
    fn test_no_windows_no_slots() {
        let params = SlotParams::new(60, 30, None).unwrap();
        assert!(generate_slots(&[], &[], &params).is_empty());
    }

    #[test]
    fn test_rejects_non_positive_duration() {
        assert!(matches!(
            SlotParams::new(0, 30, None),
            Err(SchedulingError::InvalidDuration(0))
        ));
        assert!(matches!(
            SlotParams::new(-15, 30, None),
            Err(SchedulingError::InvalidDuration(-15))
        ));
    }

    #[test]
    fn test_wall_clock_in_tenant_zone() {
        let tz: Tz = "Asia/Tokyo".parse().unwrap();
        assert_eq!(wall_clock(at(1, 30), tz), "10:30");
    }
}
