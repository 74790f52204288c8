use std::collections::BTreeMap;

use chrono::{NaiveTime, Weekday};
use serde::{Deserialize, Serialize};

use crate::errors::SchedulingError;

const DAY_ORDER: [&str; 7] = ["mon", "tue", "wed", "thu", "fri", "sat", "sun"];

/// Opening hours for one weekday, wall-clock in the tenant timezone.
/// Always `open < close`; overnight windows are rejected when parsed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawWindow", into = "RawWindow")]
pub struct WorkingWindow {
    open: NaiveTime,
    close: NaiveTime,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct RawWindow {
    open: String,
    close: String,
}

impl WorkingWindow {
    pub fn new(open: NaiveTime, close: NaiveTime) -> Result<Self, SchedulingError> {
        if close <= open {
            return Err(SchedulingError::InvalidHours(format!(
                "close {} must be after open {} (overnight windows are not supported)",
                close.format("%H:%M"),
                open.format("%H:%M")
            )));
        }
        Ok(Self { open, close })
    }

    pub fn open(&self) -> NaiveTime {
        self.open
    }

    pub fn close(&self) -> NaiveTime {
        self.close
    }
}

impl TryFrom<RawWindow> for WorkingWindow {
    type Error = SchedulingError;

    fn try_from(raw: RawWindow) -> Result<Self, Self::Error> {
        WorkingWindow::new(parse_time(&raw.open)?, parse_time(&raw.close)?)
    }
}

impl From<WorkingWindow> for RawWindow {
    fn from(w: WorkingWindow) -> Self {
        RawWindow {
            open: w.open.format("%H:%M").to_string(),
            close: w.close.format("%H:%M").to_string(),
        }
    }
}

/// Weekly template keyed by `mon`..`sun`. A `null` value marks the day closed.
///
/// For a tenant default a missing weekday is closed; for a staff override a
/// missing weekday inherits the tenant default.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WeeklyHours {
    days: BTreeMap<String, Option<WorkingWindow>>,
}

impl WeeklyHours {
    pub fn from_json(s: &str) -> Result<Self, SchedulingError> {
        let raw: BTreeMap<String, Option<WorkingWindow>> = serde_json::from_str(s)
            .map_err(|e| SchedulingError::InvalidHours(e.to_string()))?;

        let mut days = BTreeMap::new();
        for (day, window) in raw {
            parse_weekday(&day)?;
            days.insert(day.to_lowercase(), window);
        }
        Ok(Self { days })
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(&self.days).unwrap_or_else(|_| "{}".to_string())
    }

    /// `None` when the weekday is not mentioned at all, `Some(None)` when it is
    /// explicitly closed.
    pub fn entry(&self, day: Weekday) -> Option<Option<WorkingWindow>> {
        self.days.get(weekday_key(day)).copied()
    }

    pub fn window(&self, day: Weekday) -> Option<WorkingWindow> {
        self.entry(day).flatten()
    }

    pub fn to_human_readable(&self) -> String {
        DAY_ORDER
            .iter()
            .filter_map(|day| {
                self.days.get(*day).map(|window| match window {
                    Some(w) => format!(
                        "{}: {}-{}",
                        capitalize(day),
                        w.open.format("%H:%M"),
                        w.close.format("%H:%M")
                    ),
                    None => format!("{}: closed", capitalize(day)),
                })
            })
            .collect::<Vec<_>>()
            .join(", ")
    }
}

fn weekday_key(day: Weekday) -> &'static str {
    match day {
        Weekday::Mon => "mon",
        Weekday::Tue => "tue",
        Weekday::Wed => "wed",
        Weekday::Thu => "thu",
        Weekday::Fri => "fri",
        Weekday::Sat => "sat",
        Weekday::Sun => "sun",
    }
}

fn capitalize(s: &str) -> String {
    let mut c = s.chars();
    match c.next() {
        None => String::new(),
        Some(f) => f.to_uppercase().to_string() + c.as_str(),
    }
}

fn parse_weekday(s: &str) -> Result<Weekday, SchedulingError> {
    match s.to_lowercase().as_str() {
        "mon" => Ok(Weekday::Mon),
        "tue" => Ok(Weekday::Tue),
        "wed" => Ok(Weekday::Wed),
        "thu" => Ok(Weekday::Thu),
        "fri" => Ok(Weekday::Fri),
        "sat" => Ok(Weekday::Sat),
        "sun" => Ok(Weekday::Sun),
        _ => Err(SchedulingError::InvalidHours(format!("invalid weekday: {s}"))),
    }
}

pub fn parse_time(s: &str) -> Result<NaiveTime, SchedulingError> {
    NaiveTime::parse_from_str(s, "%H:%M")
        .map_err(|_| SchedulingError::InvalidHours(format!("invalid time: {s}")))
}
