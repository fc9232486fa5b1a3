//! Per-plant watering status shown in listings.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;

use crate::calendar::Calendar;
use crate::model::DayKey;

/// Where a plant stands relative to its next due date, in calendar days.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum WateringStatus {
    /// Due on a later day.
    Upcoming { on: DayKey },
    DueToday,
    /// Due on an earlier day. `days` counts calendar days, so a plant due
    /// yesterday is one day overdue.
    Overdue { days: i64 },
}

impl WateringStatus {
    #[must_use]
    pub fn compute(next_water_at: DateTime<Utc>, now: DateTime<Utc>, calendar: Calendar) -> Self {
        let due = calendar.day_key(next_water_at);
        let today = calendar.day_key(now);
        match today.days_until(due) {
            0 => Self::DueToday,
            d if d > 0 => Self::Upcoming { on: due },
            d => Self::Overdue { days: -d },
        }
    }

    #[must_use]
    pub const fn is_overdue(self) -> bool {
        matches!(self, Self::Overdue { .. })
    }
}

impl fmt::Display for WateringStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Upcoming { on } => write!(f, "Water on {}", on.date().format("%a %b %-d")),
            Self::DueToday => f.write_str("Water today!"),
            Self::Overdue { days: 1 } => f.write_str("Overdue for 1 day"),
            Self::Overdue { days } => write!(f, "Overdue for {days} days"),
        }
    }
}
