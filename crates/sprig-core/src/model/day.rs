use chrono::{Datelike, NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

/// A local calendar day, the bucketing identity for notification entries.
///
/// Two instants map to the same `DayKey` iff they fall on the same calendar
/// day in the calendar's time zone. Derive keys through
/// [`Calendar::day_key`](crate::calendar::Calendar::day_key) rather than by
/// comparing instants pairwise.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DayKey(NaiveDate);

impl DayKey {
    #[must_use]
    pub const fn new(date: NaiveDate) -> Self {
        Self(date)
    }

    #[must_use]
    pub fn from_ymd(year: i32, month: u32, day: u32) -> Option<Self> {
        NaiveDate::from_ymd_opt(year, month, day).map(Self)
    }

    #[must_use]
    pub const fn date(self) -> NaiveDate {
        self.0
    }

    /// Whole calendar days from `self` to `later` (negative if `later` is earlier).
    #[must_use]
    pub fn days_until(self, later: Self) -> i64 {
        later.0.signed_duration_since(self.0).num_days()
    }

    /// The following calendar day, if representable.
    #[must_use]
    pub fn succ(self) -> Option<Self> {
        self.0.succ_opt().map(Self)
    }
}

impl fmt::Display for DayKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:04}-{:02}-{:02}",
            self.0.year(),
            self.0.month(),
            self.0.day()
        )
    }
}

impl FromStr for DayKey {
    type Err = chrono::ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d").map(Self)
    }
}

/// Daily time-of-day at which every day-level alert fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "RawFireTime")]
pub struct FireTime {
    hour: u8,
    minute: u8,
}

#[derive(Deserialize)]
struct RawFireTime {
    hour: u8,
    minute: u8,
}

impl TryFrom<RawFireTime> for FireTime {
    type Error = InvalidFireTime;

    fn try_from(raw: RawFireTime) -> Result<Self, Self::Error> {
        Self::new(raw.hour, raw.minute)
    }
}

/// A fire time outside `00:00..=23:59`, or text that is not `HH:MM`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid reminder time '{input}': expected HH:MM between 00:00 and 23:59")]
pub struct InvalidFireTime {
    pub input: String,
}

impl FireTime {
    /// Default reminder time for a fresh install.
    pub const DEFAULT: Self = Self { hour: 7, minute: 0 };

    pub fn new(hour: u8, minute: u8) -> Result<Self, InvalidFireTime> {
        if hour > 23 || minute > 59 {
            return Err(InvalidFireTime {
                input: format!("{hour}:{minute}"),
            });
        }
        Ok(Self { hour, minute })
    }

    #[must_use]
    pub const fn hour(self) -> u8 {
        self.hour
    }

    #[must_use]
    pub const fn minute(self) -> u8 {
        self.minute
    }

    #[must_use]
    pub fn as_naive_time(self) -> NaiveTime {
        NaiveTime::from_hms_opt(u32::from(self.hour), u32::from(self.minute), 0)
            .unwrap_or(NaiveTime::MIN)
    }
}

impl Default for FireTime {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl fmt::Display for FireTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}", self.hour, self.minute)
    }
}

impl FromStr for FireTime {
    type Err = InvalidFireTime;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || InvalidFireTime {
            input: s.to_string(),
        };
        let (hour, minute) = s.trim().split_once(':').ok_or_else(invalid)?;
        let hour = hour.parse::<u8>().map_err(|_| invalid())?;
        let minute = minute.parse::<u8>().map_err(|_| invalid())?;
        Self::new(hour, minute).map_err(|_| invalid())
    }
}
