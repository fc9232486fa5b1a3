//! Day-key derivation and wall-clock access.
//!
//! [`Calendar`] is the single place where instants are mapped to local
//! calendar days and where a day plus a [`FireTime`] is turned back into an
//! instant. [`Clock`] supplies "now" so pruning and scheduling decisions can
//! be driven deterministically in tests.

use chrono::{
    DateTime, FixedOffset, Local, LocalResult, NaiveDateTime, Offset, TimeDelta, TimeZone, Utc,
};
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicI64, Ordering};

use crate::model::{DayKey, FireTime};

/// Time zone used to bucket instants into calendar days.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Calendar {
    /// The host's local time zone, DST rules included.
    #[default]
    Local,
    /// A fixed UTC offset.
    Fixed(FixedOffset),
}

impl Calendar {
    #[must_use]
    pub fn utc() -> Self {
        Self::Fixed(Utc.fix())
    }

    /// Truncate an instant to its local calendar day.
    #[must_use]
    pub fn day_key(&self, instant: DateTime<Utc>) -> DayKey {
        match self {
            Self::Local => DayKey::new(instant.with_timezone(&Local).date_naive()),
            Self::Fixed(offset) => DayKey::new(instant.with_timezone(offset).date_naive()),
        }
    }

    /// The instant at which a reminder for `day` fires.
    ///
    /// Ambiguous local times (DST fall-back) resolve to the earlier instant.
    /// Local times skipped by a DST jump move forward by the size of the gap.
    #[must_use]
    pub fn trigger_at(&self, day: DayKey, fire_time: FireTime) -> DateTime<Utc> {
        let naive = day.date().and_time(fire_time.as_naive_time());
        match self {
            Self::Local => resolve(&Local, naive),
            Self::Fixed(offset) => resolve(offset, naive),
        }
    }

    /// Today's day key.
    #[must_use]
    pub fn today(&self, clock: &dyn Clock) -> DayKey {
        self.day_key(clock.now())
    }
}

fn resolve<Tz: TimeZone>(tz: &Tz, naive: NaiveDateTime) -> DateTime<Utc> {
    match tz.from_local_datetime(&naive) {
        LocalResult::Single(t) | LocalResult::Ambiguous(t, _) => t.with_timezone(&Utc),
        LocalResult::None => {
            let shifted = naive + TimeDelta::hours(1);
            tz.from_local_datetime(&shifted)
                .earliest()
                .map_or_else(|| naive.and_utc(), |t| t.with_timezone(&Utc))
        }
    }
}

impl fmt::Display for Calendar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Local => f.write_str("local"),
            Self::Fixed(offset) => write!(f, "{offset}"),
        }
    }
}

/// A timezone setting that is neither `local`, `utc`, nor `±HH:MM`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid timezone '{0}': expected \"local\", \"utc\", or an offset like \"+02:00\"")]
pub struct InvalidTimezone(pub String);

impl FromStr for Calendar {
    type Err = InvalidTimezone;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let raw = s.trim();
        match raw.to_ascii_lowercase().as_str() {
            "local" | "" => return Ok(Self::Local),
            "utc" | "z" => return Ok(Self::utc()),
            _ => {}
        }

        let invalid = || InvalidTimezone(s.to_string());
        let (sign, rest) = match raw.as_bytes().first() {
            Some(b'+') => (1, &raw[1..]),
            Some(b'-') => (-1, &raw[1..]),
            _ => return Err(invalid()),
        };
        let (hours, minutes) = rest.split_once(':').ok_or_else(invalid)?;
        let hours: i32 = hours.parse().map_err(|_| invalid())?;
        let minutes: i32 = minutes.parse().map_err(|_| invalid())?;
        if !(0..=23).contains(&hours) || !(0..=59).contains(&minutes) {
            return Err(invalid());
        }
        FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60))
            .map(Self::Fixed)
            .ok_or_else(invalid)
    }
}

/// Source of the current instant.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    millis: AtomicI64,
}

impl ManualClock {
    #[must_use]
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            millis: AtomicI64::new(now.timestamp_millis()),
        }
    }

    pub fn set(&self, now: DateTime<Utc>) {
        self.millis.store(now.timestamp_millis(), Ordering::SeqCst);
    }

    pub fn advance(&self, by: TimeDelta) {
        self.millis.fetch_add(by.num_milliseconds(), Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        DateTime::from_timestamp_millis(self.millis.load(Ordering::SeqCst)).unwrap_or_default()
    }
}
