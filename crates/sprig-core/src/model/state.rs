//! The engine's persisted notification state and its on-disk record layout.
//!
//! In memory, entries live in a map keyed by [`DayKey`], so two entries for
//! the same day cannot coexist. On disk the state is a flat list of entries;
//! [`NotificationState::from_record`] restores the map and reports anything
//! that breaks the entry invariants instead of loading it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use tracing::error;

use super::day::{DayKey, FireTime};
use super::entry::NotificationEntry;
use super::ids::{AlertId, PlantId};
use crate::calendar::Calendar;

/// All notification data owned by the reconciliation engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationState {
    pub(crate) entries: BTreeMap<DayKey, NotificationEntry>,
    pub(crate) fire_time: FireTime,
    pub(crate) enabled: bool,
}

impl Default for NotificationState {
    fn default() -> Self {
        Self::new(FireTime::DEFAULT, true)
    }
}

impl NotificationState {
    #[must_use]
    pub const fn new(fire_time: FireTime, enabled: bool) -> Self {
        Self {
            entries: BTreeMap::new(),
            fire_time,
            enabled,
        }
    }

    #[must_use]
    pub const fn fire_time(&self) -> FireTime {
        self.fire_time
    }

    #[must_use]
    pub const fn is_enabled(&self) -> bool {
        self.enabled
    }

    #[must_use]
    pub fn entry(&self, day: DayKey) -> Option<&NotificationEntry> {
        self.entries.get(&day)
    }

    /// Entries in calendar order.
    pub fn entries(&self) -> impl Iterator<Item = &NotificationEntry> {
        self.entries.values()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Days on which `plant` currently has a reminder.
    #[must_use]
    pub fn days_for(&self, plant: &PlantId) -> Vec<DayKey> {
        self.entries
            .values()
            .filter(|entry| entry.contains(plant))
            .map(|entry| entry.day)
            .collect()
    }

    pub(crate) fn insert(&mut self, entry: NotificationEntry) {
        self.entries.insert(entry.day, entry);
    }

    /// Remove every entry whose trigger instant is already in the past.
    pub(crate) fn prune_stale(&mut self, now: DateTime<Utc>) -> Vec<NotificationEntry> {
        let stale: Vec<DayKey> = self
            .entries
            .values()
            .filter(|entry| entry.is_stale(now))
            .map(|entry| entry.day)
            .collect();
        stale
            .into_iter()
            .filter_map(|day| self.entries.remove(&day))
            .collect()
    }

    /// Check the committed-state invariants, returning every violation found.
    ///
    /// Staleness is not checked: stale entries are legal until the next
    /// operation touches the state.
    #[must_use]
    pub fn invariant_violations(&self, calendar: &Calendar) -> Vec<InvariantViolation> {
        let mut violations = Vec::new();
        for (day, entry) in &self.entries {
            if *day != entry.day {
                violations.push(InvariantViolation::MisfiledEntry {
                    key: *day,
                    entry_day: entry.day,
                });
            }
            if entry.members.is_empty() {
                violations.push(InvariantViolation::EmptyEntry { day: *day });
            }
            if entry.trigger_at != calendar.trigger_at(*day, self.fire_time) {
                violations.push(InvariantViolation::TriggerMismatch { day: *day });
            }
            if !self.enabled && entry.alert_id.is_some() {
                violations.push(InvariantViolation::AlertWhileDisabled { day: *day });
            }
        }
        violations
    }

    /// Flatten into the persisted layout.
    #[must_use]
    pub fn to_record(&self) -> StateRecord {
        StateRecord {
            entries: self
                .entries
                .values()
                .map(|entry| EntryRecord {
                    day: entry.day,
                    trigger_at: entry.trigger_at,
                    alert_id: entry.alert_id.clone(),
                    members: entry.members.iter().cloned().collect(),
                })
                .collect(),
            fire_time: self.fire_time,
            enabled: self.enabled,
        }
    }

    /// Rebuild state from a persisted record.
    ///
    /// Records that would violate an invariant are dropped (duplicate days,
    /// empty member lists) or repaired (alert ids while disabled, reminder
    /// times that no longer match the day's fire time in `calendar`), and
    /// each is returned as a [`ConsistencyViolation`].
    #[must_use]
    pub fn from_record(
        record: StateRecord,
        calendar: &Calendar,
    ) -> (Self, Vec<ConsistencyViolation>) {
        let mut state = Self::new(record.fire_time, record.enabled);
        let mut violations = Vec::new();

        for raw in record.entries {
            if state.entries.contains_key(&raw.day) {
                error!(day = %raw.day, alert = ?raw.alert_id, "duplicate entry for day, dropping it");
                violations.push(ConsistencyViolation::DuplicateDay {
                    day: raw.day,
                    dropped_alert: raw.alert_id,
                });
                continue;
            }

            let members: BTreeSet<PlantId> = raw.members.into_iter().collect();
            if members.is_empty() {
                error!(day = %raw.day, "entry without members, dropping it");
                violations.push(ConsistencyViolation::EmptyEntry {
                    day: raw.day,
                    dropped_alert: raw.alert_id,
                });
                continue;
            }

            let mut alert_id = raw.alert_id;
            if !state.enabled && alert_id.is_some() {
                error!(day = %raw.day, "alert recorded while notifications are off, clearing it");
                violations.push(ConsistencyViolation::AlertWhileDisabled {
                    day: raw.day,
                    cleared_alert: alert_id.take(),
                });
            }

            // The alert, if any, fires at the recorded time; the entry is
            // left unscheduled so the next reconcile books the right one.
            let expected = calendar.trigger_at(raw.day, state.fire_time);
            if raw.trigger_at != expected {
                error!(
                    day = %raw.day,
                    found = %raw.trigger_at,
                    %expected,
                    "reminder time does not match the day's fire time, recomputing it"
                );
                violations.push(ConsistencyViolation::TriggerMismatch {
                    day: raw.day,
                    found: raw.trigger_at,
                    expected,
                    dropped_alert: alert_id.take(),
                });
            }

            state.insert(NotificationEntry {
                day: raw.day,
                trigger_at: expected,
                alert_id,
                members,
            });
        }

        (state, violations)
    }
}

/// Persisted layout of [`NotificationState`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateRecord {
    #[serde(default)]
    pub entries: Vec<EntryRecord>,
    #[serde(default)]
    pub fire_time: FireTime,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

/// Persisted layout of one [`NotificationEntry`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryRecord {
    pub day: DayKey,
    pub trigger_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alert_id: Option<AlertId>,
    pub members: Vec<PlantId>,
}

const fn default_enabled() -> bool {
    true
}

/// A persisted record that could not be loaded as-is.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConsistencyViolation {
    #[error("two entries recorded for {day}; the later one was dropped")]
    DuplicateDay {
        day: DayKey,
        dropped_alert: Option<AlertId>,
    },
    #[error("entry for {day} has no members and was dropped")]
    EmptyEntry {
        day: DayKey,
        dropped_alert: Option<AlertId>,
    },
    #[error("entry for {day} held an alert while notifications were off; alert cleared")]
    AlertWhileDisabled {
        day: DayKey,
        cleared_alert: Option<AlertId>,
    },
    #[error("entry for {day} was set to fire at {found} instead of {expected}; reminder time recomputed")]
    TriggerMismatch {
        day: DayKey,
        found: DateTime<Utc>,
        expected: DateTime<Utc>,
        dropped_alert: Option<AlertId>,
    },
}

impl ConsistencyViolation {
    /// The day whose record was dropped or repaired.
    #[must_use]
    pub const fn day(&self) -> DayKey {
        match self {
            Self::DuplicateDay { day, .. }
            | Self::EmptyEntry { day, .. }
            | Self::AlertWhileDisabled { day, .. }
            | Self::TriggerMismatch { day, .. } => *day,
        }
    }
}

/// A broken invariant found by [`NotificationState::invariant_violations`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvariantViolation {
    MisfiledEntry { key: DayKey, entry_day: DayKey },
    EmptyEntry { day: DayKey },
    TriggerMismatch { day: DayKey },
    AlertWhileDisabled { day: DayKey },
}
