use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use super::day::DayKey;
use super::ids::{AlertId, PlantId};

/// One day-level reminder shared by every plant due on that day.
///
/// An entry is `scheduled` while it holds an [`AlertId`] and `unscheduled`
/// otherwise (notifications off, or the last schedule call failed).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationEntry {
    pub day: DayKey,
    pub trigger_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alert_id: Option<AlertId>,
    pub members: BTreeSet<PlantId>,
}

impl NotificationEntry {
    /// Create an entry holding a single member.
    #[must_use]
    pub fn new(
        day: DayKey,
        trigger_at: DateTime<Utc>,
        alert_id: Option<AlertId>,
        member: PlantId,
    ) -> Self {
        Self {
            day,
            trigger_at,
            alert_id,
            members: BTreeSet::from([member]),
        }
    }

    /// True once the trigger instant lies strictly before `now`.
    #[must_use]
    pub fn is_stale(&self, now: DateTime<Utc>) -> bool {
        self.trigger_at < now
    }

    #[must_use]
    pub const fn is_scheduled(&self) -> bool {
        self.alert_id.is_some()
    }

    #[must_use]
    pub fn contains(&self, plant: &PlantId) -> bool {
        self.members.contains(plant)
    }

    /// Whether `plant` is the only member left.
    #[must_use]
    pub fn is_sole_member(&self, plant: &PlantId) -> bool {
        self.members.len() == 1 && self.members.contains(plant)
    }

    /// Add a member. Returns `false` when it was already present.
    pub fn add_member(&mut self, plant: PlantId) -> bool {
        self.members.insert(plant)
    }

    /// Remove a member. Returns `false` when it was not present.
    pub fn remove_member(&mut self, plant: &PlantId) -> bool {
        self.members.remove(plant)
    }
}
