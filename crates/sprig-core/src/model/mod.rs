//! Notification data model: day buckets, entries, and the engine-owned state.

pub mod day;
pub mod entry;
pub mod ids;
pub mod state;

pub use day::{DayKey, FireTime, InvalidFireTime};
pub use entry::NotificationEntry;
pub use ids::{AlertId, PlantId};
pub use state::{
    ConsistencyViolation, EntryRecord, InvariantViolation, NotificationState, StateRecord,
};
