//! Plants and the store that keeps their due dates in step with reminders.
//!
//! Every mutation is saved first and then handed to a [`DueDateSink`]. The
//! in-memory list only changes once the plant file is written. A failed or
//! slow notification update never rolls back the plant change; it is
//! returned next to the updated plant instead.

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::engine::{DueDateSink, EngineError, Reconciliation, with_timeout};
use crate::error::ErrorCode;
use crate::model::PlantId;
use crate::store::{StoreError, read_json, write_json_atomic};

/// Longest allowed watering interval, in days.
pub const MAX_FREQUENCY_DAYS: u32 = 3650;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Plant {
    pub id: PlantId,
    pub name: String,
    pub watering_frequency_days: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_watered_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prev_last_watered_at: Option<DateTime<Utc>>,
    pub next_water_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub notes: Vec<String>,
}

/// Input for [`PlantStore::add_plant`].
#[derive(Debug, Clone, Default)]
pub struct NewPlant {
    /// Generated when absent.
    pub id: Option<PlantId>,
    pub name: String,
    pub watering_frequency_days: u32,
    pub last_watered_at: Option<DateTime<Utc>>,
    /// Defaults to the last watering (or now) plus the frequency.
    pub next_water_at: Option<DateTime<Utc>>,
    pub notes: Vec<String>,
}

/// Fields to change in [`PlantStore::edit_plant`]; `None` leaves a field alone.
#[derive(Debug, Clone, Default)]
pub struct PlantUpdate {
    pub name: Option<String>,
    pub watering_frequency_days: Option<u32>,
    pub next_water_at: Option<DateTime<Utc>>,
    pub notes: Option<Vec<String>>,
}

impl PlantUpdate {
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.watering_frequency_days.is_none()
            && self.next_water_at.is_none()
            && self.notes.is_none()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PlantError {
    #[error("plant not found: {0}")]
    NotFound(PlantId),
    #[error("plant already exists: {0}")]
    Duplicate(PlantId),
    #[error("watering frequency must be between 1 and 3650 days, got {0}")]
    InvalidFrequency(u32),
    #[error("plant name cannot be blank")]
    InvalidName,
    #[error("due date out of range")]
    DueDateOutOfRange,
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl PlantError {
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::NotFound(_) => ErrorCode::PlantNotFound,
            Self::Duplicate(_) => ErrorCode::DuplicatePlant,
            Self::InvalidFrequency(_) => ErrorCode::InvalidFrequency,
            Self::InvalidName => ErrorCode::InvalidPlantName,
            Self::DueDateOutOfRange => ErrorCode::InvalidDueDate,
            Self::Store(err) => err.code(),
        }
    }
}

/// What happened to the reminders after a plant change.
#[derive(Debug)]
pub enum NotificationOutcome {
    /// The change did not affect any due date.
    Untouched,
    Reconciled(Reconciliation),
    /// The engine could not persist or timed out; the plant change stands.
    Failed(EngineError),
}

impl NotificationOutcome {
    #[must_use]
    pub const fn reconciliation(&self) -> Option<&Reconciliation> {
        match self {
            Self::Reconciled(report) => Some(report),
            Self::Untouched | Self::Failed(_) => None,
        }
    }

    #[must_use]
    pub fn is_clean(&self) -> bool {
        match self {
            Self::Untouched => true,
            Self::Reconciled(report) => report.is_clean(),
            Self::Failed(_) => false,
        }
    }
}

/// Result of a successful plant mutation.
#[derive(Debug)]
pub struct PlantChange {
    pub plant: Plant,
    pub notifications: NotificationOutcome,
}

#[derive(Debug, Default, Deserialize)]
struct PlantsFile {
    #[serde(default)]
    plants: Vec<Plant>,
}

#[derive(Serialize)]
struct PlantsFileRef<'a> {
    plants: &'a [Plant],
}

/// Plant collection, optionally backed by a JSON file.
pub struct PlantStore<D> {
    path: Option<PathBuf>,
    plants: Vec<Plant>,
    sink: D,
    deadline: Option<Duration>,
}

impl<D: DueDateSink> PlantStore<D> {
    /// Load plants from `path` (missing file means no plants).
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn open(path: impl Into<PathBuf>, sink: D) -> Result<Self, PlantError> {
        let path = path.into();
        let file: PlantsFile = read_json(&path)?.unwrap_or_default();
        debug!(path = %path.display(), plants = file.plants.len(), "plants loaded");
        Ok(Self {
            path: Some(path),
            plants: file.plants,
            sink,
            deadline: None,
        })
    }

    pub const fn in_memory(sink: D) -> Self {
        Self {
            path: None,
            plants: Vec::new(),
            sink,
            deadline: None,
        }
    }

    /// Bound every notification update by `limit`.
    #[must_use]
    pub fn with_deadline(mut self, limit: Duration) -> Self {
        self.deadline = Some(limit);
        self
    }

    pub const fn sink(&self) -> &D {
        &self.sink
    }

    /// Plants, most recently added first.
    #[must_use]
    pub fn plants(&self) -> &[Plant] {
        &self.plants
    }

    #[must_use]
    pub fn get(&self, id: &PlantId) -> Option<&Plant> {
        self.plants.iter().find(|plant| &plant.id == id)
    }

    /// # Errors
    ///
    /// Fails on invalid input, a duplicate id, or if the plant file cannot be saved.
    pub async fn add_plant(
        &mut self,
        new: NewPlant,
        now: DateTime<Utc>,
    ) -> Result<PlantChange, PlantError> {
        let name = validate_name(&new.name)?;
        validate_frequency(new.watering_frequency_days)?;
        let id = new.id.unwrap_or_else(PlantId::generate);
        if self.get(&id).is_some() {
            return Err(PlantError::Duplicate(id));
        }
        let next_water_at = match new.next_water_at {
            Some(at) => at,
            None => after_days(
                new.last_watered_at.unwrap_or(now),
                new.watering_frequency_days,
            )?,
        };

        let plant = Plant {
            id,
            name,
            watering_frequency_days: new.watering_frequency_days,
            last_watered_at: new.last_watered_at,
            prev_last_watered_at: None,
            next_water_at,
            notes: new.notes,
        };
        let mut plants = Vec::with_capacity(self.plants.len() + 1);
        plants.push(plant.clone());
        plants.extend(self.plants.iter().cloned());
        self.replace(plants)?;
        info!(plant = %plant.id, name = %plant.name, next = %plant.next_water_at, "plant added");

        let notifications = self
            .notify(self.sink.add_due(&plant.id, plant.next_water_at))
            .await;
        Ok(PlantChange {
            plant,
            notifications,
        })
    }

    /// Mark the plant watered at `now` and push its due date out by its frequency.
    ///
    /// # Errors
    ///
    /// Fails if the plant does not exist or the plant file cannot be saved.
    pub async fn water_plant(
        &mut self,
        id: &PlantId,
        now: DateTime<Utc>,
    ) -> Result<PlantChange, PlantError> {
        let index = self.position(id)?;
        let mut plant = self.plants[index].clone();
        let old_due = plant.next_water_at;
        let new_due = after_days(now, plant.watering_frequency_days)?;
        plant.prev_last_watered_at = plant.last_watered_at;
        plant.last_watered_at = Some(now);
        plant.next_water_at = new_due;
        self.replace_at(index, &plant)?;
        info!(plant = %id, %old_due, %new_due, "plant watered");

        let notifications = self.notify(self.sink.edit_due(id, old_due, new_due)).await;
        Ok(PlantChange {
            plant,
            notifications,
        })
    }

    /// # Errors
    ///
    /// Fails on invalid input, if the plant does not exist, or if the plant
    /// file cannot be saved.
    pub async fn edit_plant(
        &mut self,
        id: &PlantId,
        update: PlantUpdate,
    ) -> Result<PlantChange, PlantError> {
        let index = self.position(id)?;
        let name = update.name.as_deref().map(validate_name).transpose()?;
        if let Some(days) = update.watering_frequency_days {
            validate_frequency(days)?;
        }

        let mut plant = self.plants[index].clone();
        let old_due = plant.next_water_at;
        if let Some(name) = name {
            plant.name = name;
        }
        if let Some(days) = update.watering_frequency_days {
            plant.watering_frequency_days = days;
        }
        if let Some(notes) = update.notes {
            plant.notes = notes;
        }
        if let Some(due) = update.next_water_at {
            plant.next_water_at = due;
        }
        self.replace_at(index, &plant)?;
        info!(plant = %id, "plant edited");

        let notifications = if plant.next_water_at == old_due {
            NotificationOutcome::Untouched
        } else {
            self.notify(self.sink.edit_due(id, old_due, plant.next_water_at))
                .await
        };
        Ok(PlantChange {
            plant,
            notifications,
        })
    }

    /// # Errors
    ///
    /// Fails if the plant does not exist or the plant file cannot be saved.
    pub async fn set_next_water_at(
        &mut self,
        id: &PlantId,
        next_water_at: DateTime<Utc>,
    ) -> Result<PlantChange, PlantError> {
        self.edit_plant(
            id,
            PlantUpdate {
                next_water_at: Some(next_water_at),
                ..PlantUpdate::default()
            },
        )
        .await
    }

    /// Undo the last watering record. The due date is left as it is.
    ///
    /// # Errors
    ///
    /// Fails if the plant does not exist or the plant file cannot be saved.
    pub fn revert_last_watered(&mut self, id: &PlantId) -> Result<PlantChange, PlantError> {
        let index = self.position(id)?;
        let mut plant = self.plants[index].clone();
        plant.last_watered_at = plant.prev_last_watered_at.take();
        self.replace_at(index, &plant)?;
        info!(plant = %id, "last watering reverted");
        Ok(PlantChange {
            plant,
            notifications: NotificationOutcome::Untouched,
        })
    }

    /// # Errors
    ///
    /// Fails if the plant does not exist or the plant file cannot be saved.
    pub async fn remove_plant(&mut self, id: &PlantId) -> Result<PlantChange, PlantError> {
        let index = self.position(id)?;
        let mut plants = self.plants.clone();
        let plant = plants.remove(index);
        self.replace(plants)?;
        info!(plant = %id, name = %plant.name, "plant removed");

        let notifications = self
            .notify(self.sink.delete_due(&plant.id, plant.next_water_at))
            .await;
        Ok(PlantChange {
            plant,
            notifications,
        })
    }

    fn position(&self, id: &PlantId) -> Result<usize, PlantError> {
        self.plants
            .iter()
            .position(|plant| &plant.id == id)
            .ok_or_else(|| PlantError::NotFound(id.clone()))
    }

    /// Write `plants` to the plant file, then adopt them.
    fn replace(&mut self, plants: Vec<Plant>) -> Result<(), PlantError> {
        if let Some(path) = &self.path {
            write_json_atomic(path, &PlantsFileRef { plants: &plants })?;
        }
        self.plants = plants;
        Ok(())
    }

    fn replace_at(&mut self, index: usize, plant: &Plant) -> Result<(), PlantError> {
        let mut plants = self.plants.clone();
        plants[index] = plant.clone();
        self.replace(plants)
    }

    async fn notify<F>(&self, operation: F) -> NotificationOutcome
    where
        F: Future<Output = Result<Reconciliation, EngineError>>,
    {
        let result = match self.deadline {
            Some(limit) => with_timeout(limit, operation).await,
            None => operation.await,
        };
        match result {
            Ok(report) => NotificationOutcome::Reconciled(report),
            Err(err) => {
                warn!(code = %err.code(), error = %err, "reminder update failed, plant change kept");
                NotificationOutcome::Failed(err)
            }
        }
    }
}

fn validate_name(raw: &str) -> Result<String, PlantError> {
    let name = raw.trim();
    if name.is_empty() {
        return Err(PlantError::InvalidName);
    }
    Ok(name.to_string())
}

const fn validate_frequency(days: u32) -> Result<(), PlantError> {
    if days == 0 || days > MAX_FREQUENCY_DAYS {
        return Err(PlantError::InvalidFrequency(days));
    }
    Ok(())
}

fn after_days(from: DateTime<Utc>, days: u32) -> Result<DateTime<Utc>, PlantError> {
    from.checked_add_signed(TimeDelta::days(i64::from(days)))
        .ok_or(PlantError::DueDateOutOfRange)
}
