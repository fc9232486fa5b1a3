//! Command handlers and the project context they share.

pub mod alerts;
pub mod config;
pub mod init;
pub mod notify;
pub mod plant;

use anyhow::{Context as _, Result};
use chrono::{DateTime, Utc};
use sprig_core::calendar::{Calendar, Clock, ManualClock, SystemClock};
use sprig_core::config::{ProjectConfig, ProjectPaths, load_project_config};
use sprig_core::engine::{EngineOptions, ReconciliationEngine};
use sprig_core::lock::ProjectLock;
use sprig_core::model::{DayKey, FireTime};
use sprig_core::plant::PlantStore;
use sprig_core::scheduler::AlertQueue;
use sprig_core::store::JsonFileStore;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::output::{CliWarning, NotInitialized, OutputMode, render_warning};

/// How long a command waits for another `sprig` process to let go of the project.
const LOCK_WAIT: Duration = Duration::from_secs(5);

/// Pins "now" for every command, as an RFC 3339 instant.
pub const NOW_ENV: &str = "SPRIG_NOW";

pub type Engine = ReconciliationEngine<AlertQueue, JsonFileStore>;

/// An initialized project, held under its lock for the life of one command.
pub struct Project {
    pub paths: ProjectPaths,
    pub config: ProjectConfig,
    pub calendar: Calendar,
    pub clock: Arc<dyn Clock>,
    output: OutputMode,
    _lock: ProjectLock,
}

impl Project {
    /// Lock the project at `root` and load its configuration. Warnings are
    /// rendered in `output`.
    ///
    /// # Errors
    ///
    /// Fails if `.sprig/` is missing, the lock is held elsewhere, or the
    /// config or `SPRIG_NOW` cannot be parsed.
    pub fn open(root: &Path, output: OutputMode) -> Result<Self> {
        let paths = ProjectPaths::new(root);
        if !paths.is_initialized() {
            return Err(NotInitialized.into());
        }
        let lock = ProjectLock::acquire(&paths.lock(), LOCK_WAIT)?;
        let config = load_project_config(root)?;
        let calendar = config.calendar.calendar()?;
        let clock = clock_from_env()?;
        debug!(root = %root.display(), %calendar, "project opened");
        Ok(Self {
            paths,
            config,
            calendar,
            clock,
            output,
            _lock: lock,
        })
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Upper bound on any single engine operation.
    pub const fn timeout(&self) -> Duration {
        self.config.scheduler.timeout()
    }

    pub fn alert_queue(&self) -> AlertQueue {
        AlertQueue::new(self.paths.alerts(), self.config.scheduler.permission)
    }

    /// Load the reconciliation engine over the project's alert queue and state file.
    ///
    /// # Errors
    ///
    /// Fails if the notification defaults are invalid or the state file is unreadable.
    pub fn engine(&self) -> Result<Engine> {
        let options = EngineOptions {
            calendar: self.calendar,
            clock: Arc::clone(&self.clock),
            initial: self.config.notifications.initial_state()?,
        };
        let engine = ReconciliationEngine::load(
            self.alert_queue(),
            JsonFileStore::new(self.paths.notifications()),
            options,
        )?;
        for violation in engine.load_violations() {
            render_warning(self.output, &CliWarning::from(violation))?;
        }
        Ok(engine)
    }

    /// Open the plant store, wired to the engine and bounded by the scheduler timeout.
    ///
    /// # Errors
    ///
    /// Fails if the engine cannot load or the plant file is unreadable.
    pub fn plant_store(&self) -> Result<PlantStore<Engine>> {
        let store = PlantStore::open(self.paths.plants(), self.engine()?)?;
        Ok(store.with_deadline(self.timeout()))
    }

    /// Parse a user-supplied date or instant.
    ///
    /// # Errors
    ///
    /// Fails unless `raw` is `YYYY-MM-DD` or an RFC 3339 instant.
    pub fn parse_when(&self, raw: &str) -> Result<DateTime<Utc>> {
        parse_when(raw, self.calendar)
    }
}

fn clock_from_env() -> Result<Arc<dyn Clock>> {
    match std::env::var(NOW_ENV) {
        Ok(raw) => {
            let now = DateTime::parse_from_rfc3339(raw.trim())
                .with_context(|| format!("Invalid {NOW_ENV} {raw:?}: expected RFC 3339"))?;
            Ok(Arc::new(ManualClock::new(now.with_timezone(&Utc))))
        }
        Err(_) => Ok(Arc::new(SystemClock)),
    }
}

/// A bare date means midday on that day in the project's calendar.
fn parse_when(raw: &str, calendar: Calendar) -> Result<DateTime<Utc>> {
    if let Ok(day) = raw.parse::<DayKey>() {
        let noon = FireTime::new(12, 0)?;
        return Ok(calendar.trigger_at(day, noon));
    }
    DateTime::parse_from_rfc3339(raw.trim())
        .map(|t| t.with_timezone(&Utc))
        .with_context(|| format!("Invalid date {raw:?}: expected YYYY-MM-DD or RFC 3339"))
}
