//! Notification reconciliation engine.
//!
//! The engine owns the [`NotificationState`] and is the only thing that
//! mutates it. Every operation follows the same shape:
//!
//! 1. take the state lock (operations are serialized, FIFO),
//! 2. work on a copy of the committed state, pruning stale entries first,
//! 3. issue the minimal scheduler calls for the change, recording failures
//!    per entry instead of aborting,
//! 4. swap the copy in and persist it.
//!
//! Dropping an operation's future before step 4 (for example through
//! [`with_timeout`]) leaves the committed state untouched.
//!
//! # Failure policy
//!
//! A failed `schedule` leaves that entry without an alert (or, for a new day,
//! leaves no entry at all). A failed `cancel` still removes the entry and is
//! reported as an orphaned alert. A failed `cancel_all` aborts fire-time
//! changes and resets, but not `turn_off`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, MutexGuard};
use tracing::{debug, info, warn};

use crate::calendar::{Calendar, Clock, SystemClock};
use crate::error::ErrorCode;
use crate::model::{
    AlertId, ConsistencyViolation, DayKey, FireTime, NotificationEntry, NotificationState, PlantId,
};
use crate::scheduler::{SchedulerClient, SchedulingFailure};
use crate::store::{StateStore, StoreError};

/// Errors that escape an operation. Scheduler failures never do; they are
/// part of the [`Reconciliation`] report.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("failed to load notification state: {0}")]
    Store(#[from] StoreError),
    /// The new state is committed in memory but not on disk. The report of
    /// the operation that produced it is kept.
    #[error("failed to persist notification state: {source}")]
    Persist {
        source: StoreError,
        report: Box<Reconciliation>,
    },
    #[error("operation timed out after {0:?}; nothing was committed")]
    TimedOut(Duration),
}

impl EngineError {
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::Store(err) | Self::Persist { source: err, .. } => err.code(),
            Self::TimedOut(_) => ErrorCode::OperationTimedOut,
        }
    }

    /// The operation's report, when it ran to completion before failing.
    #[must_use]
    pub fn report(&self) -> Option<&Reconciliation> {
        match self {
            Self::Persist { report, .. } => Some(&**report),
            Self::Store(_) | Self::TimedOut(_) => None,
        }
    }
}

/// Which engine operation produced a report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    AddDue,
    DeleteDue,
    EditDue,
    ChangeFireTime,
    TurnOff,
    TurnOn,
    Reset,
}

/// The scheduler call that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SchedulerStep {
    Schedule,
    Cancel,
    CancelAll,
}

/// A recoverable failure recorded during an operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportedFailure {
    pub step: SchedulerStep,
    pub day: Option<DayKey>,
    pub alert: Option<AlertId>,
    pub failure: SchedulingFailure,
}

impl ReportedFailure {
    /// Permission problems keep their own code; a failed single cancel is an orphaned alert.
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match (&self.failure, self.step) {
            (SchedulingFailure::PermissionDenied, _) => ErrorCode::PermissionDenied,
            (_, SchedulerStep::Cancel) => ErrorCode::OrphanedAlert,
            (failure, _) => failure.code(),
        }
    }
}

/// Outcome of one engine operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reconciliation {
    pub operation: Operation,
    /// Stale entries removed before the operation ran.
    pub pruned: Vec<DayKey>,
    /// Days that received a new alert.
    pub scheduled: Vec<DayKey>,
    /// Entries removed by the operation itself.
    pub removed: Vec<DayKey>,
    /// Days not bucketed because their reminder time had already passed.
    pub skipped: Vec<DayKey>,
    pub failures: Vec<ReportedFailure>,
    /// The operation gave up before changing anything.
    pub aborted: bool,
    /// A new state was committed and persisted.
    pub changed: bool,
}

impl Reconciliation {
    #[must_use]
    pub const fn new(operation: Operation) -> Self {
        Self {
            operation,
            pruned: Vec::new(),
            scheduled: Vec::new(),
            removed: Vec::new(),
            skipped: Vec::new(),
            failures: Vec::new(),
            aborted: false,
            changed: false,
        }
    }

    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty() && !self.aborted
    }

    /// True if any scheduler call was refused for lack of permission.
    #[must_use]
    pub fn permission_denied(&self) -> bool {
        self.failures
            .iter()
            .any(|failure| failure.failure.is_permission_denied())
    }

    fn fail(
        &mut self,
        step: SchedulerStep,
        day: Option<DayKey>,
        alert: Option<AlertId>,
        failure: SchedulingFailure,
    ) {
        warn!(
            operation = ?self.operation,
            ?step,
            day = ?day.map(|d| d.to_string()),
            alert = ?alert.as_ref().map(AlertId::as_str),
            error = %failure,
            "scheduler call failed"
        );
        self.failures.push(ReportedFailure {
            step,
            day,
            alert,
            failure,
        });
    }

    fn merge(&mut self, other: Self) {
        self.pruned.extend(other.pruned);
        self.scheduled.extend(other.scheduled);
        self.removed.extend(other.removed);
        self.skipped.extend(other.skipped);
        self.failures.extend(other.failures);
        self.aborted |= other.aborted;
    }
}

/// Construction options for [`ReconciliationEngine::load`].
#[derive(Clone)]
pub struct EngineOptions {
    pub calendar: Calendar,
    pub clock: Arc<dyn Clock>,
    /// State used when the store has never been written.
    pub initial: NotificationState,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            calendar: Calendar::Local,
            clock: Arc::new(SystemClock),
            initial: NotificationState::default(),
        }
    }
}

/// Keeps day-level alerts consistent with plant due dates.
pub struct ReconciliationEngine<S, P> {
    scheduler: S,
    store: P,
    calendar: Calendar,
    clock: Arc<dyn Clock>,
    state: Mutex<NotificationState>,
    load_violations: Vec<ConsistencyViolation>,
}

impl<S, P> ReconciliationEngine<S, P>
where
    S: SchedulerClient,
    P: StateStore,
{
    /// Build an engine around an already-loaded state.
    pub fn new(
        scheduler: S,
        store: P,
        calendar: Calendar,
        clock: Arc<dyn Clock>,
        state: NotificationState,
    ) -> Self {
        Self {
            scheduler,
            store,
            calendar,
            clock,
            state: Mutex::new(state),
            load_violations: Vec::new(),
        }
    }

    /// Load state from `store`, falling back to `options.initial`.
    ///
    /// Inconsistent records are dropped while loading and kept available
    /// through [`Self::load_violations`].
    ///
    /// # Errors
    ///
    /// Returns an error if the store exists but cannot be read or parsed.
    pub fn load(scheduler: S, store: P, options: EngineOptions) -> Result<Self, EngineError> {
        let (state, violations) = match store.load()? {
            Some(record) => NotificationState::from_record(record, &options.calendar),
            None => (options.initial, Vec::new()),
        };
        info!(
            entries = state.len(),
            fire_time = %state.fire_time(),
            enabled = state.is_enabled(),
            violations = violations.len(),
            "notification state loaded"
        );
        let mut engine = Self::new(scheduler, store, options.calendar, options.clock, state);
        engine.load_violations = violations;
        Ok(engine)
    }

    /// Records that were dropped or repaired while loading.
    #[must_use]
    pub fn load_violations(&self) -> &[ConsistencyViolation] {
        &self.load_violations
    }

    #[must_use]
    pub const fn calendar(&self) -> Calendar {
        self.calendar
    }

    #[must_use]
    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    #[must_use]
    pub const fn scheduler(&self) -> &S {
        &self.scheduler
    }

    /// Copy of the committed state.
    pub async fn snapshot(&self) -> NotificationState {
        self.state.lock().await.clone()
    }

    /// A plant is due at `due` and should be reminded on that day.
    ///
    /// # Errors
    ///
    /// Returns an error only if the committed state cannot be persisted.
    pub async fn add_due(
        &self,
        plant: &PlantId,
        due: DateTime<Utc>,
    ) -> Result<Reconciliation, EngineError> {
        let mut guard = self.state.lock().await;
        let mut next = guard.clone();
        let now = self.clock.now();
        let mut report = Reconciliation::new(Operation::AddDue);

        prune(&mut next, now, &mut report);
        self.add_step(&mut next, plant, due, now, &mut report).await;

        self.commit(&mut guard, next, report)
    }

    /// A plant's due date at `due` has been consumed (watered or deleted).
    ///
    /// # Errors
    ///
    /// Returns an error only if the committed state cannot be persisted.
    pub async fn delete_due(
        &self,
        plant: &PlantId,
        due: DateTime<Utc>,
    ) -> Result<Reconciliation, EngineError> {
        let mut guard = self.state.lock().await;
        let mut next = guard.clone();
        let now = self.clock.now();
        let mut report = Reconciliation::new(Operation::DeleteDue);

        prune(&mut next, now, &mut report);
        self.delete_step(&mut next, plant, due, &mut report).await;

        self.commit(&mut guard, next, report)
    }

    /// A plant's due date moved from `old` to `new`.
    ///
    /// Moves within one calendar day do nothing. Otherwise the delete and the
    /// add run as independent steps: a failure in one does not stop the other.
    ///
    /// # Errors
    ///
    /// Returns an error only if the committed state cannot be persisted.
    pub async fn edit_due(
        &self,
        plant: &PlantId,
        old: DateTime<Utc>,
        new: DateTime<Utc>,
    ) -> Result<Reconciliation, EngineError> {
        let mut report = Reconciliation::new(Operation::EditDue);
        if self.calendar.day_key(old) == self.calendar.day_key(new) {
            debug!(plant = %plant, day = %self.calendar.day_key(new), "same-day move, nothing to do");
            return Ok(report);
        }

        let mut guard = self.state.lock().await;
        let mut next = guard.clone();
        let now = self.clock.now();

        prune(&mut next, now, &mut report);
        let mut delete = Reconciliation::new(Operation::DeleteDue);
        self.delete_step(&mut next, plant, old, &mut delete).await;
        let mut add = Reconciliation::new(Operation::AddDue);
        self.add_step(&mut next, plant, new, now, &mut add).await;
        report.merge(delete);
        report.merge(add);

        self.commit(&mut guard, next, report)
    }

    /// Move every reminder to `fire_time`, rebuilding all alerts.
    ///
    /// If the initial `cancel_all` fails nothing changes and the report is
    /// marked `aborted`.
    ///
    /// # Errors
    ///
    /// Returns an error only if the committed state cannot be persisted.
    pub async fn change_fire_time(
        &self,
        fire_time: FireTime,
    ) -> Result<Reconciliation, EngineError> {
        let mut guard = self.state.lock().await;
        let now = self.clock.now();
        let mut report = Reconciliation::new(Operation::ChangeFireTime);

        if let Err(failure) = self.scheduler.cancel_all().await {
            report.fail(SchedulerStep::CancelAll, None, None, failure);
            report.aborted = true;
            return Ok(report);
        }

        let mut next = guard.clone();
        prune(&mut next, now, &mut report);
        next.fire_time = fire_time;
        for entry in next.entries.values_mut() {
            entry.alert_id = None;
            entry.trigger_at = self.calendar.trigger_at(entry.day, fire_time);
        }

        // Moving the time earlier can put today's reminder in the past.
        let passed: Vec<DayKey> = next
            .entries
            .values()
            .filter(|entry| entry.is_stale(now))
            .map(|entry| entry.day)
            .collect();
        for day in passed {
            debug!(%day, %fire_time, "reminder time already passed today, dropping entry");
            next.entries.remove(&day);
            report.removed.push(day);
        }

        if next.enabled {
            self.schedule_missing(&mut next, &mut report).await;
        }

        self.commit(&mut guard, next, report)
    }

    /// Stop all reminders while keeping which plants are due on which day.
    ///
    /// # Errors
    ///
    /// Returns an error only if the committed state cannot be persisted.
    pub async fn turn_off(&self) -> Result<Reconciliation, EngineError> {
        let mut guard = self.state.lock().await;
        let mut next = guard.clone();
        let now = self.clock.now();
        let mut report = Reconciliation::new(Operation::TurnOff);

        prune(&mut next, now, &mut report);
        if next.enabled {
            if let Err(failure) = self.scheduler.cancel_all().await {
                report.fail(SchedulerStep::CancelAll, None, None, failure);
            }
        } else {
            debug!("notifications already off");
        }
        for entry in next.entries.values_mut() {
            entry.alert_id = None;
        }
        next.enabled = false;

        self.commit(&mut guard, next, report)
    }

    /// Re-enable reminders and schedule every entry that lacks an alert.
    ///
    /// # Errors
    ///
    /// Returns an error only if the committed state cannot be persisted.
    pub async fn turn_on(&self) -> Result<Reconciliation, EngineError> {
        let mut guard = self.state.lock().await;
        let mut next = guard.clone();
        let now = self.clock.now();
        let mut report = Reconciliation::new(Operation::TurnOn);

        prune(&mut next, now, &mut report);
        next.enabled = true;
        self.schedule_missing(&mut next, &mut report).await;

        self.commit(&mut guard, next, report)
    }

    /// Cancel everything and forget every entry. Fire time and the on/off
    /// flag are kept. Aborts without changes if `cancel_all` fails.
    ///
    /// # Errors
    ///
    /// Returns an error only if the committed state cannot be persisted.
    pub async fn reset(&self) -> Result<Reconciliation, EngineError> {
        let mut guard = self.state.lock().await;
        let now = self.clock.now();
        let mut report = Reconciliation::new(Operation::Reset);

        if let Err(failure) = self.scheduler.cancel_all().await {
            report.fail(SchedulerStep::CancelAll, None, None, failure);
            report.aborted = true;
            return Ok(report);
        }

        let mut next = guard.clone();
        prune(&mut next, now, &mut report);
        report.removed.extend(next.entries.keys().copied());
        next.entries.clear();

        self.commit(&mut guard, next, report)
    }

    async fn add_step(
        &self,
        state: &mut NotificationState,
        plant: &PlantId,
        due: DateTime<Utc>,
        now: DateTime<Utc>,
        report: &mut Reconciliation,
    ) {
        let day = self.calendar.day_key(due);
        let enabled = state.enabled;

        if let Some(entry) = state.entries.get_mut(&day) {
            if entry.add_member(plant.clone()) {
                debug!(%plant, %day, members = entry.members.len(), "joined existing reminder");
            }
            // An entry that lost its alert earlier gets another attempt here.
            if enabled && entry.alert_id.is_none() {
                match self.scheduler.schedule(entry.trigger_at).await {
                    Ok(id) => {
                        entry.alert_id = Some(id);
                        report.scheduled.push(day);
                    }
                    Err(failure) => report.fail(SchedulerStep::Schedule, Some(day), None, failure),
                }
            }
            return;
        }

        let trigger_at = self.calendar.trigger_at(day, state.fire_time);
        if trigger_at < now {
            debug!(%plant, %day, %trigger_at, "reminder time already passed, not bucketing");
            report.skipped.push(day);
            return;
        }

        if !enabled {
            debug!(%plant, %day, "notifications off, recording unscheduled reminder");
            state.insert(NotificationEntry::new(day, trigger_at, None, plant.clone()));
            return;
        }

        match self.scheduler.schedule(trigger_at).await {
            Ok(id) => {
                debug!(%plant, %day, alert = %id, "scheduled new reminder");
                state.insert(NotificationEntry::new(day, trigger_at, Some(id), plant.clone()));
                report.scheduled.push(day);
            }
            Err(failure) => report.fail(SchedulerStep::Schedule, Some(day), None, failure),
        }
    }

    async fn delete_step(
        &self,
        state: &mut NotificationState,
        plant: &PlantId,
        due: DateTime<Utc>,
        report: &mut Reconciliation,
    ) {
        let day = self.calendar.day_key(due);
        let Some(entry) = state.entries.get_mut(&day) else {
            debug!(%plant, %day, "no reminder for day");
            return;
        };
        if !entry.contains(plant) {
            debug!(%plant, %day, "plant not part of reminder");
            return;
        }
        if !entry.is_sole_member(plant) {
            entry.remove_member(plant);
            debug!(%plant, %day, members = entry.members.len(), "left shared reminder");
            return;
        }

        let Some(removed) = state.entries.remove(&day) else {
            return;
        };
        report.removed.push(day);
        if let Some(alert) = removed.alert_id {
            match self.scheduler.cancel(&alert).await {
                Ok(()) => debug!(%plant, %day, %alert, "cancelled reminder"),
                Err(failure) => {
                    report.fail(SchedulerStep::Cancel, Some(day), Some(alert), failure);
                }
            }
        }
    }

    /// Schedule every entry without an alert, concurrently.
    async fn schedule_missing(&self, state: &mut NotificationState, report: &mut Reconciliation) {
        let targets: Vec<(DayKey, DateTime<Utc>)> = state
            .entries
            .values()
            .filter(|entry| entry.alert_id.is_none())
            .map(|entry| (entry.day, entry.trigger_at))
            .collect();

        let outcomes = join_all(targets.into_iter().map(|(day, trigger_at)| async move {
            (day, self.scheduler.schedule(trigger_at).await)
        }))
        .await;

        for (day, outcome) in outcomes {
            match outcome {
                Ok(id) => {
                    if let Some(entry) = state.entries.get_mut(&day) {
                        entry.alert_id = Some(id);
                        report.scheduled.push(day);
                    }
                }
                Err(failure) => report.fail(SchedulerStep::Schedule, Some(day), None, failure),
            }
        }
    }

    fn commit(
        &self,
        guard: &mut MutexGuard<'_, NotificationState>,
        next: NotificationState,
        mut report: Reconciliation,
    ) -> Result<Reconciliation, EngineError> {
        if **guard == next {
            debug!(operation = ?report.operation, "state unchanged");
            return Ok(report);
        }
        **guard = next;
        report.changed = true;
        info!(
            operation = ?report.operation,
            entries = guard.len(),
            scheduled = report.scheduled.len(),
            removed = report.removed.len(),
            pruned = report.pruned.len(),
            failures = report.failures.len(),
            "notification state committed"
        );
        match self.store.save(&guard.to_record()) {
            Ok(()) => Ok(report),
            Err(source) => Err(EngineError::Persist {
                source,
                report: Box::new(report),
            }),
        }
    }
}

fn prune(state: &mut NotificationState, now: DateTime<Utc>, report: &mut Reconciliation) {
    for entry in state.prune_stale(now) {
        debug!(day = %entry.day, members = entry.members.len(), "pruned stale reminder");
        report.pruned.push(entry.day);
    }
}

/// Run an engine operation under a deadline.
///
/// When the deadline passes the operation's future is dropped before it
/// commits, so the engine state stays as it was.
///
/// # Errors
///
/// Returns [`EngineError::TimedOut`] when `limit` elapses first, otherwise
/// whatever the operation returned.
pub async fn with_timeout<T, F>(limit: Duration, operation: F) -> Result<T, EngineError>
where
    F: Future<Output = Result<T, EngineError>>,
{
    tokio::time::timeout(limit, operation)
        .await
        .map_err(|_| EngineError::TimedOut(limit))?
}

/// The engine operations a plant store drives when due dates change.
#[async_trait]
pub trait DueDateSink: Send + Sync {
    async fn add_due(
        &self,
        plant: &PlantId,
        due: DateTime<Utc>,
    ) -> Result<Reconciliation, EngineError>;

    async fn delete_due(
        &self,
        plant: &PlantId,
        due: DateTime<Utc>,
    ) -> Result<Reconciliation, EngineError>;

    async fn edit_due(
        &self,
        plant: &PlantId,
        old: DateTime<Utc>,
        new: DateTime<Utc>,
    ) -> Result<Reconciliation, EngineError>;
}

#[async_trait]
impl<S, P> DueDateSink for ReconciliationEngine<S, P>
where
    S: SchedulerClient,
    P: StateStore,
{
    async fn add_due(
        &self,
        plant: &PlantId,
        due: DateTime<Utc>,
    ) -> Result<Reconciliation, EngineError> {
        Self::add_due(self, plant, due).await
    }

    async fn delete_due(
        &self,
        plant: &PlantId,
        due: DateTime<Utc>,
    ) -> Result<Reconciliation, EngineError> {
        Self::delete_due(self, plant, due).await
    }

    async fn edit_due(
        &self,
        plant: &PlantId,
        old: DateTime<Utc>,
        new: DateTime<Utc>,
    ) -> Result<Reconciliation, EngineError> {
        Self::edit_due(self, plant, old, new).await
    }
}

#[async_trait]
impl<T: DueDateSink + ?Sized> DueDateSink for Arc<T> {
    async fn add_due(
        &self,
        plant: &PlantId,
        due: DateTime<Utc>,
    ) -> Result<Reconciliation, EngineError> {
        (**self).add_due(plant, due).await
    }

    async fn delete_due(
        &self,
        plant: &PlantId,
        due: DateTime<Utc>,
    ) -> Result<Reconciliation, EngineError> {
        (**self).delete_due(plant, due).await
    }

    async fn edit_due(
        &self,
        plant: &PlantId,
        old: DateTime<Utc>,
        new: DateTime<Utc>,
    ) -> Result<Reconciliation, EngineError> {
        (**self).edit_due(plant, old, new).await
    }
}
