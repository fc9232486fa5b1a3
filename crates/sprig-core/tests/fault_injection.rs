//! Fault-injection tests for scheduler and persistence failures.
//!
//! These cover the recoverable paths:
//! - a failed `schedule` leaves no alert and is retried by a later touch
//! - a failed `cancel` still removes the entry and reports an orphan
//! - a failed `cancel_all` aborts fire-time changes and resets
//! - permission loss mid-session
//! - a deadline that expires mid-operation commits nothing

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use sprig_core::calendar::{Calendar, ManualClock};
use sprig_core::engine::{ReconciliationEngine, SchedulerStep, with_timeout};
use sprig_core::error::ErrorCode;
use sprig_core::model::{AlertId, DayKey, FireTime, NotificationState, PlantId};
use sprig_core::scheduler::{InMemoryScheduler, SchedulerClient, SchedulingFailure};
use sprig_core::store::MemoryStore;

fn at(d: u32, h: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 6, d, h, 0, 0)
        .single()
        .expect("valid instant")
}

fn day(d: u32) -> DayKey {
    DayKey::from_ymd(2025, 6, d).expect("valid day")
}

fn engine_with<S: SchedulerClient>(scheduler: S) -> ReconciliationEngine<S, Arc<MemoryStore>> {
    ReconciliationEngine::new(
        scheduler,
        Arc::new(MemoryStore::new()),
        Calendar::utc(),
        Arc::new(ManualClock::new(at(1, 12))),
        NotificationState::default(),
    )
}

fn platform(msg: &str) -> SchedulingFailure {
    SchedulingFailure::Platform(msg.to_string())
}

#[tokio::test]
async fn failed_schedule_is_reported_and_retried_on_next_add() {
    let scheduler = Arc::new(InMemoryScheduler::new());
    let engine = engine_with(Arc::clone(&scheduler));

    scheduler.fail_next_schedule(platform("quota exceeded"));
    let report = engine.add_due(&"A".into(), at(3, 9)).await.expect("add");
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].step, SchedulerStep::Schedule);
    assert_eq!(report.failures[0].day, Some(day(3)));
    assert_eq!(report.failures[0].code(), ErrorCode::SchedulerUnavailable);
    assert!(engine.snapshot().await.entry(day(3)).is_none());

    // Retrying the same plant later succeeds and creates the entry.
    let report = engine.add_due(&"A".into(), at(3, 9)).await.expect("retry");
    assert!(report.is_clean());
    assert!(engine.snapshot().await.entry(day(3)).is_some());
}

#[tokio::test]
async fn failed_cancel_still_removes_entry_and_reports_orphan() {
    let scheduler = Arc::new(InMemoryScheduler::new());
    let engine = engine_with(Arc::clone(&scheduler));
    engine.add_due(&"A".into(), at(3, 9)).await.expect("add");
    let alert = engine
        .snapshot()
        .await
        .entry(day(3))
        .and_then(|entry| entry.alert_id.clone());

    scheduler.fail_next_cancel(platform("os error"));
    let report = engine.delete_due(&"A".into(), at(3, 9)).await.expect("delete");

    assert!(engine.snapshot().await.is_empty());
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].step, SchedulerStep::Cancel);
    assert_eq!(report.failures[0].alert, alert);
    assert_eq!(report.failures[0].code(), ErrorCode::OrphanedAlert);
    // The stray alert is still pending on the device side.
    assert_eq!(scheduler.pending().len(), 1);
}

#[tokio::test]
async fn edit_runs_add_even_when_delete_cancel_fails() {
    let scheduler = Arc::new(InMemoryScheduler::new());
    let engine = engine_with(Arc::clone(&scheduler));
    engine.add_due(&"A".into(), at(3, 9)).await.expect("add");

    scheduler.fail_next_cancel(platform("busy"));
    let report = engine
        .edit_due(&"A".into(), at(3, 9), at(4, 9))
        .await
        .expect("edit");

    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.scheduled, vec![day(4)]);
    let state = engine.snapshot().await;
    assert!(state.entry(day(3)).is_none());
    assert!(state.entry(day(4)).expect("day 4").alert_id.is_some());
}

#[tokio::test]
async fn edit_keeps_delete_when_add_schedule_fails() {
    let scheduler = Arc::new(InMemoryScheduler::new());
    let engine = engine_with(Arc::clone(&scheduler));
    engine.add_due(&"A".into(), at(3, 9)).await.expect("add");

    scheduler.fail_next_schedule(platform("busy"));
    let report = engine
        .edit_due(&"A".into(), at(3, 9), at(4, 9))
        .await
        .expect("edit");

    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.removed, vec![day(3)]);
    assert!(engine.snapshot().await.is_empty());
}

#[tokio::test]
async fn cancel_all_failure_aborts_fire_time_change() {
    let scheduler = Arc::new(InMemoryScheduler::new());
    let engine = engine_with(Arc::clone(&scheduler));
    engine.add_due(&"A".into(), at(3, 9)).await.expect("add");
    let before = engine.snapshot().await;

    scheduler.fail_next_cancel_all(platform("unknown state"));
    let report = engine
        .change_fire_time(FireTime::new(20, 0).expect("valid"))
        .await
        .expect("change");

    assert!(report.aborted);
    assert!(!report.changed);
    assert_eq!(report.failures[0].step, SchedulerStep::CancelAll);
    assert_eq!(engine.snapshot().await, before);
}

#[tokio::test]
async fn cancel_all_failure_aborts_reset() {
    let scheduler = Arc::new(InMemoryScheduler::new());
    let engine = engine_with(Arc::clone(&scheduler));
    engine.add_due(&"A".into(), at(3, 9)).await.expect("add");

    scheduler.fail_next_cancel_all(platform("unknown state"));
    let report = engine.reset().await.expect("reset");

    assert!(report.aborted);
    assert_eq!(engine.snapshot().await.len(), 1);
}

#[tokio::test]
async fn cancel_all_failure_does_not_stop_turn_off() {
    let scheduler = Arc::new(InMemoryScheduler::new());
    let engine = engine_with(Arc::clone(&scheduler));
    engine.add_due(&"A".into(), at(3, 9)).await.expect("add");

    scheduler.fail_next_cancel_all(platform("busy"));
    let report = engine.turn_off().await.expect("off");

    assert!(!report.aborted);
    assert_eq!(report.failures.len(), 1);
    let state = engine.snapshot().await;
    assert!(!state.is_enabled());
    assert!(state.entries().all(|entry| entry.alert_id.is_none()));
    assert_eq!(state.len(), 1);
}

#[tokio::test]
async fn fire_time_change_keeps_members_when_reschedule_fails() {
    let scheduler = Arc::new(InMemoryScheduler::new());
    let engine = engine_with(Arc::clone(&scheduler));
    engine.add_due(&"A".into(), at(3, 9)).await.expect("add A");
    engine.add_due(&"B".into(), at(4, 9)).await.expect("add B");

    scheduler.fail_trigger(at(4, 21));
    let report = engine
        .change_fire_time(FireTime::new(21, 0).expect("valid"))
        .await
        .expect("change");

    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].day, Some(day(4)));
    let state = engine.snapshot().await;
    let failed = state.entry(day(4)).expect("day 4 kept");
    assert!(failed.alert_id.is_none());
    assert_eq!(failed.trigger_at, at(4, 21));
    assert!(failed.contains(&PlantId::new("B")));
    assert!(state.entry(day(3)).expect("day 3").alert_id.is_some());
    assert!(state.invariant_violations(&Calendar::utc()).is_empty());
}

#[tokio::test]
async fn permission_denied_turn_on_still_enables() {
    let scheduler = Arc::new(InMemoryScheduler::new());
    let engine = engine_with(Arc::clone(&scheduler));
    engine.add_due(&"A".into(), at(3, 9)).await.expect("add");
    engine.turn_off().await.expect("off");

    scheduler.set_permission_denied(true);
    let report = engine.turn_on().await.expect("on");

    assert!(report.permission_denied());
    assert_eq!(report.failures[0].code(), ErrorCode::PermissionDenied);
    let state = engine.snapshot().await;
    assert!(state.is_enabled());
    assert!(state.entry(day(3)).expect("entry").alert_id.is_none());

    // Once permission returns, turning on again fills the gap.
    scheduler.set_permission_denied(false);
    let report = engine.turn_on().await.expect("on");
    assert!(report.is_clean());
    assert!(engine.snapshot().await.entry(day(3)).expect("entry").alert_id.is_some());
}

#[tokio::test]
async fn persistence_failure_is_surfaced() {
    let store = Arc::new(MemoryStore::new());
    let engine = ReconciliationEngine::new(
        InMemoryScheduler::new(),
        Arc::clone(&store),
        Calendar::utc(),
        Arc::new(ManualClock::new(at(1, 12))),
        NotificationState::default(),
    );

    store.fail_next_save();
    let err = engine.add_due(&"A".into(), at(3, 9)).await.expect_err("save fails");
    assert_eq!(err.code(), ErrorCode::StateWriteFailed);

    // The next successful commit writes the full state, including the first entry.
    engine.add_due(&"B".into(), at(4, 9)).await.expect("add");
    assert_eq!(store.saved().expect("saved").entries.len(), 2);
}

/// Scheduler whose `schedule` never completes.
struct HangingScheduler;

#[async_trait]
impl SchedulerClient for HangingScheduler {
    async fn schedule(&self, _trigger_at: DateTime<Utc>) -> Result<AlertId, SchedulingFailure> {
        std::future::pending().await
    }

    async fn cancel(&self, _id: &AlertId) -> Result<(), SchedulingFailure> {
        Ok(())
    }

    async fn cancel_all(&self) -> Result<(), SchedulingFailure> {
        Ok(())
    }
}

#[tokio::test]
async fn timed_out_operation_commits_nothing() {
    let engine = engine_with(HangingScheduler);

    let err = with_timeout(
        Duration::from_millis(20),
        engine.add_due(&"A".into(), at(3, 9)),
    )
    .await
    .expect_err("times out");

    assert_eq!(err.code(), ErrorCode::OperationTimedOut);
    assert!(engine.snapshot().await.is_empty());

    // The lock was released when the timed-out future was dropped.
    let report = engine.turn_off().await.expect("off");
    assert!(report.changed);
}
