//! Behavioural properties of the reconciliation engine, driven through the
//! public API with an in-memory scheduler and a manual clock.

use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::{DateTime, TimeDelta, TimeZone, Utc};
use sprig_core::calendar::{Calendar, ManualClock};
use sprig_core::engine::{Operation, ReconciliationEngine};
use sprig_core::model::{DayKey, FireTime, NotificationState, PlantId};
use sprig_core::scheduler::{InMemoryScheduler, SchedulerCall};
use sprig_core::store::MemoryStore;

type Engine = ReconciliationEngine<Arc<InMemoryScheduler>, Arc<MemoryStore>>;

struct Fixture {
    engine: Engine,
    scheduler: Arc<InMemoryScheduler>,
    store: Arc<MemoryStore>,
    clock: Arc<ManualClock>,
}

fn at(d: u32, h: u32, m: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 6, d, h, m, 0)
        .single()
        .expect("valid instant")
}

fn day(d: u32) -> DayKey {
    DayKey::from_ymd(2025, 6, d).expect("valid day")
}

fn id(raw: &str) -> PlantId {
    PlantId::new(raw)
}

fn members(raw: &[&str]) -> BTreeSet<PlantId> {
    raw.iter().map(|r| id(r)).collect()
}

fn fixture() -> Fixture {
    let scheduler = Arc::new(InMemoryScheduler::new());
    let store = Arc::new(MemoryStore::new());
    let clock = Arc::new(ManualClock::new(at(1, 12, 0)));
    let engine = ReconciliationEngine::new(
        Arc::clone(&scheduler),
        Arc::clone(&store),
        Calendar::utc(),
        clock.clone(),
        NotificationState::default(),
    );
    Fixture {
        engine,
        scheduler,
        store,
        clock,
    }
}

#[tokio::test]
async fn adding_two_plants_to_one_day_merges_into_one_alert() {
    let f = fixture();
    f.engine.add_due(&id("A"), at(3, 9, 0)).await.expect("add A");
    f.engine.add_due(&id("B"), at(3, 18, 30)).await.expect("add B");

    let state = f.engine.snapshot().await;
    assert_eq!(state.len(), 1);
    let entry = state.entry(day(3)).expect("day 3 entry");
    assert_eq!(entry.members, members(&["A", "B"]));
    assert!(entry.alert_id.is_some());
    assert_eq!(f.scheduler.schedule_calls(), 1);
}

#[tokio::test]
async fn adding_the_same_plant_twice_is_idempotent() {
    let f = fixture();
    f.engine.add_due(&id("A"), at(3, 9, 0)).await.expect("add");
    let report = f.engine.add_due(&id("A"), at(3, 10, 0)).await.expect("re-add");

    assert!(!report.changed);
    assert_eq!(f.scheduler.schedule_calls(), 1);
    assert_eq!(f.store.save_count(), 1);
}

#[tokio::test]
async fn deleting_one_of_several_members_keeps_the_alert() {
    let f = fixture();
    f.engine.add_due(&id("A"), at(3, 9, 0)).await.expect("add A");
    f.engine.add_due(&id("B"), at(3, 9, 0)).await.expect("add B");
    let alert = f
        .engine
        .snapshot()
        .await
        .entry(day(3))
        .and_then(|entry| entry.alert_id.clone());
    f.scheduler.clear_calls();

    f.engine.delete_due(&id("A"), at(3, 9, 0)).await.expect("delete A");

    let state = f.engine.snapshot().await;
    let entry = state.entry(day(3)).expect("entry survives");
    assert_eq!(entry.members, members(&["B"]));
    assert_eq!(entry.alert_id, alert);
    assert!(f.scheduler.calls().is_empty());
}

#[tokio::test]
async fn deleting_the_last_member_cancels_and_removes() {
    let f = fixture();
    f.engine.add_due(&id("B"), at(3, 9, 0)).await.expect("add");
    let alert = f
        .engine
        .snapshot()
        .await
        .entry(day(3))
        .and_then(|entry| entry.alert_id.clone())
        .expect("alert");
    f.scheduler.clear_calls();

    let report = f.engine.delete_due(&id("B"), at(3, 9, 0)).await.expect("delete");

    assert_eq!(report.removed, vec![day(3)]);
    assert_eq!(f.scheduler.calls(), vec![SchedulerCall::Cancel(alert)]);
    assert!(f.engine.snapshot().await.is_empty());
    assert!(f.scheduler.pending().is_empty());
}

#[tokio::test]
async fn deleting_an_unknown_plant_or_day_is_a_no_op() {
    let f = fixture();
    f.engine.add_due(&id("A"), at(3, 9, 0)).await.expect("add");
    f.scheduler.clear_calls();

    let stranger = f.engine.delete_due(&id("Z"), at(3, 9, 0)).await.expect("delete");
    let empty_day = f.engine.delete_due(&id("A"), at(4, 9, 0)).await.expect("delete");

    assert!(!stranger.changed);
    assert!(!empty_day.changed);
    assert!(f.scheduler.calls().is_empty());
    assert_eq!(f.engine.snapshot().await.len(), 1);
}

#[tokio::test]
async fn same_day_edit_makes_no_calls() {
    let f = fixture();
    f.engine.add_due(&id("A"), at(3, 9, 0)).await.expect("add");
    let before = f.engine.snapshot().await;
    f.scheduler.clear_calls();

    let report = f
        .engine
        .edit_due(&id("A"), at(3, 9, 0), at(3, 23, 59))
        .await
        .expect("edit");

    assert_eq!(report.operation, Operation::EditDue);
    assert!(!report.changed);
    assert!(f.scheduler.calls().is_empty());
    assert_eq!(f.engine.snapshot().await, before);
}

#[tokio::test]
async fn cross_day_edit_moves_the_sole_member() {
    let f = fixture();
    f.engine.add_due(&id("A"), at(3, 9, 0)).await.expect("add");

    f.engine
        .edit_due(&id("A"), at(3, 9, 0), at(5, 9, 0))
        .await
        .expect("edit");

    let state = f.engine.snapshot().await;
    assert!(state.entry(day(3)).is_none());
    let entry = state.entry(day(5)).expect("day 5 entry");
    assert_eq!(entry.members, members(&["A"]));
    assert_eq!(entry.trigger_at, at(5, 7, 0));
    assert!(entry.alert_id.is_some());
}

#[tokio::test]
async fn cross_day_edit_merges_into_existing_day() {
    let f = fixture();
    f.engine.add_due(&id("A"), at(3, 9, 0)).await.expect("add A");
    f.engine.add_due(&id("B"), at(5, 9, 0)).await.expect("add B");
    f.scheduler.clear_calls();

    f.engine
        .edit_due(&id("A"), at(3, 9, 0), at(5, 20, 0))
        .await
        .expect("edit");

    let state = f.engine.snapshot().await;
    assert_eq!(state.len(), 1);
    assert_eq!(state.entry(day(5)).expect("day 5").members, members(&["A", "B"]));
    assert_eq!(f.scheduler.schedule_calls(), 0);
}

#[tokio::test]
async fn turning_off_twice_is_a_no_op_the_second_time() {
    let f = fixture();
    f.engine.add_due(&id("A"), at(3, 9, 0)).await.expect("add A");
    f.engine.add_due(&id("B"), at(4, 9, 0)).await.expect("add B");

    f.engine.turn_off().await.expect("off");
    let after_first = f.engine.snapshot().await;
    f.scheduler.clear_calls();
    let second = f.engine.turn_off().await.expect("off again");

    assert!(!second.changed);
    assert!(f.scheduler.calls().is_empty());
    assert_eq!(f.engine.snapshot().await, after_first);
    assert!(!after_first.is_enabled());
    assert_eq!(after_first.len(), 2);
    assert!(after_first.entries().all(|entry| entry.alert_id.is_none()));
    assert!(f.scheduler.pending().is_empty());
}

#[tokio::test]
async fn turning_back_on_restores_alerts_from_membership() {
    let f = fixture();
    f.engine.add_due(&id("A"), at(3, 9, 0)).await.expect("add A");
    f.engine.add_due(&id("B"), at(4, 9, 0)).await.expect("add B");
    f.engine.turn_off().await.expect("off");

    let report = f.engine.turn_on().await.expect("on");

    let state = f.engine.snapshot().await;
    assert!(state.is_enabled());
    assert_eq!(report.scheduled.len(), 2);
    assert!(state.entries().all(|entry| entry.alert_id.is_some()));
    assert_eq!(f.scheduler.pending().len(), 2);
}

#[tokio::test]
async fn turning_on_when_already_on_does_not_duplicate_alerts() {
    let f = fixture();
    f.engine.add_due(&id("A"), at(3, 9, 0)).await.expect("add");
    f.scheduler.clear_calls();

    f.engine.turn_on().await.expect("on");

    assert_eq!(f.scheduler.schedule_calls(), 0);
    assert_eq!(f.scheduler.pending().len(), 1);
}

#[tokio::test]
async fn fire_time_change_rebuilds_future_entries() {
    let f = fixture();
    f.engine.add_due(&id("A"), at(3, 9, 0)).await.expect("add A");
    f.engine.add_due(&id("B"), at(3, 9, 0)).await.expect("add B");
    f.engine.add_due(&id("C"), at(6, 9, 0)).await.expect("add C");

    let report = f
        .engine
        .change_fire_time(FireTime::new(18, 45).expect("valid"))
        .await
        .expect("change");

    assert!(report.is_clean());
    let state = f.engine.snapshot().await;
    assert_eq!(state.fire_time(), FireTime::new(18, 45).expect("valid"));
    assert_eq!(state.entry(day(3)).expect("day 3").trigger_at, at(3, 18, 45));
    assert_eq!(state.entry(day(3)).expect("day 3").members, members(&["A", "B"]));
    assert_eq!(state.entry(day(6)).expect("day 6").trigger_at, at(6, 18, 45));
    assert!(
        state
            .invariant_violations(&Calendar::utc())
            .is_empty()
    );
    assert_eq!(f.scheduler.pending().len(), 2);
    assert_eq!(f.scheduler.calls()[2], SchedulerCall::CancelAll);
}

#[tokio::test]
async fn fire_time_change_drops_stale_entries() {
    let f = fixture();
    f.engine.add_due(&id("A"), at(2, 9, 0)).await.expect("add A");
    f.engine.add_due(&id("B"), at(5, 9, 0)).await.expect("add B");
    f.clock.set(at(2, 6, 30));

    let report = f
        .engine
        .change_fire_time(FireTime::new(6, 0).expect("valid"))
        .await
        .expect("change");

    // Day 2 was still pending at 07:00, but 06:00 has already passed.
    assert_eq!(report.removed, vec![day(2)]);
    let state = f.engine.snapshot().await;
    assert!(state.entry(day(2)).is_none());
    assert_eq!(state.entry(day(5)).expect("day 5").trigger_at, at(5, 6, 0));
}

#[tokio::test]
async fn any_operation_prunes_stale_entries() {
    let f = fixture();
    f.engine.add_due(&id("A"), at(2, 9, 0)).await.expect("add A");
    f.engine.add_due(&id("B"), at(9, 9, 0)).await.expect("add B");
    f.clock.advance(TimeDelta::days(1));

    // Touches day 9 only; day 2 fired at 07:00 today and is gone.
    let report = f.engine.delete_due(&id("Z"), at(9, 9, 0)).await.expect("delete");

    assert_eq!(report.pruned, vec![day(2)]);
    assert!(report.changed);
    let state = f.engine.snapshot().await;
    assert!(state.entry(day(2)).is_none());
    assert!(state.entry(day(9)).is_some());
}

#[tokio::test]
async fn reset_cancels_everything_and_keeps_settings() {
    let f = fixture();
    f.engine.add_due(&id("A"), at(3, 9, 0)).await.expect("add A");
    f.engine.add_due(&id("B"), at(4, 9, 0)).await.expect("add B");
    f.engine
        .change_fire_time(FireTime::new(8, 0).expect("valid"))
        .await
        .expect("change");

    let report = f.engine.reset().await.expect("reset");

    assert_eq!(report.removed, vec![day(3), day(4)]);
    let state = f.engine.snapshot().await;
    assert!(state.is_empty());
    assert!(state.is_enabled());
    assert_eq!(state.fire_time(), FireTime::new(8, 0).expect("valid"));
    assert!(f.scheduler.pending().is_empty());
}

#[tokio::test]
async fn every_commit_is_persisted() {
    let f = fixture();
    f.engine.add_due(&id("A"), at(3, 9, 0)).await.expect("add");
    f.engine.turn_off().await.expect("off");

    let saved = f.store.saved().expect("saved record");
    assert!(!saved.enabled);
    assert_eq!(saved.entries.len(), 1);
    assert_eq!(saved.entries[0].alert_id, None);
    assert_eq!(f.store.save_count(), 2);
}

#[tokio::test]
async fn watering_lifecycle_end_to_end() {
    let f = fixture();
    // Three plants, two due on the 3rd, one on the 4th.
    f.engine.add_due(&id("fern"), at(3, 10, 0)).await.expect("add");
    f.engine.add_due(&id("ivy"), at(3, 16, 0)).await.expect("add");
    f.engine.add_due(&id("palm"), at(4, 8, 0)).await.expect("add");
    assert_eq!(f.scheduler.pending().len(), 2);

    // Fern is watered early and moves to the 6th.
    f.engine
        .edit_due(&id("fern"), at(3, 10, 0), at(6, 10, 0))
        .await
        .expect("water fern");
    // Palm joins ivy on the 3rd.
    f.engine
        .edit_due(&id("palm"), at(4, 8, 0), at(3, 8, 0))
        .await
        .expect("move palm");

    let state = f.engine.snapshot().await;
    assert_eq!(state.entry(day(3)).expect("day 3").members, members(&["ivy", "palm"]));
    assert!(state.entry(day(4)).is_none());
    assert_eq!(state.entry(day(6)).expect("day 6").members, members(&["fern"]));
    assert_eq!(f.scheduler.pending().len(), 2);

    // The 3rd's reminder fires; the next operation prunes it.
    f.clock.set(at(3, 7, 30));
    f.engine
        .change_fire_time(FireTime::new(9, 15).expect("valid"))
        .await
        .expect("change time");
    let state = f.engine.snapshot().await;
    assert_eq!(state.len(), 1);
    assert_eq!(state.entry(day(6)).expect("day 6").trigger_at, at(6, 9, 15));
    assert_eq!(f.scheduler.pending().values().copied().collect::<Vec<_>>(), vec![at(6, 9, 15)]);
    assert!(state.invariant_violations(&Calendar::utc()).is_empty());
}
