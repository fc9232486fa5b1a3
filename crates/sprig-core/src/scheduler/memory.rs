//! In-process scheduler with a call log and scriptable failures.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};

use super::{AlertId, SchedulerClient, SchedulingFailure};

/// One call observed by [`InMemoryScheduler`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchedulerCall {
    Schedule(DateTime<Utc>),
    Cancel(AlertId),
    CancelAll,
}

#[derive(Debug, Default)]
struct Inner {
    next_seq: u64,
    pending: BTreeMap<AlertId, DateTime<Utc>>,
    calls: Vec<SchedulerCall>,
    denied: bool,
    schedule_failures: VecDeque<SchedulingFailure>,
    cancel_failures: VecDeque<SchedulingFailure>,
    cancel_all_failures: VecDeque<SchedulingFailure>,
    failing_triggers: BTreeSet<DateTime<Utc>>,
}

/// Scheduler that keeps pending alerts in memory.
///
/// Failures can be queued per call kind (`fail_next_*`), pinned to specific
/// trigger instants, or forced for every call by denying permission. Every
/// call is recorded, including failed ones.
#[derive(Debug, Default)]
pub struct InMemoryScheduler {
    inner: Mutex<Inner>,
}

impl InMemoryScheduler {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Alerts currently pending, keyed by id.
    #[must_use]
    pub fn pending(&self) -> BTreeMap<AlertId, DateTime<Utc>> {
        self.lock().pending.clone()
    }

    /// Every call made so far, in order.
    #[must_use]
    pub fn calls(&self) -> Vec<SchedulerCall> {
        self.lock().calls.clone()
    }

    /// Forget the call log, keeping pending alerts.
    pub fn clear_calls(&self) {
        self.lock().calls.clear();
    }

    #[must_use]
    pub fn schedule_calls(&self) -> usize {
        self.lock()
            .calls
            .iter()
            .filter(|call| matches!(call, SchedulerCall::Schedule(_)))
            .count()
    }

    /// Make every subsequent call fail with `PermissionDenied` (or stop doing so).
    pub fn set_permission_denied(&self, denied: bool) {
        self.lock().denied = denied;
    }

    pub fn fail_next_schedule(&self, failure: SchedulingFailure) {
        self.lock().schedule_failures.push_back(failure);
    }

    pub fn fail_next_cancel(&self, failure: SchedulingFailure) {
        self.lock().cancel_failures.push_back(failure);
    }

    pub fn fail_next_cancel_all(&self, failure: SchedulingFailure) {
        self.lock().cancel_all_failures.push_back(failure);
    }

    /// Fail every `schedule` call for exactly this trigger instant.
    pub fn fail_trigger(&self, trigger_at: DateTime<Utc>) {
        self.lock().failing_triggers.insert(trigger_at);
    }
}

#[async_trait]
impl SchedulerClient for InMemoryScheduler {
    async fn schedule(&self, trigger_at: DateTime<Utc>) -> Result<AlertId, SchedulingFailure> {
        let mut inner = self.lock();
        inner.calls.push(SchedulerCall::Schedule(trigger_at));
        if inner.denied {
            return Err(SchedulingFailure::PermissionDenied);
        }
        if let Some(failure) = inner.schedule_failures.pop_front() {
            return Err(failure);
        }
        if inner.failing_triggers.contains(&trigger_at) {
            return Err(SchedulingFailure::Platform(format!(
                "trigger {trigger_at} rejected"
            )));
        }
        inner.next_seq += 1;
        let id = AlertId::new(format!("mem-{}", inner.next_seq));
        inner.pending.insert(id.clone(), trigger_at);
        Ok(id)
    }

    async fn cancel(&self, id: &AlertId) -> Result<(), SchedulingFailure> {
        let mut inner = self.lock();
        inner.calls.push(SchedulerCall::Cancel(id.clone()));
        if inner.denied {
            return Err(SchedulingFailure::PermissionDenied);
        }
        if let Some(failure) = inner.cancel_failures.pop_front() {
            return Err(failure);
        }
        inner.pending.remove(id);
        Ok(())
    }

    async fn cancel_all(&self) -> Result<(), SchedulingFailure> {
        let mut inner = self.lock();
        inner.calls.push(SchedulerCall::CancelAll);
        if inner.denied {
            return Err(SchedulingFailure::PermissionDenied);
        }
        if let Some(failure) = inner.cancel_all_failures.pop_front() {
            return Err(failure);
        }
        inner.pending.clear();
        Ok(())
    }
}
