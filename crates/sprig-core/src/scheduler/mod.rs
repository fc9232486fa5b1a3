//! Boundary to the host's one-shot local alert facility.
//!
//! Every call is independently fallible and returns an explicit result; the
//! engine decides what a failure means for the entry it was working on.
//! Nothing here retries.

pub mod memory;
pub mod queue;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;

use crate::error::ErrorCode;
pub use crate::model::AlertId;

pub use memory::{InMemoryScheduler, SchedulerCall};
pub use queue::{AlertQueue, PendingAlert, Permission};

/// Title shown on every watering reminder.
pub const ALERT_TITLE: &str = "It's time to water your plants!";

/// A single scheduler call failed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SchedulingFailure {
    /// The user has not granted (or has revoked) the notification permission.
    #[error("notification permission denied")]
    PermissionDenied,
    /// The platform rejected or could not complete the call.
    #[error("scheduler error: {0}")]
    Platform(String),
}

impl SchedulingFailure {
    /// Machine-readable code associated with this failure.
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::PermissionDenied => ErrorCode::PermissionDenied,
            Self::Platform(_) => ErrorCode::SchedulerUnavailable,
        }
    }

    /// Optional remediation hint for the user.
    #[must_use]
    pub const fn hint(&self) -> Option<&'static str> {
        self.code().hint()
    }

    #[must_use]
    pub const fn is_permission_denied(&self) -> bool {
        matches!(self, Self::PermissionDenied)
    }
}

/// Host alert facility: schedule, cancel one, cancel everything.
#[async_trait]
pub trait SchedulerClient: Send + Sync {
    /// Request a one-shot alert at `trigger_at`.
    async fn schedule(&self, trigger_at: DateTime<Utc>) -> Result<AlertId, SchedulingFailure>;

    /// Cancel a previously scheduled alert.
    async fn cancel(&self, id: &AlertId) -> Result<(), SchedulingFailure>;

    /// Cancel every alert this application has scheduled.
    async fn cancel_all(&self) -> Result<(), SchedulingFailure>;
}

#[async_trait]
impl<T: SchedulerClient + ?Sized> SchedulerClient for Arc<T> {
    async fn schedule(&self, trigger_at: DateTime<Utc>) -> Result<AlertId, SchedulingFailure> {
        (**self).schedule(trigger_at).await
    }

    async fn cancel(&self, id: &AlertId) -> Result<(), SchedulingFailure> {
        (**self).cancel(id).await
    }

    async fn cancel_all(&self) -> Result<(), SchedulingFailure> {
        (**self).cancel_all().await
    }
}
