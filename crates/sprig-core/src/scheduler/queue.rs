//! File-backed alert queue standing in for the device's local alert facility.
//!
//! Pending alerts live in a JSON file next to the rest of the project state.
//! A reminder "fires" once its instant has passed; [`AlertQueue::take_fired`]
//! hands fired alerts to whatever displays them and drops them from the queue.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;

use super::{ALERT_TITLE, AlertId, SchedulerClient, SchedulingFailure};

/// Whether the user allowed this application to post alerts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Permission {
    #[default]
    Granted,
    Denied,
}

/// One alert waiting in the queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingAlert {
    pub id: AlertId,
    pub fire_at: DateTime<Utc>,
    pub title: String,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct QueueFile {
    #[serde(default)]
    next_seq: u64,
    #[serde(default)]
    alerts: Vec<PendingAlert>,
}

/// Scheduler backed by a JSON file of pending alerts.
///
/// Clones share one gate, so concurrent calls never interleave their
/// read-modify-write of the queue file.
#[derive(Debug, Clone)]
pub struct AlertQueue {
    path: PathBuf,
    permission: Permission,
    gate: Arc<Mutex<()>>,
}

impl AlertQueue {
    pub fn new(path: impl Into<PathBuf>, permission: Permission) -> Self {
        Self {
            path: path.into(),
            permission,
            gate: Arc::new(Mutex::new(())),
        }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Alerts not yet fired or taken, ordered by fire time.
    pub async fn pending(&self) -> Result<Vec<PendingAlert>, SchedulingFailure> {
        let _gate = self.gate.lock().await;
        let mut alerts = self.read().await?.alerts;
        alerts.sort_by(|a, b| a.fire_at.cmp(&b.fire_at).then_with(|| a.id.cmp(&b.id)));
        Ok(alerts)
    }

    /// Remove and return every alert whose fire time is at or before `now`.
    pub async fn take_fired(&self, now: DateTime<Utc>) -> Result<Vec<PendingAlert>, SchedulingFailure> {
        let _gate = self.gate.lock().await;
        let mut file = self.read().await?;
        let (mut fired, waiting): (Vec<_>, Vec<_>) =
            file.alerts.into_iter().partition(|alert| alert.fire_at <= now);
        file.alerts = waiting;
        if !fired.is_empty() {
            self.write(&file).await?;
        }
        fired.sort_by(|a, b| a.fire_at.cmp(&b.fire_at));
        Ok(fired)
    }

    fn check_permission(&self) -> Result<(), SchedulingFailure> {
        match self.permission {
            Permission::Granted => Ok(()),
            Permission::Denied => Err(SchedulingFailure::PermissionDenied),
        }
    }

    async fn read(&self) -> Result<QueueFile, SchedulingFailure> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(content) if content.trim().is_empty() => Ok(QueueFile::default()),
            Ok(content) => serde_json::from_str(&content).map_err(|err| {
                SchedulingFailure::Platform(format!(
                    "alert queue {} is corrupt: {err}",
                    self.path.display()
                ))
            }),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(QueueFile::default()),
            Err(err) => Err(SchedulingFailure::Platform(format!(
                "failed to read alert queue {}: {err}",
                self.path.display()
            ))),
        }
    }

    async fn write(&self, file: &QueueFile) -> Result<(), SchedulingFailure> {
        let io_failure = |err: &dyn std::fmt::Display| {
            SchedulingFailure::Platform(format!(
                "failed to write alert queue {}: {err}",
                self.path.display()
            ))
        };
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| io_failure(&e))?;
        }
        let body = serde_json::to_string_pretty(file).map_err(|e| io_failure(&e))?;
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, body).await.map_err(|e| io_failure(&e))?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .map_err(|e| io_failure(&e))
    }
}

#[async_trait]
impl SchedulerClient for AlertQueue {
    async fn schedule(&self, trigger_at: DateTime<Utc>) -> Result<AlertId, SchedulingFailure> {
        self.check_permission()?;
        let _gate = self.gate.lock().await;
        let mut file = self.read().await?;
        file.next_seq += 1;
        let id = AlertId::new(format!("alert-{}", file.next_seq));
        file.alerts.push(PendingAlert {
            id: id.clone(),
            fire_at: trigger_at,
            title: ALERT_TITLE.to_string(),
        });
        self.write(&file).await?;
        debug!(alert = %id, %trigger_at, "queued alert");
        Ok(id)
    }

    async fn cancel(&self, id: &AlertId) -> Result<(), SchedulingFailure> {
        self.check_permission()?;
        let _gate = self.gate.lock().await;
        let mut file = self.read().await?;
        let before = file.alerts.len();
        file.alerts.retain(|alert| &alert.id != id);
        if file.alerts.len() != before {
            self.write(&file).await?;
            debug!(alert = %id, "cancelled alert");
        }
        Ok(())
    }

    async fn cancel_all(&self) -> Result<(), SchedulingFailure> {
        self.check_permission()?;
        let _gate = self.gate.lock().await;
        let mut file = self.read().await?;
        if file.alerts.is_empty() {
            return Ok(());
        }
        file.alerts.clear();
        self.write(&file).await?;
        debug!("cancelled all alerts");
        Ok(())
    }
}
