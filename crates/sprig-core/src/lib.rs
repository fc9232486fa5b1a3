//! sprig-core library.
//!
//! Keeps one-shot watering reminders in step with plant due dates: at most
//! one alert per calendar day, fired at the user's chosen time of day,
//! listing every plant due that day.
//!
//! # Conventions
//!
//! - **Errors**: typed `thiserror` enums at module boundaries, each mapping to
//!   an [`error::ErrorCode`]; `anyhow::Result` at the configuration layer.
//! - **Logging**: `tracing` macros (`info!` for commits, `debug!` for each
//!   reconciliation step, `warn!` for scheduler failures, `error!` for state
//!   inconsistencies).

pub mod calendar;
pub mod config;
pub mod engine;
pub mod error;
pub mod lock;
pub mod model;
pub mod plant;
pub mod scheduler;
pub mod status;
pub mod store;

pub use calendar::{Calendar, Clock, ManualClock, SystemClock};
pub use engine::{
    DueDateSink, EngineError, EngineOptions, Operation, Reconciliation, ReconciliationEngine,
    ReportedFailure, SchedulerStep, with_timeout,
};
pub use error::ErrorCode;
pub use model::{AlertId, DayKey, FireTime, NotificationEntry, NotificationState, PlantId};
pub use scheduler::{SchedulerClient, SchedulingFailure};
