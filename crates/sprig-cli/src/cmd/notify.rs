//! `sprig notify`: show and change reminder settings.

use crate::cmd::{Engine, Project};
use crate::output::{
    OutputMode, ReportView, pretty_kv, pretty_section, render, render_mode, write_report_warnings,
};
use anyhow::Result;
use chrono::{DateTime, Utc};
use clap::{Args, Subcommand};
use serde::Serialize;
use sprig_core::engine::{Operation, Reconciliation, with_timeout};
use sprig_core::model::{FireTime, NotificationState};
use std::io::{self, Write};
use std::path::Path;

#[derive(Args, Debug)]
pub struct NotifyArgs {
    #[command(subcommand)]
    pub command: NotifyCommand,
}

#[derive(Subcommand, Debug)]
pub enum NotifyCommand {
    /// Show reminder settings and every scheduled day.
    Status,
    /// Turn reminders on and schedule every day that lacks one.
    On,
    /// Turn reminders off and cancel every pending alert.
    Off,
    /// Change the time of day at which reminders fire.
    Time {
        /// 24-hour time, e.g. 07:30.
        time: FireTime,
    },
    /// Cancel every alert and forget all reminder days.
    Reset,
}

#[derive(Debug, Serialize)]
struct ReminderView {
    day: String,
    trigger_at: DateTime<Utc>,
    scheduled: bool,
    stale: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    alert: Option<String>,
    plants: Vec<String>,
}

#[derive(Debug, Serialize)]
struct StatusView {
    enabled: bool,
    fire_time: String,
    calendar: String,
    reminders: Vec<ReminderView>,
}

impl StatusView {
    fn new(state: &NotificationState, calendar: String, now: DateTime<Utc>) -> Self {
        let reminders = state
            .entries()
            .map(|entry| ReminderView {
                day: entry.day.to_string(),
                trigger_at: entry.trigger_at,
                scheduled: entry.alert_id.is_some(),
                stale: entry.is_stale(now),
                alert: entry.alert_id.as_ref().map(ToString::to_string),
                plants: entry.members.iter().map(ToString::to_string).collect(),
            })
            .collect();
        Self {
            enabled: state.is_enabled(),
            fire_time: state.fire_time().to_string(),
            calendar,
            reminders,
        }
    }
}

#[derive(Debug, Serialize)]
struct SettingsChange {
    enabled: bool,
    fire_time: String,
    #[serde(flatten)]
    report: ReportView,
}

/// Execute `sprig notify <subcommand>`.
///
/// # Errors
///
/// Returns an error if the project cannot be opened, an operation times out
/// or cannot persist, or a reset of the alert scheduler aborted the change.
pub async fn run_notify(args: &NotifyArgs, output: OutputMode, project_root: &Path) -> Result<()> {
    let project = Project::open(project_root, output)?;
    let engine = project.engine()?;
    let limit = project.timeout();

    let result = match &args.command {
        NotifyCommand::Status => {
            let state = engine.snapshot().await;
            let view = StatusView::new(&state, project.calendar.to_string(), project.now());
            return render_mode(output, &view, write_status_text, write_status_pretty);
        }
        NotifyCommand::On => with_timeout(limit, engine.turn_on()).await,
        NotifyCommand::Off => with_timeout(limit, engine.turn_off()).await,
        NotifyCommand::Time { time } => with_timeout(limit, engine.change_fire_time(*time)).await,
        NotifyCommand::Reset => with_timeout(limit, engine.reset()).await,
    };

    let report = match result {
        Ok(report) => report,
        Err(err) => {
            // The change is live but unsaved; still show what the scheduler did.
            if let Some(report) = err.report() {
                render_change(output, &engine, report).await?;
            }
            return Err(err.into());
        }
    };
    render_change(output, &engine, &report).await?;

    if report.aborted {
        anyhow::bail!("settings unchanged: every pending alert must be cancelled first");
    }
    Ok(())
}

async fn render_change(output: OutputMode, engine: &Engine, report: &Reconciliation) -> Result<()> {
    let state = engine.snapshot().await;
    let change = SettingsChange {
        enabled: state.is_enabled(),
        fire_time: state.fire_time().to_string(),
        report: ReportView::from(report),
    };
    render(output, &change, write_change)
}

fn write_change(change: &SettingsChange, w: &mut dyn Write) -> io::Result<()> {
    let on_off = if change.enabled { "on" } else { "off" };
    if !change.report.aborted {
        match change.report.operation {
            Operation::TurnOn => writeln!(w, "✓ Reminders on at {}", change.fire_time)?,
            Operation::TurnOff => writeln!(w, "✓ Reminders off")?,
            Operation::ChangeFireTime => {
                writeln!(w, "✓ Reminder time set to {} (reminders {on_off})", change.fire_time)?;
            }
            _ => writeln!(w, "✓ Reminders reset")?,
        }
    }
    if !change.report.scheduled.is_empty() {
        writeln!(w, "  scheduled: {}", change.report.scheduled.join(", "))?;
    }
    if !change.report.removed.is_empty() {
        writeln!(w, "  dropped:   {}", change.report.removed.join(", "))?;
    }
    write_report_warnings(w, &change.report)
}

fn write_status_text(view: &StatusView, w: &mut dyn Write) -> io::Result<()> {
    let on_off = if view.enabled { "on" } else { "off" };
    writeln!(w, "reminders {on_off} at {} ({})", view.fire_time, view.calendar)?;
    for reminder in &view.reminders {
        let mark = if reminder.scheduled { "scheduled" } else { "unscheduled" };
        writeln!(w, "{}\t{mark}\t{}", reminder.day, reminder.plants.join(","))?;
    }
    Ok(())
}

fn write_status_pretty(view: &StatusView, w: &mut dyn Write) -> io::Result<()> {
    pretty_section(w, "Reminders")?;
    pretty_kv(w, "Enabled", if view.enabled { "yes" } else { "no" })?;
    pretty_kv(w, "Time", &view.fire_time)?;
    pretty_kv(w, "Calendar", &view.calendar)?;
    writeln!(w)?;
    if view.reminders.is_empty() {
        writeln!(w, "No upcoming reminders.")?;
        return Ok(());
    }
    pretty_section(w, "Days")?;
    for reminder in &view.reminders {
        let mark = match (reminder.scheduled, reminder.stale) {
            (_, true) => "past",
            (true, false) => "scheduled",
            (false, false) => "not scheduled",
        };
        let plants = reminder.plants.len();
        let noun = if plants == 1 { "plant" } else { "plants" };
        writeln!(w, "{:<12} {mark:<14} {plants} {noun}", reminder.day)?;
    }
    Ok(())
}
