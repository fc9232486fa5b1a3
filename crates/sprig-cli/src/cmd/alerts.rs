//! `sprig alerts`: inspect the desktop alert queue, or deliver alerts that have fired.

use crate::cmd::Project;
use crate::output::{OutputMode, render};
use anyhow::Result;
use clap::Args;
use serde::Serialize;
use sprig_core::scheduler::PendingAlert;
use std::path::Path;

#[derive(Args, Debug)]
pub struct AlertsArgs {
    /// Deliver (print and drop) every alert whose time has passed.
    #[arg(long)]
    pub fired: bool,
}

#[derive(Debug, Serialize)]
struct AlertsView {
    fired: bool,
    alerts: Vec<PendingAlert>,
}

/// Execute `sprig alerts`.
///
/// # Errors
///
/// Returns an error if the project cannot be opened or the queue file is unreadable.
pub async fn run_alerts(args: &AlertsArgs, output: OutputMode, project_root: &Path) -> Result<()> {
    let project = Project::open(project_root, output)?;
    let queue = project.alert_queue();

    let alerts = if args.fired {
        queue.take_fired(project.now()).await?
    } else {
        queue.pending().await?
    };
    let view = AlertsView {
        fired: args.fired,
        alerts,
    };

    render(output, &view, |view, w| {
        if view.alerts.is_empty() {
            let none = if view.fired { "No alerts have fired." } else { "No pending alerts." };
            writeln!(w, "{none}")?;
            return Ok(());
        }
        for alert in &view.alerts {
            if view.fired {
                writeln!(w, "🔔 {} ({})", alert.title, alert.fire_at.to_rfc3339())?;
            } else {
                writeln!(w, "{}\t{}", alert.fire_at.to_rfc3339(), alert.id)?;
            }
        }
        Ok(())
    })
}
