//! `sprig plant`: track plants. Every due-date change keeps reminders in step.

use crate::cmd::Project;
use crate::output::{
    OutcomeView, OutputMode, pretty_kv, pretty_section, render, render_mode, write_outcome_warnings,
};
use anyhow::Result;
use chrono::{DateTime, Utc};
use clap::{Args, Subcommand};
use serde::Serialize;
use sprig_core::calendar::Calendar;
use sprig_core::model::PlantId;
use sprig_core::plant::{NewPlant, Plant, PlantChange, PlantError, PlantUpdate};
use sprig_core::status::WateringStatus;
use std::io::{self, Write};
use std::path::Path;

#[derive(Args, Debug)]
pub struct PlantArgs {
    #[command(subcommand)]
    pub command: PlantCommand,
}

#[derive(Subcommand, Debug)]
pub enum PlantCommand {
    /// Start tracking a plant.
    Add(AddArgs),
    /// List plants by next due date, with their watering status.
    List(ListArgs),
    /// Show one plant.
    Show {
        /// Plant ID.
        id: String,
    },
    /// Record a watering now and push the next due date out.
    Water {
        /// Plant ID.
        id: String,
    },
    /// Change a plant's name, frequency, notes, or next due date.
    Edit(EditArgs),
    /// Undo the last recorded watering. The due date stays as it is.
    Revert {
        /// Plant ID.
        id: String,
    },
    /// Stop tracking a plant.
    Remove {
        /// Plant ID.
        id: String,
    },
}

#[derive(Args, Debug)]
pub struct AddArgs {
    /// Display name.
    #[arg(long)]
    pub name: String,

    /// Water every N days.
    #[arg(long = "every", value_name = "DAYS")]
    pub every_days: u32,

    /// Explicit ID (generated when omitted).
    #[arg(long)]
    pub id: Option<String>,

    /// When the plant was last watered (YYYY-MM-DD or RFC 3339).
    #[arg(long, value_name = "WHEN")]
    pub last_watered: Option<String>,

    /// Next due date; defaults to the last watering (or now) plus the frequency.
    #[arg(long, value_name = "WHEN")]
    pub next: Option<String>,

    /// Free-form note; repeat for several.
    #[arg(long = "note")]
    pub notes: Vec<String>,
}

#[derive(Args, Debug)]
pub struct ListArgs {
    /// Only show plants whose name starts with PREFIX (case-insensitive).
    #[arg(long, value_name = "PREFIX")]
    pub search: Option<String>,
}

#[derive(Args, Debug)]
pub struct EditArgs {
    /// Plant ID.
    pub id: String,

    #[arg(long)]
    pub name: Option<String>,

    #[arg(long = "every", value_name = "DAYS")]
    pub every_days: Option<u32>,

    /// New next due date (YYYY-MM-DD or RFC 3339).
    #[arg(long, value_name = "WHEN")]
    pub next: Option<String>,

    /// Replace all notes; repeat for several.
    #[arg(long = "note")]
    pub notes: Vec<String>,

    /// Remove all notes.
    #[arg(long, conflicts_with = "notes")]
    pub clear_notes: bool,
}

#[derive(Debug, Serialize)]
struct PlantView {
    id: String,
    name: String,
    every_days: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    last_watered_at: Option<DateTime<Utc>>,
    next_water_at: DateTime<Utc>,
    watering: WateringStatus,
    summary: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    notes: Vec<String>,
}

impl PlantView {
    fn new(plant: &Plant, now: DateTime<Utc>, calendar: Calendar) -> Self {
        let watering = WateringStatus::compute(plant.next_water_at, now, calendar);
        Self {
            id: plant.id.to_string(),
            name: plant.name.clone(),
            every_days: plant.watering_frequency_days,
            last_watered_at: plant.last_watered_at,
            next_water_at: plant.next_water_at,
            watering,
            summary: watering.to_string(),
            notes: plant.notes.clone(),
        }
    }
}

#[derive(Debug, Serialize)]
struct ChangeView {
    action: &'static str,
    plant: PlantView,
    notifications: OutcomeView,
}

#[derive(Debug, Serialize)]
struct ListView {
    #[serde(skip_serializing_if = "Option::is_none")]
    search: Option<String>,
    plants: Vec<PlantView>,
    overdue: usize,
}

impl ListView {
    /// Plants soonest due first, narrowed to names starting with `search`.
    fn new(
        plants: &[Plant],
        search: Option<&str>,
        now: DateTime<Utc>,
        calendar: Calendar,
    ) -> Self {
        let search = search.map(str::trim).filter(|prefix| !prefix.is_empty());
        let needle = search.map(str::to_lowercase);
        let mut shown: Vec<&Plant> = plants
            .iter()
            .filter(|plant| {
                needle
                    .as_deref()
                    .is_none_or(|prefix| plant.name.to_lowercase().starts_with(prefix))
            })
            .collect();
        shown.sort_by_key(|plant| plant.next_water_at);
        let plants: Vec<PlantView> = shown
            .into_iter()
            .map(|plant| PlantView::new(plant, now, calendar))
            .collect();
        let overdue = plants.iter().filter(|p| p.watering.is_overdue()).count();
        Self {
            search: search.map(str::to_string),
            plants,
            overdue,
        }
    }
}

/// Execute `sprig plant <subcommand>`.
///
/// # Errors
///
/// Returns an error if the project cannot be opened, input is invalid, the
/// plant does not exist, or the plant file cannot be saved. Reminder
/// failures are reported alongside the plant and do not fail the command.
pub async fn run_plant(args: &PlantArgs, output: OutputMode, project_root: &Path) -> Result<()> {
    let project = Project::open(project_root, output)?;
    let mut store = project.plant_store()?;
    let now = project.now();

    let (action, change) = match &args.command {
        PlantCommand::List(list) => {
            let search = list.search.as_deref();
            let view = ListView::new(store.plants(), search, now, project.calendar);
            return render_mode(output, &view, write_list_text, write_list_pretty);
        }
        PlantCommand::Show { id } => {
            let id = PlantId::new(id.as_str());
            let plant = store.get(&id).ok_or(PlantError::NotFound(id))?;
            let view = PlantView::new(plant, now, project.calendar);
            return render(output, &view, write_plant_detail);
        }
        PlantCommand::Add(add) => {
            let new = NewPlant {
                id: add.id.as_deref().map(PlantId::new),
                name: add.name.clone(),
                watering_frequency_days: add.every_days,
                last_watered_at: add
                    .last_watered
                    .as_deref()
                    .map(|raw| project.parse_when(raw))
                    .transpose()?,
                next_water_at: add
                    .next
                    .as_deref()
                    .map(|raw| project.parse_when(raw))
                    .transpose()?,
                notes: add.notes.clone(),
            };
            ("added", store.add_plant(new, now).await?)
        }
        PlantCommand::Water { id } => ("watered", store.water_plant(&PlantId::new(id.as_str()), now).await?),
        PlantCommand::Edit(edit) => {
            let update = PlantUpdate {
                name: edit.name.clone(),
                watering_frequency_days: edit.every_days,
                next_water_at: edit
                    .next
                    .as_deref()
                    .map(|raw| project.parse_when(raw))
                    .transpose()?,
                notes: if edit.clear_notes {
                    Some(Vec::new())
                } else if edit.notes.is_empty() {
                    None
                } else {
                    Some(edit.notes.clone())
                },
            };
            if update.is_empty() {
                anyhow::bail!("nothing to change: pass --name, --every, --next, --note, or --clear-notes");
            }
            let id = PlantId::new(edit.id.as_str());
            ("edited", store.edit_plant(&id, update).await?)
        }
        PlantCommand::Revert { id } => ("reverted", store.revert_last_watered(&PlantId::new(id.as_str()))?),
        PlantCommand::Remove { id } => ("removed", store.remove_plant(&PlantId::new(id.as_str())).await?),
    };

    render_change(output, action, &change, now, project.calendar)
}

fn render_change(
    output: OutputMode,
    action: &'static str,
    change: &PlantChange,
    now: DateTime<Utc>,
    calendar: Calendar,
) -> Result<()> {
    let view = ChangeView {
        action,
        plant: PlantView::new(&change.plant, now, calendar),
        notifications: OutcomeView::from(&change.notifications),
    };
    render(output, &view, |view, w| {
        writeln!(w, "✓ {} {} ({})", capitalize(view.action), view.plant.name, view.plant.id)?;
        if view.action != "removed" {
            writeln!(w, "  {}", view.plant.summary)?;
        }
        write_outcome_warnings(w, &view.notifications)
    })
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    chars.next().map_or_else(String::new, |first| {
        first.to_uppercase().chain(chars).collect()
    })
}

fn write_plant_detail(view: &PlantView, w: &mut dyn Write) -> io::Result<()> {
    pretty_section(w, &view.name)?;
    pretty_kv(w, "ID", &view.id)?;
    pretty_kv(w, "Every", format!("{} days", view.every_days))?;
    if let Some(last) = view.last_watered_at {
        pretty_kv(w, "Watered", last.to_rfc3339())?;
    }
    pretty_kv(w, "Next", view.next_water_at.to_rfc3339())?;
    pretty_kv(w, "Status", &view.summary)?;
    for note in &view.notes {
        pretty_kv(w, "Note", note)?;
    }
    Ok(())
}

fn write_list_text(view: &ListView, w: &mut dyn Write) -> io::Result<()> {
    for plant in &view.plants {
        writeln!(w, "{}\t{}\t{}", plant.id, plant.name, plant.summary)?;
    }
    Ok(())
}

fn write_list_pretty(view: &ListView, w: &mut dyn Write) -> io::Result<()> {
    if view.plants.is_empty() {
        if view.search.is_some() {
            writeln!(w, "No plants found")?;
        } else {
            writeln!(w, "No plants yet. Add one with `sprig plant add --name NAME --every DAYS`.")?;
        }
        return Ok(());
    }
    pretty_section(w, &format!("Plants ({})", view.plants.len()))?;
    for plant in &view.plants {
        let flag = if plant.watering.is_overdue() { "!" } else { " " };
        writeln!(w, "{flag} {:<24} {}", plant.name, plant.summary)?;
    }
    if view.overdue > 0 {
        writeln!(w)?;
        writeln!(w, "{} overdue", view.overdue)?;
    }
    Ok(())
}
