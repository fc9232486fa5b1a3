use crate::output::{OutputMode, render};
use anyhow::{Context as _, Result};
use clap::Args;
use serde::Serialize;
use sprig_core::config::{ProjectPaths, default_project_toml};
use std::path::Path;

#[derive(Args, Debug)]
pub struct InitArgs {
    /// Overwrite `.sprig/config.toml` even if `.sprig/` already exists.
    #[arg(long)]
    pub force: bool,
}

const GITIGNORE: &str = "lock\nalerts.json\n";

#[derive(Debug, Serialize)]
struct InitReport {
    dir: String,
    config: String,
    reinitialized: bool,
}

/// Execute `sprig init`. Creates the project skeleton:
///
/// ```text
/// .sprig/
///   config.toml   (default project config)
///   .gitignore    (lock, alerts.json)
/// ```
///
/// Plant and notification state files are created on first write.
///
/// # Errors
///
/// Returns an error if `.sprig/` already exists and `--force` is not set,
/// or if any filesystem operation fails.
pub fn run_init(args: &InitArgs, output: OutputMode, project_root: &Path) -> Result<()> {
    let paths = ProjectPaths::new(project_root);
    let reinitialized = paths.is_initialized();

    if reinitialized && !args.force {
        anyhow::bail!(".sprig/ already exists. Use `sprig init --force` to reinitialize.");
    }

    let dir = paths.dir();
    std::fs::create_dir_all(&dir)
        .with_context(|| format!("Failed to create {}", dir.display()))?;

    let config_path = paths.config();
    std::fs::write(&config_path, default_project_toml()?)
        .with_context(|| format!("Failed to write config: {}", config_path.display()))?;

    let gitignore_path = dir.join(".gitignore");
    std::fs::write(&gitignore_path, GITIGNORE)
        .with_context(|| format!("Failed to write .gitignore: {}", gitignore_path.display()))?;

    let report = InitReport {
        dir: dir.display().to_string(),
        config: config_path.display().to_string(),
        reinitialized,
    };

    render(output, &report, |_, w| {
        writeln!(w, "✓ Initialized .sprig/ project structure.")?;
        writeln!(w)?;
        writeln!(w, "  Config:       .sprig/config.toml")?;
        writeln!(w)?;
        writeln!(w, "Next steps:")?;
        writeln!(w, "  Track your first plant:")?;
        writeln!(w, "    sprig plant add --name \"Monstera\" --every 7")?;
        writeln!(w)?;
        writeln!(w, "  Pick when reminders fire each day:")?;
        writeln!(w, "    sprig notify time 08:30")?;
        Ok(())
    })
}
