#![forbid(unsafe_code)]

mod cmd;
mod output;

use clap::{Parser, Subcommand};
use output::{CliError, OutputMode, render_error, resolve_output_mode};
use std::env;
use tracing::{debug, info};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "sprig: plant watering reminders",
    long_about = None
)]
struct Cli {
    /// Enable verbose logging.
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Output format: pretty, text, or json.
    #[arg(long, global = true, value_enum)]
    format: Option<OutputMode>,

    /// Emit JSON output instead of human-readable text.
    #[arg(long, global = true)]
    json: bool,

    /// Suppress non-essential output.
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

impl Cli {
    /// Derive the output mode from flags, environment, and user config.
    fn output_mode(&self) -> OutputMode {
        let user_output = sprig_core::config::load_user_config()
            .ok()
            .and_then(|config| config.output);
        resolve_output_mode(self.format, self.json, user_output.as_deref())
    }
}

#[derive(Subcommand, Debug)]
enum Commands {
    #[command(
        next_help_heading = "Setup",
        about = "Initialize a sprig project",
        long_about = "Create the .sprig/ directory and a default config in the current directory.",
        after_help = "EXAMPLES:\n    # Initialize a project in the current directory\n    sprig init\n\n    # Rewrite the default config\n    sprig init --force"
    )]
    Init(cmd::init::InitArgs),

    #[command(
        next_help_heading = "Plants",
        about = "Track plants and record waterings",
        long_about = "Add, list, water, edit, and remove plants. Every due-date change keeps the daily reminders in step.",
        after_help = "EXAMPLES:\n    # Track a plant watered every 7 days\n    sprig plant add --name Monstera --every 7 --id monstera\n\n    # Record a watering now\n    sprig plant water monstera\n\n    # Move the next due date\n    sprig plant edit monstera --next 2025-06-14\n\n    # Emit machine-readable output\n    sprig plant list --json"
    )]
    Plant(cmd::plant::PlantArgs),

    #[command(
        next_help_heading = "Reminders",
        about = "Manage reminder settings",
        long_about = "Show reminder status, switch reminders on or off, change the daily reminder time, or reset every reminder.",
        after_help = "EXAMPLES:\n    # Show scheduled reminder days\n    sprig notify status\n\n    # Remind at 08:30 every due day\n    sprig notify time 08:30\n\n    # Pause all reminders\n    sprig notify off"
    )]
    Notify(cmd::notify::NotifyArgs),

    #[command(
        next_help_heading = "Reminders",
        about = "Inspect or deliver queued alerts",
        long_about = "List alerts waiting in the local alert queue, or deliver every alert whose time has passed.",
        after_help = "EXAMPLES:\n    # List pending alerts\n    sprig alerts\n\n    # Deliver alerts that have fired\n    sprig alerts --fired"
    )]
    Alerts(cmd::alerts::AlertsArgs),

    #[command(
        next_help_heading = "Setup",
        about = "Show or change configuration",
        long_about = "Show the effective configuration, or set and unset project and user keys.",
        after_help = "EXAMPLES:\n    # Show effective configuration\n    sprig config show\n\n    # Use a fixed UTC offset for reminder days\n    sprig config set calendar.timezone +02:00\n\n    # Prefer JSON output everywhere\n    sprig config set --scope user output json"
    )]
    Config(cmd::config::ConfigArgs),
}

fn init_tracing(verbose: bool) {
    let filter = EnvFilter::try_from_env("SPRIG_LOG").unwrap_or_else(|_| {
        EnvFilter::new(if verbose || env::var("DEBUG").is_ok() {
            "sprig=debug,info"
        } else {
            "sprig=info,warn"
        })
    });

    let format = env::var("SPRIG_LOG_FORMAT").unwrap_or_else(|_| "compact".to_string());

    let registry = tracing_subscriber::registry().with(filter);

    match format.as_str() {
        "json" => {
            registry
                .with(fmt::layer().json().with_ansi(false).with_writer(std::io::stderr))
                .init();
        }
        _ => {
            registry
                .with(fmt::layer().compact().with_writer(std::io::stderr))
                .init();
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    if !cli.quiet {
        init_tracing(cli.verbose);
    }

    if cli.verbose {
        info!("Verbose mode enabled");
    }

    let project_root = env::current_dir()?;
    let output = cli.output_mode();
    debug!(?output, root = %project_root.display(), "dispatching command");

    let command_result = match &cli.command {
        Commands::Init(args) => cmd::init::run_init(args, output, &project_root),
        Commands::Plant(args) => cmd::plant::run_plant(args, output, &project_root).await,
        Commands::Notify(args) => cmd::notify::run_notify(args, output, &project_root).await,
        Commands::Alerts(args) => cmd::alerts::run_alerts(args, output, &project_root).await,
        Commands::Config(args) => cmd::config::run_config(args, &project_root, output),
    };

    if let Err(err) = command_result {
        render_error(output, &CliError::from(&err))?;
        std::process::exit(1);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn global_flags_follow_subcommands() {
        let cli = Cli::parse_from(["sprig", "plant", "list", "--json", "-q"]);
        assert!(cli.json);
        assert!(cli.quiet);
        assert!(matches!(cli.command, Commands::Plant(_)));
    }

    #[test]
    fn format_flag_parses() {
        let cli = Cli::parse_from(["sprig", "--format", "text", "notify", "status"]);
        assert_eq!(cli.format, Some(OutputMode::Text));
    }

    #[test]
    fn notify_time_routes_to_notify() {
        let cli = Cli::parse_from(["sprig", "notify", "time", "06:45"]);
        assert!(matches!(cli.command, Commands::Notify(_)));
    }
}
