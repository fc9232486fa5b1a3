use anyhow::{Context, Result, anyhow, bail};
use clap::{Args, Subcommand, ValueEnum};
use sprig_core::calendar::Calendar;
use sprig_core::config::{EffectiveConfig, ProjectPaths, resolve_config};
use sprig_core::model::FireTime;
use std::path::{Path, PathBuf};
use toml::Value;

use crate::output::OutputMode;

#[derive(Args, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    command: ConfigCommand,
}

#[derive(Subcommand, Debug)]
enum ConfigCommand {
    /// Show resolved or raw configuration
    Show(ShowArgs),
    /// Set a configuration key in project or user scope
    Set(SetArgs),
    /// Unset a configuration key in project or user scope
    Unset(UnsetArgs),
}

#[derive(Args, Debug)]
struct ShowArgs {
    /// Show raw project config only
    #[arg(long, conflicts_with = "user")]
    project: bool,

    /// Show raw user config only
    #[arg(long)]
    user: bool,
}

#[derive(Args, Debug)]
struct SetArgs {
    /// Scope to mutate
    #[arg(long, default_value = "project")]
    scope: ConfigScope,

    /// Dot path key (e.g. notifications.default_hour, scheduler.permission, output)
    key: String,

    /// New value
    value: String,
}

#[derive(Args, Debug)]
struct UnsetArgs {
    /// Scope to mutate
    #[arg(long, default_value = "project")]
    scope: ConfigScope,

    /// Dot path key (e.g. calendar.timezone, output)
    key: String,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
enum ConfigScope {
    Project,
    User,
}

/// Where a key lives: an optional `[section]` and the leaf name.
type KeyPath<'a> = (Option<&'a str>, &'a str);

pub fn run_config(args: &ConfigArgs, project_root: &Path, output: OutputMode) -> Result<()> {
    match &args.command {
        ConfigCommand::Show(show) => run_show(show, project_root, output),
        ConfigCommand::Set(set) => run_set(set, project_root, output),
        ConfigCommand::Unset(unset) => run_unset(unset, project_root, output),
    }
}

fn run_show(args: &ShowArgs, project_root: &Path, output: OutputMode) -> Result<()> {
    if args.project {
        let value = load_toml_table(&ProjectPaths::new(project_root).config())?;
        print_toml_or_json(&value, output);
        return Ok(());
    }

    if args.user {
        let value = load_toml_table(&user_config_path()?)?;
        print_toml_or_json(&value, output);
        return Ok(());
    }

    let effective = resolve_config(project_root, output.is_json())?;
    print_effective(&effective, output)?;
    Ok(())
}

fn run_set(args: &SetArgs, project_root: &Path, output: OutputMode) -> Result<()> {
    let path = scope_path(args.scope, project_root)?;
    let mut value = load_toml_table(&path)?;
    apply_set(&mut value, args.scope, &args.key, &args.value)?;
    write_toml_table(&path, &value)?;
    render_mutation(output, "set", scope_label(args.scope), &args.key)?;
    Ok(())
}

fn run_unset(args: &UnsetArgs, project_root: &Path, output: OutputMode) -> Result<()> {
    let path = scope_path(args.scope, project_root)?;
    let mut value = load_toml_table(&path)?;
    apply_unset(&mut value, args.scope, &args.key)?;
    write_toml_table(&path, &value)?;
    render_mutation(output, "unset", scope_label(args.scope), &args.key)?;
    Ok(())
}

fn scope_path(scope: ConfigScope, project_root: &Path) -> Result<PathBuf> {
    match scope {
        ConfigScope::Project => Ok(ProjectPaths::new(project_root).config()),
        ConfigScope::User => user_config_path(),
    }
}

fn apply_set(root: &mut Value, scope: ConfigScope, key: &str, raw: &str) -> Result<()> {
    let parsed = parse_value(scope, key, raw)?;
    let (section, leaf) = split_known_key(scope, key)?;

    let table = root
        .as_table_mut()
        .ok_or_else(|| anyhow!("Config root must be a TOML table"))?;

    let Some(section) = section else {
        table.insert(leaf.to_string(), parsed);
        return Ok(());
    };

    let section_entry = table
        .entry(section.to_string())
        .or_insert_with(|| Value::Table(toml::map::Map::new()));

    let section_table = section_entry
        .as_table_mut()
        .ok_or_else(|| anyhow!("Section {section} must be a TOML table"))?;

    section_table.insert(leaf.to_string(), parsed);
    Ok(())
}

fn apply_unset(root: &mut Value, scope: ConfigScope, key: &str) -> Result<()> {
    let (section, leaf) = split_known_key(scope, key)?;
    let table = root
        .as_table_mut()
        .ok_or_else(|| anyhow!("Config root must be a TOML table"))?;

    let Some(section) = section else {
        table.remove(leaf);
        return Ok(());
    };

    if let Some(section_entry) = table.get_mut(section)
        && let Some(section_table) = section_entry.as_table_mut()
    {
        section_table.remove(leaf);
        if section_table.is_empty() {
            table.remove(section);
        }
    }

    Ok(())
}

fn split_known_key(scope: ConfigScope, key: &str) -> Result<KeyPath<'_>> {
    let path = match key.split_once('.') {
        Some((section, leaf)) => (Some(section), leaf),
        None => (None, key),
    };

    let valid = match scope {
        ConfigScope::Project => matches!(
            path,
            (Some("notifications"), "default_hour" | "default_minute" | "enabled")
                | (Some("calendar"), "timezone")
                | (Some("scheduler"), "timeout_ms" | "permission")
        ),
        ConfigScope::User => matches!(path, (None, "output")),
    };

    if valid {
        Ok(path)
    } else {
        bail!("Unsupported key `{key}` for {} scope", scope_label(scope));
    }
}

fn parse_value(scope: ConfigScope, key: &str, raw: &str) -> Result<Value> {
    let path = split_known_key(scope, key)?;

    match path {
        (None, "output") => match raw.trim().to_ascii_lowercase().as_str() {
            mode @ ("pretty" | "text" | "json") => Ok(Value::String(mode.to_string())),
            _ => bail!("output expects pretty, text, or json"),
        },
        (_, "timezone") => {
            raw.parse::<Calendar>()?;
            Ok(Value::String(raw.trim().to_string()))
        }
        (_, "permission") => match raw.trim().to_ascii_lowercase().as_str() {
            value @ ("granted" | "denied") => Ok(Value::String(value.to_string())),
            _ => bail!("{key} expects granted or denied"),
        },
        (_, "default_hour" | "default_minute") => {
            let number: u8 = raw
                .parse()
                .with_context(|| format!("{key} expects a whole number"))?;
            let (hour, minute) = if path.1 == "default_hour" { (number, 0) } else { (0, number) };
            FireTime::new(hour, minute)?;
            Ok(Value::Integer(i64::from(number)))
        }
        (_, "timeout_ms") => {
            let number: u32 = raw
                .parse()
                .with_context(|| format!("{key} expects a whole number of milliseconds"))?;
            if number == 0 {
                bail!("{key} must be greater than zero");
            }
            Ok(Value::Integer(i64::from(number)))
        }
        _ => {
            let value: bool = raw
                .parse()
                .with_context(|| format!("{key} expects true or false"))?;
            Ok(Value::Boolean(value))
        }
    }
}

fn load_toml_table(path: &Path) -> Result<Value> {
    if !path.exists() {
        return Ok(Value::Table(toml::map::Map::new()));
    }

    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;

    let value: Value =
        toml::from_str(&content).with_context(|| format!("Failed to parse {}", path.display()))?;

    if !value.is_table() {
        bail!("{} must contain a top-level TOML table", path.display());
    }

    Ok(value)
}

fn write_toml_table(path: &Path, value: &Value) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }

    let serialized = toml::to_string_pretty(value)?;
    std::fs::write(path, serialized).with_context(|| format!("Failed to write {}", path.display()))
}

fn print_toml_or_json(value: &Value, output: OutputMode) {
    match output {
        OutputMode::Json => match serde_json::to_string_pretty(value) {
            Ok(json) => println!("{json}"),
            Err(_) => println!("{{}}"),
        },
        OutputMode::Text | OutputMode::Pretty => {
            println!("{}", toml::to_string_pretty(value).unwrap_or_default());
        }
    }
}

fn print_effective(value: &EffectiveConfig, output: OutputMode) -> Result<()> {
    let project = &value.project;
    let permission = match project.scheduler.permission {
        sprig_core::scheduler::Permission::Granted => "granted",
        sprig_core::scheduler::Permission::Denied => "denied",
    };
    match output {
        OutputMode::Json => {
            println!("{}", serde_json::to_string_pretty(value)?);
        }
        OutputMode::Text => {
            println!("resolved_output={}", value.resolved_output);
            println!("notifications.default_hour={}", project.notifications.default_hour);
            println!("notifications.default_minute={}", project.notifications.default_minute);
            println!("notifications.enabled={}", project.notifications.enabled);
            println!("calendar.timezone={}", project.calendar.timezone);
            println!("scheduler.timeout_ms={}", project.scheduler.timeout_ms);
            println!("scheduler.permission={permission}");
            if let Some(out) = &value.user.output {
                println!("user.output={out}");
            }
        }
        OutputMode::Pretty => {
            println!("resolved_output = \"{}\"", value.resolved_output);
            println!();
            println!("[notifications]");
            println!("default_hour = {}", project.notifications.default_hour);
            println!("default_minute = {}", project.notifications.default_minute);
            println!("enabled = {}", project.notifications.enabled);
            println!();
            println!("[calendar]");
            println!("timezone = \"{}\"", project.calendar.timezone);
            println!();
            println!("[scheduler]");
            println!("timeout_ms = {}", project.scheduler.timeout_ms);
            println!("permission = \"{permission}\"");
            if let Some(out) = &value.user.output {
                println!();
                println!("# user");
                println!("output = \"{out}\"");
            }
        }
    }

    Ok(())
}

fn render_mutation(output: OutputMode, action: &str, scope: &str, key: &str) -> Result<()> {
    match output {
        OutputMode::Json => {
            println!(
                "{}",
                serde_json::to_string_pretty(&serde_json::json!({
                    "ok": true,
                    "action": action,
                    "scope": scope,
                    "key": key,
                }))?
            );
        }
        OutputMode::Text => {
            println!("ok=true action={action} scope={scope} key={key}");
        }
        OutputMode::Pretty => {
            println!("{} {} in {} config", action_to_title(action), key, scope);
        }
    }
    Ok(())
}

fn action_to_title(action: &str) -> &'static str {
    match action {
        "set" => "Set",
        "unset" => "Unset",
        _ => "Updated",
    }
}

fn user_config_path() -> Result<PathBuf> {
    let config_dir =
        dirs::config_dir().ok_or_else(|| anyhow!("Unable to resolve user config directory"))?;
    Ok(config_dir.join("sprig/config.toml"))
}

const fn scope_label(scope: ConfigScope) -> &'static str {
    match scope {
        ConfigScope::Project => "project",
        ConfigScope::User => "user",
    }
}
