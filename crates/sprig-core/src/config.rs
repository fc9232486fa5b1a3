use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::io::IsTerminal;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::calendar::Calendar;
use crate::model::{FireTime, NotificationState};
use crate::scheduler::Permission;

/// Name of the per-project state directory.
pub const SPRIG_DIR: &str = ".sprig";

/// File locations inside a project's `.sprig/` directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectPaths {
    root: PathBuf,
}

impl ProjectPaths {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    #[must_use]
    pub fn dir(&self) -> PathBuf {
        self.root.join(SPRIG_DIR)
    }

    #[must_use]
    pub fn config(&self) -> PathBuf {
        self.dir().join("config.toml")
    }

    #[must_use]
    pub fn notifications(&self) -> PathBuf {
        self.dir().join("notifications.json")
    }

    #[must_use]
    pub fn plants(&self) -> PathBuf {
        self.dir().join("plants.json")
    }

    #[must_use]
    pub fn alerts(&self) -> PathBuf {
        self.dir().join("alerts.json")
    }

    #[must_use]
    pub fn lock(&self) -> PathBuf {
        self.dir().join("lock")
    }

    #[must_use]
    pub fn is_initialized(&self) -> bool {
        self.dir().is_dir()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectConfig {
    #[serde(default)]
    pub notifications: NotificationConfig,
    #[serde(default)]
    pub calendar: CalendarConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
}

/// Settings used the first time a state file is created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationConfig {
    #[serde(default = "default_hour")]
    pub default_hour: u8,
    #[serde(default)]
    pub default_minute: u8,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            default_hour: default_hour(),
            default_minute: 0,
            enabled: default_true(),
        }
    }
}

impl NotificationConfig {
    /// The state a fresh project starts with.
    ///
    /// # Errors
    ///
    /// Returns an error if the configured hour or minute is out of range.
    pub fn initial_state(&self) -> Result<NotificationState> {
        let fire_time = FireTime::new(self.default_hour, self.default_minute)
            .context("Invalid [notifications] default_hour/default_minute")?;
        Ok(NotificationState::new(fire_time, self.enabled))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalendarConfig {
    #[serde(default = "default_timezone")]
    pub timezone: String,
}

impl Default for CalendarConfig {
    fn default() -> Self {
        Self {
            timezone: default_timezone(),
        }
    }
}

impl CalendarConfig {
    /// # Errors
    ///
    /// Returns an error if `timezone` is neither `local` nor a UTC offset.
    pub fn calendar(&self) -> Result<Calendar> {
        self.timezone
            .parse::<Calendar>()
            .with_context(|| format!("Invalid [calendar] timezone {:?}", self.timezone))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchedulerConfig {
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default)]
    pub permission: Permission,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            timeout_ms: default_timeout_ms(),
            permission: Permission::default(),
        }
    }
}

impl SchedulerConfig {
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct UserConfig {
    #[serde(default)]
    pub output: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EffectiveConfig {
    pub project: ProjectConfig,
    pub user: UserConfig,
    pub resolved_output: String,
}

pub fn load_project_config(project_root: &Path) -> Result<ProjectConfig> {
    let path = ProjectPaths::new(project_root).config();
    if !path.exists() {
        return Ok(ProjectConfig::default());
    }

    let content = std::fs::read_to_string(&path)
        .with_context(|| format!("Failed to read {}", path.display()))?;

    toml::from_str::<ProjectConfig>(&content)
        .with_context(|| format!("Failed to parse {}", path.display()))
}

pub fn load_user_config() -> Result<UserConfig> {
    let Some(config_dir) = dirs::config_dir() else {
        return Ok(UserConfig::default());
    };

    let path = config_dir.join("sprig/config.toml");
    if !path.exists() {
        return Ok(UserConfig::default());
    }

    let content = std::fs::read_to_string(&path)
        .with_context(|| format!("Failed to read {}", path.display()))?;

    toml::from_str::<UserConfig>(&content)
        .with_context(|| format!("Failed to parse {}", path.display()))
}

pub fn resolve_config(project_root: &Path, cli_json: bool) -> Result<EffectiveConfig> {
    let project = load_project_config(project_root)?;
    let user = load_user_config()?;

    let env_format = env::var("FORMAT").ok();
    let resolved_output = resolve_output(cli_json, user.output.as_deref(), env_format.as_deref());

    Ok(EffectiveConfig {
        project,
        user,
        resolved_output,
    })
}

/// Render the default project config written by `sprig init`.
pub fn default_project_toml() -> Result<String> {
    toml::to_string_pretty(&ProjectConfig::default()).context("Failed to render default config")
}

fn resolve_output(cli_json: bool, user_output: Option<&str>, env_format: Option<&str>) -> String {
    fn normalize_output_mode(raw: &str) -> Option<&'static str> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "pretty" | "human" => Some("pretty"),
            "text" => Some("text"),
            "json" => Some("json"),
            _ => None,
        }
    }

    if cli_json {
        return "json".to_string();
    }

    if let Some(mode) = env_format.and_then(normalize_output_mode) {
        return mode.to_string();
    }

    if let Some(mode) = user_output.and_then(normalize_output_mode) {
        return mode.to_string();
    }

    if std::io::stdout().is_terminal() {
        "pretty".to_string()
    } else {
        "text".to_string()
    }
}

const fn default_true() -> bool {
    true
}

const fn default_hour() -> u8 {
    7
}

fn default_timezone() -> String {
    "local".to_string()
}

const fn default_timeout_ms() -> u64 {
    10_000
}
