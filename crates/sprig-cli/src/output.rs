//! Shared output layer for pretty/text/JSON parity across all CLI commands.
//!
//! Every command handler receives an [`OutputMode`] and formats its output
//! accordingly: pretty output for humans, compact text for scripts, or stable JSON.
//!
//! # Output mode resolution
//!
//! Precedence (highest wins):
//! 1. `--format` / hidden `--json` flag
//! 2. `FORMAT` env var → `"pretty"` | `"text"` | `"json"`
//! 3. User config `output`
//! 4. Default: [`OutputMode::Pretty`] if stdout is a TTY; [`OutputMode::Text`] if piped.

use clap::ValueEnum;
use serde::Serialize;
use sprig_core::engine::{EngineError, Reconciliation, ReportedFailure, SchedulerStep};
use sprig_core::error::ErrorCode;
use sprig_core::lock::LockError;
use sprig_core::model::ConsistencyViolation;
use sprig_core::plant::{NotificationOutcome, PlantError};
use sprig_core::store::StoreError;
use std::fmt;
use std::io::{self, IsTerminal, Write};

/// Shared width for human pretty separators.
pub const PRETTY_RULE_WIDTH: usize = 60;

/// Write a horizontal separator used by pretty human output.
pub fn pretty_rule(w: &mut dyn Write) -> io::Result<()> {
    writeln!(w, "{:-<width$}", "", width = PRETTY_RULE_WIDTH)
}

/// Write a section heading followed by a separator.
pub fn pretty_section(w: &mut dyn Write, heading: &str) -> io::Result<()> {
    writeln!(w, "{heading}")?;
    pretty_rule(w)
}

/// Render a left-aligned key/value line in human output.
pub fn pretty_kv(w: &mut dyn Write, key: &str, value: impl AsRef<str>) -> io::Result<()> {
    writeln!(w, "{:<12} {}", format!("{key}:"), value.as_ref())
}

/// The three output modes supported by the CLI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputMode {
    /// Human-optimized output (sections, visual framing).
    Pretty,
    /// Plain text rows for scripts and pipes.
    Text,
    /// Machine-readable JSON.
    Json,
}

impl OutputMode {
    /// Returns `true` if JSON output was requested.
    pub const fn is_json(self) -> bool {
        matches!(self, Self::Json)
    }

    fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "json" => Some(Self::Json),
            "text" => Some(Self::Text),
            "pretty" | "human" => Some(Self::Pretty),
            _ => None,
        }
    }
}

/// Core resolution logic, separated from I/O for testability.
fn resolve_output_mode_inner(
    format_flag: Option<OutputMode>,
    json_flag: bool,
    format_env: Option<&str>,
    user_output: Option<&str>,
    is_tty: bool,
) -> OutputMode {
    if let Some(mode) = format_flag {
        return mode;
    }

    if json_flag {
        return OutputMode::Json;
    }

    if let Some(mode) = format_env.and_then(OutputMode::parse) {
        return mode;
    }

    if let Some(mode) = user_output.and_then(OutputMode::parse) {
        return mode;
    }

    if is_tty {
        OutputMode::Pretty
    } else {
        OutputMode::Text
    }
}

/// Resolve the output mode from CLI flags, environment, user config, and TTY defaults.
pub fn resolve_output_mode(
    format_flag: Option<OutputMode>,
    json_flag: bool,
    user_output: Option<&str>,
) -> OutputMode {
    let env_val = std::env::var("FORMAT").ok();
    let is_tty = io::stdout().is_terminal();
    resolve_output_mode_inner(format_flag, json_flag, env_val.as_deref(), user_output, is_tty)
}

/// Render a serializable value with explicit pretty/text renderers.
pub fn render_mode<T: Serialize>(
    mode: OutputMode,
    value: &T,
    text_fn: impl FnOnce(&T, &mut dyn Write) -> io::Result<()>,
    pretty_fn: impl FnOnce(&T, &mut dyn Write) -> io::Result<()>,
) -> anyhow::Result<()> {
    let stdout = io::stdout();
    let mut out = stdout.lock();
    match mode {
        OutputMode::Json => {
            serde_json::to_writer_pretty(&mut out, value)?;
            writeln!(out)?;
        }
        OutputMode::Text => text_fn(value, &mut out)?,
        OutputMode::Pretty => pretty_fn(value, &mut out)?,
    }
    Ok(())
}

/// Render a serializable value; pretty and text share one renderer.
pub fn render<T: Serialize>(
    mode: OutputMode,
    value: &T,
    human_fn: impl FnOnce(&T, &mut dyn Write) -> io::Result<()>,
) -> anyhow::Result<()> {
    let stdout = io::stdout();
    let mut out = stdout.lock();
    match mode {
        OutputMode::Json => {
            serde_json::to_writer_pretty(&mut out, value)?;
            writeln!(out)?;
        }
        OutputMode::Pretty | OutputMode::Text => {
            human_fn(value, &mut out)?;
        }
    }
    Ok(())
}

/// Project directory has not been created with `sprig init`.
#[derive(Debug)]
pub struct NotInitialized;

impl fmt::Display for NotInitialized {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("no .sprig/ directory found")
    }
}

impl std::error::Error for NotInitialized {}

/// A structured error with optional suggestion and error code.
#[derive(Debug, Serialize)]
pub struct CliError {
    /// Human-readable error message.
    pub message: String,
    /// Optional suggestion for how to fix the error.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<String>,
    /// Machine-readable error code (`E####`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
}

impl CliError {
    /// Create a simple error with just a message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            suggestion: None,
            error_code: None,
        }
    }

    /// Create an error carrying a core [`ErrorCode`] and its hint.
    pub fn with_code(message: impl Into<String>, code: ErrorCode) -> Self {
        Self {
            message: message.into(),
            suggestion: code.hint().map(str::to_string),
            error_code: Some(code.code().to_string()),
        }
    }
}

/// Map an error chain onto a [`CliError`], picking up a code where one exists.
impl From<&anyhow::Error> for CliError {
    fn from(err: &anyhow::Error) -> Self {
        let message = format!("{err:#}");
        let code = err.chain().find_map(|cause| {
            if cause.is::<NotInitialized>() {
                Some(ErrorCode::NotInitialized)
            } else if let Some(e) = cause.downcast_ref::<PlantError>() {
                Some(e.code())
            } else if let Some(e) = cause.downcast_ref::<EngineError>() {
                Some(e.code())
            } else if let Some(e) = cause.downcast_ref::<LockError>() {
                Some(e.code())
            } else if let Some(e) = cause.downcast_ref::<StoreError>() {
                Some(e.code())
            } else if cause.is::<toml::de::Error>() {
                Some(ErrorCode::ConfigParseError)
            } else {
                None
            }
        });
        match code {
            Some(code) => Self::with_code(message, code),
            None => Self::new(message),
        }
    }
}

/// Render an error to stderr in the requested format.
pub fn render_error(mode: OutputMode, error: &CliError) -> anyhow::Result<()> {
    let stderr = io::stderr();
    let mut out = stderr.lock();
    match mode {
        OutputMode::Json => {
            let wrapper = serde_json::json!({
                "error": error,
            });
            serde_json::to_writer_pretty(&mut out, &wrapper)?;
            writeln!(out)?;
        }
        OutputMode::Pretty | OutputMode::Text => {
            match &error.error_code {
                Some(code) => writeln!(out, "error[{code}]: {}", error.message)?,
                None => writeln!(out, "error: {}", error.message)?,
            }
            if let Some(ref suggestion) = error.suggestion {
                writeln!(out, "  suggestion: {suggestion}")?;
            }
        }
    }
    Ok(())
}

/// A problem worth reporting that does not fail the command.
#[derive(Debug, Serialize)]
pub struct CliWarning {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub day: Option<String>,
    pub error_code: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<&'static str>,
}

impl From<&ConsistencyViolation> for CliWarning {
    fn from(violation: &ConsistencyViolation) -> Self {
        let code = ErrorCode::ConsistencyViolation;
        Self {
            message: violation.to_string(),
            day: Some(violation.day().to_string()),
            error_code: code.code(),
            suggestion: code.hint(),
        }
    }
}

/// Render a warning to stderr; JSON warnings are one object per line.
pub fn render_warning(mode: OutputMode, warning: &CliWarning) -> anyhow::Result<()> {
    let stderr = io::stderr();
    let mut out = stderr.lock();
    match mode {
        OutputMode::Json => {
            serde_json::to_writer(&mut out, &serde_json::json!({ "warning": warning }))?;
            writeln!(out)?;
        }
        OutputMode::Pretty | OutputMode::Text => {
            writeln!(out, "warning[{}]: {}", warning.error_code, warning.message)?;
            if let Some(suggestion) = warning.suggestion {
                writeln!(out, "  suggestion: {suggestion}")?;
            }
        }
    }
    Ok(())
}

/// Serializable view of one reported scheduler failure.
#[derive(Debug, Serialize)]
pub struct FailureView {
    pub step: SchedulerStep,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub day: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alert: Option<String>,
    pub code: &'static str,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hint: Option<&'static str>,
}

impl From<&ReportedFailure> for FailureView {
    fn from(failure: &ReportedFailure) -> Self {
        let code = failure.code();
        Self {
            step: failure.step,
            day: failure.day.map(|day| day.to_string()),
            alert: failure.alert.as_ref().map(ToString::to_string),
            code: code.code(),
            message: failure.failure.to_string(),
            hint: code.hint(),
        }
    }
}

/// Serializable view of an engine [`Reconciliation`].
#[derive(Debug, Serialize)]
pub struct ReportView {
    pub operation: sprig_core::engine::Operation,
    pub changed: bool,
    pub aborted: bool,
    pub scheduled: Vec<String>,
    pub removed: Vec<String>,
    pub pruned: Vec<String>,
    pub skipped: Vec<String>,
    pub failures: Vec<FailureView>,
}

impl From<&Reconciliation> for ReportView {
    fn from(report: &Reconciliation) -> Self {
        let days = |days: &[sprig_core::DayKey]| -> Vec<String> {
            days.iter().map(ToString::to_string).collect()
        };
        Self {
            operation: report.operation,
            changed: report.changed,
            aborted: report.aborted,
            scheduled: days(&report.scheduled),
            removed: days(&report.removed),
            pruned: days(&report.pruned),
            skipped: days(&report.skipped),
            failures: report.failures.iter().map(FailureView::from).collect(),
        }
    }
}

/// Serializable view of what happened to reminders after a plant change.
#[derive(Debug, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum OutcomeView {
    Untouched,
    Reconciled { report: ReportView },
    Failed {
        code: &'static str,
        message: String,
        /// What the engine did before the failure, when it got that far.
        #[serde(skip_serializing_if = "Option::is_none")]
        report: Option<ReportView>,
    },
}

impl From<&NotificationOutcome> for OutcomeView {
    fn from(outcome: &NotificationOutcome) -> Self {
        match outcome {
            NotificationOutcome::Untouched => Self::Untouched,
            NotificationOutcome::Reconciled(report) => Self::Reconciled {
                report: ReportView::from(report),
            },
            NotificationOutcome::Failed(err) => Self::Failed {
                code: err.code().code(),
                message: err.to_string(),
                report: err.report().map(ReportView::from),
            },
        }
    }
}

/// Write warning lines for anything a report needs the user to know.
pub fn write_report_warnings(w: &mut dyn Write, report: &ReportView) -> io::Result<()> {
    if report.aborted {
        writeln!(w, "! nothing changed: the alert scheduler could not be reset")?;
    }
    for failure in &report.failures {
        let day = failure.day.as_deref().unwrap_or("all days");
        writeln!(w, "! [{}] {day}: {}", failure.code, failure.message)?;
        if let Some(hint) = failure.hint {
            writeln!(w, "  hint: {hint}")?;
        }
    }
    if !report.skipped.is_empty() {
        writeln!(
            w,
            "! no reminder for {}: the reminder time on that day has already passed",
            report.skipped.join(", ")
        )?;
    }
    Ok(())
}

/// Write warning lines for a plant change's reminder outcome.
pub fn write_outcome_warnings(w: &mut dyn Write, outcome: &OutcomeView) -> io::Result<()> {
    match outcome {
        OutcomeView::Untouched => Ok(()),
        OutcomeView::Reconciled { report } => write_report_warnings(w, report),
        OutcomeView::Failed {
            code,
            message,
            report,
        } => {
            writeln!(w, "! [{code}] reminders not updated: {message}")?;
            match report {
                Some(report) => write_report_warnings(w, report),
                None => Ok(()),
            }
        }
    }
}
