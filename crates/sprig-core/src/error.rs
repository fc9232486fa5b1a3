use std::fmt;

/// Machine-readable error codes surfaced by the CLI and operation reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    NotInitialized,
    ConfigParseError,
    PlantNotFound,
    DuplicatePlant,
    InvalidFrequency,
    InvalidFireTime,
    InvalidDueDate,
    InvalidPlantName,
    PermissionDenied,
    SchedulerUnavailable,
    OrphanedAlert,
    ConsistencyViolation,
    StateReadFailed,
    StateWriteFailed,
    LockContention,
    OperationTimedOut,
    InternalUnexpected,
}

impl ErrorCode {
    /// Stable code identifier (`E####`) for machine parsing.
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::NotInitialized => "E1001",
            Self::ConfigParseError => "E1002",
            Self::PlantNotFound => "E2001",
            Self::DuplicatePlant => "E2002",
            Self::InvalidFrequency => "E2003",
            Self::InvalidFireTime => "E2004",
            Self::InvalidDueDate => "E2005",
            Self::InvalidPlantName => "E2006",
            Self::PermissionDenied => "E3001",
            Self::SchedulerUnavailable => "E3002",
            Self::OrphanedAlert => "E3003",
            Self::ConsistencyViolation => "E4001",
            Self::StateReadFailed => "E5001",
            Self::StateWriteFailed => "E5002",
            Self::LockContention => "E5003",
            Self::OperationTimedOut => "E5004",
            Self::InternalUnexpected => "E9001",
        }
    }

    /// Short human-facing summary for logs and terminal output.
    #[must_use]
    pub const fn message(self) -> &'static str {
        match self {
            Self::NotInitialized => "Project not initialized",
            Self::ConfigParseError => "Config file parse error",
            Self::PlantNotFound => "Plant not found",
            Self::DuplicatePlant => "Plant already exists",
            Self::InvalidFrequency => "Invalid watering frequency",
            Self::InvalidFireTime => "Invalid reminder time",
            Self::InvalidDueDate => "Invalid due date",
            Self::InvalidPlantName => "Invalid plant name",
            Self::PermissionDenied => "Notification permission denied",
            Self::SchedulerUnavailable => "Alert scheduler call failed",
            Self::OrphanedAlert => "Alert could not be cancelled",
            Self::ConsistencyViolation => "Notification state inconsistency",
            Self::StateReadFailed => "State file read failed",
            Self::StateWriteFailed => "State file write failed",
            Self::LockContention => "Lock contention",
            Self::OperationTimedOut => "Operation timed out",
            Self::InternalUnexpected => "Internal unexpected error",
        }
    }

    /// Optional remediation hint that can be surfaced to the user.
    #[must_use]
    pub const fn hint(self) -> Option<&'static str> {
        match self {
            Self::NotInitialized => Some("Run `sprig init` to create the .sprig directory."),
            Self::ConfigParseError => Some("Fix syntax in .sprig/config.toml and retry."),
            Self::PlantNotFound | Self::InternalUnexpected => None,
            Self::DuplicatePlant => Some("Pick a different plant id or edit the existing plant."),
            Self::InvalidFrequency => Some("Watering frequency must be a whole number of days, at least 1."),
            Self::InvalidFireTime => Some("Use a 24-hour HH:MM time such as 07:30."),
            Self::InvalidDueDate => Some("Use an RFC 3339 instant or a YYYY-MM-DD date."),
            Self::InvalidPlantName => Some("Plant names cannot be blank."),
            Self::PermissionDenied => {
                Some("Enable the notification permission in system settings, then run `sprig notify on`.")
            }
            Self::SchedulerUnavailable => {
                Some("The plant is still tracked; the reminder will be retried by the next change that touches its day.")
            }
            Self::OrphanedAlert => Some("A stray reminder may still fire; it is safe to dismiss."),
            Self::ConsistencyViolation => Some("The record was dropped or repaired; run `sprig notify on` to reschedule."),
            Self::StateReadFailed => Some("Check that .sprig/notifications.json is readable valid JSON."),
            Self::StateWriteFailed => Some("Check disk space and write permissions."),
            Self::LockContention => Some("Retry after the other `sprig` process releases its lock."),
            Self::OperationTimedOut => {
                Some("Nothing was committed; retry, or raise scheduler.timeout_ms in the config.")
            }
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}
