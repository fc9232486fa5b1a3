//! Durable load/save of engine state.
//!
//! The engine only needs "load once at startup" and "overwrite after every
//! commit". [`JsonFileStore`] writes through a temporary file and renames it
//! into place so a crash mid-write never leaves a truncated state file.

use serde::Serialize;
use serde::de::DeserializeOwned;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};

use crate::error::ErrorCode;
use crate::model::StateRecord;

/// Persistence errors for state files.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("failed to read {}: {source}", path.display())]
    Read { path: PathBuf, source: io::Error },
    #[error("failed to parse {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("failed to write {}: {source}", path.display())]
    Write { path: PathBuf, source: io::Error },
    #[error("failed to serialize state: {0}")]
    Serialize(#[from] serde_json::Error),
}

impl StoreError {
    /// Machine-readable code associated with this error.
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::Read { .. } | Self::Parse { .. } => ErrorCode::StateReadFailed,
            Self::Write { .. } | Self::Serialize(_) => ErrorCode::StateWriteFailed,
        }
    }
}

/// Durable key-value slot holding the engine's state record.
pub trait StateStore: Send + Sync {
    /// Load the last saved record, or `None` if nothing was ever saved.
    fn load(&self) -> Result<Option<StateRecord>, StoreError>;

    /// Overwrite the saved record.
    fn save(&self, record: &StateRecord) -> Result<(), StoreError>;
}

/// State kept in a JSON file.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl StateStore for JsonFileStore {
    fn load(&self) -> Result<Option<StateRecord>, StoreError> {
        read_json(&self.path)
    }

    fn save(&self, record: &StateRecord) -> Result<(), StoreError> {
        write_json_atomic(&self.path, record)
    }
}

/// Read a JSON document, treating a missing or empty file as absent.
pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>, StoreError> {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(source) => {
            return Err(StoreError::Read {
                path: path.to_path_buf(),
                source,
            });
        }
    };
    if content.trim().is_empty() {
        return Ok(None);
    }
    serde_json::from_str(&content)
        .map(Some)
        .map_err(|source| StoreError::Parse {
            path: path.to_path_buf(),
            source,
        })
}

/// Serialize `value` and atomically replace `path` with it.
pub fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<(), StoreError> {
    let write_err = |source| StoreError::Write {
        path: path.to_path_buf(),
        source,
    };
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(write_err)?;
    }
    let mut body = serde_json::to_string_pretty(value)?;
    body.push('\n');
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, body).map_err(write_err)?;
    fs::rename(&tmp, path).map_err(write_err)
}

/// In-memory store, with save counting and one-shot save failures for tests.
#[derive(Debug, Default)]
pub struct MemoryStore {
    record: Mutex<Option<StateRecord>>,
    saves: AtomicUsize,
    fail_next_save: AtomicBool,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_record(record: StateRecord) -> Self {
        Self {
            record: Mutex::new(Some(record)),
            ..Self::default()
        }
    }

    /// The most recently saved record.
    #[must_use]
    pub fn saved(&self) -> Option<StateRecord> {
        self.record
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Number of successful saves.
    #[must_use]
    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }

    /// Make the next `save` fail with a write error.
    pub fn fail_next_save(&self) {
        self.fail_next_save.store(true, Ordering::SeqCst);
    }
}

impl StateStore for MemoryStore {
    fn load(&self) -> Result<Option<StateRecord>, StoreError> {
        Ok(self.saved())
    }

    fn save(&self, record: &StateRecord) -> Result<(), StoreError> {
        if self.fail_next_save.swap(false, Ordering::SeqCst) {
            return Err(StoreError::Write {
                path: PathBuf::from("<memory>"),
                source: io::Error::other("injected save failure"),
            });
        }
        *self.record.lock().unwrap_or_else(PoisonError::into_inner) = Some(record.clone());
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

impl<T: StateStore + ?Sized> StateStore for std::sync::Arc<T> {
    fn load(&self) -> Result<Option<StateRecord>, StoreError> {
        (**self).load()
    }

    fn save(&self, record: &StateRecord) -> Result<(), StoreError> {
        (**self).save(record)
    }
}
