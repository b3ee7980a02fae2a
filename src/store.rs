//! JSON-file persistence for feeder state and schedules.
//!
//! Both stores follow the same contract: read the whole record, mutate in
//! memory, write the whole record back. There is no partial-field patching
//! at this layer; callers own the read-modify-write cycle and the
//! serialization point that makes it atomic (see `services::SharedFeeder`).
//!
//! A missing state file is not an error: the default record is written out
//! on first load so the policy defaults are visible and editable on disk.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::schedule::ScheduleEntry;
use crate::state::FeederState;

/// Failure talking to the on-disk stores.
///
/// These are the only faults `attempt_feed` surfaces as `Err`; the HTTP
/// layer maps them to a generic 500 without taking the process down.
#[derive(Debug)]
pub enum StoreError {
    /// Filesystem-level failure.
    Io(io::Error),
    /// The file exists but does not parse as the expected record.
    Serde(serde_json::Error),
}

impl core::fmt::Display for StoreError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            StoreError::Io(err) => write!(f, "state store I/O error: {err}"),
            StoreError::Serde(err) => write!(f, "state store parse error: {err}"),
        }
    }
}

impl std::error::Error for StoreError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            StoreError::Io(err) => Some(err),
            StoreError::Serde(err) => Some(err),
        }
    }
}

impl From<io::Error> for StoreError {
    fn from(err: io::Error) -> Self {
        StoreError::Io(err)
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Serde(err)
    }
}

fn ensure_parent_dir(path: &Path) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    Ok(())
}

// ============================================================================
// StateStore
// ============================================================================

/// Whole-record store for the single [`FeederState`].
#[derive(Clone, Debug)]
pub struct StateStore {
    path: PathBuf,
}

impl StateStore {
    /// Store backed by the given JSON file path.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Path of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the current record.
    ///
    /// If the file does not exist yet, the default record is written out
    /// and returned.
    pub fn load(&self) -> Result<FeederState, StoreError> {
        if !self.path.exists() {
            let state = FeederState::default();
            self.save(&state)?;
            return Ok(state);
        }
        let data = fs::read_to_string(&self.path)?;
        Ok(serde_json::from_str(&data)?)
    }

    /// Write the record back, creating parent directories as needed.
    pub fn save(&self, state: &FeederState) -> Result<(), StoreError> {
        ensure_parent_dir(&self.path)?;
        let data = serde_json::to_string_pretty(state)?;
        fs::write(&self.path, data)?;
        Ok(())
    }
}

// ============================================================================
// ScheduleStore
// ============================================================================

/// Whole-list store for the ordered schedule entries.
///
/// A missing file reads as an empty list; nothing is written until the
/// first save.
#[derive(Clone, Debug)]
pub struct ScheduleStore {
    path: PathBuf,
}

impl ScheduleStore {
    /// Store backed by the given JSON file path.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Path of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the full schedule list.
    pub fn load(&self) -> Result<Vec<ScheduleEntry>, StoreError> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let data = fs::read_to_string(&self.path)?;
        Ok(serde_json::from_str(&data)?)
    }

    /// Replace the full schedule list.
    pub fn save(&self, schedules: &[ScheduleEntry]) -> Result<(), StoreError> {
        ensure_parent_dir(&self.path)?;
        let data = serde_json::to_string_pretty(schedules)?;
        fs::write(&self.path, data)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_state_file_seeds_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::new(dir.path().join("state.json"));

        let state = store.load().unwrap();
        assert_eq!(state, FeederState::default());
        // First load wrote the defaults out.
        assert!(store.path().exists());
    }

    #[test]
    fn state_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::new(dir.path().join("nested/state.json"));

        let mut state = FeederState::default();
        state.feeds_today = 3;
        state.enabled = false;
        store.save(&state).unwrap();

        assert_eq!(store.load().unwrap(), state);
    }

    #[test]
    fn corrupt_state_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        fs::write(&path, "not json").unwrap();

        let store = StateStore::new(&path);
        assert!(matches!(store.load(), Err(StoreError::Serde(_))));
    }

    #[test]
    fn missing_schedule_file_is_empty_list() {
        let dir = tempfile::tempdir().unwrap();
        let store = ScheduleStore::new(dir.path().join("schedules.json"));

        assert!(store.load().unwrap().is_empty());
        // Reads alone never create the file.
        assert!(!store.path().exists());
    }

    #[test]
    fn schedule_round_trip_preserves_order() {
        let dir = tempfile::tempdir().unwrap();
        let store = ScheduleStore::new(dir.path().join("schedules.json"));

        let entries = vec![
            ScheduleEntry::new("evening", "18:30", 3000),
            ScheduleEntry::new("morning", "07:00", 2000),
        ];
        store.save(&entries).unwrap();

        assert_eq!(store.load().unwrap(), entries);
    }
}
