//! Schedule entries and their boundary validation.
//!
//! Schedules are external data consumed by the core: the HTTP layer
//! validates them on the way into the store, and the runner fires matching
//! entries into the arbiter. The arbiter does **not** re-validate beyond
//! its own duration policy: the accepted range here (`1s..=50s`) is wider
//! than the arbiter's `max_duration_ms` on purpose, so a stored schedule
//! can still be denied at trigger time if policy tightens.

use core::fmt;

use serde::{Deserialize, Serialize};

/// Smallest duration a schedule may carry.
pub const MIN_SCHEDULE_DURATION_MS: u64 = 1_000;
/// Largest duration a schedule may carry.
pub const MAX_SCHEDULE_DURATION_MS: u64 = 50_000;

/// One scheduled feeding time.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleEntry {
    /// Caller-chosen identifier, unique within the list.
    pub id: String,
    /// Firing time as `HH:MM`, interpreted in UTC.
    pub time: String,
    /// Relay pulse duration to request.
    pub duration_ms: u64,
    /// Disabled entries are kept but never fired.
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

impl ScheduleEntry {
    /// Convenience constructor for an enabled entry.
    pub fn new(id: impl Into<String>, time: impl Into<String>, duration_ms: u64) -> Self {
        Self {
            id: id.into(),
            time: time.into(),
            duration_ms,
            enabled: true,
        }
    }
}

/// Why a schedule entry was rejected at the boundary.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ScheduleError {
    /// `time` is not a valid `HH:MM`.
    InvalidTime(String),
    /// `duration_ms` is outside the accepted range.
    InvalidDuration(u64),
    /// `id` is empty.
    EmptyId,
    /// Two entries share an id.
    DuplicateId(String),
}

impl fmt::Display for ScheduleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScheduleError::InvalidTime(time) => {
                write!(f, "invalid schedule time {time:?} (expected HH:MM)")
            }
            ScheduleError::InvalidDuration(ms) => write!(
                f,
                "invalid schedule duration {ms}ms (expected {MIN_SCHEDULE_DURATION_MS}..={MAX_SCHEDULE_DURATION_MS})"
            ),
            ScheduleError::EmptyId => f.write_str("schedule id must not be empty"),
            ScheduleError::DuplicateId(id) => write!(f, "duplicate schedule id {id:?}"),
        }
    }
}

impl std::error::Error for ScheduleError {}

/// Parse a strict `HH:MM` (two digits each, hour < 24, minute < 60).
pub fn parse_hhmm(s: &str) -> Option<(u32, u32)> {
    let (hh, mm) = s.split_once(':')?;
    if hh.len() != 2 || mm.len() != 2 {
        return None;
    }
    if !hh.bytes().all(|b| b.is_ascii_digit()) || !mm.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let hour: u32 = hh.parse().ok()?;
    let minute: u32 = mm.parse().ok()?;
    (hour < 24 && minute < 60).then_some((hour, minute))
}

/// Validate a single entry.
pub fn validate_entry(entry: &ScheduleEntry) -> Result<(), ScheduleError> {
    if entry.id.trim().is_empty() {
        return Err(ScheduleError::EmptyId);
    }
    if parse_hhmm(&entry.time).is_none() {
        return Err(ScheduleError::InvalidTime(entry.time.clone()));
    }
    if !(MIN_SCHEDULE_DURATION_MS..=MAX_SCHEDULE_DURATION_MS).contains(&entry.duration_ms) {
        return Err(ScheduleError::InvalidDuration(entry.duration_ms));
    }
    Ok(())
}

/// Validate a whole list, including id uniqueness.
pub fn validate_entries(entries: &[ScheduleEntry]) -> Result<(), ScheduleError> {
    let mut seen = std::collections::HashSet::new();
    for entry in entries {
        validate_entry(entry)?;
        if !seen.insert(entry.id.as_str()) {
            return Err(ScheduleError::DuplicateId(entry.id.clone()));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_hhmm_accepts_strict_format() {
        assert_eq!(parse_hhmm("00:00"), Some((0, 0)));
        assert_eq!(parse_hhmm("07:30"), Some((7, 30)));
        assert_eq!(parse_hhmm("23:59"), Some((23, 59)));
    }

    #[test]
    fn parse_hhmm_rejects_loose_formats() {
        assert_eq!(parse_hhmm("7:30"), None);
        assert_eq!(parse_hhmm("07:3"), None);
        assert_eq!(parse_hhmm("0730"), None);
        assert_eq!(parse_hhmm("24:00"), None);
        assert_eq!(parse_hhmm("12:60"), None);
        assert_eq!(parse_hhmm("ab:cd"), None);
        assert_eq!(parse_hhmm(" 07:30"), None);
        assert_eq!(parse_hhmm(""), None);
    }

    #[test]
    fn entry_validation_bounds() {
        assert!(validate_entry(&ScheduleEntry::new("a", "08:00", 1000)).is_ok());
        assert!(validate_entry(&ScheduleEntry::new("a", "08:00", 50_000)).is_ok());

        assert_eq!(
            validate_entry(&ScheduleEntry::new("a", "08:00", 999)),
            Err(ScheduleError::InvalidDuration(999))
        );
        assert_eq!(
            validate_entry(&ScheduleEntry::new("a", "08:00", 50_001)),
            Err(ScheduleError::InvalidDuration(50_001))
        );
        assert_eq!(
            validate_entry(&ScheduleEntry::new("a", "8:00", 2000)),
            Err(ScheduleError::InvalidTime("8:00".into()))
        );
        assert_eq!(
            validate_entry(&ScheduleEntry::new("", "08:00", 2000)),
            Err(ScheduleError::EmptyId)
        );
    }

    #[test]
    fn duplicate_ids_rejected() {
        let entries = vec![
            ScheduleEntry::new("morning", "07:00", 2000),
            ScheduleEntry::new("morning", "19:00", 2000),
        ];
        assert_eq!(
            validate_entries(&entries),
            Err(ScheduleError::DuplicateId("morning".into()))
        );
    }

    #[test]
    fn entry_serde_defaults_enabled() {
        let entry: ScheduleEntry =
            serde_json::from_str(r#"{"id":"x","time":"12:00","durationMs":2000}"#).unwrap();
        assert!(entry.enabled);
    }

    #[test]
    fn accepted_schedule_can_exceed_arbiter_policy() {
        // The boundary deliberately accepts durations the arbiter will deny
        // at trigger time; the two bounds are independent layers.
        let entry = ScheduleEntry::new("big", "12:00", 30_000);
        assert!(validate_entry(&entry).is_ok());
        assert!(entry.duration_ms > crate::state::DEFAULT_MAX_DURATION_MS);
    }
}
